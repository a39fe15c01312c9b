//! Publish types
//!
//! Upload targets, moderation tickets and the status vocabulary shared by
//! the submitter and the poller.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of thread a clip is posted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParentKind {
    /// Comment thread under a video
    VideoComment,
    /// Message thread of a group
    GroupMessage,
}

impl ParentKind {
    /// Multipart field carrying the parent ID
    pub fn id_field(&self) -> &'static str {
        match self {
            ParentKind::VideoComment => "video_id",
            ParentKind::GroupMessage => "group_id",
        }
    }

    /// Route segment of the status endpoint
    pub fn status_collection(&self) -> &'static str {
        match self {
            ParentKind::VideoComment => "comments",
            ParentKind::GroupMessage => "messages",
        }
    }
}

/// The entity a clip attaches to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ParentRef {
    VideoComment { video_id: String },
    GroupMessage { group_id: String },
}

impl ParentRef {
    pub fn video(video_id: impl Into<String>) -> Self {
        ParentRef::VideoComment {
            video_id: video_id.into(),
        }
    }

    pub fn group(group_id: impl Into<String>) -> Self {
        ParentRef::GroupMessage {
            group_id: group_id.into(),
        }
    }

    pub fn kind(&self) -> ParentKind {
        match self {
            ParentRef::VideoComment { .. } => ParentKind::VideoComment,
            ParentRef::GroupMessage { .. } => ParentKind::GroupMessage,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ParentRef::VideoComment { video_id } => video_id,
            ParentRef::GroupMessage { group_id } => group_id,
        }
    }
}

impl fmt::Display for ParentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParentRef::VideoComment { video_id } => write!(f, "video {}", video_id),
            ParentRef::GroupMessage { group_id } => write!(f, "group {}", group_id),
        }
    }
}

/// Where an upload goes, with the clip's measured duration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTarget {
    parent: ParentRef,
    duration_secs: f64,
}

impl UploadTarget {
    pub fn new(parent: ParentRef, duration_secs: f64) -> Self {
        Self {
            parent,
            duration_secs,
        }
    }

    pub fn parent(&self) -> &ParentRef {
        &self.parent
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    /// Value of the `duration` form field (whole seconds)
    pub fn duration_field(&self) -> String {
        let secs = if self.duration_secs.is_finite() && self.duration_secs > 0.0 {
            self.duration_secs.round() as u64
        } else {
            0
        };
        secs.to_string()
    }
}

/// Handle for following moderation of an uploaded clip
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationTicket {
    /// Opaque comment/message ID returned by the upload
    pub id: String,
    pub kind: ParentKind,
}

impl fmt::Display for ModerationTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind.status_collection(), self.id)
    }
}

/// Status reported by the status endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStatus {
    Pending,
    Approved,
    Flagged,
}

/// Terminal moderation outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Approved,
    Flagged,
}

impl ModerationStatus {
    pub fn verdict(&self) -> Option<Verdict> {
        match self {
            ModerationStatus::Pending => None,
            ModerationStatus::Approved => Some(Verdict::Approved),
            ModerationStatus::Flagged => Some(Verdict::Flagged),
        }
    }
}

/// How a poll ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum PollOutcome {
    /// A terminal verdict was observed
    Verdict { verdict: Verdict },
    /// The item no longer exists
    Gone,
    /// The ceiling elapsed; the item stays pending
    TimedOut,
    /// The owning surface went away
    Cancelled,
}

/// Notifications for views that depend on the moderated item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationEvent {
    /// Refresh: the item reached a verdict
    VerdictReached {
        ticket: ModerationTicket,
        verdict: Verdict,
    },
    /// Resync: the item was deleted out-of-band
    TargetGone { ticket: ModerationTicket },
}
