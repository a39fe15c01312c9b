//! Clip upload
//!
//! Packages a clip with its target fields and publishes it in a single
//! attempt. Failed uploads are never retried here: a retry could publish
//! the same clip twice while the first copy is still pending moderation.

use super::http::{FormPart, HttpTransport};
use super::types::{ModerationTicket, ParentKind, ParentRef, UploadTarget};
use crate::recorder::Clip;
use crate::utils::error::{CaptureError, CaptureResult};
use serde::Deserialize;
use std::sync::Arc;

/// URL layout of the publish backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base_url: String,
}

impl Endpoints {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Upload endpoint for a parent entity
    pub fn upload_url(&self, parent: &ParentRef) -> String {
        let id = urlencoding::encode(parent.id());
        match parent {
            ParentRef::VideoComment { .. } => format!("{}/videos/{}/comments", self.base_url, id),
            ParentRef::GroupMessage { .. } => format!("{}/groups/{}/messages", self.base_url, id),
        }
    }

    /// Status endpoint for an uploaded item
    pub fn status_url(&self, ticket: &ModerationTicket) -> String {
        format!(
            "{}/{}/{}/status",
            self.base_url,
            ticket.kind.status_collection(),
            urlencoding::encode(&ticket.id)
        )
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: Option<serde_json::Value>,
}

fn parse_ticket(body: &[u8], kind: ParentKind) -> Option<ModerationTicket> {
    let response: UploadResponse = serde_json::from_slice(body).ok()?;
    let id = match response.id? {
        serde_json::Value::String(s) if !s.is_empty() => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some(ModerationTicket { id, kind })
}

/// Publishes clips to the upload endpoint
#[derive(Clone)]
pub struct UploadSubmitter {
    transport: Arc<dyn HttpTransport>,
    endpoints: Endpoints,
}

impl UploadSubmitter {
    pub fn new(transport: Arc<dyn HttpTransport>, endpoints: Endpoints) -> Self {
        Self {
            transport,
            endpoints,
        }
    }

    fn form(clip: &Clip, target: &UploadTarget) -> Vec<FormPart> {
        let parent = target.parent();
        vec![
            FormPart::File {
                name: "video".to_string(),
                file_name: format!("clip.{}", clip.codec().extension()),
                mime_type: clip.mime_type(),
                data: clip.data().clone(),
            },
            FormPart::text(parent.kind().id_field(), parent.id()),
            FormPart::text("duration", target.duration_field()),
        ]
    }

    /// Upload `clip` once and return the ticket for moderation polling.
    pub async fn submit(&self, clip: &Clip, target: &UploadTarget) -> CaptureResult<ModerationTicket> {
        let url = self.endpoints.upload_url(target.parent());
        tracing::info!(
            "Uploading {} byte clip to {} ({:.1}s)",
            clip.len(),
            target.parent(),
            target.duration_secs()
        );

        let response = self
            .transport
            .post_multipart(&url, Self::form(clip, target))
            .await
            .map_err(|e| {
                tracing::warn!("Upload to {} failed: {:#}", url, e);
                CaptureError::NetworkError(e.to_string())
            })?;

        if !response.is_success() {
            let body = response.body_string();
            tracing::warn!("Upload rejected with {}: {}", response.status_code, body);
            return Err(CaptureError::ServerRejected {
                status: response.status_code,
                body,
            });
        }

        let ticket = parse_ticket(&response.body, target.parent().kind()).ok_or_else(|| {
            CaptureError::ServerRejected {
                status: response.status_code,
                body: response.body_string(),
            }
        })?;

        tracing::info!("Upload accepted, moderation ticket {}", ticket);
        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_clip, FakeTransport};
    use std::time::Duration;

    fn submitter(transport: &Arc<FakeTransport>) -> UploadSubmitter {
        UploadSubmitter::new(transport.clone(), Endpoints::new("https://api.test/v1/"))
    }

    #[test]
    fn test_endpoint_layout() {
        let endpoints = Endpoints::new("https://api.test/v1/");
        assert_eq!(
            endpoints.upload_url(&ParentRef::video("abc")),
            "https://api.test/v1/videos/abc/comments"
        );
        assert_eq!(
            endpoints.upload_url(&ParentRef::group("g 1")),
            "https://api.test/v1/groups/g%201/messages"
        );

        let ticket = ModerationTicket {
            id: "m/9".to_string(),
            kind: ParentKind::GroupMessage,
        };
        assert_eq!(
            endpoints.status_url(&ticket),
            "https://api.test/v1/messages/m%2F9/status"
        );
    }

    #[tokio::test]
    async fn test_submit_sends_multipart_fields() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_upload(201, r#"{"id":"T1"}"#);

        let clip = test_clip(Duration::from_secs(10));
        let target = UploadTarget::new(ParentRef::video("vid-7"), 10.2);
        let ticket = submitter(&transport).submit(&clip, &target).await.unwrap();

        assert_eq!(ticket.id, "T1");
        assert_eq!(ticket.kind, ParentKind::VideoComment);

        let uploads = transport.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].url, "https://api.test/v1/videos/vid-7/comments");
        assert_eq!(uploads[0].text("video_id"), Some("vid-7"));
        assert_eq!(uploads[0].text("duration"), Some("10"));
        assert_eq!(uploads[0].file_len("video"), Some(clip.len()));
        assert_eq!(uploads[0].file_name("video"), Some("clip.webm"));
    }

    #[tokio::test]
    async fn test_numeric_ticket_ids() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_upload(200, r#"{"id":42}"#);

        let target = UploadTarget::new(ParentRef::group("g"), 3.0);
        let ticket = submitter(&transport)
            .submit(&test_clip(Duration::from_secs(3)), &target)
            .await
            .unwrap();
        assert_eq!(ticket.id, "42");
        assert_eq!(transport.uploads()[0].text("group_id"), Some("g"));
    }

    #[tokio::test]
    async fn test_rejection_is_surfaced_verbatim() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_upload(422, "clip too long");

        let target = UploadTarget::new(ParentRef::video("v"), 31.0);
        let result = submitter(&transport)
            .submit(&test_clip(Duration::from_secs(30)), &target)
            .await;

        match result {
            Err(CaptureError::ServerRejected { status, body }) => {
                assert_eq!(status, 422);
                assert_eq!(body, "clip too long");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_network_failure_is_not_retried() {
        let transport = Arc::new(FakeTransport::new());
        transport.fail_next_upload("connection reset");

        let target = UploadTarget::new(ParentRef::video("v"), 2.0);
        let result = submitter(&transport)
            .submit(&test_clip(Duration::from_secs(2)), &target)
            .await;

        assert!(matches!(result, Err(CaptureError::NetworkError(_))));
        assert_eq!(transport.uploads().len(), 1);
    }

    #[tokio::test]
    async fn test_success_without_id_is_rejected() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_upload(200, r#"{"ok":true}"#);

        let target = UploadTarget::new(ParentRef::video("v"), 2.0);
        let result = submitter(&transport)
            .submit(&test_clip(Duration::from_secs(2)), &target)
            .await;
        assert!(matches!(
            result,
            Err(CaptureError::ServerRejected { status: 200, .. })
        ));
    }
}
