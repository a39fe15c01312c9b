//! Publishing and moderation
//!
//! Uploads a recorded clip to its parent thread and follows the moderation
//! verdict for the uploaded item.

pub mod http;
pub mod poller;
pub mod types;
pub mod upload;

pub use http::{FormPart, HttpResponse, HttpTransport, ReqwestTransport};
pub use poller::{PollConfig, PollHandle, VerdictPoller};
pub use types::{
    ModerationEvent, ModerationStatus, ModerationTicket, ParentKind, ParentRef, PollOutcome,
    UploadTarget, Verdict,
};
pub use upload::{Endpoints, UploadSubmitter};
