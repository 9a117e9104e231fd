use anyhow::Result;
use tracing::info;

use tessera_types::api::DigestEmail;

/// Email handed to the transport. Rendering happens on the other side.
#[derive(Debug, Clone)]
pub enum OutboundEmail {
    UnreadDigest(DigestEmail),
}

impl OutboundEmail {
    pub fn to(&self) -> &str {
        match self {
            Self::UnreadDigest(digest) => &digest.to,
        }
    }

    /// Template key the transport renders.
    pub fn template(&self) -> &'static str {
        match self {
            Self::UnreadDigest(_) => "emails/unread_messages",
        }
    }
}

pub trait Mailer: Send + Sync {
    fn send(&self, email: &OutboundEmail) -> Result<()>;
}

/// Mailer that logs instead of sending. The `tessera` binary uses it until
/// a real transport is configured.
pub struct TracingMailer;

impl Mailer for TracingMailer {
    fn send(&self, email: &OutboundEmail) -> Result<()> {
        match email {
            OutboundEmail::UnreadDigest(digest) => info!(
                to = %digest.to,
                template = email.template(),
                conversations = digest.summaries.len(),
                pending_requests = digest.pending_request_count,
                "Digest email"
            ),
        }
        Ok(())
    }
}
