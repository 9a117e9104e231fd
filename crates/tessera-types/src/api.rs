use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ReportResolution, UnreadSummary};

// -- Conversations --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartConversation {
    pub initiator_id: Uuid,
    pub recipient_id: Uuid,
    /// Anchors the thread to a marketplace listing.
    #[serde(default)]
    pub listing_id: Option<Uuid>,
    pub initial_message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessage {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
}

/// What StartConversation ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartDisposition {
    /// A new Pending request was created.
    RequestCreated,
    /// A new Accepted thread was created for a listing.
    ListingThreadCreated,
    /// An existing Accepted thread received the message instead.
    ExistingThreadReused,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartOutcome {
    pub conversation_id: Uuid,
    pub message_id: Uuid,
    pub disposition: StartDisposition,
}

// -- Moderation --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MuteUser {
    pub target_id: Uuid,
    pub admin_id: Uuid,
    pub days: u32,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub report_id: Option<Uuid>,
}

/// Shared input for warn, ban and lift-ban.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModerateUser {
    pub target_id: Uuid,
    pub admin_id: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub report_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoveListing {
    pub listing_id: Uuid,
    pub admin_id: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub report_id: Option<Uuid>,
}

// -- Reports --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportConversation {
    pub conversation_id: Uuid,
    pub reporter_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolveReport {
    pub report_id: Uuid,
    pub admin_id: Uuid,
    pub resolution: ReportResolution,
    #[serde(default)]
    pub note: Option<String>,
}

// -- Digest --

/// Everything a mail template needs to render the unread digest.
#[derive(Debug, Clone, Serialize)]
pub struct DigestEmail {
    pub user_id: Uuid,
    pub to: String,
    pub recipient_name: Option<String>,
    pub locale: String,
    pub summaries: Vec<UnreadSummary>,
    pub pending_request_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestOutcome {
    Sent,
    SkippedNoEmail,
    SkippedDisabled,
    SkippedThrottled,
    SkippedNothingToReport,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DigestRunSummary {
    pub candidates: usize,
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
}
