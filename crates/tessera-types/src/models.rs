use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MessagingError, UnknownVariant};

/// Hard cap on stored message length, in Unicode scalar values.
pub const MAX_MESSAGE_CHARS: usize = 2000;

// -- Users --

/// How often a user may receive an unread-messages digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NotificationFrequency {
    #[serde(rename = "6_hours")]
    SixHours,
    #[serde(rename = "12_hours")]
    TwelveHours,
    #[default]
    #[serde(rename = "24_hours")]
    TwentyFourHours,
    #[serde(rename = "48_hours")]
    FortyEightHours,
    #[serde(rename = "1_week")]
    OneWeek,
}

impl NotificationFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SixHours => "6_hours",
            Self::TwelveHours => "12_hours",
            Self::TwentyFourHours => "24_hours",
            Self::FortyEightHours => "48_hours",
            Self::OneWeek => "1_week",
        }
    }

    /// Minimum gap between two digests for a user with this setting.
    pub fn cooldown(&self) -> Duration {
        match self {
            Self::SixHours => Duration::hours(6),
            Self::TwelveHours => Duration::hours(12),
            Self::TwentyFourHours => Duration::hours(24),
            Self::FortyEightHours => Duration::hours(48),
            Self::OneWeek => Duration::days(7),
        }
    }
}

impl FromStr for NotificationFrequency {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "6_hours" => Ok(Self::SixHours),
            "12_hours" => Ok(Self::TwelveHours),
            "24_hours" => Ok(Self::TwentyFourHours),
            "48_hours" => Ok(Self::FortyEightHours),
            "1_week" => Ok(Self::OneWeek),
            other => Err(UnknownVariant::new("notification frequency", other)),
        }
    }
}

/// A user record as seen through the user directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub locale: Option<String>,
    pub allow_direct_messages: bool,
    pub email_notifications_enabled: bool,
    pub email_notification_frequency: NotificationFrequency,
    pub messaging_muted_until: Option<DateTime<Utc>>,
    pub marketplace_banned: bool,
}

impl User {
    /// A user with default settings: DMs allowed, digests daily, no email.
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            name: None,
            email: None,
            locale: None,
            allow_direct_messages: true,
            email_notifications_enabled: true,
            email_notification_frequency: NotificationFrequency::default(),
            messaging_muted_until: None,
            marketplace_banned: false,
        }
    }

    /// Muted means an expiry is set and still in the future.
    pub fn is_messaging_muted(&self, now: DateTime<Utc>) -> bool {
        self.messaging_muted_until.is_some_and(|until| until > now)
    }
}

/// Marketplace listing reference. Display context only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub puzzle_id: Option<Uuid>,
}

// -- Conversations --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Pending,
    Accepted,
    Ignored,
    Denied,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Ignored => "ignored",
            Self::Denied => "denied",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Only Pending may move, and only into one of the three responses.
    pub fn can_transition_to(&self, next: ConversationStatus) -> bool {
        matches!(self, Self::Pending) && next.is_terminal()
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "ignored" => Ok(Self::Ignored),
            "denied" => Ok(Self::Denied),
            other => Err(UnknownVariant::new("conversation status", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub initiator_id: Uuid,
    pub recipient_id: Uuid,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub listing_id: Option<Uuid>,
    pub puzzle_id: Option<Uuid>,
}

impl Conversation {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.initiator_id == user_id || self.recipient_id == user_id
    }

    pub fn other_participant(&self, user_id: Uuid) -> Option<Uuid> {
        if user_id == self.initiator_id {
            Some(self.recipient_id)
        } else if user_id == self.recipient_id {
            Some(self.initiator_id)
        } else {
            None
        }
    }

    /// Accepted threads are open to both sides. Until then only the
    /// initiator may keep writing; the recipient has to accept first.
    pub fn may_send(&self, sender_id: Uuid) -> bool {
        match self.status {
            ConversationStatus::Accepted => self.is_participant(sender_id),
            ConversationStatus::Pending | ConversationStatus::Ignored => {
                sender_id == self.initiator_id
            }
            ConversationStatus::Denied => false,
        }
    }

    /// Apply the recipient's response to a pending request.
    pub fn respond(
        &mut self,
        actor_id: Uuid,
        next: ConversationStatus,
        now: DateTime<Utc>,
    ) -> Result<(), MessagingError> {
        if actor_id != self.recipient_id || !self.status.can_transition_to(next) {
            return Err(MessagingError::ConversationNotFound);
        }

        self.status = next;
        self.responded_at = Some(now);
        Ok(())
    }

    pub fn pair(&self) -> (Uuid, Uuid) {
        ordered_pair(self.initiator_id, self.recipient_id)
    }
}

/// Direction-agnostic key for a pair of users.
pub fn ordered_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b { (a, b) } else { (b, a) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

/// Position in a newest-first message page. Messages sharing a `sent_at`
/// are ordered by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCursor {
    pub sent_at: DateTime<Utc>,
    pub id: Uuid,
}

impl From<&ChatMessage> for MessageCursor {
    fn from(m: &ChatMessage) -> Self {
        Self {
            sent_at: m.sent_at,
            id: m.id,
        }
    }
}

/// Cut `content` down to its first `max_chars` characters. Longer input is
/// never an error.
pub fn clamp_content(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => content[..byte_idx].to_string(),
        None => content.to_string(),
    }
}

/// Conversation row plus the viewer-specific bits a list screen needs.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationOverview {
    pub conversation: Conversation,
    pub other_user_id: Uuid,
    pub unread_count: u64,
    pub last_message: Option<ChatMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationFilter {
    /// Accepted threads plus the viewer's own outgoing requests.
    Inbox,
    /// Pending requests waiting on the viewer.
    Requests,
    /// Requests the viewer chose to ignore.
    Ignored,
}

// -- Blocks --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBlock {
    pub blocker_id: Uuid,
    pub blocked_id: Uuid,
    pub blocked_at: DateTime<Utc>,
}

// -- Reports --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Resolved,
    Dismissed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Dismissed => "dismissed",
        }
    }
}

impl FromStr for ReportStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "resolved" => Ok(Self::Resolved),
            "dismissed" => Ok(Self::Dismissed),
            other => Err(UnknownVariant::new("report status", other)),
        }
    }
}

/// What an admin decided about a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportResolution {
    Resolved,
    Dismissed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationReport {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub reporter_id: Uuid,
    pub reason: String,
    pub status: ReportStatus,
    pub reported_at: DateTime<Utc>,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub admin_note: Option<String>,
}

impl ConversationReport {
    pub fn resolve(&mut self, admin_id: Uuid, note: Option<String>, now: DateTime<Utc>) {
        self.close(ReportStatus::Resolved, admin_id, note, now);
    }

    pub fn dismiss(&mut self, admin_id: Uuid, note: Option<String>, now: DateTime<Utc>) {
        self.close(ReportStatus::Dismissed, admin_id, note, now);
    }

    fn close(&mut self, status: ReportStatus, admin_id: Uuid, note: Option<String>, now: DateTime<Utc>) {
        self.status = status;
        self.resolved_by = Some(admin_id);
        self.resolved_at = Some(now);
        self.admin_note = note;
    }
}

// -- Moderation --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationActionType {
    Warning,
    TemporaryMute,
    MuteLifted,
    MarketplaceBan,
    BanLifted,
    ListingRemoved,
}

impl ModerationActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::TemporaryMute => "temporary_mute",
            Self::MuteLifted => "mute_lifted",
            Self::MarketplaceBan => "marketplace_ban",
            Self::BanLifted => "ban_lifted",
            Self::ListingRemoved => "listing_removed",
        }
    }
}

impl FromStr for ModerationActionType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warning" => Ok(Self::Warning),
            "temporary_mute" => Ok(Self::TemporaryMute),
            "mute_lifted" => Ok(Self::MuteLifted),
            "marketplace_ban" => Ok(Self::MarketplaceBan),
            "ban_lifted" => Ok(Self::BanLifted),
            "listing_removed" => Ok(Self::ListingRemoved),
            other => Err(UnknownVariant::new("moderation action", other)),
        }
    }
}

/// Append-only audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationAction {
    pub id: Uuid,
    pub target_user_id: Uuid,
    pub admin_id: Uuid,
    pub action_type: ModerationActionType,
    pub performed_at: DateTime<Utc>,
    pub report_id: Option<Uuid>,
    pub reason: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

// -- Digest --

/// One row per digest actually sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestLogEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub sent_at: DateTime<Utc>,
    pub oldest_unread_message_at: Option<DateTime<Utc>>,
    pub oldest_pending_request_at: Option<DateTime<Utc>>,
}

/// Unread messages in one conversation, from the reader's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadSummary {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub unread_count: u64,
    pub oldest_unread_at: DateTime<Utc>,
    pub listing_id: Option<Uuid>,
    pub puzzle_id: Option<Uuid>,
}
