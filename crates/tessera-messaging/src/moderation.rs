//! Admin actions against users and listings.
//!
//! Enforcement state (mute expiry, marketplace ban, listing visibility) lives
//! with the external user directory and listing catalog; this service writes
//! through them and then appends an entry to the audit log. The two writes
//! cannot share a transaction, so the directory write goes first: a failed
//! audit append leaves the action applied but unlogged, never logged but
//! not applied.

use chrono::{DateTime, Duration, Utc};
use tracing::info;
use uuid::Uuid;

use tessera_db::{moderation, reports};
use tessera_types::MessagingError;
use tessera_types::api::{ModerateUser, MuteUser, RemoveListing};
use tessera_types::models::{ModerationAction, ModerationActionType};

use crate::context::SharedContext;

pub struct ModerationService {
    ctx: SharedContext,
}

struct Audit {
    target_user_id: Uuid,
    admin_id: Uuid,
    action_type: ModerationActionType,
    report_id: Option<Uuid>,
    reason: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl ModerationService {
    pub fn new(ctx: SharedContext) -> Self {
        Self { ctx }
    }

    /// Mute a user for `days` whole days from now. An expiry past the end of
    /// the calendar is rejected like a zero-day mute.
    pub fn mute_user(&self, cmd: MuteUser) -> Result<ModerationAction, MessagingError> {
        if cmd.days == 0 {
            return Err(MessagingError::InvalidMuteDuration);
        }
        self.ctx.user(cmd.target_id)?;
        self.check_report(cmd.report_id)?;

        let until = Duration::try_days(i64::from(cmd.days))
            .and_then(|d| self.ctx.now().checked_add_signed(d))
            .ok_or(MessagingError::InvalidMuteDuration)?;
        self.ctx.users.set_messaging_muted_until(cmd.target_id, Some(until))?;

        self.append(Audit {
            target_user_id: cmd.target_id,
            admin_id: cmd.admin_id,
            action_type: ModerationActionType::TemporaryMute,
            report_id: cmd.report_id,
            reason: cmd.reason,
            expires_at: Some(until),
        })
    }

    pub fn unmute_user(&self, cmd: ModerateUser) -> Result<ModerationAction, MessagingError> {
        self.ctx.user(cmd.target_id)?;
        self.check_report(cmd.report_id)?;

        self.ctx.users.set_messaging_muted_until(cmd.target_id, None)?;
        self.append(Audit::for_user(cmd, ModerationActionType::MuteLifted))
    }

    /// Record a warning. No enforcement attached.
    pub fn warn_user(&self, cmd: ModerateUser) -> Result<ModerationAction, MessagingError> {
        self.ctx.user(cmd.target_id)?;
        self.check_report(cmd.report_id)?;

        self.append(Audit::for_user(cmd, ModerationActionType::Warning))
    }

    pub fn ban_from_marketplace(&self, cmd: ModerateUser) -> Result<ModerationAction, MessagingError> {
        self.ctx.user(cmd.target_id)?;
        self.check_report(cmd.report_id)?;

        self.ctx.users.set_marketplace_banned(cmd.target_id, true)?;
        self.append(Audit::for_user(cmd, ModerationActionType::MarketplaceBan))
    }

    pub fn lift_marketplace_ban(&self, cmd: ModerateUser) -> Result<ModerationAction, MessagingError> {
        self.ctx.user(cmd.target_id)?;
        self.check_report(cmd.report_id)?;

        self.ctx.users.set_marketplace_banned(cmd.target_id, false)?;
        self.append(Audit::for_user(cmd, ModerationActionType::BanLifted))
    }

    /// Take a listing down. The audit entry targets the seller.
    pub fn remove_listing(&self, cmd: RemoveListing) -> Result<ModerationAction, MessagingError> {
        let listing = self.ctx.listing(cmd.listing_id)?;
        self.check_report(cmd.report_id)?;

        self.ctx.listings.remove(listing.id)?;
        info!(listing_id = %listing.id, seller_id = %listing.seller_id, "Listing removed");

        self.append(Audit {
            target_user_id: listing.seller_id,
            admin_id: cmd.admin_id,
            action_type: ModerationActionType::ListingRemoved,
            report_id: cmd.report_id,
            reason: cmd.reason,
            expires_at: None,
        })
    }

    /// Audit history for one user, newest first.
    pub fn history(&self, user_id: Uuid) -> Result<Vec<ModerationAction>, MessagingError> {
        Ok(self
            .ctx
            .db
            .with_conn(|conn| moderation::list_for_user(conn, user_id))?)
    }

    fn check_report(&self, report_id: Option<Uuid>) -> Result<(), MessagingError> {
        let Some(report_id) = report_id else {
            return Ok(());
        };
        self.ctx
            .db
            .with_conn(|conn| reports::get(conn, report_id))?
            .map(|_| ())
            .ok_or(MessagingError::ConversationReportNotFound)
    }

    fn append(&self, audit: Audit) -> Result<ModerationAction, MessagingError> {
        let action = ModerationAction {
            id: Uuid::now_v7(),
            target_user_id: audit.target_user_id,
            admin_id: audit.admin_id,
            action_type: audit.action_type,
            performed_at: self.ctx.now(),
            report_id: audit.report_id,
            reason: audit.reason,
            expires_at: audit.expires_at,
        };
        self.ctx
            .db
            .with_conn(|conn| moderation::append(conn, &action))?;

        info!(
            action = action.action_type.as_str(),
            target_user_id = %action.target_user_id,
            admin_id = %action.admin_id,
            report_id = ?action.report_id,
            "Moderation action recorded"
        );
        Ok(action)
    }
}

impl Audit {
    fn for_user(cmd: ModerateUser, action_type: ModerationActionType) -> Self {
        Self {
            target_user_id: cmd.target_id,
            admin_id: cmd.admin_id,
            action_type,
            report_id: cmd.report_id,
            reason: cmd.reason,
            expires_at: None,
        }
    }
}
