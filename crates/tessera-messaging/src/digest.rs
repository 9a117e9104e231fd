//! Throttled "you have unread messages" emails.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tessera_db::digest;
use tessera_types::MessagingError;
use tessera_types::api::{DigestEmail, DigestOutcome, DigestRunSummary};
use tessera_types::models::{DigestLogEntry, UnreadSummary};

use crate::context::SharedContext;
use crate::mailer::{Mailer, OutboundEmail};

enum Claim {
    Throttled,
    NothingToReport,
    Claimed {
        entry: DigestLogEntry,
        summaries: Vec<UnreadSummary>,
        pending_request_count: u64,
    },
}

pub struct DigestBatcher {
    ctx: SharedContext,
    mailer: Arc<dyn Mailer>,
}

impl DigestBatcher {
    pub fn new(ctx: SharedContext, mailer: Arc<dyn Mailer>) -> Self {
        Self { ctx, mailer }
    }

    /// Send one digest to `user_id` unless a skip rule applies.
    ///
    /// The cool-down check and the log row are written in one IMMEDIATE
    /// transaction before the mailer is called, so two overlapping runs
    /// cannot both send. A mailer failure releases the claimed row.
    pub fn prepare_for_user(&self, user_id: Uuid) -> Result<DigestOutcome, MessagingError> {
        let user = self.ctx.user(user_id)?;
        let Some(to) = user.email.clone().filter(|e| !e.trim().is_empty()) else {
            return Ok(DigestOutcome::SkippedNoEmail);
        };
        if !user.email_notifications_enabled {
            return Ok(DigestOutcome::SkippedDisabled);
        }

        let now = self.ctx.now();
        let cooldown = user.email_notification_frequency.cooldown();

        let claim = self.ctx.db.with_tx(|conn| -> Result<_, MessagingError> {
            if digest::sent_since(conn, user.id, now - cooldown)? {
                return Ok(Claim::Throttled);
            }

            let summaries = digest::unread_summaries(conn, user.id)?;
            let (pending_request_count, oldest_pending) = digest::pending_requests(conn, user.id)?;
            if summaries.is_empty() && pending_request_count == 0 {
                return Ok(Claim::NothingToReport);
            }

            let entry = DigestLogEntry {
                id: Uuid::now_v7(),
                user_id: user.id,
                sent_at: now,
                oldest_unread_message_at: summaries.iter().map(|s| s.oldest_unread_at).min(),
                oldest_pending_request_at: oldest_pending,
            };
            if !digest::insert_log(conn, &entry, throttle_bucket(now, cooldown))? {
                return Ok(Claim::Throttled);
            }

            Ok(Claim::Claimed {
                entry,
                summaries,
                pending_request_count,
            })
        })?;

        let (entry, summaries, pending_request_count) = match claim {
            Claim::Throttled => {
                debug!(user_id = %user.id, "Digest throttled");
                return Ok(DigestOutcome::SkippedThrottled);
            }
            Claim::NothingToReport => return Ok(DigestOutcome::SkippedNothingToReport),
            Claim::Claimed {
                entry,
                summaries,
                pending_request_count,
            } => (entry, summaries, pending_request_count),
        };

        let conversations = summaries.len();
        let email = OutboundEmail::UnreadDigest(DigestEmail {
            user_id: user.id,
            to,
            recipient_name: user.name.clone(),
            locale: user.locale.clone().unwrap_or_else(|| "en".to_string()),
            summaries,
            pending_request_count,
        });

        if let Err(e) = self.mailer.send(&email) {
            warn!(user_id = %user.id, "Digest delivery failed, releasing claim: {:#}", e);
            if let Err(release) = self.ctx.db.with_conn(|conn| digest::delete_log(conn, entry.id)) {
                // The leftover row throttles this user until the window ends
                error!(
                    user_id = %user.id,
                    log_id = %entry.id,
                    "Failed to release digest claim: {:#}",
                    release
                );
            }
            return Err(MessagingError::Delivery(e));
        }

        info!(
            user_id = %user.id,
            conversations,
            pending_requests = pending_request_count,
            "Digest sent"
        );
        Ok(DigestOutcome::Sent)
    }

    /// One pass over everyone with something to report, sending at most
    /// `limit` digests. A user only qualifies once an unread message or
    /// pending request has waited a full cool-down window and is newer than
    /// what their last digest covered. Accounts sharing an email address get
    /// one digest per run.
    pub fn run_batch(&self, limit: usize) -> Result<DigestRunSummary, MessagingError> {
        let candidates = self.ctx.db.with_conn(digest::candidates)?;
        let mut summary = DigestRunSummary {
            candidates: candidates.len(),
            ..Default::default()
        };
        let mut seen_emails = HashSet::new();

        for user_id in candidates {
            if summary.sent >= limit {
                break;
            }

            let user = match self.ctx.users.get(user_id) {
                Ok(Some(user)) => user,
                Ok(None) => continue,
                Err(e) => {
                    warn!(user_id = %user_id, "Digest candidate lookup failed: {:#}", e);
                    summary.failed += 1;
                    continue;
                }
            };
            let Some(email) = user.email.as_deref() else {
                continue;
            };
            if !user.email_notifications_enabled {
                continue;
            }

            let cutoff = self.ctx.now() - user.email_notification_frequency.cooldown();
            match self.ctx.db.with_conn(|conn| digest::is_due(conn, user_id, cutoff)) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(user_id = %user_id, "Nothing new past the grace period");
                    continue;
                }
                Err(e) => {
                    warn!(user_id = %user_id, "Digest due check failed: {:#}", e);
                    summary.failed += 1;
                    continue;
                }
            }
            if !seen_emails.insert(email.trim().to_lowercase()) {
                debug!(user_id = %user_id, "Email already covered in this batch");
                continue;
            }

            summary.attempted += 1;
            match self.prepare_for_user(user_id) {
                Ok(DigestOutcome::Sent) => summary.sent += 1,
                Ok(_) => {}
                Err(e) => {
                    error!(user_id = %user_id, "Digest failed: {}", e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            candidates = summary.candidates,
            attempted = summary.attempted,
            sent = summary.sent,
            failed = summary.failed,
            "Digest batch finished"
        );
        Ok(summary)
    }

    /// Digest log for one user, newest first.
    pub fn history(&self, user_id: Uuid) -> Result<Vec<DigestLogEntry>, MessagingError> {
        Ok(self
            .ctx
            .db
            .with_conn(|conn| digest::logs_for_user(conn, user_id))?)
    }
}

/// Cool-down window index. Unique per user in the log, which backs up the
/// `sent_since` check when two processes share the database.
fn throttle_bucket(now: DateTime<Utc>, cooldown: Duration) -> i64 {
    now.timestamp().div_euclid(cooldown.num_seconds().max(1))
}
