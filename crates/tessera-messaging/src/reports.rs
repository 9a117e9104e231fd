use tracing::{debug, info};
use uuid::Uuid;

use tessera_db::{conversations, reports};
use tessera_types::MessagingError;
use tessera_types::api::{ReportConversation, ResolveReport};
use tessera_types::models::{ConversationReport, ReportResolution, ReportStatus};

use crate::context::SharedContext;

pub struct ReportService {
    ctx: SharedContext,
}

impl ReportService {
    pub fn new(ctx: SharedContext) -> Self {
        Self { ctx }
    }

    /// File an abuse report. Only participants may report a conversation.
    pub fn report_conversation(&self, cmd: ReportConversation) -> Result<ConversationReport, MessagingError> {
        let now = self.ctx.now();
        let report = self.ctx.db.with_tx(|conn| -> Result<_, MessagingError> {
            let conversation = conversations::get(conn, cmd.conversation_id)?
                .filter(|c| c.is_participant(cmd.reporter_id))
                .ok_or(MessagingError::ConversationNotFound)?;

            let report = ConversationReport {
                id: Uuid::now_v7(),
                conversation_id: conversation.id,
                reporter_id: cmd.reporter_id,
                reason: cmd.reason.trim().to_string(),
                status: ReportStatus::Pending,
                reported_at: now,
                resolved_by: None,
                resolved_at: None,
                admin_note: None,
            };
            reports::insert(conn, &report)?;
            Ok(report)
        })?;

        info!(
            report_id = %report.id,
            conversation_id = %report.conversation_id,
            reporter_id = %report.reporter_id,
            "Conversation reported"
        );
        Ok(report)
    }

    /// Close a report. Closing an already closed report overwrites the
    /// previous decision.
    pub fn resolve_report(&self, cmd: ResolveReport) -> Result<ConversationReport, MessagingError> {
        let now = self.ctx.now();
        let report = self.ctx.db.with_tx(|conn| -> Result<_, MessagingError> {
            let mut report =
                reports::get(conn, cmd.report_id)?.ok_or(MessagingError::ConversationReportNotFound)?;
            if report.status != ReportStatus::Pending {
                debug!(report_id = %report.id, previous = report.status.as_str(), "Re-resolving report");
            }

            match cmd.resolution {
                ReportResolution::Resolved => report.resolve(cmd.admin_id, cmd.note, now),
                ReportResolution::Dismissed => report.dismiss(cmd.admin_id, cmd.note, now),
            }
            reports::save_resolution(conn, &report)?;
            Ok(report)
        })?;

        info!(
            report_id = %report.id,
            admin_id = %cmd.admin_id,
            status = report.status.as_str(),
            "Report closed"
        );
        Ok(report)
    }

    /// Open reports, oldest first.
    pub fn pending(&self) -> Result<Vec<ConversationReport>, MessagingError> {
        Ok(self
            .ctx
            .db
            .with_conn(|conn| reports::list_by_status(conn, ReportStatus::Pending))?)
    }

    pub fn all(&self, limit: u32, offset: u32) -> Result<Vec<ConversationReport>, MessagingError> {
        Ok(self
            .ctx
            .db
            .with_conn(|conn| reports::list_all(conn, limit, offset))?)
    }

    pub fn get(&self, report_id: Uuid) -> Result<ConversationReport, MessagingError> {
        self.ctx
            .db
            .with_conn(|conn| reports::get(conn, report_id))?
            .ok_or(MessagingError::ConversationReportNotFound)
    }
}
