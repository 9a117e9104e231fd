use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use tessera_types::models::{ConversationReport, ReportStatus};

use crate::models::{enum_at, opt_text, opt_uuid_at, uuid_at};

const COLUMNS: &str = "id, conversation_id, reporter_id, reason, status, reported_at, \
                       resolved_by, resolved_at, admin_note";

fn map_report(row: &Row<'_>) -> rusqlite::Result<ConversationReport> {
    Ok(ConversationReport {
        id: uuid_at(row, 0)?,
        conversation_id: uuid_at(row, 1)?,
        reporter_id: uuid_at(row, 2)?,
        reason: row.get(3)?,
        status: enum_at(row, 4)?,
        reported_at: row.get(5)?,
        resolved_by: opt_uuid_at(row, 6)?,
        resolved_at: row.get(7)?,
        admin_note: row.get(8)?,
    })
}

pub fn insert(conn: &Connection, r: &ConversationReport) -> Result<()> {
    conn.execute(
        "INSERT INTO conversation_reports
            (id, conversation_id, reporter_id, reason, status, reported_at, resolved_by, resolved_at, admin_note)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            r.id.to_string(),
            r.conversation_id.to_string(),
            r.reporter_id.to_string(),
            r.reason,
            r.status.as_str(),
            r.reported_at,
            opt_text(r.resolved_by),
            r.resolved_at,
            r.admin_note,
        ],
    )
    .context("inserting conversation report")?;
    Ok(())
}

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<ConversationReport>> {
    let sql = format!("SELECT {COLUMNS} FROM conversation_reports WHERE id = ?1");
    let row = conn
        .query_row(&sql, [id.to_string()], map_report)
        .optional()?;
    Ok(row)
}

/// Persist the closing fields of a report.
pub fn save_resolution(conn: &Connection, r: &ConversationReport) -> Result<()> {
    conn.execute(
        "UPDATE conversation_reports
         SET status = ?2, resolved_by = ?3, resolved_at = ?4, admin_note = ?5
         WHERE id = ?1",
        params![
            r.id.to_string(),
            r.status.as_str(),
            opt_text(r.resolved_by),
            r.resolved_at,
            r.admin_note,
        ],
    )?;
    Ok(())
}

/// Reports in `status`, oldest first (the moderation queue order).
pub fn list_by_status(conn: &Connection, status: ReportStatus) -> Result<Vec<ConversationReport>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM conversation_reports WHERE status = ?1 ORDER BY reported_at ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([status.as_str()], map_report)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// All reports, newest first.
pub fn list_all(conn: &Connection, limit: u32, offset: u32) -> Result<Vec<ConversationReport>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM conversation_reports ORDER BY reported_at DESC LIMIT ?1 OFFSET ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![limit, offset], map_report)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
