use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use uuid::Uuid;

use tessera_types::models::ModerationAction;

use crate::models::{enum_at, opt_text, opt_uuid_at, uuid_at};

/// Append an action to the audit log. The table refuses updates and deletes.
pub fn append(conn: &Connection, action: &ModerationAction) -> Result<()> {
    conn.execute(
        "INSERT INTO moderation_actions
            (id, target_user_id, admin_id, action_type, performed_at, report_id, reason, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            action.id.to_string(),
            action.target_user_id.to_string(),
            action.admin_id.to_string(),
            action.action_type.as_str(),
            action.performed_at,
            opt_text(action.report_id),
            action.reason,
            action.expires_at,
        ],
    )
    .context("appending moderation action")?;
    Ok(())
}

/// Audit history for one user, newest first.
pub fn list_for_user(conn: &Connection, user_id: Uuid) -> Result<Vec<ModerationAction>> {
    let mut stmt = conn.prepare(
        "SELECT id, target_user_id, admin_id, action_type, performed_at, report_id, reason, expires_at
         FROM moderation_actions
         WHERE target_user_id = ?1
         ORDER BY performed_at DESC, id DESC",
    )?;

    let rows = stmt
        .query_map([user_id.to_string()], |row| {
            Ok(ModerationAction {
                id: uuid_at(row, 0)?,
                target_user_id: uuid_at(row, 1)?,
                admin_id: uuid_at(row, 2)?,
                action_type: enum_at(row, 3)?,
                performed_at: row.get(4)?,
                report_id: opt_uuid_at(row, 5)?,
                reason: row.get(6)?,
                expires_at: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}
