use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use tessera_types::models::{DigestLogEntry, UnreadSummary};

use crate::is_constraint_violation;
use crate::models::{opt_uuid_at, uuid_at};

/// Was a digest logged for this user after `since`?
pub fn sent_since(conn: &Connection, user_id: Uuid, since: DateTime<Utc>) -> Result<bool> {
    let found: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM digest_email_log WHERE user_id = ?1 AND sent_at > ?2)",
        params![user_id.to_string(), since],
        |r| r.get(0),
    )?;
    Ok(found)
}

/// Unread messages per Accepted conversation, oldest first. Messages from
/// users the reader blocked are not reported.
pub fn unread_summaries(conn: &Connection, user_id: Uuid) -> Result<Vec<UnreadSummary>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, m.sender_id, COUNT(m.id), MIN(m.sent_at), c.listing_id, c.puzzle_id
         FROM chat_messages m
         JOIN conversations c ON c.id = m.conversation_id
         WHERE (c.initiator_id = ?1 OR c.recipient_id = ?1)
           AND c.status = 'accepted'
           AND m.sender_id <> ?1
           AND m.read_at IS NULL
           AND NOT EXISTS (
               SELECT 1 FROM user_blocks ub
               WHERE ub.blocker_id = ?1 AND ub.blocked_id = m.sender_id
           )
         GROUP BY c.id, m.sender_id, c.listing_id, c.puzzle_id
         ORDER BY MIN(m.sent_at) ASC",
    )?;

    let rows = stmt
        .query_map([user_id.to_string()], |row| {
            let count: i64 = row.get(2)?;
            Ok(UnreadSummary {
                conversation_id: uuid_at(row, 0)?,
                sender_id: uuid_at(row, 1)?,
                unread_count: count as u64,
                oldest_unread_at: row.get(3)?,
                listing_id: opt_uuid_at(row, 4)?,
                puzzle_id: opt_uuid_at(row, 5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Count and oldest creation time of Pending requests addressed to the user,
/// ignoring requests from users they blocked.
pub fn pending_requests(conn: &Connection, user_id: Uuid) -> Result<(u64, Option<DateTime<Utc>>)> {
    let (count, oldest): (i64, Option<DateTime<Utc>>) = conn.query_row(
        "SELECT COUNT(c.id), MIN(c.created_at)
         FROM conversations c
         WHERE c.recipient_id = ?1
           AND c.status = 'pending'
           AND NOT EXISTS (
               SELECT 1 FROM user_blocks ub
               WHERE ub.blocker_id = ?1 AND ub.blocked_id = c.initiator_id
           )",
        [user_id.to_string()],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    Ok((count as u64, oldest))
}

/// Write a log row. Returns `false` if the (user, bucket) slot is taken.
pub fn insert_log(conn: &Connection, entry: &DigestLogEntry, throttle_bucket: i64) -> Result<bool> {
    let result = conn.execute(
        "INSERT INTO digest_email_log
            (id, user_id, sent_at, throttle_bucket, oldest_unread_message_at, oldest_pending_request_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.id.to_string(),
            entry.user_id.to_string(),
            entry.sent_at,
            throttle_bucket,
            entry.oldest_unread_message_at,
            entry.oldest_pending_request_at,
        ],
    );

    match result {
        Ok(_) => Ok(true),
        Err(e) if is_constraint_violation(&e) => Ok(false),
        Err(e) => Err(e).context("writing digest log"),
    }
}

/// Release a claimed log row after the email could not be sent.
pub fn delete_log(conn: &Connection, id: Uuid) -> Result<()> {
    conn.execute("DELETE FROM digest_email_log WHERE id = ?1", [id.to_string()])?;
    Ok(())
}

pub fn logs_for_user(conn: &Connection, user_id: Uuid) -> Result<Vec<DigestLogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, sent_at, oldest_unread_message_at, oldest_pending_request_at
         FROM digest_email_log
         WHERE user_id = ?1
         ORDER BY sent_at DESC",
    )?;

    let rows = stmt
        .query_map([user_id.to_string()], |row| {
            Ok(DigestLogEntry {
                id: uuid_at(row, 0)?,
                user_id: uuid_at(row, 1)?,
                sent_at: row.get(2)?,
                oldest_unread_message_at: row.get(3)?,
                oldest_pending_request_at: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Users with something to report: unread Accepted messages or Pending
/// requests. Longest-waiting first. Broad on purpose; `is_due` applies the
/// per-user filters.
pub fn candidates(conn: &Connection) -> Result<Vec<Uuid>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM (
             SELECT CASE WHEN m.sender_id = c.initiator_id THEN c.recipient_id ELSE c.initiator_id END AS user_id,
                    m.sent_at AS waiting_since
             FROM chat_messages m
             JOIN conversations c ON c.id = m.conversation_id
             WHERE c.status = 'accepted' AND m.read_at IS NULL
             UNION ALL
             SELECT c.recipient_id AS user_id, c.created_at AS waiting_since
             FROM conversations c
             WHERE c.status = 'pending'
         )
         GROUP BY user_id
         ORDER BY MIN(waiting_since) ASC",
    )?;

    let rows = stmt
        .query_map([], |row| uuid_at(row, 0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Whether a batch run should email this user: something older than
/// `cutoff` is still unread (or pending), and it is newer than anything a
/// previous digest already covered. Blocked senders do not count.
pub fn is_due(conn: &Connection, user_id: Uuid, cutoff: DateTime<Utc>) -> Result<bool> {
    let (oldest_unread, oldest_pending): (Option<DateTime<Utc>>, Option<DateTime<Utc>>) = conn
        .query_row(
            "SELECT
                 (SELECT MIN(m.sent_at)
                  FROM chat_messages m
                  JOIN conversations c ON c.id = m.conversation_id
                  WHERE (c.initiator_id = ?1 OR c.recipient_id = ?1)
                    AND c.status = 'accepted'
                    AND m.sender_id <> ?1
                    AND m.read_at IS NULL
                    AND m.sent_at < ?2
                    AND NOT EXISTS (
                        SELECT 1 FROM user_blocks ub
                        WHERE ub.blocker_id = ?1 AND ub.blocked_id = m.sender_id
                    )),
                 (SELECT MIN(c.created_at)
                  FROM conversations c
                  WHERE c.recipient_id = ?1
                    AND c.status = 'pending'
                    AND c.created_at < ?2
                    AND NOT EXISTS (
                        SELECT 1 FROM user_blocks ub
                        WHERE ub.blocker_id = ?1 AND ub.blocked_id = c.initiator_id
                    ))",
            params![user_id.to_string(), cutoff],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .context("finding oldest unread items")?;

    let (covered_unread, covered_pending): (Option<DateTime<Utc>>, Option<DateTime<Utc>>) = conn
        .query_row(
            "SELECT MAX(oldest_unread_message_at), MAX(oldest_pending_request_at)
             FROM digest_email_log
             WHERE user_id = ?1",
            [user_id.to_string()],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;

    Ok(not_yet_covered(oldest_unread, covered_unread)
        || not_yet_covered(oldest_pending, covered_pending))
}

fn not_yet_covered(oldest: Option<DateTime<Utc>>, covered: Option<DateTime<Utc>>) -> bool {
    match (oldest, covered) {
        (Some(oldest), Some(covered)) => oldest > covered,
        (Some(_), None) => true,
        (None, _) => false,
    }
}
