use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use tessera_types::models::{
    ChatMessage, Conversation, ConversationFilter, ConversationOverview, ordered_pair,
};

use crate::is_constraint_violation;
use crate::models::{enum_at, opt_text, opt_uuid_at, uuid_at};

const COLUMNS: &str = "c.id, c.initiator_id, c.recipient_id, c.status, c.created_at, \
                       c.responded_at, c.last_message_at, c.listing_id, c.puzzle_id";

fn map_conversation(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: uuid_at(row, 0)?,
        initiator_id: uuid_at(row, 1)?,
        recipient_id: uuid_at(row, 2)?,
        status: enum_at(row, 3)?,
        created_at: row.get(4)?,
        responded_at: row.get(5)?,
        last_message_at: row.get(6)?,
        listing_id: opt_uuid_at(row, 7)?,
        puzzle_id: opt_uuid_at(row, 8)?,
    })
}

/// Insert a new conversation. Returns `false` when a uniqueness constraint
/// rejected it, i.e. a concurrent command already opened an equivalent thread.
pub fn insert(conn: &Connection, c: &Conversation) -> Result<bool> {
    let (low, high) = c.pair();
    let result = conn.execute(
        "INSERT INTO conversations
            (id, initiator_id, recipient_id, pair_low, pair_high, status,
             listing_id, puzzle_id, created_at, responded_at, last_message_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            c.id.to_string(),
            c.initiator_id.to_string(),
            c.recipient_id.to_string(),
            low.to_string(),
            high.to_string(),
            c.status.as_str(),
            opt_text(c.listing_id),
            opt_text(c.puzzle_id),
            c.created_at,
            c.responded_at,
            c.last_message_at,
        ],
    );

    match result {
        Ok(_) => Ok(true),
        Err(e) if is_constraint_violation(&e) => Ok(false),
        Err(e) => Err(e).context("inserting conversation"),
    }
}

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<Conversation>> {
    let sql = format!("SELECT {COLUMNS} FROM conversations c WHERE c.id = ?1");
    let row = conn
        .query_row(&sql, [id.to_string()], map_conversation)
        .optional()?;
    Ok(row)
}

/// Any Accepted thread between the two users, in either direction. A general
/// (listing-less) thread wins over listing threads.
pub fn find_accepted_between(conn: &Connection, a: Uuid, b: Uuid) -> Result<Option<Conversation>> {
    let (low, high) = ordered_pair(a, b);
    let sql = format!(
        "SELECT {COLUMNS} FROM conversations c
         WHERE c.pair_low = ?1 AND c.pair_high = ?2 AND c.status = 'accepted'
         ORDER BY (c.listing_id IS NULL) DESC, c.last_message_at DESC
         LIMIT 1"
    );
    let row = conn
        .query_row(&sql, [low.to_string(), high.to_string()], map_conversation)
        .optional()?;
    Ok(row)
}

pub fn find_accepted_for_listing(
    conn: &Connection,
    a: Uuid,
    b: Uuid,
    listing_id: Uuid,
) -> Result<Option<Conversation>> {
    let (low, high) = ordered_pair(a, b);
    let sql = format!(
        "SELECT {COLUMNS} FROM conversations c
         WHERE c.pair_low = ?1 AND c.pair_high = ?2 AND c.status = 'accepted' AND c.listing_id = ?3"
    );
    let row = conn
        .query_row(
            &sql,
            [low.to_string(), high.to_string(), listing_id.to_string()],
            map_conversation,
        )
        .optional()?;
    Ok(row)
}

/// The open request between the two users, whichever side sent it.
pub fn find_pending_between(conn: &Connection, a: Uuid, b: Uuid) -> Result<Option<Conversation>> {
    let (low, high) = ordered_pair(a, b);
    let sql = format!(
        "SELECT {COLUMNS} FROM conversations c
         WHERE c.pair_low = ?1 AND c.pair_high = ?2 AND c.status = 'pending'"
    );
    let row = conn
        .query_row(&sql, [low.to_string(), high.to_string()], map_conversation)
        .optional()?;
    Ok(row)
}

/// Persist a recipient response (status + responded_at).
pub fn save_response(conn: &Connection, c: &Conversation) -> Result<()> {
    conn.execute(
        "UPDATE conversations SET status = ?2, responded_at = ?3 WHERE id = ?1",
        params![c.id.to_string(), c.status.as_str(), c.responded_at],
    )
    .context("saving conversation response")?;
    Ok(())
}

/// Last write wins; ordering is derived from message `sent_at`.
pub fn touch_last_message(conn: &Connection, id: Uuid, at: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE conversations SET last_message_at = ?2 WHERE id = ?1",
        params![id.to_string(), at],
    )?;
    Ok(())
}

/// Number of Accepted conversations holding at least one unread message
/// from the other participant. Threads with users the reader blocked are
/// left out.
pub fn count_unread_for_user(conn: &Connection, user_id: Uuid) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT c.id)
         FROM conversations c
         JOIN chat_messages m ON m.conversation_id = c.id
         WHERE (c.initiator_id = ?1 OR c.recipient_id = ?1)
           AND c.status = 'accepted'
           AND m.sender_id <> ?1
           AND m.read_at IS NULL
           AND NOT EXISTS (
               SELECT 1 FROM user_blocks ub
               WHERE ub.blocker_id = ?1
                 AND ub.blocked_id = CASE WHEN c.initiator_id = ?1 THEN c.recipient_id ELSE c.initiator_id END
           )",
        [user_id.to_string()],
        |r| r.get(0),
    )?;
    Ok(count as u64)
}

/// Conversation list for one viewer, newest activity first.
pub fn list_for_user(
    conn: &Connection,
    user_id: Uuid,
    filter: ConversationFilter,
) -> Result<Vec<ConversationOverview>> {
    let condition = match filter {
        ConversationFilter::Inbox => {
            "(c.initiator_id = ?1 OR c.recipient_id = ?1)
             AND (c.status = 'accepted'
                  OR (c.initiator_id = ?1 AND c.status IN ('pending', 'ignored', 'denied')))"
        }
        ConversationFilter::Requests => {
            "c.recipient_id = ?1 AND c.status = 'pending'
             AND NOT EXISTS (
                 SELECT 1 FROM user_blocks ub
                 WHERE ub.blocker_id = ?1 AND ub.blocked_id = c.initiator_id
             )"
        }
        ConversationFilter::Ignored => "c.recipient_id = ?1 AND c.status = 'ignored'",
    };

    // Unread count and latest message come back in the same row (no N+1)
    let sql = format!(
        "SELECT {COLUMNS},
                (SELECT COUNT(*) FROM chat_messages u
                 WHERE u.conversation_id = c.id AND u.sender_id <> ?1 AND u.read_at IS NULL),
                lm.id, lm.sender_id, lm.content, lm.sent_at, lm.read_at
         FROM conversations c
         LEFT JOIN chat_messages lm ON lm.id = (
             SELECT x.id FROM chat_messages x
             WHERE x.conversation_id = c.id
             ORDER BY x.sent_at DESC, x.id DESC
             LIMIT 1
         )
         WHERE {condition}
         ORDER BY COALESCE(c.last_message_at, c.created_at) DESC"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([user_id.to_string()], |row| {
            let conversation = map_conversation(row)?;
            let unread: i64 = row.get(9)?;
            let last_message = match opt_uuid_at(row, 10)? {
                Some(id) => Some(ChatMessage {
                    id,
                    conversation_id: conversation.id,
                    sender_id: uuid_at(row, 11)?,
                    content: row.get(12)?,
                    sent_at: row.get(13)?,
                    read_at: row.get(14)?,
                }),
                None => None,
            };
            Ok((conversation, unread, last_message))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows
        .into_iter()
        .filter_map(|(conversation, unread, last_message)| {
            let other_user_id = conversation.other_participant(user_id)?;
            Some(ConversationOverview {
                conversation,
                other_user_id,
                unread_count: unread as u64,
                last_message,
            })
        })
        .collect())
}
