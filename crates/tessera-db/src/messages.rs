use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use tessera_types::models::{ChatMessage, MessageCursor};

use crate::models::uuid_at;

fn map_message(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: uuid_at(row, 0)?,
        conversation_id: uuid_at(row, 1)?,
        sender_id: uuid_at(row, 2)?,
        content: row.get(3)?,
        sent_at: row.get(4)?,
        read_at: row.get(5)?,
    })
}

pub fn insert(conn: &Connection, m: &ChatMessage) -> Result<()> {
    conn.execute(
        "INSERT INTO chat_messages (id, conversation_id, sender_id, content, sent_at, read_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            m.id.to_string(),
            m.conversation_id.to_string(),
            m.sender_id.to_string(),
            m.content,
            m.sent_at,
            m.read_at,
        ],
    )
    .context("inserting chat message")?;
    Ok(())
}

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<ChatMessage>> {
    let row = conn
        .query_row(
            "SELECT id, conversation_id, sender_id, content, sent_at, read_at
             FROM chat_messages WHERE id = ?1",
            [id.to_string()],
            map_message,
        )
        .optional()?;
    Ok(row)
}

/// Mark everything the other side sent as read, in one statement.
/// Returns the number of messages that changed.
pub fn mark_read(
    conn: &Connection,
    conversation_id: Uuid,
    reader_id: Uuid,
    now: DateTime<Utc>,
) -> Result<u64> {
    // read_at never precedes sent_at, even with a skewed clock
    let affected = conn.execute(
        "UPDATE chat_messages
         SET read_at = CASE WHEN sent_at > ?3 THEN sent_at ELSE ?3 END
         WHERE conversation_id = ?1 AND sender_id <> ?2 AND read_at IS NULL",
        params![conversation_id.to_string(), reader_id.to_string(), now],
    )?;
    Ok(affected as u64)
}

/// Newest-first page of a conversation. `before` points at the oldest
/// message the caller already has.
pub fn page(
    conn: &Connection,
    conversation_id: Uuid,
    limit: u32,
    before: Option<MessageCursor>,
) -> Result<Vec<ChatMessage>> {
    let mut stmt = conn.prepare(
        "SELECT id, conversation_id, sender_id, content, sent_at, read_at
         FROM chat_messages
         WHERE conversation_id = ?1
           AND (?2 IS NULL OR sent_at < ?2 OR (sent_at = ?2 AND id < ?3))
         ORDER BY sent_at DESC, id DESC
         LIMIT ?4",
    )?;

    let rows = stmt
        .query_map(
            params![
                conversation_id.to_string(),
                before.map(|c| c.sent_at),
                before.map(|c| c.id.to_string()),
                limit,
            ],
            map_message,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, conversations};
    use chrono::Duration;
    use tessera_types::models::{Conversation, ConversationStatus};

    fn seed(conn: &Connection, a: Uuid, b: Uuid, start: DateTime<Utc>) -> Result<Uuid> {
        let conversation = Conversation {
            id: Uuid::now_v7(),
            initiator_id: a,
            recipient_id: b,
            status: ConversationStatus::Accepted,
            created_at: start,
            responded_at: Some(start),
            last_message_at: None,
            listing_id: None,
            puzzle_id: None,
        };
        conversations::insert(conn, &conversation)?;

        for (i, sender) in [a, b, a].into_iter().enumerate() {
            insert(
                conn,
                &ChatMessage {
                    id: Uuid::now_v7(),
                    conversation_id: conversation.id,
                    sender_id: sender,
                    content: format!("message {i}"),
                    sent_at: start + Duration::minutes(i as i64),
                    read_at: None,
                },
            )?;
        }
        Ok(conversation.id)
    }

    #[test]
    fn mark_read_only_touches_other_senders() {
        let db = Database::open_in_memory().unwrap();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let start = Utc::now();

        db.with_conn(|conn| {
            let id = seed(conn, a, b, start)?;
            assert_eq!(mark_read(conn, id, b, start + Duration::hours(1))?, 2);
            assert_eq!(mark_read(conn, id, b, start + Duration::hours(2))?, 0);

            let page = page(conn, id, 10, None)?;
            for m in &page {
                assert_eq!(m.read_at.is_some(), m.sender_id == a);
            }
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn page_walks_backwards_with_cursor() {
        let db = Database::open_in_memory().unwrap();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let start = Utc::now();

        db.with_conn(|conn| {
            let id = seed(conn, a, b, start)?;
            let first = page(conn, id, 2, None)?;
            assert_eq!(first.len(), 2);
            assert_eq!(first[0].content, "message 2");

            let rest = page(conn, id, 2, Some(MessageCursor::from(&first[1])))?;
            assert_eq!(rest.len(), 1);
            assert_eq!(rest[0].content, "message 0");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn cursor_keeps_messages_sharing_a_timestamp() {
        let db = Database::open_in_memory().unwrap();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let start = Utc::now();

        db.with_conn(|conn| {
            let id = seed(conn, a, b, start)?;
            for i in 0..3 {
                insert(
                    conn,
                    &ChatMessage {
                        id: Uuid::now_v7(),
                        conversation_id: id,
                        sender_id: b,
                        content: format!("burst {i}"),
                        sent_at: start + Duration::hours(1),
                        read_at: None,
                    },
                )?;
            }

            let mut seen = Vec::new();
            let mut cursor = None;
            loop {
                let batch = page(conn, id, 2, cursor)?;
                let Some(last) = batch.last() else { break };
                cursor = Some(MessageCursor::from(last));
                seen.extend(batch.into_iter().map(|m| m.content));
            }
            assert_eq!(seen.len(), 6);
            assert!(seen[..3].iter().all(|c| c.starts_with("burst")));
            assert_eq!(seen[3..], ["message 2", "message 1", "message 0"]);
            Ok(())
        })
        .unwrap();
    }
}
