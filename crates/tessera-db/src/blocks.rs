use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use tessera_types::models::UserBlock;

use crate::models::uuid_at;

/// Insert a block row unless one already exists.
/// Returns `true` if a new row was written.
pub fn insert(conn: &Connection, blocker_id: Uuid, blocked_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO user_blocks (blocker_id, blocked_id, blocked_at) VALUES (?1, ?2, ?3)",
        params![blocker_id.to_string(), blocked_id.to_string(), at],
    )?;
    Ok(inserted > 0)
}

/// Returns `true` if a row was removed.
pub fn delete(conn: &Connection, blocker_id: Uuid, blocked_id: Uuid) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM user_blocks WHERE blocker_id = ?1 AND blocked_id = ?2",
        [blocker_id.to_string(), blocked_id.to_string()],
    )?;
    Ok(removed > 0)
}

/// Has `blocker_id` blocked `blocked_id`?
pub fn exists(conn: &Connection, blocker_id: Uuid, blocked_id: Uuid) -> Result<bool> {
    let found: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM user_blocks WHERE blocker_id = ?1 AND blocked_id = ?2)",
        [blocker_id.to_string(), blocked_id.to_string()],
        |r| r.get(0),
    )?;
    Ok(found)
}

pub fn list_by_blocker(conn: &Connection, blocker_id: Uuid) -> Result<Vec<UserBlock>> {
    let mut stmt = conn.prepare(
        "SELECT blocker_id, blocked_id, blocked_at FROM user_blocks
         WHERE blocker_id = ?1
         ORDER BY blocked_at DESC",
    )?;

    let rows = stmt
        .query_map([blocker_id.to_string()], |row| {
            Ok(UserBlock {
                blocker_id: uuid_at(row, 0)?,
                blocked_id: uuid_at(row, 1)?,
                blocked_at: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[test]
    fn blocks_are_directed_and_unique() {
        let db = Database::open_in_memory().unwrap();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();

        db.with_conn(|conn| {
            assert!(insert(conn, a, b, now)?);
            assert!(!insert(conn, a, b, now)?);
            assert!(exists(conn, a, b)?);
            assert!(!exists(conn, b, a)?);
            assert_eq!(list_by_blocker(conn, a)?.len(), 1);

            assert!(delete(conn, a, b)?);
            assert!(!delete(conn, a, b)?);
            Ok(())
        })
        .unwrap();
    }
}
