use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (messaging schema)");
        conn.execute_batch(
            "
            -- Directory tables back the SQLite reference implementations of
            -- the user directory and listing catalog. Messaging tables only
            -- store ids and carry no foreign keys into them.
            CREATE TABLE users (
                id                            TEXT PRIMARY KEY,
                name                          TEXT,
                email                         TEXT,
                locale                        TEXT,
                allow_direct_messages         INTEGER NOT NULL DEFAULT 1,
                email_notifications_enabled   INTEGER NOT NULL DEFAULT 1,
                email_notification_frequency  TEXT NOT NULL DEFAULT '24_hours',
                messaging_muted_until         TEXT,
                marketplace_banned            INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE listings (
                id          TEXT PRIMARY KEY,
                seller_id   TEXT NOT NULL,
                puzzle_id   TEXT,
                removed_at  TEXT
            );

            CREATE TABLE conversations (
                id               TEXT PRIMARY KEY,
                initiator_id     TEXT NOT NULL,
                recipient_id     TEXT NOT NULL,
                pair_low         TEXT NOT NULL,
                pair_high        TEXT NOT NULL,
                status           TEXT NOT NULL,
                listing_id       TEXT,
                puzzle_id        TEXT,
                created_at       TEXT NOT NULL,
                responded_at     TEXT,
                last_message_at  TEXT,
                CHECK (initiator_id <> recipient_id),
                CHECK (status IN ('pending', 'accepted', 'ignored', 'denied'))
            );

            CREATE INDEX idx_conversations_initiator ON conversations(initiator_id);
            CREATE INDEX idx_conversations_recipient ON conversations(recipient_id, status);
            CREATE INDEX idx_conversations_listing ON conversations(listing_id);

            -- At most one open request per unordered pair, whichever side sent it.
            CREATE UNIQUE INDEX uq_conversations_pending_pair
                ON conversations(pair_low, pair_high)
                WHERE status = 'pending';

            -- General DMs share a single accepted thread per pair.
            CREATE UNIQUE INDEX uq_conversations_accepted_general
                ON conversations(pair_low, pair_high)
                WHERE status = 'accepted' AND listing_id IS NULL;

            CREATE UNIQUE INDEX uq_conversations_accepted_listing
                ON conversations(pair_low, pair_high, listing_id)
                WHERE status = 'accepted' AND listing_id IS NOT NULL;

            CREATE TABLE chat_messages (
                id               TEXT PRIMARY KEY,
                conversation_id  TEXT NOT NULL REFERENCES conversations(id),
                sender_id        TEXT NOT NULL,
                content          TEXT NOT NULL,
                sent_at          TEXT NOT NULL,
                read_at          TEXT,
                CHECK (read_at IS NULL OR read_at >= sent_at)
            );

            CREATE INDEX idx_chat_messages_conversation
                ON chat_messages(conversation_id, sent_at);

            CREATE INDEX idx_chat_messages_unread
                ON chat_messages(conversation_id, sender_id)
                WHERE read_at IS NULL;

            CREATE TABLE user_blocks (
                blocker_id  TEXT NOT NULL,
                blocked_id  TEXT NOT NULL,
                blocked_at  TEXT NOT NULL,
                PRIMARY KEY (blocker_id, blocked_id)
            );

            CREATE TABLE conversation_reports (
                id               TEXT PRIMARY KEY,
                conversation_id  TEXT NOT NULL REFERENCES conversations(id),
                reporter_id      TEXT NOT NULL,
                reason           TEXT NOT NULL,
                status           TEXT NOT NULL DEFAULT 'pending',
                reported_at      TEXT NOT NULL,
                resolved_by      TEXT,
                resolved_at      TEXT,
                admin_note       TEXT,
                CHECK (status IN ('pending', 'resolved', 'dismissed'))
            );

            CREATE INDEX idx_conversation_reports_status
                ON conversation_reports(status, reported_at);

            CREATE TABLE moderation_actions (
                id              TEXT PRIMARY KEY,
                target_user_id  TEXT NOT NULL,
                admin_id        TEXT NOT NULL,
                action_type     TEXT NOT NULL,
                performed_at    TEXT NOT NULL,
                report_id       TEXT REFERENCES conversation_reports(id),
                reason          TEXT,
                expires_at      TEXT
            );

            CREATE INDEX idx_moderation_actions_target
                ON moderation_actions(target_user_id, performed_at);

            CREATE TRIGGER moderation_actions_no_update
                BEFORE UPDATE ON moderation_actions
            BEGIN
                SELECT RAISE(ABORT, 'moderation actions are append-only');
            END;

            CREATE TRIGGER moderation_actions_no_delete
                BEFORE DELETE ON moderation_actions
            BEGIN
                SELECT RAISE(ABORT, 'moderation actions are append-only');
            END;

            CREATE TABLE digest_email_log (
                id                         TEXT PRIMARY KEY,
                user_id                    TEXT NOT NULL,
                sent_at                    TEXT NOT NULL,
                throttle_bucket            INTEGER NOT NULL,
                oldest_unread_message_at   TEXT,
                oldest_pending_request_at  TEXT,
                UNIQUE (user_id, throttle_bucket)
            );

            CREATE INDEX idx_digest_email_log_user
                ON digest_email_log(user_id, sent_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
