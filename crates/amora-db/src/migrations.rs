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
        info!("Running migration v1 (conversations, messages, requests, blocks, ledger)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                    TEXT PRIMARY KEY,
                role                  TEXT NOT NULL DEFAULT 'user',
                subscription_plan     TEXT NOT NULL DEFAULT 'free',
                credits               INTEGER NOT NULL DEFAULT 0 CHECK (credits >= 0),
                total_credits_spent   INTEGER NOT NULL DEFAULT 0,
                last_credit_spent_at  TEXT,
                vip_active            INTEGER NOT NULL DEFAULT 0,
                vip_expires_at        TEXT,
                created_at            TEXT NOT NULL
            );

            -- One row per unordered pair: ids are stored lower first.
            CREATE TABLE conversations (
                id               TEXT PRIMARY KEY,
                user_low         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                user_high        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                last_message     TEXT,
                last_message_at  TEXT,
                unread_low       INTEGER NOT NULL DEFAULT 0 CHECK (unread_low >= 0),
                unread_high      INTEGER NOT NULL DEFAULT 0 CHECK (unread_high >= 0),
                created_at       TEXT NOT NULL,
                CHECK (user_low < user_high),
                UNIQUE (user_low, user_high)
            );

            CREATE INDEX idx_conversations_high ON conversations(user_high);

            CREATE TABLE messages (
                id               TEXT PRIMARY KEY,
                conversation_id  TEXT REFERENCES conversations(id) ON DELETE CASCADE,
                sender_id        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                receiver_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content          TEXT,
                media_url        TEXT,
                message_type     TEXT NOT NULL DEFAULT 'text',
                is_read          INTEGER NOT NULL DEFAULT 0,
                read_at          TEXT,
                is_deleted       INTEGER NOT NULL DEFAULT 0,
                deleted_at       TEXT,
                credits_charged  INTEGER NOT NULL DEFAULT 0,
                created_at       TEXT NOT NULL,
                CHECK (sender_id <> receiver_id)
            );

            CREATE INDEX idx_messages_conversation
                ON messages(conversation_id, created_at);
            CREATE INDEX idx_messages_receiver_unread
                ON messages(receiver_id, is_read);

            CREATE TABLE chat_requests (
                id             TEXT PRIMARY KEY,
                sender_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                receiver_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                first_message  TEXT NOT NULL,
                status         TEXT NOT NULL DEFAULT 'pending',
                expires_at     TEXT NOT NULL,
                created_at     TEXT NOT NULL,
                responded_at   TEXT,
                CHECK (sender_id <> receiver_id)
            );

            CREATE UNIQUE INDEX idx_chat_requests_one_pending
                ON chat_requests(sender_id, receiver_id) WHERE status = 'pending';
            CREATE INDEX idx_chat_requests_receiver
                ON chat_requests(receiver_id, status, created_at);
            CREATE INDEX idx_chat_requests_expiry
                ON chat_requests(status, expires_at);

            CREATE TABLE blocks (
                blocker_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                blocked_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (blocker_id, blocked_id),
                CHECK (blocker_id <> blocked_id)
            );

            CREATE INDEX idx_blocks_blocked ON blocks(blocked_id);

            -- Append-only. Nothing in the application updates or deletes rows.
            CREATE TABLE credit_transactions (
                id             TEXT PRIMARY KEY,
                user_id        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                type           TEXT NOT NULL,
                amount         INTEGER NOT NULL,
                description    TEXT,
                relation_kind  TEXT,
                relation_id    TEXT,
                created_at     TEXT NOT NULL
            );

            CREATE INDEX idx_credit_transactions_user
                ON credit_transactions(user_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
