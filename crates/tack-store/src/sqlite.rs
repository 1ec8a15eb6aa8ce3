//! SQLite-backed `PinStore`, the durable backend used in production.

use crate::{
    ChannelId, MessageId, MessageRef, Mutator, PinEntry, PinStore, PinStoreError, StoreResult,
    TrackedMessage,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Persistent SQLite store keyed by composite message identity.
///
/// Connections are opened per operation with WAL journaling and a busy
/// timeout, matching the single-process, multi-task access pattern of the
/// runtime.
#[derive(Debug)]
pub struct SqlitePinStore {
    db_path: PathBuf,
}

impl SqlitePinStore {
    /// Creates a SQLite-backed store at `path`, creating the parent
    /// directory and schema if needed.
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self { db_path };
        let connection = store.open_connection()?;
        store.initialize_schema(&connection)?;
        Ok(store)
    }

    fn open_connection(&self) -> StoreResult<Connection> {
        let connection = Connection::open(&self.db_path)?;
        connection.busy_timeout(Duration::from_secs(5))?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;
        Ok(connection)
    }

    fn initialize_schema(&self, connection: &Connection) -> StoreResult<()> {
        connection.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tracked_messages (
                guild_id INTEGER NOT NULL,
                channel_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                reactors_json TEXT NOT NULL,
                pinned INTEGER NOT NULL,
                pinned_at TEXT NULL,
                PRIMARY KEY (guild_id, channel_id, message_id)
            );

            CREATE INDEX IF NOT EXISTS idx_tracked_messages_channel
                ON tracked_messages (channel_id);

            CREATE TABLE IF NOT EXISTS channel_pins (
                pin_row_id INTEGER PRIMARY KEY AUTOINCREMENT,
                channel_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                pinned_at TEXT NOT NULL,
                tracked INTEGER NOT NULL,
                UNIQUE (channel_id, message_id)
            );

            CREATE INDEX IF NOT EXISTS idx_channel_pins_order
                ON channel_pins (channel_id, pinned_at);
            "#,
        )?;
        Ok(())
    }
}

#[async_trait]
impl PinStore for SqlitePinStore {
    async fn get(&self, message: &MessageRef) -> StoreResult<Option<TrackedMessage>> {
        let connection = self.open_connection()?;
        let row = select_message(&connection, message)?;
        row.map(row_to_message).transpose()
    }

    async fn upsert(&self, message: &MessageRef, mutate: Mutator) -> StoreResult<TrackedMessage> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut record = select_message(&transaction, message)?
            .map(row_to_message)
            .transpose()?
            .unwrap_or_default();
        mutate(&mut record);

        transaction.execute(
            r#"
            INSERT INTO tracked_messages (
                guild_id, channel_id, message_id, reactors_json, pinned, pinned_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(guild_id, channel_id, message_id) DO UPDATE SET
                reactors_json = excluded.reactors_json,
                pinned = excluded.pinned,
                pinned_at = excluded.pinned_at
            "#,
            params![
                id_to_db("guild_id", message.guild_id.0)?,
                id_to_db("channel_id", message.channel_id.0)?,
                id_to_db("message_id", message.message_id.0)?,
                serialize_json(&record.reactors)?,
                i64::from(record.pinned),
                option_timestamp_to_db(record.pinned_at),
            ],
        )?;
        transaction.commit()?;
        Ok(record)
    }

    async fn delete(&self, message: &MessageRef) -> StoreResult<()> {
        let connection = self.open_connection()?;
        connection.execute(
            r#"
            DELETE FROM tracked_messages
            WHERE guild_id = ?1 AND channel_id = ?2 AND message_id = ?3
            "#,
            params![
                id_to_db("guild_id", message.guild_id.0)?,
                id_to_db("channel_id", message.channel_id.0)?,
                id_to_db("message_id", message.message_id.0)?,
            ],
        )?;
        Ok(())
    }

    async fn list_tracked(&self) -> StoreResult<Vec<(MessageRef, TrackedMessage)>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(
            r#"
            SELECT guild_id, channel_id, message_id, reactors_json, pinned, pinned_at
            FROM tracked_messages
            ORDER BY guild_id ASC, channel_id ASC, message_id ASC
            "#,
        )?;
        let mut rows = statement.query([])?;

        let mut tracked = Vec::new();
        while let Some(row) = rows.next()? {
            let message = MessageRef::new(
                crate::GuildId(id_from_db("guild_id", row.get(0)?)?),
                ChannelId(id_from_db("channel_id", row.get(1)?)?),
                MessageId(id_from_db("message_id", row.get(2)?)?),
            );
            let record = row_to_message((row.get(3)?, row.get(4)?, row.get(5)?))?;
            tracked.push((message, record));
        }
        Ok(tracked)
    }

    async fn list_pinned(&self, channel_id: ChannelId) -> StoreResult<Vec<PinEntry>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(
            r#"
            SELECT message_id, pinned_at, tracked
            FROM channel_pins
            WHERE channel_id = ?1
            ORDER BY pinned_at ASC, pin_row_id ASC
            "#,
        )?;
        let mut rows = statement.query(params![id_to_db("channel_id", channel_id.0)?])?;

        let mut pins = Vec::new();
        while let Some(row) = rows.next()? {
            pins.push(PinEntry {
                message_id: MessageId(id_from_db("message_id", row.get(0)?)?),
                pinned_at: timestamp_from_db(&row.get::<_, String>(1)?)?,
                tracked: row.get::<_, i64>(2)? != 0,
            });
        }
        Ok(pins)
    }

    async fn record_pin(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        pinned_at: DateTime<Utc>,
        tracked: bool,
    ) -> StoreResult<()> {
        let connection = self.open_connection()?;
        connection.execute(
            r#"
            INSERT INTO channel_pins (channel_id, message_id, pinned_at, tracked)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(channel_id, message_id) DO UPDATE SET
                pinned_at = excluded.pinned_at,
                tracked = excluded.tracked
            "#,
            params![
                id_to_db("channel_id", channel_id.0)?,
                id_to_db("message_id", message_id.0)?,
                timestamp_to_db(pinned_at),
                i64::from(tracked),
            ],
        )?;
        Ok(())
    }

    async fn record_unpin(&self, channel_id: ChannelId, message_id: MessageId) -> StoreResult<()> {
        let connection = self.open_connection()?;
        connection.execute(
            "DELETE FROM channel_pins WHERE channel_id = ?1 AND message_id = ?2",
            params![
                id_to_db("channel_id", channel_id.0)?,
                id_to_db("message_id", message_id.0)?,
            ],
        )?;
        Ok(())
    }

    async fn purge_channel(&self, channel_id: ChannelId) -> StoreResult<()> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction()?;
        let channel = id_to_db("channel_id", channel_id.0)?;
        transaction.execute(
            "DELETE FROM channel_pins WHERE channel_id = ?1",
            params![channel],
        )?;
        transaction.execute(
            "DELETE FROM tracked_messages WHERE channel_id = ?1",
            params![channel],
        )?;
        transaction.commit()?;
        Ok(())
    }
}

type MessageRow = (String, i64, Option<String>);

fn select_message(
    connection: &Connection,
    message: &MessageRef,
) -> StoreResult<Option<MessageRow>> {
    let row = connection
        .query_row(
            r#"
            SELECT reactors_json, pinned, pinned_at
            FROM tracked_messages
            WHERE guild_id = ?1 AND channel_id = ?2 AND message_id = ?3
            "#,
            params![
                id_to_db("guild_id", message.guild_id.0)?,
                id_to_db("channel_id", message.channel_id.0)?,
                id_to_db("message_id", message.message_id.0)?,
            ],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    Ok(row)
}

fn row_to_message((reactors_json, pinned, pinned_at): MessageRow) -> StoreResult<TrackedMessage> {
    Ok(TrackedMessage {
        reactors: deserialize_json(&reactors_json)?,
        pinned: pinned != 0,
        pinned_at: option_timestamp_from_db(pinned_at)?,
    })
}

fn serialize_json<T: serde::Serialize>(value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(PinStoreError::from)
}

fn deserialize_json<T: serde::de::DeserializeOwned>(value: &str) -> StoreResult<T> {
    serde_json::from_str(value).map_err(PinStoreError::from)
}

fn timestamp_to_db(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn option_timestamp_to_db(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(timestamp_to_db)
}

fn timestamp_from_db(value: &str) -> StoreResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

fn option_timestamp_from_db(value: Option<String>) -> StoreResult<Option<DateTime<Utc>>> {
    value.as_deref().map(timestamp_from_db).transpose()
}

fn id_to_db(field: &'static str, value: u64) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| PinStoreError::IdentifierOutOfRange { field, value })
}

fn id_from_db(field: &'static str, value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| PinStoreError::InvalidPersistedValue {
        field,
        value: value.to_string(),
    })
}
