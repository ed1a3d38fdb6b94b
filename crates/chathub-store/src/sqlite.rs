//! `SQLite` unit of work.

use chathub_core::{Chat, ChatId, Message, MessageId, UserId};
use chrono::{DateTime, Utc};
use parking_lot::MutexGuard;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, instrument, warn};

use crate::error::StoreError;
use crate::repository::{ChatRepository, MessageRepository, UnitOfWork};

const CHAT_COLUMNS: &str = "c.id, c.name, c.creator_id, c.created_at, c.updated_at";
const MESSAGE_COLUMNS: &str = "id, chat_id, user_id, message, created_at, updated_at";

/// A `BEGIN IMMEDIATE` transaction holding the connection lock.
pub(crate) struct SqliteUnitOfWork<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl<'a> SqliteUnitOfWork<'a> {
    pub(crate) fn begin(conn: MutexGuard<'a, Connection>) -> Result<Self, StoreError> {
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Self {
            conn,
            finished: false,
        })
    }
}

impl Drop for SqliteUnitOfWork<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        match self.conn.execute_batch("ROLLBACK") {
            Ok(()) => debug!("unit of work rolled back on drop"),
            Err(e) => warn!(error = %e, "rollback on drop failed"),
        }
    }
}

impl UnitOfWork for SqliteUnitOfWork<'_> {
    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl ChatRepository for SqliteUnitOfWork<'_> {
    #[instrument(skip(self))]
    fn create_chat(&self, name: &str, creator: UserId) -> Result<Chat, StoreError> {
        let now = Utc::now();
        let stamp = now.to_rfc3339();
        let _ = self.conn.execute(
            "INSERT INTO chats (name, creator_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![name, creator.as_sql(), stamp],
        )?;
        Ok(Chat {
            id: ChatId::from_sql(self.conn.last_insert_rowid()),
            name: name.to_string(),
            creator_id: creator,
            created_at: now,
            updated_at: now,
        })
    }

    #[instrument(skip(self))]
    fn update_chat(&self, chat: ChatId, name: &str) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE chats SET name = ?1, updated_at = ?2 WHERE id = ?3",
            params![name, Utc::now().to_rfc3339(), chat.as_sql()],
        )?;
        expect_one(changed, || format!("chat {chat}"))
    }

    #[instrument(skip(self))]
    fn delete_chat(&self, chat: ChatId) -> Result<(), StoreError> {
        let changed = self
            .conn
            .execute("DELETE FROM chats WHERE id = ?1", [chat.as_sql()])?;
        expect_one(changed, || format!("chat {chat}"))
    }

    #[instrument(skip(self))]
    fn add_user_to_chat(&self, chat: ChatId, user: UserId) -> Result<(), StoreError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO chat_users (chat_id, user_id) VALUES (?1, ?2)",
            params![chat.as_sql(), user.as_sql()],
        )?;
        if inserted == 0 {
            return Err(StoreError::Conflict(format!("user {user} already in chat {chat}")));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    fn remove_user_from_chat(&self, chat: ChatId, user: UserId) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "DELETE FROM chat_users WHERE chat_id = ?1 AND user_id = ?2",
            params![chat.as_sql(), user.as_sql()],
        )?;
        expect_one(changed, || format!("user {user} in chat {chat}"))
    }

    fn chat_member_ids(&self, chat: ChatId) -> Result<Vec<UserId>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT user_id FROM chat_users WHERE chat_id = ?1 ORDER BY user_id")?;
        let ids = stmt
            .query_map([chat.as_sql()], |row| row.get::<_, i64>(0).map(UserId::from_sql))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn chat_owner(&self, chat: ChatId) -> Result<Option<UserId>, StoreError> {
        let owner = self
            .conn
            .query_row(
                "SELECT creator_id FROM chats WHERE id = ?1",
                [chat.as_sql()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(owner.map(UserId::from_sql))
    }

    fn user_chats(&self, user: UserId) -> Result<Vec<Chat>, StoreError> {
        let sql = format!(
            "SELECT {CHAT_COLUMNS} FROM chats c \
             JOIN chat_users u ON u.chat_id = c.id \
             WHERE u.user_id = ?1 ORDER BY c.id"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let chats = stmt
            .query_map([user.as_sql()], chat_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(chats)
    }

    fn is_member(&self, chat: ChatId, user: UserId) -> Result<bool, StoreError> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM chat_users WHERE chat_id = ?1 AND user_id = ?2",
                params![chat.as_sql(), user.as_sql()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

impl MessageRepository for SqliteUnitOfWork<'_> {
    #[instrument(skip(self, text))]
    fn add_message(&self, chat: ChatId, sender: UserId, text: &str) -> Result<Message, StoreError> {
        let now = Utc::now();
        let stamp = now.to_rfc3339();
        let _ = self.conn.execute(
            "INSERT INTO messages (chat_id, user_id, message, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![chat.as_sql(), sender.as_sql(), text, stamp],
        )?;
        Ok(Message {
            id: MessageId::from_sql(self.conn.last_insert_rowid()),
            chat_id: chat,
            user_id: sender,
            message: text.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    #[instrument(skip(self, text))]
    fn update_message(&self, id: MessageId, text: &str) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE messages SET message = ?1, updated_at = ?2 WHERE id = ?3",
            params![text, Utc::now().to_rfc3339(), id.as_sql()],
        )?;
        expect_one(changed, || format!("message {id}"))
    }

    #[instrument(skip(self))]
    fn delete_message(&self, id: MessageId) -> Result<(), StoreError> {
        let changed = self
            .conn
            .execute("DELETE FROM messages WHERE id = ?1", [id.as_sql()])?;
        expect_one(changed, || format!("message {id}"))
    }

    fn message(&self, id: MessageId) -> Result<Option<Message>, StoreError> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1");
        let msg = self
            .conn
            .query_row(&sql, [id.as_sql()], message_from_row)
            .optional()?;
        Ok(msg)
    }

    fn chat_messages(&self, chat: ChatId, limit: usize) -> Result<Vec<Message>, StoreError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM ( \
                SELECT {MESSAGE_COLUMNS} FROM messages WHERE chat_id = ?1 ORDER BY id DESC LIMIT ?2 \
             ) ORDER BY id ASC"
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let msgs = stmt
            .query_map(params![chat.as_sql(), limit], message_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(msgs)
    }
}

fn expect_one(changed: usize, what: impl FnOnce() -> String) -> Result<(), StoreError> {
    if changed == 0 {
        Err(StoreError::NotFound(what()))
    } else {
        Ok(())
    }
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: ChatId::from_sql(row.get(0)?),
        name: row.get(1)?,
        creator_id: UserId::from_sql(row.get(2)?),
        created_at: timestamp(row, 3)?,
        updated_at: timestamp(row, 4)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: MessageId::from_sql(row.get(0)?),
        chat_id: ChatId::from_sql(row.get(1)?),
        user_id: UserId::from_sql(row.get(2)?),
        message: row.get(3)?,
        created_at: timestamp(row, 4)?,
        updated_at: timestamp(row, 5)?,
    })
}
