//! Repository and unit-of-work traits.
//!
//! All methods are synchronous; callers on an async runtime run a whole unit
//! of work inside `spawn_blocking`.

use chathub_core::{Chat, ChatId, Message, MessageId, UserId};

use crate::error::StoreError;

/// Chat and membership operations.
pub trait ChatRepository {
    /// Create a chat owned by `creator`. Does not add the creator as a member.
    fn create_chat(&self, name: &str, creator: UserId) -> Result<Chat, StoreError>;

    /// Rename a chat. `NotFound` if it does not exist.
    fn update_chat(&self, chat: ChatId, name: &str) -> Result<(), StoreError>;

    /// Delete a chat with its members and messages. `NotFound` if absent.
    fn delete_chat(&self, chat: ChatId) -> Result<(), StoreError>;

    /// Add a member. `Conflict` if already a member.
    fn add_user_to_chat(&self, chat: ChatId, user: UserId) -> Result<(), StoreError>;

    /// Remove a member. `NotFound` if not a member.
    fn remove_user_from_chat(&self, chat: ChatId, user: UserId) -> Result<(), StoreError>;

    /// Member ids in ascending order.
    fn chat_member_ids(&self, chat: ChatId) -> Result<Vec<UserId>, StoreError>;

    /// The chat's owner, or `None` if the chat does not exist.
    fn chat_owner(&self, chat: ChatId) -> Result<Option<UserId>, StoreError>;

    /// Chats `user` belongs to, oldest first.
    fn user_chats(&self, user: UserId) -> Result<Vec<Chat>, StoreError>;

    /// Whether `user` is a member of `chat`.
    fn is_member(&self, chat: ChatId, user: UserId) -> Result<bool, StoreError>;
}

/// Message operations.
pub trait MessageRepository {
    /// Store a new message.
    fn add_message(&self, chat: ChatId, sender: UserId, text: &str) -> Result<Message, StoreError>;

    /// Replace a message's text. `NotFound` if absent.
    fn update_message(&self, id: MessageId, text: &str) -> Result<(), StoreError>;

    /// Delete a message. `NotFound` if absent.
    fn delete_message(&self, id: MessageId) -> Result<(), StoreError>;

    /// Fetch one message.
    fn message(&self, id: MessageId) -> Result<Option<Message>, StoreError>;

    /// The newest `limit` messages of a chat, oldest first.
    fn chat_messages(&self, chat: ChatId, limit: usize) -> Result<Vec<Message>, StoreError>;
}

/// One transaction over both repositories.
///
/// Consuming `commit`/`rollback` make a finished unit unusable. Dropping an
/// unfinished unit rolls it back.
pub trait UnitOfWork: ChatRepository + MessageRepository {
    /// Make every write in this unit durable.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discard every write in this unit.
    fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Factory for units of work.
pub trait Storage: Send + Sync {
    /// Open a transaction.
    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>, StoreError>;
}
