//! Request handlers, one per message type.
//!
//! Every handler runs its storage work inside [`in_transaction`]: one unit of
//! work, committed after the result has been built, rolled back on any error.

pub mod chats;
pub mod members;
pub mod messages;

use chathub_core::{ChatId, Envelope, MessageId, UserId};
use chathub_store::{ChatRepository, Storage, UnitOfWork};
use serde_json::Value;
use tracing::warn;

use super::errors::HandlerError;

/// Upper bound on chat name length, in characters.
pub const MAX_CHAT_NAME_CHARS: usize = 64;

/// Most recent messages returned by list-chat-messages.
pub const MESSAGE_PAGE_LIMIT: usize = 500;

/// Run `op` in a fresh unit of work. Commits when it succeeds, rolls back
/// when it fails, and returns its result either way.
pub(crate) fn in_transaction<T, F>(storage: &dyn Storage, op: F) -> Result<T, HandlerError>
where
    F: FnOnce(&dyn UnitOfWork) -> Result<T, HandlerError>,
{
    let uow = storage.begin()?;
    match op(&*uow) {
        Ok(value) => {
            uow.commit()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = uow.rollback() {
                warn!(error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}

/// The chat addressed by `to`.
pub(crate) fn target_chat(env: &Envelope) -> Result<ChatId, HandlerError> {
    env.to_chat()
        .ok_or_else(|| HandlerError::InvalidRequest("missing chat id".into()))
}

/// The message addressed by `to`.
pub(crate) fn target_message(env: &Envelope) -> Result<MessageId, HandlerError> {
    match env.to {
        0 => Err(HandlerError::InvalidRequest("missing message id".into())),
        raw => Ok(MessageId::new(raw)),
    }
}

/// A message id carried in `data`.
pub(crate) fn data_message_id(env: &Envelope) -> Result<MessageId, HandlerError> {
    MessageId::from_json(&env.data)
        .ok_or_else(|| HandlerError::InvalidRequest("data is not a message id".into()))
}

/// A user id carried in `data`.
pub(crate) fn data_user_id(env: &Envelope) -> Result<UserId, HandlerError> {
    UserId::from_json(&env.data)
        .ok_or_else(|| HandlerError::InvalidRequest("data is not a user id".into()))
}

/// Non-empty message text carried in `data`.
pub(crate) fn message_text(env: &Envelope) -> Result<&str, HandlerError> {
    match env.data.as_str() {
        Some(text) if !text.trim().is_empty() => Ok(text),
        Some(_) => Err(HandlerError::InvalidRequest("empty message".into())),
        None => Err(HandlerError::InvalidRequest("data is not a string".into())),
    }
}

/// A chat name carried in `data`: trimmed, 1 to 64 characters.
pub(crate) fn chat_name(env: &Envelope) -> Result<&str, HandlerError> {
    let name = env
        .data
        .as_str()
        .map(str::trim)
        .ok_or_else(|| HandlerError::InvalidRequest("data is not a string".into()))?;
    let chars = name.chars().count();
    if chars == 0 || chars > MAX_CHAT_NAME_CHARS {
        return Err(HandlerError::InvalidRequest(format!(
            "chat name must be 1 to {MAX_CHAT_NAME_CHARS} characters, got {chars}"
        )));
    }
    Ok(name)
}

/// Owner of `chat`, or `NotFound` if the chat does not exist.
pub(crate) fn chat_owner(uow: &dyn UnitOfWork, chat: ChatId) -> Result<UserId, HandlerError> {
    uow.chat_owner(chat)?
        .ok_or_else(|| HandlerError::NotFound(format!("chat {chat}")))
}

/// Fails unless `user` belongs to `chat`. Returns the chat owner.
pub(crate) fn require_member(
    uow: &dyn UnitOfWork,
    chat: ChatId,
    user: UserId,
) -> Result<UserId, HandlerError> {
    let owner = chat_owner(uow, chat)?;
    if !uow.is_member(chat, user)? {
        return Err(HandlerError::Forbidden(format!("user {user} is not in chat {chat}")));
    }
    Ok(owner)
}

/// Fails unless `user` owns `chat`.
pub(crate) fn require_owner(
    uow: &dyn UnitOfWork,
    chat: ChatId,
    user: UserId,
) -> Result<(), HandlerError> {
    if chat_owner(uow, chat)? != user {
        return Err(HandlerError::Forbidden(format!("user {user} does not own chat {chat}")));
    }
    Ok(())
}

/// The acknowledgement returned by mutations.
pub(crate) fn success() -> Value {
    Value::String(chathub_core::SUCCESS.to_owned())
}
