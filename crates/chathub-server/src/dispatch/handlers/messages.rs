//! Message handlers: fetch, send, update, delete, list.

use chathub_core::Envelope;
use chathub_store::{ChatRepository, MessageRepository, Storage, UnitOfWork};
use serde_json::Value;
use tracing::debug;

use super::{
    MESSAGE_PAGE_LIMIT, data_message_id, in_transaction, message_text, require_member, success,
    target_chat, target_message,
};
use crate::dispatch::errors::HandlerError;

/// `to` = message id. Requester must belong to the message's chat.
pub fn fetch_message(storage: &dyn Storage, env: &Envelope) -> Result<Value, HandlerError> {
    let id = target_message(env)?;
    in_transaction(storage, |uow| {
        let message = stored_message(uow, id)?;
        let _ = require_member(uow, message.chat_id, env.from)?;
        Ok(serde_json::to_value(&message)?)
    })
}

/// `to` = chat id, `data` = text. Returns the stored message.
pub fn send_message(storage: &dyn Storage, env: &Envelope) -> Result<Value, HandlerError> {
    let chat = target_chat(env)?;
    let text = message_text(env)?;
    let (id, body) = in_transaction(storage, |uow| {
        let _ = require_member(uow, chat, env.from)?;
        let message = uow.add_message(chat, env.from, text)?;
        Ok((message.id, serde_json::to_value(&message)?))
    })?;
    debug!(chat_id = %chat, message_id = %id, "message stored");
    Ok(body)
}

/// `to` = message id, `data` = new text. Author only.
pub fn update_message(storage: &dyn Storage, env: &Envelope) -> Result<Value, HandlerError> {
    let id = target_message(env)?;
    let text = message_text(env)?;
    in_transaction(storage, |uow| {
        if stored_message(uow, id)?.user_id != env.from {
            return Err(HandlerError::Forbidden(format!(
                "user {} did not write message {id}",
                env.from
            )));
        }
        uow.update_message(id, text)?;
        Ok(success())
    })
}

/// `to` = chat id, `data` = message id. Author or chat owner.
pub fn delete_message(storage: &dyn Storage, env: &Envelope) -> Result<Value, HandlerError> {
    let chat = target_chat(env)?;
    let id = data_message_id(env)?;
    in_transaction(storage, |uow| {
        let owner = uow
            .chat_owner(chat)?
            .ok_or_else(|| HandlerError::NotFound(format!("chat {chat}")))?;
        let message = uow
            .message(id)?
            .filter(|m| m.chat_id == chat)
            .ok_or_else(|| HandlerError::NotFound(format!("message {id} in chat {chat}")))?;
        if message.user_id != env.from && owner != env.from {
            return Err(HandlerError::Forbidden(format!(
                "user {} may not delete message {id}",
                env.from
            )));
        }
        uow.delete_message(id)?;
        Ok(success())
    })
}

/// `to` = chat id. Members only; the newest page, oldest first.
pub fn list_chat_messages(storage: &dyn Storage, env: &Envelope) -> Result<Value, HandlerError> {
    let chat = target_chat(env)?;
    in_transaction(storage, |uow| {
        let _ = require_member(uow, chat, env.from)?;
        let messages = uow.chat_messages(chat, MESSAGE_PAGE_LIMIT)?;
        Ok(serde_json::to_value(&messages)?)
    })
}

fn stored_message(
    uow: &dyn UnitOfWork,
    id: chathub_core::MessageId,
) -> Result<chathub_core::Message, HandlerError> {
    uow.message(id)?
        .ok_or_else(|| HandlerError::NotFound(format!("message {id}")))
}
