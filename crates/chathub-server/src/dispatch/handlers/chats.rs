//! Chat handlers: create, rename, delete, list the sender's chats.

use chathub_core::Envelope;
use chathub_store::{ChatRepository, Storage};
use serde_json::Value;
use tracing::info;

use super::{chat_name, in_transaction, require_owner, success, target_chat};
use crate::dispatch::errors::HandlerError;

/// `data` = name. The sender becomes owner and first member.
pub fn create_chat(storage: &dyn Storage, env: &Envelope) -> Result<Value, HandlerError> {
    let name = chat_name(env)?;
    let (id, body) = in_transaction(storage, |uow| {
        let chat = uow.create_chat(name, env.from)?;
        uow.add_user_to_chat(chat.id, env.from)?;
        Ok((chat.id, serde_json::to_value(&chat)?))
    })?;
    info!(chat_id = %id, owner = %env.from, "chat created");
    Ok(body)
}

/// `to` = chat id, `data` = new name. Owner only.
pub fn update_chat(storage: &dyn Storage, env: &Envelope) -> Result<Value, HandlerError> {
    let chat = target_chat(env)?;
    let name = chat_name(env)?;
    in_transaction(storage, |uow| {
        require_owner(uow, chat, env.from)?;
        uow.update_chat(chat, name)?;
        Ok(success())
    })
}

/// `to` = chat id. Owner only; members and messages go with it.
pub fn delete_chat(storage: &dyn Storage, env: &Envelope) -> Result<Value, HandlerError> {
    let chat = target_chat(env)?;
    in_transaction(storage, |uow| {
        require_owner(uow, chat, env.from)?;
        Ok(uow.delete_chat(chat)?)
    })?;
    info!(chat_id = %chat, "chat deleted");
    Ok(success())
}

/// Chats the sender belongs to.
pub fn list_user_chats(storage: &dyn Storage, env: &Envelope) -> Result<Value, HandlerError> {
    in_transaction(storage, |uow| {
        let chats = uow.user_chats(env.from)?;
        Ok(serde_json::to_value(&chats)?)
    })
}
