//! Membership handlers: add, remove, list.

use chathub_core::Envelope;
use chathub_store::{ChatRepository, Storage};
use serde_json::Value;

use super::{chat_owner, data_user_id, in_transaction, require_member, success, target_chat};
use crate::dispatch::errors::HandlerError;

/// `to` = chat id, `data` = user id. Owner only.
pub fn add_user_to_chat(storage: &dyn Storage, env: &Envelope) -> Result<Value, HandlerError> {
    let chat = target_chat(env)?;
    let user = data_user_id(env)?;
    in_transaction(storage, |uow| {
        if chat_owner(uow, chat)? != env.from {
            return Err(HandlerError::Forbidden(format!(
                "user {} does not own chat {chat}",
                env.from
            )));
        }
        if uow.is_member(chat, user)? {
            return Err(HandlerError::InvalidRequest(format!(
                "user {user} already in chat {chat}"
            )));
        }
        uow.add_user_to_chat(chat, user)?;
        Ok(success())
    })
}

/// `to` = chat id, `data` = user id. Owner only; the owner cannot be removed.
pub fn remove_user_from_chat(
    storage: &dyn Storage,
    env: &Envelope,
) -> Result<Value, HandlerError> {
    let chat = target_chat(env)?;
    let user = data_user_id(env)?;
    in_transaction(storage, |uow| {
        let owner = chat_owner(uow, chat)?;
        if owner != env.from {
            return Err(HandlerError::Forbidden(format!(
                "user {} does not own chat {chat}",
                env.from
            )));
        }
        if user == owner {
            return Err(HandlerError::InvalidRequest(format!(
                "owner {owner} cannot leave chat {chat}"
            )));
        }
        if !uow.is_member(chat, user)? {
            return Err(HandlerError::InvalidRequest(format!(
                "user {user} not in chat {chat}"
            )));
        }
        uow.remove_user_from_chat(chat, user)?;
        Ok(success())
    })
}

/// `to` = chat id. Members only; returns the member ids.
pub fn list_chat_members(storage: &dyn Storage, env: &Envelope) -> Result<Value, HandlerError> {
    let chat = target_chat(env)?;
    in_transaction(storage, |uow| {
        let _ = require_member(uow, chat, env.from)?;
        let ids = uow.chat_member_ids(chat)?;
        Ok(serde_json::to_value(&ids)?)
    })
}
