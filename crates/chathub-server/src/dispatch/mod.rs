//! Request dispatch: routes a decoded envelope to its handler and turns the
//! outcome into exactly one reply.

pub mod errors;
pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use chathub_core::{ChatId, Envelope, ErrorCode, MsgType, UserId};
use chathub_store::Storage;
use metrics::{counter, histogram};
use serde_json::Value;
use tracing::{error, info_span, warn};

pub use errors::HandlerError;

use crate::metrics::{REQUEST_DURATION_SECONDS, REQUEST_ERRORS_TOTAL, REQUESTS_TOTAL};

/// A stored message that other chat members should hear about.
#[derive(Clone, Debug, PartialEq)]
pub struct FanoutEvent {
    /// Author; excluded from delivery.
    pub sender: UserId,
    /// Chat the message was posted to.
    pub chat: ChatId,
    /// The stored message as returned to the sender.
    pub message: Value,
}

/// Outcome of one dispatched request.
#[derive(Debug)]
pub struct Dispatched {
    /// Reply for the requester.
    pub response: Envelope,
    /// Set when the request committed a new message.
    pub fanout: Option<FanoutEvent>,
}

/// Routes envelopes to handlers against one storage backend.
#[derive(Clone)]
pub struct Dispatcher {
    storage: Arc<dyn Storage>,
}

impl Dispatcher {
    /// Create a dispatcher over `storage`.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// The storage backend handlers run against.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Handle one request of a known kind.
    ///
    /// Storage calls block, so the handler runs on the blocking pool inside a
    /// `handler` span. Never fails: errors become opaque error replies.
    pub async fn dispatch(&self, kind: MsgType, env: Envelope) -> Dispatched {
        let label = kind.as_str();
        counter!(REQUESTS_TOTAL, "msg_type" => label).increment(1);
        let span = info_span!("handler", msg_type = label, user_id = %env.from);
        let start = Instant::now();

        let storage = Arc::clone(&self.storage);
        let request = env.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let _guard = span.enter();
            route(kind, storage.as_ref(), &request)
        })
        .await;

        histogram!(REQUEST_DURATION_SECONDS, "msg_type" => label)
            .record(start.elapsed().as_secs_f64());

        match outcome {
            Ok(Ok(data)) => {
                let fanout = match (kind.fans_out(), env.to_chat()) {
                    (true, Some(chat)) => Some(FanoutEvent {
                        sender: env.from,
                        chat,
                        message: data.clone(),
                    }),
                    _ => None,
                };
                Dispatched {
                    response: env.reply(data),
                    fanout,
                }
            }
            Ok(Err(err)) => {
                let code = err.code();
                match &err {
                    HandlerError::Storage(_) | HandlerError::Serialization(_) => {
                        error!(user_id = %env.from, msg_type = label, error = %err, "request failed");
                    }
                    _ => warn!(user_id = %env.from, msg_type = label, error = %err, "request rejected"),
                }
                counter!(REQUEST_ERRORS_TOTAL, "msg_type" => label, "code" => code.as_str())
                    .increment(1);
                Dispatched {
                    response: env.error_reply(code),
                    fanout: None,
                }
            }
            Err(join_err) => {
                error!(user_id = %env.from, msg_type = label, error = %join_err, "handler task failed");
                counter!(REQUEST_ERRORS_TOTAL, "msg_type" => label, "code" => ErrorCode::InternalError.as_str())
                    .increment(1);
                Dispatched {
                    response: env.error_reply(ErrorCode::InternalError),
                    fanout: None,
                }
            }
        }
    }
}

/// Call the handler for `kind`.
pub fn route(kind: MsgType, storage: &dyn Storage, env: &Envelope) -> Result<Value, HandlerError> {
    use handlers::{chats, members, messages};
    match kind {
        MsgType::FetchMessage => messages::fetch_message(storage, env),
        MsgType::SendMessage => messages::send_message(storage, env),
        MsgType::UpdateMessage => messages::update_message(storage, env),
        MsgType::DeleteMessage => messages::delete_message(storage, env),
        MsgType::ListChatMessages => messages::list_chat_messages(storage, env),
        MsgType::CreateChat => chats::create_chat(storage, env),
        MsgType::UpdateChat => chats::update_chat(storage, env),
        MsgType::DeleteChat => chats::delete_chat(storage, env),
        MsgType::AddUserToChat => members::add_user_to_chat(storage, env),
        MsgType::RemoveUserFromChat => members::remove_user_from_chat(storage, env),
        MsgType::ListChatMembers => members::list_chat_members(storage, env),
        MsgType::ListUserChats => chats::list_user_chats(storage, env),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::handlers::test_helpers::*;
    use chathub_core::SERVER_ID;
    use serde_json::json;

    fn dispatcher() -> (Dispatcher, ChatId) {
        let (db, chat) = seeded();
        (Dispatcher::new(Arc::new(db)), chat)
    }

    #[tokio::test]
    async fn reply_echoes_type_and_addresses_requester() {
        let (d, chat) = dispatcher();
        let env = request(MsgType::ListChatMembers, BOB, chat.get(), Value::Null);
        let out = d.dispatch(MsgType::ListChatMembers, env).await;
        assert_eq!(out.response.msg_type, MsgType::ListChatMembers.as_wire());
        assert_eq!(out.response.from, SERVER_ID);
        assert_eq!(out.response.to, BOB.get());
        assert_eq!(out.response.data, json!([1, 2]));
        assert!(out.fanout.is_none());
    }

    #[tokio::test]
    async fn send_message_yields_fanout_event() {
        let (d, chat) = dispatcher();
        let env = request(MsgType::SendMessage, ALICE, chat.get(), json!("hi all"));
        let out = d.dispatch(MsgType::SendMessage, env).await;
        let event = out.fanout.unwrap();
        assert_eq!(event.sender, ALICE);
        assert_eq!(event.chat, chat);
        assert_eq!(event.message, out.response.data);
        assert_eq!(event.message["message"], "hi all");
    }

    #[tokio::test]
    async fn failed_send_has_no_fanout() {
        let (d, chat) = dispatcher();
        let env = request(MsgType::SendMessage, CAROL, chat.get(), json!("let me in"));
        let out = d.dispatch(MsgType::SendMessage, env).await;
        assert!(out.fanout.is_none());
        assert_eq!(out.response.data, json!("Forbidden"));
    }

    #[tokio::test]
    async fn errors_are_opaque_codes() {
        let (d, _) = dispatcher();
        let env = request(MsgType::DeleteChat, ALICE, 777, Value::Null);
        let out = d.dispatch(MsgType::DeleteChat, env).await;
        assert_eq!(out.response.data, json!("NotFound"));

        let env = request(MsgType::CreateChat, ALICE, 0, json!(""));
        let out = d.dispatch(MsgType::CreateChat, env).await;
        assert_eq!(out.response.data, json!("InvalidRequest"));
    }

    #[test]
    fn route_covers_every_kind() {
        let (db, chat) = seeded();
        for kind in MsgType::ALL {
            let env = request(kind, CAROL, chat.get(), Value::Null);
            // Every kind reaches a handler; none panics on an empty payload.
            let _ = route(kind, &db, &env);
        }
    }
}
