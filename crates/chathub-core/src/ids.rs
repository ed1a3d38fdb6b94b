//! Identifier newtypes.
//!
//! Users, chats and messages are addressed by the positive integers the
//! storage layer assigns. Zero is reserved: it is the server's own address in
//! reply envelopes and never names a stored row.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw wire value.
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// The raw wire value.
            pub const fn get(self) -> u64 {
                self.0
            }

            /// Read an id out of a JSON payload.
            ///
            /// Accepts a non-negative integer or a string of decimal digits.
            /// Zero is rejected.
            pub fn from_json(value: &Value) -> Option<Self> {
                let raw = match value {
                    Value::Number(n) => n.as_u64()?,
                    Value::String(s) => s.trim().parse::<u64>().ok()?,
                    _ => return None,
                };
                (raw != 0).then_some(Self(raw))
            }

            /// Convert to the signed form SQLite stores.
            pub const fn as_sql(self) -> i64 {
                self.0 as i64
            }

            /// Convert from the signed form SQLite stores.
            pub const fn from_sql(raw: i64) -> Self {
                Self(raw as u64)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse::<u64>().map(Self)
            }
        }
    };
}

numeric_id!(
    /// An authenticated user. Assigned by the token issuer.
    UserId
);
numeric_id!(
    /// A chat room.
    ChatId
);
numeric_id!(
    /// A stored chat message.
    MessageId
);

/// Identifies one transport connection.
///
/// A user may reconnect while the previous connection is still tearing down;
/// the connection id tells the two sessions apart.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh, time-ordered connection id.
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
