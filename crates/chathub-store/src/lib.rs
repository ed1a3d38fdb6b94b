//! # chathub-store
//!
//! Chat and message persistence behind a unit-of-work interface.
//!
//! Handlers call [`Storage::begin`] once per request, use the returned
//! [`UnitOfWork`] as both a [`ChatRepository`] and a [`MessageRepository`],
//! and finish with [`UnitOfWork::commit`]. A unit of work that is dropped
//! without committing rolls back.

#![deny(unsafe_code)]

pub mod database;
pub mod error;
pub mod repository;
pub mod schema;
mod sqlite;

pub use database::Database;
pub use error::StoreError;
pub use repository::{ChatRepository, MessageRepository, Storage, UnitOfWork};
