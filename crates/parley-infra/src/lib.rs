//! Infrastructure layer for Parley.
//!
//! Contains implementations of the ports defined in `parley-core`: SQLite
//! storage for chats, messages and user lookups, the AMQP delivery source
//! that feeds the queue consumer, and the configuration loader.

pub mod amqp;
pub mod config;
pub mod sqlite;
