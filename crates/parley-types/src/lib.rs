//! Shared domain types for Parley.
//!
//! This crate contains the core domain types used across the Parley support
//! chat backend: chats, sequenced messages, chat summaries, authorization
//! claims, service configuration, and repository errors.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod identity;
