//! Business logic and port definitions for Parley.
//!
//! This crate defines the "ports" (repository and collaborator traits) that
//! the infrastructure layer implements, plus the chat message ingestion
//! pipeline and the broker-agnostic queue consumer loop. It depends only on
//! `parley-types` -- never on `parley-infra` or any database/broker crate.

pub mod chat;
pub mod ingest;

#[cfg(test)]
pub(crate) mod testing;
