//! Chat persistence ports, chat resolution, and the operator-facing read API.

pub mod identity;
pub mod query;
pub mod repository;
pub mod resolver;
