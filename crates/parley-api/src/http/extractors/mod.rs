//! Request extractors.

pub mod claims;
