//! Caller claims extractor.
//!
//! Tokens are verified by the upstream gateway, which forwards the result as
//! two headers:
//! - `X-Auth-Subject: <numeric user id>`
//! - `X-Auth-Role: admin | operator | client`
//!
//! Handlers receive a typed [`Claims`] value and never inspect raw headers.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use parley_types::identity::{Claims, Role};

use crate::http::error::AppError;

pub const SUBJECT_HEADER: &str = "x-auth-subject";
pub const ROLE_HEADER: &str = "x-auth-role";

/// Authenticated caller. Extracting this rejects requests without valid claims.
pub struct Caller(pub Claims);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        claims_from_headers(&parts.headers).map(Caller)
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, AppError> {
    headers
        .get(name)
        .ok_or_else(|| AppError::Unauthorized(format!("Missing {name} header")))?
        .to_str()
        .map(str::trim)
        .map_err(|_| AppError::Unauthorized(format!("Invalid {name} header encoding")))
}

/// Parse the gateway headers into claims.
pub fn claims_from_headers(headers: &HeaderMap) -> Result<Claims, AppError> {
    let subject = header(headers, SUBJECT_HEADER)?;
    let subject: i64 = subject
        .parse()
        .map_err(|_| AppError::Unauthorized(format!("Invalid subject '{subject}'")))?;

    let role: Role = header(headers, ROLE_HEADER)?
        .parse()
        .map_err(AppError::Unauthorized)?;

    Ok(Claims::new(subject, role))
}
