//! API request handlers

mod health;
mod streams;
mod submissions;
mod users;

pub use health::*;
pub use streams::*;
pub use submissions::*;
pub use users::*;

use crate::error::{ApiError, ApiResult};
use axum::http::HeaderMap;
use ctf_types::{EventId, EventScope, UserId};
use serde::Deserialize;

/// Header carrying the authenticated caller, set by the identity proxy.
pub const USER_ID_HEADER: &str = "x-user-id";

/// `?eventId=` selector; absent means practice mode.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeQuery {
    pub event_id: Option<String>,
}

impl ScopeQuery {
    pub fn event(&self) -> EventScope {
        event_scope(self.event_id.as_deref())
    }
}

pub(crate) fn event_scope(event_id: Option<&str>) -> EventScope {
    match event_id.map(str::trim) {
        Some(id) if !id.is_empty() => EventScope::Event(EventId::new(id)),
        _ => EventScope::Practice,
    }
}

pub(crate) fn caller(headers: &HeaderMap) -> ApiResult<UserId> {
    let raw = headers
        .get(USER_ID_HEADER)
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {} header", USER_ID_HEADER)))?
        .to_str()
        .map_err(|_| ApiError::Unauthorized(format!("malformed {} header", USER_ID_HEADER)))?
        .trim();
    if raw.is_empty() {
        return Err(ApiError::Unauthorized(format!("empty {} header", USER_ID_HEADER)));
    }
    Ok(UserId::new(raw))
}
