//! Session identity for HTTP clients.
//!
//! A session is named by the `x-session-id` header when present, otherwise
//! by the session cookie. Clients with neither get a fresh id, returned in a
//! `Set-Cookie` header.

use axum::extract::FromRequestParts;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponseParts, ResponseParts};
use std::convert::Infallible;
use tracing::debug;
use uuid::Uuid;

use super::server::SharedGateway;

/// Header carrying an explicit session id.
pub const SESSION_HEADER: &str = "x-session-id";

const MAX_SESSION_ID_LEN: usize = 128;

/// The caller's session, resolved from the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId {
    id: String,
    /// Set when the id was generated for this request and must be sent back.
    issued_cookie: Option<String>,
}

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// Whether this request started a new session.
    pub fn is_new(&self) -> bool {
        self.issued_cookie.is_some()
    }

    fn resolve(headers: &HeaderMap, cookie_name: &str) -> Self {
        let from_header = headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| is_valid_session_id(id));
        if let Some(id) = from_header.or_else(|| cookie_value(headers, cookie_name)) {
            return Self {
                id: id.to_string(),
                issued_cookie: None,
            };
        }

        let id = Uuid::new_v4().to_string();
        debug!(session_id = %id, "Issuing new session");
        Self {
            issued_cookie: Some(format!(
                "{cookie_name}={id}; Path=/; HttpOnly; SameSite=Lax"
            )),
            id,
        }
    }
}

fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
}

/// Find `name` among all `Cookie` headers.
fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && is_valid_session_id(value))
        .map(|(_, value)| value)
}

impl FromRequestParts<SharedGateway> for SessionId {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedGateway,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::resolve(&parts.headers, &state.config().session_cookie))
    }
}

impl IntoResponseParts for SessionId {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        if let Some(cookie) = self.issued_cookie
            && let Ok(value) = HeaderValue::from_str(&cookie)
        {
            res.headers_mut().append(SET_COOKIE, value);
        }
        Ok(res)
    }
}
