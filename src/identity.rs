//! Client identity at the upgrade boundary
//!
//! Authentication happens upstream; by the time the upgrade request
//! reaches the hub it carries the authenticated username, either in the
//! `x-username` header or the `username` query parameter.

use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request};
use tokio_tungstenite::tungstenite::http::StatusCode;

/// Header set by the authenticating proxy
pub const USERNAME_HEADER: &str = "x-username";

/// Query parameter fallback
pub const USERNAME_PARAM: &str = "username";

/// Maximum username length
pub const MAX_USERNAME_LEN: usize = 32;

/// Extract the username from an upgrade request
pub fn username_from_request(req: &Request) -> Option<String> {
    let from_header = req
        .headers()
        .get(USERNAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let from_query = || {
        req.uri().query().and_then(|q| {
            q.split('&').find_map(|pair| {
                let (key, value) = pair.split_once('=')?;
                (key == USERNAME_PARAM).then(|| value.to_string())
            })
        })
    };

    from_header
        .or_else(from_query)
        .filter(|name| is_valid_username(name))
}

/// 1..=32 characters of `[A-Za-z0-9_.-]`
pub fn is_valid_username(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_USERNAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// 401 response returned when no identity is present
pub fn unauthorized() -> ErrorResponse {
    let mut response = ErrorResponse::new(Some("Unauthorized".to_string()));
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    response
}
