//! services/api/src/web/middleware.rs
//!
//! Identity middleware for the session routes.

use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::state::Identity;

pub const USER_HEADER: &str = "x-user-id";
pub const GUEST_HEADER: &str = "x-guest-id";

const MAX_GUEST_ID_LEN: usize = 128;

/// Middleware that resolves the caller's identity from the request headers.
///
/// `x-user-id` (set by the upstream auth provider) wins over `x-guest-id`.
/// The identity is inserted into request extensions for handlers to use; a
/// request carrying neither header is rejected with 401.
pub async fn require_identity(mut req: Request, next: Next) -> Result<Response, ApiError> {
    let identity = identity_from_headers(req.headers())?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

pub fn identity_from_headers(headers: &HeaderMap) -> Result<Identity, ApiError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(raw) = header(USER_HEADER) {
        let user_id = Uuid::parse_str(raw)
            .map_err(|_| ApiError::BadRequest(format!("Invalid {} format", USER_HEADER)))?;
        return Ok(Identity::User(user_id));
    }

    match header(GUEST_HEADER) {
        Some(raw) if raw.len() <= MAX_GUEST_ID_LEN => Ok(Identity::Guest(raw.to_string())),
        Some(_) => Err(ApiError::BadRequest(format!("{} is too long", GUEST_HEADER))),
        None => Err(ApiError::Unauthorized(format!(
            "{} or {} header is required",
            USER_HEADER, GUEST_HEADER
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn user_header_takes_precedence() {
        let id = Uuid::new_v4();
        let identity = identity_from_headers(&headers(&[
            (USER_HEADER, &id.to_string()),
            (GUEST_HEADER, "guest"),
        ]))
        .unwrap();
        assert_eq!(identity, Identity::User(id));
    }

    #[test]
    fn guest_header_is_accepted() {
        let identity = identity_from_headers(&headers(&[(GUEST_HEADER, " tab-42 ")])).unwrap();
        assert_eq!(identity, Identity::Guest("tab-42".to_string()));
    }

    #[test]
    fn missing_or_invalid_identity_is_rejected() {
        assert!(matches!(
            identity_from_headers(&HeaderMap::new()),
            Err(ApiError::Unauthorized(_))
        ));
        assert!(matches!(
            identity_from_headers(&headers(&[(USER_HEADER, "not-a-uuid")])),
            Err(ApiError::BadRequest(_))
        ));
        let long = "g".repeat(MAX_GUEST_ID_LEN + 1);
        assert!(matches!(
            identity_from_headers(&headers(&[(GUEST_HEADER, &long)])),
            Err(ApiError::BadRequest(_))
        ));
    }
}
