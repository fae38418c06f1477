//! Authentication middleware for HTTP routes
//!
//! Resolves the caller from `Authorization: Bearer <staff token>` or from the
//! `X-User-Id` / `X-User-Role` headers and inserts the [`Identity`] as a
//! request extension for handlers to pick up with `Extension<Identity>`.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use tourline_shared::Identity;

use super::{authenticate, Credentials, StaffTokenVerifier};
use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
}

/// Pull credentials out of request headers
pub fn credentials_from_headers(headers: &HeaderMap) -> Credentials {
    let token = header_value(headers, header::AUTHORIZATION.as_str()).and_then(|v| {
        v.strip_prefix("Bearer ")
            .map(|t| t.trim().to_string())
    });
    Credentials {
        token,
        user_id: header_value(headers, USER_ID_HEADER),
        role: header_value(headers, USER_ROLE_HEADER),
    }
}

pub async fn require_auth(
    State(verifier): State<StaffTokenVerifier>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let credentials = credentials_from_headers(request.headers());
    let identity: Identity = authenticate(&verifier, &credentials)?;

    tracing::trace!(
        user_id = %identity.user_id,
        role = identity.role.as_str(),
        "Request authenticated"
    );
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_credentials_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        headers.insert(USER_ID_HEADER, HeaderValue::from_static(" 42 "));
        let creds = credentials_from_headers(&headers);
        assert_eq!(creds.token.as_deref(), Some("abc.def"));
        assert_eq!(creds.user_id.as_deref(), Some("42"));
        assert!(creds.role.is_none());
    }

    #[test]
    fn test_non_bearer_authorization_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert!(credentials_from_headers(&headers).token.is_none());
    }
}
