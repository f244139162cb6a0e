//! Authentication middleware.
//!
//! Requests must present the configured access token either as a bearer
//! token or in the `access_token` cookie. With no token configured every
//! request passes.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::Response,
};

use crate::errors::AppError;

/// Cookie carrying the access token.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Expected access token, shared with the middleware as router state.
#[derive(Clone, Debug, Default)]
pub struct AuthToken(Option<Arc<str>>);

impl AuthToken {
    /// Creates the token holder; `None` disables authentication.
    pub fn new(token: Option<String>) -> Self {
        Self(token.map(Arc::from))
    }

    /// Whether a token is required.
    pub fn is_enabled(&self) -> bool {
        self.0.is_some()
    }

    /// Checks a presented token against the configured one.
    pub fn verify(&self, presented: Option<&str>) -> Result<(), AppError> {
        let Some(expected) = self.0.as_deref() else {
            return Ok(());
        };
        match presented {
            None => Err(AppError::Unauthorized("missing access token".into())),
            Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => Ok(()),
            Some(_) => Err(AppError::Unauthorized("invalid access token".into())),
        }
    }
}

/// Authentication middleware handler.
///
/// Use with `axum::middleware::from_fn_with_state(token, auth_middleware)`.
pub async fn auth_middleware(
    State(token): State<AuthToken>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let presented = extract_bearer_token(&req).or_else(|| extract_cookie(&req, ACCESS_TOKEN_COOKIE));
    if let Err(e) = token.verify(presented) {
        tracing::warn!(uri = %req.uri(), "rejected unauthenticated request");
        return Err(e);
    }
    Ok(next.run(req).await)
}

/// Extract bearer token from Authorization header.
pub fn extract_bearer_token(req: &Request<Body>) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Extract a cookie value by name from the Cookie header.
pub fn extract_cookie<'a>(req: &'a Request<Body>, name: &str) -> Option<&'a str> {
    req.headers()
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|v| !v.is_empty())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};
    use tower::ServiceExt;

    fn app(token: Option<&str>) -> Router {
        let token = AuthToken::new(token.map(String::from));
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(token, auth_middleware))
    }

    async fn status(app: Router, req: Request<Body>) -> StatusCode {
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_no_token_configured_allows_all() {
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert_eq!(status(app(None), req).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_token_is_rejected() {
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert_eq!(status(app(Some("secret")), req).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_bearer_token() {
        let ok = Request::builder()
            .uri("/")
            .header("Authorization", "Bearer secret")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status(app(Some("secret")), ok).await, StatusCode::OK);

        let bad = Request::builder()
            .uri("/")
            .header("Authorization", "Bearer wrong")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status(app(Some("secret")), bad).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_cookie_token() {
        let req = Request::builder()
            .uri("/")
            .header("Cookie", "theme=dark; access_token=secret")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status(app(Some("secret")), req).await, StatusCode::OK);
    }
}
