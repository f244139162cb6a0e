//! 请求转发模块
//!
//! 网关自身未处理的 `/api/*` 请求全部转发到查询服务，保留方法、路径、
//! 查询字符串与请求体，并携带 `content-type`、`accept` 与请求 ID。

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware,
    response::Response,
    routing::any,
    Extension, Router,
};

use common::errors::AppError;
use common::middleware::{auth_middleware, AuthToken, RequestId, REQUEST_ID_HEADER};

use crate::state::AppState;

/// 网关可缓冲的最大请求体
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// 创建转发路由，带认证
pub fn router(auth: AuthToken) -> Router<AppState> {
    Router::new()
        .route("/api/{*path}", any(forward))
        .route_layer(middleware::from_fn_with_state(auth, auth_middleware))
}

/// 转发请求到查询服务
pub async fn forward(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    req: Request,
) -> Result<Response, AppError> {
    let (parts, body) = req.into_parts();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}{}", state.service_urls.query_service, path);

    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| AppError::Validation(format!("failed to read request body: {}", e)))?;

    let mut upstream = state
        .http_client
        .request(parts.method.clone(), &url)
        .header(REQUEST_ID_HEADER.clone(), request_id.as_str());
    for name in [header::CONTENT_TYPE, header::ACCEPT] {
        if let Some(value) = parts.headers.get(&name) {
            upstream = upstream.header(name, value.clone());
        }
    }
    if !body.is_empty() {
        upstream = upstream.body(body);
    }

    let response = upstream.send().await.map_err(|e| {
        tracing::warn!(url = %url, error = %e, "query-service unreachable");
        AppError::ExternalService(format!("query-service unavailable: {}", e))
    })?;

    let status = response.status();
    let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| AppError::ExternalService(format!("failed to read query-service response: {}", e)))?;

    tracing::debug!(method = %parts.method, path, status = status.as_u16(), "forwarded");

    Response::builder()
        .status(status)
        .header(
            header::CONTENT_TYPE,
            content_type.unwrap_or_else(|| HeaderValue::from_static("application/json")),
        )
        .body(Body::from(bytes))
        .map_err(|e| AppError::Internal(format!("failed to build response: {}", e)))
}
