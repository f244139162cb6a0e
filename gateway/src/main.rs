//! API 网关服务
//!
//! 作为所有客户端请求的入口点，提供以下功能：
//! - 访问令牌认证
//! - 请求转发到查询服务
//! - 聚合健康检查
//! - 请求/响应日志记录

mod proxy;
mod routes;
mod state;

use axum::{middleware, routing::get, Json, Router};
use common::config::AppConfig;
use common::logging::init_tracing;
use common::middleware::request_id_middleware;
use state::AppState;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;

const SERVICE_NAME: &str = "gateway";
const DEFAULT_PORT: u16 = 8080;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "CH-UI API",
        version = "0.1.0",
        description = "CH-UI API 网关"
    ),
    paths(
        routes::gateway_health,
        routes::aggregated_health,
    ),
    components(schemas(
        routes::GatewayHealth,
        routes::AggregatedHealth,
        routes::UpstreamHealth,
    )),
    tags(
        (name = "gateway", description = "网关端点"),
        (name = "health", description = "健康检查端点")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志追踪
    init_tracing();

    // 加载配置
    let config = AppConfig::load_with_service(SERVICE_NAME, DEFAULT_PORT);

    // 创建应用状态
    let state = AppState::new(config.clone())?;
    info!(
        query_service = %state.service_urls.query_service,
        auth_enabled = state.auth.is_enabled(),
        "网关已配置"
    );

    // 创建路由
    let app = create_router(state);

    // 启动服务
    let addr = config.bind_addr();
    info!(service = SERVICE_NAME, address = %addr, "启动 API 网关");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .merge(proxy::router(state.auth.clone()))
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::Request;
    use axum::http::{header, Method, StatusCode};
    use axum::routing::any;
    use common::config::ServiceUrls;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    /// Upstream that echoes what it received.
    async fn fake_query_service(health_status: &'static str) -> String {
        async fn echo(req: Request) -> Json<Value> {
            let (parts, body) = req.into_parts();
            let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
            let header = |name: &str| {
                parts
                    .headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from)
            };
            Json(json!({
                "method": parts.method.as_str(),
                "path": parts.uri.path(),
                "query": parts.uri.query(),
                "body": String::from_utf8_lossy(&body),
                "request_id": header("x-request-id"),
                "content_type": header("content-type"),
                "authorization": header("authorization"),
            }))
        }

        let app = Router::new()
            .route("/api/health", get(move || async move { Json(json!({"status": health_status})) }))
            .route("/api/{*path}", any(echo));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn gateway(upstream: String, token: Option<&str>) -> Router {
        let config = AppConfig {
            service_name: SERVICE_NAME.to_string(),
            api_token: token.map(String::from),
            ..AppConfig::default()
        };
        let urls = ServiceUrls {
            query_service: upstream,
        };
        create_router(AppState::with_urls(config, urls).unwrap())
    }

    async fn send(app: &Router, req: axum::http::Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn get_req(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_forwards_method_path_query_and_body() {
        let app = gateway(fake_query_service("healthy").await, None);
        let req = axum::http::Request::builder()
            .method(Method::PATCH)
            .uri("/api/tabs/abc?verbose=1")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-request-id", "req-42")
            .body(Body::from(r#"{"title":"t"}"#))
            .unwrap();

        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["method"], "PATCH");
        assert_eq!(body["path"], "/api/tabs/abc");
        assert_eq!(body["query"], "verbose=1");
        assert_eq!(body["body"], r#"{"title":"t"}"#);
        assert_eq!(body["request_id"], "req-42");
        assert_eq!(body["content_type"], "application/json");
    }

    #[tokio::test]
    async fn test_auth_required_when_token_configured() {
        let app = gateway(fake_query_service("healthy").await, Some("s3cret"));

        let (status, body) = send(&app, get_req("/api/tabs")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["kind"], "UNAUTHORIZED");

        let req = axum::http::Request::get("/api/tabs")
            .header(header::AUTHORIZATION, "Bearer s3cret")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["authorization"].is_null());

        let req = axum::http::Request::get("/api/tabs")
            .header(header::COOKIE, "theme=dark; access_token=s3cret")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&app, req).await.0, StatusCode::OK);

        let (status, body) = send(&app, get_req("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["auth_enabled"], true);
        assert_eq!(body["service"], SERVICE_NAME);
        assert!(body["query_service"].as_str().unwrap().starts_with("http://127.0.0.1:"));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let app = gateway(url, None);
        let (status, body) = send(&app, get_req("/api/tabs")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["kind"], "EXTERNAL_SERVICE");

        let (_, body) = send(&app, get_req("/api/health/all")).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["services"][0]["healthy"], false);
    }

    #[tokio::test]
    async fn test_aggregated_health() {
        let app = gateway(fake_query_service("healthy").await, None);
        let (_, body) = send(&app, get_req("/api/health/all")).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["services"][0]["name"], "query-service");
        assert!(body["services"][0]["latency_ms"].is_u64());

        let app = gateway(fake_query_service("degraded").await, None);
        let (_, body) = send(&app, get_req("/api/health/all")).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["services"][0]["error"], "reported degraded");
    }
}
