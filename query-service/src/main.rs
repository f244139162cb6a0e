//! SQL 查询执行服务
//!
//! 提供以下功能：
//! - 对 ClickHouse 执行查询，变更语句走 command 路径
//! - 标签页状态管理与持久化
//! - 在标签页中执行查询并记录结果或错误

mod clickhouse;
mod handlers;
mod routes;
mod service;
mod state;
mod storage;
mod tab_store;

use axum::{middleware, routing::get, Json, Router};
use common::config::AppConfig;
use common::logging::init_tracing;
use common::middleware::request_id_middleware;
use state::AppState;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;

pub(crate) const SERVICE_NAME: &str = "query-service";
const DEFAULT_PORT: u16 = 8082;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "查询服务 API",
        version = "0.1.0",
        description = "ClickHouse 查询执行与标签页状态微服务"
    ),
    paths(
        handlers::execute_query,
        handlers::list_tabs,
        handlers::create_tab,
        handlers::close_all_tabs,
        handlers::set_active_tab,
        handlers::get_tab,
        handlers::update_tab,
        handlers::remove_tab,
        handlers::run_tab_query,
        handlers::duplicate_tab,
        handlers::move_tab,
        handlers::save_tab,
        handlers::health_check,
    ),
    components(schemas(
        common::models::QueryRequest,
        common::models::QueryResult,
        common::models::ColumnMeta,
        common::models::QueryStatistics,
        common::models::Tab,
        common::models::TabType,
        common::models::TabList,
        common::models::InformationTarget,
        common::models::CreateTabRequest,
        common::models::UpdateTabRequest,
        common::models::RunQueryRequest,
        common::models::MoveTabRequest,
        common::models::SetActiveTabRequest,
        handlers::HealthResponse,
        handlers::ComponentHealth,
    )),
    tags(
        (name = "query", description = "查询执行端点"),
        (name = "tabs", description = "标签页端点"),
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
    let state = AppState::new(config.clone()).await?;
    info!(
        clickhouse = %config.clickhouse.url,
        tab_store = %config.tab_store_url,
        read_only = config.read_only,
        "应用状态已初始化"
    );

    // 创建路由
    let app = create_router(state);

    // 启动服务
    let addr = config.bind_addr();
    info!(service = SERVICE_NAME, address = %addr, "启动服务");

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
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
