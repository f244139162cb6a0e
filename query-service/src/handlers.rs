//! 请求处理模块

use std::time::Instant;

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use common::errors::AppError;
use common::middleware::RequestId;
use common::models::{
    CreateTabRequest, MoveTabRequest, QueryRequest, QueryResult, RunQueryRequest,
    SetActiveTabRequest, Tab, TabList, UpdateTabRequest,
};
use common::response::ApiResponse;

use crate::state::AppState;
use crate::SERVICE_NAME;

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

fn respond<T>(data: T, request_id: &RequestId) -> ApiResult<T> {
    Ok(Json(
        ApiResponse::ok_with_service(data, SERVICE_NAME).with_request_id(request_id.as_str()),
    ))
}

/// 执行 SQL 查询
///
/// 变更语句走 command 路径并返回空结果，其余语句以 JSON 格式返回数据。
#[utoipa::path(
    post,
    path = "/api/query",
    tag = "query",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "查询执行成功", body = ApiResponse<QueryResult>),
        (status = 400, description = "SQL 为空"),
        (status = 403, description = "只读模式下拒绝变更语句"),
        (status = 502, description = "ClickHouse 返回错误")
    )
)]
pub async fn execute_query(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<QueryRequest>,
) -> ApiResult<QueryResult> {
    req.validate()?;
    let start = Instant::now();
    let result = state.queries.execute(&req.query).await?;
    Ok(Json(
        ApiResponse::ok_with_service(result, SERVICE_NAME)
            .with_request_id(request_id.as_str())
            .with_duration(start.elapsed().as_millis() as u64),
    ))
}

/// 获取全部标签页
#[utoipa::path(
    get,
    path = "/api/tabs",
    tag = "tabs",
    responses(
        (status = 200, description = "标签页列表", body = ApiResponse<TabList>)
    )
)]
pub async fn list_tabs(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> ApiResult<TabList> {
    respond(state.tabs.list().await, &request_id)
}

/// 新建标签页
#[utoipa::path(
    post,
    path = "/api/tabs",
    tag = "tabs",
    request_body = CreateTabRequest,
    responses(
        (status = 200, description = "标签页已创建并激活", body = ApiResponse<Tab>),
        (status = 400, description = "参数校验错误")
    )
)]
pub async fn create_tab(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<CreateTabRequest>,
) -> ApiResult<Tab> {
    req.validate()?;
    let tab = state.tabs.add(req.into_tab()).await?;
    respond(tab, &request_id)
}

/// 关闭全部标签页（保留主页）
#[utoipa::path(
    delete,
    path = "/api/tabs",
    tag = "tabs",
    responses(
        (status = 200, description = "仅剩主页", body = ApiResponse<TabList>)
    )
)]
pub async fn close_all_tabs(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> ApiResult<TabList> {
    respond(state.tabs.close_all().await?, &request_id)
}

/// 设置当前标签页
#[utoipa::path(
    put,
    path = "/api/tabs/active",
    tag = "tabs",
    request_body = SetActiveTabRequest,
    responses(
        (status = 200, description = "已切换", body = ApiResponse<TabList>),
        (status = 404, description = "标签页未找到")
    )
)]
pub async fn set_active_tab(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<SetActiveTabRequest>,
) -> ApiResult<TabList> {
    respond(state.tabs.set_active(&req.id).await?, &request_id)
}

/// 获取单个标签页
#[utoipa::path(
    get,
    path = "/api/tabs/{id}",
    tag = "tabs",
    params(("id" = String, Path, description = "标签页 ID")),
    responses(
        (status = 200, description = "标签页详情", body = ApiResponse<Tab>),
        (status = 404, description = "标签页未找到")
    )
)]
pub async fn get_tab(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> ApiResult<Tab> {
    respond(state.tabs.get(&id).await?, &request_id)
}

/// 修改标签页标题或内容
#[utoipa::path(
    patch,
    path = "/api/tabs/{id}",
    tag = "tabs",
    params(("id" = String, Path, description = "标签页 ID")),
    request_body = UpdateTabRequest,
    responses(
        (status = 200, description = "已更新", body = ApiResponse<Tab>),
        (status = 400, description = "参数校验错误"),
        (status = 404, description = "标签页未找到")
    )
)]
pub async fn update_tab(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTabRequest>,
) -> ApiResult<Tab> {
    req.validate()?;
    respond(state.tabs.update(&id, req).await?, &request_id)
}

/// 关闭标签页
#[utoipa::path(
    delete,
    path = "/api/tabs/{id}",
    tag = "tabs",
    params(("id" = String, Path, description = "标签页 ID")),
    responses(
        (status = 200, description = "剩余标签页", body = ApiResponse<TabList>),
        (status = 400, description = "主页不可关闭"),
        (status = 404, description = "标签页未找到")
    )
)]
pub async fn remove_tab(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> ApiResult<TabList> {
    respond(state.tabs.remove(&id).await?, &request_id)
}

/// 在标签页中执行查询
///
/// 查询失败时仍返回 200，错误信息保存在标签页的 `error` 字段中。
#[utoipa::path(
    post,
    path = "/api/tabs/{id}/run",
    tag = "tabs",
    params(("id" = String, Path, description = "标签页 ID")),
    request_body = RunQueryRequest,
    responses(
        (status = 200, description = "执行完成", body = ApiResponse<Tab>),
        (status = 404, description = "标签页未找到")
    )
)]
pub async fn run_tab_query(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
    body: Option<Json<RunQueryRequest>>,
) -> ApiResult<Tab> {
    let query = body.and_then(|Json(req)| req.query);
    let start = Instant::now();
    let tab = state.tabs.run_query(&id, query).await?;
    Ok(Json(
        ApiResponse::ok_with_service(tab, SERVICE_NAME)
            .with_request_id(request_id.as_str())
            .with_duration(start.elapsed().as_millis() as u64),
    ))
}

/// 复制标签页
#[utoipa::path(
    post,
    path = "/api/tabs/{id}/duplicate",
    tag = "tabs",
    params(("id" = String, Path, description = "标签页 ID")),
    responses(
        (status = 200, description = "副本已创建并激活", body = ApiResponse<Tab>),
        (status = 404, description = "标签页未找到")
    )
)]
pub async fn duplicate_tab(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> ApiResult<Tab> {
    respond(state.tabs.duplicate(&id).await?, &request_id)
}

/// 移动标签页
#[utoipa::path(
    post,
    path = "/api/tabs/{id}/move",
    tag = "tabs",
    params(("id" = String, Path, description = "标签页 ID")),
    request_body = MoveTabRequest,
    responses(
        (status = 200, description = "新的顺序", body = ApiResponse<TabList>),
        (status = 404, description = "标签页未找到")
    )
)]
pub async fn move_tab(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
    Json(req): Json<MoveTabRequest>,
) -> ApiResult<TabList> {
    respond(state.tabs.move_tab(&id, req.index).await?, &request_id)
}

/// 标记为已保存
#[utoipa::path(
    post,
    path = "/api/tabs/{id}/save",
    tag = "tabs",
    params(("id" = String, Path, description = "标签页 ID")),
    responses(
        (status = 200, description = "已保存", body = ApiResponse<Tab>),
        (status = 404, description = "标签页未找到")
    )
)]
pub async fn save_tab(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> ApiResult<Tab> {
    respond(state.tabs.mark_saved(&id).await?, &request_id)
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "服务状态", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let clickhouse = match state.queries.executor().ping().await {
        Ok(()) => ComponentHealth {
            status: "healthy".to_string(),
            error: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "ClickHouse ping failed");
            ComponentHealth {
                status: "unhealthy".to_string(),
                error: Some(e.to_string()),
            }
        }
    };

    let status = if clickhouse.error.is_none() { "healthy" } else { "degraded" };
    Json(HealthResponse {
        status: status.to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        read_only: state.config.read_only,
        open_tabs: state.tabs.tab_count().await,
        clickhouse,
    })
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub read_only: bool,
    pub open_tabs: usize,
    pub clickhouse: ComponentHealth,
}

#[derive(Serialize, ToSchema)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
