//! 网关健康检查路由

use std::time::{Duration, Instant};

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// 下游健康探测的超时时间
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// 创建网关路由
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(gateway_health))
        .route("/api/health/all", get(aggregated_health))
}

/// 网关自身状态（不访问下游）
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "网关运行正常", body = GatewayHealth)
    )
)]
pub async fn gateway_health(State(state): State<AppState>) -> Json<GatewayHealth> {
    Json(GatewayHealth {
        status: "healthy".to_string(),
        service: state.config.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        auth_enabled: state.auth.is_enabled(),
        query_service: state.service_urls.query_service.clone(),
        timestamp: Utc::now(),
    })
}

/// 探测查询服务（含 ClickHouse 状态）并汇总
#[utoipa::path(
    get,
    path = "/api/health/all",
    tag = "health",
    responses(
        (status = 200, description = "聚合健康状态", body = AggregatedHealth)
    )
)]
pub async fn aggregated_health(State(state): State<AppState>) -> Json<AggregatedHealth> {
    let upstreams = vec![
        probe_upstream(&state.http_client, "query-service", &state.service_urls.query_service).await,
    ];
    let status = if upstreams.iter().all(|u| u.healthy) { "healthy" } else { "degraded" };

    Json(AggregatedHealth {
        status: status.to_string(),
        timestamp: Utc::now(),
        services: upstreams,
    })
}

/// 探测单个下游：`/api/health` 返回 2xx 且未报告非 `healthy` 状态即视为健康
async fn probe_upstream(client: &reqwest::Client, name: &str, base_url: &str) -> UpstreamHealth {
    let started = Instant::now();
    let outcome = client
        .get(format!("{}/api/health", base_url))
        .timeout(PROBE_TIMEOUT)
        .send()
        .await;

    let error = match outcome {
        Ok(response) if response.status().is_success() => {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            match body.get("status").and_then(|s| s.as_str()) {
                None | Some("healthy") => None,
                Some(reported) => Some(format!("reported {}", reported)),
            }
        }
        Ok(response) => Some(format!("HTTP {}", response.status())),
        Err(e) => Some(e.to_string()),
    };

    if let Some(error) = &error {
        tracing::warn!(service = name, error = %error, "downstream unhealthy");
    }

    UpstreamHealth {
        name: name.to_string(),
        url: base_url.to_string(),
        healthy: error.is_none(),
        latency_ms: started.elapsed().as_millis() as u64,
        error,
    }
}

/// 网关状态
#[derive(Serialize, ToSchema)]
pub struct GatewayHealth {
    pub status: String,
    pub service: String,
    pub version: String,
    /// 是否要求访问令牌
    pub auth_enabled: bool,
    /// 转发目标
    pub query_service: String,
    pub timestamp: DateTime<Utc>,
}

/// 聚合健康响应；任一下游异常时为 `degraded`
#[derive(Serialize, ToSchema)]
pub struct AggregatedHealth {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub services: Vec<UpstreamHealth>,
}

/// 单个下游的探测结果
#[derive(Serialize, ToSchema)]
pub struct UpstreamHealth {
    pub name: String,
    pub url: String,
    pub healthy: bool,
    /// 探测耗时（毫秒）
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
