//! 路由模块

use axum::{
    routing::{get, post, put},
    Router,
};
use crate::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/query", post(handlers::execute_query))
        .route(
            "/api/tabs",
            get(handlers::list_tabs)
                .post(handlers::create_tab)
                .delete(handlers::close_all_tabs),
        )
        .route("/api/tabs/active", put(handlers::set_active_tab))
        .route(
            "/api/tabs/{id}",
            get(handlers::get_tab)
                .patch(handlers::update_tab)
                .delete(handlers::remove_tab),
        )
        .route("/api/tabs/{id}/run", post(handlers::run_tab_query))
        .route("/api/tabs/{id}/duplicate", post(handlers::duplicate_tab))
        .route("/api/tabs/{id}/move", post(handlers::move_tab))
        .route("/api/tabs/{id}/save", post(handlers::save_tab))
        .route("/api/health", get(handlers::health_check))
}
