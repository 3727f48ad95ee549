use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use rentguard::workflows::policies::{
    allowed_targets, policy_router, NotificationPublisher, PolicyRepository, PolicyService,
    PolicyStatus,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct TransitionRule {
    pub(crate) from: PolicyStatus,
    pub(crate) label: &'static str,
    pub(crate) allowed: Vec<PolicyStatus>,
    pub(crate) terminal: bool,
}

/// Every status with the statuses it may move to.
pub(crate) fn transition_rules() -> Vec<TransitionRule> {
    PolicyStatus::ALL
        .into_iter()
        .map(|from| TransitionRule {
            from,
            label: from.label(),
            allowed: allowed_targets(from).to_vec(),
            terminal: from.is_terminal(),
        })
        .collect()
}

pub(crate) fn with_policy_routes<R, N>(service: Arc<PolicyService<R, N>>) -> axum::Router
where
    R: PolicyRepository + 'static,
    N: NotificationPublisher + 'static,
{
    policy_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/lifecycle/transitions",
            axum::routing::get(transition_rules_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    if ready {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "initializing" })),
        )
    }
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn transition_rules_endpoint() -> Json<Vec<TransitionRule>> {
    Json(transition_rules())
}
