use crate::cli::ServeArgs;
use crate::infra::{
    default_packages, AppState, InMemoryNotificationPublisher, InMemoryPolicyRepository,
};
use crate::routes::with_policy_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use rentguard::config::AppConfig;
use rentguard::error::AppError;
use rentguard::telemetry;
use rentguard::workflows::policies::PolicyService;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if args.manual_review {
        config.lifecycle.auto_advance = false;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let repository = Arc::new(InMemoryPolicyRepository::with_packages(default_packages()));
    let notifications = Arc::new(InMemoryNotificationPublisher::default());
    let policy_service = Arc::new(PolicyService::new(
        repository,
        notifications,
        config.lifecycle.clone(),
    ));

    let app = with_policy_routes(policy_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        auto_advance = config.lifecycle.auto_advance,
        token_ttl_days = config.lifecycle.actor_token_ttl_days,
        "policy lifecycle service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
