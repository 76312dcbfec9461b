use crate::cli::ServeArgs;
use crate::infra::{AppState, TrustBackend};
use crate::routes::with_operational_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use reservation_trust::config::AppConfig;
use reservation_trust::error::AppError;
use reservation_trust::telemetry;
use std::sync::atomic::Ordering;
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

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let backend = TrustBackend::bootstrap(&config)?;
    if let Some(interval) = config.sweep.interval {
        backend.spawn_sweeper(interval);
        info!(interval_secs = interval.as_secs(), "maintenance sweeper scheduled");
    }

    let app = with_operational_routes(backend.router(config.admin_token.clone()))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "reservation trust engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}
