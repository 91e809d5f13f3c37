use crate::cli::ServeArgs;
use crate::infra::{blocking, build_engine, AppState};
use crate::routes::with_conversation_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use loan_officer::config::AppConfig;
use loan_officer::error::AppError;
use loan_officer::telemetry;
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
    config.require_credentials()?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let engine_config = config.clone();
    let engine = Arc::new(blocking(move || build_engine(&engine_config)).await?);

    let app = with_conversation_routes(engine)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, model = %config.llm.model, "mortgage assistant ready");

    axum::serve(listener, app).await?;
    Ok(())
}
