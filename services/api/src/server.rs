use crate::cli::ServeArgs;
use crate::infra::{build_contact_service, AppState};
use crate::routes::with_contact_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use listing_contacts::config::AppConfig;
use listing_contacts::contacts::TracingObserver;
use listing_contacts::error::AppError;
use listing_contacts::telemetry;
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

    let contact_service = Arc::new(build_contact_service(
        &config.contacts,
        vec![Arc::new(TracingObserver)],
    ));

    let app = with_contact_routes(contact_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        listing_index = ?config.contacts.listing_index,
        "listing contacts service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
