use crate::cli::ServeArgs;
use crate::infra::{sample_gateway, AppState};
use crate::routes::with_portal_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use student_portal::config::{AppConfig, BackendConfig};
use student_portal::error::AppError;
use student_portal::gateway::{Backend, HostedGateway};
use student_portal::portal::{PortalService, PortalSettings};
use student_portal::telemetry;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let backend = select_backend(&config.backend)?;
    let portal = Arc::new(PortalService::new(backend, PortalSettings::from(&config.backend)));

    let app = with_portal_routes(portal)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "student portal ready");

    axum::serve(listener, app).await?;
    Ok(())
}

fn select_backend(config: &BackendConfig) -> Result<Backend, AppError> {
    match &config.remote {
        Some(remote) => {
            let gateway = HostedGateway::new(remote, config.request_timeout)?;
            info!(base_url = %remote.base_url, "using hosted backend");
            Ok(Backend::from_gateway(Arc::new(gateway)))
        }
        None => {
            warn!("PORTAL_BACKEND_URL not set; serving seeded in-memory data");
            Ok(Backend::from_gateway(sample_gateway(PortalService::today())))
        }
    }
}
