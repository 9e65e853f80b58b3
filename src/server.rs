use crate::{
    collector,
    config::{Config, DEFAULT_MODULE},
    metrics::{
        CertMetrics, PANICS_RECOVERED, REGISTRY, REQUEST_DURATION, REQUESTS_TOTAL, encode_metrics,
    },
    scrape::Coordinator,
    tls::ensure_crypto_provider,
};
use anyhow::Context;
use axum::{
    Router,
    extract::{MatchedPath, Query, Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use futures::FutureExt;
use serde::Deserialize;
use std::{
    net::{IpAddr, SocketAddr},
    panic::AssertUnwindSafe,
    sync::Arc,
    time::Instant,
};
use tokio::{net::TcpListener, task};
use tracing::{error, info, warn};

/// Listener settings from the command line
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub listen: Option<IpAddr>,
    pub port: u16,
    pub metrics_path: String,
    pub interval: u16,
}

/// Shared handler state
///
/// `/probe` and the scheduled collector publish into separate coordinators so an
/// on-demand scrape never wipes the collector's series. Both count scrape errors
/// into one cumulative counter, served on the metrics path.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    probe: Arc<Coordinator>,
    collector: Arc<Coordinator>,
}

impl AppState {
    /// # Errors
    ///
    /// Returns an error if the certificate metric families cannot be registered
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let collector = CertMetrics::new()?;
        let probe = collector.sibling()?;
        Ok(Self {
            config: Arc::new(config),
            probe: Arc::new(Coordinator::new(Arc::new(probe))),
            collector: Arc::new(Coordinator::new(Arc::new(collector))),
        })
    }

    #[must_use]
    pub fn collector(&self) -> Arc<Coordinator> {
        Arc::clone(&self.collector)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeParams {
    target: Option<String>,
    module: Option<String>,
}

/// Build the HTTP routes
#[must_use]
pub fn router(state: AppState, metrics_path: &str) -> Router {
    Router::new()
        .route(metrics_path, get(metrics_handler))
        .route("/probe", get(probe_handler))
        .route("/health", get(|| async { StatusCode::OK }))
        .route_layer(middleware::from_fn(instrument))
        .with_state(state)
}

/// Start the exporter
///
/// # Errors
///
/// Returns an error if the service fails to start or bind to the port
pub async fn start(config: Config, options: ServerOptions) -> anyhow::Result<()> {
    ensure_crypto_provider();

    let targets: Arc<[String]> = config.targets.clone().into();
    let sweep_module = Arc::new(
        config
            .module(DEFAULT_MODULE)
            .context("no default module found in configuration")?
            .clone(),
    );

    let ServerOptions {
        listen,
        port,
        metrics_path,
        interval,
    } = options;

    let state = AppState::new(config)?;
    let app = router(state.clone(), &metrics_path);

    // Bind to socket with smart fallback
    let (listener, bind_addr) = match listen {
        Some(addr) => {
            let socket_addr = SocketAddr::new(addr, port);
            let listener = TcpListener::bind(socket_addr)
                .await
                .with_context(|| format!("failed to bind {socket_addr}"))?;
            (listener, socket_addr.to_string())
        }
        None => {
            // Auto mode: try IPv6 first, fallback to IPv4
            if let Ok(l) = TcpListener::bind(format!("[::]:{port}")).await {
                (l, format!("[::]:{port}"))
            } else {
                let socket_addr = format!("0.0.0.0:{port}");
                let listener = TcpListener::bind(&socket_addr)
                    .await
                    .with_context(|| format!("failed to bind {socket_addr}"))?;
                (listener, socket_addr)
            }
        }
    };

    info!(
        "Listening on {bind_addr}, metrics: {metrics_path}, targets: {}, interval: {interval}s",
        targets.len()
    );

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    if targets.is_empty() {
        server.await?;
        return Ok(());
    }

    let collector_handle = task::spawn(collector::run_loop(
        state.collector(),
        targets,
        sweep_module,
        interval,
    ));

    // Race between normal operation and collector task failure
    tokio::select! {
        result = server => {
            result?;
        }
        result = collector_handle => {
            match result {
                Ok(()) => {
                    error!("Collector loop exited unexpectedly");
                    anyhow::bail!("Collector loop stopped");
                }
                Err(e) => {
                    error!("Collector loop panicked: {e}");
                    anyhow::bail!("Collector loop panicked: {e}");
                }
            }
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn instrument(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let path = req.extensions().get::<MatchedPath>().map_or_else(
        || req.uri().path().to_string(),
        |matched| matched.as_str().to_string(),
    );

    let response = next.run(req).await;

    let status = response.status().canonical_reason().unwrap_or("Unknown");
    REQUESTS_TOTAL
        .with_label_values(&[path.as_str(), status])
        .inc();
    REQUEST_DURATION
        .with_label_values(&[path.as_str(), status])
        .observe(start.elapsed().as_secs_f64());

    response
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    let mut families = REGISTRY.gather();
    families.extend(state.collector.gather().await);

    match encode_metrics(&families) {
        Ok(buffer) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            buffer,
        )
            .into_response(),
        Err(e) => {
            error!("{e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn probe_handler(
    State(state): State<AppState>,
    Query(params): Query<ProbeParams>,
) -> Response {
    let Some(target) = params.target.filter(|target| !target.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Target parameter is required").into_response();
    };

    let module_name = params
        .module
        .filter(|module| !module.is_empty())
        .unwrap_or_else(|| DEFAULT_MODULE.to_string());
    let Some(module) = state.config.module(&module_name) else {
        return (
            StatusCode::BAD_REQUEST,
            format!("Unknown module: {module_name}"),
        )
            .into_response();
    };

    let scrape = AssertUnwindSafe(state.probe.scrape(&target, module))
        .catch_unwind()
        .await;

    match scrape {
        Ok(Ok(body)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Ok(Err(e)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error scraping target: {e}"),
        )
            .into_response(),
        Err(panic_info) => {
            error!("Panic while probing {target}: {panic_info:?}");
            PANICS_RECOVERED.inc();
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error scraping target: internal error",
            )
                .into_response()
        }
    }
}
