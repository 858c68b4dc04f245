//! Entry point wiring the Orchestrator, Inventory Authority, and Payment
//! collaborator into one process for local runs: a shared database pool,
//! a shared message bus, the three HTTP routers merged behind one listener,
//! and the compensation pipeline's Publisher and Consumer as background
//! tasks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use app_config::AppConfig;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use compensation::{Publisher, PublisherConfig};
use orchestrator::{OrchestratorServiceImpl, SagaConfig};
use prometheus::{CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{error, info};
use uuid::Uuid;

static TRACE_ID_HEADER: HeaderName = HeaderName::from_static("x-trace-id");

/// HTTP-layer metrics shared across the three merged routers.
struct Metrics {
    registry: Registry,
    http_requests_total: CounterVec,
    http_request_duration_seconds: HistogramVec,
    errors_total: CounterVec,
    saga_outcomes_total: CounterVec,
    outbox_pending_events: Gauge,
}

impl Metrics {
    fn new() -> Self {
        let registry = Registry::new();

        let http_requests_total = CounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "endpoint", "status"],
        )
        .expect("failed to create http_requests_total metric");

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            ),
            &["method", "endpoint"],
        )
        .expect("failed to create http_request_duration_seconds metric");

        let errors_total = CounterVec::new(
            Opts::new("errors_total", "Total number of errors"),
            &["source", "endpoint"],
        )
        .expect("failed to create errors_total metric");

        let saga_outcomes_total = CounterVec::new(
            Opts::new("saga_outcomes_total", "Saga step outcomes"),
            &["step", "result"],
        )
        .expect("failed to create saga_outcomes_total metric");

        let outbox_pending_events = Gauge::new(
            "outbox_pending_events",
            "Outbox rows fetched as Pending on the most recent Publisher tick",
        )
        .expect("failed to create outbox_pending_events metric");

        registry
            .register(Box::new(http_requests_total.clone()))
            .expect("failed to register http_requests_total");
        registry
            .register(Box::new(http_request_duration_seconds.clone()))
            .expect("failed to register http_request_duration_seconds");
        registry
            .register(Box::new(errors_total.clone()))
            .expect("failed to register errors_total");
        registry
            .register(Box::new(saga_outcomes_total.clone()))
            .expect("failed to register saga_outcomes_total");
        registry
            .register(Box::new(outbox_pending_events.clone()))
            .expect("failed to register outbox_pending_events");

        Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            errors_total,
            saga_outcomes_total,
            outbox_pending_events,
        }
    }

    fn record_request(&self, method: &str, endpoint: &str, status: u16, duration: Duration) {
        self.http_requests_total
            .with_label_values(&[method, endpoint, &status.to_string()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, endpoint])
            .observe(duration.as_secs_f64());
        if status >= 400 {
            self.errors_total.with_label_values(&["http", endpoint]).inc();
        }
    }
}

struct PrometheusSagaMetrics(CounterVec);

impl orchestrator::SagaMetrics for PrometheusSagaMetrics {
    fn record(&self, step: &str, result: &str) {
        self.0.with_label_values(&[step, result]).inc();
    }
}

struct PrometheusOutboxMetrics(Gauge);

impl compensation::OutboxMetrics for PrometheusOutboxMetrics {
    fn set_pending(&self, count: i64) {
        self.0.set(count as f64);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::load().context("failed to load configuration")?;

    let pool = db::init_db_pool(&cfg)
        .await
        .context("failed to initialize database pool")?;

    let queue = mq::connect_or_memory(
        &cfg.mq_url,
        cfg.compensation_backoff_initial,
        cfg.compensation_backoff_max,
    )
    .await;

    let inventory_client = Arc::new(http_client::InventoryClient::new(
        cfg.inventory_service_url.clone(),
        cfg.inventory_call_timeout,
    ));
    let payment_client = Arc::new(http_client::PaymentClient::new(
        cfg.payment_service_url.clone(),
        cfg.payment_call_timeout,
    ));

    let inventory_repo = Arc::new(inventory::PgInventoryRepository::new(pool.clone()));
    let inventory_service: Arc<dyn inventory::InventoryService> =
        Arc::new(inventory::InventoryServiceImpl::new(inventory_repo));

    let payment_repo = Arc::new(payment::PgPaymentRepository::new(pool.clone()));
    let payment_service: Arc<dyn payment::PaymentService> =
        Arc::new(payment::PaymentServiceImpl::new(payment_repo));

    let order_repo = Arc::new(orchestrator::PgOrderRepository::new(pool.clone()));
    let outbox_repo = Arc::new(orchestrator::PgOutboxRepository::new(pool.clone()));
    let saga_config = SagaConfig {
        reservation_max_attempts: cfg.reservation_max_attempts,
        reservation_retry_delay: cfg.reservation_retry_delay,
    };

    let metrics = Arc::new(Metrics::new());
    let metrics_for_route = metrics.clone();

    let orchestrator_service: Arc<dyn orchestrator::OrchestratorService> = Arc::new(
        OrchestratorServiceImpl::new(order_repo, inventory_client.clone(), payment_client.clone(), saga_config)
            .with_metrics(Arc::new(PrometheusSagaMetrics(metrics.saga_outcomes_total.clone()))),
    );

    let app = Router::new()
        .merge(inventory::router(inventory::InventoryState {
            service: inventory_service,
        }))
        .merge(payment::router(payment::PaymentState {
            service: payment_service,
        }))
        .merge(orchestrator::router(orchestrator::OrchestratorState {
            service: orchestrator_service,
        }))
        .route("/health", axum::routing::get(health))
        .route(
            "/metrics",
            axum::routing::get(move || metrics_handler(metrics_for_route.clone())),
        )
        .layer(middleware::from_fn_with_state(metrics.clone(), metrics_middleware))
        .layer(middleware::from_fn(trace_id_middleware))
        .layer(CatchPanicLayer::new());

    let publisher = Arc::new(
        Publisher::new(
            outbox_repo,
            queue.clone(),
            PublisherConfig {
                poll_interval: cfg.outbox_poll_interval,
                batch_size: cfg.outbox_batch_size,
            },
        )
        .with_metrics(Arc::new(PrometheusOutboxMetrics(metrics.outbox_pending_events.clone()))),
    );
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let publisher_task = {
        let publisher = publisher.clone();
        tokio::spawn(async move { publisher.run(shutdown_rx).await })
    };

    compensation::consumer::start(queue.clone(), inventory_client.clone())
        .await
        .context("failed to start inventory rollback consumer")?;

    let listener = TcpListener::bind(format!("0.0.0.0:{}", cfg.http_port))
        .await
        .context("failed to bind HTTP listener")?;
    info!(port = cfg.http_port, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown signal received, draining background tasks");
    let _ = shutdown_tx.send(true);
    if tokio::time::timeout(cfg.shutdown_timeout, publisher_task).await.is_err() {
        error!("publisher did not shut down within the drain period");
    }
    if let Err(err) = queue.close().await {
        error!(error = %err, "failed to close message queue cleanly");
    }

    info!("shut down gracefully");
    Ok(())
}

async fn health() -> &'static str {
    "OK"
}

async fn metrics_handler(metrics: Arc<Metrics>) -> Response {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metrics.registry.gather(), &mut buffer) {
        error!(error = %err, "failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response();
    }
    match String::from_utf8(buffer) {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "invalid metrics encoding").into_response(),
    }
}

async fn metrics_middleware(State(metrics): State<Arc<Metrics>>, req: Request<Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let response = next.run(req).await;
    metrics.record_request(&method, &path, response.status().as_u16(), start.elapsed());
    response
}

/// Assigns an `X-Trace-ID` header to requests that arrive without one, so
/// every downstream log line and saga record can be correlated even when
/// the caller doesn't supply its own (spec §9), and echoes it back on the
/// response so the caller can pick it up too.
async fn trace_id_middleware(mut req: Request<Body>, next: Next) -> Response {
    let trace_id = match req.headers().get(&TRACE_ID_HEADER) {
        Some(value) => value.clone(),
        None => {
            let trace_id = Uuid::new_v4().to_string();
            let value = HeaderValue::from_str(&trace_id).expect("uuid is a valid header value");
            req.headers_mut().insert(TRACE_ID_HEADER.clone(), value.clone());
            value
        }
    };

    let mut response = next.run(req).await;
    response.headers_mut().insert(TRACE_ID_HEADER.clone(), trace_id);
    response
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
