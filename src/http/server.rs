//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, request ID, body limit, timeout, metrics)
//! - Bind server to listener
//! - Stop accepting on shutdown and cancel in-flight inclusion waits

use axum::{
    extract::{MatchedPath, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ServiceConfig;
use crate::disbursement::TransactionDispatcher;
use crate::http::handlers;
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<TransactionDispatcher>,
    pub config: Arc<ServiceConfig>,
    /// Parent of every per-request inclusion-wait token.
    pub cancel: CancellationToken,
}

/// HTTP server for the disbursement API.
pub struct HttpServer {
    router: Router,
    config: Arc<ServiceConfig>,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new HTTP server around an assembled dispatcher.
    pub fn new(config: ServiceConfig, dispatcher: Arc<TransactionDispatcher>) -> Self {
        let config = Arc::new(config);
        let cancel = CancellationToken::new();
        let state = AppState {
            dispatcher,
            config: config.clone(),
            cancel: cancel.clone(),
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            cancel,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServiceConfig, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/", get(handlers::service_info))
            .route("/health", get(handlers::health))
            .route("/status", get(handlers::status))
            .route("/balance", get(handlers::balance))
            .route("/transfers", post(handlers::transfer))
            .route("/transfers/treasury", post(handlers::transfer_to_treasury))
            .route("/disbursements", post(handlers::disburse));

        for path in handlers::TRANSFER_ALIASES {
            router = router.route(path, post(handlers::transfer));
        }
        for path in handlers::TREASURY_ALIASES {
            router = router.route(path, post(handlers::transfer_to_treasury));
        }
        for path in handlers::DISBURSEMENT_ALIASES {
            router = router.route(path, post(handlers::disburse));
        }

        router
            .route_layer(middleware::from_fn(track_metrics))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
                    // Innermost: its response body must be `Default`
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        config.timeouts.request_secs,
                    ))),
            )
    }

    /// The router, for serving without a listener (tests, embedding).
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            treasury = %self.config.account.treasury_address,
            "HTTP server starting"
        );

        let cancel = self.cancel.clone();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining requests");
                // Pending inclusion waits return instead of holding the drain open
                cancel.cancel();
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

async fn track_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = request.method().to_string();

    let response = next.run(request).await;
    metrics::record_request(&method, response.status().as_u16(), &route, start);
    response
}
