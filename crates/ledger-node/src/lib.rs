//! HTTP node exposing a [`Ledger`] to clients and peers.
pub mod config;
mod constants;
pub mod error;
pub mod peers;
pub mod routes;

use axum::{
    routing::{get, post},
    Router,
};
use config::NodeConfig;
use error::ApiError;
use ledger_core::{consensus::Resolver, Ledger};
use peers::HttpChainSource;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared by every handler. The ledger is the only mutable part.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Mutex<Ledger>>,
    pub resolver: Arc<Resolver<HttpChainSource>>,
    pub config: Arc<NodeConfig>,
}

impl AppState {
    /// Fresh ledger with the configured peers already registered.
    pub fn new(config: NodeConfig) -> anyhow::Result<Self> {
        let source = HttpChainSource::new(config.peer_timeout)?;
        let resolver = Resolver::new(source).with_validation(config.validation);

        let mut ledger = Ledger::new();
        for peer in &config.peers {
            ledger.register_node(peer.clone());
        }

        Ok(Self {
            ledger: Arc::new(Mutex::new(ledger)),
            resolver: Arc::new(resolver),
            config: Arc::new(config),
        })
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, Ledger>, ApiError> {
        self.ledger.lock().map_err(|_| ApiError::Poisoned)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/mine", get(routes::mine))
        .route("/transactions/new", post(routes::new_transaction))
        .route("/chain", get(routes::full_chain))
        .route("/nodes/register", post(routes::register_nodes))
        .route("/nodes/resolve", get(routes::consensus))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` completes.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    info!(
        addr = %listener.local_addr()?,
        node_id = %state.config.node_id,
        difficulty = state.config.pow.difficulty(),
        "ledger-node listening"
    );
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
