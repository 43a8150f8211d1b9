#![allow(dead_code)]

use ledger_core::pow::ProofOfWork;
use ledger_node::{config::NodeConfig, serve, AppState};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Low enough that mining over HTTP stays fast in debug builds.
pub const TEST_DIFFICULTY: usize = 2;

pub struct TestNode {
    pub addr: SocketAddr,
    pub base: String,
    pub state: AppState,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestNode {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// `host:port` form stored in peer sets.
    pub fn peer_address(&self) -> String {
        self.addr.to_string()
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn test_config(node_id: &str) -> NodeConfig {
    NodeConfig {
        node_id: node_id.to_string(),
        pow: ProofOfWork::new(TEST_DIFFICULTY),
        peer_timeout: Duration::from_secs(2),
        ..NodeConfig::default()
    }
}

pub async fn spawn_node(node_id: &str) -> anyhow::Result<TestNode> {
    spawn_node_with(test_config(node_id)).await
}

pub async fn spawn_node_with(config: NodeConfig) -> anyhow::Result<TestNode> {
    let state = AppState::new(config)?;
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(serve(listener, state.clone(), std::future::pending()));
    Ok(TestNode {
        addr,
        base: format!("http://{addr}"),
        state,
        handle,
    })
}
