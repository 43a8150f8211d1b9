use crate::constants::{DEFAULT_LISTEN, DEFAULT_PEER_TIMEOUT_SECS, NODE_ID_BYTES};
use crate::peers::{normalize_address, AddressError};
use clap::Parser;
use ledger_core::{chain::Validation, constants::POW_DIFFICULTY, pow::ProofOfWork};
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "ledger-node")]
#[command(about = "Proof-of-work ledger node with longest-chain consensus")]
pub struct Args {
    /// Address to listen on, e.g. 127.0.0.1:5000
    #[arg(long, default_value = DEFAULT_LISTEN)]
    pub listen: String,

    /// Identifier credited with mining rewards (random if omitted)
    #[arg(long)]
    pub node_id: Option<String>,

    /// Leading zero hex digits a proof hash must have
    #[arg(long, default_value_t = POW_DIFFICULTY)]
    pub difficulty: usize,

    /// Per-peer timeout while resolving conflicts, in seconds
    #[arg(long, default_value_t = DEFAULT_PEER_TIMEOUT_SECS)]
    pub peer_timeout_secs: u64,

    /// Also check every proof when validating peer chains
    #[arg(long)]
    pub strict_validation: bool,

    /// Peer to register at startup (repeatable), e.g. http://127.0.0.1:5001
    #[arg(long = "peer")]
    pub peers: Vec<String>,
}

impl Args {
    pub fn node_config(&self) -> Result<NodeConfig, AddressError> {
        let pow = ProofOfWork::new(self.difficulty);
        let peers = self
            .peers
            .iter()
            .map(|p| normalize_address(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(NodeConfig {
            node_id: self.node_id.clone().unwrap_or_else(random_node_id),
            pow,
            peer_timeout: Duration::from_secs(self.peer_timeout_secs),
            validation: if self.strict_validation {
                Validation::Strict(pow)
            } else {
                Validation::Linkage
            },
            peers,
        })
    }
}

/// Runtime settings shared by every request handler.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub node_id: String,
    pub pow: ProofOfWork,
    pub peer_timeout: Duration,
    pub validation: Validation,
    /// Already normalized `host:port` peers.
    pub peers: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: random_node_id(),
            pow: ProofOfWork::default(),
            peer_timeout: Duration::from_secs(DEFAULT_PEER_TIMEOUT_SECS),
            validation: Validation::default(),
            peers: Vec::new(),
        }
    }
}

pub fn random_node_id() -> String {
    hex::encode(rand::random::<[u8; NODE_ID_BYTES]>())
}
