//! HTTP handlers. Each one takes the ledger lock only for short, synchronous
//! sections; proof search and peer requests run without it.
use crate::constants::MAX_MINING_ATTEMPTS;
use crate::error::ApiError;
use crate::peers::normalize_address;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use ledger_core::{Block, ChainSnapshot, LedgerError, Transaction};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Serialize, Deserialize)]
pub struct Health {
    pub status: String,
}

pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok".into(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MineResponse {
    pub message: String,
    pub index: u64,
    pub transactions: Vec<Transaction>,
    pub proof: u64,
    pub previous_hash: String,
}

impl From<Block> for MineResponse {
    fn from(block: Block) -> Self {
        Self {
            message: "New block forged".into(),
            index: block.index,
            transactions: block.transactions,
            proof: block.proof,
            previous_hash: block.previous_hash,
        }
    }
}

/// GET /mine
pub async fn mine(State(state): State<AppState>) -> Result<Json<MineResponse>, ApiError> {
    let pow = state.config.pow;
    let mut last_err = None;
    for _ in 0..MAX_MINING_ATTEMPTS {
        let last_proof = state.lock()?.last_block()?.proof;
        let proof = tokio::task::spawn_blocking(move || pow.solve_parallel(last_proof))
            .await
            .map_err(|e| ApiError::Mining(e.to_string()))?;

        let forged = {
            let mut ledger = state.lock()?;
            ledger.forge_mined(last_proof, proof, &state.config.node_id)
        };
        match forged {
            Ok(block) => return Ok(Json(block.into())),
            Err(err @ LedgerError::StaleProof { .. }) => {
                debug!(error = %err, "chain moved during proof search, retrying");
                last_err = Some(err);
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(last_err.unwrap_or(LedgerError::EmptyChain).into())
}

/// Every field is optional on the wire so a missing one is a 400 with a plain
/// message; wrongly typed fields are mapped to 400 through `JsonRejection`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TransactionIn {
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// POST /transactions/new
pub async fn new_transaction(
    State(state): State<AppState>,
    body: Result<Json<TransactionIn>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let Json(body) = body?;
    let (Some(sender), Some(recipient), Some(amount)) = (body.sender, body.recipient, body.amount)
    else {
        return Err(ApiError::Validation("Missing values".into()));
    };
    let index = state.lock()?.new_transaction(sender, recipient, amount);
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: format!("Transaction will be added to block {index}"),
        }),
    ))
}

/// GET /chain
pub async fn full_chain(State(state): State<AppState>) -> Result<Json<ChainSnapshot>, ApiError> {
    let snapshot = state.lock()?.snapshot();
    Ok(Json(snapshot))
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NodesIn {
    #[serde(default)]
    pub nodes: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub message: String,
    pub total_nodes: Vec<String>,
}

/// POST /nodes/register
///
/// Addresses are normalized up front; one bad entry rejects the whole batch.
pub async fn register_nodes(
    State(state): State<AppState>,
    body: Result<Json<NodesIn>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let invalid_list = || ApiError::Validation("Error: please supply a valid list of nodes".into());
    let Json(body) = body.map_err(|_| invalid_list())?;
    let nodes = body.nodes.ok_or_else(invalid_list)?;
    let addresses = nodes
        .iter()
        .map(|n| normalize_address(n))
        .collect::<Result<Vec<_>, _>>()?;

    let total_nodes = {
        let mut ledger = state.lock()?;
        for address in addresses {
            ledger.register_node(address);
        }
        ledger.nodes().cloned().collect::<Vec<_>>()
    };
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "New nodes have been added".into(),
            total_nodes,
        }),
    ))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResolveResponse {
    Replaced { message: String, new_chain: Vec<Block> },
    Authoritative { message: String, chain: Vec<Block> },
}

impl ResolveResponse {
    pub fn new(replaced: bool, chain: Vec<Block>) -> Self {
        if replaced {
            ResolveResponse::Replaced {
                message: "Our chain was replaced".into(),
                new_chain: chain,
            }
        } else {
            ResolveResponse::Authoritative {
                message: "Our chain is authoritative".into(),
                chain,
            }
        }
    }
}

/// GET /nodes/resolve
pub async fn consensus(State(state): State<AppState>) -> Result<Json<ResolveResponse>, ApiError> {
    let (peers, local_length) = {
        let ledger = state.lock()?;
        (ledger.nodes().cloned().collect::<Vec<_>>(), ledger.len())
    };

    let candidate = state.resolver.longest_valid(&peers, local_length).await;

    let mut ledger = state.lock()?;
    let replaced = match candidate {
        Some(chain) => ledger.replace_chain(chain),
        None => false,
    };
    info!(replaced, length = ledger.len(), peers = peers.len(), "consensus round finished");
    Ok(Json(ResolveResponse::new(replaced, ledger.chain().to_vec())))
}
