use thiserror::Error;

/// Failures raised by [`crate::ledger::Ledger`] operations. None of them leave
/// the ledger partially mutated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("chain is empty; genesis block missing")]
    EmptyChain,

    #[error("proof was solved against proof {expected} but the last block now has proof {actual}")]
    StaleProof { expected: u64, actual: u64 },
}

/// Why a peer's chain could not be used during consensus resolution.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("peer {peer} unreachable: {reason}")]
    Unreachable { peer: String, reason: String },

    #[error("peer {peer} answered with status {status}")]
    Status { peer: String, status: u16 },

    #[error("peer {peer} sent an invalid chain response: {reason}")]
    InvalidResponse { peer: String, reason: String },
}
