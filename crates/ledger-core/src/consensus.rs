//! Longest-chain conflict resolution.
//!
//! Peers are asked for their `{chain, length}` snapshot through a
//! [`ChainSource`]. Any strictly longer chain that passes validation becomes
//! the candidate; the longest candidate seen wins. Peers that fail to answer,
//! answer badly, or serve an invalid chain are skipped.
use crate::chain::Validation;
use crate::{Block, ChainSnapshot, Ledger, PeerError};
use std::future::Future;
use tracing::{debug, info, warn};

/// Where peer chains come from. The node implements this over HTTP; tests use
/// in-memory maps.
pub trait ChainSource {
    fn fetch_chain(
        &self,
        peer: &str,
    ) -> impl Future<Output = Result<ChainSnapshot, PeerError>> + Send;
}

#[derive(Clone, Debug)]
pub struct Resolver<S> {
    source: S,
    validation: Validation,
}

impl<S: ChainSource + Sync> Resolver<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            validation: Validation::default(),
        }
    }

    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }

    /// One pass over `peers`. Returns the longest valid chain strictly longer
    /// than `local_length`, if any. Ties keep the earlier candidate.
    pub async fn longest_valid(&self, peers: &[String], local_length: usize) -> Option<Vec<Block>> {
        let mut max_length = local_length;
        let mut new_chain = None;

        for peer in peers {
            let snapshot = match self.source.fetch_chain(peer).await {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!(%peer, error = %err, "skipping peer");
                    continue;
                }
            };

            if snapshot.length != snapshot.chain.len() {
                let err = PeerError::InvalidResponse {
                    peer: peer.clone(),
                    reason: format!(
                        "reported length {} but sent {} blocks",
                        snapshot.length,
                        snapshot.chain.len()
                    ),
                };
                warn!(error = %err, "skipping peer");
                continue;
            }

            if snapshot.length <= max_length {
                debug!(%peer, length = snapshot.length, max_length, "peer chain not longer");
                continue;
            }

            if !self.validation.check(&snapshot.chain) {
                warn!(%peer, length = snapshot.length, "peer served an invalid chain");
                continue;
            }

            debug!(%peer, length = snapshot.length, "new longest valid chain");
            max_length = snapshot.length;
            new_chain = Some(snapshot.chain);
        }

        new_chain
    }

    /// Resolve against every peer registered in `ledger` and adopt the winner.
    /// Holds `ledger` for the whole run; shared ledgers should call
    /// [`Resolver::longest_valid`] without the lock and
    /// [`Ledger::replace_chain`] with it.
    pub async fn resolve(&self, ledger: &mut Ledger) -> bool {
        let peers: Vec<String> = ledger.nodes().cloned().collect();
        let replaced = match self.longest_valid(&peers, ledger.len()).await {
            Some(chain) => ledger.replace_chain(chain),
            None => false,
        };
        info!(replaced, length = ledger.len(), "consensus round finished");
        replaced
    }
}
