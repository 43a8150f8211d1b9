use crate::pow::ProofOfWork;
use rayon::prelude::*;
use tracing::debug;

/// Candidates handed to the thread pool per round.
const PROOFS_PER_BATCH: u64 = 1 << 14;

impl ProofOfWork {
    /// Searches proofs in parallel, one batch at a time, and returns the same
    /// (smallest) proof as [`ProofOfWork::solve`].
    pub fn solve_parallel(&self, last_proof: u64) -> u64 {
        let mut start = 0u64;
        loop {
            let end = start.saturating_add(PROOFS_PER_BATCH);
            // find_first keeps the lowest match of the batch, so the result
            // does not depend on thread scheduling.
            let found = (start..end)
                .into_par_iter()
                .find_first(|proof| self.is_valid(last_proof, *proof));
            if let Some(proof) = found {
                debug!(last_proof, proof, "parallel proof search finished");
                return proof;
            }
            start = end;
        }
    }
}
