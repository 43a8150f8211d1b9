use crate::constants::{GENESIS_PREVIOUS_HASH, GENESIS_PROOF};
use crate::pow::ProofOfWork;
use crate::{unix_now, Block, ChainSnapshot, LedgerError, Transaction};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// A node's view of the chain plus the transactions waiting for the next
/// block and the peers it knows about.
///
/// All mutation goes through the methods below; callers sharing a ledger
/// between tasks wrap it in a single mutex and keep proof search outside it
/// (see [`Ledger::forge_mined`]).
#[derive(Clone, Debug)]
pub struct Ledger {
    chain: Vec<Block>,
    current_transactions: Vec<Transaction>,
    nodes: BTreeSet<String>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// A ledger holding only the genesis block.
    pub fn new() -> Self {
        let mut ledger = Self {
            chain: Vec::new(),
            current_transactions: Vec::new(),
            nodes: BTreeSet::new(),
        };
        ledger.push_block(GENESIS_PROOF, GENESIS_PREVIOUS_HASH.to_string());
        ledger
    }

    fn push_block(&mut self, proof: u64, previous_hash: String) -> Block {
        let block = Block {
            index: self.chain.len() as u64 + 1,
            timestamp: unix_now(),
            transactions: std::mem::take(&mut self.current_transactions),
            proof,
            previous_hash,
        };
        self.chain.push(block.clone());
        block
    }

    /// Append a block carrying every pending transaction. Without an explicit
    /// `previous_hash` the hash of the current last block is used.
    pub fn new_block(
        &mut self,
        proof: u64,
        previous_hash: Option<String>,
    ) -> Result<Block, LedgerError> {
        let previous_hash = match previous_hash {
            Some(hash) => hash,
            None => self.last_block()?.hash_hex(),
        };
        let block = self.push_block(proof, previous_hash);
        info!(
            index = block.index,
            proof = block.proof,
            txs = block.transactions.len(),
            "forged block"
        );
        Ok(block)
    }

    /// Queue a transaction and return the index of the next block to be
    /// forged. Best effort: another block may be forged first.
    pub fn new_transaction(
        &mut self,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: i64,
    ) -> u64 {
        let tx = Transaction::new(sender, recipient, amount);
        debug!(sender = %tx.sender, recipient = %tx.recipient, amount, "queued transaction");
        self.current_transactions.push(tx);
        self.chain.len() as u64 + 1
    }

    /// Record a normalized `host:port` peer. Returns `false` if it was
    /// already known.
    pub fn register_node(&mut self, address: impl Into<String>) -> bool {
        let address = address.into();
        let added = self.nodes.insert(address.clone());
        if added {
            info!(peer = %address, "registered peer");
        }
        added
    }

    pub fn last_block(&self) -> Result<&Block, LedgerError> {
        self.chain.last().ok_or(LedgerError::EmptyChain)
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.current_transactions
    }

    pub fn nodes(&self) -> impl Iterator<Item = &String> {
        self.nodes.iter()
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot::new(self.chain.clone())
    }

    /// Solve the next proof, pay `node_id` the mining reward and forge the
    /// block. Blocks the caller for the whole search.
    pub fn mine(&mut self, pow: &ProofOfWork, node_id: &str) -> Result<Block, LedgerError> {
        let last_proof = self.last_block()?.proof;
        let proof = pow.solve(last_proof);
        self.forge_mined(last_proof, proof, node_id)
    }

    /// Second half of mining once `proof` was found for `last_proof` outside
    /// any lock. Fails with [`LedgerError::StaleProof`] and leaves the ledger
    /// untouched if the last block changed in the meantime.
    pub fn forge_mined(
        &mut self,
        last_proof: u64,
        proof: u64,
        node_id: &str,
    ) -> Result<Block, LedgerError> {
        let last = self.last_block()?;
        if last.proof != last_proof {
            return Err(LedgerError::StaleProof {
                expected: last_proof,
                actual: last.proof,
            });
        }
        let previous_hash = last.hash_hex();
        self.current_transactions.push(Transaction::reward(node_id));
        self.new_block(proof, Some(previous_hash))
    }

    /// Swap in `candidate` if it is strictly longer than the current chain.
    /// Pending transactions are kept.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> bool {
        if candidate.len() <= self.chain.len() {
            debug!(
                local = self.chain.len(),
                candidate = candidate.len(),
                "candidate no longer longer than local chain"
            );
            return false;
        }
        info!(
            from = self.chain.len(),
            to = candidate.len(),
            "replacing local chain"
        );
        self.chain = candidate;
        true
    }
}
