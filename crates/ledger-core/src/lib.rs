pub mod consensus;
pub mod constants;
pub mod error;
pub mod ledger;
pub mod mine;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub use error::{LedgerError, PeerError};
pub use ledger::Ledger;

pub type Hash = [u8; 32];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: i64,
}

impl Transaction {
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: i64) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
        }
    }

    /// The coinbase-style payout a node grants itself for forging a block.
    pub fn reward(node_id: impl Into<String>) -> Self {
        Self::new(
            constants::REWARD_SENDER,
            node_id,
            constants::MINING_REWARD,
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub proof: u64,
    pub previous_hash: String,
}

impl Block {
    /// Fixed-order encoding of every field. Strings and the transaction list
    /// are length-prefixed so adjacent fields cannot bleed into each other.
    pub fn hash_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + 8 + 8 + 8 + self.previous_hash.len() + 8);
        bytes.extend_from_slice(&self.index.to_le_bytes());
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        bytes.extend_from_slice(&self.proof.to_le_bytes());
        put_str(&mut bytes, &self.previous_hash);
        bytes.extend_from_slice(&(self.transactions.len() as u64).to_le_bytes());
        for tx in &self.transactions {
            put_str(&mut bytes, &tx.sender);
            put_str(&mut bytes, &tx.recipient);
            bytes.extend_from_slice(&tx.amount.to_le_bytes());
        }
        bytes
    }

    pub fn hash(&self) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.hash_bytes());
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest[..]);
        out
    }

    /// Hex form of [`Block::hash`], the value stored in the next block's
    /// `previous_hash`.
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash())
    }
}

fn put_str(bytes: &mut Vec<u8>, s: &str) {
    bytes.extend_from_slice(&(s.len() as u64).to_le_bytes());
    bytes.extend_from_slice(s.as_bytes());
}

/// Wire view of a ledger, served by `GET /chain` and consumed during
/// consensus resolution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub chain: Vec<Block>,
    pub length: usize,
}

impl ChainSnapshot {
    pub fn new(chain: Vec<Block>) -> Self {
        let length = chain.len();
        Self { chain, length }
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

pub mod pow {
    use super::Hash;
    use crate::constants::{HASH_HEX_SIZE, POW_DIFFICULTY};
    use sha2::{Digest, Sha256};
    use std::sync::atomic::{AtomicBool, Ordering};

    const CANCEL_CHECK_INTERVAL: u64 = 4096;

    /// Proof predicate: `sha256("{last_proof}{proof}")` must start with
    /// `difficulty` zero hex digits.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ProofOfWork {
        difficulty: usize,
    }

    impl Default for ProofOfWork {
        fn default() -> Self {
            Self {
                difficulty: POW_DIFFICULTY,
            }
        }
    }

    impl ProofOfWork {
        pub fn new(difficulty: usize) -> Self {
            Self {
                difficulty: difficulty.min(HASH_HEX_SIZE),
            }
        }

        pub fn difficulty(&self) -> usize {
            self.difficulty
        }

        pub fn is_valid(&self, last_proof: u64, proof: u64) -> bool {
            leading_zero_digits(&guess_hash(last_proof, proof)) >= self.difficulty
        }

        /// Smallest proof accepted after `last_proof`. No upper bound.
        pub fn solve(&self, last_proof: u64) -> u64 {
            let mut proof = 0u64;
            while !self.is_valid(last_proof, proof) {
                proof += 1;
            }
            proof
        }

        /// Like [`ProofOfWork::solve`], but gives up with `None` once `cancel`
        /// is raised.
        pub fn solve_cancellable(&self, last_proof: u64, cancel: &AtomicBool) -> Option<u64> {
            let mut proof = 0u64;
            loop {
                if proof % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
                    return None;
                }
                if self.is_valid(last_proof, proof) {
                    return Some(proof);
                }
                proof = proof.checked_add(1)?;
            }
        }
    }

    /// Hash of the decimal text of both proofs, concatenated.
    pub fn guess_hash(last_proof: u64, proof: u64) -> Hash {
        let guess = format!("{last_proof}{proof}");
        let digest = Sha256::digest(guess.as_bytes());
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest[..]);
        out
    }

    /// Number of leading `0` characters in the hex rendering of `hash`.
    pub fn leading_zero_digits(hash: &Hash) -> usize {
        let mut total = 0usize;
        for b in hash {
            if *b == 0 {
                total += 2;
            } else {
                if b >> 4 == 0 {
                    total += 1;
                }
                break;
            }
        }
        total
    }

    pub fn valid_proof(last_proof: u64, proof: u64) -> bool {
        ProofOfWork::default().is_valid(last_proof, proof)
    }

    pub fn proof_of_work(last_proof: u64) -> u64 {
        ProofOfWork::default().solve(last_proof)
    }
}

pub mod chain {
    use super::Block;
    use crate::pow::ProofOfWork;
    use tracing::debug;

    /// How much of a candidate chain is checked before it may replace ours.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub enum Validation {
        /// `previous_hash` linkage only.
        #[default]
        Linkage,
        /// Linkage plus the proof relation between neighbouring blocks.
        Strict(ProofOfWork),
    }

    impl Validation {
        pub fn check(&self, chain: &[Block]) -> bool {
            match self {
                Validation::Linkage => valid_chain(chain),
                Validation::Strict(pow) => valid_chain_strict(chain, pow),
            }
        }
    }

    /// Walks adjacent pairs and stops at the first broken hash link. Empty and
    /// single-block chains are valid.
    pub fn valid_chain(chain: &[Block]) -> bool {
        chain.windows(2).all(|pair| linked(&pair[0], &pair[1]))
    }

    pub fn valid_chain_strict(chain: &[Block], pow: &ProofOfWork) -> bool {
        chain.windows(2).all(|pair| {
            let (prev, curr) = (&pair[0], &pair[1]);
            if !linked(prev, curr) {
                return false;
            }
            let ok = pow.is_valid(prev.proof, curr.proof);
            if !ok {
                debug!(index = curr.index, proof = curr.proof, "proof does not satisfy predicate");
            }
            ok
        })
    }

    fn linked(prev: &Block, curr: &Block) -> bool {
        let expected = prev.hash_hex();
        if curr.previous_hash != expected {
            debug!(
                index = curr.index,
                expected = %expected,
                found = %curr.previous_hash,
                "broken hash link"
            );
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn sample_block() -> Block {
        Block {
            index: 2,
            timestamp: 1_600_000_200,
            transactions: vec![
                Transaction::new("Alice", "Bob", 10),
                Transaction::new("Bob", "Charlie", 5),
            ],
            proof: 35_293,
            previous_hash: "1".to_string(),
        }
    }

    #[test]
    fn leading_zero_digits_examples() {
        let mut h = [0u8; 32];
        assert_eq!(pow::leading_zero_digits(&h), 64);
        h[0] = 0x0F; // "0f"
        assert_eq!(pow::leading_zero_digits(&h), 1);
        h = [0u8; 32];
        h[1] = 0x80; // "0080"
        assert_eq!(pow::leading_zero_digits(&h), 2);
        h[1] = 0x04; // "0004"
        assert_eq!(pow::leading_zero_digits(&h), 3);
        h[0] = 0xA0;
        assert_eq!(pow::leading_zero_digits(&h), 0);
    }

    #[test]
    fn valid_proof_hashes_concatenated_text() {
        // "1" followed by "2" must hash the same as the literal "12".
        let digest = Sha256::digest(b"12");
        assert_eq!(pow::guess_hash(1, 2).as_slice(), &digest[..]);
        assert_ne!(pow::guess_hash(1, 2), pow::guess_hash(12, 0));
    }

    #[test]
    fn solve_finds_a_valid_proof() {
        let pow = pow::ProofOfWork::default();
        let proof = pow.solve(100);
        assert!(pow.is_valid(100, proof));
        assert!(hex::encode(pow::guess_hash(100, proof)).starts_with("0000"));
    }

    #[test]
    fn solve_returns_the_smallest_proof() {
        let pow = pow::ProofOfWork::new(2);
        let proof = pow.solve(7);
        assert!((0..proof).all(|p| !pow.is_valid(7, p)));
        assert_eq!(pow.solve(7), proof);
    }

    #[test]
    fn free_functions_use_default_difficulty() {
        let proof = pow::proof_of_work(100);
        assert!(pow::valid_proof(100, proof));
        assert_eq!(proof, pow::ProofOfWork::default().solve(100));
    }

    #[test]
    fn zero_difficulty_accepts_anything() {
        let pow = pow::ProofOfWork::new(0);
        assert_eq!(pow.solve(42), 0);
        assert!(pow.is_valid(42, 12345));
    }

    #[test]
    fn difficulty_is_capped_at_digest_length() {
        assert_eq!(pow::ProofOfWork::new(500).difficulty(), constants::HASH_HEX_SIZE);
    }

    #[test]
    fn cancelled_search_gives_up() {
        let pow = pow::ProofOfWork::new(constants::HASH_HEX_SIZE);
        let cancel = AtomicBool::new(true);
        assert_eq!(pow.solve_cancellable(1, &cancel), None);
    }

    #[test]
    fn cancellable_search_matches_solve() {
        let pow = pow::ProofOfWork::new(3);
        let cancel = AtomicBool::new(false);
        assert_eq!(pow.solve_cancellable(9, &cancel), Some(pow.solve(9)));
    }

    #[test]
    fn block_hash_consistency() {
        let block = sample_block();
        assert_eq!(block.hash(), block.hash());
        assert_eq!(block.hash_hex().len(), constants::HASH_HEX_SIZE);
    }

    #[test]
    fn block_hash_ignores_json_key_order() {
        let a = r#"{"index":2,"timestamp":1600000200,"transactions":[{"sender":"Alice","recipient":"Bob","amount":10},{"sender":"Bob","recipient":"Charlie","amount":5}],"proof":35293,"previous_hash":"1"}"#;
        let b = r#"{"previous_hash":"1","proof":35293,"transactions":[{"amount":10,"recipient":"Bob","sender":"Alice"},{"recipient":"Charlie","amount":5,"sender":"Bob"}],"timestamp":1600000200,"index":2}"#;
        let a: Block = serde_json::from_str(a).unwrap();
        let b: Block = serde_json::from_str(b).unwrap();
        assert_eq!(a.hash_hex(), b.hash_hex());
        assert_eq!(a.hash_hex(), sample_block().hash_hex());
    }

    #[test]
    fn block_hash_survives_json_transport() {
        let block = sample_block();
        let json = serde_json::to_string(&block).unwrap();
        let back: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(block.hash(), back.hash());
    }

    #[test]
    fn block_hash_changes_with_every_field() {
        let base = sample_block();
        let mut b = base.clone();
        b.proof += 1;
        assert_ne!(base.hash(), b.hash());
        let mut b = base.clone();
        b.timestamp += 1;
        assert_ne!(base.hash(), b.hash());
        let mut b = base.clone();
        b.transactions[0].amount = 11;
        assert_ne!(base.hash(), b.hash());
        let mut b = base.clone();
        b.transactions.pop();
        assert_ne!(base.hash(), b.hash());
    }

    #[test]
    fn length_prefix_separates_string_fields() {
        let mut a = sample_block();
        a.transactions = vec![Transaction::new("ab", "c", 1)];
        let mut b = a.clone();
        b.transactions = vec![Transaction::new("a", "bc", 1)];
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn block_serialization_shape() {
        let json = serde_json::to_value(sample_block()).unwrap();
        assert_eq!(json["index"], 2);
        assert_eq!(json["previous_hash"], "1");
        assert_eq!(json["transactions"][0]["sender"], "Alice");
        assert_eq!(json["transactions"][0]["recipient"], "Bob");
        assert_eq!(json["transactions"][0]["amount"], 10);
    }

    #[test]
    fn reward_transaction() {
        let tx = Transaction::reward("node-a");
        assert_eq!(tx.sender, "0");
        assert_eq!(tx.recipient, "node-a");
        assert_eq!(tx.amount, 1);
    }

    #[test]
    fn valid_chain_trivial_cases() {
        assert!(chain::valid_chain(&[]));
        assert!(chain::valid_chain(&[sample_block()]));
    }

    #[test]
    fn valid_chain_detects_tampering() {
        let mut ledger = Ledger::new();
        for proof in 1..=4 {
            ledger.new_transaction("alice", "bob", proof as i64);
            ledger.new_block(proof, None).unwrap();
        }
        let mut blocks = ledger.chain().to_vec();
        assert!(chain::valid_chain(&blocks));
        blocks[3].previous_hash = "deadbeef".into();
        assert!(!chain::valid_chain(&blocks));

        // Altering the content of a block breaks the link held by its successor.
        let mut blocks = ledger.chain().to_vec();
        blocks[1].transactions[0].amount = 1_000;
        assert!(!chain::valid_chain(&blocks));
    }

    #[test]
    fn strict_validation_checks_proofs() {
        let pow = pow::ProofOfWork::new(2);
        let mut ledger = Ledger::new();
        ledger.mine(&pow, "miner").unwrap();
        ledger.mine(&pow, "miner").unwrap();
        assert!(chain::valid_chain_strict(ledger.chain(), &pow));

        // Linked, but the proof was never solved.
        let mut lazy = Ledger::new();
        let bogus = (0..).find(|p| !pow.is_valid(constants::GENESIS_PROOF, *p)).unwrap();
        lazy.new_block(bogus, None).unwrap();
        assert!(chain::valid_chain(lazy.chain()));
        assert!(!chain::valid_chain_strict(lazy.chain(), &pow));
        assert!(chain::Validation::Linkage.check(lazy.chain()));
        assert!(!chain::Validation::Strict(pow).check(lazy.chain()));
    }

    #[test]
    fn snapshot_length_matches_chain() {
        let snap = ChainSnapshot::new(vec![sample_block()]);
        assert_eq!(snap.length, 1);
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["length"], 1);
        assert!(json["chain"].is_array());
    }
}
