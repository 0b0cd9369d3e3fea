// Proof of work over block contents

use std::sync::atomic::{AtomicBool, Ordering};

use num_bigint::BigUint;

use crate::core::{sha256, Block, Hash256};
use crate::error::{Error, Result};

/// Required number of leading zero bits in a block hash. Fixed for the whole
/// chain; there is no retargeting.
pub const DIFFICULTY: u64 = 12;

/// The puzzle for one block: find a nonce such that
/// `SHA256(prev_hash || merkle_root || timestamp || difficulty || nonce)`,
/// read as a big-endian integer, falls below `2^(256 - DIFFICULTY)`.
pub struct ProofOfWork<'a> {
    block: &'a Block,
    merkle_root: Hash256,
    target: BigUint,
}

impl<'a> ProofOfWork<'a> {
    pub fn new(block: &'a Block) -> Result<Self> {
        Ok(Self {
            block,
            merkle_root: block.hash_transactions()?,
            target: BigUint::from(1u8) << (256 - DIFFICULTY as usize),
        })
    }

    /// Assemble the hashing preimage for one nonce. Integers are big-endian
    /// fixed width.
    fn prepare_data(&self, nonce: i64) -> Vec<u8> {
        let mut data = Vec::with_capacity(32 + 32 + 8 + 8 + 8);
        data.extend_from_slice(self.block.prev_hash.as_bytes());
        data.extend_from_slice(self.merkle_root.as_bytes());
        data.extend_from_slice(&self.block.timestamp.to_be_bytes());
        data.extend_from_slice(&DIFFICULTY.to_be_bytes());
        data.extend_from_slice(&nonce.to_be_bytes());
        data
    }

    /// Iterate nonces from zero until the target is met. Returns the lowest
    /// satisfying nonce and its hash. Checks `cancel` between attempts.
    pub fn run(&self, cancel: &AtomicBool) -> Result<(i64, Hash256)> {
        let mut nonce: i64 = 0;
        loop {
            if cancel.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }

            let hash = sha256(&self.prepare_data(nonce));
            if BigUint::from_bytes_be(&hash) < self.target {
                log::debug!("found nonce {} for block at height {}", nonce, self.block.height);
                return Ok((nonce, Hash256::new(hash)));
            }

            if nonce == i64::MAX {
                return Err(Error::MiningExhausted);
            }
            nonce += 1;

            if nonce % 100_000 == 0 {
                log::debug!("mining attempts: {}", nonce);
            }
        }
    }

    /// Recompute the puzzle with the block's stored nonce.
    pub fn validate(&self) -> bool {
        let hash = sha256(&self.prepare_data(self.block.nonce));
        BigUint::from_bytes_be(&hash) < self.target
    }
}
