// Block assembly and serialization

use std::io::{Cursor, Read};
use std::sync::atomic::AtomicBool;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::consensus::ProofOfWork;
use crate::core::serialize::{read_array, read_varint, write_varint};
use crate::core::{Hash256, MerkleTree, Serializable, Transaction};
use crate::error::Result;

/// A mined block. Immutable once created: `hash` and `nonce` are filled by
/// proof-of-work during assembly, never afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub timestamp: i64,
    pub hash: Hash256,
    pub transactions: Vec<Transaction>,
    pub prev_hash: Hash256,
    pub nonce: i64,
    pub height: u64,
}

impl Block {
    /// Assemble and mine a block. The caller is responsible for having
    /// verified the transactions beforehand.
    pub fn create(
        transactions: Vec<Transaction>,
        prev_hash: Hash256,
        height: u64,
        cancel: &AtomicBool,
    ) -> Result<Self> {
        let mut block = Self {
            timestamp: unix_now(),
            hash: Hash256::zero(),
            transactions,
            prev_hash,
            nonce: 0,
            height,
        };

        let (nonce, hash) = {
            let pow = ProofOfWork::new(&block)?;
            pow.run(cancel)?
        };
        block.nonce = nonce;
        block.hash = hash;
        Ok(block)
    }

    /// The first block of a chain: empty `prev_hash`, height zero.
    pub fn genesis(coinbase: Transaction) -> Result<Self> {
        Self::create(vec![coinbase], Hash256::zero(), 0, &AtomicBool::new(false))
    }

    /// Merkle root over the serialized transactions, in block order.
    pub fn hash_transactions(&self) -> Result<Hash256> {
        let leaves: Vec<Vec<u8>> = self.transactions.iter().map(|tx| tx.serialize()).collect();
        Ok(MerkleTree::new(&leaves)?.root_hash())
    }

    pub fn is_genesis(&self) -> bool {
        self.prev_hash.is_zero()
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}

impl Serializable for Block {
    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(self.hash.as_bytes());
        buf.extend_from_slice(self.prev_hash.as_bytes());
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        buf.extend_from_slice(&self.height.to_le_bytes());
        write_varint(&mut buf, self.transactions.len() as u64);
        for tx in &self.transactions {
            buf.extend_from_slice(&tx.serialize());
        }
        buf
    }

    fn deserialize(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        Self::read_from(&mut cursor)
    }
}

impl Block {
    fn read_from(reader: &mut impl Read) -> Result<Self> {
        let timestamp = i64::from_le_bytes(read_array(reader)?);
        let hash = Hash256::new(read_array(reader)?);
        let prev_hash = Hash256::new(read_array(reader)?);
        let nonce = i64::from_le_bytes(read_array(reader)?);
        let height = u64::from_le_bytes(read_array(reader)?);

        let tx_count = read_varint(reader)? as usize;
        let mut transactions = Vec::with_capacity(tx_count);
        for _ in 0..tx_count {
            transactions.push(Transaction::read_from(reader)?);
        }

        Ok(Self {
            timestamp,
            hash,
            transactions,
            prev_hash,
            nonce,
            height,
        })
    }
}
