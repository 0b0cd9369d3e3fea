// Core data structures: hashes, transactions, merkle commitment, blocks

pub mod base58;
mod block;
mod hash;
mod merkle;
pub mod serialize;
mod transaction;
mod types;

pub use block::Block;
pub use hash::{hash160, sha256, sha256d};
pub use merkle::{MerkleNode, MerkleTree};
pub use serialize::Serializable;
pub use transaction::{Transaction, TxInput, TxOutput, TxOutputs, REWARD};
pub use types::Hash256;
