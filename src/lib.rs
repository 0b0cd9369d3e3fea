// Educational single-node UTXO blockchain engine

pub mod cli;
pub mod consensus;
pub mod core;
pub mod error;
pub mod storage;
pub mod wallet;

// Re-exports for convenience
pub use crate::core::{Block, Hash256, MerkleTree, Transaction, TxInput, TxOutput, TxOutputs};
pub use crate::error::{Error, Result};
pub use crate::storage::{Blockchain, ChainIterator, UtxoSet};
pub use crate::wallet::{TransactionBuilder, Wallet, WalletStore};
