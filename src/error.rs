// Error taxonomy for the chain engine

use thiserror::Error;

/// Errors produced by the core, the stores and the wallet layer.
///
/// `InvalidAddress` and `InsufficientFunds` are recoverable and reported to
/// the user; `NoChain`/`ChainExists` steer the CLI towards the right init
/// path; everything else aborts the running command.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid address")]
    InvalidAddress,

    #[error("not enough funds: have {available}, need {required}")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("referenced transaction {0} does not exist")]
    DanglingInput(String),

    #[error("transaction {0} failed verification")]
    InvalidTransaction(String),

    #[error("cannot commit to an empty transaction list")]
    EmptyBlock,

    #[error("no existing blockchain found, create one first")]
    NoChain,

    #[error("blockchain already exists")]
    ChainExists,

    #[error("nonce space exhausted while mining")]
    MiningExhausted,

    #[error("mining cancelled")]
    Cancelled,

    #[error("malformed data: {0}")]
    Encoding(String),

    #[error("storage fault: {0}")]
    Storage(#[from] sled::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for decode failures.
    pub(crate) fn encoding(what: impl Into<String>) -> Self {
        Error::Encoding(what.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
