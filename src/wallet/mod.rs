// Keypairs, addresses and transaction building

pub mod address;
mod store;
mod tx_builder;
#[allow(clippy::module_inception)]
mod wallet;

pub use store::WalletStore;
pub use tx_builder::TransactionBuilder;
pub use wallet::Wallet;
