// Wallet persistence: a JSON keystore mapping addresses to keypairs

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::wallet::Wallet;

#[derive(Serialize, Deserialize)]
struct StoredWallet {
    secret_key: String,
}

/// Collection of wallets backed by a JSON file under the data directory.
pub struct WalletStore {
    wallets: HashMap<String, Wallet>,
    path: PathBuf,
}

impl WalletStore {
    /// Load the keystore at `path`, or start an empty one if the file does
    /// not exist yet.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut wallets = HashMap::new();

        if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let stored: HashMap<String, StoredWallet> = serde_json::from_str(&raw)
                .map_err(|e| Error::encoding(format!("wallet file: {}", e)))?;
            for (address, entry) in stored {
                let secret = hex::decode(&entry.secret_key)
                    .map_err(|e| Error::encoding(format!("wallet file: {}", e)))?;
                let wallet = Wallet::from_secret_bytes(&secret)?;
                if wallet.address() != address {
                    return Err(Error::encoding(format!(
                        "wallet file entry {} does not match its key",
                        address
                    )));
                }
                wallets.insert(address, wallet);
            }
        }

        Ok(Self { wallets, path })
    }

    /// Generate a new wallet and return its address.
    pub fn create_wallet(&mut self) -> String {
        let wallet = Wallet::new();
        let address = wallet.address();
        self.wallets.insert(address.clone(), wallet);
        address
    }

    pub fn wallet(&self, address: &str) -> Option<&Wallet> {
        self.wallets.get(address)
    }

    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.wallets.keys().cloned().collect();
        addresses.sort();
        addresses
    }

    /// Write the keystore back to disk.
    pub fn save(&self) -> Result<()> {
        let stored: HashMap<&String, StoredWallet> = self
            .wallets
            .iter()
            .map(|(address, wallet)| {
                (
                    address,
                    StoredWallet {
                        secret_key: hex::encode(wallet.secret_bytes()),
                    },
                )
            })
            .collect();
        let raw = serde_json::to_string_pretty(&stored)
            .map_err(|e| Error::encoding(format!("wallet file: {}", e)))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, raw)?;
        Ok(())
    }
}
