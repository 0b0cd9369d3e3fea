// Command-line driver

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};

use crate::consensus::ProofOfWork;
use crate::core::Transaction;
use crate::error::Error;
use crate::storage::{Blockchain, UtxoSet};
use crate::wallet::address::{decode_address, validate_address};
use crate::wallet::{TransactionBuilder, WalletStore};

#[derive(Parser)]
#[command(name = "tinychain")]
#[command(about = "Educational single-node UTXO blockchain", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a new keypair and print its address
    Createwallet,

    /// List the addresses in the wallet file
    Listaddresses,

    /// Create a blockchain and send the genesis reward to an address
    Createblockchain {
        #[arg(short, long)]
        address: String,
    },

    /// Get the balance of an address
    Getbalance {
        #[arg(short, long)]
        address: String,
    },

    /// Send tokens from one owned address to another address
    Send {
        #[arg(short, long)]
        from: String,
        #[arg(short, long)]
        to: String,
        #[arg(short, long)]
        amount: u64,
        /// Mine the transaction into a block immediately
        #[arg(short, long)]
        mine: bool,
    },

    /// Print all blocks from the tip back to genesis
    Printchain,

    /// Rebuild the UTXO index from the chain
    Reindexutxo,
}

/// Executes parsed commands against the stores under `data_dir`.
pub struct CliHandler {
    data_dir: PathBuf,
}

impl CliHandler {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn chain_path(&self) -> PathBuf {
        self.data_dir.join("chain")
    }

    fn wallets_path(&self) -> PathBuf {
        self.data_dir.join("wallets.json")
    }

    pub fn run(&self, cli: Cli) -> anyhow::Result<()> {
        match cli.command {
            Commands::Createwallet => self.create_wallet(),
            Commands::Listaddresses => self.list_addresses(),
            Commands::Createblockchain { address } => self.create_blockchain(&address),
            Commands::Getbalance { address } => self.get_balance(&address),
            Commands::Send {
                from,
                to,
                amount,
                mine,
            } => self.send(&from, &to, amount, mine),
            Commands::Printchain => self.print_chain(),
            Commands::Reindexutxo => self.reindex_utxo(),
        }
    }

    fn create_wallet(&self) -> anyhow::Result<()> {
        let mut wallets = WalletStore::load_or_default(self.wallets_path())?;
        let address = wallets.create_wallet();
        wallets.save()?;

        println!("New address: {}", address);
        Ok(())
    }

    fn list_addresses(&self) -> anyhow::Result<()> {
        let wallets = WalletStore::load_or_default(self.wallets_path())?;
        for address in wallets.addresses() {
            println!("{}", address);
        }
        Ok(())
    }

    fn create_blockchain(&self, address: &str) -> anyhow::Result<()> {
        if !validate_address(address) {
            return Err(Error::InvalidAddress).context("createblockchain");
        }

        let chain = Blockchain::init(self.chain_path(), address)?;
        UtxoSet::new(&chain).reindex()?;

        println!("Blockchain created, tip {}", chain.tip());
        Ok(())
    }

    fn get_balance(&self, address: &str) -> anyhow::Result<()> {
        let pub_key_hash = decode_address(address).context("getbalance")?;

        let chain = Blockchain::open(self.chain_path())?;
        let utxo = UtxoSet::new(&chain);
        let balance: u64 = utxo
            .find_utxo(&pub_key_hash)?
            .iter()
            .map(|output| output.value)
            .sum();

        println!("Balance of {}: {}", address, balance);
        Ok(())
    }

    fn send(&self, from: &str, to: &str, amount: u64, mine: bool) -> anyhow::Result<()> {
        if !validate_address(from) || !validate_address(to) {
            return Err(Error::InvalidAddress).context("send");
        }
        if amount == 0 {
            bail!("amount must be positive");
        }
        if !mine {
            bail!("this node runs alone and cannot relay transactions; rerun with --mine");
        }

        let wallets = WalletStore::load_or_default(self.wallets_path())?;
        let wallet = wallets
            .wallet(from)
            .ok_or_else(|| anyhow!("address {} is not in the wallet file", from))?;

        let mut chain = Blockchain::open(self.chain_path())?;

        let tx = {
            let utxo = UtxoSet::new(&chain);
            TransactionBuilder::new(wallet, &utxo).build(to, amount)?
        };
        // The miner is the sender, so the block reward goes back to them.
        let coinbase = Transaction::coinbase(from, "")?;

        let block = chain.mine_block(vec![coinbase, tx])?;
        UtxoSet::new(&chain).update(&block)?;

        println!("Mined block {}", block.hash);
        println!("Success!");
        Ok(())
    }

    fn print_chain(&self) -> anyhow::Result<()> {
        let chain = Blockchain::open(self.chain_path())?;

        for block in chain.iter() {
            let block = block?;
            println!("============ Block {} ============", block.hash);
            println!("Height:    {}", block.height);
            println!("Prev hash: {}", block.prev_hash);
            println!("Timestamp: {}", block.timestamp);
            println!("Nonce:     {}", block.nonce);
            println!("PoW:       {}", ProofOfWork::new(&block)?.validate());
            for tx in &block.transactions {
                println!("{}", tx);
            }
            println!();
        }
        Ok(())
    }

    fn reindex_utxo(&self) -> anyhow::Result<()> {
        let chain = Blockchain::open(self.chain_path())?;
        let utxo = UtxoSet::new(&chain);
        utxo.reindex()?;

        let count = utxo.count_transactions()?;
        println!(
            "Reindex complete: {} transactions in the UTXO set",
            count
        );
        Ok(())
    }
}
