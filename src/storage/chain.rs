// Persistent chain store: append-only blocks plus a tip pointer

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::AtomicBool;

use p256::ecdsa::SigningKey;
use sled::transaction::{ConflictableTransactionError, TransactionError};

use crate::core::{Block, Hash256, Serializable, Transaction, TxOutputs};
use crate::error::{Error, Result};

const BLOCKS_TREE: &str = "blocks";
const CHAINSTATE_TREE: &str = "chainstate";

/// Key of the tip pointer inside the blocks tree.
const LAST_HASH_KEY: &[u8] = b"lh";

const GENESIS_COINBASE_DATA: &str = "First transaction from genesis";

/// The block chain: a sled-backed mapping `block_hash -> block` with a
/// distinguished tip pointer. Blocks are immutable once written; only the
/// tip pointer is ever overwritten.
pub struct Blockchain {
    db: sled::Db,
    blocks: sled::Tree,
    chainstate: sled::Tree,
    last_hash: Hash256,
}

impl Blockchain {
    /// Create a new chain at `path` with a coinbase-to-`address` genesis
    /// block. Fails with `ChainExists` when a tip is already present.
    pub fn init(path: impl AsRef<Path>, address: &str) -> Result<Self> {
        Self::init_with_db(sled::open(path)?, address)
    }

    /// Open an existing chain at `path`. Fails with `NoChain` when the
    /// store holds no tip.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_db(sled::open(path)?)
    }

    /// An in-memory chain (for testing).
    pub fn memory(address: &str) -> Result<Self> {
        Self::init_with_db(sled::Config::new().temporary(true).open()?, address)
    }

    fn init_with_db(db: sled::Db, address: &str) -> Result<Self> {
        let blocks = db.open_tree(BLOCKS_TREE)?;
        let chainstate = db.open_tree(CHAINSTATE_TREE)?;

        if blocks.get(LAST_HASH_KEY)?.is_some() {
            return Err(Error::ChainExists);
        }

        let coinbase = Transaction::coinbase(address, GENESIS_COINBASE_DATA)?;
        let genesis = Block::genesis(coinbase)?;
        log::info!("genesis block mined: {}", genesis.hash);

        let payload = genesis.serialize();
        let committed: std::result::Result<(), TransactionError<Error>> =
            blocks.transaction(|tree| {
                tree.insert(&genesis.hash.as_bytes()[..], payload.clone())?;
                tree.insert(LAST_HASH_KEY, &genesis.hash.as_bytes()[..])?;
                Ok(())
            });
        committed.map_err(commit_error)?;
        db.flush()?;

        Ok(Self {
            db,
            blocks,
            chainstate,
            last_hash: genesis.hash,
        })
    }

    fn open_with_db(db: sled::Db) -> Result<Self> {
        let blocks = db.open_tree(BLOCKS_TREE)?;
        let chainstate = db.open_tree(CHAINSTATE_TREE)?;

        let raw_tip = blocks.get(LAST_HASH_KEY)?.ok_or(Error::NoChain)?;
        let last_hash = Hash256::from_slice(&raw_tip)?;

        Ok(Self {
            db,
            blocks,
            chainstate,
            last_hash,
        })
    }

    /// Current tip hash.
    pub fn tip(&self) -> Hash256 {
        self.last_hash
    }

    /// Fetch one block by hash.
    pub fn block(&self, hash: &Hash256) -> Result<Option<Block>> {
        match self.blocks.get(&hash.as_bytes()[..])? {
            Some(raw) => Ok(Some(Block::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Append a block. Re-adding a known block returns the stored copy
    /// unchanged; the tip only advances when the new block is higher. Block
    /// payload and tip pointer move in one atomic store transaction.
    pub fn add_block(&mut self, block: Block) -> Result<Block> {
        if let Some(raw) = self.blocks.get(&block.hash.as_bytes()[..])? {
            return Block::deserialize(&raw);
        }

        let payload = block.serialize();
        let committed: std::result::Result<bool, TransactionError<Error>> =
            self.blocks.transaction(|tree| {
                if tree.get(&block.hash.as_bytes()[..])?.is_none() {
                    tree.insert(&block.hash.as_bytes()[..], payload.clone())?;
                }

                let tip_hash = tree.get(LAST_HASH_KEY)?.ok_or_else(|| abort(Error::NoChain))?;
                let tip_raw = tree
                    .get(&tip_hash)?
                    .ok_or_else(|| abort(Error::encoding("chain tip block missing")))?;
                let tip = Block::deserialize(&tip_raw).map_err(abort)?;

                if block.height > tip.height {
                    tree.insert(LAST_HASH_KEY, &block.hash.as_bytes()[..])?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            });

        if committed.map_err(commit_error)? {
            self.last_hash = block.hash;
        }
        self.db.flush()?;
        Ok(block)
    }

    /// Verify the given transactions, assemble a block on top of the tip,
    /// mine it and persist it.
    pub fn mine_block(&mut self, transactions: Vec<Transaction>) -> Result<Block> {
        if transactions.is_empty() {
            return Err(Error::EmptyBlock);
        }
        for tx in &transactions {
            if tx.is_coinbase() {
                continue;
            }
            if !self.verify_transaction(tx)? {
                return Err(Error::InvalidTransaction(tx.id.to_string()));
            }
        }

        let tip = self
            .block(&self.last_hash)?
            .ok_or_else(|| Error::encoding("chain tip block missing"))?;
        let block = Block::create(
            transactions,
            self.last_hash,
            tip.height + 1,
            &AtomicBool::new(false),
        )?;
        log::info!("mined block {} at height {}", block.hash, block.height);
        self.add_block(block)
    }

    /// Linear reverse scan for a transaction by id.
    pub fn find_transaction(&self, id: &Hash256) -> Result<Option<Transaction>> {
        for block in self.iter() {
            let block = block?;
            for tx in block.transactions {
                if tx.id == *id {
                    return Ok(Some(tx));
                }
            }
        }
        Ok(None)
    }

    /// Sign `tx` after resolving every transaction its inputs reference.
    pub fn sign_transaction(&self, tx: &mut Transaction, key: &SigningKey) -> Result<()> {
        if tx.is_coinbase() {
            return Ok(());
        }
        let prev_txs = self.previous_transactions(tx)?;
        tx.sign(key, &prev_txs)
    }

    /// Check `tx` against the chain. Coinbase transactions are trivially
    /// valid.
    pub fn verify_transaction(&self, tx: &Transaction) -> Result<bool> {
        if tx.is_coinbase() {
            return Ok(true);
        }
        let prev_txs = self.previous_transactions(tx)?;
        tx.verify(&prev_txs)
    }

    fn previous_transactions(&self, tx: &Transaction) -> Result<HashMap<String, Transaction>> {
        let mut prev_txs = HashMap::new();
        for input in &tx.inputs {
            let prev = self
                .find_transaction(&input.prev_tx_id)?
                .ok_or_else(|| Error::DanglingInput(input.prev_tx_id.to_string()))?;
            prev_txs.insert(prev.id.to_string(), prev);
        }
        Ok(prev_txs)
    }

    /// Walk the whole chain and collect, per transaction, the outputs no
    /// later input spends. This is the ground truth the UTXO index caches.
    pub fn unspent_outputs(&self) -> Result<HashMap<String, TxOutputs>> {
        let mut unspent: HashMap<String, TxOutputs> = HashMap::new();
        let mut spent: HashMap<String, Vec<i32>> = HashMap::new();

        for block in self.iter() {
            let block = block?;
            for tx in &block.transactions {
                let tx_id = tx.id.to_string();
                for (index, output) in tx.outputs.iter().enumerate() {
                    let index = index as i32;
                    // Spends live in later blocks, which this reverse walk
                    // has already visited.
                    if spent.get(&tx_id).is_some_and(|outs| outs.contains(&index)) {
                        continue;
                    }
                    unspent
                        .entry(tx_id.clone())
                        .or_default()
                        .outputs
                        .push((index, output.clone()));
                }
                if !tx.is_coinbase() {
                    for input in &tx.inputs {
                        spent
                            .entry(input.prev_tx_id.to_string())
                            .or_default()
                            .push(input.out_index);
                    }
                }
            }
        }
        Ok(unspent)
    }

    /// Lazy walk from the tip back to genesis.
    pub fn iter(&self) -> ChainIterator<'_> {
        ChainIterator {
            current_hash: self.last_hash,
            blocks: &self.blocks,
        }
    }

    pub(crate) fn chainstate(&self) -> &sled::Tree {
        &self.chainstate
    }

    pub(crate) fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// Iterator over blocks, newest first. Each step fetches the block under
/// `current_hash` and then follows its `prev_hash`; the zero hash ends the
/// walk.
pub struct ChainIterator<'a> {
    current_hash: Hash256,
    blocks: &'a sled::Tree,
}

impl Iterator for ChainIterator<'_> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_hash.is_zero() {
            return None;
        }

        let step = (|| {
            let raw = self.blocks.get(&self.current_hash.as_bytes()[..])?.ok_or_else(|| {
                Error::encoding(format!("block {} missing from store", self.current_hash))
            })?;
            Block::deserialize(&raw)
        })();

        match step {
            Ok(block) => {
                self.current_hash = block.prev_hash;
                Some(Ok(block))
            }
            Err(err) => {
                self.current_hash = Hash256::zero();
                Some(Err(err))
            }
        }
    }
}

fn abort(err: Error) -> ConflictableTransactionError<Error> {
    ConflictableTransactionError::Abort(err)
}

fn commit_error(err: TransactionError<Error>) -> Error {
    match err {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => Error::Storage(err),
    }
}
