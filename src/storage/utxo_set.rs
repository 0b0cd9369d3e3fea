// UTXO index: a rebuildable cache of unspent outputs over the chain store

use std::collections::HashMap;

use crate::core::{Block, Hash256, Serializable, Transaction, TxOutput, TxOutputs};
use crate::error::{Error, Result};
use crate::storage::Blockchain;

/// Key prefix separating index entries inside the chainstate tree.
const UTXO_PREFIX: &[u8] = b"u-";

/// Persistent index `u-<tx_id> -> unspent outputs of that tx`, derived from
/// the chain. It can always be rebuilt from scratch with `reindex` and is
/// kept current block-by-block with `update`.
pub struct UtxoSet<'a> {
    chain: &'a Blockchain,
}

impl<'a> UtxoSet<'a> {
    pub fn new(chain: &'a Blockchain) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &Blockchain {
        self.chain
    }

    fn tree(&self) -> &sled::Tree {
        self.chain.chainstate()
    }

    fn entry_key(tx_id: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(UTXO_PREFIX.len() + tx_id.len());
        key.extend_from_slice(UTXO_PREFIX);
        key.extend_from_slice(tx_id);
        key
    }

    /// Drop the whole index and rebuild it from a full chain scan, in one
    /// atomic batch.
    pub fn reindex(&self) -> Result<()> {
        let mut batch = sled::Batch::default();
        for item in self.tree().scan_prefix(UTXO_PREFIX) {
            let (key, _) = item?;
            batch.remove(key);
        }

        for (tx_id_hex, outputs) in self.chain.unspent_outputs()? {
            let tx_id = hex::decode(&tx_id_hex).map_err(|e| Error::encoding(e.to_string()))?;
            batch.insert(Self::entry_key(&tx_id), outputs.serialize());
        }

        self.tree().apply_batch(batch)?;
        self.chain.flush()?;
        Ok(())
    }

    /// Fold one freshly committed block into the index: spent outputs are
    /// subtracted from their transaction's entry (the entry disappears once
    /// empty) and each new transaction's outputs are inserted. Must run
    /// after the block's durable commit.
    pub fn update(&self, block: &Block) -> Result<()> {
        // Staged writes, so inputs spending outputs created or already
        // reduced within this same block observe the staged state.
        let mut staged: HashMap<Vec<u8>, Option<TxOutputs>> = HashMap::new();

        for tx in &block.transactions {
            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    let key = Self::entry_key(input.prev_tx_id.as_bytes());
                    let entry = match staged.get(&key) {
                        Some(entry) => entry.clone(),
                        None => match self.tree().get(&key)? {
                            Some(raw) => Some(TxOutputs::deserialize(&raw)?),
                            None => None,
                        },
                    };

                    let Some(mut entry) = entry else {
                        return Err(Error::DanglingInput(input.prev_tx_id.to_string()));
                    };
                    entry.outputs.retain(|(index, _)| *index != input.out_index);
                    staged.insert(key, (!entry.outputs.is_empty()).then_some(entry));
                }
            }

            let fresh = TxOutputs {
                outputs: tx
                    .outputs
                    .iter()
                    .enumerate()
                    .map(|(index, output)| (index as i32, output.clone()))
                    .collect(),
            };
            staged.insert(Self::entry_key(tx.id.as_bytes()), Some(fresh));
        }

        let mut batch = sled::Batch::default();
        for (key, entry) in staged {
            match entry {
                Some(outputs) => batch.insert(key, outputs.serialize()),
                None => batch.remove(key),
            }
        }
        self.tree().apply_batch(batch)?;
        self.chain.flush()?;
        Ok(())
    }

    /// Collect outputs locked to `pub_key_hash` until `amount` is covered.
    /// Returns the accumulated value and, per transaction, the indices of
    /// the chosen outputs. Ordering follows store iteration order.
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: u64,
    ) -> Result<(u64, HashMap<String, Vec<i32>>)> {
        let mut spendable: HashMap<String, Vec<i32>> = HashMap::new();
        let mut accumulated = 0u64;

        'scan: for item in self.tree().scan_prefix(UTXO_PREFIX) {
            let (key, raw) = item?;
            let tx_id_hex = hex::encode(&key[UTXO_PREFIX.len()..]);
            let outputs = TxOutputs::deserialize(&raw)?;

            for (index, output) in &outputs.outputs {
                if output.is_locked_with_key(pub_key_hash) {
                    accumulated += output.value;
                    spendable.entry(tx_id_hex.clone()).or_default().push(*index);
                    if accumulated >= amount {
                        break 'scan;
                    }
                }
            }
        }

        Ok((accumulated, spendable))
    }

    /// Every unspent output locked to `pub_key_hash`.
    pub fn find_utxo(&self, pub_key_hash: &[u8]) -> Result<Vec<TxOutput>> {
        let mut utxos = Vec::new();
        for item in self.tree().scan_prefix(UTXO_PREFIX) {
            let (_, raw) = item?;
            for (_, output) in TxOutputs::deserialize(&raw)?.outputs {
                if output.is_locked_with_key(pub_key_hash) {
                    utxos.push(output);
                }
            }
        }
        Ok(utxos)
    }

    /// Every transaction that still has an unspent output locked to
    /// `pub_key_hash`.
    pub fn find_unspent_transactions(&self, pub_key_hash: &[u8]) -> Result<Vec<Transaction>> {
        let mut transactions = Vec::new();
        for item in self.tree().scan_prefix(UTXO_PREFIX) {
            let (key, raw) = item?;
            let outputs = TxOutputs::deserialize(&raw)?;
            if outputs
                .outputs
                .iter()
                .any(|(_, output)| output.is_locked_with_key(pub_key_hash))
            {
                let tx_id = Hash256::from_slice(&key[UTXO_PREFIX.len()..])?;
                let tx = self.chain.find_transaction(&tx_id)?.ok_or_else(|| {
                    Error::encoding(format!("indexed transaction {} missing from chain", tx_id))
                })?;
                transactions.push(tx);
            }
        }
        Ok(transactions)
    }

    /// Number of transactions with at least one unspent output.
    pub fn count_transactions(&self) -> Result<usize> {
        let mut count = 0;
        for item in self.tree().scan_prefix(UTXO_PREFIX) {
            item?;
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::REWARD;
    use crate::wallet::address::public_key_hash;
    use crate::wallet::{TransactionBuilder, Wallet};

    fn balance(utxo: &UtxoSet, wallet: &Wallet) -> u64 {
        let pkh = public_key_hash(wallet.public_key());
        utxo.find_utxo(&pkh)
            .unwrap()
            .iter()
            .map(|output| output.value)
            .sum()
    }

    /// Mine `amount` from `from` to `to`, with the block reward going back
    /// to `from`, and fold the block into the index.
    fn send(chain: &mut Blockchain, from: &Wallet, to: &Wallet, amount: u64) {
        let tx = {
            let utxo = UtxoSet::new(chain);
            TransactionBuilder::new(from, &utxo)
                .build(&to.address(), amount)
                .unwrap()
        };
        let coinbase = Transaction::coinbase(&from.address(), "").unwrap();
        let block = chain.mine_block(vec![coinbase, tx]).unwrap();
        UtxoSet::new(chain).update(&block).unwrap();
    }

    #[test]
    fn test_reindex_after_genesis() {
        let alice = Wallet::new();
        let chain = Blockchain::memory(&alice.address()).unwrap();
        let utxo = UtxoSet::new(&chain);

        utxo.reindex().unwrap();
        assert_eq!(utxo.count_transactions().unwrap(), 1);
        assert_eq!(balance(&utxo, &alice), REWARD);
    }

    #[test]
    fn test_send_with_change_updates_balances() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let mut chain = Blockchain::memory(&alice.address()).unwrap();
        UtxoSet::new(&chain).reindex().unwrap();

        send(&mut chain, &alice, &bob, 5);

        let utxo = UtxoSet::new(&chain);
        // 15 change + 20 fresh coinbase reward
        assert_eq!(balance(&utxo, &alice), 35);
        assert_eq!(balance(&utxo, &bob), 5);
    }

    #[test]
    fn test_full_spend_removes_the_entry() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let mut chain = Blockchain::memory(&alice.address()).unwrap();
        UtxoSet::new(&chain).reindex().unwrap();

        let genesis_coinbase_id = chain.iter().next().unwrap().unwrap().transactions[0].id;
        send(&mut chain, &alice, &bob, REWARD);

        let utxo = UtxoSet::new(&chain);
        assert_eq!(balance(&utxo, &alice), REWARD); // only the new reward
        assert_eq!(balance(&utxo, &bob), REWARD);

        let key = UtxoSet::entry_key(genesis_coinbase_id.as_bytes());
        assert!(utxo.tree().get(key).unwrap().is_none());
    }

    #[test]
    fn test_insufficient_funds_leaves_state_unchanged() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let mut chain = Blockchain::memory(&alice.address()).unwrap();
        UtxoSet::new(&chain).reindex().unwrap();
        send(&mut chain, &alice, &bob, 5);

        {
            let utxo = UtxoSet::new(&chain);
            let result = TransactionBuilder::new(&bob, &utxo).build(&alice.address(), 100);
            assert!(matches!(
                result,
                Err(Error::InsufficientFunds {
                    available: 5,
                    required: 100
                })
            ));
        }

        let utxo = UtxoSet::new(&chain);
        assert_eq!(balance(&utxo, &alice), 35);
        assert_eq!(balance(&utxo, &bob), 5);
    }

    #[test]
    fn test_reindex_matches_incremental_updates() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let carol = Wallet::new();
        let mut chain = Blockchain::memory(&alice.address()).unwrap();
        UtxoSet::new(&chain).reindex().unwrap();

        send(&mut chain, &alice, &bob, 7);
        send(&mut chain, &bob, &carol, 3);
        send(&mut chain, &alice, &carol, 20);

        let utxo = UtxoSet::new(&chain);
        let incremental = (
            balance(&utxo, &alice),
            balance(&utxo, &bob),
            balance(&utxo, &carol),
            utxo.count_transactions().unwrap(),
        );

        utxo.reindex().unwrap();
        let rebuilt = (
            balance(&utxo, &alice),
            balance(&utxo, &bob),
            balance(&utxo, &carol),
            utxo.count_transactions().unwrap(),
        );

        assert_eq!(incremental, rebuilt);
    }

    #[test]
    fn test_find_spendable_outputs_accumulates() {
        let alice = Wallet::new();
        let chain = Blockchain::memory(&alice.address()).unwrap();
        let utxo = UtxoSet::new(&chain);
        utxo.reindex().unwrap();

        let pkh = public_key_hash(alice.public_key());
        let (accumulated, spendable) = utxo.find_spendable_outputs(&pkh, 5).unwrap();
        assert_eq!(accumulated, REWARD);
        assert_eq!(spendable.len(), 1);

        let stranger = Wallet::new();
        let stranger_pkh = public_key_hash(stranger.public_key());
        let (accumulated, spendable) = utxo.find_spendable_outputs(&stranger_pkh, 5).unwrap();
        assert_eq!(accumulated, 0);
        assert!(spendable.is_empty());
    }

    #[test]
    fn test_find_unspent_transactions() {
        let alice = Wallet::new();
        let chain = Blockchain::memory(&alice.address()).unwrap();
        let utxo = UtxoSet::new(&chain);
        utxo.reindex().unwrap();

        let pkh = public_key_hash(alice.public_key());
        let txs = utxo.find_unspent_transactions(&pkh).unwrap();
        assert_eq!(txs.len(), 1);
        assert!(txs[0].is_coinbase());
    }
}
