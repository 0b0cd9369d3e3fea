// Building and signing spend transactions

use crate::core::{Hash256, Transaction, TxInput, TxOutput};
use crate::error::{Error, Result};
use crate::storage::UtxoSet;
use crate::wallet::address::public_key_hash;
use crate::wallet::Wallet;

/// Assembles a signed transaction from a wallet's spendable outputs.
pub struct TransactionBuilder<'a> {
    wallet: &'a Wallet,
    utxo: &'a UtxoSet<'a>,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new(wallet: &'a Wallet, utxo: &'a UtxoSet<'a>) -> Self {
        Self { wallet, utxo }
    }

    /// Build a transaction sending `amount` tokens to `to`, returning the
    /// surplus to the sender as change. Inputs are taken in the order the
    /// UTXO index returns them.
    pub fn build(&self, to: &str, amount: u64) -> Result<Transaction> {
        let pkh = public_key_hash(self.wallet.public_key());
        let (accumulated, spendable) = self.utxo.find_spendable_outputs(&pkh, amount)?;

        if accumulated < amount {
            return Err(Error::InsufficientFunds {
                available: accumulated,
                required: amount,
            });
        }

        let mut inputs = Vec::new();
        for (tx_id_hex, out_indices) in &spendable {
            let prev_tx_id = Hash256::from_hex(tx_id_hex)?;
            for &out_index in out_indices {
                inputs.push(TxInput {
                    prev_tx_id,
                    out_index,
                    signature: Vec::new(),
                    pub_key: self.wallet.public_key().to_vec(),
                });
            }
        }

        let mut outputs = vec![TxOutput::new(amount, to)?];
        if accumulated > amount {
            outputs.push(TxOutput::new(accumulated - amount, &self.wallet.address())?);
        }

        let mut tx = Transaction {
            id: Hash256::zero(),
            inputs,
            outputs,
        };
        tx.id = tx.hash();

        self.utxo.chain().sign_transaction(&mut tx, self.wallet.signing_key())?;
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::REWARD;
    use crate::storage::Blockchain;

    #[test]
    fn test_build_creates_signed_spend_with_change() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let chain = Blockchain::memory(&alice.address()).unwrap();
        let utxo = UtxoSet::new(&chain);
        utxo.reindex().unwrap();

        let tx = TransactionBuilder::new(&alice, &utxo)
            .build(&bob.address(), 5)
            .unwrap();

        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[0].value, 5);
        assert_eq!(tx.outputs[1].value, REWARD - 5);
        assert!(tx
            .outputs[1]
            .is_locked_with_key(&public_key_hash(alice.public_key())));

        assert!(chain.verify_transaction(&tx).unwrap());
    }

    #[test]
    fn test_build_exact_amount_has_no_change() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let chain = Blockchain::memory(&alice.address()).unwrap();
        let utxo = UtxoSet::new(&chain);
        utxo.reindex().unwrap();

        let tx = TransactionBuilder::new(&alice, &utxo)
            .build(&bob.address(), REWARD)
            .unwrap();

        assert_eq!(tx.outputs.len(), 1);
        assert_eq!(tx.outputs[0].value, REWARD);
    }

    #[test]
    fn test_build_with_insufficient_funds_fails() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let chain = Blockchain::memory(&alice.address()).unwrap();
        let utxo = UtxoSet::new(&chain);
        utxo.reindex().unwrap();

        let result = TransactionBuilder::new(&alice, &utxo).build(&bob.address(), REWARD + 1);
        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));
    }

    #[test]
    fn test_build_rejects_invalid_recipient() {
        let alice = Wallet::new();
        let chain = Blockchain::memory(&alice.address()).unwrap();
        let utxo = UtxoSet::new(&chain);
        utxo.reindex().unwrap();

        let result = TransactionBuilder::new(&alice, &utxo).build("bogus!", 5);
        assert!(matches!(result, Err(Error::InvalidAddress)));
    }
}
