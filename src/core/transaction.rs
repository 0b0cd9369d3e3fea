// Transaction model: inputs, outputs, coinbase minting, signing

use std::collections::HashMap;
use std::fmt;
use std::io::{Cursor, Read};

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::generic_array::GenericArray;
use p256::EncodedPoint;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::core::serialize::{
    read_array, read_var_bytes, read_varint, write_var_bytes, write_varint,
};
use crate::core::{sha256, Hash256, Serializable};
use crate::error::{Error, Result};
use crate::wallet::address::{self, public_key_hash};

/// Tokens minted by every coinbase transaction.
pub const REWARD: u64 = 20;

/// Reference to a previous transaction output.
///
/// A coinbase input references nothing: its `prev_tx_id` is the empty hash,
/// its `out_index` is -1 and its `pub_key` carries an arbitrary payload
/// chosen by the miner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    pub prev_tx_id: Hash256,
    pub out_index: i32,
    pub signature: Vec<u8>,
    pub pub_key: Vec<u8>,
}

impl TxInput {
    /// Whether the input was created by the owner of `pub_key_hash`.
    pub fn uses_key(&self, pub_key_hash: &[u8]) -> bool {
        public_key_hash(&self.pub_key) == pub_key_hash
    }

    fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.prev_tx_id.as_bytes());
        buf.extend_from_slice(&self.out_index.to_le_bytes());
        write_var_bytes(buf, &self.signature);
        write_var_bytes(buf, &self.pub_key);
    }

    fn read_from(reader: &mut impl Read) -> Result<Self> {
        Ok(Self {
            prev_tx_id: Hash256::new(read_array(reader)?),
            out_index: i32::from_le_bytes(read_array(reader)?),
            signature: read_var_bytes(reader)?,
            pub_key: read_var_bytes(reader)?,
        })
    }
}

/// A number of tokens locked to a public key hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub value: u64,
    pub pub_key_hash: Vec<u8>,
}

impl TxOutput {
    /// Create an output of `value` tokens locked to `address`.
    pub fn new(value: u64, address: &str) -> Result<Self> {
        let mut output = Self {
            value,
            pub_key_hash: Vec::new(),
        };
        output.lock(address)?;
        Ok(output)
    }

    /// Lock the output to the public key hash encoded in `address`.
    pub fn lock(&mut self, address: &str) -> Result<()> {
        self.pub_key_hash = address::decode_address(address)?;
        Ok(())
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash == pub_key_hash
    }

    fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.value.to_le_bytes());
        write_var_bytes(buf, &self.pub_key_hash);
    }

    fn read_from(reader: &mut impl Read) -> Result<Self> {
        Ok(Self {
            value: u64::from_le_bytes(read_array(reader)?),
            pub_key_hash: read_var_bytes(reader)?,
        })
    }
}

/// The outputs of one transaction that are still unspent, each carrying its
/// original output index. This is the value type of the UTXO index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxOutputs {
    pub outputs: Vec<(i32, TxOutput)>,
}

impl Serializable for TxOutputs {
    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_varint(&mut buf, self.outputs.len() as u64);
        for (index, output) in &self.outputs {
            buf.extend_from_slice(&index.to_le_bytes());
            output.write_to(&mut buf);
        }
        buf
    }

    fn deserialize(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let count = read_varint(&mut cursor)? as usize;
        let mut outputs = Vec::with_capacity(count);
        for _ in 0..count {
            let index = i32::from_le_bytes(read_array(&mut cursor)?);
            outputs.push((index, TxOutput::read_from(&mut cursor)?));
        }
        Ok(Self { outputs })
    }
}

/// A transfer of tokens: inputs consuming previous outputs, outputs locking
/// the transferred value to new owners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: Hash256,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Mint the block reward to `to`. An empty `data` payload is replaced by
    /// 24 random bytes, hex encoded.
    pub fn coinbase(to: &str, data: &str) -> Result<Self> {
        let data = if data.is_empty() {
            let mut random = [0u8; 24];
            OsRng.fill_bytes(&mut random);
            hex::encode(random)
        } else {
            data.to_string()
        };

        let input = TxInput {
            prev_tx_id: Hash256::zero(),
            out_index: -1,
            signature: Vec::new(),
            pub_key: data.into_bytes(),
        };
        let output = TxOutput::new(REWARD, to)?;

        let mut tx = Self {
            id: Hash256::zero(),
            inputs: vec![input],
            outputs: vec![output],
        };
        tx.id = tx.hash();
        Ok(tx)
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && self.inputs[0].prev_tx_id.is_zero()
            && self.inputs[0].out_index == -1
    }

    /// Transaction id: SHA-256 over the serialization with the id cleared.
    pub fn hash(&self) -> Hash256 {
        let mut copy = self.clone();
        copy.id = Hash256::zero();
        Hash256::new(sha256(&copy.serialize()))
    }

    /// Copy with every input's signature and public key stripped. This is
    /// the form that gets signed and verified.
    pub fn trimmed_copy(&self) -> Self {
        let inputs = self
            .inputs
            .iter()
            .map(|input| TxInput {
                prev_tx_id: input.prev_tx_id,
                out_index: input.out_index,
                signature: Vec::new(),
                pub_key: Vec::new(),
            })
            .collect();

        Self {
            id: self.id,
            inputs,
            outputs: self.outputs.clone(),
        }
    }

    /// Sign every input with `key`. `prev_txs` maps the hex id of each
    /// referenced transaction to the transaction itself.
    pub fn sign(&mut self, key: &SigningKey, prev_txs: &HashMap<String, Transaction>) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }

        self.check_inputs_resolve(prev_txs)?;

        let mut trimmed = self.trimmed_copy();
        for index in 0..self.inputs.len() {
            let referenced = referenced_output(&self.inputs[index], prev_txs)?;
            trimmed.inputs[index].pub_key = referenced.pub_key_hash.clone();

            let signature: Signature = key.sign(&signing_payload(&trimmed));
            self.inputs[index].signature = signature.to_bytes().to_vec();

            trimmed.inputs[index].pub_key = Vec::new();
        }
        Ok(())
    }

    /// Check every input's signature. A coinbase is trivially valid. Missing
    /// referenced transactions are fatal; bad signatures just yield `false`.
    pub fn verify(&self, prev_txs: &HashMap<String, Transaction>) -> Result<bool> {
        if self.is_coinbase() {
            return Ok(true);
        }

        self.check_inputs_resolve(prev_txs)?;

        let mut trimmed = self.trimmed_copy();
        for (index, input) in self.inputs.iter().enumerate() {
            let referenced = referenced_output(input, prev_txs)?;
            trimmed.inputs[index].pub_key = referenced.pub_key_hash.clone();
            let payload = signing_payload(&trimmed);
            trimmed.inputs[index].pub_key = Vec::new();

            let Ok(signature) = Signature::from_slice(&input.signature) else {
                return Ok(false);
            };
            if input.pub_key.len() != 64 {
                return Ok(false);
            }
            let point = EncodedPoint::from_untagged_bytes(GenericArray::from_slice(&input.pub_key));
            let Ok(verifying_key) = VerifyingKey::from_encoded_point(&point) else {
                return Ok(false);
            };
            if verifying_key.verify(&payload, &signature).is_err() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn check_inputs_resolve(&self, prev_txs: &HashMap<String, Transaction>) -> Result<()> {
        for input in &self.inputs {
            if !prev_txs.contains_key(&input.prev_tx_id.to_string()) {
                return Err(Error::DanglingInput(input.prev_tx_id.to_string()));
            }
        }
        Ok(())
    }

    /// Streaming decoder, used when transactions are embedded in a block.
    pub fn read_from(reader: &mut impl Read) -> Result<Self> {
        let id = Hash256::new(read_array(reader)?);

        let input_count = read_varint(reader)? as usize;
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            inputs.push(TxInput::read_from(reader)?);
        }

        let output_count = read_varint(reader)? as usize;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            outputs.push(TxOutput::read_from(reader)?);
        }

        Ok(Self { id, inputs, outputs })
    }
}

/// The canonical signing preimage: lowercase hex of the trimmed copy's
/// serialization, followed by a single newline. Stored chains depend on this
/// exact form.
fn signing_payload(trimmed: &Transaction) -> Vec<u8> {
    let mut payload = hex::encode(trimmed.serialize());
    payload.push('\n');
    payload.into_bytes()
}

fn referenced_output<'a>(
    input: &TxInput,
    prev_txs: &'a HashMap<String, Transaction>,
) -> Result<&'a TxOutput> {
    let id = input.prev_tx_id.to_string();
    let prev = prev_txs
        .get(&id)
        .ok_or_else(|| Error::DanglingInput(id.clone()))?;
    prev.outputs
        .get(input.out_index as usize)
        .ok_or(Error::DanglingInput(id))
}

impl Serializable for Transaction {
    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(self.id.as_bytes());
        write_varint(&mut buf, self.inputs.len() as u64);
        for input in &self.inputs {
            input.write_to(&mut buf);
        }
        write_varint(&mut buf, self.outputs.len() as u64);
        for output in &self.outputs {
            output.write_to(&mut buf);
        }
        buf
    }

    fn deserialize(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        Self::read_from(&mut cursor)
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "--- Transaction {}:", self.id)?;
        for (i, input) in self.inputs.iter().enumerate() {
            writeln!(f, "     Input {}:", i)?;
            writeln!(f, "       TXID:      {}", input.prev_tx_id)?;
            writeln!(f, "       Out:       {}", input.out_index)?;
            writeln!(f, "       Signature: {}", hex::encode(&input.signature))?;
            writeln!(f, "       PubKey:    {}", hex::encode(&input.pub_key))?;
        }
        for (i, output) in self.outputs.iter().enumerate() {
            writeln!(f, "     Output {}:", i)?;
            writeln!(f, "       Value:  {}", output.value)?;
            writeln!(f, "       Script: {}", hex::encode(&output.pub_key_hash))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;

    fn spend(coinbase: &Transaction, from: &Wallet, to: &Wallet, amount: u64) -> Transaction {
        let input = TxInput {
            prev_tx_id: coinbase.id,
            out_index: 0,
            signature: Vec::new(),
            pub_key: from.public_key().to_vec(),
        };
        let mut outputs = vec![TxOutput::new(amount, &to.address()).unwrap()];
        if amount < REWARD {
            outputs.push(TxOutput::new(REWARD - amount, &from.address()).unwrap());
        }
        let mut tx = Transaction {
            id: Hash256::zero(),
            inputs: vec![input],
            outputs,
        };
        tx.id = tx.hash();
        tx
    }

    fn prev_map(txs: &[&Transaction]) -> HashMap<String, Transaction> {
        txs.iter()
            .map(|tx| (tx.id.to_string(), (*tx).clone()))
            .collect()
    }

    #[test]
    fn test_coinbase_shape() {
        let wallet = Wallet::new();
        let tx = Transaction::coinbase(&wallet.address(), "genesis").unwrap();

        assert!(tx.is_coinbase());
        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.inputs[0].out_index, -1);
        assert!(tx.inputs[0].prev_tx_id.is_zero());
        assert_eq!(tx.outputs.len(), 1);
        assert_eq!(tx.outputs[0].value, REWARD);
        assert_eq!(tx.id, tx.hash());
    }

    #[test]
    fn test_coinbase_fills_empty_data_with_random_payload() {
        let wallet = Wallet::new();
        let a = Transaction::coinbase(&wallet.address(), "").unwrap();
        let b = Transaction::coinbase(&wallet.address(), "").unwrap();

        // 24 random bytes, hex encoded
        assert_eq!(a.inputs[0].pub_key.len(), 48);
        assert_ne!(a.inputs[0].pub_key, b.inputs[0].pub_key);
    }

    #[test]
    fn test_coinbase_rejects_bad_address() {
        assert!(matches!(
            Transaction::coinbase("not-an-address", ""),
            Err(Error::InvalidAddress)
        ));
    }

    #[test]
    fn test_serialization_round_trip() {
        let wallet = Wallet::new();
        let tx = Transaction::coinbase(&wallet.address(), "data").unwrap();

        let decoded = Transaction::deserialize(&tx.serialize()).unwrap();
        assert_eq!(tx, decoded);
        assert_eq!(tx.hash(), decoded.hash());
    }

    #[test]
    fn test_outputs_index_round_trip() {
        let wallet = Wallet::new();
        let outs = TxOutputs {
            outputs: vec![
                (0, TxOutput::new(5, &wallet.address()).unwrap()),
                (2, TxOutput::new(15, &wallet.address()).unwrap()),
            ],
        };
        assert_eq!(TxOutputs::deserialize(&outs.serialize()).unwrap(), outs);
    }

    #[test]
    fn test_sign_then_verify() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let coinbase = Transaction::coinbase(&alice.address(), "mint").unwrap();
        let prev = prev_map(&[&coinbase]);

        let mut tx = spend(&coinbase, &alice, &bob, 5);
        tx.sign(alice.signing_key(), &prev).unwrap();

        assert_eq!(tx.inputs[0].signature.len(), 64);
        assert!(tx.verify(&prev).unwrap());
    }

    #[test]
    fn test_tampered_signature_fails_verification() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let coinbase = Transaction::coinbase(&alice.address(), "mint").unwrap();
        let prev = prev_map(&[&coinbase]);

        let mut tx = spend(&coinbase, &alice, &bob, 5);
        tx.sign(alice.signing_key(), &prev).unwrap();

        tx.inputs[0].signature[10] ^= 0x01;
        assert!(!tx.verify(&prev).unwrap());
    }

    #[test]
    fn test_tampered_referenced_output_fails_verification() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let coinbase = Transaction::coinbase(&alice.address(), "mint").unwrap();

        let mut tx = spend(&coinbase, &alice, &bob, 5);
        tx.sign(alice.signing_key(), &prev_map(&[&coinbase])).unwrap();

        // Flip a byte of the output the input refers to.
        let mut tampered = coinbase.clone();
        tampered.outputs[0].pub_key_hash[0] ^= 0xff;
        let mut prev = HashMap::new();
        prev.insert(coinbase.id.to_string(), tampered);

        assert!(!tx.verify(&prev).unwrap());
    }

    #[test]
    fn test_missing_prev_tx_is_fatal() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let coinbase = Transaction::coinbase(&alice.address(), "mint").unwrap();

        let mut tx = spend(&coinbase, &alice, &bob, 5);
        let empty = HashMap::new();

        assert!(matches!(
            tx.sign(alice.signing_key(), &empty),
            Err(Error::DanglingInput(_))
        ));
        assert!(matches!(tx.verify(&empty), Err(Error::DanglingInput(_))));
    }

    #[test]
    fn test_uses_key_and_locking() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let alice_pkh = public_key_hash(alice.public_key());
        let bob_pkh = public_key_hash(bob.public_key());

        let output = TxOutput::new(10, &alice.address()).unwrap();
        assert!(output.is_locked_with_key(&alice_pkh));
        assert!(!output.is_locked_with_key(&bob_pkh));

        let input = TxInput {
            prev_tx_id: Hash256::zero(),
            out_index: 0,
            signature: Vec::new(),
            pub_key: alice.public_key().to_vec(),
        };
        assert!(input.uses_key(&alice_pkh));
        assert!(!input.uses_key(&bob_pkh));
    }
}
