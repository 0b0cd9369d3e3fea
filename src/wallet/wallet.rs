// ECDSA keypairs on the P-256 curve

use p256::ecdsa::{SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;

use crate::error::{Error, Result};
use crate::wallet::address;

/// A single keypair. The private key never leaves this type; the rest of
/// the engine only sees the public key and the derived address.
#[derive(Clone)]
pub struct Wallet {
    signing_key: SigningKey,
    public_key: Vec<u8>,
}

impl Wallet {
    /// Generate a fresh keypair.
    pub fn new() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        let public_key = encode_public_key(signing_key.verifying_key());
        Self {
            signing_key,
            public_key,
        }
    }

    /// Rebuild a wallet from a stored 32-byte private scalar.
    pub fn from_secret_bytes(secret: &[u8]) -> Result<Self> {
        let signing_key = SigningKey::from_slice(secret)
            .map_err(|_| Error::encoding("invalid private key"))?;
        let public_key = encode_public_key(signing_key.verifying_key());
        Ok(Self {
            signing_key,
            public_key,
        })
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes().into()
    }

    /// Uncompressed public key: X || Y, 32 bytes each.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// The wallet's textual address.
    pub fn address(&self) -> String {
        address::address_from_pub_key(&self.public_key)
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip the SEC1 tag byte, keeping the raw X || Y coordinates.
fn encode_public_key(key: &VerifyingKey) -> Vec<u8> {
    key.to_encoded_point(false).as_bytes()[1..].to_vec()
}
