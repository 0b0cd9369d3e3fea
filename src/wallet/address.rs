// Address derivation and validation
//
// An address is the base58 form of `version || hash160(pub_key) || checksum`,
// where the checksum is the first four bytes of a double SHA-256 over the
// versioned payload.

use crate::core::base58;
use crate::core::{hash160, sha256d};
use crate::error::{Error, Result};

pub const VERSION: u8 = 0x00;
pub const CHECKSUM_LENGTH: usize = 4;

/// Full length of a decoded address payload.
const PAYLOAD_LENGTH: usize = 1 + 20 + CHECKSUM_LENGTH;

/// RIPEMD160(SHA256(pub_key)), the 20-byte hash every output locks to.
pub fn public_key_hash(pub_key: &[u8]) -> [u8; 20] {
    hash160(pub_key)
}

/// First four bytes of SHA256(SHA256(payload)).
pub fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LENGTH] {
    let digest = sha256d(payload);
    let mut check = [0u8; CHECKSUM_LENGTH];
    check.copy_from_slice(&digest[..CHECKSUM_LENGTH]);
    check
}

/// Derive the textual address for an uncompressed public key.
pub fn address_from_pub_key(pub_key: &[u8]) -> String {
    let mut payload = Vec::with_capacity(PAYLOAD_LENGTH);
    payload.push(VERSION);
    payload.extend_from_slice(&public_key_hash(pub_key));
    let check = checksum(&payload);
    payload.extend_from_slice(&check);
    base58::encode(&payload)
}

/// Check that an address decodes and its checksum matches.
/// Any decode failure means the address is invalid.
pub fn validate_address(address: &str) -> bool {
    decode_address(address).is_ok()
}

/// Decode an address down to its 20-byte public key hash.
pub fn decode_address(address: &str) -> Result<Vec<u8>> {
    let payload = base58::decode(address).map_err(|_| Error::InvalidAddress)?;
    if payload.len() != PAYLOAD_LENGTH {
        return Err(Error::InvalidAddress);
    }

    let (versioned, actual_checksum) = payload.split_at(payload.len() - CHECKSUM_LENGTH);
    if checksum(versioned) != actual_checksum {
        return Err(Error::InvalidAddress);
    }

    Ok(versioned[1..].to_vec())
}
