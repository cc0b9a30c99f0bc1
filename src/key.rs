//! The 256-byte permutation shared by both relays.
//!
//! A `Key` is the seed for a [`crate::cipher::Cipher`]: every byte value
//! 0..255 must appear in it exactly once. It carries no cryptographic
//! strength on its own — it is validated structurally, not by any MAC
//! or signature.

use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use rand::seq::SliceRandom;

use crate::error::AppError;

pub const KEY_LEN: usize = 256;

/// A validated permutation of `0..256`.
#[derive(Clone, PartialEq, Eq)]
pub struct Key([u8; KEY_LEN]);

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Key").field(&"<256 bytes>").finish()
    }
}

impl Key {
    /// Draws a uniformly random permutation of `0..256`.
    pub fn generate() -> Self {
        let mut bytes: [u8; KEY_LEN] = identity();
        bytes.shuffle(&mut rand::thread_rng());
        Key(bytes)
    }

    /// Wraps `bytes` as a `Key`, checking the permutation invariant.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Result<Self, AppError> {
        if validate(&bytes) {
            Ok(Key(bytes))
        } else {
            Err(AppError::InvalidKey)
        }
    }

    /// base64url-decodes `s` into a `Key`, validating length and permutation.
    pub fn decode(s: &str) -> Result<Self, AppError> {
        let raw = URL_SAFE.decode(s).map_err(|_| AppError::InvalidKey)?;
        let bytes: [u8; KEY_LEN] = raw.try_into().map_err(|_| AppError::InvalidKey)?;
        Key::from_bytes(bytes)
    }

    /// base64url-encodes the key's 256 bytes (padded).
    pub fn encode(&self) -> String {
        URL_SAFE.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

fn identity() -> [u8; KEY_LEN] {
    let mut bytes = [0u8; KEY_LEN];
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = i as u8;
    }
    bytes
}

/// True iff `bytes` has length 256 and every value 0..255 appears exactly once.
pub fn validate(bytes: &[u8]) -> bool {
    if bytes.len() != KEY_LEN {
        return false;
    }
    let mut seen = [false; KEY_LEN];
    for &b in bytes {
        if seen[b as usize] {
            return false;
        }
        seen[b as usize] = true;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_key_validates() {
        assert!(validate(&identity()));
    }

    #[test]
    fn duplicate_byte_fails_validation() {
        let mut bytes = identity();
        bytes[10] = bytes[11];
        assert!(!validate(&bytes));
    }

    #[test]
    fn wrong_length_fails_validation() {
        assert!(!validate(&[0u8; 255]));
        assert!(!validate(&[0u8; 257]));
    }

    #[test]
    fn generate_produces_a_permutation() {
        let key = Key::generate();
        assert!(validate(key.as_bytes()));
    }

    #[test]
    fn encode_decode_round_trip() {
        let key = Key::generate();
        let encoded = key.encode();
        let decoded = Key::decode(&encoded).expect("valid key should decode");
        assert_eq!(key, decoded);
    }

    #[test]
    fn decode_rejects_truncated_base64() {
        let key = Key::generate();
        let mut encoded = key.encode();
        encoded.truncate(encoded.len() - 4);
        assert!(matches!(Key::decode(&encoded), Err(AppError::InvalidKey)));
    }

    #[test]
    fn decode_rejects_non_permutation() {
        let mut bytes = identity();
        bytes[0] = bytes[1];
        let encoded = URL_SAFE.encode(bytes);
        assert!(matches!(Key::decode(&encoded), Err(AppError::InvalidKey)));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(Key::decode("not valid base64!!"), Err(AppError::InvalidKey)));
    }
}
