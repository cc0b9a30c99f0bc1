//! Byte-substitution obfuscation: a pair of 256-entry lookup tables
//! derived from a [`crate::key::Key`].
//!
//! This is obfuscation, not encryption — a passive observer who can
//! see both plaintext and ciphertext recovers the whole table trivially.
//! It only disguises a stream from naive protocol fingerprinting.

use crate::key::{Key, KEY_LEN};

#[derive(Clone)]
pub struct Cipher {
    enc_table: [u8; KEY_LEN],
    dec_table: [u8; KEY_LEN],
}

impl Cipher {
    /// Builds a `Cipher` from `key`, treating it as the encode table and
    /// computing its functional inverse as the decode table.
    pub fn new(key: &Key) -> Self {
        let enc_table = *key.as_bytes();
        let mut dec_table = [0u8; KEY_LEN];
        for (i, &v) in enc_table.iter().enumerate() {
            dec_table[v as usize] = i as u8;
        }
        Cipher { enc_table, dec_table }
    }

    /// Substitutes each byte of `buf` through the encode table, in place.
    pub fn encode(&self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b = self.enc_table[*b as usize];
        }
    }

    /// Substitutes each byte of `buf` through the decode table, in place.
    pub fn decode(&self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b = self.dec_table[*b as usize];
        }
    }
}
