//! A tunneling proxy that relays SOCKS5 traffic through an obfuscated
//! byte-substitution stream.
//!
//! The wire protocol is split across two binaries: `lslocal` runs next
//! to the user agent and speaks raw SOCKS5 to it, `lsserver` runs on
//! the remote host and terminates SOCKS5 against the real destination.
//! Everything in between is obfuscated, not encrypted — see
//! [`cipher`] for exactly what guarantee that is and isn't.

pub mod cipher;
pub mod config;
pub mod error;
pub mod key;
pub mod relay;
pub mod secure_stream;
pub mod socks5;
