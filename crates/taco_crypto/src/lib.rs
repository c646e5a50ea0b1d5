//! # TACO Crypto
//!
//! Rijndael block cipher with independent key and block sizes. With a
//! 128-bit block it is AES (FIPS-197).
//!
//! ## Architecture
//!
//! ```text
//!  key ──> key schedule ──> round keys ─┐
//!                                       v
//!  plaintext ──> [mode: ECB / CBC] ──> rounds ──> ciphertext
//!                                       ^
//!            GF(2^8) tables (built once, shared by every cipher)
//! ```
//!
//! ## Usage
//!
//! ```
//! use taco_crypto::{BlockMode, Rijndael};
//!
//! let cipher = Rijndael::new(&[7u8; 16], 128)?;
//! let plaintext = [42u8; 32];
//! let mut ciphertext = [0u8; 32];
//! cipher.encrypt(&plaintext, &mut ciphertext, BlockMode::Cbc)?;
//!
//! let mut decrypted = [0u8; 32];
//! cipher.decrypt(&ciphertext, &mut decrypted, BlockMode::Cbc)?;
//! assert_eq!(decrypted, plaintext);
//! # Ok::<(), taco_crypto::CipherError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod cipher;
pub mod error;
mod tables;

pub use cipher::{BlockMode, Rijndael};
pub use error::{CipherError, CipherResult};
