// src/security/mod.rs
pub mod cipher;

pub use cipher::{ChaChaPatternEncryptor, CipherError, PatternEncryptor};
