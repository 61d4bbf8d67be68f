//! Signing identity and address derivation
//!
//! Key management lives outside the engine; this module only wraps ready key
//! material as a [`Signer`] and derives Bitcoin-style addresses from public keys.

#[allow(clippy::module_inception)]
pub mod wallet;

pub use wallet::{
    convert_address, derive_address, hash_pub_key, validate_address, Signer, Wallet,
    ADDRESS_CHECK_SUM_LEN,
};
