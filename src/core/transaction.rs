// A transaction moves `amount` from the signer's address to `receiver`.
// Content hash covers (sender_address, receiver, amount, timestamp); the id is its hex form
// and the signature is made over the raw digest.

use crate::error::{Result, TransactionViolation};
use crate::utils::{
    current_timestamp, ecdsa_p256_sha256_sign_verify, encode_canonical, sha256_digest,
};
use crate::wallet::derive_address;
use data_encoding::HEXLOWER;
use log::debug;
use serde::{Deserialize, Serialize};

// Uncompressed SEC1 point: 0x04 || X || Y
const P256_PUBLIC_KEY_LEN: usize = 65;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub(crate) id: String,
    pub(crate) sender_public_key: Vec<u8>,
    pub(crate) sender_address: String,
    pub(crate) receiver: String,
    pub(crate) amount: f64,
    pub(crate) fee: f64,
    pub(crate) timestamp: i64, // milliseconds since the Unix epoch
    pub(crate) signature: Vec<u8>,
}

impl Transaction {
    /// Build an unsigned transaction; a [`Signer`](crate::wallet::Signer) fills in the rest.
    ///
    /// The timestamp is part of the content hash, so tests that need reproducible
    /// ids pass a fixed value here.
    pub fn new(receiver: &str, amount: f64, fee: f64, timestamp: i64) -> Transaction {
        Transaction {
            id: String::new(),
            sender_public_key: vec![],
            sender_address: String::new(),
            receiver: receiver.to_string(),
            amount,
            fee,
            timestamp,
            signature: vec![],
        }
    }

    /// Same as [`Transaction::new`] stamped with the current time
    pub fn new_now(receiver: &str, amount: f64, fee: f64) -> Result<Transaction> {
        Ok(Self::new(receiver, amount, fee, current_timestamp()?))
    }

    /// SHA-256 over the canonical encoding of (sender_address, receiver, amount, timestamp)
    pub fn content_hash(&self) -> Result<Vec<u8>> {
        let content = (
            self.sender_address.clone(),
            self.receiver.clone(),
            self.amount,
            self.timestamp,
        );
        Ok(sha256_digest(&encode_canonical(&content)?))
    }

    pub fn content_hash_hex(&self) -> Result<String> {
        Ok(HEXLOWER.encode(&self.content_hash()?))
    }

    /// Run every validation rule and report the first one that fails
    pub fn check(&self) -> Result<()> {
        if !(self.amount.is_finite() && self.amount > 0.0) {
            return Err(TransactionViolation::NonPositiveAmount(self.amount).into());
        }

        let digest = self.content_hash()?;
        let expected_id = HEXLOWER.encode(&digest);
        if expected_id != self.id {
            return Err(TransactionViolation::IdMismatch {
                expected: expected_id,
                actual: self.id.clone(),
            }
            .into());
        }

        if self.sender_public_key.len() != P256_PUBLIC_KEY_LEN || self.sender_public_key[0] != 0x04
        {
            return Err(TransactionViolation::MalformedPublicKey.into());
        }

        if !ecdsa_p256_sha256_sign_verify(&self.sender_public_key, &self.signature, &digest) {
            return Err(TransactionViolation::BadSignature.into());
        }

        let derived = derive_address(&self.sender_public_key);
        if derived != self.sender_address {
            return Err(TransactionViolation::AddressMismatch {
                derived,
                claimed: self.sender_address.clone(),
            }
            .into());
        }

        Ok(())
    }

    /// `true` when every rule in [`Transaction::check`] passes. Never fails, so a block's
    /// transaction list can be scanned in one pass.
    pub fn validate(&self) -> bool {
        match self.check() {
            Ok(()) => true,
            Err(e) => {
                debug!("Transaction {} rejected: {e}", self.id);
                false
            }
        }
    }

    pub fn get_id(&self) -> &str {
        self.id.as_str()
    }

    pub fn get_sender_public_key(&self) -> &[u8] {
        self.sender_public_key.as_slice()
    }

    pub fn get_sender_address(&self) -> &str {
        self.sender_address.as_str()
    }

    pub fn get_receiver(&self) -> &str {
        self.receiver.as_str()
    }

    pub fn get_amount(&self) -> f64 {
        self.amount
    }

    pub fn get_fee(&self) -> f64 {
        self.fee
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_signature(&self) -> &[u8] {
        self.signature.as_slice()
    }
}
