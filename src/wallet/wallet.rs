use crate::core::Transaction;
use crate::error::{BlockchainError, Result};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

const VERSION: u8 = 0x00;
pub const ADDRESS_CHECK_SUM_LEN: usize = 4;

/// Signing capability handed to the engine.
///
/// The engine only ever asks for signatures and the public identity, it never
/// sees private key material.
pub trait Signer: Send + Sync {
    /// Stamp sender identity onto `transaction`, sign its content hash and fill in its id
    fn sign(&self, transaction: Transaction) -> Result<Transaction>;

    fn address(&self) -> String;

    fn public_key(&self) -> &[u8];
}

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct SecretKey(Vec<u8>);

/// ECDSA P-256 signing identity
#[derive(Clone)]
pub struct Wallet {
    pkcs8: SecretKey,
    public_key: Vec<u8>,
    address: String,
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl Wallet {
    pub fn new() -> Result<Wallet> {
        let pkcs8 = crate::utils::new_key_pair()?;
        Self::from_pkcs8(pkcs8)
    }

    /// Wrap key material produced by an external key manager
    pub fn from_pkcs8(pkcs8: Vec<u8>) -> Result<Wallet> {
        let rng = SystemRandom::new();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                .map_err(|e| {
                    BlockchainError::Crypto(format!("Failed to create key pair from PKCS8: {e}"))
                })?;
        let public_key = key_pair.public_key().as_ref().to_vec();
        let address = derive_address(&public_key);
        Ok(Wallet {
            pkcs8: SecretKey(pkcs8),
            public_key,
            address,
        })
    }

    pub fn get_address(&self) -> &str {
        self.address.as_str()
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }
}

impl Signer for Wallet {
    fn sign(&self, mut transaction: Transaction) -> Result<Transaction> {
        transaction.sender_address = self.address.clone();
        transaction.sender_public_key = self.public_key.clone();

        let digest = transaction.content_hash()?;
        transaction.signature = crate::utils::ecdsa_p256_sha256_sign_digest(&self.pkcs8.0, &digest)?;
        transaction.id = data_encoding::HEXLOWER.encode(&digest);
        Ok(transaction)
    }

    fn address(&self) -> String {
        self.address.clone()
    }

    fn public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }
}

pub fn hash_pub_key(pub_key: &[u8]) -> Vec<u8> {
    let pub_key_sha256 = crate::utils::sha256_digest(pub_key);
    crate::utils::ripemd160_digest(pub_key_sha256.as_slice())
}

fn checksum(payload: &[u8]) -> Vec<u8> {
    let first_sha = crate::utils::sha256_digest(payload);
    let second_sha = crate::utils::sha256_digest(first_sha.as_slice());
    second_sha[0..ADDRESS_CHECK_SUM_LEN].to_vec()
}

/// version + pub_key_hash + checksum, base58 encoded
pub fn derive_address(public_key: &[u8]) -> String {
    convert_address(hash_pub_key(public_key).as_slice())
}

pub fn convert_address(pub_hash_key: &[u8]) -> String {
    let mut payload: Vec<u8> = vec![VERSION];
    payload.extend(pub_hash_key);
    let checksum = checksum(payload.as_slice());
    payload.extend(checksum.as_slice());
    crate::utils::base58_encode(payload.as_slice())
}

pub fn validate_address(address: &str) -> bool {
    let payload = match crate::utils::base58_decode(address) {
        Ok(payload) => payload,
        Err(_) => return false,
    };

    if payload.len() < ADDRESS_CHECK_SUM_LEN + 1 {
        return false;
    }

    let (body, actual_checksum) = payload.split_at(payload.len() - ADDRESS_CHECK_SUM_LEN);
    checksum(body).as_slice() == actual_checksum
}
