//! shielded keypairs
//!
//! - private key: random field element, never leaves the client
//! - public key: Hash(private key), bound into note commitments
//! - encryption key: x25519 key derived from the private key, used to
//!   deliver notes through the public event log
//!
//! an address is `0x || hex(pubkey) || hex(encryption key)`. parsing an
//! address gives a receive-only keypair.

use core::fmt;

use rand::{CryptoRng, RngCore};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use crate::encrypt::{self, DecryptError, EncryptError};
use crate::field::FieldElement;
use crate::hash;

/// hex characters in an address, without the 0x prefix
pub const ADDRESS_HEX_LEN: usize = 128;

const SIGNATURE_DOMAIN: &[u8] = b"umbra.keys.signature.v1";
const ENCRYPTION_KEY_CONTEXT: &str = "umbra 2024-06 note encryption secret v1";

/// spending keypair
#[derive(Clone)]
pub struct Keypair {
    privkey: Option<FieldElement>,
    pubkey: FieldElement,
    encryption_key: [u8; 32],
}

impl Keypair {
    /// fresh keypair with a random private key
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_private_key(FieldElement::random(rng))
    }

    pub fn from_private_key(privkey: FieldElement) -> Self {
        let pubkey = hash::hash(&[privkey]);
        let secret = encryption_secret(&privkey);
        Self {
            privkey: Some(privkey),
            pubkey,
            encryption_key: X25519Public::from(&secret).to_bytes(),
        }
    }

    /// parse an address produced by [`Keypair::address`]
    pub fn from_string(address: &str) -> Result<Self, KeyError> {
        let digits = address.strip_prefix("0x").unwrap_or(address);
        if digits.len() != ADDRESS_HEX_LEN {
            return Err(KeyError::InvalidAddressLength(digits.len()));
        }
        let bytes = hex::decode(digits).map_err(|e| KeyError::InvalidAddress(e.to_string()))?;

        let mut pubkey_be = [0u8; 32];
        pubkey_be.copy_from_slice(&bytes[..32]);
        pubkey_be.reverse();
        let pubkey = FieldElement::from_bytes(&pubkey_be)
            .ok_or_else(|| KeyError::InvalidAddress("public key is not a field element".into()))?;

        let mut encryption_key = [0u8; 32];
        encryption_key.copy_from_slice(&bytes[32..]);

        Ok(Self {
            privkey: None,
            pubkey,
            encryption_key,
        })
    }

    pub fn address(&self) -> String {
        let pubkey = self.pubkey.to_hex();
        format!("{}{}", pubkey, hex::encode(self.encryption_key))
    }

    pub fn pubkey(&self) -> FieldElement {
        self.pubkey
    }

    pub fn encryption_key(&self) -> [u8; 32] {
        self.encryption_key
    }

    pub fn can_spend(&self) -> bool {
        self.privkey.is_some()
    }

    /// spend authorisation for a note at a tree position:
    /// Hash(privkey, commitment, index)
    pub fn sign(&self, commitment: FieldElement, index: u64) -> Result<FieldElement, KeyError> {
        let privkey = self.privkey.ok_or(KeyError::MissingPrivateKey)?;
        Ok(hash::hash_with_domain(
            SIGNATURE_DOMAIN,
            &[privkey, commitment, FieldElement::from_u64(index)],
        ))
    }

    /// encrypt to this keypair's encryption key
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        plaintext: &[u8],
        rng: &mut R,
    ) -> Result<Vec<u8>, EncryptError> {
        encrypt::encrypt(&self.encryption_key, plaintext, rng)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, DecryptError> {
        let privkey = self.privkey.ok_or(DecryptError::MissingPrivateKey)?;
        encrypt::decrypt(&encryption_secret(&privkey), ciphertext)
    }
}

fn encryption_secret(privkey: &FieldElement) -> StaticSecret {
    StaticSecret::from(blake3::derive_key(ENCRYPTION_KEY_CONTEXT, &privkey.to_bytes()))
}

impl PartialEq for Keypair {
    fn eq(&self, other: &Self) -> bool {
        self.pubkey == other.pubkey && self.encryption_key == other.encryption_key
    }
}

impl Eq for Keypair {}

// never print the private key
impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("pubkey", &self.pubkey)
            .field("can_spend", &self.can_spend())
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("keypair has no private key")]
    MissingPrivateKey,
    #[error("address must be {ADDRESS_HEX_LEN} hex characters, got {0}")]
    InvalidAddressLength(usize),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}
