//! note encryption using x25519 + chacha20poly1305
//!
//! output notes are encrypted to the recipient's encryption key and
//! published in the event log. recipients discover their notes by trial
//! decryption; a wrong key fails authentication.
//!
//! wire format: `ephemeral_pk (32) || nonce (12) || ciphertext + tag`

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{CryptoRng, RngCore};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

const EPK_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// minimum ciphertext length (empty plaintext)
pub const MIN_CIPHERTEXT_LEN: usize = EPK_LEN + NONCE_LEN + TAG_LEN;

/// encrypt `plaintext` to an x25519 public key
pub fn encrypt<R: RngCore + CryptoRng>(
    recipient: &[u8; 32],
    plaintext: &[u8],
    rng: &mut R,
) -> Result<Vec<u8>, EncryptError> {
    let ephemeral_secret = EphemeralSecret::random_from_rng(&mut *rng);
    let ephemeral_public = PublicKey::from(&ephemeral_secret);

    let shared = ephemeral_secret.diffie_hellman(&PublicKey::from(*recipient));
    let key = derive_encryption_key(shared.as_bytes(), ephemeral_public.as_bytes());

    let mut nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| EncryptError::EncryptionFailed)?;

    let mut out = Vec::with_capacity(EPK_LEN + NONCE_LEN + sealed.len());
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// decrypt with the recipient's x25519 secret
pub fn decrypt(secret: &StaticSecret, ciphertext: &[u8]) -> Result<Vec<u8>, DecryptError> {
    if ciphertext.len() < MIN_CIPHERTEXT_LEN {
        return Err(DecryptError::Truncated(ciphertext.len()));
    }
    let (epk, rest) = ciphertext.split_at(EPK_LEN);
    let (nonce, sealed) = rest.split_at(NONCE_LEN);

    let mut epk_bytes = [0u8; EPK_LEN];
    epk_bytes.copy_from_slice(epk);

    let shared = secret.diffie_hellman(&PublicKey::from(epk_bytes));
    let key = derive_encryption_key(shared.as_bytes(), &epk_bytes);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| DecryptError::Authentication)
}

/// derive symmetric key from shared secret and ephemeral pubkey
fn derive_encryption_key(shared_secret: &[u8], epk: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"umbra.note.encryption.v1");
    hasher.update(shared_secret);
    hasher.update(epk);
    *hasher.finalize().as_bytes()
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EncryptError {
    #[error("encryption failed")]
    EncryptionFailed,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecryptError {
    #[error("ciphertext too short: {0} bytes")]
    Truncated(usize),
    #[error("decryption failed - wrong key or tampered ciphertext")]
    Authentication,
    #[error("keypair has no private key")]
    MissingPrivateKey,
    #[error("malformed note payload")]
    MalformedPayload,
}
