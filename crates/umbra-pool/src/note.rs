//! shielded notes (utxos)
//!
//! a note is an amount owned by a keypair, hidden behind a blinding
//! factor. only its commitment is published; spending it publishes the
//! nullifier, which needs the owner's private key and the leaf index.

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::encrypt::{DecryptError, EncryptError};
use crate::field::FieldElement;
use crate::hash;
use crate::keys::{KeyError, Keypair};
use crate::nullifier::Nullifier;
use crate::value::Amount;

/// plaintext payload: amount (16 bytes le) || blinding (32 bytes)
pub const NOTE_PLAINTEXT_LEN: usize = 16 + 32;

/// a shielded note
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Note {
    pub amount: Amount,
    pub keypair: Keypair,
    pub blinding: FieldElement,
    /// leaf index, known once the commitment is in the tree
    pub index: Option<u64>,
}

impl Note {
    /// note with a random blinding factor
    pub fn new<R: RngCore + CryptoRng>(amount: Amount, keypair: Keypair, rng: &mut R) -> Self {
        Self::with_blinding(amount, keypair, FieldElement::random(rng))
    }

    pub fn with_blinding(amount: Amount, keypair: Keypair, blinding: FieldElement) -> Self {
        Self {
            amount,
            keypair,
            blinding,
            index: None,
        }
    }

    /// zero-amount padding note owned by a throwaway keypair
    pub fn zero<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let keypair = Keypair::random(rng);
        Self::new(Amount::ZERO, keypair, rng)
    }

    pub fn at_index(mut self, index: u64) -> Self {
        self.index = Some(index);
        self
    }

    /// Hash(amount, pubkey, blinding)
    pub fn commitment(&self) -> NoteCommitment {
        NoteCommitment(hash::hash(&[
            self.amount.to_field(),
            self.keypair.pubkey(),
            self.blinding,
        ]))
    }

    /// Hash(commitment, index, signature)
    ///
    /// zero-amount notes are never checked for membership and always use
    /// index 0.
    pub fn nullifier(&self) -> Result<Nullifier, NoteError> {
        let index = if self.amount.is_zero() {
            0
        } else {
            self.index.ok_or(NoteError::UnboundNote)?
        };
        let commitment = self.commitment().0;
        let signature = self.keypair.sign(commitment, index)?;
        Ok(Nullifier(hash::hash(&[
            commitment,
            FieldElement::from_u64(index),
            signature,
        ])))
    }

    /// encrypt (amount, blinding) to the owner's encryption key
    pub fn encrypt<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Result<Vec<u8>, EncryptError> {
        let mut payload = [0u8; NOTE_PLAINTEXT_LEN];
        payload[..16].copy_from_slice(&self.amount.0.to_le_bytes());
        payload[16..].copy_from_slice(&self.blinding.to_bytes());
        self.keypair.encrypt(&payload, rng)
    }

    /// rebuild a note from an encrypted output found at `index`
    pub fn decrypt(keypair: &Keypair, ciphertext: &[u8], index: u64) -> Result<Self, DecryptError> {
        let payload = keypair.decrypt(ciphertext)?;
        if payload.len() != NOTE_PLAINTEXT_LEN {
            return Err(DecryptError::MalformedPayload);
        }
        let mut amount = [0u8; 16];
        amount.copy_from_slice(&payload[..16]);
        let mut blinding = [0u8; 32];
        blinding.copy_from_slice(&payload[16..]);
        let blinding = FieldElement::from_bytes(&blinding).ok_or(DecryptError::MalformedPayload)?;

        Ok(Self::with_blinding(Amount(u128::from_le_bytes(amount)), keypair.clone(), blinding)
            .at_index(index))
    }
}

/// commitment to a note (a tree leaf)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteCommitment(pub FieldElement);

impl NoteCommitment {
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }
}

impl From<FieldElement> for NoteCommitment {
    fn from(v: FieldElement) -> Self {
        Self(v)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum NoteError {
    #[error("note has no leaf index")]
    UnboundNote,
    #[error("note keypair has no private key")]
    MissingPrivateKey,
}

impl From<KeyError> for NoteError {
    fn from(_: KeyError) -> Self {
        // sign only fails for a missing private key
        NoteError::MissingPrivateKey
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_note_commitment() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let kp = Keypair::random(&mut rng);
        let blinding = FieldElement::from_u64(5);

        let note = Note::with_blinding(Amount(1000), kp.clone(), blinding);
        let same = Note::with_blinding(Amount(1000), kp.clone(), blinding);
        assert_eq!(note.commitment(), same.commitment());

        let other = Note::with_blinding(Amount(1000), kp, FieldElement::from_u64(6));
        assert_ne!(note.commitment(), other.commitment());
    }

    #[test]
    fn test_nullifier_needs_index_and_key() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let kp = Keypair::random(&mut rng);
        let note = Note::new(Amount(10), kp.clone(), &mut rng);
        assert_eq!(note.nullifier(), Err(NoteError::UnboundNote));

        let at_3 = note.clone().at_index(3).nullifier().unwrap();
        let at_4 = note.clone().at_index(4).nullifier().unwrap();
        assert_ne!(at_3, at_4);

        let public_only = Keypair::from_string(&kp.address()).unwrap();
        let watched = Note::with_blinding(Amount(10), public_only, note.blinding).at_index(3);
        assert_eq!(watched.commitment(), note.commitment());
        assert_eq!(watched.nullifier(), Err(NoteError::MissingPrivateKey));
    }

    #[test]
    fn test_zero_note_uses_index_zero() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let zero = Note::zero(&mut rng);
        let unbound = zero.nullifier().unwrap();
        assert_eq!(unbound, zero.clone().at_index(0).nullifier().unwrap());
        assert_eq!(unbound, zero.at_index(9).nullifier().unwrap());
    }

    #[test]
    fn test_note_encrypt_decrypt() {
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let kp = Keypair::random(&mut rng);
        let note = Note::new(Amount(42), kp.clone(), &mut rng);

        let ct = note.encrypt(&mut rng).unwrap();
        let found = Note::decrypt(&kp, &ct, 7).unwrap();
        assert_eq!(found.amount, Amount(42));
        assert_eq!(found.index, Some(7));
        assert_eq!(found.commitment(), note.commitment());

        let other = Keypair::random(&mut rng);
        assert_eq!(Note::decrypt(&other, &ct, 7), Err(DecryptError::Authentication));
    }
}
