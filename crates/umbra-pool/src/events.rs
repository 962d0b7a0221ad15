//! append-only pool event log
//!
//! the only public record of pool activity. clients rebuild their tree
//! view from `NewCommitment` events and find their notes by trial
//! decryption of the attached outputs.

use serde::{Deserialize, Serialize};

use crate::ledger::AccountId;
use crate::note::NoteCommitment;
use crate::nullifier::Nullifier;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolEvent {
    NewCommitment {
        commitment: NoteCommitment,
        index: u64,
        encrypted_output: Vec<u8>,
    },
    NewNullifier {
        nullifier: Nullifier,
    },
    /// account bound to a shielded address
    PublicKey {
        owner: AccountId,
        address: String,
    },
}

#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Vec<PoolEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: PoolEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PoolEvent> {
        self.events.iter()
    }

    /// events appended at or after `cursor`
    pub fn since(&self, cursor: usize) -> &[PoolEvent] {
        self.events.get(cursor..).unwrap_or(&[])
    }

    /// (commitment, index, encrypted output) in tree order
    pub fn commitments(&self) -> impl Iterator<Item = (&NoteCommitment, u64, &[u8])> {
        self.events.iter().filter_map(|e| match e {
            PoolEvent::NewCommitment {
                commitment,
                index,
                encrypted_output,
            } => Some((commitment, *index, encrypted_output.as_slice())),
            _ => None,
        })
    }

    pub fn nullifiers(&self) -> impl Iterator<Item = &Nullifier> {
        self.events.iter().filter_map(|e| match e {
            PoolEvent::NewNullifier { nullifier } => Some(nullifier),
            _ => None,
        })
    }
}
