//! note discovery by trial decryption
//!
//! walks the pool's `NewCommitment` events, tries to decrypt each output
//! with the holder's keypair, and keeps the ones whose recomputed
//! commitment matches and whose nullifier is not yet spent.
//!
//! ```ignore
//! let scanner = Scanner::new(keypair);
//! let notes = scanner.scan(state.events(), state.nullifiers());
//! ```

use tracing::debug;

use crate::events::EventLog;
use crate::keys::Keypair;
use crate::note::{Note, NoteCommitment};
use crate::nullifier::{Nullifier, NullifierSet};
use crate::value::Amount;

/// successfully decrypted note
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveredNote {
    pub note: Note,
    pub nullifier: Nullifier,
}

/// trial decryption with one keypair
pub struct Scanner {
    keypair: Keypair,
}

impl Scanner {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    /// decrypt one output. `None` if it belongs to someone else or the
    /// plaintext does not open `commitment`
    pub fn try_decrypt(
        &self,
        commitment: &NoteCommitment,
        index: u64,
        encrypted_output: &[u8],
    ) -> Option<DiscoveredNote> {
        let note = Note::decrypt(&self.keypair, encrypted_output, index).ok()?;
        if note.commitment() != *commitment {
            debug!("output {} decrypted but does not open its commitment", index);
            return None;
        }
        let nullifier = note.nullifier().ok()?;
        Some(DiscoveredNote { note, nullifier })
    }

    /// every owned note in the log, spent or not
    pub fn scan_all(&self, events: &EventLog) -> Vec<DiscoveredNote> {
        events
            .commitments()
            .filter_map(|(commitment, index, output)| self.try_decrypt(commitment, index, output))
            .collect()
    }

    /// owned, unspent notes with a non-zero amount
    pub fn scan(&self, events: &EventLog, spent: &NullifierSet) -> Vec<DiscoveredNote> {
        let notes: Vec<_> = self
            .scan_all(events)
            .into_iter()
            .filter(|d| !d.note.amount.is_zero() && !spent.contains(&d.nullifier))
            .collect();
        debug!("scan found {} unspent notes", notes.len());
        notes
    }

    /// total of unspent notes
    pub fn balance(&self, events: &EventLog, spent: &NullifierSet) -> Amount {
        self.scan(events, spent)
            .iter()
            .fold(Amount::ZERO, |acc, d| acc.saturating_add(d.note.amount))
    }
}
