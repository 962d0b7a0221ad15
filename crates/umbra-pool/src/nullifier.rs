//! nullifiers for preventing double-spends
//!
//! spending a note publishes its nullifier. a nullifier already in the set
//! means the note was spent before and the transaction is rejected.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::field::FieldElement;

/// nullifier - unique identifier for a spent note
///
/// Hash(commitment, index, Hash(privkey, commitment, index)). only the
/// owner can compute it and it does not reveal which commitment was spent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Nullifier(pub FieldElement);

impl Nullifier {
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }
}

impl From<FieldElement> for Nullifier {
    fn from(v: FieldElement) -> Self {
        Self(v)
    }
}

/// append-only set of spent nullifiers
#[derive(Clone, Debug, Default)]
pub struct NullifierSet {
    nullifiers: HashSet<Nullifier>,
}

impl NullifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// check if nullifier exists (note already spent)
    pub fn contains(&self, nullifier: &Nullifier) -> bool {
        self.nullifiers.contains(nullifier)
    }

    /// mark spent. returns false if already present
    pub fn try_insert(&mut self, nullifier: Nullifier) -> bool {
        self.nullifiers.insert(nullifier)
    }

    /// first nullifier that is either spent or repeated within `batch`
    pub fn first_conflict<'a, I>(&self, batch: I) -> Option<Nullifier>
    where
        I: IntoIterator<Item = &'a Nullifier>,
    {
        let mut seen = HashSet::new();
        batch
            .into_iter()
            .find(|nf| self.contains(nf) || !seen.insert(**nf))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.nullifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nullifiers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Nullifier> {
        self.nullifiers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nf(v: u64) -> Nullifier {
        Nullifier(FieldElement::from_u64(v))
    }

    #[test]
    fn test_nullifier_set() {
        let mut set = NullifierSet::new();
        assert!(!set.contains(&nf(1)));
        assert!(set.try_insert(nf(1)));
        assert!(set.contains(&nf(1)));
        assert!(!set.try_insert(nf(1))); // double-spend rejected
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_first_conflict() {
        let mut set = NullifierSet::new();
        set.try_insert(nf(1));

        assert_eq!(set.first_conflict(&[nf(2), nf(3)]), None);
        assert_eq!(set.first_conflict(&[nf(2), nf(1)]), Some(nf(1)));
        // duplicate within one transaction
        assert_eq!(set.first_conflict(&[nf(4), nf(4)]), Some(nf(4)));
        assert_eq!(set.len(), 1);
    }
}
