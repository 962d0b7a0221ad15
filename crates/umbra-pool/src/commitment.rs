//! note commitment tree
//!
//! append-only merkle tree of fixed height. every populated node is
//! cached, so a batch insert rehashes each affected level exactly once and
//! produces exactly one new root. the last `history_size` superseded roots
//! stay valid as proof anchors.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::field::FieldElement;
use crate::hash;
use crate::note::NoteCommitment;

/// maximum supported tree height
pub const MAX_TREE_HEIGHT: usize = 32;

const MERKLE_DOMAIN: &[u8] = b"umbra.merkle.node.v1";
const ZERO_LEAF_DOMAIN: &[u8] = b"umbra.merkle.zero-leaf.v1";

/// merkle root of the commitment tree
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MerkleRoot(pub FieldElement);

impl MerkleRoot {
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }
}

fn hash_node(left: FieldElement, right: FieldElement) -> FieldElement {
    hash::hash_with_domain(MERKLE_DOMAIN, &[left, right])
}

/// value of an empty leaf
pub fn zero_leaf() -> FieldElement {
    hash::hash_bytes(ZERO_LEAF_DOMAIN, &[])
}

/// merkle authentication path
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    /// leaf index
    pub index: u64,
    /// sibling hashes from leaf to root
    pub siblings: Vec<FieldElement>,
}

impl MerklePath {
    /// placeholder path for zero-amount inputs, never checked
    pub fn empty(height: usize) -> Self {
        Self {
            index: 0,
            siblings: vec![FieldElement::ZERO; height],
        }
    }

    pub fn compute_root(&self, leaf: &NoteCommitment) -> MerkleRoot {
        let mut current = leaf.0;
        let mut pos = self.index;
        for sibling in &self.siblings {
            current = if pos & 1 == 0 {
                hash_node(current, *sibling)
            } else {
                hash_node(*sibling, current)
            };
            pos >>= 1;
        }
        MerkleRoot(current)
    }

    /// verify that `leaf` is in a tree with the given root
    pub fn verify(&self, leaf: &NoteCommitment, root: &MerkleRoot) -> bool {
        self.compute_root(leaf) == *root
    }
}

/// incremental commitment tree with a bounded window of known roots
#[derive(Clone, Debug)]
pub struct MerkleTree {
    height: usize,
    /// layers[0] = leaves, layers[height] = [root] once non-empty
    layers: Vec<Vec<FieldElement>>,
    /// zeros[level] = root of an empty subtree of that height
    zeros: Vec<FieldElement>,
    root: MerkleRoot,
    history: VecDeque<MerkleRoot>,
    history_size: usize,
}

impl MerkleTree {
    pub fn new(height: usize, history_size: usize) -> Result<Self, TreeError> {
        if height == 0 || height > MAX_TREE_HEIGHT {
            return Err(TreeError::InvalidHeight(height));
        }
        if history_size == 0 {
            return Err(TreeError::InvalidHistorySize);
        }

        let mut zeros = Vec::with_capacity(height + 1);
        zeros.push(zero_leaf());
        for level in 0..height {
            zeros.push(hash_node(zeros[level], zeros[level]));
        }
        let root = MerkleRoot(zeros[height]);

        Ok(Self {
            height,
            layers: vec![Vec::new(); height + 1],
            zeros,
            root,
            history: VecDeque::with_capacity(history_size),
            history_size,
        })
    }

    /// rebuild a tree from published commitments, in order
    pub fn from_leaves(
        height: usize,
        history_size: usize,
        leaves: &[NoteCommitment],
    ) -> Result<Self, TreeError> {
        let mut tree = Self::new(height, history_size)?;
        tree.insert_batch(leaves)?;
        Ok(tree)
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.height
    }

    /// number of leaves
    pub fn len(&self) -> u64 {
        self.layers[0].len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.layers[0].is_empty()
    }

    pub fn root(&self) -> MerkleRoot {
        self.root
    }

    /// current root or one of the last `history_size` superseded roots
    pub fn is_known_root(&self, root: &MerkleRoot) -> bool {
        self.root == *root || self.history.contains(root)
    }

    /// superseded roots, oldest first
    pub fn history(&self) -> impl Iterator<Item = &MerkleRoot> {
        self.history.iter()
    }

    /// fails without mutating if the batch does not fit
    pub fn ensure_capacity(&self, additional: usize) -> Result<(), TreeError> {
        let fits = self
            .len()
            .checked_add(additional as u64)
            .map(|n| n <= self.capacity())
            .unwrap_or(false);
        if fits {
            Ok(())
        } else {
            Err(TreeError::TreeFull {
                capacity: self.capacity(),
                len: self.len(),
                requested: additional,
            })
        }
    }

    /// append leaves in the given order and return the new root
    pub fn insert_batch(&mut self, leaves: &[NoteCommitment]) -> Result<MerkleRoot, TreeError> {
        self.ensure_capacity(leaves.len())?;
        if leaves.is_empty() {
            return Ok(self.root);
        }

        let start = self.layers[0].len();
        self.layers[0].extend(leaves.iter().map(|c| c.0));

        // rehash only the dirty span of each level
        let mut first = start;
        for level in 0..self.height {
            let len = self.layers[level].len();
            let parent_first = first / 2;
            let parent_last = (len - 1) / 2;
            let parent_len = parent_last + 1;
            self.layers[level + 1].resize(parent_len, FieldElement::ZERO);

            for parent in parent_first..parent_len {
                let left = self.layers[level][2 * parent];
                let right = self.layers[level]
                    .get(2 * parent + 1)
                    .copied()
                    .unwrap_or(self.zeros[level]);
                self.layers[level + 1][parent] = hash_node(left, right);
            }
            first = parent_first;
        }

        if self.history.len() == self.history_size {
            self.history.pop_front();
        }
        self.history.push_back(self.root);
        self.root = MerkleRoot(self.layers[self.height][0]);
        Ok(self.root)
    }

    /// authentication path for the leaf at `index` against the current root
    pub fn path(&self, index: u64) -> Option<MerklePath> {
        if index >= self.len() {
            return None;
        }
        let mut pos = index as usize;
        let mut siblings = Vec::with_capacity(self.height);
        for level in 0..self.height {
            let sibling = self.layers[level]
                .get(pos ^ 1)
                .copied()
                .unwrap_or(self.zeros[level]);
            siblings.push(sibling);
            pos >>= 1;
        }
        Some(MerklePath { index, siblings })
    }

    /// leaf index of a commitment
    pub fn index_of(&self, commitment: &NoteCommitment) -> Option<u64> {
        self.layers[0]
            .iter()
            .position(|leaf| *leaf == commitment.0)
            .map(|i| i as u64)
    }

    pub fn leaves(&self) -> impl Iterator<Item = NoteCommitment> + '_ {
        self.layers[0].iter().copied().map(NoteCommitment)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("tree height must be in 1..={MAX_TREE_HEIGHT}, got {0}")]
    InvalidHeight(usize),
    #[error("root history size must be at least 1")]
    InvalidHistorySize,
    #[error("tree full: {len}/{capacity} leaves, cannot insert {requested}")]
    TreeFull {
        capacity: u64,
        len: u64,
        requested: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn leaf(v: u64) -> NoteCommitment {
        NoteCommitment(FieldElement::from_u64(v))
    }

    /// root recomputed from scratch, level by level
    fn naive_root(height: usize, leaves: &[NoteCommitment]) -> MerkleRoot {
        let mut level: Vec<FieldElement> = leaves.iter().map(|c| c.0).collect();
        let mut zero = zero_leaf();
        for _ in 0..height {
            if level.is_empty() {
                level.push(zero);
            }
            if level.len() % 2 == 1 {
                level.push(zero);
            }
            level = level.chunks(2).map(|c| hash_node(c[0], c[1])).collect();
            zero = hash_node(zero, zero);
        }
        MerkleRoot(level[0])
    }

    #[test]
    fn test_empty_root() {
        let tree = MerkleTree::new(5, 10).unwrap();
        assert_eq!(tree.root(), naive_root(5, &[]));
        assert!(tree.is_known_root(&tree.root()));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_invalid_params() {
        assert_eq!(MerkleTree::new(0, 1).unwrap_err(), TreeError::InvalidHeight(0));
        assert_eq!(MerkleTree::new(33, 1).unwrap_err(), TreeError::InvalidHeight(33));
        assert_eq!(MerkleTree::new(4, 0).unwrap_err(), TreeError::InvalidHistorySize);
    }

    #[test]
    fn test_paths_verify() {
        let leaves: Vec<_> = (1..=7).map(leaf).collect();
        let tree = MerkleTree::from_leaves(4, 10, &leaves).unwrap();
        assert_eq!(tree.root(), naive_root(4, &leaves));

        for (i, l) in leaves.iter().enumerate() {
            let path = tree.path(i as u64).unwrap();
            assert!(path.verify(l, &tree.root()));
            assert!(!path.verify(&leaf(100), &tree.root()));
            assert_eq!(tree.index_of(l), Some(i as u64));
        }
        assert!(tree.path(7).is_none());
        assert_eq!(tree.index_of(&leaf(100)), None);
    }

    #[test]
    fn test_tree_full_does_not_mutate() {
        let mut tree = MerkleTree::new(2, 10).unwrap();
        tree.insert_batch(&[leaf(1), leaf(2), leaf(3)]).unwrap();
        let root = tree.root();

        let err = tree.insert_batch(&[leaf(4), leaf(5)]).unwrap_err();
        assert_eq!(
            err,
            TreeError::TreeFull {
                capacity: 4,
                len: 3,
                requested: 2
            }
        );
        assert_eq!(tree.root(), root);
        assert_eq!(tree.len(), 3);

        tree.insert_batch(&[leaf(4)]).unwrap();
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_root_history_window() {
        let mut tree = MerkleTree::new(5, 2).unwrap();
        let r0 = tree.root();
        tree.insert_batch(&[leaf(1), leaf(2)]).unwrap();
        let r1 = tree.root();
        tree.insert_batch(&[leaf(3), leaf(4)]).unwrap();
        assert!(tree.is_known_root(&r0));
        assert!(tree.is_known_root(&r1));

        tree.insert_batch(&[leaf(5), leaf(6)]).unwrap();
        assert!(!tree.is_known_root(&r0));
        assert!(tree.is_known_root(&r1));
        assert_eq!(tree.history().count(), 2);
    }

    #[test]
    fn test_one_root_per_batch() {
        let mut tree = MerkleTree::new(5, 10).unwrap();
        tree.insert_batch(&[leaf(1), leaf(2)]).unwrap();
        // the intermediate single-leaf root never becomes known
        let intermediate = naive_root(5, &[leaf(1)]);
        assert!(!tree.is_known_root(&intermediate));
    }

    proptest! {
        #[test]
        fn prop_batches_match_naive(
            values in proptest::collection::vec(any::<u64>(), 0..40),
            split in 1usize..8,
        ) {
            let leaves: Vec<_> = values.into_iter().map(leaf).collect();
            let mut tree = MerkleTree::new(6, 100).unwrap();
            for chunk in leaves.chunks(split) {
                tree.insert_batch(chunk).unwrap();
            }
            prop_assert_eq!(tree.root(), naive_root(6, &leaves));
            prop_assert_eq!(tree.len(), leaves.len() as u64);
        }
    }
}
