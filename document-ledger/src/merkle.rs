//! Merkle tree over audit-event hashes
//!
//! Lets a holder of the audit root check that a single event belongs to the
//! log without replaying the whole chain.
//!
//! # Design
//!
//! - Binary tree, SHA-256, leaf and node hashes domain-separated
//!   (`0x00 || leaf`, `0x01 || left || right`)
//! - An odd node at the end of a level is promoted unchanged
//! - Append-only; each append rehashes one path, reads take `&self`

use sha2::{Digest, Sha256};

const LEAF_TAG: u8 = 0x00;
const NODE_TAG: u8 = 0x01;

fn hash_leaf(leaf: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_TAG]);
    hasher.update(leaf);
    hasher.finalize().into()
}

fn hash_node(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([NODE_TAG]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Side on which a proof sibling sits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sibling is on the left
    Left,
    /// Sibling is on the right
    Right,
}

/// Inclusion proof for one audit event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    /// Position of the event in the log
    pub index: u64,
    /// Event hash being proven
    pub leaf: [u8; 32],
    /// Siblings from the leaf level upwards
    pub siblings: Vec<(Direction, [u8; 32])>,
    /// Root the proof commits to
    pub root: [u8; 32],
}

impl MerkleProof {
    /// Check the proof against its own root
    pub fn verify(&self) -> bool {
        let mut current = hash_leaf(&self.leaf);
        for (direction, sibling) in &self.siblings {
            current = match direction {
                Direction::Left => hash_node(sibling, &current),
                Direction::Right => hash_node(&current, sibling),
            };
        }
        current == self.root
    }

    /// Check the proof against an externally known root
    pub fn verify_against(&self, root: &[u8; 32]) -> bool {
        &self.root == root && self.verify()
    }
}

/// Append-only Merkle tree
///
/// Every level is kept up to date on `append`, so reads never rebuild.
#[derive(Debug, Default, Clone)]
pub struct MerkleTree {
    leaves: Vec<[u8; 32]>,
    /// levels[0] = hashed leaves, last = [root]
    levels: Vec<Vec<[u8; 32]>>,
}

impl MerkleTree {
    /// Create empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Create tree from existing leaves
    pub fn from_leaves(leaves: Vec<[u8; 32]>) -> Self {
        let mut tree = Self::new();
        for leaf in leaves {
            tree.append(leaf);
        }
        tree
    }

    /// Append a new leaf, rehashing only its path to the root (O(log n))
    pub fn append(&mut self, leaf: [u8; 32]) {
        self.leaves.push(leaf);
        if self.levels.is_empty() {
            self.levels.push(Vec::new());
        }
        self.levels[0].push(hash_leaf(&leaf));

        // Only the last node of each level changes
        let mut depth = 0;
        while self.levels[depth].len() > 1 {
            let level = &self.levels[depth];
            let i = level.len() - 1;
            let parent = if i % 2 == 1 {
                hash_node(&level[i - 1], &level[i])
            } else {
                level[i]
            };

            if self.levels.len() == depth + 1 {
                self.levels.push(Vec::new());
            }
            let above = &mut self.levels[depth + 1];
            match above.get_mut(i / 2) {
                Some(slot) => *slot = parent,
                None => above.push(parent),
            }
            depth += 1;
        }
    }

    /// Number of leaves
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Check if tree is empty
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Root hash (all zeros for an empty tree)
    pub fn root(&self) -> [u8; 32] {
        self.levels
            .last()
            .and_then(|top| top.first().copied())
            .unwrap_or([0u8; 32])
    }

    /// Inclusion proof for the leaf at `index`
    pub fn proof(&self, index: u64) -> Option<MerkleProof> {
        let position = usize::try_from(index).ok()?;
        let leaf = *self.leaves.get(position)?;

        let mut siblings = Vec::new();
        let mut i = position;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = if i % 2 == 0 {
                level.get(i + 1).map(|h| (Direction::Right, *h))
            } else {
                Some((Direction::Left, level[i - 1]))
            };
            // Promoted odd node: no sibling at this level
            if let Some(sibling) = sibling {
                siblings.push(sibling);
            }
            i /= 2;
        }

        Some(MerkleProof {
            index,
            leaf,
            siblings,
            root: self.root(),
        })
    }
}
