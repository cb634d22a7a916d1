use ethereum_hashing::{hash32_concat, ZERO_HASHES};
use once_cell::sync::Lazy;
use thiserror::Error;
use typenum::Unsigned as _;
use types::phase0::{consts::DepositContractTreeDepth, primitives::H256};

pub const MAX_TREE_DEPTH: usize = DepositContractTreeDepth::USIZE;

const EMPTY_SLICE: &[H256] = &[];

static ZERO_NODES: Lazy<Vec<MerkleTree>> =
    Lazy::new(|| (0..=MAX_TREE_DEPTH).map(MerkleTree::Zero).collect());

/// Right-sparse Merkle tree.
///
/// Efficiently represents a Merkle tree of fixed depth where only the first N
/// indices are populated by non-zero leaves, which is exactly the shape of the
/// deposit contract tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MerkleTree {
    Zero(usize),
    Leaf(H256),
    Node(H256, Box<Self>, Box<Self>),
}

impl Default for MerkleTree {
    fn default() -> Self {
        Self::Zero(MAX_TREE_DEPTH)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error("attempted to push a leaf into a leaf node")]
    LeafReached,
    #[error("tree has no space left for another leaf")]
    Full,
    #[error("depth too small for another leaf")]
    DepthTooSmall,
    #[error("index points outside the populated part of the tree")]
    IndexOutOfBounds,
}

impl MerkleTree {
    #[must_use]
    pub fn create(leaves: &[H256], depth: usize) -> Self {
        use MerkleTree::{Leaf, Node, Zero};

        if leaves.is_empty() {
            return Zero(depth);
        }

        match depth {
            0 => {
                debug_assert_eq!(leaves.len(), 1);
                Leaf(leaves[0])
            }
            _ => {
                let subtree_capacity = 2_usize.pow(depth as u32 - 1);

                let (left_leaves, right_leaves) = if leaves.len() <= subtree_capacity {
                    (leaves, EMPTY_SLICE)
                } else {
                    leaves.split_at(subtree_capacity)
                };

                let left_subtree = Self::create(left_leaves, depth - 1);
                let right_subtree = Self::create(right_leaves, depth - 1);
                let hash = hash_nodes(left_subtree.hash(), right_subtree.hash());

                Node(hash, Box::new(left_subtree), Box::new(right_subtree))
            }
        }
    }

    pub fn push_leaf(&mut self, leaf: H256, depth: usize) -> Result<(), Error> {
        use MerkleTree::{Leaf, Node, Zero};

        if depth == 0 {
            return Err(Error::DepthTooSmall);
        }

        match self {
            Leaf(_) => return Err(Error::LeafReached),
            Zero(_) => *self = Self::create(&[leaf], depth),
            Node(ref mut hash, ref mut left, ref mut right) => {
                let left: &mut Self = left;
                let right: &mut Self = right;

                match (&*left, &*right) {
                    (Leaf(_), Leaf(_)) => return Err(Error::Full),
                    (Node(..), Node(..)) => right.push_leaf(leaf, depth - 1)?,
                    (Zero(_), Zero(_)) => *left = Self::create(&[leaf], depth - 1),
                    (Leaf(_), Zero(_)) => *right = Self::create(&[leaf], depth - 1),
                    // The left subtree may still have space. If it turns out to be
                    // full, start filling the right one.
                    (Node(..), Zero(_)) => match left.push_leaf(leaf, depth - 1) {
                        Ok(()) => {}
                        Err(Error::Full) => *right = Self::create(&[leaf], depth - 1),
                        Err(error) => return Err(error),
                    },
                    _ => return Err(Error::Full),
                }

                *hash = hash_nodes(left.hash(), right.hash());
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn hash(&self) -> H256 {
        match *self {
            Self::Zero(depth) => zero_hash(depth),
            Self::Leaf(hash) | Self::Node(hash, _, _) => hash,
        }
    }

    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// Returns the leaf at `index` and a Merkle proof of its inclusion.
    ///
    /// The proof is in bottom-up order, starting with the leaf's sibling.
    /// Its length is exactly `depth`.
    pub fn generate_proof(&self, index: u64, depth: usize) -> Result<(H256, Vec<H256>), Error> {
        let mut proof = vec![];
        let mut current_node = self;
        let mut current_depth = depth;

        while current_depth > 0 {
            let ith_bit = index >> (current_depth - 1) & 1;

            let (left, right) = current_node
                .left_and_right_branches()
                .ok_or(Error::IndexOutOfBounds)?;

            if ith_bit == 1 {
                proof.push(left.hash());
                current_node = right;
            } else {
                proof.push(right.hash());
                current_node = left;
            }

            current_depth -= 1;
        }

        if !current_node.is_leaf() {
            return Err(Error::IndexOutOfBounds);
        }

        proof.reverse();

        Ok((current_node.hash(), proof))
    }

    /// Appends the populated leaves to `leaves` in insertion order.
    pub fn append_leaves(&self, leaves: &mut Vec<H256>) {
        match self {
            Self::Zero(_) => {}
            Self::Leaf(hash) => leaves.push(*hash),
            Self::Node(_, left, right) => {
                left.append_leaves(leaves);
                right.append_leaves(leaves);
            }
        }
    }

    fn left_and_right_branches(&self) -> Option<(&Self, &Self)> {
        match *self {
            Self::Leaf(_) | Self::Zero(0) => None,
            Self::Node(_, ref left, ref right) => Some((left, right)),
            Self::Zero(depth) => Some((&ZERO_NODES[depth - 1], &ZERO_NODES[depth - 1])),
        }
    }
}

pub fn hash_nodes(left: H256, right: H256) -> H256 {
    H256(hash32_concat(left.as_bytes(), right.as_bytes()))
}

pub fn zero_hash(depth: usize) -> H256 {
    H256::from_slice(&ZERO_HASHES[depth])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tree_hashes_to_zero_hash_of_its_depth() {
        let tree = MerkleTree::create(&[], 5);
        assert_eq!(tree.hash(), zero_hash(5));
    }

    #[test]
    fn incremental_pushes_match_batch_construction() -> Result<(), Error> {
        let leaves = (1..=6).map(H256::repeat_byte).collect::<Vec<_>>();
        let depth = 3;

        let mut incremental = MerkleTree::Zero(depth);

        for (index, leaf) in leaves.iter().copied().enumerate() {
            incremental.push_leaf(leaf, depth)?;

            let batch = MerkleTree::create(&leaves[..=index], depth);
            assert_eq!(incremental.hash(), batch.hash());
        }

        Ok(())
    }

    #[test]
    fn push_leaf_fails_when_the_tree_is_full() -> Result<(), Error> {
        let depth = 2;
        let mut tree = MerkleTree::Zero(depth);

        for byte in 1..=4 {
            tree.push_leaf(H256::repeat_byte(byte), depth)?;
        }

        assert_eq!(tree.push_leaf(H256::repeat_byte(5), depth), Err(Error::Full));

        Ok(())
    }

    #[test]
    fn generated_proofs_hash_up_to_the_root() -> Result<(), Error> {
        let leaves = (1..=5).map(H256::repeat_byte).collect::<Vec<_>>();
        let depth = 4;
        let tree = MerkleTree::create(&leaves, depth);

        for (index, expected_leaf) in leaves.iter().copied().enumerate() {
            let (leaf, proof) = tree.generate_proof(index as u64, depth)?;

            assert_eq!(leaf, expected_leaf);
            assert_eq!(proof.len(), depth);

            let mut hash = leaf;

            for (height, node) in proof.into_iter().enumerate() {
                hash = if index >> height & 1 == 1 {
                    hash_nodes(node, hash)
                } else {
                    hash_nodes(hash, node)
                };
            }

            assert_eq!(hash, tree.hash());
        }

        Ok(())
    }

    #[test]
    fn append_leaves_returns_leaves_in_insertion_order() {
        let leaves = (1..=5).map(H256::repeat_byte).collect::<Vec<_>>();
        let tree = MerkleTree::create(&leaves, 4);

        let mut collected = vec![];
        tree.append_leaves(&mut collected);

        assert_eq!(collected, leaves);
    }
}
