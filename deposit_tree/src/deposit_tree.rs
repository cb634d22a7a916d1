use anyhow::{ensure, Result};
use thiserror::Error;
use tree_hash::TreeHash as _;
use types::phase0::{
    containers::DepositData,
    primitives::{DepositIndex, H256},
};

use crate::merkle_tree::{hash_nodes, MerkleTree, MAX_TREE_DEPTH};

const MAX_DEPOSITS: DepositIndex = 1 << MAX_TREE_DEPTH;

/// Incremental Merkle tree over deposit data roots.
///
/// Mirrors the tree maintained by the deposit contract. The root has the
/// deposit count mixed in, matching `hash_tree_root` of an SSZ list.
#[derive(Clone, Debug, Default)]
pub struct DepositTree {
    pub tree: MerkleTree,
    pub deposit_count: DepositIndex,
}

impl DepositTree {
    #[must_use]
    pub fn create(leaves: &[H256]) -> Self {
        Self {
            tree: MerkleTree::create(leaves, MAX_TREE_DEPTH),
            deposit_count: leaves.len() as DepositIndex,
        }
    }

    /// Returns the root hash of the tree with the deposit count mixed in.
    #[must_use]
    pub fn root(&self) -> H256 {
        hash_nodes(self.tree.hash(), length_chunk(self.deposit_count))
    }

    pub fn push_and_compute_root(
        &mut self,
        index: DepositIndex,
        data: DepositData,
    ) -> Result<H256> {
        self.validate_index(index)?;
        self.tree.push_leaf(data.tree_hash_root(), MAX_TREE_DEPTH)?;
        self.deposit_count += 1;
        Ok(self.root())
    }

    /// Returns the leaf at `index` and a Merkle proof of its inclusion.
    ///
    /// The proof is in bottom-up order and one element longer than the tree
    /// depth. The final element is the deposit count chunk, making the proof
    /// verifiable against [`DepositTree::root`].
    pub fn generate_proof(&self, index: DepositIndex) -> Result<(H256, Vec<H256>)> {
        let (leaf, mut proof) = self.tree.generate_proof(index, MAX_TREE_DEPTH)?;
        proof.push(length_chunk(self.deposit_count));
        Ok((leaf, proof))
    }

    /// Returns the deposit data roots pushed so far, in deposit order.
    #[must_use]
    pub fn leaves(&self) -> Vec<H256> {
        let mut leaves = vec![];
        self.tree.append_leaves(&mut leaves);
        leaves
    }

    fn validate_index(&self, index: DepositIndex) -> Result<()> {
        ensure!(index < MAX_DEPOSITS, Error::Full { index });

        let expected = self.deposit_count;
        let actual = index;

        ensure!(
            actual == expected,
            Error::UnexpectedIndex { expected, actual },
        );

        Ok(())
    }
}

fn length_chunk(length: DepositIndex) -> H256 {
    let mut chunk = [0; 32];
    chunk[..8].copy_from_slice(&length.to_le_bytes());
    H256(chunk)
}

#[derive(Debug, Error)]
enum Error {
    #[error("attempted to add deposit with index {index} to full deposit tree")]
    Full { index: DepositIndex },
    #[error("expected deposit with index {expected}, received deposit with index {actual}")]
    UnexpectedIndex {
        expected: DepositIndex,
        actual: DepositIndex,
    },
}

#[cfg(test)]
mod tests {
    use bls::{PublicKeyBytes, SignatureBytes};
    use helper_functions::predicates::is_valid_merkle_branch;
    use hex_literal::hex;

    use crate::merkle_tree::zero_hash;

    use super::*;

    #[test]
    fn empty_tree_root_matches_known_value() {
        assert_eq!(
            DepositTree::default().root(),
            H256(hex!(
                "d70a234731285c6804c2a4f56711ddb8c82c99740f207854891028af34e27e5e"
            )),
        );
    }

    #[test]
    fn incremental_root_matches_naive_padded_merkle_root() -> Result<()> {
        let mut tree = DepositTree::default();
        let mut leaves = vec![];

        for index in 0..5 {
            let data = deposit_data(index);
            let root = tree.push_and_compute_root(index, data)?;

            leaves.push(data.tree_hash_root());

            let expected = hash_nodes(padded_root(&leaves), length_chunk(index + 1));
            assert_eq!(root, expected);
        }

        Ok(())
    }

    #[test]
    fn generated_proofs_validate_against_the_mixed_in_root() -> Result<()> {
        let mut tree = DepositTree::default();

        for index in 0..5 {
            tree.push_and_compute_root(index, deposit_data(index))?;
        }

        for index in 0..5 {
            let (leaf, proof) = tree.generate_proof(index)?;

            assert_eq!(leaf, deposit_data(index).tree_hash_root());
            assert_eq!(proof.len(), MAX_TREE_DEPTH + 1);
            assert!(is_valid_merkle_branch(leaf, proof, index, tree.root()));
        }

        Ok(())
    }

    #[test]
    fn push_and_compute_root_rejects_out_of_order_deposits() -> Result<()> {
        let mut tree = DepositTree::default();

        tree.push_and_compute_root(0, deposit_data(0))?;

        tree.push_and_compute_root(2, deposit_data(2))
            .expect_err("deposit index 1 was skipped");

        Ok(())
    }

    #[test]
    fn leaves_come_back_in_deposit_order() -> Result<()> {
        let mut tree = DepositTree::default();
        let mut expected = vec![];

        for index in 0..5 {
            let data = deposit_data(index);
            tree.push_and_compute_root(index, data)?;
            expected.push(data.tree_hash_root());
        }

        assert_eq!(tree.leaves(), expected);
        assert_eq!(DepositTree::create(&expected).root(), tree.root());

        Ok(())
    }

    fn deposit_data(index: DepositIndex) -> DepositData {
        DepositData {
            pubkey: PublicKeyBytes::default(),
            withdrawal_credentials: H256::repeat_byte(index as u8 + 1),
            amount: 32_000_000_000,
            signature: SignatureBytes::empty(),
        }
    }

    fn padded_root(leaves: &[H256]) -> H256 {
        let mut level = leaves.to_vec();

        if level.is_empty() {
            level.push(zero_hash(0));
        }

        for depth in 0..MAX_TREE_DEPTH {
            if level.len() % 2 == 1 {
                level.push(zero_hash(depth));
            }

            level = level
                .chunks(2)
                .map(|pair| hash_nodes(pair[0], pair[1]))
                .collect();
        }

        level[0]
    }
}
