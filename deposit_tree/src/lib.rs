pub use crate::{
    deposit_tree::DepositTree,
    merkle_tree::{Error as MerkleTreeError, MerkleTree},
};

mod deposit_tree;
mod merkle_tree;
