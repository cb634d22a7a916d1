use hex_literal::hex;
use ssz_types::FixedVector;
use typenum::{U32, U33, U4};

use crate::phase0::primitives::{DomainType, Epoch, Slot, H256};

pub const BLS_WITHDRAWAL_PREFIX: &[u8] = &hex!("00");
pub const DOMAIN_BEACON_ATTESTER: DomainType = hex!("01000000");
pub const DOMAIN_BEACON_PROPOSER: DomainType = hex!("00000000");
pub const DOMAIN_DEPOSIT: DomainType = hex!("03000000");
pub const DOMAIN_RANDAO: DomainType = hex!("02000000");
pub const DOMAIN_VOLUNTARY_EXIT: DomainType = hex!("04000000");
pub const FAR_FUTURE_EPOCH: Epoch = Epoch::MAX;
pub const GENESIS_EPOCH: Epoch = 0;
pub const GENESIS_SLOT: Slot = 0;

pub type DepositContractTreeDepth = U32;
pub type JustificationBitsLength = U4;

// One longer than the tree depth to account for the deposit count mixed in at the top.
pub type DepositProof = FixedVector<H256, U33>;
