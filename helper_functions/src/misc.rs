use core::mem::size_of;
use core::num::NonZeroU64;

use anyhow::Result;
use bit_field::BitArray as _;
use ethereum_hashing::hash_fixed;
use tree_hash::TreeHash;
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        containers::{ForkData, SigningData},
        primitives::{Domain, DomainType, Epoch, Slot, ValidatorIndex, Version, H256},
    },
    preset::Preset,
};

use crate::error::Error;

const BITS_PER_HASH: u64 = H256::len_bytes() as u64 * 8;

#[must_use]
pub fn compute_epoch_at_slot<P: Preset>(slot: Slot) -> Epoch {
    slot / P::SLOTS_PER_EPOCH
}

#[must_use]
pub const fn compute_start_slot_at_epoch<P: Preset>(epoch: Epoch) -> Slot {
    epoch * P::SLOTS_PER_EPOCH
}

#[must_use]
pub fn is_epoch_start<P: Preset>(slot: Slot) -> bool {
    slots_since_epoch_start::<P>(slot) == 0
}

#[must_use]
pub fn slots_since_epoch_start<P: Preset>(slot: Slot) -> u64 {
    slot - compute_start_slot_at_epoch::<P>(compute_epoch_at_slot::<P>(slot))
}

#[must_use]
pub const fn compute_activation_exit_epoch<P: Preset>(epoch: Epoch) -> Epoch {
    epoch + 1 + P::MAX_SEED_LOOKAHEAD
}

/// Rounds `value` down to a multiple of `factor`. Balances are quantized to
/// [`Preset::EFFECTIVE_BALANCE_INCREMENT`] in several places.
#[must_use]
pub const fn prev_multiple_of(value: u64, factor: u64) -> u64 {
    value - value % factor
}

#[must_use]
pub fn compute_fork_data_root(current_version: Version, genesis_validators_root: H256) -> H256 {
    ForkData {
        current_version,
        genesis_validators_root,
    }
    .tree_hash_root()
}

#[must_use]
pub fn compute_domain(
    config: &Config,
    domain_type: DomainType,
    fork_version: Option<Version>,
    genesis_validators_root: Option<H256>,
) -> Domain {
    let fork_version = fork_version.unwrap_or(config.genesis_fork_version);
    let genesis_validators_root = genesis_validators_root.unwrap_or_else(H256::zero);
    let fork_data_root = compute_fork_data_root(fork_version, genesis_validators_root);

    let mut domain = Domain::zero();
    domain[..domain_type.len()].copy_from_slice(&domain_type);
    domain[domain_type.len()..].copy_from_slice(&fork_data_root[..28]);
    domain
}

#[must_use]
pub fn compute_signing_root(object: &(impl TreeHash + ?Sized), domain: Domain) -> H256 {
    SigningData {
        object_root: object.tree_hash_root(),
        domain,
    }
    .tree_hash_root()
}

/// The swap-or-not network applied to a single index.
///
/// <https://github.com/ethereum/consensus-specs/blob/v1.3.0/specs/phase0/beacon-chain.md#compute_shuffled_index>
#[must_use]
pub(crate) fn compute_shuffled_index<P: Preset>(
    mut index: u64,
    index_count: NonZeroU64,
    seed: H256,
) -> u64 {
    assert!(index < index_count.get());

    for round in 0..P::SHUFFLE_ROUND_COUNT {
        let pivot = compute_pivot(seed, round, index_count);
        let flip = (pivot + index_count.get() - index) % index_count;
        let position = index.max(flip);
        let source = compute_source(seed, round, position / BITS_PER_HASH);
        let bit_index = position.to_le_bytes()[0].into();
        let bit = source.as_bytes().get_bit(bit_index);

        if bit {
            index = flip;
        }
    }

    index
}

pub(crate) fn compute_proposer_index<P: Preset>(
    state: &BeaconState<P>,
    indices: &[ValidatorIndex],
    seed: H256,
) -> Result<ValidatorIndex> {
    let total = u64::try_from(indices.len())
        .ok()
        .and_then(NonZeroU64::new)
        .ok_or(Error::NoActiveValidators)?;

    let max_random_byte = u64::from(u8::MAX);

    (0..u64::MAX / H256::len_bytes() as u64)
        .flat_map(|quotient| {
            hash_256_64(seed, quotient)
                .to_fixed_bytes()
                .into_iter()
                .map(u64::from)
        })
        .zip(0..)
        .find_map(|(random_byte, attempt)| {
            let shuffled_index_of_index =
                usize::try_from(compute_shuffled_index::<P>(attempt % total, total, seed)).expect(
                    "shuffled_index_of_index fits in usize because it is less than indices.len()",
                );

            let candidate_index = *indices
                .get(shuffled_index_of_index)
                .expect("compute_shuffled_index returns a value less than indices.len()");

            let effective_balance = state
                .validators
                .get(usize::try_from(candidate_index).expect("validator indices fit in usize"))
                .expect("candidate_index was produced by enumerating active validators")
                .effective_balance;

            (effective_balance * max_random_byte >= P::MAX_EFFECTIVE_BALANCE * random_byte)
                .then_some(candidate_index)
        })
        .ok_or(Error::FailedToSelectProposer)
        .map_err(Into::into)
}

fn compute_pivot(seed: H256, round: u8, index_count: NonZeroU64) -> u64 {
    let digest = hash_256_8(seed, round);

    digest
        .as_bytes()
        .get(..size_of::<u64>())
        .and_then(|slice| slice.try_into().ok())
        .map(u64::from_le_bytes)
        .expect("digest is longer than u64")
        % index_count
}

fn compute_source(seed: H256, round: u8, position_window: u64) -> H256 {
    // Truncate to match the behavior of `compute_shuffled_index` in `consensus-specs`.
    #[allow(clippy::cast_possible_truncation)]
    let position_window = position_window as u32;

    let mut input = [0; H256::len_bytes() + 5];
    input[..32].copy_from_slice(seed.as_bytes());
    input[32] = round;
    input[33..].copy_from_slice(&position_window.to_le_bytes());
    H256(hash_fixed(&input))
}

fn hash_256_8(a: H256, b: u8) -> H256 {
    let mut input = [0; H256::len_bytes() + 1];
    input[..32].copy_from_slice(a.as_bytes());
    input[32] = b;
    H256(hash_fixed(&input))
}

pub(crate) fn hash_256_64(a: H256, b: u64) -> H256 {
    let mut input = [0; H256::len_bytes() + size_of::<u64>()];
    input[..32].copy_from_slice(a.as_bytes());
    input[32..].copy_from_slice(&b.to_le_bytes());
    H256(hash_fixed(&input))
}

pub(crate) fn hash_32_64_256(a: DomainType, b: u64, c: H256) -> H256 {
    let mut input = [0; 44];
    input[..4].copy_from_slice(&a);
    input[4..12].copy_from_slice(&b.to_le_bytes());
    input[12..].copy_from_slice(c.as_bytes());
    H256(hash_fixed(&input))
}
