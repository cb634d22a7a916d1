use anyhow::{ensure, Result};
use bls::PublicKey;
use ethereum_hashing::hash32_concat;
use itertools::Itertools as _;
use rayon::iter::{IntoParallelIterator as _, ParallelIterator as _};
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        consts::FAR_FUTURE_EPOCH,
        containers::{Attestation, AttestationData, Validator},
        primitives::{Epoch, H256},
    },
    preset::Preset,
};

use crate::{
    accessors,
    error::{Error, SignatureKind},
    signing::SignForSingleFork as _,
    verifier::Verifier,
};

#[must_use]
pub const fn is_active_validator(validator: &Validator, epoch: Epoch) -> bool {
    validator.activation_epoch <= epoch && epoch < validator.exit_epoch
}

#[must_use]
pub const fn is_eligible_for_activation_queue<P: Preset>(validator: &Validator) -> bool {
    validator.activation_eligibility_epoch == FAR_FUTURE_EPOCH
        && validator.effective_balance == P::MAX_EFFECTIVE_BALANCE
}

#[must_use]
pub fn is_eligible_for_activation<P: Preset>(
    state: &BeaconState<P>,
    validator: &Validator,
) -> bool {
    // > Placement in queue is finalized
    validator.activation_eligibility_epoch <= state.finalized_checkpoint.epoch
        // > Has not yet been activated
        && validator.activation_epoch == FAR_FUTURE_EPOCH
}

#[must_use]
pub const fn is_slashable_validator(validator: &Validator, epoch: Epoch) -> bool {
    !validator.slashed
        && validator.activation_epoch <= epoch
        && epoch < validator.withdrawable_epoch
}

#[must_use]
pub fn is_slashable_attestation_data(data_1: AttestationData, data_2: AttestationData) -> bool {
    // > Double vote
    (data_1 != data_2 && data_1.target.epoch == data_2.target.epoch)
        // > Surround vote
        || (data_1.source.epoch < data_2.source.epoch && data_2.target.epoch < data_1.target.epoch)
}

#[must_use]
pub fn is_valid_merkle_branch(
    leaf: H256,
    branch: impl IntoIterator<Item = H256>,
    index: u64,
    root: H256,
) -> bool {
    let mut hash = leaf;

    for (height, node) in branch.into_iter().enumerate() {
        hash = if index >> height & 1 == 1 {
            H256(hash32_concat(node.as_bytes(), hash.as_bytes()))
        } else {
            H256(hash32_concat(hash.as_bytes(), node.as_bytes()))
        };
    }

    hash == root
}

/// <https://github.com/ethereum/consensus-specs/blob/v1.3.0/specs/phase0/beacon-chain.md#is_valid_indexed_attestation>
pub fn validate_indexed_attestation<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    attestation: &Attestation<P>,
    verifier: impl Verifier,
) -> Result<()> {
    let attesting_indices = &attestation.attesting_indices;

    // > Verify indices are sorted and unique
    ensure!(
        attesting_indices.iter().tuple_windows().all(|(a, b)| a < b),
        Error::AttestingIndicesNotSortedAndUnique,
    );

    // > Verify aggregate signature
    verify_indexed_attestation_signature(config, state, attestation, verifier)
}

fn verify_indexed_attestation_signature<P: Preset, V: Verifier>(
    config: &Config,
    state: &BeaconState<P>,
    attestation: &Attestation<P>,
    mut verifier: V,
) -> Result<()> {
    if V::IS_NULL {
        return Ok(());
    }

    ensure!(
        !attestation.attesting_indices.is_empty(),
        Error::AttestationHasNoAttestingIndices,
    );

    let public_keys = attestation
        .attesting_indices
        .iter()
        .map(|index| accessors::public_key(state, *index))
        .collect::<Result<Vec<_>>>()?
        .into_par_iter()
        .map(PublicKey::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    verifier.verify_aggregate(
        attestation.data.signing_root(config, state),
        attestation.signature,
        public_keys,
        SignatureKind::Attestation,
    )
}
