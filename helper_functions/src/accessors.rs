use anyhow::Result;
use bls::PublicKeyBytes;
use typenum::Unsigned as _;
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        consts::{DOMAIN_BEACON_PROPOSER, GENESIS_EPOCH},
        containers::Validator,
        primitives::{Domain, DomainType, Epoch, Gwei, Slot, ValidatorIndex, H256},
    },
    preset::Preset,
};

use crate::{error::Error, misc, predicates};

#[must_use]
pub fn get_current_epoch<P: Preset>(state: &BeaconState<P>) -> Epoch {
    misc::compute_epoch_at_slot::<P>(state.slot)
}

#[must_use]
pub fn get_previous_epoch<P: Preset>(state: &BeaconState<P>) -> Epoch {
    get_current_epoch(state)
        .saturating_sub(1)
        .max(GENESIS_EPOCH)
}

#[must_use]
pub fn get_next_epoch<P: Preset>(state: &BeaconState<P>) -> Epoch {
    get_current_epoch(state) + 1
}

pub fn get_block_root<P: Preset>(state: &BeaconState<P>, epoch: Epoch) -> Result<H256> {
    get_block_root_at_slot(state, misc::compute_start_slot_at_epoch::<P>(epoch))
}

pub fn get_block_root_at_slot<P: Preset>(state: &BeaconState<P>, slot: Slot) -> Result<H256> {
    let slots_per_historical_root = P::SlotsPerHistoricalRoot::U64;

    if !(slot < state.slot && state.slot <= slot + slots_per_historical_root) {
        return Err(Error::SlotOutOfRange { slot }.into());
    }

    let index = usize::try_from(slot % slots_per_historical_root)
        .expect("block root index fits in usize");

    Ok(state.block_roots[index])
}

#[must_use]
pub fn get_randao_mix<P: Preset>(state: &BeaconState<P>, epoch: Epoch) -> H256 {
    let index = epoch % P::EpochsPerHistoricalVector::U64;

    *state
        .randao_mixes
        .get(usize::try_from(index).expect("randao mix index fits in usize"))
        .expect("index is less than the length of the randao mix vector")
}

pub fn get_active_validator_indices<P: Preset>(
    state: &BeaconState<P>,
    epoch: Epoch,
) -> impl Iterator<Item = ValidatorIndex> + '_ {
    (0..)
        .zip(state.validators.iter())
        .filter(move |(_, validator)| predicates::is_active_validator(validator, epoch))
        .map(|(index, _)| index)
}

pub(crate) fn get_seed<P: Preset>(
    state: &BeaconState<P>,
    epoch: Epoch,
    domain_type: DomainType,
) -> H256 {
    let mix = get_randao_mix(
        state,
        epoch + P::EpochsPerHistoricalVector::U64 - P::MIN_SEED_LOOKAHEAD - 1,
    );

    misc::hash_32_64_256(domain_type, epoch, mix)
}

pub fn get_beacon_proposer_index<P: Preset>(state: &BeaconState<P>) -> Result<ValidatorIndex> {
    get_beacon_proposer_index_at_slot(state, state.slot)
}

pub fn get_beacon_proposer_index_at_slot<P: Preset>(
    state: &BeaconState<P>,
    slot: Slot,
) -> Result<ValidatorIndex> {
    let epoch = misc::compute_epoch_at_slot::<P>(slot);
    let indices = get_active_validator_indices(state, epoch).collect::<Vec<_>>();
    let seed = misc::hash_256_64(get_seed(state, epoch, DOMAIN_BEACON_PROPOSER), slot);

    misc::compute_proposer_index(state, &indices, seed)
}

#[must_use]
pub fn get_domain<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    domain_type: DomainType,
    epoch: Option<Epoch>,
) -> Domain {
    let epoch = epoch.unwrap_or_else(|| get_current_epoch(state));
    let fork = state.fork;

    let fork_version = if epoch < fork.epoch {
        fork.previous_version
    } else {
        fork.current_version
    };

    misc::compute_domain(
        config,
        domain_type,
        Some(fork_version),
        Some(state.genesis_validators_root),
    )
}

#[must_use]
pub fn get_validator_churn_limit<P: Preset>(config: &Config, state: &BeaconState<P>) -> u64 {
    let active_validator_count = get_active_validator_indices(state, get_current_epoch(state))
        .count()
        .try_into()
        .unwrap_or(u64::MAX);

    (active_validator_count / config.churn_limit_quotient).max(config.min_per_epoch_churn_limit)
}

#[must_use]
pub fn get_total_active_balance<P: Preset>(state: &BeaconState<P>) -> Gwei {
    let epoch = get_current_epoch(state);

    let total = state
        .validators
        .iter()
        .filter(|validator| predicates::is_active_validator(validator, epoch))
        .map(|validator| validator.effective_balance)
        .sum();

    P::EFFECTIVE_BALANCE_INCREMENT.max(total)
}

pub fn get_total_balance<P: Preset>(
    state: &BeaconState<P>,
    indices: impl IntoIterator<Item = ValidatorIndex>,
) -> Result<Gwei> {
    let mut total = 0;

    for index in indices {
        total += validator(state, index)?.effective_balance;
    }

    Ok(P::EFFECTIVE_BALANCE_INCREMENT.max(total))
}

pub fn validator<P: Preset>(
    state: &BeaconState<P>,
    index: ValidatorIndex,
) -> Result<&Validator> {
    usize::try_from(index)
        .ok()
        .and_then(|index| state.validators.get(index))
        .ok_or(Error::ValidatorIndexOutOfBounds { index })
        .map_err(Into::into)
}

pub fn public_key<P: Preset>(
    state: &BeaconState<P>,
    index: ValidatorIndex,
) -> Result<PublicKeyBytes> {
    validator(state, index).map(|validator| validator.pubkey)
}

#[must_use]
pub fn index_of_public_key<P: Preset>(
    state: &BeaconState<P>,
    public_key: PublicKeyBytes,
) -> Option<ValidatorIndex> {
    (0..)
        .zip(state.validators.iter())
        .find(|(_, validator)| validator.pubkey == public_key)
        .map(|(index, _)| index)
}
