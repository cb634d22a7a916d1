use std::collections::BTreeSet;

use anyhow::Result;
use helper_functions::{
    accessors::{
        get_block_root, get_current_epoch, get_previous_epoch, get_total_active_balance, validator,
    },
    mutators::{balance, decrease_balance},
};
use prometheus_metrics::METRICS;
use typenum::Unsigned as _;
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        containers::PendingAttestation,
        primitives::{Epoch, Gwei},
    },
    preset::Preset,
};

use crate::unphased::{
    process_effective_balance_updates, process_eth1_data_reset, process_historical_roots_update,
    process_randao_mixes_reset, process_registry_updates, process_slashings_reset,
    should_process_justification_and_finalization, weigh_justification_and_finalization,
};

pub fn process_epoch<P: Preset>(config: &Config, state: &mut BeaconState<P>) -> Result<()> {
    let _timer = METRICS
        .get()
        .map(|metrics| metrics.epoch_processing_times.start_timer());

    process_justification_and_finalization(state)?;
    process_registry_updates(config, state)?;
    process_slashings(state)?;
    process_eth1_data_reset(state);
    process_effective_balance_updates(state);
    process_slashings_reset(state);
    process_randao_mixes_reset(state);
    process_historical_roots_update(state)?;
    process_participation_record_updates(state);

    Ok(())
}

pub fn process_justification_and_finalization<P: Preset>(
    state: &mut BeaconState<P>,
) -> Result<()> {
    if !should_process_justification_and_finalization(state) {
        return Ok(());
    }

    let current_epoch_active_balance = get_total_active_balance(state);

    let previous_epoch_target_balance = unslashed_attesting_balance(
        state,
        &state.previous_epoch_attestations,
        get_previous_epoch(state),
    )?;

    let current_epoch_target_balance = unslashed_attesting_balance(
        state,
        &state.current_epoch_attestations,
        get_current_epoch(state),
    )?;

    weigh_justification_and_finalization(
        state,
        current_epoch_active_balance,
        previous_epoch_target_balance,
        current_epoch_target_balance,
    )
}

// Pending attestations are already partitioned by target epoch,
// so matching the target only requires comparing the checkpoint root.
fn unslashed_attesting_balance<P: Preset>(
    state: &BeaconState<P>,
    attestations: &[PendingAttestation<P>],
    epoch: Epoch,
) -> Result<Gwei> {
    let target_root = get_block_root(state, epoch)?;

    let mut attesting_indices = BTreeSet::new();

    for attestation in attestations {
        if attestation.data.target.root == target_root {
            attesting_indices.extend(attestation.attesting_indices.iter().copied());
        }
    }

    let mut total = 0;

    for attesting_index in attesting_indices {
        let validator = validator(state, attesting_index)?;

        if !validator.slashed {
            total += validator.effective_balance;
        }
    }

    Ok(P::EFFECTIVE_BALANCE_INCREMENT.max(total))
}

fn process_slashings<P: Preset>(state: &mut BeaconState<P>) -> Result<()> {
    let current_epoch = get_current_epoch(state);
    let total_balance = get_total_active_balance(state);
    let sum_of_slashings = state.slashings.iter().sum::<Gwei>();

    let adjusted_total_slashing_balance =
        (sum_of_slashings * P::PROPORTIONAL_SLASHING_MULTIPLIER).min(total_balance);

    let target_withdrawable_epoch = current_epoch + P::EpochsPerSlashingsVector::U64 / 2;
    let increment = P::EFFECTIVE_BALANCE_INCREMENT;

    let penalties = (0..)
        .zip(state.validators.iter())
        .filter(|(_, validator)| {
            validator.slashed && validator.withdrawable_epoch == target_withdrawable_epoch
        })
        .map(|(validator_index, validator)| {
            // > Factored out from penalty numerator to avoid uint64 overflow
            let penalty_numerator =
                validator.effective_balance / increment * adjusted_total_slashing_balance;
            let penalty = penalty_numerator / total_balance * increment;

            (validator_index, penalty)
        })
        .collect::<Vec<_>>();

    for (validator_index, penalty) in penalties {
        decrease_balance(balance(state, validator_index)?, penalty);
    }

    Ok(())
}

fn process_participation_record_updates<P: Preset>(state: &mut BeaconState<P>) {
    // > Rotate current/previous epoch attestations
    state.previous_epoch_attestations = core::mem::take(&mut state.current_epoch_attestations);
}
