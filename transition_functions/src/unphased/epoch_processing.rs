use anyhow::Result;
use helper_functions::{
    accessors::{
        get_block_root, get_current_epoch, get_next_epoch, get_randao_mix,
        get_validator_churn_limit,
    },
    misc::{compute_activation_exit_epoch, prev_multiple_of},
    mutators::initiate_validator_exit,
    predicates::{is_active_validator, is_eligible_for_activation, is_eligible_for_activation_queue},
};
use itertools::Itertools as _;
use ssz_types::{BitVector, VariableList};
use tree_hash::TreeHash as _;
use typenum::Unsigned;
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        consts::{JustificationBitsLength, GENESIS_EPOCH},
        containers::{Checkpoint, HistoricalBatch, Validator},
        primitives::{Epoch, Gwei, ValidatorIndex},
    },
    preset::Preset,
};

use crate::unphased::Error;

pub fn process_registry_updates<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
) -> Result<()> {
    let current_epoch = get_current_epoch(state);
    let next_epoch = get_next_epoch(state);

    // The indices collected in these do not overlap.
    // See <https://github.com/protolambda/eth2-docs/tree/de65f38857f1e27ffb6f25107d61e795cf1a5ad7#registry-updates>
    let mut eligible_for_activation_queue = vec![];
    let mut ejections = vec![];
    let mut activation_queue = vec![];

    for (validator_index, validator) in (0..).zip(state.validators.iter()) {
        if is_eligible_for_activation_queue::<P>(validator) {
            eligible_for_activation_queue.push(validator_index);
        }

        if is_active_validator(validator, current_epoch)
            && validator.effective_balance <= config.ejection_balance
        {
            ejections.push(validator_index);
        }

        if is_eligible_for_activation(state, validator) {
            activation_queue.push((validator_index, validator.activation_eligibility_epoch));
        }
    }

    // > Process activation eligibility and ejections
    for validator_index in eligible_for_activation_queue {
        validator_mut(state, validator_index).activation_eligibility_epoch = next_epoch;
    }

    for validator_index in ejections {
        initiate_validator_exit(config, state, validator_index)?;
    }

    // > Queue validators eligible for activation and not yet dequeued for activation
    let activation_queue = activation_queue
        .into_iter()
        .enumerate()
        .sorted_unstable_by_key(|&(position_in_queue, (_, activation_eligibility_epoch))| {
            // > Order by the sequence of activation_eligibility_epoch setting and then index
            (activation_eligibility_epoch, position_in_queue)
        })
        .map(|(_, (validator_index, _))| validator_index);

    // > Dequeued validators for activation up to churn limit
    let churn_limit = usize::try_from(get_validator_churn_limit(config, state))?;
    let activation_exit_epoch = compute_activation_exit_epoch::<P>(current_epoch);

    for validator_index in activation_queue.take(churn_limit) {
        validator_mut(state, validator_index).activation_epoch = activation_exit_epoch;
    }

    Ok(())
}

pub fn process_eth1_data_reset<P: Preset>(state: &mut BeaconState<P>) {
    let next_epoch = get_next_epoch(state);

    // > Reset eth1 data votes
    if next_epoch % P::EPOCHS_PER_ETH1_VOTING_PERIOD == 0 {
        state.eth1_data_votes = VariableList::default();
    }
}

pub fn process_effective_balance_updates<P: Preset>(state: &mut BeaconState<P>) {
    let hysteresis_increment = P::EFFECTIVE_BALANCE_INCREMENT / P::HYSTERESIS_QUOTIENT;
    let downward_threshold = hysteresis_increment * P::HYSTERESIS_DOWNWARD_MULTIPLIER;
    let upward_threshold = hysteresis_increment * P::HYSTERESIS_UPWARD_MULTIPLIER;

    // > Update effective balances with hysteresis
    for index in 0..state.validators.len() {
        let balance = state.balances[index];
        let validator = &mut state.validators[index];

        let below = balance + downward_threshold < validator.effective_balance;
        let above = validator.effective_balance + upward_threshold < balance;

        if below || above {
            validator.effective_balance = prev_multiple_of(balance, P::EFFECTIVE_BALANCE_INCREMENT)
                .min(P::MAX_EFFECTIVE_BALANCE);
        }
    }
}

pub fn process_slashings_reset<P: Preset>(state: &mut BeaconState<P>) {
    let next_epoch = get_next_epoch(state);

    // > Reset slashings
    let index = mod_index::<P::EpochsPerSlashingsVector>(next_epoch);
    state.slashings[index] = 0;
}

pub fn process_randao_mixes_reset<P: Preset>(state: &mut BeaconState<P>) {
    let current_epoch = get_current_epoch(state);
    let next_epoch = get_next_epoch(state);

    // > Set randao mix
    let index = mod_index::<P::EpochsPerHistoricalVector>(next_epoch);
    state.randao_mixes[index] = get_randao_mix(state, current_epoch);
}

pub fn process_historical_roots_update<P: Preset>(state: &mut BeaconState<P>) -> Result<()> {
    let next_epoch = get_next_epoch(state);
    let epochs_per_historical_root = P::SlotsPerHistoricalRoot::U64 / P::SLOTS_PER_EPOCH;

    // > Set historical root accumulator
    if next_epoch % epochs_per_historical_root == 0 {
        let historical_batch = HistoricalBatch::<P> {
            block_roots: state.block_roots.clone(),
            state_roots: state.state_roots.clone(),
        };

        state
            .historical_roots
            .push(historical_batch.tree_hash_root())
            .map_err(Error::ListFull)?;
    }

    Ok(())
}

pub fn weigh_justification_and_finalization<P: Preset>(
    state: &mut BeaconState<P>,
    current_epoch_active_balance: Gwei,
    previous_epoch_target_balance: Gwei,
    current_epoch_target_balance: Gwei,
) -> Result<()> {
    let current_epoch = get_current_epoch(state);
    let previous_epoch = current_epoch - 1;

    let old_previous_justified_checkpoint = state.previous_justified_checkpoint;
    let old_current_justified_checkpoint = state.current_justified_checkpoint;

    // > Process justifications
    state.previous_justified_checkpoint = state.current_justified_checkpoint;
    shift_justification_bits(&mut state.justification_bits);

    for (epoch, bit, target_balance) in [
        (previous_epoch, 1, previous_epoch_target_balance),
        (current_epoch, 0, current_epoch_target_balance),
    ] {
        if target_balance * 3 >= current_epoch_active_balance * 2 {
            let root = get_block_root(state, epoch)?;

            state.current_justified_checkpoint = Checkpoint { epoch, root };

            state
                .justification_bits
                .set(bit, true)
                .expect("justification bit index is in bounds");
        }
    }

    // > Process finalizations
    let bits = &state.justification_bits;

    // > The 2nd/3rd/4th most recent epochs are justified, the 2nd using the 4th as source
    if all_bits_set(bits, 1, 4) && old_previous_justified_checkpoint.epoch + 3 == current_epoch {
        state.finalized_checkpoint = old_previous_justified_checkpoint;
    }

    // > The 2nd/3rd most recent epochs are justified, the 2nd using the 3rd as source
    if all_bits_set(bits, 1, 3) && old_previous_justified_checkpoint.epoch + 2 == current_epoch {
        state.finalized_checkpoint = old_previous_justified_checkpoint;
    }

    // > The 1st/2nd/3rd most recent epochs are justified, the 1st using the 3rd as source
    if all_bits_set(bits, 0, 3) && old_current_justified_checkpoint.epoch + 2 == current_epoch {
        state.finalized_checkpoint = old_current_justified_checkpoint;
    }

    // > The 1st/2nd most recent epochs are justified, the 1st using the 2nd as source
    if all_bits_set(bits, 0, 2) && old_current_justified_checkpoint.epoch + 1 == current_epoch {
        state.finalized_checkpoint = old_current_justified_checkpoint;
    }

    Ok(())
}

pub fn should_process_justification_and_finalization<P: Preset>(state: &BeaconState<P>) -> bool {
    // > Initial FFG checkpoint values have a `0x00` stub for `root`.
    // > Skip FFG updates in the first two epochs to avoid
    // > corner cases that might result in modifying this stub.
    GENESIS_EPOCH + 1 < get_current_epoch(state)
}

fn shift_justification_bits(bits: &mut BitVector<JustificationBitsLength>) {
    for index in (1..JustificationBitsLength::USIZE).rev() {
        let lower = bits
            .get(index - 1)
            .expect("justification bit index is in bounds");

        bits.set(index, lower)
            .expect("justification bit index is in bounds");
    }

    bits.set(0, false)
        .expect("justification bit index is in bounds");
}

fn all_bits_set(bits: &BitVector<JustificationBitsLength>, start: usize, end: usize) -> bool {
    (start..end).all(|index| bits.get(index).unwrap_or(false))
}

fn validator_mut<P: Preset>(
    state: &mut BeaconState<P>,
    validator_index: ValidatorIndex,
) -> &mut Validator {
    let index = usize::try_from(validator_index)
        .expect("validator index was produced by enumerating the registry");

    &mut state.validators[index]
}

fn mod_index<N: Unsigned>(epoch: Epoch) -> usize {
    usize::try_from(epoch % N::U64).expect("ring index fits in usize")
}

#[cfg(test)]
mod tests {
    use types::preset::Minimal;

    use super::*;

    #[test]
    fn shift_justification_bits_moves_bits_towards_older_epochs() {
        let mut bits = BitVector::<JustificationBitsLength>::new();

        bits.set(0, true).expect("bit index is in bounds");
        bits.set(3, true).expect("bit index is in bounds");

        shift_justification_bits(&mut bits);

        assert!(!bits.get(0).expect("bit index is in bounds"));
        assert!(bits.get(1).expect("bit index is in bounds"));
        assert!(!bits.get(2).expect("bit index is in bounds"));
        assert!(!bits.get(3).expect("bit index is in bounds"));
    }

    #[test]
    fn eth1_data_votes_are_reset_at_the_end_of_a_voting_period() {
        let mut state = BeaconState::<Minimal>::default();

        state
            .eth1_data_votes
            .push(types::phase0::containers::Eth1Data::default())
            .expect("the vote list is empty");

        // `EPOCHS_PER_ETH1_VOTING_PERIOD` is 4 in the minimal preset.
        state.slot = 2 * Minimal::SLOTS_PER_EPOCH;
        process_eth1_data_reset(&mut state);
        assert_eq!(state.eth1_data_votes.len(), 1);

        state.slot = 3 * Minimal::SLOTS_PER_EPOCH;
        process_eth1_data_reset(&mut state);
        assert!(state.eth1_data_votes.is_empty());
    }
}
