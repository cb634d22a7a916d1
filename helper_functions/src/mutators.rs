use core::cmp::Ordering;

use anyhow::Result;
use typenum::Unsigned as _;
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        consts::FAR_FUTURE_EPOCH,
        containers::Validator,
        primitives::{Gwei, ValidatorIndex},
    },
    preset::Preset,
};

use crate::{
    accessors::{self, get_beacon_proposer_index, get_current_epoch, get_validator_churn_limit},
    error::Error,
    misc::compute_activation_exit_epoch,
};

pub fn balance<P: Preset>(
    state: &mut BeaconState<P>,
    validator_index: ValidatorIndex,
) -> Result<&mut Gwei> {
    usize::try_from(validator_index)
        .ok()
        .and_then(|index| state.balances.get_mut(index))
        .ok_or(Error::ValidatorIndexOutOfBounds {
            index: validator_index,
        })
        .map_err(Into::into)
}

#[inline]
pub fn increase_balance(balance: &mut Gwei, delta: Gwei) {
    *balance += delta;
}

#[inline]
pub fn decrease_balance(balance: &mut Gwei, delta: Gwei) {
    *balance = balance.saturating_sub(delta);
}

pub fn initiate_validator_exit<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    validator_index: ValidatorIndex,
) -> Result<()> {
    // > Return if validator already initiated exit
    if accessors::validator(state, validator_index)?.exit_epoch != FAR_FUTURE_EPOCH {
        return Ok(());
    }

    // > Compute exit queue epoch
    let mut exit_queue_epoch = compute_activation_exit_epoch::<P>(get_current_epoch(state));
    let mut exit_queue_churn = 0;

    for validator in &state.validators {
        let exit_epoch = validator.exit_epoch;

        if exit_epoch == FAR_FUTURE_EPOCH {
            continue;
        }

        match exit_epoch.cmp(&exit_queue_epoch) {
            Ordering::Less => {}
            Ordering::Equal => exit_queue_churn += 1,
            Ordering::Greater => {
                exit_queue_epoch = exit_epoch;
                exit_queue_churn = 1;
            }
        }
    }

    if exit_queue_churn >= get_validator_churn_limit(config, state) {
        exit_queue_epoch += 1;
    }

    // > Set validator exit epoch and withdrawable epoch
    let validator = validator_mut(state, validator_index)?;

    validator.exit_epoch = exit_queue_epoch;

    validator.withdrawable_epoch = exit_queue_epoch
        .checked_add(P::MIN_VALIDATOR_WITHDRAWABILITY_DELAY)
        .ok_or(Error::EpochOverflow)?;

    Ok(())
}

pub fn slash_validator<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    slashed_index: ValidatorIndex,
    whistleblower_index: Option<ValidatorIndex>,
) -> Result<()> {
    initiate_validator_exit(config, state, slashed_index)?;

    let epoch = get_current_epoch(state);
    let epochs_per_slashings_vector = P::EpochsPerSlashingsVector::U64;

    let validator = validator_mut(state, slashed_index)?;

    validator.slashed = true;

    validator.withdrawable_epoch = validator
        .withdrawable_epoch
        .max(epoch + epochs_per_slashings_vector);

    let effective_balance = validator.effective_balance;

    let slashings_index = usize::try_from(epoch % epochs_per_slashings_vector)
        .expect("slashings index fits in usize");

    if let Some(slashing) = state.slashings.get_mut(slashings_index) {
        *slashing += effective_balance;
    }

    decrease_balance(
        balance(state, slashed_index)?,
        effective_balance / P::MIN_SLASHING_PENALTY_QUOTIENT,
    );

    // > Apply proposer and whistleblower rewards
    let proposer_index = get_beacon_proposer_index(state)?;
    let whistleblower_index = whistleblower_index.unwrap_or(proposer_index);
    let whistleblower_reward = effective_balance / P::WHISTLEBLOWER_REWARD_QUOTIENT;
    let proposer_reward = whistleblower_reward / P::PROPOSER_REWARD_QUOTIENT;

    increase_balance(balance(state, proposer_index)?, proposer_reward);

    increase_balance(
        balance(state, whistleblower_index)?,
        whistleblower_reward - proposer_reward,
    );

    Ok(())
}

fn validator_mut<P: Preset>(
    state: &mut BeaconState<P>,
    validator_index: ValidatorIndex,
) -> Result<&mut Validator> {
    usize::try_from(validator_index)
        .ok()
        .and_then(|index| state.validators.get_mut(index))
        .ok_or(Error::ValidatorIndexOutOfBounds {
            index: validator_index,
        })
        .map_err(Into::into)
}
