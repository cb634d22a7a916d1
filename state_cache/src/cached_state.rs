use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use bls::PublicKeyBytes;
use helper_functions::{accessors, misc};
use thiserror::Error;
use types::{
    phase0::{
        beacon_state::BeaconState,
        primitives::{Epoch, Slot, ValidatorIndex},
    },
    preset::Preset,
};

/// Derived, expensive-to-recompute context for the epoch a state is in.
///
/// Computed once when a state is materialized into the cache so that
/// downstream consumers do not redo the shuffling and key lookups.
pub struct EpochContext {
    epoch: Epoch,
    start_slot: Slot,
    validator_indices: HashMap<PublicKeyBytes, ValidatorIndex>,
    proposer_indices: Vec<ValidatorIndex>,
}

impl EpochContext {
    pub fn compute<P: Preset>(state: &BeaconState<P>) -> Result<Self> {
        let epoch = accessors::get_current_epoch(state);
        let start_slot = misc::compute_start_slot_at_epoch::<P>(epoch);

        let validator_indices = (0..)
            .zip(state.validators.iter())
            .map(|(index, validator)| (validator.pubkey, index))
            .collect();

        let proposer_indices = (start_slot..start_slot + P::SLOTS_PER_EPOCH)
            .map(|slot| accessors::get_beacon_proposer_index_at_slot(state, slot))
            .collect::<Result<_>>()?;

        Ok(Self {
            epoch,
            start_slot,
            validator_indices,
            proposer_indices,
        })
    }

    #[must_use]
    pub const fn epoch(&self) -> Epoch {
        self.epoch
    }

    #[must_use]
    pub fn index_of_public_key(&self, public_key: PublicKeyBytes) -> Option<ValidatorIndex> {
        self.validator_indices.get(&public_key).copied()
    }

    pub fn proposer_index(&self, slot: Slot) -> Result<ValidatorIndex> {
        slot.checked_sub(self.start_slot)
            .and_then(|offset| usize::try_from(offset).ok())
            .and_then(|offset| self.proposer_indices.get(offset))
            .copied()
            .ok_or_else(|| {
                Error::SlotNotInEpoch {
                    slot,
                    epoch: self.epoch,
                }
                .into()
            })
    }
}

/// A state together with its [`EpochContext`].
///
/// Cached states are shared and read-only. Transitions clone the state
/// instead of mutating it in place.
pub struct CachedState<P: Preset> {
    state: Arc<BeaconState<P>>,
    epoch_context: Arc<EpochContext>,
}

impl<P: Preset> CachedState<P> {
    pub fn new(state: Arc<BeaconState<P>>) -> Result<Self> {
        let epoch_context = Arc::new(EpochContext::compute(&state)?);

        Ok(Self {
            state,
            epoch_context,
        })
    }

    #[must_use]
    pub const fn state(&self) -> &Arc<BeaconState<P>> {
        &self.state
    }

    #[must_use]
    pub const fn epoch_context(&self) -> &Arc<EpochContext> {
        &self.epoch_context
    }

    #[must_use]
    pub fn slot(&self) -> Slot {
        self.state.slot
    }
}

#[derive(Debug, Error)]
enum Error {
    #[error("slot {slot} is not in epoch {epoch}")]
    SlotNotInEpoch { slot: Slot, epoch: Epoch },
}

#[cfg(test)]
mod tests {
    use types::{
        phase0::{consts::FAR_FUTURE_EPOCH, containers::Validator},
        preset::{Minimal, Preset as _},
    };

    use super::*;

    #[test]
    fn epoch_context_matches_uncached_accessors() -> Result<()> {
        let state = state_with_validators(10);
        let context = EpochContext::compute(&state)?;

        assert_eq!(context.epoch(), 1);

        for (index, validator) in (0..).zip(state.validators.iter()) {
            assert_eq!(context.index_of_public_key(validator.pubkey), Some(index));
        }

        let start_slot = misc::compute_start_slot_at_epoch::<Minimal>(1);

        for slot in start_slot..start_slot + Minimal::SLOTS_PER_EPOCH {
            assert_eq!(
                context.proposer_index(slot)?,
                accessors::get_beacon_proposer_index_at_slot(&state, slot)?,
            );
        }

        Ok(())
    }

    #[test]
    fn proposer_index_fails_outside_the_context_epoch() -> Result<()> {
        let state = state_with_validators(10);
        let context = EpochContext::compute(&state)?;

        context
            .proposer_index(Minimal::SLOTS_PER_EPOCH - 1)
            .expect_err("slot is in the previous epoch");

        context
            .proposer_index(2 * Minimal::SLOTS_PER_EPOCH)
            .expect_err("slot is in the next epoch");

        Ok(())
    }

    fn state_with_validators(slot: Slot) -> BeaconState<Minimal> {
        let mut state = BeaconState::<Minimal>::default();
        state.slot = slot;

        for index in 0..4_u8 {
            let mut bytes = [0; 48];
            bytes[0] = index + 1;

            let validator = Validator {
                pubkey: bytes.into(),
                effective_balance: Minimal::MAX_EFFECTIVE_BALANCE,
                exit_epoch: FAR_FUTURE_EPOCH,
                withdrawable_epoch: FAR_FUTURE_EPOCH,
                ..Validator::default()
            };

            state
                .validators
                .push(validator)
                .expect("validator registry has space for the test validators");

            state
                .balances
                .push(Minimal::MAX_EFFECTIVE_BALANCE)
                .expect("balance list has space for the test validators");
        }

        state
    }
}
