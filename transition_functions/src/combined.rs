use anyhow::Result;
use helper_functions::verifier::{MultiVerifier, NullVerifier, Verifier};
use types::{
    config::Config,
    nonstandard::Phase,
    phase0::{
        beacon_state::BeaconState,
        containers::{DepositData, SignedBeaconBlock},
        primitives::{Slot, ValidatorIndex},
    },
    preset::Preset,
};

use crate::{
    phase0,
    unphased::{ProcessSlots, StateRootPolicy},
};

/// Performs the complete state transition for a block received from an
/// untrusted source. All signatures in the block are verified in one batch
/// and the state root in the block is compared against the computed one.
pub fn untrusted_state_transition<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    signed_block: &SignedBeaconBlock<P>,
) -> Result<()> {
    custom_state_transition(
        config,
        state,
        signed_block,
        ProcessSlots::Always,
        StateRootPolicy::Verify,
        MultiVerifier::default(),
    )
}

/// Performs the state transition for a block whose signatures and state root
/// are already known to be valid, like one loaded from the local database.
pub fn trusted_state_transition<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    signed_block: &SignedBeaconBlock<P>,
) -> Result<()> {
    custom_state_transition(
        config,
        state,
        signed_block,
        ProcessSlots::Always,
        StateRootPolicy::Trust,
        NullVerifier,
    )
}

pub fn custom_state_transition<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    block: &SignedBeaconBlock<P>,
    process_slots: ProcessSlots,
    state_root_policy: StateRootPolicy,
    verifier: impl Verifier + Send,
) -> Result<()> {
    match config.phase_at_slot::<P>(block.message.slot) {
        Phase::Phase0 => phase0::state_transition(
            config,
            state,
            block,
            process_slots,
            state_root_policy,
            verifier,
        ),
    }
}

pub fn process_slots<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    slot: Slot,
) -> Result<()> {
    match config.phase_at_slot::<P>(slot) {
        Phase::Phase0 => phase0::process_slots(config, state, slot),
    }
}

pub fn process_epoch<P: Preset>(config: &Config, state: &mut BeaconState<P>) -> Result<()> {
    match config.phase_at_slot::<P>(state.slot) {
        Phase::Phase0 => phase0::process_epoch(config, state),
    }
}

pub fn process_deposit_data<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    deposit_data: DepositData,
) -> Result<Option<ValidatorIndex>> {
    match config.phase_at_slot::<P>(state.slot) {
        Phase::Phase0 => phase0::process_deposit_data(config, state, deposit_data),
    }
}

pub fn verify_signatures<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    block: &SignedBeaconBlock<P>,
    verifier: impl Verifier,
) -> Result<()> {
    match config.phase_at_slot::<P>(block.message.slot) {
        Phase::Phase0 => phase0::verify_signatures(config, state, block, verifier),
    }
}
