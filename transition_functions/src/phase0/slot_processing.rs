use anyhow::{ensure, Result};
use helper_functions::misc;
use types::{
    config::Config,
    phase0::{beacon_state::BeaconState, primitives::Slot},
    preset::Preset,
};

use super::epoch_processing;
use crate::unphased::{self, Error};

pub fn process_slots<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    slot: Slot,
) -> Result<()> {
    ensure!(
        state.slot < slot,
        Error::SlotNotLater {
            current: state.slot,
            target: slot,
        },
    );

    while state.slot < slot {
        unphased::process_slot(state);

        // > Process epoch on the start slot of the next epoch
        if misc::is_epoch_start::<P>(state.slot + 1) {
            epoch_processing::process_epoch(config, state)?;
        }

        state.slot += 1;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use types::preset::Minimal;

    use super::*;

    #[test]
    fn process_slots_rejects_slots_that_are_not_later() {
        let config = Config::minimal();
        let mut state = BeaconState::<Minimal>::default();
        state.slot = 3;

        for slot in [0, 3] {
            let error = process_slots(&config, &mut state, slot)
                .expect_err("the target slot is not later than the current one")
                .downcast::<Error>()
                .expect("error is a transition error");

            assert!(matches!(error, Error::SlotNotLater { .. }));
        }
    }

    #[test]
    fn process_slots_advances_through_an_epoch_boundary() -> Result<()> {
        let config = Config::minimal();
        let mut state = BeaconState::<Minimal>::default();

        // `SLOTS_PER_EPOCH` is 8 in the minimal preset,
        // so this crosses one epoch boundary.
        process_slots(&config, &mut state, 9)?;

        assert_eq!(state.slot, 9);
        assert!(!state.state_roots[0].is_zero());
        assert!(!state.block_roots[0].is_zero());
        assert_eq!(state.latest_block_header.state_root, state.state_roots[0]);

        Ok(())
    }
}
