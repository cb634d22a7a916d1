use tree_hash::TreeHash as _;
use typenum::Unsigned as _;
use types::{
    phase0::{beacon_state::BeaconState, containers::BeaconBlock},
    preset::Preset,
};

pub enum ProcessSlots {
    Always,
    IfNeeded,
    Never,
}

impl ProcessSlots {
    pub fn should_process<P: Preset>(
        self,
        state: &BeaconState<P>,
        block: &BeaconBlock<P>,
    ) -> bool {
        match self {
            Self::Always => true,
            // The test for equality is intentional. It ensures that blocks attempting to "rewind"
            // the state are rejected early by `process_slots`. `state.slot < block.slot` would
            // also work, but the block would be rejected as invalid later, while verifying the
            // state root.
            Self::IfNeeded => state.slot != block.slot,
            Self::Never => false,
        }
    }
}

pub fn process_slot<P: Preset>(state: &mut BeaconState<P>) {
    let index = usize::try_from(state.slot % P::SlotsPerHistoricalRoot::U64)
        .expect("root ring index fits in usize");

    // > Cache state root
    let previous_state_root = state.tree_hash_root();
    state.state_roots[index] = previous_state_root;

    // > Cache latest block header state root
    if state.latest_block_header.state_root.is_zero() {
        state.latest_block_header.state_root = previous_state_root;
    }

    // > Cache block root
    let previous_block_root = state.latest_block_header.tree_hash_root();
    state.block_roots[index] = previous_block_root;
}

#[cfg(test)]
mod tests {
    use types::preset::Minimal;

    use super::*;

    #[test]
    fn process_slots_if_needed_only_when_slots_differ() {
        let mut state = BeaconState::<Minimal>::default();
        let block = BeaconBlock::<Minimal>::default();

        assert!(!ProcessSlots::IfNeeded.should_process(&state, &block));

        state.slot = 1;

        assert!(ProcessSlots::IfNeeded.should_process(&state, &block));
    }

    #[test]
    fn process_slot_caches_roots_and_patches_latest_block_header() {
        let mut state = BeaconState::<Minimal>::default();

        assert!(state.latest_block_header.state_root.is_zero());

        process_slot(&mut state);

        let cached_state_root = state.state_roots[0];

        assert!(!cached_state_root.is_zero());
        assert_eq!(state.latest_block_header.state_root, cached_state_root);
        assert!(!state.block_roots[0].is_zero());
    }
}
