use anyhow::{ensure, Result};
use tree_hash::TreeHash as _;
use types::{
    phase0::{beacon_state::BeaconState, containers::BeaconBlock},
    preset::Preset,
};

use crate::unphased::Error;

pub enum StateRootPolicy {
    Verify,
    Trust,
}

impl StateRootPolicy {
    pub fn verify<P: Preset>(self, state: &BeaconState<P>, block: &BeaconBlock<P>) -> Result<()> {
        match self {
            Self::Verify => {
                let computed = state.tree_hash_root();
                let in_block = block.state_root;

                ensure!(
                    computed == in_block,
                    Error::StateRootMismatch { computed, in_block },
                );
            }
            Self::Trust => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tree_hash::TreeHash as _;
    use types::{phase0::primitives::H256, preset::Minimal};

    use super::*;

    #[test]
    fn verify_fails_on_mismatched_state_root() {
        let state = BeaconState::<Minimal>::default();

        let block = BeaconBlock::default().with_state_root(H256::repeat_byte(1));

        assert!(StateRootPolicy::Verify.verify(&state, &block).is_err());
        assert!(StateRootPolicy::Trust.verify(&state, &block).is_ok());
    }

    #[test]
    fn verify_succeeds_on_computed_state_root() -> Result<()> {
        let state = BeaconState::<Minimal>::default();

        let block = BeaconBlock::default().with_state_root(state.tree_hash_root());

        StateRootPolicy::Verify.verify(&state, &block)
    }
}
