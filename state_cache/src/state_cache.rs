use core::time::Duration;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use im::{HashMap, OrdMap};
use log::warn;
use parking_lot::{Mutex, MutexGuard};
use std_ext::ArcExt as _;
use thiserror::Error;
use types::{
    phase0::{
        containers::Checkpoint,
        primitives::{Slot, H256},
    },
    preset::Preset,
};

use crate::cached_state::CachedState;

type RootIndex<P> = HashMap<H256, Arc<CachedState<P>>>;
type CheckpointIndex<P> = OrdMap<Checkpoint, Arc<CachedState<P>>>;

#[derive(Debug, Error)]
enum CacheLockError {
    #[error("could not obtain state cache root index lock in {} ms", timeout.as_millis())]
    RootIndexLockTimeout { timeout: Duration },
    #[error("could not obtain state cache checkpoint index lock in {} ms", timeout.as_millis())]
    CheckpointIndexLockTimeout { timeout: Duration },
}

/// Root-indexed and checkpoint-indexed caches over shared [`CachedState`] values.
///
/// Readers only ever observe fully constructed values. Eviction is the
/// owner's concern; [`StateCaches::prune_below`] is the mechanism.
pub struct StateCaches<P: Preset> {
    by_root: Mutex<RootIndex<P>>,
    by_checkpoint: Mutex<CheckpointIndex<P>>,
    try_lock_timeout: Duration,
}

impl<P: Preset> StateCaches<P> {
    #[must_use]
    pub fn new(try_lock_timeout: Duration) -> Self {
        Self {
            by_root: Mutex::new(HashMap::new()),
            by_checkpoint: Mutex::new(OrdMap::new()),
            try_lock_timeout,
        }
    }

    /// Inserts `cached_state` into both indices.
    ///
    /// Insertion overwrites any previous entry under the same key. At most
    /// one materialization of a state is live per key.
    pub fn insert(
        &self,
        state_root: H256,
        checkpoint: Checkpoint,
        cached_state: Arc<CachedState<P>>,
    ) -> Result<()> {
        self.try_lock_roots()?
            .insert(state_root, cached_state.clone_arc());

        self.try_lock_checkpoints()?.insert(checkpoint, cached_state);

        Ok(())
    }

    pub fn get_by_state_root(&self, state_root: H256) -> Result<Option<Arc<CachedState<P>>>> {
        Ok(self.try_lock_roots()?.get(&state_root).cloned())
    }

    pub fn get_by_checkpoint(&self, checkpoint: Checkpoint) -> Result<Option<Arc<CachedState<P>>>> {
        Ok(self.try_lock_checkpoints()?.get(&checkpoint).cloned())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.try_lock_roots()?.len() + self.try_lock_checkpoints()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Drops entries for states below `slot` from both indices.
    pub fn prune_below(&self, slot: Slot) -> Result<()> {
        {
            let mut roots = self.try_lock_roots()?;
            roots.retain(|_, cached_state| cached_state.slot() >= slot);
        }

        let mut checkpoints = self.try_lock_checkpoints()?;

        *checkpoints = checkpoints
            .iter()
            .filter(|(_, cached_state)| cached_state.slot() >= slot)
            .map(|(checkpoint, cached_state)| (*checkpoint, cached_state.clone_arc()))
            .collect();

        Ok(())
    }

    fn try_lock_roots(&self) -> Result<MutexGuard<RootIndex<P>>> {
        let timeout = self.try_lock_timeout;

        self.by_root.try_lock_for(timeout).ok_or_else(|| {
            let error = CacheLockError::RootIndexLockTimeout { timeout };

            warn!("{error:?}");

            anyhow!(error)
        })
    }

    fn try_lock_checkpoints(&self) -> Result<MutexGuard<CheckpointIndex<P>>> {
        let timeout = self.try_lock_timeout;

        self.by_checkpoint.try_lock_for(timeout).ok_or_else(|| {
            let error = CacheLockError::CheckpointIndexLockTimeout { timeout };

            warn!("{error:?}");

            anyhow!(error)
        })
    }
}

#[cfg(test)]
mod tests {
    use types::{
        phase0::{beacon_state::BeaconState, consts::FAR_FUTURE_EPOCH, containers::Validator},
        preset::{Minimal, Preset as _},
    };

    use super::*;

    const STATE_ROOT: H256 = H256::repeat_byte(1);

    const CHECKPOINT: Checkpoint = Checkpoint {
        epoch: 0,
        root: H256::repeat_byte(2),
    };

    #[test]
    fn lookups_by_root_and_checkpoint_return_the_same_state() -> Result<()> {
        let caches = new_test_caches();
        let cached_state = state_at_slot(3);

        caches.insert(STATE_ROOT, CHECKPOINT, cached_state)?;

        let by_root = caches
            .get_by_state_root(STATE_ROOT)?
            .expect("state was inserted into the root index");

        let by_checkpoint = caches
            .get_by_checkpoint(CHECKPOINT)?
            .expect("state was inserted into the checkpoint index");

        assert!(Arc::ptr_eq(&by_root, &by_checkpoint));
        assert_eq!(caches.len()?, 2);

        Ok(())
    }

    #[test]
    fn insert_overwrites_the_previous_entry_under_the_same_key() -> Result<()> {
        let caches = new_test_caches();

        caches.insert(STATE_ROOT, CHECKPOINT, state_at_slot(3))?;
        caches.insert(STATE_ROOT, CHECKPOINT, state_at_slot(4))?;

        let cached_state = caches
            .get_by_state_root(STATE_ROOT)?
            .expect("state was inserted into the root index");

        assert_eq!(cached_state.slot(), 4);
        assert_eq!(caches.len()?, 2);

        Ok(())
    }

    #[test]
    fn prune_below_drops_old_entries_from_both_indices() -> Result<()> {
        let caches = new_test_caches();

        let old_checkpoint = Checkpoint {
            epoch: 0,
            root: H256::repeat_byte(3),
        };

        caches.insert(H256::repeat_byte(4), old_checkpoint, state_at_slot(2))?;
        caches.insert(STATE_ROOT, CHECKPOINT, state_at_slot(5))?;

        caches.prune_below(3)?;

        assert!(caches.get_by_state_root(H256::repeat_byte(4))?.is_none());
        assert!(caches.get_by_checkpoint(old_checkpoint)?.is_none());
        assert!(caches.get_by_state_root(STATE_ROOT)?.is_some());
        assert!(caches.get_by_checkpoint(CHECKPOINT)?.is_some());
        assert_eq!(caches.len()?, 2);

        Ok(())
    }

    fn new_test_caches() -> StateCaches<Minimal> {
        StateCaches::new(Duration::from_secs(1))
    }

    fn state_at_slot(slot: Slot) -> Arc<CachedState<Minimal>> {
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

        let cached_state =
            CachedState::new(Arc::new(state)).expect("state has active validators in every slot");

        Arc::new(cached_state)
    }
}
