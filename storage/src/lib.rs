use core::{fmt::Display, future::Future, marker::PhantomData};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use database::{Database, PrefixableKey};
use deposit_tree::DepositTree;
use derive_more::Display;
use futures::stream::Stream;
use genesis::Eth1Block;
use helper_functions::accessors;
use log::info;
use prometheus_metrics::METRICS;
use ssz::{Decode, Encode};
use state_cache::{CachedState, StateCaches};
use thiserror::Error;
use tree_hash::TreeHash as _;
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        consts::GENESIS_SLOT,
        containers::{BeaconBlockBody, BeaconBlockHeader, Checkpoint, Eth1Data, SignedBeaconBlock},
        primitives::{Slot, UnixSeconds, H256},
    },
    preset::Preset,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("no state found in storage")]
    NoStateInStorage,
}

/// Typed archives over [`Database`] and the anchor state entry points.
#[derive(Clone)]
pub struct Storage<P> {
    config: Arc<Config>,
    database: Arc<Database>,
    phantom: PhantomData<P>,
}

impl<P: Preset> Storage<P> {
    #[must_use]
    pub fn new(config: Arc<Config>, database: Arc<Database>) -> Self {
        Self {
            config,
            database,
            phantom: PhantomData,
        }
    }

    /// Waits for genesis on `eth1_blocks` and persists the result.
    ///
    /// The genesis state, the genesis block, the deposit tree, and the eth1
    /// vote data all commit in one batch. The state is not considered
    /// initialized until they have.
    pub async fn init_state_from_eth1(
        &self,
        eth1_blocks: impl Stream<Item = Result<Eth1Block>> + Send,
        cancel: impl Future<Output = ()> + Send,
    ) -> Result<Arc<BeaconState<P>>> {
        let (genesis_state, deposit_tree) =
            genesis::wait::<P, _, _>(&self.config, eth1_blocks, cancel).await?;

        let genesis_block = genesis::beacon_block(&genesis_state);
        let block_root = genesis_block.message.tree_hash_root();

        self.database.put_batch([
            serialize(StateBySlot(genesis_state.slot), &genesis_state),
            serialize(BlockByRoot(block_root), &genesis_block),
            serialize(DepositDataRoots, &deposit_tree.leaves()),
            serialize(
                Eth1DataByTimestamp(genesis_state.genesis_time),
                &genesis_state.eth1_data,
            ),
        ])?;

        info!(
            "saved genesis state and block (slot: {}, epoch: {}, state root: {:?}, \
             block root: {block_root:?}, genesis time: {})",
            genesis_state.slot,
            accessors::get_current_epoch(&genesis_state),
            genesis_block.message.state_root,
            genesis_state.genesis_time,
        );

        let genesis_state = Arc::new(genesis_state);

        update_metrics(&genesis_state);

        Ok(genesis_state)
    }

    /// Loads the most recently archived state.
    pub fn init_state_from_db(&self) -> Result<Arc<BeaconState<P>>> {
        let state = self
            .database
            .prev(StateBySlot(Slot::MAX).to_string())?
            .filter(|(key, _)| StateBySlot::has_prefix(key))
            .map(|(_, bytes)| deserialize::<BeaconState<P>>(&bytes))
            .transpose()?
            .ok_or(Error::NoStateInStorage)?;

        info!(
            "loaded state (slot: {}, epoch: {}, state root: {:?})",
            state.slot,
            accessors::get_current_epoch(&state),
            state.tree_hash_root(),
        );

        let state = Arc::new(state);

        update_metrics(&state);

        Ok(state)
    }

    /// Archives a supplied anchor state.
    ///
    /// A state at the genesis slot gets a synthesized genesis block persisted
    /// along with it. Later states are archived alone.
    pub fn init_state_from_anchor(&self, anchor_state: &Arc<BeaconState<P>>) -> Result<()> {
        let slot = anchor_state.slot;

        if slot == GENESIS_SLOT {
            let block = genesis::beacon_block(anchor_state);
            let block_root = block.message.tree_hash_root();

            self.database.put_batch([
                serialize(StateBySlot(slot), anchor_state.as_ref()),
                serialize(BlockByRoot(block_root), &block),
            ])?;

            info!(
                "saved anchor state and genesis block (slot: {slot}, epoch: {}, \
                 state root: {:?}, block root: {block_root:?})",
                accessors::get_current_epoch(anchor_state),
                block.message.state_root,
            );
        } else {
            self.database.put_batch([serialize(
                StateBySlot(slot),
                anchor_state.as_ref(),
            )])?;

            info!(
                "saved anchor state (slot: {slot}, epoch: {}, state root: {:?})",
                accessors::get_current_epoch(anchor_state),
                anchor_state.tree_hash_root(),
            );
        }

        update_metrics(anchor_state);

        Ok(())
    }

    /// Materializes `state` into both cache indices.
    pub fn restore_state_caches(
        &self,
        state_caches: &StateCaches<P>,
        state: Arc<BeaconState<P>>,
    ) -> Result<()> {
        let (checkpoint, _) = compute_anchor_checkpoint(&state);
        let state_root = state.tree_hash_root();
        let cached_state = Arc::new(CachedState::new(state)?);

        state_caches.insert(state_root, checkpoint, cached_state)
    }

    pub fn block(&self, block_root: H256) -> Result<Option<SignedBeaconBlock<P>>> {
        self.database
            .get(BlockByRoot(block_root).to_string())?
            .map(|bytes| deserialize(&bytes))
            .transpose()
    }

    pub fn deposit_tree(&self) -> Result<Option<DepositTree>> {
        let leaves = self
            .database
            .get(DepositDataRoots.to_string())?
            .map(|bytes| deserialize::<Vec<H256>>(&bytes))
            .transpose()?;

        Ok(leaves.map(|leaves| DepositTree::create(&leaves)))
    }

    pub fn eth1_data(&self, timestamp: UnixSeconds) -> Result<Option<Eth1Data>> {
        self.database
            .get(Eth1DataByTimestamp(timestamp).to_string())?
            .map(|bytes| deserialize(&bytes))
            .transpose()
    }
}

/// Computes the anchor checkpoint of a state.
///
/// A state at the genesis slot carries a header synthesized from defaults
/// because the genesis block is itself synthesized. Any other embedded header
/// usually has a zeroed state root, since the header was produced before the
/// resulting state root was known, so it is patched before hashing.
#[must_use]
pub fn compute_anchor_checkpoint<P: Preset>(
    state: &BeaconState<P>,
) -> (Checkpoint, BeaconBlockHeader) {
    let header = if state.latest_block_header.slot == GENESIS_SLOT {
        // The body root must match the default-bodied genesis block, so that
        // the checkpoint root equals the hash of the block actually persisted.
        BeaconBlockHeader {
            state_root: state.tree_hash_root(),
            body_root: BeaconBlockBody::<P>::default().tree_hash_root(),
            ..BeaconBlockHeader::default()
        }
    } else {
        let mut header = state.latest_block_header;

        if header.state_root.is_zero() {
            header.state_root = state.tree_hash_root();
        }

        header
    };

    let checkpoint = Checkpoint {
        epoch: accessors::get_current_epoch(state),
        root: header.tree_hash_root(),
    };

    (checkpoint, header)
}

fn update_metrics<P: Preset>(state: &BeaconState<P>) {
    if let Some(metrics) = METRICS.get() {
        metrics.set_beacon_head_slot(state.slot);
        metrics.set_beacon_current_justified_epoch(state.current_justified_checkpoint.epoch);
        metrics.set_beacon_finalized_epoch(state.finalized_checkpoint.epoch);
        metrics.set_validator_count(state.validators.len());
    }
}

fn serialize(key: impl Display, value: &impl Encode) -> (String, Vec<u8>) {
    (key.to_string(), value.as_ssz_bytes())
}

fn deserialize<V: Decode>(bytes: &[u8]) -> Result<V> {
    V::from_ssz_bytes(bytes).map_err(|error| anyhow!("failed to deserialize SSZ value: {error:?}"))
}

#[derive(Display)]
#[display("{}{_0:020}", Self::PREFIX)]
struct StateBySlot(Slot);

impl PrefixableKey for StateBySlot {
    const PREFIX: &'static str = "s";
}

#[derive(Display)]
#[display("{}{_0:x}", Self::PREFIX)]
struct BlockByRoot(H256);

impl PrefixableKey for BlockByRoot {
    const PREFIX: &'static str = "b";
}

#[derive(Display)]
#[display("{}", Self::PREFIX)]
struct DepositDataRoots;

impl PrefixableKey for DepositDataRoots {
    const PREFIX: &'static str = "d";
}

#[derive(Display)]
#[display("{}{_0:020}", Self::PREFIX)]
struct Eth1DataByTimestamp(UnixSeconds);

impl PrefixableKey for Eth1DataByTimestamp {
    const PREFIX: &'static str = "e";
}
