use core::num::NonZeroU64;

use anyhow::{bail, ensure, Result};
use deposit_tree::DepositTree;
use futures::{
    future::{Future, FutureExt as _},
    pin_mut, select,
    stream::{Stream, StreamExt as _, TryStreamExt as _},
};
use helper_functions::{accessors, misc::prev_multiple_of};
use log::info;
use ssz_types::FixedVector;
use thiserror::Error;
use transition_functions::combined;
use tree_hash::TreeHash as _;
use typenum::Unsigned as _;
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        consts::{GENESIS_EPOCH, GENESIS_SLOT},
        containers::{
            BeaconBlock, BeaconBlockBody, BeaconBlockHeader, DepositData, Fork, SignedBeaconBlock,
        },
        primitives::{
            DepositIndex, ExecutionBlockHash, ExecutionBlockNumber, UnixSeconds,
        },
    },
    preset::Preset,
};

/// An eth1 block together with the deposit events it contains.
#[derive(Clone, Debug, Default)]
pub struct Eth1Block {
    pub hash: ExecutionBlockHash,
    pub number: ExecutionBlockNumber,
    pub timestamp: UnixSeconds,
    pub deposit_events: Vec<DepositEvent>,
}

#[derive(Clone, Copy, Debug)]
pub struct DepositEvent {
    pub data: DepositData,
    pub index: DepositIndex,
}

pub struct Incremental<'config, P: Preset> {
    config: &'config Config,
    beacon_state: BeaconState<P>,
    deposit_tree: DepositTree,
}

impl<'config, P: Preset> Incremental<'config, P> {
    /// <https://github.com/ethereum/consensus-specs/blob/v1.3.0/specs/phase0/beacon-chain.md#genesis>
    #[must_use]
    pub fn new(config: &'config Config) -> Self {
        let slot = GENESIS_SLOT;
        let version = config.version(config.phase_at_slot::<P>(slot));

        let fork = Fork {
            previous_version: version,
            current_version: version,
            epoch: GENESIS_EPOCH,
        };

        let latest_block_header = BeaconBlockHeader {
            slot,
            body_root: BeaconBlockBody::<P>::default().tree_hash_root(),
            ..BeaconBlockHeader::default()
        };

        let beacon_state = BeaconState {
            slot,
            fork,
            latest_block_header,
            ..BeaconState::default()
        };

        Self {
            config,
            beacon_state,
            deposit_tree: DepositTree::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_genesis_state(self.config, &self.beacon_state)
    }

    pub fn set_eth1_timestamp(&mut self, eth1_timestamp: UnixSeconds) {
        self.beacon_state.genesis_time = eth1_timestamp + self.config.genesis_delay;
    }

    pub fn add_deposit_data(
        &mut self,
        data: DepositData,
        deposit_index: DepositIndex,
    ) -> Result<()> {
        let eth1_data = &mut self.beacon_state.eth1_data;

        eth1_data.deposit_root = self
            .deposit_tree
            .push_and_compute_root(deposit_index, data)?;

        eth1_data.deposit_count = self.deposit_tree.deposit_count;

        if let Some(validator_index) =
            combined::process_deposit_data(self.config, &mut self.beacon_state, data)?
        {
            let index = usize::try_from(validator_index)?;
            let balance = self.beacon_state.balances[index];
            let validator = &mut self.beacon_state.validators[index];

            // > Process activations
            validator.effective_balance = prev_multiple_of(balance, P::EFFECTIVE_BALANCE_INCREMENT)
                .min(P::MAX_EFFECTIVE_BALANCE);

            if validator.effective_balance == P::MAX_EFFECTIVE_BALANCE {
                validator.activation_eligibility_epoch = GENESIS_EPOCH;
                validator.activation_epoch = GENESIS_EPOCH;
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn finish(self, eth1_block_hash: ExecutionBlockHash) -> (BeaconState<P>, DepositTree) {
        let Self {
            mut beacon_state,
            deposit_tree,
            ..
        } = self;

        beacon_state.eth1_data.block_hash = eth1_block_hash;

        // > Seed RANDAO with Eth1 entropy
        beacon_state.randao_mixes = FixedVector::from(vec![
            eth1_block_hash;
            P::EpochsPerHistoricalVector::USIZE
        ]);

        // > Set genesis validators root for domain separation and chain versioning
        beacon_state.genesis_validators_root = beacon_state.validators.tree_hash_root();

        (beacon_state, deposit_tree)
    }
}

/// <https://github.com/ethereum/consensus-specs/blob/v1.3.0/specs/phase0/beacon-chain.md#genesis-block>
#[must_use]
pub fn beacon_block<P: Preset>(genesis_state: &BeaconState<P>) -> SignedBeaconBlock<P> {
    // The way the genesis block is constructed makes it possible for many parties to independently
    // produce the same block. But why does the genesis block have to exist at all? Perhaps the
    // first block could be proposed by a validator as well (and not necessarily in slot 0)?
    SignedBeaconBlock {
        message: BeaconBlock {
            state_root: genesis_state.tree_hash_root(),
            ..BeaconBlock::default()
        },
        ..SignedBeaconBlock::default()
    }
}

/// Folds eth1 blocks and their deposit events into an [`Incremental`] genesis
/// state until the genesis trigger conditions are met.
///
/// Completing `cancel` abandons the wait at the next suspension point.
/// Nothing is persisted here either way.
pub async fn wait<P, S, F>(
    config: &Config,
    blocks: S,
    cancel: F,
) -> Result<(BeaconState<P>, DepositTree)>
where
    P: Preset,
    S: Stream<Item = Result<Eth1Block>> + Send,
    F: Future<Output = ()> + Send,
{
    let blocks = blocks.fuse();
    let cancel = cancel.fuse();

    pin_mut!(blocks, cancel);

    let mut incremental = Incremental::new(config);

    loop {
        let block = select! {
            block = blocks.try_next() => block?.ok_or(Error::BlocksRanOut)?,
            () = cancel => bail!(Error::Canceled),
        };

        incremental.set_eth1_timestamp(block.timestamp);

        for DepositEvent { data, index } in block.deposit_events.iter().copied() {
            incremental.add_deposit_data(data, index)?;
        }

        if let Err(error) = incremental.validate() {
            info!("genesis not triggered: {error}");
            continue;
        }

        let (genesis_state, deposit_tree) = incremental.finish(block.hash);

        // Don't log the whole state. It's huge even with the minimal configuration.
        info!(
            "genesis triggered with genesis time {}",
            genesis_state.genesis_time,
        );

        return Ok((genesis_state, deposit_tree));
    }
}

/// <https://github.com/ethereum/consensus-specs/blob/v1.3.0/specs/phase0/beacon-chain.md#genesis-state>
fn validate_genesis_state<P: Preset>(config: &Config, state: &BeaconState<P>) -> Result<()> {
    let minimum_genesis_time = config.min_genesis_time;
    let actual_genesis_time = state.genesis_time;

    ensure!(
        minimum_genesis_time <= actual_genesis_time,
        GenesisTriggerError::TooEarly {
            minimum_genesis_time,
            actual_genesis_time,
        },
    );

    let minimum_validator_count = config.min_genesis_active_validator_count;

    let actual_validator_count =
        accessors::get_active_validator_indices(state, GENESIS_EPOCH).count().try_into()?;

    ensure!(
        minimum_validator_count.get() <= actual_validator_count,
        GenesisTriggerError::NotEnoughActiveValidators {
            minimum_validator_count,
            actual_validator_count,
        },
    );

    Ok(())
}

#[derive(Debug, Error)]
enum GenesisTriggerError {
    #[error("too early ({actual_genesis_time} < {minimum_genesis_time})")]
    TooEarly {
        minimum_genesis_time: UnixSeconds,
        actual_genesis_time: UnixSeconds,
    },
    #[error("not enough active validators ({actual_validator_count} < {minimum_validator_count})")]
    NotEnoughActiveValidators {
        minimum_validator_count: NonZeroU64,
        actual_validator_count: u64,
    },
}

#[derive(Debug, Error)]
enum Error {
    #[error("blocks ran out without triggering genesis")]
    BlocksRanOut,
    #[error("waiting for genesis was canceled")]
    Canceled,
}

#[cfg(test)]
mod tests {
    use bls::{SecretKey, SignatureBytes};
    use futures::{executor::block_on, future, stream};
    use helper_functions::signing::SignForAllForks as _;
    use types::{
        phase0::{containers::DepositMessage, primitives::H256},
        preset::{Mainnet, Minimal, Preset as _},
    };

    use super::*;

    #[test]
    fn genesis_add_deposit_data_activates_validator_if_top_up_maxes_balance() -> Result<()> {
        let config = Config::mainnet();
        let half_deposit_data = half_deposit_data::<Mainnet>(&config);
        let eth1_block_hash = ExecutionBlockHash::default();

        let mut incremental = Incremental::<Mainnet>::new(&config);

        incremental.add_deposit_data(half_deposit_data, 0)?;
        incremental.add_deposit_data(half_deposit_data, 1)?;

        let (beacon_state, _) = incremental.finish(eth1_block_hash);

        assert_eq!(beacon_state.validators.len(), 1);
        assert_eq!(
            accessors::get_active_validator_indices(&beacon_state, GENESIS_EPOCH).count(),
            1,
        );

        Ok(())
    }

    #[test]
    fn fresh_incremental_state_is_not_a_valid_genesis_state() {
        let config = Config::minimal();
        let incremental = Incremental::<Minimal>::new(&config);

        incremental
            .validate()
            .expect_err("the genesis time and validator count are both below the minimums");
    }

    #[test]
    fn genesis_block_contains_state_root_and_zero_signature() {
        let config = Config::minimal();
        let incremental = Incremental::<Minimal>::new(&config);
        let (state, _) = incremental.finish(ExecutionBlockHash::repeat_byte(7));

        let block = beacon_block(&state);

        assert_eq!(block.message.slot, GENESIS_SLOT);
        assert_eq!(block.message.state_root, state.tree_hash_root());
        assert_eq!(block.signature, SignatureBytes::default());
    }

    #[test]
    fn wait_triggers_genesis_once_conditions_are_met() -> Result<()> {
        let config = single_validator_config();
        let eth1_block_hash = ExecutionBlockHash::repeat_byte(3);

        let empty_block = Eth1Block {
            hash: ExecutionBlockHash::repeat_byte(2),
            number: 1,
            timestamp: config.min_genesis_time,
            deposit_events: vec![],
        };

        let triggering_block = Eth1Block {
            hash: eth1_block_hash,
            number: 2,
            timestamp: config.min_genesis_time + 1,
            deposit_events: vec![DepositEvent {
                data: full_deposit_data::<Minimal>(&config),
                index: 0,
            }],
        };

        let blocks = stream::iter([empty_block, triggering_block.clone()].map(Ok));

        let (state, deposit_tree) =
            block_on(wait::<Minimal, _, _>(&config, blocks, future::pending()))?;

        assert_eq!(state.validators.len(), 1);
        assert_eq!(deposit_tree.deposit_count, 1);
        assert_eq!(state.eth1_data.block_hash, eth1_block_hash);
        assert_eq!(
            state.genesis_time,
            triggering_block.timestamp + config.genesis_delay,
        );
        assert_eq!(
            accessors::get_randao_mix(&state, GENESIS_EPOCH),
            eth1_block_hash,
        );

        Ok(())
    }

    #[test]
    fn wait_fails_when_blocks_run_out() {
        let config = single_validator_config();
        let blocks = stream::iter([]);

        block_on(wait::<Minimal, _, _>(&config, blocks, future::pending()))
            .expect_err("the stream was exhausted without triggering genesis");
    }

    #[test]
    fn wait_can_be_canceled() {
        let config = single_validator_config();
        let blocks = stream::pending();

        block_on(wait::<Minimal, _, _>(&config, blocks, future::ready(())))
            .expect_err("the cancellation future completed first");
    }

    fn single_validator_config() -> Config {
        Config {
            min_genesis_active_validator_count: NonZeroU64::MIN,
            ..Config::minimal()
        }
    }

    fn half_deposit_data<P: Preset>(config: &Config) -> DepositData {
        deposit_data::<P>(config, P::MAX_EFFECTIVE_BALANCE / 2)
    }

    fn full_deposit_data<P: Preset>(config: &Config) -> DepositData {
        deposit_data::<P>(config, P::MAX_EFFECTIVE_BALANCE)
    }

    fn deposit_data<P: Preset>(config: &Config, amount: u64) -> DepositData {
        let secret_key = secret_key();
        let pubkey = secret_key.to_public_key().into();
        let withdrawal_credentials = H256::default();

        let deposit_message = DepositMessage {
            pubkey,
            withdrawal_credentials,
            amount,
        };

        DepositData {
            pubkey,
            withdrawal_credentials,
            amount,
            signature: deposit_message.sign(config, &secret_key).into(),
        }
    }

    fn secret_key() -> SecretKey {
        (*b"????????????????????????????????")
            .try_into()
            .expect("bytes encode a valid secret key")
    }
}
