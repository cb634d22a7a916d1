use anyhow::{ensure, Result};
use helper_functions::{
    accessors,
    error::SignatureKind,
    signing::SignForSingleFork as _,
    verifier::{MultiVerifier, Verifier as _},
};
use log::debug;
use prometheus_metrics::METRICS;
use thiserror::Error;
use tree_hash::TreeHash as _;
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        containers::SignedBeaconBlock,
        primitives::{Slot, H256},
    },
    preset::Preset,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "newest block in batch does not chain to the anchor \
         (slot: {slot}, expected: {expected:?}, actual: {actual:?})"
    )]
    NotAnchored {
        slot: Slot,
        expected: H256,
        actual: H256,
    },
    #[error(
        "block batch has an internal break \
         (slot: {slot}, expected: {expected:?}, actual: {actual:?})"
    )]
    NotLinear {
        slot: Slot,
        expected: H256,
        actual: H256,
    },
    #[error("block batch contains an invalid signature")]
    InvalidSignature,
}

/// Verifies a batch of backfilled blocks against `anchor_root`.
///
/// `blocks` must be ordered by slot. The hash chain is checked from the newest
/// block down to the oldest before any signatures are verified, so a malformed
/// batch is rejected without paying for cryptography. The proposer signatures
/// of the whole batch are then verified at once; a failure is reported for the
/// batch as a whole without identifying the offending block.
pub fn verify_blocks<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    blocks: &[SignedBeaconBlock<P>],
    anchor_root: H256,
) -> Result<()> {
    let _timer = METRICS
        .get()
        .map(|metrics| metrics.back_sync_verification_times.start_timer());

    let mut expected = anchor_root;

    for (position, block) in blocks.iter().rev().enumerate() {
        let message = &block.message;
        let actual = message.tree_hash_root();

        ensure!(
            actual == expected,
            if position == 0 {
                Error::NotAnchored {
                    slot: message.slot,
                    expected,
                    actual,
                }
            } else {
                Error::NotLinear {
                    slot: message.slot,
                    expected,
                    actual,
                }
            },
        );

        expected = message.parent_root;
    }

    let mut verifier = MultiVerifier::default();

    verifier.reserve(blocks.len());

    for block in blocks {
        verifier.verify_singular(
            block.message.signing_root(config, state),
            block.signature,
            accessors::public_key(state, block.message.proposer_index)?,
            SignatureKind::Block,
        )?;
    }

    verifier.finish().map_err(|_| Error::InvalidSignature)?;

    debug!(
        "backfill batch verified (blocks: {}, anchor: {anchor_root:?})",
        blocks.len(),
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use bls::SecretKey;
    use types::{
        phase0::{
            consts::FAR_FUTURE_EPOCH,
            containers::{BeaconBlock, Validator},
        },
        preset::{Minimal, Preset as _},
    };

    use super::*;

    #[test]
    fn empty_batch_succeeds_regardless_of_anchor() -> Result<()> {
        let config = Config::minimal();
        let state = state_with_proposer();

        verify_blocks(&config, &state, &[], H256::default())?;
        verify_blocks(&config, &state, &[], H256::repeat_byte(1))?;

        Ok(())
    }

    #[test]
    fn correctly_linked_batch_with_valid_signatures_passes() -> Result<()> {
        let config = Config::minimal();
        let state = state_with_proposer();
        let (blocks, anchor_root) = chain(&config, &state, 3);

        verify_blocks(&config, &state, &blocks, anchor_root)
    }

    #[test]
    fn mutating_the_newest_block_breaks_anchoring() -> Result<()> {
        let config = Config::minimal();
        let state = state_with_proposer();
        let (mut blocks, anchor_root) = chain(&config, &state, 3);

        blocks
            .last_mut()
            .expect("chain has three blocks")
            .message
            .state_root = H256::repeat_byte(9);

        let error = verify_blocks(&config, &state, &blocks, anchor_root)
            .expect_err("the newest block no longer hashes to the anchor root")
            .downcast::<Error>()?;

        assert!(matches!(error, Error::NotAnchored { slot: 3, .. }));

        Ok(())
    }

    #[test]
    fn mutating_the_oldest_parent_root_breaks_linearity() -> Result<()> {
        let config = Config::minimal();
        let state = state_with_proposer();
        let (mut blocks, anchor_root) = chain(&config, &state, 3);

        blocks
            .first_mut()
            .expect("chain has three blocks")
            .message
            .parent_root = H256::repeat_byte(9);

        let error = verify_blocks(&config, &state, &blocks, anchor_root)
            .expect_err("the oldest block no longer matches its child's parent root")
            .downcast::<Error>()?;

        assert!(matches!(error, Error::NotLinear { slot: 1, .. }));

        Ok(())
    }

    #[test]
    fn corrupting_one_signature_fails_the_whole_batch() -> Result<()> {
        let config = Config::minimal();
        let state = state_with_proposer();
        let (blocks, anchor_root) = chain(&config, &state, 3);

        for position in 0..blocks.len() {
            let mut blocks = blocks.clone();
            blocks[position].signature = secret_key().sign(H256::repeat_byte(9)).into();

            let error = verify_blocks(&config, &state, &blocks, anchor_root)
                .expect_err("one of the signatures does not cover its block")
                .downcast::<Error>()?;

            assert!(matches!(error, Error::InvalidSignature));
        }

        Ok(())
    }

    // Linkage and proposer signatures are all `verify_blocks` checks, so the
    // blocks do not have to be products of actual state transitions.
    fn chain(
        config: &Config,
        state: &BeaconState<Minimal>,
        length: u64,
    ) -> (Vec<SignedBeaconBlock<Minimal>>, H256) {
        let secret_key = secret_key();
        let mut parent_root = H256::default();
        let mut blocks = vec![];

        for slot in 1..=length {
            let message = BeaconBlock {
                slot,
                proposer_index: 0,
                parent_root,
                ..BeaconBlock::default()
            };

            parent_root = message.tree_hash_root();

            let signature = message.sign(config, state, &secret_key).into();

            blocks.push(SignedBeaconBlock { message, signature });
        }

        (blocks, parent_root)
    }

    fn state_with_proposer() -> BeaconState<Minimal> {
        let mut state = BeaconState::<Minimal>::default();

        let validator = Validator {
            pubkey: secret_key().to_public_key().into(),
            effective_balance: Minimal::MAX_EFFECTIVE_BALANCE,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        };

        state
            .validators
            .push(validator)
            .expect("validator registry has space for the test validator");

        state
            .balances
            .push(Minimal::MAX_EFFECTIVE_BALANCE)
            .expect("balance list has space for the test validator");

        state
    }

    fn secret_key() -> SecretKey {
        (*b"????????????????????????????????")
            .try_into()
            .expect("bytes encode a valid secret key")
    }
}
