use core::ops::Not as _;

use anyhow::{Error as AnyhowError, Result};
use bls::PublicKey;
use helper_functions::{
    accessors,
    error::SignatureKind,
    misc, predicates,
    signing::{RandaoEpoch, SignForSingleFork as _},
    verifier::{NullVerifier, Verifier},
};
use types::{
    config::Config,
    phase0::{beacon_state::BeaconState, containers::SignedBeaconBlock},
    preset::Preset,
};

use super::{block_processing, slot_processing};
use crate::unphased::{ProcessSlots, StateRootPolicy};

pub fn state_transition<P: Preset, V: Verifier + Send>(
    config: &Config,
    state: &mut BeaconState<P>,
    signed_block: &SignedBeaconBlock<P>,
    process_slots: ProcessSlots,
    state_root_policy: StateRootPolicy,
    verifier: V,
) -> Result<()> {
    let block = &signed_block.message;

    // > Process slots (including those with no blocks) since block
    if process_slots.should_process(state, block) {
        slot_processing::process_slots(config, state, block.slot)?;
    }

    // Running signature verification in parallel with the rest of block processing
    // speeds up the transition measurably. The two only need the pre-block state,
    // which is cheap to clone before block processing mutates it.
    let verify_signatures = V::IS_NULL.not().then(|| {
        let state = state.clone();

        // > Verify signature
        move || verify_signatures(config, &state, signed_block, verifier)
    });

    let process_block = || {
        // > Process block
        block_processing::custom_process_block(config, state, &signed_block.message, NullVerifier)?;

        // > Verify state root
        state_root_policy.verify(state, block)?;

        Ok(())
    };

    if let Some(verify_signatures) = verify_signatures {
        let (signature_result, block_result) = rayon::join(verify_signatures, process_block);
        signature_result.and(block_result)
    } else {
        process_block()
    }
}

pub fn verify_signatures<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    block: &SignedBeaconBlock<P>,
    mut verifier: impl Verifier,
) -> Result<()> {
    verifier.reserve(count_required_signatures(block));

    // Block signature

    verifier.verify_singular(
        block.message.signing_root(config, state),
        block.signature,
        accessors::public_key(state, block.message.proposer_index)?,
        SignatureKind::Block,
    )?;

    // RANDAO reveal

    verifier.verify_singular(
        RandaoEpoch::from(misc::compute_epoch_at_slot::<P>(block.message.slot))
            .signing_root(config, state),
        block.message.body.randao_reveal,
        accessors::public_key(state, block.message.proposer_index)?,
        SignatureKind::Randao,
    )?;

    // Proposer slashings

    for proposer_slashing in &block.message.body.proposer_slashings {
        for signed_header in [
            proposer_slashing.signed_header_1,
            proposer_slashing.signed_header_2,
        ] {
            verifier.verify_singular(
                signed_header.message.signing_root(config, state),
                signed_header.signature,
                accessors::public_key(state, signed_header.message.proposer_index)?,
                SignatureKind::Block,
            )?;
        }
    }

    // Attester slashings

    for attester_slashing in &block.message.body.attester_slashings {
        for attestation in [
            &attester_slashing.attestation_1,
            &attester_slashing.attestation_2,
        ] {
            itertools::process_results(
                attestation
                    .attesting_indices
                    .iter()
                    .copied()
                    .map(|validator_index| {
                        let public_key_bytes = accessors::public_key(state, validator_index)?;
                        PublicKey::try_from(public_key_bytes).map_err(AnyhowError::new)
                    }),
                |public_keys| {
                    verifier.verify_aggregate(
                        attestation.data.signing_root(config, state),
                        attestation.signature,
                        public_keys,
                        SignatureKind::Attestation,
                    )
                },
            )??;
        }
    }

    // Attestations

    for attestation in &block.message.body.attestations {
        predicates::validate_indexed_attestation(config, state, attestation, &mut verifier)?;
    }

    // Voluntary exits

    for voluntary_exit in &block.message.body.voluntary_exits {
        verifier.verify_singular(
            voluntary_exit.message.signing_root(config, state),
            voluntary_exit.signature,
            accessors::public_key(state, voluntary_exit.message.validator_index)?,
            SignatureKind::VoluntaryExit,
        )?;
    }

    verifier.finish()
}

fn count_required_signatures<P: Preset>(block: &SignedBeaconBlock<P>) -> usize {
    1 + block_processing::count_required_signatures(&block.message)
}

#[cfg(test)]
mod tests {
    use bls::{SecretKey, SignatureBytes};
    use helper_functions::verifier::MultiVerifier;
    use tree_hash::TreeHash as _;
    use types::{
        phase0::{
            consts::FAR_FUTURE_EPOCH,
            containers::{BeaconBlock, Validator},
            primitives::Slot,
        },
        preset::{Minimal, Preset as _},
    };

    use super::*;

    #[test]
    fn blocks_applied_in_sequence_produce_matching_state_roots() -> Result<()> {
        let config = Config::minimal();
        let mut state = genesis_state();

        for slot in 1..=3 {
            let signed_block = propose(&config, &state, slot)?;

            state_transition(
                &config,
                &mut state,
                &signed_block,
                ProcessSlots::Always,
                StateRootPolicy::Verify,
                MultiVerifier::default(),
            )?;

            assert_eq!(state.slot, slot);
            assert_eq!(state.tree_hash_root(), signed_block.message.state_root);
        }

        Ok(())
    }

    // Builds a valid block on top of `state` the way a proposer would:
    // advance a copy through empty slots, link to the patched header,
    // compute the resulting state root with a trusted transition, then sign.
    fn propose(
        config: &Config,
        state: &BeaconState<Minimal>,
        slot: Slot,
    ) -> Result<SignedBeaconBlock<Minimal>> {
        let secret_key = secret_key();

        let mut advanced = state.clone();
        slot_processing::process_slots(config, &mut advanced, slot)?;

        let mut block = BeaconBlock {
            slot,
            proposer_index: 0,
            parent_root: advanced.latest_block_header.tree_hash_root(),
            ..BeaconBlock::default()
        };

        block.body.randao_reveal =
            RandaoEpoch::from(misc::compute_epoch_at_slot::<Minimal>(slot))
                .sign(config, &advanced, &secret_key)
                .into();

        let mut post = state.clone();

        state_transition(
            config,
            &mut post,
            &SignedBeaconBlock {
                message: block.clone(),
                signature: SignatureBytes::empty(),
            },
            ProcessSlots::Always,
            StateRootPolicy::Trust,
            NullVerifier,
        )?;

        let block = block.with_state_root(post.tree_hash_root());
        let signature = block.sign(config, &advanced, &secret_key).into();

        Ok(SignedBeaconBlock {
            message: block,
            signature,
        })
    }

    fn genesis_state() -> BeaconState<Minimal> {
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
