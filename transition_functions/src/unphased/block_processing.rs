use std::collections::HashMap;

use anyhow::{ensure, Result};
use bls::PublicKeyBytes;
use ethereum_hashing::hash_fixed;
use helper_functions::{
    accessors::{
        get_beacon_proposer_index, get_current_epoch, get_previous_epoch, get_randao_mix,
        index_of_public_key, validator,
    },
    error::SignatureKind,
    misc::compute_epoch_at_slot,
    mutators::initiate_validator_exit,
    predicates::{
        is_active_validator, is_slashable_attestation_data, is_slashable_validator,
        is_valid_merkle_branch, validate_indexed_attestation,
    },
    signing::{RandaoEpoch, SignForAllForks as _, SignForSingleFork as _},
    verifier::{SingleVerifier, Verifier},
};
use itertools::{EitherOrBoth, Itertools as _};
use tree_hash::TreeHash as _;
use typenum::Unsigned as _;
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        consts::FAR_FUTURE_EPOCH,
        containers::{
            Attestation, AttestationData, AttesterSlashing, BeaconBlock, BeaconBlockBody,
            BeaconBlockHeader, Deposit, DepositData, ProposerSlashing, SignedVoluntaryExit,
        },
        primitives::{DepositIndex, Gwei, ValidatorIndex, H256},
    },
    preset::Preset,
};

use crate::unphased::Error;

pub enum CombinedDeposit {
    NewValidator {
        pubkey: PublicKeyBytes,
        withdrawal_credentials: H256,
        amounts: Vec<Gwei>,
    },
    TopUp {
        validator_index: ValidatorIndex,
        amounts: Vec<Gwei>,
    },
}

pub fn process_block_header_for_gossip<P: Preset>(
    state: &BeaconState<P>,
    block: &BeaconBlock<P>,
) -> Result<()> {
    // > Verify that the slots match
    ensure!(
        block.slot == state.slot,
        Error::SlotMismatch {
            state_slot: state.slot,
            block_slot: block.slot,
        },
    );

    // > Verify that the block is newer than latest block header
    ensure!(
        block.slot > state.latest_block_header.slot,
        Error::BlockNotNewerThanLatestBlockHeader {
            block_slot: block.slot,
            block_header_slot: state.latest_block_header.slot,
        },
    );

    // > Verify that proposer index is the correct index
    let computed = get_beacon_proposer_index(state)?;
    let in_block = block.proposer_index;

    ensure!(
        computed == in_block,
        Error::ProposerIndexMismatch { computed, in_block },
    );

    // > Verify that the parent matches
    let computed = state.latest_block_header.tree_hash_root();
    let in_block = block.parent_root;

    ensure!(
        computed == in_block,
        Error::ParentRootMismatch { computed, in_block },
    );

    Ok(())
}

pub fn process_block_header<P: Preset>(
    state: &mut BeaconState<P>,
    block: &BeaconBlock<P>,
) -> Result<()> {
    process_block_header_for_gossip(state, block)?;

    // > Cache current block as the new latest block
    state.latest_block_header = BeaconBlockHeader {
        slot: block.slot,
        proposer_index: block.proposer_index,
        parent_root: block.parent_root,
        // > Overwritten in the next process_slot call
        state_root: H256::zero(),
        body_root: block.body.tree_hash_root(),
    };

    // > Verify proposer is not slashed
    let index = block.proposer_index;
    let proposer = validator(state, index)?;

    ensure!(!proposer.slashed, Error::ProposerSlashed { index });

    Ok(())
}

pub fn process_randao<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    body: &BeaconBlockBody<P>,
    mut verifier: impl Verifier,
) -> Result<()> {
    let epoch = get_current_epoch(state);
    let randao_reveal = body.randao_reveal;

    // > Verify RANDAO reveal
    let proposer_index = get_beacon_proposer_index(state)?;
    let public_key = validator(state, proposer_index)?.pubkey;

    verifier.verify_singular(
        RandaoEpoch::from(epoch).signing_root(config, state),
        randao_reveal,
        public_key,
        SignatureKind::Randao,
    )?;

    // > Mix in RANDAO reveal
    let mix = get_randao_mix(state, epoch) ^ H256(hash_fixed(randao_reveal.as_bytes()));
    let index = usize::try_from(epoch % P::EpochsPerHistoricalVector::U64)
        .expect("randao mix index fits in usize");

    state.randao_mixes[index] = mix;

    Ok(())
}

pub fn process_eth1_data<P: Preset>(
    state: &mut BeaconState<P>,
    body: &BeaconBlockBody<P>,
) -> Result<()> {
    state
        .eth1_data_votes
        .push(body.eth1_data)
        .map_err(Error::ListFull)?;

    let vote_count = state
        .eth1_data_votes
        .iter()
        .filter(|vote| **vote == body.eth1_data)
        .count();

    if vote_count * 2 > P::SlotsPerEth1VotingPeriod::USIZE {
        state.eth1_data = body.eth1_data;
    }

    Ok(())
}

pub fn validate_proposer_slashing<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    proposer_slashing: ProposerSlashing,
) -> Result<()> {
    validate_proposer_slashing_with_verifier(config, state, proposer_slashing, SingleVerifier)
}

pub fn validate_proposer_slashing_with_verifier<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    proposer_slashing: ProposerSlashing,
    mut verifier: impl Verifier,
) -> Result<()> {
    let header_1 = proposer_slashing.signed_header_1.message;
    let header_2 = proposer_slashing.signed_header_2.message;

    // > Verify header slots match
    ensure!(
        header_1.slot == header_2.slot,
        Error::ProposerSlashingSlotMismatch {
            slot_1: header_1.slot,
            slot_2: header_2.slot,
        },
    );

    // > Verify header proposer indices match
    ensure!(
        header_1.proposer_index == header_2.proposer_index,
        Error::ProposerSlashingProposerMismatch {
            proposer_index_1: header_1.proposer_index,
            proposer_index_2: header_2.proposer_index,
        },
    );

    // > Verify the headers are different
    ensure!(
        header_1 != header_2,
        Error::ProposerSlashingHeadersIdentical { header: header_1 },
    );

    // > Verify the proposer is slashable
    let index = header_1.proposer_index;
    let proposer = validator(state, index)?;

    ensure!(
        is_slashable_validator(proposer, get_current_epoch(state)),
        Error::ProposerNotSlashable {
            index,
            proposer: *proposer,
        },
    );

    // > Verify signatures
    for signed_header in [
        proposer_slashing.signed_header_1,
        proposer_slashing.signed_header_2,
    ] {
        verifier.verify_singular(
            signed_header.message.signing_root(config, state),
            signed_header.signature,
            proposer.pubkey,
            SignatureKind::Block,
        )?;
    }

    Ok(())
}

pub fn validate_attester_slashing<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    attester_slashing: &AttesterSlashing<P>,
) -> Result<Vec<ValidatorIndex>> {
    validate_attester_slashing_with_verifier(config, state, attester_slashing, SingleVerifier)
}

pub fn validate_attester_slashing_with_verifier<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    attester_slashing: &AttesterSlashing<P>,
    mut verifier: impl Verifier,
) -> Result<Vec<ValidatorIndex>> {
    let attestation_1 = &attester_slashing.attestation_1;
    let attestation_2 = &attester_slashing.attestation_2;

    let data_1 = attestation_1.data;
    let data_2 = attestation_2.data;

    ensure!(
        is_slashable_attestation_data(data_1, data_2),
        Error::AttestationDataNotSlashable { data_1, data_2 },
    );

    validate_indexed_attestation(config, state, attestation_1, &mut verifier)?;
    validate_indexed_attestation(config, state, attestation_2, verifier)?;

    let current_epoch = get_current_epoch(state);

    let slashable_indices = slashable_indices(attester_slashing)
        .filter(|attester_index| {
            let attester = validator(state, *attester_index)
                .expect("attester indices are validated in validate_indexed_attestation");

            is_slashable_validator(attester, current_epoch)
        })
        .collect_vec();

    ensure!(!slashable_indices.is_empty(), Error::NoAttestersSlashed);

    Ok(slashable_indices)
}

// Both index lists are sorted and unique by the time this is called,
// so the intersection can be computed with a single merging pass.
fn slashable_indices<'slashing, P: Preset>(
    attester_slashing: &'slashing AttesterSlashing<P>,
) -> impl Iterator<Item = ValidatorIndex> + 'slashing {
    let indices_1 = attester_slashing.attestation_1.attesting_indices.iter();
    let indices_2 = attester_slashing.attestation_2.attesting_indices.iter();

    indices_1
        .merge_join_by(indices_2, Ord::cmp)
        .filter_map(|either_or_both| match either_or_both {
            EitherOrBoth::Both(index, _) => Some(*index),
            _ => None,
        })
}

pub fn validate_attestation<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    attestation: &Attestation<P>,
) -> Result<()> {
    validate_attestation_with_verifier(config, state, attestation, SingleVerifier)
}

pub fn validate_attestation_with_verifier<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    attestation: &Attestation<P>,
    verifier: impl Verifier,
) -> Result<()> {
    let AttestationData {
        slot: attestation_slot,
        source,
        target,
        ..
    } = attestation.data;

    let current_epoch = get_current_epoch(state);
    let previous_epoch = get_previous_epoch(state);

    // Blocks cannot contain attestations from the future or epochs before the previous one.
    ensure!(
        target.epoch == previous_epoch || target.epoch == current_epoch,
        Error::AttestationTargetsIrrelevantEpoch {
            target_epoch: target.epoch,
            current_epoch,
        },
    );

    ensure!(
        target.epoch == compute_epoch_at_slot::<P>(attestation_slot),
        Error::AttestationTargetsWrongEpoch {
            data: attestation.data,
        },
    );

    let low_slot = attestation_slot + P::MIN_ATTESTATION_INCLUSION_DELAY;
    let high_slot = attestation_slot + P::SLOTS_PER_EPOCH;

    ensure!(
        (low_slot..=high_slot).contains(&state.slot),
        Error::AttestationOutsideInclusionRange {
            state_slot: state.slot,
            attestation_slot,
        },
    );

    let in_state = if target.epoch == current_epoch {
        state.current_justified_checkpoint
    } else {
        state.previous_justified_checkpoint
    };
    let in_block = source;

    ensure!(
        in_state == in_block,
        Error::AttestationSourceMismatch { in_state, in_block },
    );

    // > Verify signature
    validate_indexed_attestation(config, state, attestation, verifier)
}

pub fn validate_deposits<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    deposits: impl IntoIterator<Item = Deposit>,
) -> Result<Vec<CombinedDeposit>> {
    let mut combined_deposits = vec![];
    let mut positions = HashMap::new();

    for (position, deposit) in (0..).zip(deposits) {
        // > Verify the Merkle branch
        verify_deposit_merkle_branch(state, state.eth1_deposit_index + position, &deposit)?;

        let DepositData {
            pubkey,
            withdrawal_credentials,
            amount,
            signature,
        } = deposit.data;

        // Deposits with the same public key must be combined in order.
        // A top-up may target a validator created earlier in the same block.
        if let Some(combined_position) = positions.get(&pubkey) {
            match &mut combined_deposits[*combined_position] {
                CombinedDeposit::NewValidator { amounts, .. }
                | CombinedDeposit::TopUp { amounts, .. } => amounts.push(amount),
            }

            continue;
        }

        if let Some(validator_index) = index_of_public_key(state, pubkey) {
            positions.insert(pubkey, combined_deposits.len());

            combined_deposits.push(CombinedDeposit::TopUp {
                validator_index,
                amounts: vec![amount],
            });

            continue;
        }

        // > Verify the deposit signature (proof of possession)
        // > which is not checked by the deposit contract
        //
        // > Fork-agnostic domain since deposits are valid across forks
        //
        // A deposit with an invalid signature does not invalidate the block.
        // It is skipped and only advances the deposit index.
        if deposit.data.message().verify(config, signature, pubkey).is_ok() {
            positions.insert(pubkey, combined_deposits.len());

            combined_deposits.push(CombinedDeposit::NewValidator {
                pubkey,
                withdrawal_credentials,
                amounts: vec![amount],
            });
        }
    }

    Ok(combined_deposits)
}

pub fn verify_deposit_merkle_branch<P: Preset>(
    state: &BeaconState<P>,
    eth1_deposit_index: DepositIndex,
    deposit: &Deposit,
) -> Result<()> {
    ensure!(
        is_valid_merkle_branch(
            deposit.data.tree_hash_root(),
            deposit.proof.iter().copied(),
            eth1_deposit_index,
            state.eth1_data.deposit_root,
        ),
        Error::DepositProofInvalid {
            deposit: Box::new(deposit.clone()),
        },
    );

    Ok(())
}

pub fn process_voluntary_exit<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    signed_voluntary_exit: SignedVoluntaryExit,
    verifier: impl Verifier,
) -> Result<()> {
    validate_voluntary_exit_with_verifier(config, state, signed_voluntary_exit, verifier)?;

    // > Initiate exit
    initiate_validator_exit(config, state, signed_voluntary_exit.message.validator_index)
}

pub fn validate_voluntary_exit<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    signed_voluntary_exit: SignedVoluntaryExit,
) -> Result<()> {
    validate_voluntary_exit_with_verifier(config, state, signed_voluntary_exit, SingleVerifier)
}

pub fn validate_voluntary_exit_with_verifier<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    signed_voluntary_exit: SignedVoluntaryExit,
    mut verifier: impl Verifier,
) -> Result<()> {
    let voluntary_exit = signed_voluntary_exit.message;
    let index = voluntary_exit.validator_index;
    let validator = validator(state, index)?;
    let current_epoch = get_current_epoch(state);

    // > Verify the validator is active
    ensure!(
        is_active_validator(validator, current_epoch),
        Error::ValidatorNotActive {
            index,
            validator: *validator,
            current_epoch,
        },
    );

    // > Verify exit has not been initiated
    ensure!(
        validator.exit_epoch == FAR_FUTURE_EPOCH,
        Error::ValidatorAlreadyExited {
            index,
            exit_epoch: validator.exit_epoch,
        },
    );

    // > Exits must specify an epoch when they become valid; they are not valid before then
    ensure!(
        current_epoch >= voluntary_exit.epoch,
        Error::VoluntaryExitIsExpired {
            current_epoch,
            epoch: voluntary_exit.epoch,
        },
    );

    // > Verify the validator has been active long enough
    ensure!(
        current_epoch >= validator.activation_epoch + config.shard_committee_period,
        Error::ValidatorHasNotBeenActiveLongEnough {
            index,
            activation_epoch: validator.activation_epoch,
            current_epoch,
        },
    );

    // > Verify signature
    verifier.verify_singular(
        voluntary_exit.signing_root(config, state),
        signed_voluntary_exit.signature,
        validator.pubkey,
        SignatureKind::VoluntaryExit,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use types::{phase0::containers::Eth1Data, preset::Minimal};

    use super::*;

    #[test]
    fn process_block_header_for_gossip_rejects_stale_block() {
        let state = BeaconState::<Minimal>::default();
        let block = BeaconBlock::default();

        let error = process_block_header_for_gossip(&state, &block)
            .expect_err("block is not newer than the latest block header")
            .downcast::<Error>()
            .expect("error is a block processing error");

        assert!(matches!(
            error,
            Error::BlockNotNewerThanLatestBlockHeader { .. },
        ));
    }

    #[test]
    fn process_block_header_for_gossip_rejects_mismatched_slot() {
        let state = BeaconState::<Minimal>::default();

        let block = BeaconBlock {
            slot: 1,
            ..BeaconBlock::default()
        };

        let error = process_block_header_for_gossip(&state, &block)
            .expect_err("block slot does not match state slot")
            .downcast::<Error>()
            .expect("error is a block processing error");

        assert!(matches!(error, Error::SlotMismatch { .. }));
    }

    // `SlotsPerEth1VotingPeriod` is 32 in the minimal preset.
    // A vote becomes the canonical `eth1_data` once it has a strict majority.
    #[test]
    fn process_eth1_data_adopts_majority_vote() -> Result<()> {
        let mut state = BeaconState::<Minimal>::default();

        let vote = Eth1Data {
            deposit_root: H256::repeat_byte(1),
            deposit_count: 16,
            block_hash: H256::repeat_byte(2),
        };

        let body = BeaconBlockBody {
            eth1_data: vote,
            ..BeaconBlockBody::default()
        };

        for _ in 0..16 {
            process_eth1_data(&mut state, &body)?;
            assert_ne!(state.eth1_data, vote);
        }

        process_eth1_data(&mut state, &body)?;
        assert_eq!(state.eth1_data, vote);

        Ok(())
    }
}
