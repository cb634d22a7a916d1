use anyhow::{ensure, Result};
use helper_functions::{
    accessors::{get_beacon_proposer_index, get_current_epoch, index_of_public_key},
    misc::prev_multiple_of,
    mutators::{balance, increase_balance, slash_validator},
    signing::SignForAllForks as _,
    verifier::Verifier,
};
use prometheus_metrics::METRICS;
use typenum::Unsigned as _;
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        consts::FAR_FUTURE_EPOCH,
        containers::{
            Attestation, AttesterSlashing, BeaconBlock, BeaconBlockBody, DepositData,
            PendingAttestation, ProposerSlashing, Validator,
        },
        primitives::{DepositIndex, ValidatorIndex},
    },
    preset::Preset,
};

use crate::unphased::{self, CombinedDeposit, Error};

pub fn process_block<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    block: &BeaconBlock<P>,
    mut verifier: impl Verifier,
) -> Result<()> {
    let _timer = METRICS
        .get()
        .map(|metrics| metrics.block_transition_times.start_timer());

    verifier.reserve(count_required_signatures(block));
    custom_process_block(config, state, block, &mut verifier)?;
    verifier.finish()
}

pub fn custom_process_block<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    block: &BeaconBlock<P>,
    mut verifier: impl Verifier,
) -> Result<()> {
    debug_assert_eq!(state.slot, block.slot);

    unphased::process_block_header(state, block)?;
    unphased::process_randao(config, state, &block.body, &mut verifier)?;
    unphased::process_eth1_data(state, &block.body)?;

    process_operations(config, state, &block.body, verifier)
}

pub fn count_required_signatures<P: Preset>(block: &BeaconBlock<P>) -> usize {
    let body = &block.body;

    1 + 2 * body.proposer_slashings.len()
        + 2 * body.attester_slashings.len()
        + body.attestations.len()
        + body.voluntary_exits.len()
}

fn process_operations<P: Preset, V: Verifier>(
    config: &Config,
    state: &mut BeaconState<P>,
    body: &BeaconBlockBody<P>,
    mut verifier: V,
) -> Result<()> {
    // > Verify that outstanding deposits are processed up to the maximum number of deposits
    let computed =
        P::MaxDeposits::U64.min(state.eth1_data.deposit_count - state.eth1_deposit_index);
    let in_block = u64::try_from(body.deposits.len())?;

    ensure!(
        computed == in_block,
        Error::DepositCountMismatch { computed, in_block },
    );

    for proposer_slashing in body.proposer_slashings.iter().copied() {
        process_proposer_slashing(config, state, proposer_slashing, &mut verifier)?;
    }

    for attester_slashing in &body.attester_slashings {
        process_attester_slashing(config, state, attester_slashing, &mut verifier)?;
    }

    for attestation in &body.attestations {
        unphased::validate_attestation_with_verifier(config, state, attestation, &mut verifier)?;
    }

    for attestation in &body.attestations {
        apply_attestation(state, attestation)?;
    }

    // The conditional is not needed for correctness.
    // It only serves to avoid overhead when processing blocks with no deposits.
    if !body.deposits.is_empty() {
        let combined_deposits =
            unphased::validate_deposits(config, state, body.deposits.iter().cloned())?;

        apply_deposits(state, body.deposits.len(), combined_deposits)?;
    }

    for voluntary_exit in body.voluntary_exits.iter().copied() {
        unphased::process_voluntary_exit(config, state, voluntary_exit, &mut verifier)?;
    }

    Ok(())
}

fn process_proposer_slashing<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    proposer_slashing: ProposerSlashing,
    verifier: impl Verifier,
) -> Result<()> {
    unphased::validate_proposer_slashing_with_verifier(config, state, proposer_slashing, verifier)?;

    let index = proposer_slashing.signed_header_1.message.proposer_index;

    slash_validator(config, state, index, None)
}

fn process_attester_slashing<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    attester_slashing: &AttesterSlashing<P>,
    verifier: impl Verifier,
) -> Result<()> {
    let slashable_indices =
        unphased::validate_attester_slashing_with_verifier(config, state, attester_slashing, verifier)?;

    for validator_index in slashable_indices {
        slash_validator(config, state, validator_index, None)?;
    }

    Ok(())
}

fn apply_attestation<P: Preset>(
    state: &mut BeaconState<P>,
    attestation: &Attestation<P>,
) -> Result<()> {
    let pending_attestation = PendingAttestation {
        attesting_indices: attestation.attesting_indices.clone(),
        data: attestation.data,
        inclusion_delay: state.slot - attestation.data.slot,
        proposer_index: get_beacon_proposer_index(state)?,
    };

    if attestation.data.target.epoch == get_current_epoch(state) {
        state
            .current_epoch_attestations
            .push(pending_attestation)
            .map_err(Error::ListFull)?;
    } else {
        state
            .previous_epoch_attestations
            .push(pending_attestation)
            .map_err(Error::ListFull)?;
    }

    Ok(())
}

/// Processes a single deposit outside a block, skipping proof verification.
///
/// Used during genesis, where deposits come straight from the deposit
/// contract and carry no Merkle proofs yet.
pub fn process_deposit_data<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    deposit_data: DepositData,
) -> Result<Option<ValidatorIndex>> {
    let DepositData {
        pubkey,
        withdrawal_credentials,
        amount,
        signature,
    } = deposit_data;

    if let Some(validator_index) = index_of_public_key(state, pubkey) {
        let combined_deposit = CombinedDeposit::TopUp {
            validator_index,
            amounts: vec![amount],
        };

        apply_deposits(state, 1, core::iter::once(combined_deposit))?;

        return Ok(Some(validator_index));
    }

    // > Verify the deposit signature (proof of possession)
    // > which is not checked by the deposit contract
    //
    // > Fork-agnostic domain since deposits are valid across forks
    if deposit_data.message().verify(config, signature, pubkey).is_ok() {
        let validator_index = u64::try_from(state.validators.len())?;

        let combined_deposit = CombinedDeposit::NewValidator {
            pubkey,
            withdrawal_credentials,
            amounts: vec![amount],
        };

        apply_deposits(state, 1, core::iter::once(combined_deposit))?;

        return Ok(Some(validator_index));
    }

    apply_deposits(state, 1, core::iter::empty())?;

    Ok(None)
}

fn apply_deposits<P: Preset>(
    state: &mut BeaconState<P>,
    deposit_count: usize,
    combined_deposits: impl IntoIterator<Item = CombinedDeposit>,
) -> Result<()> {
    // > Deposits must be processed in order
    state.eth1_deposit_index += DepositIndex::try_from(deposit_count)?;

    for combined_deposit in combined_deposits {
        match combined_deposit {
            // > Add validator and balance entries
            CombinedDeposit::NewValidator {
                pubkey,
                withdrawal_credentials,
                amounts,
            } => {
                let first_amount = amounts[0];
                let total_amount = amounts.iter().sum();

                let effective_balance =
                    prev_multiple_of(first_amount, P::EFFECTIVE_BALANCE_INCREMENT)
                        .min(P::MAX_EFFECTIVE_BALANCE);

                let validator = Validator {
                    pubkey,
                    withdrawal_credentials,
                    effective_balance,
                    slashed: false,
                    activation_eligibility_epoch: FAR_FUTURE_EPOCH,
                    activation_epoch: FAR_FUTURE_EPOCH,
                    exit_epoch: FAR_FUTURE_EPOCH,
                    withdrawable_epoch: FAR_FUTURE_EPOCH,
                };

                state.validators.push(validator).map_err(Error::ListFull)?;
                state.balances.push(total_amount).map_err(Error::ListFull)?;
            }
            // > Increase balance by deposit amount
            CombinedDeposit::TopUp {
                validator_index,
                amounts,
            } => {
                let total_amount = amounts.into_iter().sum();

                increase_balance(balance(state, validator_index)?, total_amount);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use bls::{SecretKey, SignatureBytes};
    use helper_functions::signing::SignForAllForks as _;
    use types::{
        phase0::{containers::DepositMessage, primitives::H256},
        preset::{Minimal, Preset as _},
    };

    use super::*;

    #[test]
    fn process_deposit_data_creates_tops_up_and_skips_validators() -> Result<()> {
        let config = Config::minimal();
        let mut state = BeaconState::<Minimal>::default();

        let secret_key = secret_key();
        let pubkey = secret_key.to_public_key().into();
        let withdrawal_credentials = H256::repeat_byte(1);
        let amount = Minimal::MAX_EFFECTIVE_BALANCE;

        let message = DepositMessage {
            pubkey,
            withdrawal_credentials,
            amount,
        };

        let deposit_data = DepositData {
            pubkey,
            withdrawal_credentials,
            amount,
            signature: message.sign(&config, &secret_key).into(),
        };

        // A valid deposit for an unknown public key creates a validator.
        assert_eq!(process_deposit_data(&config, &mut state, deposit_data)?, Some(0));
        assert_eq!(state.validators.len(), 1);
        assert_eq!(state.balances[0], amount);
        assert_eq!(state.validators[0].effective_balance, amount);
        assert_eq!(state.eth1_deposit_index, 1);

        // A further deposit for the same public key tops up the balance
        // without checking the signature.
        let top_up = DepositData {
            amount: Minimal::EFFECTIVE_BALANCE_INCREMENT,
            signature: SignatureBytes::empty(),
            ..deposit_data
        };

        assert_eq!(process_deposit_data(&config, &mut state, top_up)?, Some(0));
        assert_eq!(state.validators.len(), 1);
        assert_eq!(
            state.balances[0],
            amount + Minimal::EFFECTIVE_BALANCE_INCREMENT,
        );
        assert_eq!(state.eth1_deposit_index, 2);

        // A deposit with an invalid signature for an unknown public key
        // advances the deposit index without creating a validator.
        let other_pubkey = other_secret_key().to_public_key().into();

        let invalid = DepositData {
            pubkey: other_pubkey,
            signature: SignatureBytes::empty(),
            ..deposit_data
        };

        assert_eq!(process_deposit_data(&config, &mut state, invalid)?, None);
        assert_eq!(state.validators.len(), 1);
        assert_eq!(state.eth1_deposit_index, 3);

        Ok(())
    }

    fn secret_key() -> SecretKey {
        (*b"????????????????????????????????")
            .try_into()
            .expect("bytes encode a valid secret key")
    }

    fn other_secret_key() -> SecretKey {
        (*b"!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!")
            .try_into()
            .expect("bytes encode a valid secret key")
    }
}
