pub mod combined;

pub mod unphased {
    pub use block_processing::{
        process_block_header_for_gossip, validate_attestation, validate_attester_slashing,
        validate_attester_slashing_with_verifier, validate_proposer_slashing,
        validate_voluntary_exit, validate_voluntary_exit_with_verifier,
    };
    pub use error::Error;
    pub use slot_processing::{process_slot, ProcessSlots};
    pub use state_transition::StateRootPolicy;

    pub(crate) use block_processing::{
        process_block_header, process_eth1_data, process_randao, process_voluntary_exit,
        validate_attestation_with_verifier, validate_deposits,
        validate_proposer_slashing_with_verifier, CombinedDeposit,
    };
    pub(crate) use epoch_processing::{
        process_effective_balance_updates, process_eth1_data_reset,
        process_historical_roots_update, process_randao_mixes_reset, process_registry_updates,
        process_slashings_reset, should_process_justification_and_finalization,
        weigh_justification_and_finalization,
    };

    mod block_processing;
    mod epoch_processing;
    mod error;
    mod slot_processing;
    mod state_transition;
}

pub mod phase0 {
    pub use block_processing::{count_required_signatures, process_block, process_deposit_data};
    pub use epoch_processing::{process_epoch, process_justification_and_finalization};
    pub use slot_processing::process_slots;
    pub use state_transition::{state_transition, verify_signatures};

    mod block_processing;
    mod epoch_processing;
    mod slot_processing;
    mod state_transition;
}
