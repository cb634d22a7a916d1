use ssz_derive::{Decode, Encode};
use ssz_types::{BitVector, FixedVector, VariableList};
use tree_hash_derive::TreeHash;

use crate::{
    phase0::{
        consts::JustificationBitsLength,
        containers::{
            BeaconBlockHeader, Checkpoint, Eth1Data, Fork, PendingAttestation, Validator,
        },
        primitives::{DepositIndex, Gwei, Slot, UnixSeconds, H256},
    },
    preset::Preset,
};

// `FixedVector` only implements `PartialEq`, so `Eq` cannot be derived here.
#[derive(Clone, PartialEq, Default, Debug, Encode, Decode, TreeHash)]
pub struct BeaconState<P: Preset> {
    // Versioning
    pub genesis_time: UnixSeconds,
    pub genesis_validators_root: H256,
    pub slot: Slot,
    pub fork: Fork,

    // History
    pub latest_block_header: BeaconBlockHeader,
    pub block_roots: FixedVector<H256, P::SlotsPerHistoricalRoot>,
    pub state_roots: FixedVector<H256, P::SlotsPerHistoricalRoot>,
    pub historical_roots: VariableList<H256, P::HistoricalRootsLimit>,

    // Eth1
    pub eth1_data: Eth1Data,
    pub eth1_data_votes: VariableList<Eth1Data, P::SlotsPerEth1VotingPeriod>,
    pub eth1_deposit_index: DepositIndex,

    // Registry
    pub validators: VariableList<Validator, P::ValidatorRegistryLimit>,
    pub balances: VariableList<Gwei, P::ValidatorRegistryLimit>,

    // Randomness
    pub randao_mixes: FixedVector<H256, P::EpochsPerHistoricalVector>,

    // Slashings
    pub slashings: FixedVector<Gwei, P::EpochsPerSlashingsVector>,

    // Attestations
    pub previous_epoch_attestations: VariableList<PendingAttestation<P>, P::EpochAttestationsLimit>,
    pub current_epoch_attestations: VariableList<PendingAttestation<P>, P::EpochAttestationsLimit>,

    // Finality
    pub justification_bits: BitVector<JustificationBitsLength>,
    pub previous_justified_checkpoint: Checkpoint,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
}
