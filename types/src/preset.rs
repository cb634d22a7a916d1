use core::fmt::Debug;
use core::hash::Hash;

use typenum::{
    Unsigned, U1024, U1099511627776, U128, U16, U16777216, U2, U2048, U32, U4096, U64, U65536,
    U8192,
};

/// Compile-time preset of the chain.
///
/// List length limits are `typenum` unsigned integers because SSZ collection
/// types carry their maximum lengths in the type system. Limits that are only
/// ever used as numbers are plain constants.
pub trait Preset: Copy + Eq + Ord + Hash + Default + Debug + Send + Sync + 'static {
    type EpochAttestationsLimit: Unsigned + Clone + Copy + Default + Eq + Hash + Debug + Send + Sync + 'static;
    type EpochsPerHistoricalVector: Unsigned + Clone + Copy + Default + Eq + Hash + Debug + Send + Sync + 'static;
    type EpochsPerSlashingsVector: Unsigned + Clone + Copy + Default + Eq + Hash + Debug + Send + Sync + 'static;
    type HistoricalRootsLimit: Unsigned + Clone + Copy + Default + Eq + Hash + Debug + Send + Sync + 'static;
    type MaxAttestations: Unsigned + Clone + Copy + Default + Eq + Hash + Debug + Send + Sync + 'static;
    type MaxAttesterSlashings: Unsigned + Clone + Copy + Default + Eq + Hash + Debug + Send + Sync + 'static;
    type MaxDeposits: Unsigned + Clone + Copy + Default + Eq + Hash + Debug + Send + Sync + 'static;
    type MaxProposerSlashings: Unsigned + Clone + Copy + Default + Eq + Hash + Debug + Send + Sync + 'static;
    type MaxValidatorsPerCommittee: Unsigned + Clone + Copy + Default + Eq + Hash + Debug + Send + Sync + 'static;
    type MaxVoluntaryExits: Unsigned + Clone + Copy + Default + Eq + Hash + Debug + Send + Sync + 'static;
    type SlotsPerEth1VotingPeriod: Unsigned + Clone + Copy + Default + Eq + Hash + Debug + Send + Sync + 'static;
    type SlotsPerHistoricalRoot: Unsigned + Clone + Copy + Default + Eq + Hash + Debug + Send + Sync + 'static;
    type ValidatorRegistryLimit: Unsigned + Clone + Copy + Default + Eq + Hash + Debug + Send + Sync + 'static;

    const EFFECTIVE_BALANCE_INCREMENT: u64;
    const EPOCHS_PER_ETH1_VOTING_PERIOD: u64;
    const HYSTERESIS_DOWNWARD_MULTIPLIER: u64 = 1;
    const HYSTERESIS_QUOTIENT: u64 = 4;
    const HYSTERESIS_UPWARD_MULTIPLIER: u64 = 5;
    const MAX_EFFECTIVE_BALANCE: u64;
    const MAX_SEED_LOOKAHEAD: u64 = 4;
    const MIN_ATTESTATION_INCLUSION_DELAY: u64 = 1;
    const MIN_DEPOSIT_AMOUNT: u64;
    const MIN_EPOCHS_TO_INACTIVITY_PENALTY: u64 = 4;
    const MIN_SEED_LOOKAHEAD: u64 = 1;
    const MIN_SLASHING_PENALTY_QUOTIENT: u64;
    const MIN_VALIDATOR_WITHDRAWABILITY_DELAY: u64;
    const PROPORTIONAL_SLASHING_MULTIPLIER: u64 = 1;
    const PROPOSER_REWARD_QUOTIENT: u64 = 8;
    const SHUFFLE_ROUND_COUNT: u8;
    const SLOTS_PER_EPOCH: u64;
    const WHISTLEBLOWER_REWARD_QUOTIENT: u64 = 512;
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Mainnet;

impl Preset for Mainnet {
    type EpochAttestationsLimit = U4096;
    type EpochsPerHistoricalVector = U65536;
    type EpochsPerSlashingsVector = U8192;
    type HistoricalRootsLimit = U16777216;
    type MaxAttestations = U128;
    type MaxAttesterSlashings = U2;
    type MaxDeposits = U16;
    type MaxProposerSlashings = U16;
    type MaxValidatorsPerCommittee = U2048;
    type MaxVoluntaryExits = U16;
    type SlotsPerEth1VotingPeriod = U2048;
    type SlotsPerHistoricalRoot = U8192;
    type ValidatorRegistryLimit = U1099511627776;

    const EFFECTIVE_BALANCE_INCREMENT: u64 = 1_000_000_000;
    const EPOCHS_PER_ETH1_VOTING_PERIOD: u64 = 64;
    const MAX_EFFECTIVE_BALANCE: u64 = 32_000_000_000;
    const MIN_DEPOSIT_AMOUNT: u64 = 1_000_000_000;
    const MIN_SLASHING_PENALTY_QUOTIENT: u64 = 128;
    const MIN_VALIDATOR_WITHDRAWABILITY_DELAY: u64 = 256;
    const SHUFFLE_ROUND_COUNT: u8 = 90;
    const SLOTS_PER_EPOCH: u64 = 32;
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Minimal;

impl Preset for Minimal {
    type EpochAttestationsLimit = U1024;
    type EpochsPerHistoricalVector = U64;
    type EpochsPerSlashingsVector = U64;
    type HistoricalRootsLimit = U16777216;
    type MaxAttestations = U128;
    type MaxAttesterSlashings = U2;
    type MaxDeposits = U16;
    type MaxProposerSlashings = U16;
    type MaxValidatorsPerCommittee = U2048;
    type MaxVoluntaryExits = U16;
    type SlotsPerEth1VotingPeriod = U32;
    type SlotsPerHistoricalRoot = U64;
    type ValidatorRegistryLimit = U1099511627776;

    const EFFECTIVE_BALANCE_INCREMENT: u64 = 1_000_000_000;
    const EPOCHS_PER_ETH1_VOTING_PERIOD: u64 = 4;
    const MAX_EFFECTIVE_BALANCE: u64 = 32_000_000_000;
    const MIN_DEPOSIT_AMOUNT: u64 = 1_000_000_000;
    const MIN_SLASHING_PENALTY_QUOTIENT: u64 = 64;
    const MIN_VALIDATOR_WITHDRAWABILITY_DELAY: u64 = 256;
    const SHUFFLE_ROUND_COUNT: u8 = 10;
    const SLOTS_PER_EPOCH: u64 = 8;
}
