use core::num::NonZeroU64;
use std::borrow::Cow;

use hex_literal::hex;
use nonzero_ext::nonzero;

use crate::{
    nonstandard::Phase,
    phase0::primitives::{Epoch, Gwei, Slot, UnixSeconds, Version},
    preset::Preset,
};

/// Runtime chain configuration.
///
/// Only the variables this subsystem needs are present. Preset-level
/// constants live in [`Preset`](crate::preset::Preset).
#[derive(Clone, Debug)]
pub struct Config {
    // Meta
    pub config_name: Cow<'static, str>,

    // Genesis
    pub genesis_delay: u64,
    pub genesis_fork_version: Version,
    pub min_genesis_active_validator_count: NonZeroU64,
    pub min_genesis_time: UnixSeconds,

    // Time parameters
    pub shard_committee_period: u64,

    // Validator cycle
    pub churn_limit_quotient: NonZeroU64,
    pub ejection_balance: Gwei,
    pub min_per_epoch_churn_limit: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self::mainnet()
    }
}

impl Config {
    /// [Mainnet configuration](https://github.com/eth-clients/mainnet/blob/main/metadata/config.yaml).
    #[must_use]
    pub fn mainnet() -> Self {
        Self {
            config_name: Cow::Borrowed("mainnet"),
            genesis_delay: 604_800,
            genesis_fork_version: hex!("00000000"),
            min_genesis_active_validator_count: nonzero!(16_384_u64),
            min_genesis_time: 1_606_824_000,
            shard_committee_period: 256,
            churn_limit_quotient: nonzero!(65_536_u64),
            ejection_balance: 16_000_000_000,
            min_per_epoch_churn_limit: 4,
        }
    }

    /// [Minimal configuration](https://github.com/ethereum/consensus-specs/blob/master/configs/minimal.yaml).
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            config_name: Cow::Borrowed("minimal"),
            genesis_delay: 300,
            genesis_fork_version: hex!("00000001"),
            min_genesis_active_validator_count: nonzero!(64_u64),
            min_genesis_time: 1_578_009_600,
            shard_committee_period: 64,
            churn_limit_quotient: nonzero!(32_u64),
            ejection_balance: 16_000_000_000,
            min_per_epoch_churn_limit: 2,
        }
    }

    #[must_use]
    pub const fn version(&self, phase: Phase) -> Version {
        match phase {
            Phase::Phase0 => self.genesis_fork_version,
        }
    }

    // Fork dispatch is keyed by epoch boundaries. New phases become new
    // `Phase` variants with their own fork epochs and match arms here.
    #[must_use]
    pub const fn phase_at_epoch(&self, _epoch: Epoch) -> Phase {
        Phase::Phase0
    }

    #[must_use]
    pub const fn phase_at_slot<P: Preset>(&self, slot: Slot) -> Phase {
        self.phase_at_epoch(slot / P::SLOTS_PER_EPOCH)
    }
}
