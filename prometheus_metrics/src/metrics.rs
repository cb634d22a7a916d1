use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::OnceCell;
use prometheus::{histogram_opts, Histogram, IntGauge};
use types::phase0::primitives::{Epoch, Slot};

/// Initialized once at startup by the binary that opts into metrics.
/// Library code treats a missing value as metrics being disabled.
pub static METRICS: OnceCell<Arc<Metrics>> = OnceCell::new();

#[derive(Debug)]
pub struct Metrics {
    // Overview
    beacon_head_slot: IntGauge,
    beacon_current_justified_epoch: IntGauge,
    beacon_finalized_epoch: IntGauge,
    validator_count: IntGauge,

    // State transitions
    pub block_transition_times: Histogram,
    pub epoch_processing_times: Histogram,

    // Backfill
    pub back_sync_verification_times: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        Ok(Self {
            beacon_head_slot: IntGauge::new("beacon_head_slot", "Slot of the most recent head")?,

            beacon_current_justified_epoch: IntGauge::new(
                "beacon_current_justified_epoch",
                "Current justified epoch",
            )?,

            beacon_finalized_epoch: IntGauge::new("beacon_finalized_epoch", "Finalized epoch")?,

            validator_count: IntGauge::new(
                "validator_count",
                "Number of validators in the registry",
            )?,

            block_transition_times: Histogram::with_opts(histogram_opts!(
                "block_transition_times",
                "Block state transition times",
            ))?,

            epoch_processing_times: Histogram::with_opts(histogram_opts!(
                "epoch_processing_times",
                "Epoch processing times",
            ))?,

            back_sync_verification_times: Histogram::with_opts(histogram_opts!(
                "back_sync_verification_times",
                "Backfill batch verification times",
            ))?,
        })
    }

    pub fn register_with_default_metrics(&self) -> Result<()> {
        let default_registry = prometheus::default_registry();

        default_registry.register(Box::new(self.beacon_head_slot.clone()))?;
        default_registry.register(Box::new(self.beacon_current_justified_epoch.clone()))?;
        default_registry.register(Box::new(self.beacon_finalized_epoch.clone()))?;
        default_registry.register(Box::new(self.validator_count.clone()))?;
        default_registry.register(Box::new(self.block_transition_times.clone()))?;
        default_registry.register(Box::new(self.epoch_processing_times.clone()))?;
        default_registry.register(Box::new(self.back_sync_verification_times.clone()))?;

        Ok(())
    }

    pub fn set_beacon_head_slot(&self, slot: Slot) {
        self.beacon_head_slot.set(slot as i64);
    }

    pub fn set_beacon_current_justified_epoch(&self, epoch: Epoch) {
        self.beacon_current_justified_epoch.set(epoch as i64);
    }

    pub fn set_beacon_finalized_epoch(&self, epoch: Epoch) {
        self.beacon_finalized_epoch.set(epoch as i64);
    }

    pub fn set_validator_count(&self, validator_count: usize) {
        self.validator_count.set(validator_count as i64);
    }
}
