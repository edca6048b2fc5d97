/// Publishing side of the handoff: writes category snapshots into gauges
use log::{debug, info};

use crate::lifecycle::Shutdown;
use crate::metrics::gauges::Gauges;
use crate::models::PendingBatch;
use crate::pipeline::Handoff;

pub struct Publisher {
    gauges: Gauges,
}

impl Publisher {
    pub fn new(gauges: Gauges) -> Self {
        Self { gauges }
    }

    /// Write a batch's totals into the gauge slots bound to its category
    pub fn publish(&self, batch: &PendingBatch) {
        let (primary, secondary) = self.gauges.slots(batch.category);

        primary.set(clamp(batch.values.sum_primary));
        if let (Some(gauge), Some(value)) = (secondary, batch.values.sum_secondary) {
            gauge.set(clamp(value));
        }

        debug!("{} gauges set to {:?}", batch.category, batch.values);
    }

    /// Publishing loop: wake on new batches, publish all of them, repeat
    ///
    /// Returns once `shutdown` fires and everything already queued has been
    /// written.
    pub async fn run(&self, handoff: &Handoff, shutdown: &Shutdown) {
        info!("Publisher waiting for batches");

        while let Some(batches) = handoff.wait_and_drain(shutdown).await {
            debug!("Publisher woke with {} batch(es)", batches.len());
            for batch in &batches {
                self.publish(batch);
            }
        }

        info!("Publisher stopped");
    }
}

// Gauges are i64; totals beyond that are pinned at the maximum
fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
