use log::warn;

use crate::models::{Category, CumulativeTotals, RawValues};

/// Running sums for every category since process start
///
/// Owned by the ingestion path only; the publisher never reads it, it gets
/// copies through the handoff queue instead.
#[derive(Debug, Default)]
pub struct Accumulator {
    wifi_ids: u64,
    bt_ids: u64,
    // Shared by Wi-Fi and Bluetooth scans: both report the same sensor buffer overflow
    unsent_ids: u64,
    wifi_count: u64,
    ble_count: u64,
    voltage: u64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one decoded report to the running sums of its category
    ///
    /// # Returns
    /// The new totals of `category` only
    pub fn apply(&mut self, category: Category, raw: RawValues) -> CumulativeTotals {
        let secondary = raw.secondary.unwrap_or(0);

        match category {
            Category::WifiScan => {
                add(&mut self.wifi_ids, raw.primary, "wifi_ids");
                add(&mut self.unsent_ids, secondary, "unsent_ids");
            }
            Category::BluetoothScan => {
                add(&mut self.bt_ids, raw.primary, "bt_ids");
                add(&mut self.unsent_ids, secondary, "unsent_ids");
            }
            Category::CombinedCounter => {
                add(&mut self.wifi_count, raw.primary, "wifi_count");
                add(&mut self.ble_count, secondary, "ble_count");
            }
            Category::BatteryVoltage => add(&mut self.voltage, raw.primary, "voltage"),
        }

        self.totals(category)
    }

    /// Current totals of a category without changing anything
    pub fn totals(&self, category: Category) -> CumulativeTotals {
        let (sum_primary, sum_secondary) = match category {
            Category::WifiScan => (self.wifi_ids, Some(self.unsent_ids)),
            Category::BluetoothScan => (self.bt_ids, Some(self.unsent_ids)),
            Category::CombinedCounter => (self.wifi_count, Some(self.ble_count)),
            Category::BatteryVoltage => (self.voltage, None),
        };
        CumulativeTotals {
            sum_primary,
            sum_secondary,
        }
    }
}

// Sums never wrap: a saturated counter stays at u64::MAX until restart.
fn add(sum: &mut u64, value: u64, name: &str) {
    match sum.checked_add(value) {
        Some(next) => *sum = next,
        None => {
            warn!("Counter {} saturated at {}", name, u64::MAX);
            *sum = u64::MAX;
        }
    }
}
