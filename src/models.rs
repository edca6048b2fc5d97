use std::fmt;

/// Reporting channel of the sensor, identified by the uplink port number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Port 1: Wi-Fi and Bluetooth device counters
    CombinedCounter,
    /// Port 8: battery or USB voltage in mV
    BatteryVoltage,
    /// Port 13: list of Wi-Fi identifiers
    WifiScan,
    /// Port 14: list of Bluetooth identifiers
    BluetoothScan,
}

impl Category {
    pub fn from_port(port: i64) -> Option<Self> {
        match port {
            1 => Some(Category::CombinedCounter),
            8 => Some(Category::BatteryVoltage),
            13 => Some(Category::WifiScan),
            14 => Some(Category::BluetoothScan),
            _ => None,
        }
    }

    pub fn port(self) -> u8 {
        match self {
            Category::CombinedCounter => 1,
            Category::BatteryVoltage => 8,
            Category::WifiScan => 13,
            Category::BluetoothScan => 14,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::CombinedCounter => "combined-counter",
            Category::BatteryVoltage => "battery-voltage",
            Category::WifiScan => "wifi-scan",
            Category::BluetoothScan => "bluetooth-scan",
        };
        write!(f, "{} (port {})", name, self.port())
    }
}

/// Values carried by a single decoded report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawValues {
    pub primary: u64,
    pub secondary: Option<u64>,
}

/// Running sums for one category since process start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CumulativeTotals {
    pub sum_primary: u64,
    pub sum_secondary: Option<u64>,
}

/// Snapshot of a category's totals on its way to the gauges
///
/// Built by the ingestion path after each applied report and owned by the
/// handoff queue until the publisher takes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingBatch {
    pub category: Category,
    pub values: CumulativeTotals,
}
