use prometheus::{IntGauge, Registry};

use crate::models::Category;

/// The six exported gauges, registered in a registry owned by the caller
#[derive(Clone)]
pub struct Gauges {
    pub sum_wifi_ids: IntGauge,
    pub sum_bt_ids: IntGauge,
    pub battery_voltage: IntGauge,
    pub unsent_ids: IntGauge,
    pub wifi_count: IntGauge,
    pub ble_count: IntGauge,
}

impl Gauges {
    /// Create every gauge and register it in `registry`
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let gauges = Gauges {
            sum_wifi_ids: IntGauge::new(
                "paxcounter_sum_wifi_ids_collected_gauge",
                "Sum of all Wifi IDs collected by Paxcounter since the first SENDCYCLE",
            )?,
            sum_bt_ids: IntGauge::new(
                "paxcounter_sum_bt_ids_collected_gauge",
                "Sum of all Bluetooth IDs collected by Paxcounter since the first SENDCYCLE",
            )?,
            battery_voltage: IntGauge::new(
                "paxcounter_battery_voltage_data_gauge",
                "Battery or USB voltage [mV], summed over all reports",
            )?,
            unsent_ids: IntGauge::new(
                "paxcounter_number_unsent_ids_gauge",
                "Number of IDs that could not be sent due to buffer size limit",
            )?,
            wifi_count: IntGauge::new(
                "paxcounter_wifi_count_fp1_gauge",
                "Number of Wifi seen devices collected by Paxcounter, summed over SENDCYCLEs",
            )?,
            ble_count: IntGauge::new(
                "paxcounter_ble_count_fp1_gauge",
                "Number of Bluetooth seen devices collected by Paxcounter, summed over SENDCYCLEs",
            )?,
        };

        for gauge in [
            &gauges.sum_wifi_ids,
            &gauges.sum_bt_ids,
            &gauges.battery_voltage,
            &gauges.unsent_ids,
            &gauges.wifi_count,
            &gauges.ble_count,
        ] {
            registry.register(Box::new(gauge.clone()))?;
        }

        Ok(gauges)
    }

    /// Gauge slots a category writes to: primary, then secondary if any
    pub fn slots(&self, category: Category) -> (&IntGauge, Option<&IntGauge>) {
        match category {
            Category::WifiScan => (&self.sum_wifi_ids, Some(&self.unsent_ids)),
            Category::BluetoothScan => (&self.sum_bt_ids, Some(&self.unsent_ids)),
            Category::CombinedCounter => (&self.wifi_count, Some(&self.ble_count)),
            Category::BatteryVoltage => (&self.battery_voltage, None),
        }
    }
}
