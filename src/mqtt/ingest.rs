use log::{debug, info, warn};
use std::sync::Arc;

use crate::models::PendingBatch;
use crate::mqtt::decoder::{decode, Ignored};
use crate::pipeline::{Accumulator, Handoff};

/// Callbacks the transport invokes; implementors never see transport types
pub trait MessageHandler: Send {
    fn on_message(&mut self, topic: &str, payload: &[u8]);
    fn on_disconnect(&mut self, reason: &str);
}

impl<T: MessageHandler + ?Sized> MessageHandler for &mut T {
    fn on_message(&mut self, topic: &str, payload: &[u8]) {
        (**self).on_message(topic, payload)
    }

    fn on_disconnect(&mut self, reason: &str) {
        (**self).on_disconnect(reason)
    }
}

/// Ingestion path: decode, accumulate, hand the new totals to the publisher
pub struct Ingestor {
    accumulator: Accumulator,
    handoff: Arc<Handoff>,
    ignored: u64,
}

impl Ingestor {
    pub fn new(handoff: Arc<Handoff>) -> Self {
        Self {
            accumulator: Accumulator::new(),
            handoff,
            ignored: 0,
        }
    }
}

impl MessageHandler for Ingestor {
    fn on_message(&mut self, topic: &str, payload: &[u8]) {
        let decoded = match decode(payload) {
            Ok(decoded) => decoded,
            Err(reason) => {
                self.ignored += 1;
                match reason {
                    Ignored::InvalidJson(_)
                    | Ignored::InvalidField(_)
                    | Ignored::UnknownCategory(_) => {
                        warn!("Ignoring message on {}: {}", topic, reason)
                    }
                    // Non-uplink events (joins, acks) share the topic and lack these fields
                    _ => debug!("Ignoring message on {}: {}", topic, reason),
                }
                return;
            }
        };

        let totals = self.accumulator.apply(decoded.category, decoded.values);
        info!(
            "{}: report {:?}, totals {:?}",
            decoded.category, decoded.values, totals
        );

        self.handoff.enqueue(PendingBatch {
            category: decoded.category,
            values: totals,
        });
    }

    fn on_disconnect(&mut self, reason: &str) {
        warn!(
            "Disconnected from broker: {} ({} messages ignored so far)",
            reason, self.ignored
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;
    use crate::metrics::{Gauges, Publisher};
    use crate::models::Category;
    use prometheus::Registry;

    const TOPIC: &str = "v3/pax@ttn/devices/pax-1/up";

    fn scan(port: u8, bytes: &[u8]) -> Vec<u8> {
        format!(
            r#"{{"uplink_message":{{"decoded_payload":{{"port":{},"bytes":{:?}}}}}}}"#,
            port, bytes
        )
        .into_bytes()
    }

    fn pipeline() -> (Ingestor, Arc<Handoff>, Publisher, Gauges) {
        let handoff = Arc::new(Handoff::new());
        let gauges = Gauges::register(&Registry::new()).unwrap();
        (
            Ingestor::new(Arc::clone(&handoff)),
            handoff,
            Publisher::new(gauges.clone()),
            gauges,
        )
    }

    async fn publish_pending(handoff: &Handoff, publisher: &Publisher) {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        // With the signal already set the loop publishes what is queued and returns
        publisher.run(handoff, &shutdown).await;
    }

    #[tokio::test]
    async fn wifi_scans_accumulate_ids_and_drops() {
        let (mut ingestor, handoff, publisher, gauges) = pipeline();
        ingestor.on_message(TOPIC, &scan(13, &[2, 0xAA, 0xBB, 0xCC, 0xDD]));
        ingestor.on_message(TOPIC, &scan(13, &[1, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66]));

        publish_pending(&handoff, &publisher).await;
        assert_eq!(gauges.sum_wifi_ids.get(), 5);
        assert_eq!(gauges.unsent_ids.get(), 3);
    }

    #[tokio::test]
    async fn combined_counters_accumulate() {
        let (mut ingestor, handoff, publisher, gauges) = pipeline();
        ingestor.on_message(
            TOPIC,
            br#"{"uplink_message":{"decoded_payload":{"port":1,"wifi":4,"ble":2}}}"#,
        );
        ingestor.on_message(
            TOPIC,
            br#"{"uplink_message":{"decoded_payload":{"port":1,"wifi":1,"ble":3}}}"#,
        );

        publish_pending(&handoff, &publisher).await;
        assert_eq!(gauges.wifi_count.get(), 5);
        assert_eq!(gauges.ble_count.get(), 5);
        assert_eq!(gauges.sum_wifi_ids.get(), 0);
    }

    #[tokio::test]
    async fn battery_readings_are_summed() {
        let (mut ingestor, handoff, publisher, gauges) = pipeline();
        ingestor.on_message(
            TOPIC,
            br#"{"uplink_message":{"decoded_payload":{"port":8,"voltage":3700}}}"#,
        );
        ingestor.on_message(
            TOPIC,
            br#"{"uplink_message":{"decoded_payload":{"port":8,"voltage":3650}}}"#,
        );

        publish_pending(&handoff, &publisher).await;
        assert_eq!(gauges.battery_voltage.get(), 7350);
    }

    #[tokio::test]
    async fn unknown_port_leaves_gauges_untouched() {
        let (mut ingestor, handoff, publisher, gauges) = pipeline();
        ingestor.on_message(
            TOPIC,
            br#"{"uplink_message":{"decoded_payload":{"port":99}}}"#,
        );

        assert!(handoff.is_empty());
        assert_eq!(ingestor.ignored, 1);
        publish_pending(&handoff, &publisher).await;
        for gauge in [
            &gauges.sum_wifi_ids,
            &gauges.sum_bt_ids,
            &gauges.battery_voltage,
            &gauges.unsent_ids,
            &gauges.wifi_count,
            &gauges.ble_count,
        ] {
            assert_eq!(gauge.get(), 0);
        }
    }

    #[test]
    fn malformed_envelope_changes_no_totals() {
        let (mut ingestor, handoff, _, _) = pipeline();
        ingestor.on_message(TOPIC, &scan(13, &[2, 0xAA, 0xBB]));
        ingestor.on_message(TOPIC, br#"{"uplink_message":{}}"#);
        ingestor.on_message(TOPIC, br#"{"uplink_message":{"decoded_payload":{}}}"#);

        assert_eq!(handoff.len(), 1);
        assert_eq!(ingestor.ignored, 2);
        assert_eq!(
            ingestor.accumulator.totals(Category::WifiScan).sum_primary,
            1
        );
    }

    #[tokio::test]
    async fn categories_reported_between_wakes_all_reach_their_gauges() {
        let (mut ingestor, handoff, publisher, gauges) = pipeline();
        ingestor.on_message(TOPIC, &scan(13, &[1, 1, 2]));
        ingestor.on_message(TOPIC, &scan(14, &[2, 1, 2, 3, 4]));
        ingestor.on_message(
            TOPIC,
            br#"{"uplink_message":{"decoded_payload":{"port":8,"voltage":3300}}}"#,
        );
        assert_eq!(handoff.len(), 3);

        publish_pending(&handoff, &publisher).await;
        assert_eq!(gauges.sum_wifi_ids.get(), 1);
        assert_eq!(gauges.sum_bt_ids.get(), 2);
        assert_eq!(gauges.unsent_ids.get(), 3);
        assert_eq!(gauges.battery_voltage.get(), 3300);
    }
}
