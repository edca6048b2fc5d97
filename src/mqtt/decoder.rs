/// Decoding of Paxcounter uplink envelopes into categorized values
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::models::{Category, RawValues};

/// Reason an uplink envelope was dropped without touching any counter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Ignored {
    #[error("payload is not a JSON object: {0}")]
    InvalidJson(String),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("field `{0}` has an unexpected type")]
    InvalidField(&'static str),
    #[error("unknown port {0}")]
    UnknownCategory(i64),
    #[error("empty identifier bytes for {0}")]
    EmptyIdentifierBytes(Category),
}

/// A successfully decoded report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    pub category: Category,
    pub values: RawValues,
}

// Only the fields this exporter reads; everything else in the uplink is skipped.
#[derive(Debug, Deserialize)]
struct Envelope {
    uplink_message: Option<UplinkMessage>,
}

#[derive(Debug, Deserialize)]
struct UplinkMessage {
    decoded_payload: Option<DecodedPayload>,
}

// Value fields are only typed once the port says which of them matter
#[derive(Debug, Deserialize)]
struct DecodedPayload {
    port: Option<i64>,
    bytes: Option<Value>,
    wifi: Option<Value>,
    ble: Option<Value>,
    voltage: Option<Value>,
}

fn field<T: DeserializeOwned>(value: Option<Value>, name: &'static str) -> Result<T, Ignored> {
    let value = value.ok_or(Ignored::MissingField(name))?;
    serde_json::from_value(value).map_err(|_| Ignored::InvalidField(name))
}

/// Decode one raw uplink message
///
/// The identifier-count byte sequence used on ports 13 and 14 looks like:
/// - Byte 0: number of identifiers the sensor could not send (drop count)
/// - Bytes 1..: one identifier per pair of bytes
///
/// A trailing odd byte is not counted as an identifier.
///
/// # Arguments
/// * `payload` - Raw message body as received from the broker
///
/// # Returns
/// The category and its values, or the reason the message is ignored
pub fn decode(payload: &[u8]) -> Result<Decoded, Ignored> {
    let envelope: Envelope =
        serde_json::from_slice(payload).map_err(|e| Ignored::InvalidJson(e.to_string()))?;

    let decoded_payload = envelope
        .uplink_message
        .ok_or(Ignored::MissingField("uplink_message"))?
        .decoded_payload
        .ok_or(Ignored::MissingField("decoded_payload"))?;

    let port = decoded_payload.port.ok_or(Ignored::MissingField("port"))?;
    let category = Category::from_port(port).ok_or(Ignored::UnknownCategory(port))?;

    let values = match category {
        Category::WifiScan | Category::BluetoothScan => {
            let bytes: Vec<u8> = field(decoded_payload.bytes, "bytes")?;
            let (&dropped, ids) = bytes
                .split_first()
                .ok_or(Ignored::EmptyIdentifierBytes(category))?;
            RawValues {
                primary: (ids.len() / 2) as u64, // 1 identifier == 2 bytes
                secondary: Some(u64::from(dropped)),
            }
        }
        Category::CombinedCounter => RawValues {
            primary: field(decoded_payload.wifi, "wifi")?,
            secondary: Some(field(decoded_payload.ble, "ble")?),
        },
        Category::BatteryVoltage => RawValues {
            primary: field(decoded_payload.voltage, "voltage")?,
            secondary: None,
        },
    };

    Ok(Decoded { category, values })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(port: u8, bytes: &[u8]) -> Vec<u8> {
        format!(
            r#"{{"uplink_message":{{"decoded_payload":{{"port":{},"bytes":{:?}}}}}}}"#,
            port, bytes
        )
        .into_bytes()
    }

    #[test]
    fn wifi_scan_counts_pairs_after_drop_byte() {
        let decoded = decode(&scan(13, &[2, 0xAA, 0xBB, 0xCC, 0xDD])).unwrap();
        assert_eq!(decoded.category, Category::WifiScan);
        assert_eq!(
            decoded.values,
            RawValues {
                primary: 2,
                secondary: Some(2)
            }
        );
    }

    #[test]
    fn bluetooth_scan_with_only_drop_byte_has_no_identifiers() {
        let decoded = decode(&scan(14, &[7])).unwrap();
        assert_eq!(decoded.category, Category::BluetoothScan);
        assert_eq!(decoded.values.primary, 0);
        assert_eq!(decoded.values.secondary, Some(7));
    }

    #[test]
    fn trailing_odd_byte_is_discarded() {
        // length 6: drop byte, two full pairs, one dangling byte
        let decoded = decode(&scan(13, &[0, 1, 2, 3, 4, 5])).unwrap();
        assert_eq!(decoded.values.primary, 2);
    }

    #[test]
    fn empty_identifier_bytes_are_ignored() {
        assert_eq!(
            decode(&scan(14, &[])),
            Err(Ignored::EmptyIdentifierBytes(Category::BluetoothScan))
        );
    }

    #[test]
    fn combined_counter_takes_values_directly() {
        let msg = br#"{"uplink_message":{"decoded_payload":{"port":1,"wifi":4,"ble":2}}}"#;
        let decoded = decode(msg).unwrap();
        assert_eq!(decoded.category, Category::CombinedCounter);
        assert_eq!(
            decoded.values,
            RawValues {
                primary: 4,
                secondary: Some(2)
            }
        );
    }

    #[test]
    fn combined_counter_without_ble_is_ignored() {
        let msg = br#"{"uplink_message":{"decoded_payload":{"port":1,"wifi":4}}}"#;
        assert_eq!(decode(msg), Err(Ignored::MissingField("ble")));
    }

    #[test]
    fn battery_voltage_has_no_secondary() {
        let msg = br#"{"uplink_message":{"decoded_payload":{"port":8,"voltage":3700}}}"#;
        let decoded = decode(msg).unwrap();
        assert_eq!(decoded.category, Category::BatteryVoltage);
        assert_eq!(decoded.values.primary, 3700);
        assert_eq!(decoded.values.secondary, None);
    }

    #[test]
    fn fields_of_other_ports_are_not_inspected() {
        let msg = br#"{"uplink_message":{"decoded_payload":{"port":1,"wifi":4,"ble":2,"voltage":3.7,"bytes":"AAE="}}}"#;
        let decoded = decode(msg).unwrap();
        assert_eq!(decoded.category, Category::CombinedCounter);
        assert_eq!(decoded.values.primary, 4);
    }

    #[test]
    fn wrongly_typed_field_of_the_port_is_ignored() {
        let msg = br#"{"uplink_message":{"decoded_payload":{"port":8,"voltage":3.7}}}"#;
        assert_eq!(decode(msg), Err(Ignored::InvalidField("voltage")));

        let msg = br#"{"uplink_message":{"decoded_payload":{"port":13,"bytes":[1,300,2]}}}"#;
        assert_eq!(decode(msg), Err(Ignored::InvalidField("bytes")));
    }

    #[test]
    fn missing_nested_fields_are_ignored() {
        assert_eq!(
            decode(br#"{"something_else":{}}"#),
            Err(Ignored::MissingField("uplink_message"))
        );
        assert_eq!(
            decode(br#"{"uplink_message":{"f_port":13}}"#),
            Err(Ignored::MissingField("decoded_payload"))
        );
        assert_eq!(
            decode(br#"{"uplink_message":{"decoded_payload":{"bytes":[1,2,3]}}}"#),
            Err(Ignored::MissingField("port"))
        );
    }

    #[test]
    fn unknown_port_is_ignored() {
        let msg = br#"{"uplink_message":{"decoded_payload":{"port":99}}}"#;
        assert_eq!(decode(msg), Err(Ignored::UnknownCategory(99)));
    }

    #[test]
    fn garbage_is_ignored() {
        assert!(matches!(decode(b"not json"), Err(Ignored::InvalidJson(_))));
    }

    #[test]
    fn decode_is_deterministic() {
        let msg = scan(13, &[1, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
        let first = decode(&msg);
        for _ in 0..3 {
            assert_eq!(decode(&msg), first);
        }
    }
}
