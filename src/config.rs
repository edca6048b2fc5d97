use std::env;
use std::time::Duration;

const DEFAULT_MQTT_PORT: u16 = 1883;
const DEFAULT_METRICS_PORT: u16 = 8000;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub topic: String,
    pub client_id: String,
    pub credentials: Option<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct ExporterConfig {
    pub mqtt: MqttConfig,
    pub metrics_port: u16,
    pub shutdown_grace: Duration,
}

impl ExporterConfig {
    /// Load configuration from the environment (and `.env` if present)
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Box<dyn std::error::Error>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| format!("{} environment variable not set", key))
        };

        let broker = required("MQTT_BROKER")?;
        let topic = required("MQTT_TOPIC")?;
        let port = parse_or(&lookup, "MQTT_PORT", DEFAULT_MQTT_PORT)?;
        let metrics_port = parse_or(&lookup, "METRICS_PORT", DEFAULT_METRICS_PORT)?;
        let grace_secs = parse_or(&lookup, "SHUTDOWN_GRACE_SECS", DEFAULT_SHUTDOWN_GRACE_SECS)?;

        // Credentials only make sense as a pair
        let credentials = match (lookup("MQTT_USERNAME"), lookup("MQTT_PASSWORD")) {
            (Some(user), Some(password)) => Some((user, password)),
            (Some(_), None) | (None, Some(_)) => {
                return Err("MQTT_USERNAME and MQTT_PASSWORD must be set together".into())
            }
            (None, None) => None,
        };

        let client_id = lookup("MQTT_CLIENT_ID")
            .unwrap_or_else(|| format!("pax-exporter-{}", std::process::id()));

        Ok(ExporterConfig {
            mqtt: MqttConfig {
                broker,
                port,
                topic,
                client_id,
                credentials,
            },
            metrics_port,
            shutdown_grace: Duration::from_secs(grace_secs),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, Box<dyn std::error::Error>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| format!("Invalid {} '{}': {}", key, raw, e).into()),
        None => Ok(default),
    }
}
