/// MQTT transport: connects to the broker and feeds uplinks to a handler
use log::{debug, error, info, warn};
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS, SubAck,
    SubscribeReasonCode,
};
use thiserror::Error;
use tokio::time::{sleep, Duration};

use crate::config::MqttConfig;
use crate::lifecycle::Shutdown;
use crate::mqtt::ingest::MessageHandler;

// Transport retry constants
const MAX_RECONNECT_ATTEMPTS: usize = 100;
const WAIT_BETWEEN_RECONNECTS: u64 = 5;
const KEEP_ALIVE_SECS: u64 = 30;
const REQUEST_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("gave up after {attempts} connection attempts: {last}")]
    RetriesExhausted { attempts: usize, last: String },
    #[error("broker refused subscription to {topic}")]
    SubscriptionRefused { topic: String },
}

fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.broker, config.port);
    options.set_keep_alive(Duration::from_secs(KEEP_ALIVE_SECS));
    if let Some((user, password)) = &config.credentials {
        options.set_credentials(user, password);
    }
    options
}

/// Run the ingestion loop until shutdown or until the broker stays unreachable
///
/// Every successful CONNACK (re)subscribes to the configured topic, so a
/// reconnect after a broker restart keeps receiving uplinks. Each publish is
/// handed to `handler` synchronously.
///
/// # Arguments
/// * `config` - Broker address, credentials and topic
/// * `handler` - Receives messages and disconnect notifications
/// * `shutdown` - Stops the loop and disconnects from the broker
pub async fn run<H: MessageHandler>(
    config: MqttConfig,
    mut handler: H,
    shutdown: Shutdown,
) -> Result<(), TransportError> {
    info!(
        "Connecting to MQTT broker {}:{} as {}",
        config.broker, config.port, config.client_id
    );
    let (client, mut eventloop) = AsyncClient::new(mqtt_options(&config), REQUEST_CHANNEL_CAPACITY);

    let mut failures = 0;
    loop {
        let event = tokio::select! {
            event = eventloop.poll() => event,
            _ = shutdown.cancelled() => break,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    info!("Connected to MQTT Broker!");
                    failures = 0;
                    subscribe(&client, &config.topic);
                } else {
                    error!("Failed to connect, return code {:?}", ack.code);
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                handler.on_message(&publish.topic, &publish.payload);
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                if let Err(e) = check_suback(&ack, &config.topic) {
                    error!("{}", e);
                    disconnect(&client, &mut eventloop).await;
                    return Err(e);
                }
                info!("Subscribed to {}", config.topic);
            }
            Ok(other) => debug!("MQTT event: {:?}", other),
            Err(_) if shutdown.is_triggered() => break,
            Err(e) => {
                failures += 1;
                handler.on_disconnect(&e.to_string());

                if failures >= MAX_RECONNECT_ATTEMPTS {
                    return Err(TransportError::RetriesExhausted {
                        attempts: failures,
                        last: e.to_string(),
                    });
                }

                warn!(
                    "Attempt {}: reconnecting in {} seconds",
                    failures, WAIT_BETWEEN_RECONNECTS
                );
                tokio::select! {
                    _ = sleep(Duration::from_secs(WAIT_BETWEEN_RECONNECTS)) => {}
                    _ = shutdown.cancelled() => break,
                }
            }
        }
    }

    disconnect(&client, &mut eventloop).await;
    Ok(())
}

fn subscribe(client: &AsyncClient, topic: &str) {
    // try_ variant: the event loop is not being polled while we are in here
    if let Err(e) = client.try_subscribe(topic, QoS::AtLeastOnce) {
        error!("Failed to subscribe to {}: {}", topic, e);
    }
}

// One topic per SUBSCRIBE, so any failure code means no uplinks will ever arrive
fn check_suback(ack: &SubAck, topic: &str) -> Result<(), TransportError> {
    if ack
        .return_codes
        .iter()
        .any(|code| matches!(code, SubscribeReasonCode::Failure))
    {
        return Err(TransportError::SubscriptionRefused {
            topic: topic.to_string(),
        });
    }
    Ok(())
}

async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) {
    if client.try_disconnect().is_err() {
        return;
    }
    // Flush the DISCONNECT packet; give up quickly if the broker is gone
    let flush = async {
        while let Ok(event) = eventloop.poll().await {
            if let Event::Outgoing(rumqttc::Outgoing::Disconnect) = event {
                break;
            }
        }
    };
    if tokio::time::timeout(Duration::from_secs(1), flush).await.is_err() {
        debug!("Disconnect not acknowledged in time");
    }
    info!("Disconnected from MQTT broker");
}
