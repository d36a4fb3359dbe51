use forming_core::Reading;
use jiff::Timestamp;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::MqttConfig;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed reading: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decodes one message body into a [`Reading`].
pub fn decode_reading(payload: &[u8]) -> Result<Reading, DecodeError> {
    Ok(serde_json::from_slice(payload)?)
}

fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let client_id = format!(
        "{}-{}",
        config.client_id_prefix,
        Timestamp::now().as_millisecond()
    );

    let mut options = MqttOptions::new(client_id, &config.host, config.port);
    options.set_keep_alive(config.keep_alive());
    options.set_clean_session(true);
    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username, password);
    }
    options
}

/// Subscribes to the telemetry topic and pushes every message body into `tx`.
///
/// The broker connection is retried forever with a fixed delay and the
/// subscription is renewed on every ConnAck. Returns once `cancel` fires or
/// the receiving side of `tx` is gone.
pub async fn run_subscriber(
    config: MqttConfig,
    tx: mpsc::Sender<Vec<u8>>,
    cancel: CancellationToken,
) {
    let (client, mut eventloop) = AsyncClient::new(mqtt_options(&config), config.channel_capacity);

    info!(
        host = %config.host,
        port = config.port,
        topic = %config.topic,
        "MQTT subscriber started"
    );

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("MQTT subscriber shutting down");
                let _ = client.try_disconnect();
                break;
            }
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!(host = %config.host, "Connected to MQTT broker");
                if let Err(e) = client.try_subscribe(&config.topic, QoS::AtLeastOnce) {
                    error!(error = ?e, topic = %config.topic, "Failed to subscribe");
                }
            }
            Ok(Event::Incoming(Packet::SubAck(_))) => {
                info!(topic = %config.topic, "Subscribed to telemetry topic");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if tx.send(publish.payload.to_vec()).await.is_err() {
                    warn!("Ingest loop gone, stopping MQTT subscriber");
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    error = %e,
                    retry_in_secs = config.reconnect_delay_secs,
                    "MQTT connection lost"
                );
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(config.reconnect_delay()) => {}
                }
            }
        }
    }

    info!("MQTT subscriber stopped");
}
