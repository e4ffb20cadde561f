use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use rumqttc::{AsyncClient, ClientError, Event, EventLoop, Incoming, MqttOptions, QoS};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use purifier_common::{
    command,
    config::NodeConfig,
    state::StateStore,
    store::KvStore,
    topics,
    types::{AckStatus, Acknowledgment, TelemetryPayload},
};

const EVENT_CHANNEL_CAPACITY: usize = 64;
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(2);

/// Transport lifecycle and traffic, reduced to the events the node acts on.
/// The poll task only translates; all state changes happen in the dispatcher.
#[derive(Debug)]
pub enum BusEvent {
    Connected,
    Disconnected,
    Error(String),
    Message { topic: String, payload: Vec<u8> },
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("message bus is not connected")]
    NotConnected,
    #[error("payload serialization failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Client(#[from] ClientError),
}

#[derive(Clone)]
pub struct MessageBus {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    device_id: String,
}

impl MessageBus {
    /// Builds the client and starts the poll task. The session is reported
    /// through the returned event channel; nothing is published until a
    /// `Connected` event has been dispatched.
    pub fn connect(config: &NodeConfig) -> (Self, mpsc::Receiver<BusEvent>) {
        let mut options =
            MqttOptions::new(&config.mqtt.client_id, &config.mqtt.host, config.mqtt.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let Some(username) = &config.mqtt.username {
            options.set_credentials(
                username.clone(),
                config.mqtt.password.clone().unwrap_or_default(),
            );
        }

        let (client, eventloop) = AsyncClient::new(options, EVENT_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(pump_events(eventloop, events_tx));

        (
            Self {
                client,
                connected: Arc::new(AtomicBool::new(false)),
                device_id: config.device_id.clone(),
            },
            events_rx,
        )
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Fails fast while disconnected; a missed reading is superseded by the
    /// next period rather than buffered.
    pub async fn publish_telemetry(&self, payload: &TelemetryPayload) -> Result<(), PublishError> {
        if !self.is_connected() {
            return Err(PublishError::NotConnected);
        }

        let body = serde_json::to_vec(payload)?;
        self.client
            .publish(
                topics::telemetry_topic(&self.device_id),
                QoS::AtLeastOnce,
                false,
                body,
            )
            .await?;
        Ok(())
    }

    pub async fn publish_ack(&self, ack: &Acknowledgment) -> Result<(), PublishError> {
        if !self.is_connected() {
            return Err(PublishError::NotConnected);
        }

        let body = serde_json::to_vec(ack)?;
        self.client
            .publish(
                topics::ack_topic(&self.device_id),
                QoS::AtLeastOnce,
                false,
                body,
            )
            .await?;
        Ok(())
    }

    async fn subscribe_commands(&self) -> Result<(), ClientError> {
        self.client
            .subscribe(topics::command_topic(&self.device_id), QoS::AtLeastOnce)
            .await
    }
}

/// Translates transport events into [`BusEvent`]s. rumqttc reconnects on the
/// next poll after an error, so this task only paces and forwards.
async fn pump_events(mut eventloop: EventLoop, events: mpsc::Sender<BusEvent>) {
    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => BusEvent::Connected,
            Ok(Event::Incoming(Incoming::Disconnect)) => BusEvent::Disconnected,
            Ok(Event::Incoming(Incoming::Publish(publish))) => BusEvent::Message {
                topic: publish.topic.clone(),
                payload: publish.payload.to_vec(),
            },
            Ok(_) => continue,
            Err(err) => {
                if events.send(BusEvent::Error(err.to_string())).await.is_err() {
                    return;
                }
                tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                continue;
            }
        };

        if events.send(event).await.is_err() {
            return;
        }
    }
}

/// Owns the `connected` flag and the command dispatch path. Every inbound
/// command message yields exactly one acknowledgment, and the ack publish is
/// attempted even when execution failed.
pub async fn run_dispatcher<S: KvStore>(
    bus: MessageBus,
    mut events: mpsc::Receiver<BusEvent>,
    state: Arc<Mutex<StateStore<S>>>,
) {
    let command_topic = topics::command_topic(&bus.device_id);

    while let Some(event) = events.recv().await {
        match event {
            BusEvent::Connected => {
                bus.connected.store(true, Ordering::Relaxed);
                info!("message bus connected");
                if let Err(err) = bus.subscribe_commands().await {
                    warn!("command channel subscription failed: {err}");
                }
            }
            BusEvent::Disconnected => {
                bus.connected.store(false, Ordering::Relaxed);
                info!("message bus disconnected");
            }
            BusEvent::Error(detail) => {
                bus.connected.store(false, Ordering::Relaxed);
                warn!("message bus error: {detail}");
            }
            BusEvent::Message { topic, payload } => {
                if topic != command_topic {
                    continue;
                }

                let ack = {
                    let mut state = state.lock().await;
                    command::handle(&mut state, &payload)
                };

                match ack.status {
                    AckStatus::Success => info!(command_id = %ack.command_id, "command executed"),
                    AckStatus::Failed => warn!(
                        command_id = %ack.command_id,
                        message = ack.message.as_deref().unwrap_or(""),
                        "command rejected"
                    ),
                }

                if let Err(err) = bus.publish_ack(&ack).await {
                    warn!(command_id = %ack.command_id, "ack publish failed: {err}");
                }
            }
        }
    }
}
