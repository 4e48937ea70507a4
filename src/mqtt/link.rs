//! Connection state machine and broker event loop.
//!
//! The link owns the rumqttc client plus the background task polling its event
//! loop. Broker callbacks never touch engine state directly: the event-loop
//! task records transitions in a small shared section guarded by a mutex, and
//! the engine picks them up through [`MqttLink::state`] and
//! [`MqttLink::generation`] at the top of each telemetry hook.

use crate::mqtt::config::BrokerSettings;
use crate::mqtt::status::LinkStatus;
use crate::mqtt::LinkError;
use crate::telemetry::{PublishIntent, TopicMap};
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, Incoming, LastWill, Outgoing, QoS,
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Bounded wait for the broker to acknowledge a clean disconnect.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause before rumqttc retries after a connection error.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    /// Unusable configuration; terminal until reconfigure-and-restart.
    Error,
}

/// Section shared between the engine thread and the event-loop task.
#[derive(Debug, Default)]
struct LinkShared {
    state: ConnectionState,
    /// Incremented on every successful (re)connection. The engine compares
    /// generations to know when its caches must be cleared.
    generation: u64,
}

/// Handle owning the broker connection lifecycle.
pub struct MqttLink {
    shared: Arc<Mutex<LinkShared>>,
    status_tx: watch::Sender<LinkStatus>,
    client: Option<AsyncClient>,
    task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    qos: QoS,
    offline: Option<PublishIntent>,
}

impl MqttLink {
    pub fn new() -> (Self, watch::Receiver<LinkStatus>) {
        let (status_tx, status_rx) = watch::channel(LinkStatus::Initializing);
        let link = Self {
            shared: Arc::new(Mutex::new(LinkShared::default())),
            status_tx,
            client: None,
            task: None,
            cancel: CancellationToken::new(),
            qos: QoS::AtMostOnce,
            offline: None,
        };
        (link, status_rx)
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Registers the last-will liveness message and initiates an asynchronous
    /// connect. Configuration failures leave the link in the `Error` state and
    /// never panic; network failures are handled by the client's own retries.
    pub fn start(&mut self, broker: &BrokerSettings, topics: &TopicMap) -> Result<(), LinkError> {
        let current = self.state();
        if matches!(
            current,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Disconnecting
        ) {
            warn!("Connection start requested while {current:?}; ignoring");
            return Ok(());
        }

        self.qos = broker.qos();
        let liveness = liveness_topic(topics);
        let will = LastWill::new(liveness, "False", self.qos, true);
        let options = match broker.mqtt_options(will) {
            Ok(options) => options,
            Err(e) => {
                self.lock().state = ConnectionState::Error;
                self.status_tx.send_replace(LinkStatus::ConfigError);
                error!("Broker configuration rejected: {e}");
                return Err(e);
            }
        };

        self.lock().state = ConnectionState::Connecting;
        self.status_tx.send_replace(LinkStatus::Connecting);

        let (client, eventloop) = AsyncClient::new(options, 64);
        self.client = Some(client.clone());
        self.offline = Some(offline_intent(topics));
        self.cancel = CancellationToken::new();
        self.task = Some(tokio::spawn(run_event_loop(
            eventloop,
            client,
            self.shared.clone(),
            self.status_tx.clone(),
            self.cancel.clone(),
            online_intents(topics),
            self.qos,
        )));

        info!("Connecting to MQTT broker at {}:{}", broker.host, broker.port);
        Ok(())
    }

    /// Fire-and-forget publish, gated on liveness.
    ///
    /// Returns false when the intent was dropped: telemetry is at-most-once
    /// and nothing is queued while the link is down.
    pub fn publish(&self, intent: &PublishIntent) -> bool {
        if self.lock().state != ConnectionState::Connected {
            return false;
        }
        let Some(client) = &self.client else {
            return false;
        };
        match client.try_publish(&intent.topic, self.qos, intent.retain, intent.payload.clone()) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping publish to {}: {e}", intent.topic);
                false
            }
        }
    }

    /// Clean shutdown: retained liveness-false first, then a non-blocking
    /// disconnect request, then a bounded wait for the event loop to wind
    /// down. A full request channel only loses the courtesy messages; the
    /// timeout below forces local teardown either way. Safe to call when
    /// already stopped.
    pub async fn stop(&mut self) {
        {
            let mut guard = self.lock();
            if guard.state == ConnectionState::Disconnected && self.task.is_none() {
                debug!("Link already disconnected");
                return;
            }
            guard.state = ConnectionState::Disconnecting;
        }
        self.status_tx.send_replace(LinkStatus::Disconnecting);

        if let Some(client) = self.client.take() {
            if let Some(offline) = &self.offline {
                let _ =
                    client.try_publish(&offline.topic, self.qos, offline.retain, offline.payload.clone());
            }
            if let Err(e) = client.try_disconnect() {
                debug!("Disconnect request not deliverable: {e}");
            }
        }

        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(DISCONNECT_TIMEOUT, &mut task)
                .await
                .is_err()
            {
                error!("Timeout waiting for broker to acknowledge disconnect; forcing teardown");
                self.cancel.cancel();
                task.abort();
            }
        }

        self.lock().state = ConnectionState::Disconnected;
        self.status_tx.send_replace(LinkStatus::Offline);
        info!("Disconnected from MQTT broker");
    }

    fn lock(&self) -> MutexGuard<'_, LinkShared> {
        lock_shared(&self.shared)
    }
}

fn lock_shared(shared: &Mutex<LinkShared>) -> MutexGuard<'_, LinkShared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The retained topic that doubles as the last-will target.
pub fn liveness_topic(topics: &TopicMap) -> String {
    topics.join(&[&topics.resolve("status"), &topics.resolve("online")])
}

/// Announcements published on every successful (re)connection: retained
/// liveness-true plus a non-retained host-running note.
pub fn online_intents(topics: &TopicMap) -> Vec<PublishIntent> {
    vec![
        PublishIntent::retained(liveness_topic(topics), "True".to_string()),
        PublishIntent::new(
            topics.join(&[&topics.resolve("status")]),
            "Running".to_string(),
        ),
    ]
}

/// Retained liveness-false, published before a clean disconnect.
pub fn offline_intent(topics: &TopicMap) -> PublishIntent {
    PublishIntent::retained(liveness_topic(topics), "False".to_string())
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    shared: Arc<Mutex<LinkShared>>,
    status: watch::Sender<LinkStatus>,
    cancel: CancellationToken,
    online: Vec<PublishIntent>,
    qos: QoS,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        {
                            let mut guard = lock_shared(&shared);
                            guard.state = ConnectionState::Connected;
                            guard.generation += 1;
                        }
                        status.send_replace(LinkStatus::Online);
                        info!("Connected to MQTT broker");
                        for intent in &online {
                            if let Err(e) =
                                client.try_publish(&intent.topic, qos, intent.retain, intent.payload.clone())
                            {
                                warn!("Failed to announce liveness: {e}");
                            }
                        }
                    } else {
                        warn!("Broker refused connection: {:?}", ack.code);
                    }
                }

                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    if lock_shared(&shared).state == ConnectionState::Disconnecting {
                        break;
                    }
                }

                Ok(_) => {}

                Err(e) => {
                    let disconnecting = {
                        let mut guard = lock_shared(&shared);
                        if guard.state == ConnectionState::Disconnecting {
                            true
                        } else {
                            guard.state = ConnectionState::Disconnected;
                            false
                        }
                    };
                    if disconnecting {
                        break;
                    }
                    status.send_replace(LinkStatus::Offline);
                    warn!("MQTT connection error: {e}");
                    // rumqttc retries on the next poll; don't spin while the
                    // broker is unreachable.
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                }
            }
        }
    }
    debug!("MQTT event loop terminated");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TopicSettings;
    use crate::mqtt::config::TlsSettings;

    fn topics() -> TopicMap {
        TopicMap::from_settings(&TopicSettings::default())
    }

    #[test]
    fn liveness_announcements_are_retained_true_then_false() {
        let online = online_intents(&topics());
        assert_eq!(online.len(), 2);
        assert_eq!(online[0].topic, "Telemetry/Status/Online");
        assert_eq!(online[0].payload, "True");
        assert!(online[0].retain);
        assert_eq!(online[1].topic, "Telemetry/Status");
        assert!(!online[1].retain);

        let offline = offline_intent(&topics());
        assert_eq!(offline.topic, "Telemetry/Status/Online");
        assert_eq!(offline.payload, "False");
        assert!(offline.retain);
    }

    #[test]
    fn publish_is_gated_while_disconnected() {
        let (link, _status_rx) = MqttLink::new();
        assert_eq!(link.state(), ConnectionState::Disconnected);
        let intent = PublishIntent::new("Telemetry/Dashboard/Fuel".to_string(), "32".to_string());
        assert!(!link.publish(&intent));
    }

    #[tokio::test]
    async fn stop_is_idempotent_when_never_started() {
        let (mut link, _status_rx) = MqttLink::new();
        link.stop().await;
        link.stop().await;
        assert_eq!(link.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_completes_when_the_request_channel_is_wedged() {
        let broker = BrokerSettings::default();
        let will = LastWill::new("Telemetry/Status/Online", "False", QoS::AtMostOnce, true);
        let (client, _eventloop) =
            AsyncClient::new(broker.mqtt_options(will).expect("options are valid"), 1);
        // Nothing polls the event loop, so this fills the only request slot
        // and every later request sees a full channel.
        client
            .try_publish("Telemetry/Dashboard/Fuel", QoS::AtMostOnce, false, "32")
            .expect("first request fits");

        let (status_tx, _status_rx) = watch::channel(LinkStatus::Initializing);
        let mut link = MqttLink {
            shared: Arc::new(Mutex::new(LinkShared {
                state: ConnectionState::Connected,
                generation: 1,
            })),
            status_tx,
            client: Some(client),
            task: Some(tokio::spawn(std::future::pending::<()>())),
            cancel: CancellationToken::new(),
            qos: QoS::AtMostOnce,
            offline: Some(offline_intent(&topics())),
        };

        link.stop().await;
        assert_eq!(link.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn bad_tls_material_is_terminal_config_error() {
        let (mut link, status_rx) = MqttLink::new();
        let broker = BrokerSettings {
            tls: TlsSettings {
                enabled: true,
                ca_cert: "/nonexistent/ca.pem".to_string(),
                ..TlsSettings::default()
            },
            ..BrokerSettings::default()
        };
        assert!(link.start(&broker, &topics()).is_err());
        assert_eq!(link.state(), ConnectionState::Error);
        assert_eq!(*status_rx.borrow(), LinkStatus::ConfigError);
    }
}
