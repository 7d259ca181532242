use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use dotenv::dotenv;
use log::{error, info, warn};
use rumqttc::{Client, Connection, Event, LastWill, MqttOptions, Packet, QoS};

use crate::config::MqttConfig;
use crate::source::protocol::{self, ACTION_RESET, ACTION_START_AUTO_DETECT};
use crate::source::{SampleSource, SourceError, SourceEvent};

/// How often the running malformed-message count is reported.
const MALFORMED_LOG_INTERVAL: u64 = 100;

/// Remote detector behind an MQTT link: a reader thread drains the broker
/// connection into a bounded event queue; `poll` drains that queue. Reps
/// arrive pre-detected on the events topic, raw samples on the samples
/// topic (used for feature collection only).
pub struct RemoteSource {
    client: Client,
    events: Receiver<SourceEvent>,
    reader: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    control_topic: String,
    qos: QoS,
}

impl RemoteSource {
    /// Opens the broker connection and starts the reader thread. Credentials
    /// come from the environment (`MQTT_USER` / `MQTT_PASS`, `.env`
    /// supported); broker address and topics from configuration.
    pub fn connect(config: &MqttConfig, queue_capacity: usize) -> Result<Self, SourceError> {
        dotenv().ok();

        let mqtt_user = env::var("MQTT_USER")
            .map_err(|_| SourceError::Transport("MQTT_USER not set".to_string()))?;
        let mqtt_pass = env::var("MQTT_PASS")
            .map_err(|_| SourceError::Transport("MQTT_PASS not set".to_string()))?;

        let mut mqtt_options =
            MqttOptions::new(config.client_id.clone(), config.broker.clone(), config.port);
        mqtt_options
            .set_credentials(mqtt_user, mqtt_pass)
            .set_keep_alive(Duration::from_secs(config.keep_alive_secs))
            .set_last_will(LastWill::new(
                config.topics.events.clone(),
                "offline",
                QoS::AtLeastOnce,
                false,
            ));

        let (client, connection) = Client::new(mqtt_options, 10);
        let qos = QoS::AtLeastOnce;
        client
            .subscribe(config.topics.samples.clone(), qos)
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        client
            .subscribe(config.topics.events.clone(), qos)
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let (event_sender, events) = bounded(queue_capacity);
        let shutdown = Arc::new(AtomicBool::new(false));
        let reader = {
            let shutdown = Arc::clone(&shutdown);
            let samples_topic = config.topics.samples.clone();
            let events_topic = config.topics.events.clone();
            thread::spawn(move || {
                run_reader(connection, event_sender, shutdown, samples_topic, events_topic)
            })
        };

        info!(
            "remote source: connecting to {}:{} (samples={}, events={})",
            config.broker, config.port, config.topics.samples, config.topics.events
        );

        Ok(Self {
            client,
            events,
            reader: Some(reader),
            shutdown,
            control_topic: config.topics.control.clone(),
            qos,
        })
    }

    fn publish_control(&mut self, action: &'static str) -> Result<(), SourceError> {
        self.client
            .publish(
                self.control_topic.clone(),
                self.qos,
                false,
                protocol::control_payload(action),
            )
            .map_err(|e| SourceError::Transport(e.to_string()))
    }
}

impl SampleSource for RemoteSource {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn poll(&mut self, timeout: Duration) -> Result<SourceEvent, SourceError> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Ok(event),
            Err(RecvTimeoutError::Timeout) => Ok(SourceEvent::Idle),
            Err(RecvTimeoutError::Disconnected) => Err(SourceError::Disconnected),
        }
    }

    fn request_auto_detect(&mut self) -> Result<(), SourceError> {
        self.publish_control(ACTION_START_AUTO_DETECT)
    }

    fn request_reset(&mut self) -> Result<(), SourceError> {
        self.publish_control(ACTION_RESET)
    }

    fn disconnect(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Err(e) = self.client.disconnect() {
            warn!("remote source: disconnect failed: {}", e);
        }
        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                error!("remote source: reader thread panicked");
            }
        }
    }

    fn detects_reps_remotely(&self) -> bool {
        true
    }
}

fn run_reader(
    mut connection: Connection,
    sender: Sender<SourceEvent>,
    shutdown: Arc<AtomicBool>,
    samples_topic: String,
    events_topic: String,
) {
    let mut malformed: u64 = 0;
    let mut note_malformed = |what: &str, err: String, count: &mut u64| {
        *count += 1;
        if *count == 1 || *count % MALFORMED_LOG_INTERVAL == 0 {
            warn!("remote source: invalid {} ({}), {} dropped so far", what, err, count);
        }
    };

    for event in connection.iter() {
        if shutdown.load(Ordering::Relaxed) {
            info!("remote source: reader received shutdown signal, exiting");
            break;
        }

        match event {
            Ok(Event::Incoming(Packet::Publish(publish))) if publish.topic == samples_topic => {
                match protocol::parse_sample(&publish.payload) {
                    Ok(raw) => {
                        if sender.send(SourceEvent::Sample(raw)).is_err() {
                            info!("remote source: event queue disconnected, reader exiting");
                            return;
                        }
                    }
                    Err(e) => note_malformed("sample", e, &mut malformed),
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) if publish.topic == events_topic => {
                match protocol::parse_event(&publish.payload) {
                    Ok(msg) => {
                        if sender.send(msg.into()).is_err() {
                            info!("remote source: event queue disconnected, reader exiting");
                            return;
                        }
                    }
                    Err(e) => note_malformed("event message", e, &mut malformed),
                }
            }
            Ok(Event::Incoming(_)) => {}
            Err(e) => {
                // rumqttc retries the broker internally; surface the outage
                // and keep the loop alive for the reconnect.
                error!("remote source: connection error: {}", e);
                if sender.send(SourceEvent::Closed).is_err() {
                    return;
                }
                thread::sleep(Duration::from_secs(1));
            }
            _ => {}
        }
    }

    let _ = sender.send(SourceEvent::Closed);
    info!("remote source: reader thread exiting");
}
