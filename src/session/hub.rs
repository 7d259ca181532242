use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::debug;

use crate::session::ConnectionState;
use crate::types::{AutoDetectResult, PaceSignal, RepEvent, SessionEvent};

/// One broadcast stream: every subscriber gets its own bounded queue.
///
/// Overflow policy is drop-oldest: when a subscriber's queue is full the
/// oldest queued event is discarded to make room for the newest, so a
/// stalled consumer can never stall the detection loop. The topic keeps a
/// receiver clone per subscriber for exactly that eviction; an abandoned
/// subscription therefore degrades to a rotating buffer of the newest
/// events instead of blocking the producer.
struct Topic<T> {
    name: &'static str,
    capacity: usize,
    subscribers: Vec<(Sender<T>, Receiver<T>)>,
    dropped: u64,
}

impl<T: Clone> Topic<T> {
    fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            subscribers: Vec::new(),
            dropped: 0,
        }
    }

    fn subscribe(&mut self) -> Receiver<T> {
        let (sender, receiver) = bounded(self.capacity);
        self.subscribers.push((sender, receiver.clone()));
        receiver
    }

    fn publish(&mut self, value: T) {
        let name = self.name;
        let mut dropped = 0u64;
        self.subscribers.retain(|(sender, drain)| {
            let mut pending = value.clone();
            loop {
                match sender.try_send(pending) {
                    Ok(()) => return true,
                    Err(TrySendError::Full(v)) => {
                        let _ = drain.try_recv();
                        dropped += 1;
                        pending = v;
                    }
                    Err(TrySendError::Disconnected(_)) => return false,
                }
            }
        });
        if dropped > 0 {
            self.dropped += dropped;
            debug!("hub: {} overflow, dropped {} oldest ({} total)", name, dropped, self.dropped);
        }
    }
}

/// Broadcast fabric between the session engine and its consumers. One
/// producer (the engine) per stream per session; any number of subscribers.
pub struct EventHub {
    reps: Topic<RepEvent>,
    connection: Topic<ConnectionState>,
    auto_detect: Topic<AutoDetectResult>,
    session_events: Topic<SessionEvent>,
    pace: Topic<PaceSignal>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            reps: Topic::new("reps", capacity),
            connection: Topic::new("connection", capacity),
            auto_detect: Topic::new("auto_detect", capacity),
            session_events: Topic::new("session_events", capacity),
            pace: Topic::new("pace", capacity),
        }
    }

    pub fn subscribe_reps(&mut self) -> Receiver<RepEvent> {
        self.reps.subscribe()
    }

    pub fn subscribe_connection(&mut self) -> Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    pub fn subscribe_auto_detect(&mut self) -> Receiver<AutoDetectResult> {
        self.auto_detect.subscribe()
    }

    pub fn subscribe_session_events(&mut self) -> Receiver<SessionEvent> {
        self.session_events.subscribe()
    }

    pub fn subscribe_pace(&mut self) -> Receiver<PaceSignal> {
        self.pace.subscribe()
    }

    pub fn publish_rep(&mut self, event: RepEvent) {
        self.reps.publish(event);
    }

    pub fn publish_connection(&mut self, state: ConnectionState) {
        self.connection.publish(state);
    }

    pub fn publish_auto_detect(&mut self, result: AutoDetectResult) {
        self.auto_detect.publish(result);
    }

    pub fn publish_session_event(&mut self, event: SessionEvent) {
        self.session_events.publish(event);
    }

    pub fn publish_pace(&mut self, signal: PaceSignal) {
        self.pace.publish(signal);
    }

    /// Events discarded across all streams under the drop-oldest policy.
    pub fn dropped(&self) -> u64 {
        self.reps.dropped
            + self.connection.dropped
            + self.auto_detect.dropped
            + self.session_events.dropped
            + self.pace.dropped
    }
}
