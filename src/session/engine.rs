use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, warn};

use crate::classifier::{classify_window, gate_confidence, ExerciseModel};
use crate::config::AppConfig;
use crate::session::{ConnectionMachine, ConnectionState, EventHub, RestMonitor, SessionClock};
use crate::signal::features::FeatureCollection;
use crate::signal::ingest::SampleNormalizer;
use crate::signal::pace::PaceTracker;
use crate::signal::rep_detector::RepDetector;
use crate::source::{SampleSource, SourceEvent};
use crate::store::generate_session_id;
use crate::types::{
    AutoDetectOutcome, AutoDetectResult, RecorderTask, RepEvent, SessionEvent,
};

/// Poll timeout of the engine loop; also bounds command latency.
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Control surface of a running engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineCommand {
    /// Begin an auto-detect pass over the next classification window.
    StartAutoDetect,
    /// Discard all live state and start a fresh session.
    Reset,
    /// Retry the connection after an error.
    Connect,
    /// Leave the loop, finishing the session.
    Stop,
}

/// The session engine owns one source and the whole detection pipeline,
/// single threaded: poll the source, feed the pipeline, publish downstream,
/// forward persistence tasks. Consumers subscribe on the hub before the
/// engine thread starts.
pub struct SessionEngine {
    source: Box<dyn SampleSource>,
    model: Box<dyn ExerciseModel>,
    hub: EventHub,
    normalizer: SampleNormalizer,
    detector: RepDetector,
    pace: PaceTracker,
    rest: RestMonitor,
    connection: ConnectionMachine,
    clock: SessionClock,
    pending: Option<FeatureCollection>,
    recorder: Option<Sender<RecorderTask>>,
    commands: Receiver<EngineCommand>,
    session_id: String,
    rep_count: u32,
    last_rep_at_ms: Option<i64>,
    sample_seq: u64,
    last_tick_ms: i64,
    tick_interval_ms: u64,
    window_ms: u64,
    sub_window: usize,
    step: usize,
    min_confidence: f64,
    intensity_scale: f64,
    pace_emit_every: u64,
    /// Exit the loop when the source closes (finite simulated runs).
    stop_on_close: bool,
}

impl SessionEngine {
    pub fn new(
        config: &AppConfig,
        source: Box<dyn SampleSource>,
        model: Box<dyn ExerciseModel>,
        hub: EventHub,
        recorder: Option<Sender<RecorderTask>>,
        commands: Receiver<EngineCommand>,
    ) -> Self {
        let clock = SessionClock::start();
        let detector = RepDetector::new(config.rep_detector(), clock.session_start_ms());
        let rest = RestMonitor::new(config.rest_monitor(), clock.session_start_ms());
        let connection = ConnectionMachine::new(config.connect_timeout_ms());
        let stop_on_close =
            config.source.kind == "simulated" && config.source.simulated.duration_secs.is_some();
        Self {
            source,
            model,
            hub,
            normalizer: SampleNormalizer::new(config.detector.max_magnitude),
            detector,
            pace: PaceTracker::new(),
            rest,
            connection,
            clock,
            pending: None,
            recorder,
            commands,
            session_id: generate_session_id(),
            rep_count: 0,
            last_rep_at_ms: None,
            sample_seq: 0,
            last_tick_ms: 0,
            tick_interval_ms: config.rest_tick_ms(),
            window_ms: config.classification_window_ms(),
            sub_window: config.classifier.sub_window,
            step: config.classifier.step,
            min_confidence: config.classifier.min_confidence,
            intensity_scale: config.detector.intensity_scale,
            pace_emit_every: config.detector.pace_emit_every,
            stop_on_close,
        }
    }

    /// Runs until `Stop`, a transport failure, or (for finite sources) the
    /// end of the stream. Consumes the engine.
    pub fn run(mut self) {
        info!(
            "session engine: starting, source={}, session={}",
            self.source.name(),
            self.session_id
        );
        self.begin_session();
        if let Some(state) = self.connection.begin_connect(self.clock.now_ms()) {
            self.hub.publish_connection(state);
        }

        loop {
            let mut stop = false;
            while let Ok(command) = self.commands.try_recv() {
                if !self.handle_command(command) {
                    stop = true;
                }
            }
            if stop {
                break;
            }

            match self.source.poll(POLL_TIMEOUT) {
                Ok(event) => {
                    if !self.process_source_event(event) {
                        break;
                    }
                }
                Err(e) => {
                    error!("session engine: source failed: {}", e);
                    if let Some(state) = self.connection.transport_failed() {
                        self.hub.publish_connection(state);
                    }
                    break;
                }
            }

            self.tick();
        }

        self.finish_session();
        self.source.disconnect();
        info!(
            "session engine: stopped, session={}, reps={}",
            self.session_id, self.rep_count
        );
    }

    /// Returns false when the loop must stop.
    fn handle_command(&mut self, command: EngineCommand) -> bool {
        match command {
            EngineCommand::StartAutoDetect => self.start_auto_detect(),
            EngineCommand::Reset => self.reset_session(),
            EngineCommand::Connect => {
                if let Some(state) = self.connection.begin_connect(self.clock.now_ms()) {
                    self.hub.publish_connection(state);
                }
            }
            EngineCommand::Stop => return false,
        }
        true
    }

    /// Returns false when the loop must stop.
    fn process_source_event(&mut self, event: SourceEvent) -> bool {
        match event {
            SourceEvent::Sample(raw) => {
                if let Some(sample) = self.normalizer.ingest(raw, self.clock.now_ms()) {
                    self.process_sample(sample);
                }
            }
            SourceEvent::Connected => {
                // A handshake after a remote close or failure is the source
                // reconnecting on its own; walk the machine through connecting.
                if matches!(
                    self.connection.state(),
                    ConnectionState::Disconnected | ConnectionState::Error
                ) {
                    if let Some(state) = self.connection.begin_connect(self.clock.now_ms()) {
                        self.hub.publish_connection(state);
                    }
                }
                if let Some(state) = self.connection.connected() {
                    self.hub.publish_connection(state);
                }
            }
            SourceEvent::Rep { amplitude } => self.on_remote_rep(amplitude),
            SourceEvent::Heartbeat { sample_idx } => {
                debug!("session engine: heartbeat at sample {}", sample_idx);
            }
            SourceEvent::ResetAck => {
                info!("session engine: remote acknowledged reset");
            }
            SourceEvent::ExerciseDetected { exercise, rep_count } => {
                self.on_remote_detection(exercise, rep_count);
            }
            SourceEvent::AutoDetectStarted => {
                info!("session engine: remote auto-detect collecting");
            }
            SourceEvent::Idle => {}
            SourceEvent::Closed => {
                if let Some(state) = self.connection.remote_closed() {
                    self.hub.publish_connection(state);
                }
                if self.pending.take().is_some() {
                    self.publish_detection(AutoDetectOutcome::Failed {
                        reason: "stream closed before the window filled".to_string(),
                    });
                }
                if self.stop_on_close {
                    info!("session engine: stream ended");
                    return false;
                }
            }
        }
        true
    }

    fn process_sample(&mut self, sample: crate::types::Sample) {
        self.sample_seq += 1;

        if let Some(collection) = self.pending.as_mut() {
            collection.push(sample);
            if collection.is_complete() {
                self.resolve_collection();
            }
        }

        // A remote detector owns the rep pipeline for its stream; samples
        // then only serve feature collection.
        if self.source.detects_reps_remotely() {
            return;
        }

        if let Some(event) = self.detector.process_sample(&sample) {
            self.on_local_rep(event);
        }

        if self.sample_seq % self.pace_emit_every == 0 {
            if let Some(smoothed) = self.detector.smoothed() {
                let signal =
                    self.pace
                        .on_sample(smoothed, self.detector.is_ascending(), sample.timestamp_ms);
                self.hub.publish_pace(signal);
            }
        }
    }

    fn on_local_rep(&mut self, event: RepEvent) {
        self.rep_count += 1;
        self.last_rep_at_ms = Some(event.timestamp_ms);
        self.pace.on_rep(event.timestamp_ms, event.duration_ms);
        if let Some(cleared) = self.rest.on_rep(event.timestamp_ms) {
            self.hub.publish_session_event(cleared);
        }
        self.record(RecorderTask::RecordRep {
            session_id: self.session_id.clone(),
            set_index: self.rest.set_index(),
            event: event.clone(),
        });
        debug!(
            "rep {} at {} ms, peak {:.2}, intensity {:.2}",
            self.rep_count, event.timestamp_ms, event.peak_acceleration, event.intensity
        );
        self.hub.publish_rep(event);
    }

    /// A pre-detected rep from a remote pipeline: trusted as confirmed, so
    /// the local smoother and cooldown are bypassed entirely.
    fn on_remote_rep(&mut self, amplitude: f64) {
        let now = self.clock.now_ms();
        let since = self.last_rep_at_ms.unwrap_or(self.clock.session_start_ms());
        let event = RepEvent::new(
            now,
            amplitude,
            (now - since).max(0) as u64,
            amplitude / self.intensity_scale,
        );
        self.on_local_rep(event);
    }

    fn start_auto_detect(&mut self) {
        if self.pending.is_some() {
            warn!("session engine: auto-detect already collecting, request ignored");
            return;
        }
        if let Err(e) = self.source.request_auto_detect() {
            warn!("session engine: auto-detect request not delivered: {}", e);
        }
        // Collect locally even when the remote also answers; whichever side
        // resolves first wins and the other is discarded.
        let now = self.clock.now_ms();
        self.pending = Some(FeatureCollection::new(self.window_ms, now));
        info!("session engine: auto-detect collecting for {} ms", self.window_ms);
    }

    fn resolve_collection(&mut self) {
        let collection = match self.pending.take() {
            Some(c) => c,
            None => return,
        };
        let window = collection.into_window();
        let outcome = match classify_window(&*self.model, &window, self.sub_window, self.step) {
            Ok(verdict) => gate_confidence(verdict, self.min_confidence),
            Err(e) => AutoDetectOutcome::Failed { reason: e.to_string() },
        };
        self.publish_detection(outcome);
    }

    fn on_remote_detection(&mut self, exercise: String, rep_count: u32) {
        if self.pending.take().is_some() {
            debug!("session engine: remote detection preempted local collection");
        }
        // The remote detector reports only its winning label.
        self.rep_count = self.rep_count.max(rep_count);
        self.publish_detection(AutoDetectOutcome::Exercise {
            label: exercise,
            confidence: 1.0,
        });
    }

    /// Every started pass ends here exactly once; subscribers waiting on a
    /// request always get an answer, even for aborted collections.
    fn publish_detection(&mut self, outcome: AutoDetectOutcome) {
        match &outcome {
            AutoDetectOutcome::Exercise { label, confidence } => {
                info!("auto-detect: {} (confidence {:.2})", label, confidence);
            }
            AutoDetectOutcome::Undetermined { best_guess, confidence } => {
                info!(
                    "auto-detect: undetermined (best guess {} at {:.2})",
                    best_guess, confidence
                );
            }
            AutoDetectOutcome::Failed { reason } => {
                warn!("auto-detect: aborted ({})", reason);
            }
        }
        if let Some(label) = outcome.label() {
            self.record(RecorderTask::LabelSession {
                session_id: self.session_id.clone(),
                exercise: label.to_string(),
            });
        }
        self.hub.publish_auto_detect(AutoDetectResult {
            outcome,
            rep_count_at_detection: self.rep_count,
        });
    }

    /// Periodic work: rest monitoring, connect timeout, collection expiry.
    fn tick(&mut self) {
        let now = self.clock.now_ms();
        if now - self.last_tick_ms < self.tick_interval_ms as i64 {
            return;
        }
        self.last_tick_ms = now;

        for event in self.rest.tick(now) {
            if let SessionEvent::SetCompleted { set_index, rep_count, at_ms } = event {
                self.record(RecorderTask::RecordSetBoundary {
                    session_id: self.session_id.clone(),
                    set_index,
                    rep_count,
                    at_ms,
                });
            }
            self.hub.publish_session_event(event);
        }

        if let Some(state) = self.connection.tick(now) {
            self.hub.publish_connection(state);
        }

        if self.pending.as_ref().is_some_and(|c| c.is_expired(now)) {
            self.pending = None;
            self.publish_detection(AutoDetectOutcome::Failed {
                reason: "collection starved past its deadline".to_string(),
            });
        }
    }

    fn reset_session(&mut self) {
        info!("session engine: reset, session {} closes", self.session_id);
        self.finish_session();

        if let Err(e) = self.source.request_reset() {
            warn!("session engine: reset not delivered to source: {}", e);
        }

        self.clock = SessionClock::start();
        let start = self.clock.session_start_ms();
        self.normalizer.reset();
        self.detector.reset(start);
        self.pace.reset();
        self.rest.reset(start);
        self.pending = None;
        self.rep_count = 0;
        self.last_rep_at_ms = None;
        self.sample_seq = 0;
        self.last_tick_ms = 0;
        self.session_id = generate_session_id();
        self.begin_session();
    }

    fn begin_session(&mut self) {
        self.record(RecorderTask::BeginSession {
            session_id: self.session_id.clone(),
            source: self.source.name().to_string(),
            started_at_ms: self.clock.session_start_ms(),
        });
    }

    fn finish_session(&mut self) {
        self.record(RecorderTask::FinishSession {
            session_id: self.session_id.clone(),
            finished_at_ms: self.clock.now_ms(),
            rep_count: self.rep_count,
        });
    }

    fn record(&self, task: RecorderTask) {
        if let Some(sender) = &self.recorder {
            if sender.try_send(task).is_err() {
                warn!("session engine: recorder queue unavailable, task dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classification;
    use crate::session::ConnectionState;
    use crate::signal::features::FeatureVector;
    use crate::types::RawReading;
    use crossbeam_channel::unbounded;
    use std::collections::VecDeque;

    /// Source double driven by a pre-scripted event queue.
    struct ScriptedSource {
        events: VecDeque<SourceEvent>,
        remote: bool,
        auto_detect_requests: u32,
        reset_requests: u32,
    }

    impl ScriptedSource {
        fn new(remote: bool) -> Self {
            Self {
                events: VecDeque::new(),
                remote,
                auto_detect_requests: 0,
                reset_requests: 0,
            }
        }
    }

    impl SampleSource for ScriptedSource {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn poll(&mut self, _timeout: Duration) -> Result<SourceEvent, crate::source::SourceError> {
            Ok(self.events.pop_front().unwrap_or(SourceEvent::Idle))
        }

        fn request_auto_detect(&mut self) -> Result<(), crate::source::SourceError> {
            self.auto_detect_requests += 1;
            Ok(())
        }

        fn request_reset(&mut self) -> Result<(), crate::source::SourceError> {
            self.reset_requests += 1;
            Ok(())
        }

        fn disconnect(&mut self) {}

        fn detects_reps_remotely(&self) -> bool {
            self.remote
        }
    }

    /// Always answers with the same verdict.
    struct FixedModel {
        label: &'static str,
        confidence: f64,
    }

    impl ExerciseModel for FixedModel {
        fn classify(&self, _features: &FeatureVector) -> Classification {
            Classification {
                label: self.label.to_string(),
                confidence: self.confidence,
            }
        }
    }

    fn engine(remote: bool, confidence: f64) -> (SessionEngine, Receiver<RecorderTask>) {
        let mut config = AppConfig::default();
        config.detector.smoothing_alpha = 0.7;
        config.detector.cooldown_ms = 150;
        let (task_tx, task_rx) = unbounded();
        let hub = EventHub::new(64);
        let (_cmd_tx, cmd_rx) = unbounded();
        let engine = SessionEngine::new(
            &config,
            Box::new(ScriptedSource::new(remote)),
            Box::new(FixedModel { label: "bicep_curl", confidence }),
            hub,
            Some(task_tx),
            cmd_rx,
        );
        (engine, task_rx)
    }

    fn raw(x: f64, t: i64) -> SourceEvent {
        SourceEvent::Sample(RawReading::new(x, 0.0, 0.0, Some(t)))
    }

    #[test]
    fn local_samples_confirm_reps_and_record_them() {
        let (mut e, tasks) = engine(false, 0.9);
        let reps = e.hub.subscribe_reps();

        let wave = [0.0, 0.5, 1.0, 2.0, 1.8, 1.0, 0.3, 0.2, 2.5, 2.3, 1.0, 0.1];
        for (i, &x) in wave.iter().enumerate() {
            assert!(e.process_source_event(raw(x, i as i64 * 50)));
        }

        let got: Vec<RepEvent> = reps.try_iter().collect();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].timestamp_ms, 250);
        assert_eq!(got[1].timestamp_ms, 500);

        let recorded: Vec<RecorderTask> = tasks.try_iter().collect();
        let reps_recorded = recorded
            .iter()
            .filter(|t| matches!(t, RecorderTask::RecordRep { .. }))
            .count();
        assert_eq!(reps_recorded, 2);
    }

    #[test]
    fn remote_reps_bypass_the_local_detector() {
        let (mut e, tasks) = engine(true, 0.9);
        let reps = e.hub.subscribe_reps();

        // Sub-threshold samples that could never confirm locally, then a
        // pre-detected rep.
        e.process_source_event(raw(0.1, 0));
        e.process_source_event(raw(0.1, 50));
        e.process_source_event(SourceEvent::Rep { amplitude: 40.0 });
        e.process_source_event(SourceEvent::Rep { amplitude: 60.0 });

        let got: Vec<RepEvent> = reps.try_iter().collect();
        assert_eq!(got.len(), 2);
        // Default intensity_scale 12 clamps these amplitudes to 1.0.
        assert_eq!(got[0].intensity, 1.0);
        assert_eq!(e.rep_count, 2);
        assert!(tasks
            .try_iter()
            .any(|t| matches!(t, RecorderTask::RecordRep { .. })));
    }

    #[test]
    fn auto_detect_collects_classifies_and_labels() {
        let (mut e, tasks) = engine(false, 0.9);
        let results = e.hub.subscribe_auto_detect();

        e.handle_command(EngineCommand::StartAutoDetect);
        assert!(e.pending.is_some());

        // 4 s of samples at 50 ms spacing closes the default 4000 ms window.
        for i in 0..=80 {
            e.process_source_event(raw(0.5, i * 50));
        }
        assert!(e.pending.is_none());

        let result = results.try_recv().unwrap();
        assert_eq!(
            result.outcome,
            AutoDetectOutcome::Exercise {
                label: "bicep_curl".to_string(),
                confidence: 0.9,
            }
        );
        assert!(tasks.try_iter().any(|t| matches!(
            t,
            RecorderTask::LabelSession { ref exercise, .. } if exercise == "bicep_curl"
        )));
    }

    #[test]
    fn low_confidence_detection_is_undetermined_and_unlabeled() {
        let (mut e, tasks) = engine(false, 0.3);
        let results = e.hub.subscribe_auto_detect();

        e.handle_command(EngineCommand::StartAutoDetect);
        for i in 0..=80 {
            e.process_source_event(raw(0.5, i * 50));
        }

        let result = results.try_recv().unwrap();
        assert!(matches!(
            result.outcome,
            AutoDetectOutcome::Undetermined { ref best_guess, .. } if best_guess == "bicep_curl"
        ));
        assert!(!tasks
            .try_iter()
            .any(|t| matches!(t, RecorderTask::LabelSession { .. })));
    }

    #[test]
    fn sparse_window_resolves_as_failed() {
        let (mut e, tasks) = engine(false, 0.9);
        let results = e.hub.subscribe_auto_detect();

        e.handle_command(EngineCommand::StartAutoDetect);
        // Two samples spanning the whole window close the collection but
        // leave far too few points to classify.
        e.process_source_event(raw(0.5, 0));
        e.process_source_event(raw(0.5, 4000));
        assert!(e.pending.is_none());

        let result = results.try_recv().unwrap();
        assert!(matches!(result.outcome, AutoDetectOutcome::Failed { .. }));
        assert!(result.outcome.label().is_none());
        assert!(!tasks
            .try_iter()
            .any(|t| matches!(t, RecorderTask::LabelSession { .. })));
    }

    #[test]
    fn close_mid_collection_resolves_as_failed() {
        let (mut e, tasks) = engine(false, 0.9);
        let results = e.hub.subscribe_auto_detect();

        e.handle_command(EngineCommand::StartAutoDetect);
        e.process_source_event(raw(0.5, 0));
        assert!(e.process_source_event(SourceEvent::Closed));

        assert!(e.pending.is_none());
        let result = results.try_recv().unwrap();
        assert!(matches!(result.outcome, AutoDetectOutcome::Failed { .. }));
        assert!(!tasks
            .try_iter()
            .any(|t| matches!(t, RecorderTask::LabelSession { .. })));
    }

    #[test]
    fn connect_command_retries_after_transport_error() {
        let (mut e, _tasks) = engine(false, 0.9);
        let connection = e.hub.subscribe_connection();

        e.connection.begin_connect(0);
        e.connection.transport_failed();
        assert_eq!(e.connection.state(), ConnectionState::Error);

        assert!(e.handle_command(EngineCommand::Connect));
        assert_eq!(e.connection.state(), ConnectionState::Connecting);
        assert_eq!(
            connection.try_recv().unwrap(),
            ConnectionState::Connecting
        );
    }

    #[test]
    fn remote_detection_preempts_local_collection() {
        let (mut e, _tasks) = engine(true, 0.9);
        let results = e.hub.subscribe_auto_detect();

        e.handle_command(EngineCommand::StartAutoDetect);
        assert!(e.pending.is_some());
        e.process_source_event(SourceEvent::ExerciseDetected {
            exercise: "shoulder_press".to_string(),
            rep_count: 7,
        });

        assert!(e.pending.is_none());
        let result = results.try_recv().unwrap();
        assert_eq!(result.rep_count_at_detection, 7);
        assert_eq!(
            result.outcome,
            AutoDetectOutcome::Exercise {
                label: "shoulder_press".to_string(),
                confidence: 1.0,
            }
        );
    }

    #[test]
    fn connected_and_closed_drive_the_connection_stream() {
        let (mut e, _tasks) = engine(false, 0.9);
        let connection = e.hub.subscribe_connection();

        if let Some(state) = e.connection.begin_connect(0) {
            e.hub.publish_connection(state);
        }
        e.process_source_event(SourceEvent::Connected);
        e.process_source_event(SourceEvent::Closed);
        // The source reconnecting on its own walks back to connected.
        e.process_source_event(SourceEvent::Connected);

        let states: Vec<ConnectionState> = connection.try_iter().collect();
        assert_eq!(
            states,
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Disconnected,
                ConnectionState::Connecting,
                ConnectionState::Connected,
            ]
        );
    }

    #[test]
    fn reset_starts_a_fresh_session() {
        let (mut e, tasks) = engine(false, 0.9);
        let wave = [0.0, 2.0, 0.1];
        for (i, &x) in wave.iter().enumerate() {
            e.process_source_event(raw(x, i as i64 * 300));
        }
        assert_eq!(e.rep_count, 1);
        let old_id = e.session_id.clone();

        e.handle_command(EngineCommand::Reset);
        assert_eq!(e.rep_count, 0);
        assert_ne!(e.session_id, old_id);
        assert!(e.detector.smoothed().is_none());

        let recorded: Vec<RecorderTask> = tasks.try_iter().collect();
        assert!(recorded
            .iter()
            .any(|t| matches!(t, RecorderTask::FinishSession { session_id, .. } if *session_id == old_id)));
        assert!(recorded
            .iter()
            .any(|t| matches!(t, RecorderTask::BeginSession { session_id, .. } if *session_id == e.session_id)));
    }

    #[test]
    fn stop_command_ends_the_loop() {
        let (mut e, _tasks) = engine(false, 0.9);
        assert!(e.handle_command(EngineCommand::StartAutoDetect));
        assert!(!e.handle_command(EngineCommand::Stop));
    }

    #[test]
    fn malformed_samples_never_reach_the_detector() {
        let (mut e, _tasks) = engine(false, 0.9);
        let reps = e.hub.subscribe_reps();
        e.process_source_event(raw(f64::NAN, 0));
        e.process_source_event(raw(5000.0, 50));
        e.process_source_event(raw(0.0, 100));
        assert!(reps.try_recv().is_err());
        assert_eq!(e.normalizer.dropped(), 2);
    }
}
