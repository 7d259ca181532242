mod classifier;
mod config;
mod logger;
mod session;
mod signal;
mod source;
mod store;
mod types;
mod utils;

use std::env;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};
use log::{debug, error, info, warn};

use classifier::{CentroidModel, ExerciseModel};
use config::AppConfig;
use session::{EngineCommand, EventHub, SessionEngine};
use source::{RemoteSource, SampleSource, SimulatedSource};
use store::run_store_worker;
use types::{AutoDetectOutcome, SessionEvent};
use utils::format_timestamp;

struct CliArgs {
    config_path: Option<String>,
    auto_detect: bool,
}

fn parse_args() -> CliArgs {
    let mut args = CliArgs {
        config_path: None,
        auto_detect: false,
    };
    for arg in env::args().skip(1) {
        if arg == "--auto-detect" {
            args.auto_detect = true;
        } else {
            args.config_path = Some(arg);
        }
    }
    args
}

fn load_config(path: Option<&str>) -> AppConfig {
    let path = path.unwrap_or("config.toml");
    if Path::new(path).exists() {
        match AppConfig::load_from_file(path) {
            Ok(config) => {
                info!("Configuration loaded from {}", path);
                return config;
            }
            Err(e) => {
                error!("Failed to load {}: {}", path, e);
                std::process::exit(1);
            }
        }
    }
    info!("No configuration file at {}, using defaults", path);
    AppConfig::default()
}

fn build_source(config: &AppConfig) -> Result<Box<dyn SampleSource>, source::SourceError> {
    match config.source.kind.as_str() {
        "remote" => {
            let remote =
                RemoteSource::connect(&config.source.mqtt, config.channels.sample_queue_capacity)?;
            Ok(Box::new(remote))
        }
        _ => Ok(Box::new(SimulatedSource::new(&config.source.simulated))),
    }
}

fn load_model(config: &AppConfig) -> Box<dyn ExerciseModel> {
    match &config.classifier.model_path {
        Some(path) => match CentroidModel::load(Path::new(path)) {
            Ok(model) => {
                info!("Classifier model loaded from {}", path);
                Box::new(model)
            }
            Err(e) => {
                warn!("Failed to load model {}: {}, falling back to built-in", path, e);
                Box::new(CentroidModel::builtin())
            }
        },
        None => Box::new(CentroidModel::builtin()),
    }
}

fn main() {
    logger::init_logger();
    info!("repsense starting");

    let args = parse_args();
    let config = load_config(args.config_path.as_deref());

    let shutdown_signal = Arc::new(AtomicBool::new(false));

    // Store worker thread: owns the DuckDB connection for its lifetime.
    let mut recorder_sender = None;
    let mut store_handle = None;
    if config.store.enabled {
        let (task_sender, task_receiver) = bounded(config.channels.store_task_capacity);
        let db_path = config.store_path();
        let store_shutdown = Arc::clone(&shutdown_signal);
        store_handle = Some(thread::spawn(move || {
            if let Err(e) = run_store_worker(db_path, task_receiver, store_shutdown) {
                error!("Store worker failed: {}", e);
            }
        }));
        recorder_sender = Some(task_sender);
    }

    let source = match build_source(&config) {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to open sample source: {}", e);
            std::process::exit(1);
        }
    };
    let model = load_model(&config);

    // Subscribe before the engine thread takes the hub.
    let mut hub = EventHub::new(config.channels.event_queue_capacity);
    let reps = hub.subscribe_reps();
    let pace = hub.subscribe_pace();
    let connection = hub.subscribe_connection();
    let detections = hub.subscribe_auto_detect();
    let session_events = hub.subscribe_session_events();

    let (command_sender, command_receiver) = bounded(16);
    let engine = SessionEngine::new(
        &config,
        source,
        model,
        hub,
        recorder_sender.clone(),
        command_receiver,
    );
    let engine_handle = thread::spawn(move || engine.run());

    if args.auto_detect {
        if let Err(e) = command_sender.send(EngineCommand::StartAutoDetect) {
            warn!("Engine not accepting commands: {}", e);
        }
    }

    // Consume the event streams until the engine drops its hub.
    loop {
        match reps.recv_timeout(Duration::from_millis(100)) {
            Ok(rep) => info!(
                "Rep at {} peak {:.2} duration {} ms intensity {:.2}",
                format_timestamp(rep.timestamp_ms),
                rep.peak_acceleration,
                rep.duration_ms,
                rep.intensity
            ),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        for signal in pace.try_iter() {
            if signal.active {
                debug!(
                    "Pace: {} phase, deviation {:+.2}",
                    signal.phase.as_str(),
                    signal.deviation
                );
            }
        }
        for state in connection.try_iter() {
            info!("Connection: {}", state);
        }
        for result in detections.try_iter() {
            match result.outcome {
                AutoDetectOutcome::Exercise { label, confidence } => info!(
                    "Detected exercise: {} (confidence {:.2}, {} reps so far)",
                    label, confidence, result.rep_count_at_detection
                ),
                AutoDetectOutcome::Undetermined { best_guess, confidence } => info!(
                    "Exercise undetermined (best guess {} at {:.2})",
                    best_guess, confidence
                ),
                AutoDetectOutcome::Failed { reason } => {
                    warn!("Exercise detection aborted: {}", reason)
                }
            }
        }
        for event in session_events.try_iter() {
            match event {
                SessionEvent::SetCompleted { set_index, rep_count, at_ms } => info!(
                    "Set {} completed with {} reps at {}",
                    set_index,
                    rep_count,
                    format_timestamp(at_ms)
                ),
                SessionEvent::RestWarning { idle_ms, at_ms } => warn!(
                    "Rest warning: idle for {} s at {}",
                    idle_ms / 1000,
                    format_timestamp(at_ms)
                ),
                SessionEvent::RestWarningCleared { .. } => info!("Rest warning cleared"),
            }
        }
    }

    info!("Event streams closed, shutting down");
    let _ = command_sender.send(EngineCommand::Stop);
    if engine_handle.join().is_err() {
        error!("Engine thread panicked");
    }

    // Dropping the last task sender lets the store worker drain and exit.
    drop(recorder_sender);
    shutdown_signal.store(true, Ordering::Relaxed);
    if let Some(handle) = store_handle {
        match handle.join() {
            Ok(()) => info!("Store worker shut down gracefully"),
            Err(_) => error!("Store worker panicked"),
        }
    }

    info!("repsense stopped");
}
