use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{error, info, warn};

use crate::types::RecorderTask;

use super::workout_store::WorkoutStore;

/// Store worker loop. Owns the DuckDB connection for its whole lifetime;
/// persistence failures are logged and never propagate back into the
/// detection path.
pub fn run_store_worker(
    db_path: PathBuf,
    task_receiver: Receiver<RecorderTask>,
    shutdown_signal: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = match WorkoutStore::open(&db_path) {
        Ok(store) => {
            info!("Store worker: DuckDB initialized successfully");
            store
        }
        Err(e) => {
            error!("Store worker: failed to initialize DuckDB: {}", e);
            return Err(e.into());
        }
    };

    info!("Store worker thread started");

    while !shutdown_signal.load(Ordering::Relaxed) {
        match task_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(task) => handle_task(&store, task),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                info!("Store worker: task channel closed, shutting down");
                break;
            }
        }
    }

    info!("Store worker thread exiting");
    Ok(())
}

fn handle_task(store: &WorkoutStore, task: RecorderTask) {
    match task {
        RecorderTask::BeginSession { session_id, source, started_at_ms } => {
            if let Err(e) = store.begin_session(&session_id, &source, started_at_ms) {
                warn!("Store worker: failed to begin session {}: {}", session_id, e);
            }
        }
        RecorderTask::RecordRep { session_id, set_index, event } => {
            if let Err(e) = store.record_rep(&session_id, set_index, &event) {
                warn!("Store worker: failed to record rep for {}: {}", session_id, e);
            }
        }
        RecorderTask::RecordSetBoundary { session_id, set_index, rep_count, at_ms } => {
            if let Err(e) = store.record_set_boundary(&session_id, set_index, rep_count, at_ms) {
                warn!("Store worker: failed to record set for {}: {}", session_id, e);
            }
        }
        RecorderTask::LabelSession { session_id, exercise } => {
            if let Err(e) = store.label_session(&session_id, &exercise) {
                warn!("Store worker: failed to label session {}: {}", session_id, e);
            }
        }
        RecorderTask::FinishSession { session_id, finished_at_ms, rep_count } => {
            if let Err(e) = store.finish_session(&session_id, finished_at_ms, rep_count) {
                warn!("Store worker: failed to finish session {}: {}", session_id, e);
            }
        }
        RecorderTask::GetSessionSummaries { limit, response_sender } => {
            let summaries = store.session_summaries(limit).unwrap_or_default();
            if let Err(e) = response_sender.try_send(summaries) {
                warn!("Store worker: failed to send session summaries: {}", e);
            }
        }
        RecorderTask::GetSessionReps { session_id, response_sender } => {
            let reps = store.session_reps(&session_id).unwrap_or_default();
            if let Err(e) = response_sender.try_send(reps) {
                warn!("Store worker: failed to send session reps: {}", e);
            }
        }
    }
}
