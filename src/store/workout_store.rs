use std::fs;
use std::path::Path;

use duckdb::{params, Connection, Result as DuckResult};
use log::{error, info, warn};

use crate::types::{RepEvent, SessionSummary};

/// Workout history on DuckDB: one row per session, one per confirmed rep,
/// one per completed set. Owned by the store worker thread; everything else
/// talks to it through `RecorderTask`.
pub struct WorkoutStore {
    conn: Connection,
}

impl WorkoutStore {
    pub fn open(path: &Path) -> DuckResult<Self> {
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create store directory {}: {}", parent.display(), e);
            }
        }
        let conn = Connection::open(path)?;
        info!("Workout store opened at: {}", path.display());
        let store = WorkoutStore { conn };
        store.create_tables()?;
        Ok(store)
    }

    pub fn open_in_memory() -> DuckResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = WorkoutStore { conn };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> DuckResult<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS workout_sessions (
                session_id VARCHAR PRIMARY KEY,
                source VARCHAR,
                exercise VARCHAR,
                started_at_ms BIGINT,
                finished_at_ms BIGINT,
                rep_count INTEGER DEFAULT 0,
                set_count INTEGER DEFAULT 0,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        self.conn
            .execute("CREATE SEQUENCE IF NOT EXISTS workout_reps_seq", [])?;
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS workout_reps (
                id INTEGER PRIMARY KEY DEFAULT nextval('workout_reps_seq'),
                session_id VARCHAR,
                set_index INTEGER,
                timestamp_ms BIGINT,
                peak_acceleration DOUBLE,
                duration_ms BIGINT,
                intensity DOUBLE
            )",
            [],
        )?;

        self.conn
            .execute("CREATE SEQUENCE IF NOT EXISTS workout_sets_seq", [])?;
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS workout_sets (
                id INTEGER PRIMARY KEY DEFAULT nextval('workout_sets_seq'),
                session_id VARCHAR,
                set_index INTEGER,
                rep_count INTEGER,
                completed_at_ms BIGINT
            )",
            [],
        )?;

        info!("Workout store tables ready");
        Ok(())
    }

    pub fn begin_session(&self, session_id: &str, source: &str, started_at_ms: i64) -> DuckResult<()> {
        self.conn.execute(
            "INSERT INTO workout_sessions (session_id, source, started_at_ms)
             VALUES (?, ?, ?)",
            params![session_id, source, started_at_ms],
        )?;
        info!("Store: session {} started ({})", session_id, source);
        Ok(())
    }

    pub fn record_rep(&self, session_id: &str, set_index: u32, event: &RepEvent) -> DuckResult<()> {
        self.conn.execute(
            "INSERT INTO workout_reps
                (session_id, set_index, timestamp_ms, peak_acceleration, duration_ms, intensity)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                session_id,
                set_index,
                event.timestamp_ms,
                event.peak_acceleration,
                event.duration_ms as i64,
                event.intensity
            ],
        )?;
        Ok(())
    }

    pub fn record_set_boundary(
        &self,
        session_id: &str,
        set_index: u32,
        rep_count: u32,
        at_ms: i64,
    ) -> DuckResult<()> {
        self.conn.execute(
            "INSERT INTO workout_sets (session_id, set_index, rep_count, completed_at_ms)
             VALUES (?, ?, ?, ?)",
            params![session_id, set_index, rep_count, at_ms],
        )?;
        self.conn.execute(
            "UPDATE workout_sessions SET set_count = ? WHERE session_id = ?",
            params![set_index + 1, session_id],
        )?;
        Ok(())
    }

    pub fn label_session(&self, session_id: &str, exercise: &str) -> DuckResult<()> {
        let updated = self.conn.execute(
            "UPDATE workout_sessions SET exercise = ? WHERE session_id = ?",
            params![exercise, session_id],
        )?;
        if updated == 0 {
            warn!("Store: label for unknown session {}", session_id);
        }
        Ok(())
    }

    pub fn finish_session(&self, session_id: &str, finished_at_ms: i64, rep_count: u32) -> DuckResult<()> {
        self.conn.execute(
            "UPDATE workout_sessions SET finished_at_ms = ?, rep_count = ? WHERE session_id = ?",
            params![finished_at_ms, rep_count, session_id],
        )?;
        info!("Store: session {} finished with {} reps", session_id, rep_count);
        Ok(())
    }

    /// Most recent sessions first.
    pub fn session_summaries(&self, limit: usize) -> DuckResult<Vec<SessionSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id, source, exercise, started_at_ms, finished_at_ms,
                    rep_count, set_count
             FROM workout_sessions
             ORDER BY started_at_ms DESC
             LIMIT ?",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok(SessionSummary {
                session_id: row.get(0)?,
                source: row.get(1)?,
                exercise: row.get::<_, Option<String>>(2)?,
                started_at_ms: row.get(3)?,
                finished_at_ms: row.get::<_, Option<i64>>(4)?,
                rep_count: row.get::<_, i64>(5)? as u32,
                set_count: row.get::<_, i64>(6)? as u32,
            })
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?);
        }
        Ok(summaries)
    }

    /// Reps of one session in time order.
    pub fn session_reps(&self, session_id: &str) -> DuckResult<Vec<RepEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp_ms, peak_acceleration, duration_ms, intensity
             FROM workout_reps
             WHERE session_id = ?
             ORDER BY timestamp_ms",
        )?;
        let rows = stmt.query_map([session_id], |row| {
            Ok(RepEvent {
                timestamp_ms: row.get(0)?,
                peak_acceleration: row.get(1)?,
                duration_ms: row.get::<_, i64>(2)? as u64,
                intensity: row.get(3)?,
            })
        })?;

        let mut reps = Vec::new();
        for row in rows {
            reps.push(row?);
        }
        Ok(reps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rep(t: i64, peak: f64) -> RepEvent {
        RepEvent::new(t, peak, 1000, peak / 12.0)
    }

    #[test]
    fn full_session_round_trip() {
        let store = WorkoutStore::open_in_memory().unwrap();
        store.begin_session("s1", "simulated", 1000).unwrap();
        store.record_rep("s1", 0, &rep(2000, 2.5)).unwrap();
        store.record_rep("s1", 0, &rep(4000, 3.0)).unwrap();
        store.record_set_boundary("s1", 0, 2, 14_000).unwrap();
        store.record_rep("s1", 1, &rep(20_000, 2.0)).unwrap();
        store.label_session("s1", "bicep_curl").unwrap();
        store.finish_session("s1", 30_000, 3).unwrap();

        let summaries = store.session_summaries(10).unwrap();
        assert_eq!(summaries.len(), 1);
        let s = &summaries[0];
        assert_eq!(s.session_id, "s1");
        assert_eq!(s.source, "simulated");
        assert_eq!(s.exercise.as_deref(), Some("bicep_curl"));
        assert_eq!(s.started_at_ms, 1000);
        assert_eq!(s.finished_at_ms, Some(30_000));
        assert_eq!(s.rep_count, 3);
        assert_eq!(s.set_count, 1);

        let reps = store.session_reps("s1").unwrap();
        assert_eq!(reps.len(), 3);
        assert_eq!(reps[0].timestamp_ms, 2000);
        assert!((reps[1].peak_acceleration - 3.0).abs() < 1e-12);
        assert_eq!(reps[2].timestamp_ms, 20_000);
    }

    #[test]
    fn unfinished_session_has_no_finish_time() {
        let store = WorkoutStore::open_in_memory().unwrap();
        store.begin_session("s1", "remote", 500).unwrap();
        let s = &store.session_summaries(10).unwrap()[0];
        assert_eq!(s.finished_at_ms, None);
        assert_eq!(s.exercise, None);
        assert_eq!(s.rep_count, 0);
    }

    #[test]
    fn summaries_are_newest_first_and_limited() {
        let store = WorkoutStore::open_in_memory().unwrap();
        for i in 0..5 {
            store
                .begin_session(&format!("s{}", i), "simulated", i * 1000)
                .unwrap();
        }
        let summaries = store.session_summaries(3).unwrap();
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[0].session_id, "s4");
        assert_eq!(summaries[2].session_id, "s2");
    }

    #[test]
    fn reps_are_scoped_to_their_session() {
        let store = WorkoutStore::open_in_memory().unwrap();
        store.begin_session("a", "simulated", 0).unwrap();
        store.begin_session("b", "simulated", 1).unwrap();
        store.record_rep("a", 0, &rep(100, 2.0)).unwrap();
        store.record_rep("b", 0, &rep(200, 2.0)).unwrap();
        assert_eq!(store.session_reps("a").unwrap().len(), 1);
        assert_eq!(store.session_reps("b").unwrap().len(), 1);
        assert!(store.session_reps("c").unwrap().is_empty());
    }
}
