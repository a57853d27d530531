//! File-backed StateStore: one directory per run.
//!
//! ```text
//! <root>/<run_id>/state.json      latest snapshot, replaced atomically
//! <root>/<run_id>/history.jsonl   one IterationRecord per line
//! <root>/<run_id>/log.jsonl       one RunLogEntry per line
//! <root>/<run_id>/schedule.json   best candidate
//! <root>/<run_id>/report.json     best candidate's evaluation
//! <root>/<run_id>/lease.json      present while a loop drives the run
//! ```
//!
//! Leases are exclusive within one store instance. Across processes, taking
//! over an expired lease is last-writer-wins; the loser notices on its next
//! renewal.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    BestResult, Candidate, Evaluation, IterationRecord, RunLogEntry, RunState,
};
use crate::domain::ports::StateStore;

const STATE_FILE: &str = "state.json";
const HISTORY_FILE: &str = "history.jsonl";
const LOG_FILE: &str = "log.jsonl";
const SCHEDULE_FILE: &str = "schedule.json";
const REPORT_FILE: &str = "report.json";
const LEASE_FILE: &str = "lease.json";

#[derive(Debug, Serialize, Deserialize)]
struct Lease {
    holder: String,
    acquired_at: DateTime<Utc>,
    /// Missing in leases without expiry, which then count as expired.
    #[serde(default)]
    expires_at: DateTime<Utc>,
}

impl Lease {
    fn new(holder: &str, acquired_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> Self {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            holder: holder.to_string(),
            acquired_at,
            expires_at,
        }
    }
}

pub struct FileStateStore {
    root: PathBuf,
    /// Serializes appends and lease changes made through this instance.
    write_lock: Mutex<()>,
}

impl FileStateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_dir(&self, run_id: Uuid) -> PathBuf {
        self.root.join(run_id.to_string())
    }

    fn run_file(&self, run_id: Uuid, name: &str) -> PathBuf {
        self.run_dir(run_id).join(name)
    }

    async fn write_json<T: Serialize>(&self, run_id: Uuid, name: &str, value: &T) -> DomainResult<()> {
        let dir = self.run_dir(run_id);
        fs::create_dir_all(&dir).await?;

        let json = serde_json::to_string_pretty(value)?;
        let tmp = dir.join(format!("{name}.tmp"));
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, dir.join(name)).await?;
        Ok(())
    }

    async fn read_json<T: DeserializeOwned>(path: &Path) -> DomainResult<Option<T>> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn append_line<T: Serialize>(&self, run_id: Uuid, name: &str, value: &T) -> DomainResult<()> {
        let dir = self.run_dir(run_id);
        fs::create_dir_all(&dir).await?;

        let mut line = serde_json::to_string(value)?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(name))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn read_lines<T: DeserializeOwned>(path: &Path) -> DomainResult<Vec<T>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(DomainError::from))
            .collect()
    }

    /// Replace a JSONL file through a temp file and rename.
    async fn rewrite_lines<T: Serialize>(&self, run_id: Uuid, name: &str, values: &[T]) -> DomainResult<()> {
        let dir = self.run_dir(run_id);
        let mut content = String::new();
        for value in values {
            content.push_str(&serde_json::to_string(value)?);
            content.push('\n');
        }

        let tmp = dir.join(format!("{name}.tmp"));
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, dir.join(name)).await?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load_run(&self, run_id: Uuid) -> DomainResult<Option<RunState>> {
        Self::read_json(&self.run_file(run_id, STATE_FILE)).await
    }

    async fn save_state(&self, state: &RunState) -> DomainResult<()> {
        self.write_json(state.run_id, STATE_FILE, state).await?;
        debug!(run_id = %state.run_id, iteration = state.current_iteration, "State checkpoint written");
        Ok(())
    }

    async fn append_iteration(&self, state: &RunState, record: &IterationRecord) -> DomainResult<()> {
        let _guard = self.write_lock.lock().await;

        let history: Vec<IterationRecord> =
            Self::read_lines(&self.run_file(state.run_id, HISTORY_FILE)).await?;
        if let Some(last) = history.last() {
            if record.iteration <= last.iteration {
                return Err(DomainError::ValidationFailed(format!(
                    "Iteration {} is not after the last recorded iteration {} of run {}",
                    record.iteration, last.iteration, state.run_id
                )));
            }
        }

        self.append_line(state.run_id, HISTORY_FILE, record).await
    }

    async fn truncate_history(&self, run_id: Uuid, iteration: u32) -> DomainResult<usize> {
        let _guard = self.write_lock.lock().await;

        let mut history: Vec<IterationRecord> =
            Self::read_lines(&self.run_file(run_id, HISTORY_FILE)).await?;
        let before = history.len();
        history.retain(|record| record.iteration <= iteration);

        let removed = before - history.len();
        if removed > 0 {
            self.rewrite_lines(run_id, HISTORY_FILE, &history).await?;
        }
        Ok(removed)
    }

    async fn load_history(&self, run_id: Uuid, limit: Option<usize>) -> DomainResult<Vec<IterationRecord>> {
        let mut history: Vec<IterationRecord> =
            Self::read_lines(&self.run_file(run_id, HISTORY_FILE)).await?;
        if let Some(limit) = limit {
            let skip = history.len().saturating_sub(limit);
            history.drain(..skip);
        }
        Ok(history)
    }

    async fn log(&self, state: &RunState, message: &str) -> DomainResult<()> {
        let entry = RunLogEntry {
            timestamp: Utc::now(),
            iteration: state.current_iteration,
            message: message.to_string(),
        };
        let _guard = self.write_lock.lock().await;
        self.append_line(state.run_id, LOG_FILE, &entry).await
    }

    async fn load_log(&self, run_id: Uuid) -> DomainResult<Vec<RunLogEntry>> {
        Self::read_lines(&self.run_file(run_id, LOG_FILE)).await
    }

    async fn save_schedule(&self, state: &RunState, candidate: &Candidate) -> DomainResult<()> {
        self.write_json(state.run_id, SCHEDULE_FILE, candidate).await
    }

    async fn save_report(&self, state: &RunState, evaluation: &Evaluation) -> DomainResult<()> {
        self.write_json(state.run_id, REPORT_FILE, evaluation).await
    }

    async fn load_best(&self, run_id: Uuid) -> DomainResult<Option<BestResult>> {
        let candidate: Option<Candidate> = Self::read_json(&self.run_file(run_id, SCHEDULE_FILE)).await?;
        let evaluation: Option<Evaluation> = Self::read_json(&self.run_file(run_id, REPORT_FILE)).await?;

        Ok(candidate
            .zip(evaluation)
            .map(|(candidate, evaluation)| BestResult { candidate, evaluation }))
    }

    async fn list_runs(&self, limit: usize) -> DomainResult<Vec<RunState>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut runs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path().join(STATE_FILE);
            if let Some(state) = Self::read_json::<RunState>(&path).await? {
                runs.push(state);
            }
        }

        runs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        runs.truncate(limit);
        Ok(runs)
    }

    async fn acquire_lease(&self, run_id: Uuid, holder: &str, ttl: Duration) -> DomainResult<()> {
        let _guard = self.write_lock.lock().await;
        let dir = self.run_dir(run_id);
        fs::create_dir_all(&dir).await?;
        let path = dir.join(LEASE_FILE);
        let now = Utc::now();

        match fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(mut file) => {
                let lease = Lease::new(holder, now, now, ttl);
                file.write_all(serde_json::to_string(&lease)?.as_bytes()).await?;
                file.flush().await?;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let content = fs::read_to_string(&path).await?;
                // Empty when a holder died between creating and writing the file.
                let current: Option<Lease> = if content.trim().is_empty() {
                    None
                } else {
                    Some(serde_json::from_str(&content)?)
                };

                let acquired_at = match current {
                    Some(lease) if lease.holder == holder => lease.acquired_at,
                    Some(lease) if lease.expires_at > now => {
                        return Err(DomainError::RunAlreadyActive {
                            run_id,
                            holder: lease.holder,
                        });
                    }
                    Some(lease) => {
                        warn!(run_id = %run_id, stale_holder = %lease.holder, "Took over expired run lease");
                        now
                    }
                    None => now,
                };

                self.write_json(run_id, LEASE_FILE, &Lease::new(holder, acquired_at, now, ttl))
                    .await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn release_lease(&self, run_id: Uuid, holder: &str) -> DomainResult<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.run_file(run_id, LEASE_FILE);

        let current: Option<Lease> = Self::read_json(&path).await?;
        if current.is_some_and(|lease| lease.holder == holder) {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }
}
