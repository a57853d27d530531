//! SQLite implementation of the StateStore.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    BestResult, Candidate, Evaluation, GeneratorParams, IterationRecord, RunLogEntry, RunState,
    RunStatus, StopReason,
};
use crate::domain::ports::StateStore;

#[derive(Clone)]
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn load_run(&self, run_id: Uuid) -> DomainResult<Option<RunState>> {
        let row: Option<RunRow> = sqlx::query_as("SELECT * FROM optimization_runs WHERE id = ?")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(RunState::try_from).transpose()
    }

    async fn save_state(&self, state: &RunState) -> DomainResult<()> {
        let params_json = serde_json::to_string(&state.current_params)?;

        sqlx::query(
            r#"INSERT INTO optimization_runs (
                id, scenario, start_date, end_date, max_iterations, target_score,
                current_iteration, current_params_json, best_score,
                iterations_since_improvement, status, stop_reason, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                scenario = excluded.scenario,
                start_date = excluded.start_date,
                end_date = excluded.end_date,
                max_iterations = excluded.max_iterations,
                target_score = excluded.target_score,
                current_iteration = excluded.current_iteration,
                current_params_json = excluded.current_params_json,
                best_score = excluded.best_score,
                iterations_since_improvement = excluded.iterations_since_improvement,
                status = excluded.status,
                stop_reason = excluded.stop_reason,
                updated_at = excluded.updated_at"#,
        )
        .bind(state.run_id.to_string())
        .bind(&state.scenario)
        .bind(state.start_date.to_string())
        .bind(state.end_date.to_string())
        .bind(i64::from(state.max_iterations))
        .bind(state.target_score)
        .bind(i64::from(state.current_iteration))
        .bind(&params_json)
        .bind(state.best_score)
        .bind(i64::from(state.iterations_since_improvement))
        .bind(state.status.as_str())
        .bind(state.stop_reason.map(|r| r.as_str()))
        .bind(state.created_at.to_rfc3339())
        .bind(state.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_iteration(&self, state: &RunState, record: &IterationRecord) -> DomainResult<()> {
        let run_id = state.run_id.to_string();
        let mut tx = self.pool.begin().await?;

        let (last,): (Option<i64>,) =
            sqlx::query_as("SELECT MAX(iteration) FROM optimization_iterations WHERE run_id = ?")
                .bind(&run_id)
                .fetch_one(&mut *tx)
                .await?;

        if let Some(last) = last {
            if i64::from(record.iteration) <= last {
                return Err(DomainError::ValidationFailed(format!(
                    "Iteration {} is not after the last recorded iteration {} of run {}",
                    record.iteration, last, state.run_id
                )));
            }
        }

        sqlx::query(
            r#"INSERT INTO optimization_iterations (
                run_id, iteration, timestamp, params_json, score, valid,
                critical_violations, total_violations, violation_types_json, duration_seconds
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&run_id)
        .bind(i64::from(record.iteration))
        .bind(record.timestamp.to_rfc3339())
        .bind(serde_json::to_string(&record.params)?)
        .bind(record.score)
        .bind(i64::from(record.valid))
        .bind(i64::from(record.critical_violations))
        .bind(i64::from(record.total_violations))
        .bind(serde_json::to_string(&record.violation_types)?)
        .bind(record.duration_seconds)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn truncate_history(&self, run_id: Uuid, iteration: u32) -> DomainResult<usize> {
        let result = sqlx::query("DELETE FROM optimization_iterations WHERE run_id = ? AND iteration > ?")
            .bind(run_id.to_string())
            .bind(i64::from(iteration))
            .execute(&self.pool)
            .await?;

        Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
    }

    async fn load_history(&self, run_id: Uuid, limit: Option<usize>) -> DomainResult<Vec<IterationRecord>> {
        // Newest first so LIMIT keeps the tail, then flipped back to ascending.
        let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        let rows: Vec<IterationRow> = sqlx::query_as(
            "SELECT * FROM optimization_iterations WHERE run_id = ? ORDER BY iteration DESC LIMIT ?",
        )
        .bind(run_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut history = rows
            .into_iter()
            .map(IterationRecord::try_from)
            .collect::<DomainResult<Vec<_>>>()?;
        history.reverse();
        Ok(history)
    }

    async fn log(&self, state: &RunState, message: &str) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO optimization_log (run_id, iteration, message, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(state.run_id.to_string())
        .bind(i64::from(state.current_iteration))
        .bind(message)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_log(&self, run_id: Uuid) -> DomainResult<Vec<RunLogEntry>> {
        let rows: Vec<(i64, String, String)> = sqlx::query_as(
            "SELECT iteration, message, created_at FROM optimization_log WHERE run_id = ? ORDER BY id",
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(iteration, message, created_at)| {
                Ok(RunLogEntry {
                    timestamp: super::parse_datetime(&created_at)?,
                    iteration: super::parse_count("iteration", iteration)?,
                    message,
                })
            })
            .collect()
    }

    async fn save_schedule(&self, state: &RunState, candidate: &Candidate) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO optimization_results (run_id, candidate_json, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(run_id) DO UPDATE SET
                candidate_json = excluded.candidate_json,
                updated_at = excluded.updated_at"#,
        )
        .bind(state.run_id.to_string())
        .bind(serde_json::to_string(candidate)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_report(&self, state: &RunState, evaluation: &Evaluation) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO optimization_results (run_id, evaluation_json, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(run_id) DO UPDATE SET
                evaluation_json = excluded.evaluation_json,
                updated_at = excluded.updated_at"#,
        )
        .bind(state.run_id.to_string())
        .bind(serde_json::to_string(evaluation)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_best(&self, run_id: Uuid) -> DomainResult<Option<BestResult>> {
        let row: Option<(Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT candidate_json, evaluation_json FROM optimization_results WHERE run_id = ?",
        )
        .bind(run_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((Some(candidate_json), Some(evaluation_json))) => Ok(Some(BestResult {
                candidate: serde_json::from_str(&candidate_json)?,
                evaluation: serde_json::from_str(&evaluation_json)?,
            })),
            _ => Ok(None),
        }
    }

    async fn list_runs(&self, limit: usize) -> DomainResult<Vec<RunState>> {
        let rows: Vec<RunRow> =
            sqlx::query_as("SELECT * FROM optimization_runs ORDER BY updated_at DESC LIMIT ?")
                .bind(i64::try_from(limit).unwrap_or(i64::MAX))
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(RunState::try_from).collect()
    }

    async fn acquire_lease(&self, run_id: Uuid, holder: &str, ttl: Duration) -> DomainResult<()> {
        let id = run_id.to_string();
        let now = Utc::now();
        let now_ms = now.timestamp_millis();
        let expires_ms = now_ms.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX));
        let mut tx = self.pool.begin().await?;

        let previous: Option<(String, i64)> =
            sqlx::query_as("SELECT holder, expires_at FROM optimization_leases WHERE run_id = ?")
                .bind(&id)
                .fetch_optional(&mut *tx)
                .await?;

        // Only the current holder or anyone after expiry may write the row.
        sqlx::query(
            "INSERT INTO optimization_leases (run_id, holder, acquired_at, expires_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(run_id) DO UPDATE SET
                holder = excluded.holder,
                acquired_at = CASE WHEN holder = excluded.holder THEN acquired_at ELSE excluded.acquired_at END,
                expires_at = excluded.expires_at
             WHERE holder = excluded.holder OR expires_at <= ?",
        )
        .bind(&id)
        .bind(holder)
        .bind(now.to_rfc3339())
        .bind(expires_ms)
        .bind(now_ms)
        .execute(&mut *tx)
        .await?;

        let (current,): (String,) =
            sqlx::query_as("SELECT holder FROM optimization_leases WHERE run_id = ?")
                .bind(&id)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;

        if current != holder {
            return Err(DomainError::RunAlreadyActive {
                run_id,
                holder: current,
            });
        }

        if let Some((stale, _)) = previous.filter(|(previous, _)| previous != holder) {
            warn!(run_id = %run_id, stale_holder = %stale, "Took over expired run lease");
        }
        Ok(())
    }

    async fn release_lease(&self, run_id: Uuid, holder: &str) -> DomainResult<()> {
        sqlx::query("DELETE FROM optimization_leases WHERE run_id = ? AND holder = ?")
            .bind(run_id.to_string())
            .bind(holder)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct RunRow {
    id: String,
    scenario: String,
    start_date: String,
    end_date: String,
    max_iterations: i64,
    target_score: f64,
    current_iteration: i64,
    current_params_json: String,
    best_score: f64,
    iterations_since_improvement: i64,
    status: String,
    stop_reason: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<RunRow> for RunState {
    type Error = DomainError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        let current_params: GeneratorParams = serde_json::from_str(&row.current_params_json)
            .map_err(|e| DomainError::SerializationError(format!("Invalid current_params: {}", e)))?;

        let status: RunStatus = row.status.parse().map_err(DomainError::SerializationError)?;
        let stop_reason = row
            .stop_reason
            .map(|r| r.parse::<StopReason>())
            .transpose()
            .map_err(DomainError::SerializationError)?;

        Ok(RunState {
            run_id: super::parse_uuid(&row.id)?,
            scenario: row.scenario,
            start_date: super::parse_date(&row.start_date)?,
            end_date: super::parse_date(&row.end_date)?,
            max_iterations: super::parse_count("max_iterations", row.max_iterations)?,
            target_score: row.target_score,
            current_iteration: super::parse_count("current_iteration", row.current_iteration)?,
            current_params,
            best_score: row.best_score,
            iterations_since_improvement: super::parse_count(
                "iterations_since_improvement",
                row.iterations_since_improvement,
            )?,
            status,
            stop_reason,
            created_at: super::parse_datetime(&row.created_at)?,
            updated_at: super::parse_datetime(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct IterationRow {
    #[allow(dead_code)]
    run_id: String,
    iteration: i64,
    timestamp: String,
    params_json: String,
    score: f64,
    valid: i64,
    critical_violations: i64,
    total_violations: i64,
    violation_types_json: String,
    duration_seconds: f64,
}

impl TryFrom<IterationRow> for IterationRecord {
    type Error = DomainError;

    fn try_from(row: IterationRow) -> Result<Self, Self::Error> {
        let params: GeneratorParams = serde_json::from_str(&row.params_json)
            .map_err(|e| DomainError::SerializationError(format!("Invalid params: {}", e)))?;
        let violation_types: BTreeSet<String> = serde_json::from_str(&row.violation_types_json)
            .map_err(|e| DomainError::SerializationError(format!("Invalid violation_types: {}", e)))?;

        Ok(IterationRecord {
            iteration: super::parse_count("iteration", row.iteration)?,
            timestamp: super::parse_datetime(&row.timestamp)?,
            params,
            score: row.score,
            valid: row.valid != 0,
            critical_violations: super::parse_count("critical_violations", row.critical_violations)?,
            total_violations: super::parse_count("total_violations", row.total_violations)?,
            violation_types,
            duration_seconds: row.duration_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::{Algorithm, Assignment, ConstraintName, Severity, Violation};
    use chrono::NaiveDate;

    async fn setup_test_store() -> SqliteStateStore {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteStateStore::new(pool)
    }

    async fn new_run(store: &SqliteStateStore) -> RunState {
        store
            .create_run(
                "block-10",
                NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
                NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(),
                50,
                0.9,
                &GeneratorParams::new(Algorithm::CpSat).with_weight(ConstraintName::Equity, 1.5),
            )
            .await
            .unwrap()
    }

    fn record(iteration: u32, score: f64) -> IterationRecord {
        let evaluation = Evaluation::from_violations(
            score,
            vec![Violation::new("call_spacing", "q2 call", Severity::High)],
        );
        IterationRecord::from_evaluation(iteration, GeneratorParams::default(), &evaluation, 0.5)
    }

    #[tokio::test]
    async fn test_create_and_load_run() {
        let store = setup_test_store().await;
        let state = new_run(&store).await;

        let loaded = store.load_run(state.run_id).await.unwrap().unwrap();
        assert_eq!(loaded.run_id, state.run_id);
        assert_eq!(loaded.scenario, "block-10");
        assert_eq!(loaded.status, RunStatus::Running);
        assert_eq!(loaded.current_params, state.current_params);
        assert_eq!(loaded.best_score, state.best_score);

        assert!(store.load_run(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_state_overwrites_snapshot() {
        let store = setup_test_store().await;
        let mut state = new_run(&store).await;

        state.update_with_result(&Evaluation::from_violations(0.7, vec![]));
        state.finish(StopReason::Stagnation);
        store.save_state(&state).await.unwrap();
        store.save_state(&state).await.unwrap();

        let loaded = store.load_run(state.run_id).await.unwrap().unwrap();
        assert_eq!(loaded.current_iteration, 1);
        assert_eq!(loaded.status, RunStatus::Exhausted);
        assert_eq!(loaded.stop_reason, Some(StopReason::Stagnation));
        assert_eq!(store.list_runs(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_history_is_ordered_and_limited() {
        let store = setup_test_store().await;
        let state = new_run(&store).await;

        for i in 1..=5 {
            store.append_iteration(&state, &record(i, f64::from(i) / 10.0)).await.unwrap();
        }

        let all = store.load_history(state.run_id, None).await.unwrap();
        assert_eq!(all.iter().map(|r| r.iteration).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert!(all[0].violation_types.contains("call_spacing"));

        let tail = store.load_history(state.run_id, Some(2)).await.unwrap();
        assert_eq!(tail.iter().map(|r| r.iteration).collect::<Vec<_>>(), vec![4, 5]);
    }

    #[tokio::test]
    async fn test_append_rejects_out_of_order_iteration() {
        let store = setup_test_store().await;
        let state = new_run(&store).await;

        store.append_iteration(&state, &record(2, 0.5)).await.unwrap();
        let err = store.append_iteration(&state, &record(2, 0.9)).await.unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
        assert!(store.append_iteration(&state, &record(1, 0.9)).await.is_err());

        let history = store.load_history(state.run_id, None).await.unwrap();
        assert_eq!(history.len(), 1);
        assert!((history[0].score - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_log_round_trip() {
        let store = setup_test_store().await;
        let state = new_run(&store).await;

        store.log(&state, "Run started").await.unwrap();
        store.log(&state, "Switched to cp_sat").await.unwrap();

        let log = store.load_log(state.run_id).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].message, "Switched to cp_sat");
    }

    #[tokio::test]
    async fn test_best_requires_schedule_and_report() {
        let store = setup_test_store().await;
        let state = new_run(&store).await;
        let candidate = Candidate::new(vec![Assignment {
            person_id: "PGY1-01".into(),
            date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            rotation: "wards".into(),
            shift: "day".into(),
        }]);

        store.save_schedule(&state, &candidate).await.unwrap();
        assert!(store.load_best(state.run_id).await.unwrap().is_none());

        let evaluation = Evaluation::from_violations(0.88, vec![]);
        store.save_report(&state, &evaluation).await.unwrap();

        let best = store.load_best(state.run_id).await.unwrap().unwrap();
        assert_eq!(best.candidate, candidate);
        assert_eq!(best.evaluation, evaluation);
    }

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_lease_is_exclusive() {
        let store = setup_test_store().await;
        let state = new_run(&store).await;

        store.acquire_lease(state.run_id, "worker-a", TTL).await.unwrap();
        store.acquire_lease(state.run_id, "worker-a", TTL).await.unwrap();

        let err = store.acquire_lease(state.run_id, "worker-b", TTL).await.unwrap_err();
        assert!(matches!(err, DomainError::RunAlreadyActive { ref holder, .. } if holder == "worker-a"));

        store.release_lease(state.run_id, "worker-b").await.unwrap();
        assert!(store.acquire_lease(state.run_id, "worker-b", TTL).await.is_err());

        store.release_lease(state.run_id, "worker-a").await.unwrap();
        store.acquire_lease(state.run_id, "worker-b", TTL).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_lease_is_taken_over() {
        let store = setup_test_store().await;
        let state = new_run(&store).await;

        store
            .acquire_lease(state.run_id, "crashed", Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        store.acquire_lease(state.run_id, "worker-b", TTL).await.unwrap();
        let err = store.acquire_lease(state.run_id, "crashed", TTL).await.unwrap_err();
        assert!(matches!(err, DomainError::RunAlreadyActive { ref holder, .. } if holder == "worker-b"));

        // The stale holder's release must not drop the new lease.
        store.release_lease(state.run_id, "crashed").await.unwrap();
        assert!(store.acquire_lease(state.run_id, "worker-c", TTL).await.is_err());
    }

    #[tokio::test]
    async fn test_renewal_extends_lease() {
        let store = setup_test_store().await;
        let state = new_run(&store).await;
        let short = Duration::from_millis(40);

        store.acquire_lease(state.run_id, "worker-a", short).await.unwrap();
        store.acquire_lease(state.run_id, "worker-a", TTL).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(store.acquire_lease(state.run_id, "worker-b", TTL).await.is_err());
    }

    #[tokio::test]
    async fn test_truncate_history_drops_records_after_iteration() {
        let store = setup_test_store().await;
        let state = new_run(&store).await;
        for (iteration, score) in [(1, 0.4), (2, 0.5), (3, 0.6), (4, 0.7)] {
            store.append_iteration(&state, &record(iteration, score)).await.unwrap();
        }

        assert_eq!(store.truncate_history(state.run_id, 2).await.unwrap(), 2);
        assert_eq!(store.truncate_history(state.run_id, 2).await.unwrap(), 0);

        let history = store.load_history(state.run_id, None).await.unwrap();
        assert_eq!(history.iter().map(|r| r.iteration).collect::<Vec<_>>(), vec![1, 2]);
        store.append_iteration(&state, &record(3, 0.65)).await.unwrap();
    }
}
