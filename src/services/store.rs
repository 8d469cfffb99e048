use crate::domain::models::{RunRecord, RunStatus, State};
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("run not found: {0}")]
    RunNotFound(String),
    #[error("run {run} has no checkpoint named {checkpoint}")]
    CheckpointMismatch { run: String, checkpoint: String },
    #[error("run {0} has no recorded progress to resume from")]
    NothingToResume(String),
    #[error("run {0} already reached step {1}, nothing left to resume")]
    ResumeComplete(String, u64),
}

pub fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub fn now_secs() -> u64 {
    now_millis() / 1000
}

fn state_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")?;
    Ok(PathBuf::from(home).join(".config/trainctl"))
}

fn state_path() -> anyhow::Result<PathBuf> {
    Ok(state_dir()?.join("state.json"))
}

/// Missing or corrupt state loads as empty; a half-written file must never
/// brick the CLI.
pub fn load_state() -> anyhow::Result<State> {
    let p = state_path()?;
    if !p.exists() {
        return Ok(State::default());
    }
    let raw = std::fs::read_to_string(&p)?;
    match serde_json::from_str(&raw) {
        Ok(state) => Ok(state),
        Err(err) => {
            warn!("state file {} is unreadable, starting fresh: {err}", p.display());
            Ok(State::default())
        }
    }
}

pub fn save_state(state: &State) -> anyhow::Result<()> {
    let p = state_path()?;
    if let Some(parent) = p.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(p, serde_json::to_string_pretty(state)?)?;
    Ok(())
}

pub fn upsert_run(state: &mut State, record: RunRecord) {
    if let Some(existing) = state.runs.iter_mut().find(|r| r.id == record.id) {
        *existing = record;
    } else {
        state.runs.push(record);
    }
}

pub fn get_run<'a>(state: &'a State, run_id: &str) -> Result<&'a RunRecord, StoreError> {
    state
        .runs
        .iter()
        .find(|r| r.id == run_id)
        .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))
}

pub fn running_count(state: &State) -> usize {
    state
        .runs
        .iter()
        .filter(|r| r.status == RunStatus::Running)
        .count()
}

/// Newest checkpoint of a run: last element of `checkpoints`, falling back
/// to the legacy single-checkpoint field.
pub fn latest_checkpoint(record: &RunRecord) -> Option<&str> {
    record
        .checkpoints
        .last()
        .or(record.last_checkpoint.as_ref())
        .map(String::as_str)
}

/// All runs, newest first.
pub fn list_runs(state: &State) -> Vec<RunRecord> {
    let mut runs = state.runs.clone();
    runs.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    runs
}

/// Where a resumed run picks up: the stored record must exist, its newest
/// checkpoint must match, and it must have recorded progress.
pub fn resolve_resume(
    state: &State,
    run_id: &str,
    checkpoint: &str,
) -> Result<(u64, f64), StoreError> {
    let record = get_run(state, run_id)?;
    if latest_checkpoint(record) != Some(checkpoint) {
        return Err(StoreError::CheckpointMismatch {
            run: run_id.to_string(),
            checkpoint: checkpoint.to_string(),
        });
    }
    match (record.last_step, record.last_loss) {
        (Some(step), Some(loss)) => Ok((step, loss)),
        _ => Err(StoreError::NothingToResume(run_id.to_string())),
    }
}

/// Best-effort append to the audit log; failures are deliberately swallowed
/// so bookkeeping can never break a run.
pub fn audit(action: &str, data: serde_json::Value) {
    let Ok(dir) = state_dir() else { return };
    let path = dir.join("audit.jsonl");
    if std::fs::create_dir_all(&dir).is_err() {
        return;
    }
    let event = serde_json::json!({
        "ts": now_secs(),
        "action": action,
        "data": data
    });
    let line = format!("{}\n", event);
    let _ = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut f| std::io::Write::write_all(&mut f, line.as_bytes()));
}
