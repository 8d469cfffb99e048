use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::domain::constants::FINAL_CHECKPOINT;
use crate::domain::models::RunStatus;
use crate::services::output::emit_line;

/// How often the sleep between steps polls for interrupts and the deadline.
const POLL_SLICE: Duration = Duration::from_millis(20);

/// One line of the run stream.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum TrainEvent {
    Progress { step: u64, loss: f64 },
    Checkpoint { event: String, path: String },
}

impl TrainEvent {
    fn checkpoint(path: impl Into<String>) -> Self {
        TrainEvent::Checkpoint {
            event: "checkpoint_saved".to_string(),
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainParams {
    /// Last step of the run (inclusive).
    pub steps: u64,
    pub step_interval: Duration,
    /// Loss emitted at `start_step`.
    pub initial_loss: f64,
    pub loss_decay: f64,
    pub checkpoint_every: Option<Duration>,
    pub deadline: Duration,
    /// First step to emit; greater than 1 when resuming.
    pub start_step: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub last_step: u64,
    pub last_loss: f64,
    pub checkpoints: Vec<String>,
    pub duration_ms: u64,
}

enum Pause {
    Elapsed,
    Interrupted,
    DeadlineReached,
}

/// Execute the simulated training loop, writing one flushed NDJSON line per
/// event to `sink`.
///
/// The first progress record is emitted immediately; every further step is
/// preceded by `step_interval`. An interrupt or the deadline observed during
/// that pause produces a final `checkpoint_saved` record instead of the next
/// step.
pub fn run(
    params: &TrainParams,
    sink: &mut impl Write,
    interrupt: &AtomicBool,
) -> anyhow::Result<RunOutcome> {
    let started = Instant::now();
    let mut checkpoints = Vec::new();
    let mut checkpoint_mark = started;

    let mut last_step = params.start_step;
    let mut last_loss = loss_for(params, params.start_step);
    emit_line(
        sink,
        &TrainEvent::Progress {
            step: last_step,
            loss: last_loss,
        },
    )?;

    for step in params.start_step + 1..=params.steps {
        let status = match pause(params, started, interrupt) {
            Pause::Elapsed => None,
            Pause::Interrupted => Some(RunStatus::Stopped),
            Pause::DeadlineReached => Some(RunStatus::Timeboxed),
        };
        if let Some(status) = status {
            emit_line(sink, &TrainEvent::checkpoint(FINAL_CHECKPOINT))?;
            checkpoints.push(FINAL_CHECKPOINT.to_string());
            return Ok(outcome(status, last_step, last_loss, checkpoints, started));
        }

        last_loss = loss_for(params, step);
        last_step = step;
        emit_line(
            sink,
            &TrainEvent::Progress {
                step,
                loss: last_loss,
            },
        )?;

        if let Some(every) = params.checkpoint_every {
            if checkpoint_mark.elapsed() >= every {
                let path = format!("ckpt-{step}");
                emit_line(sink, &TrainEvent::checkpoint(&path))?;
                checkpoints.push(path);
                checkpoint_mark = Instant::now();
            }
        }
    }

    Ok(outcome(
        RunStatus::Completed,
        last_step,
        last_loss,
        checkpoints,
        started,
    ))
}

fn outcome(
    status: RunStatus,
    last_step: u64,
    last_loss: f64,
    checkpoints: Vec<String>,
    started: Instant,
) -> RunOutcome {
    RunOutcome {
        status,
        last_step,
        last_loss,
        checkpoints,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

/// Sleep `step_interval`, waking early when interrupted or past the deadline.
fn pause(params: &TrainParams, started: Instant, interrupt: &AtomicBool) -> Pause {
    let mut remaining = params.step_interval;
    loop {
        if interrupt.load(Ordering::SeqCst) {
            return Pause::Interrupted;
        }
        if started.elapsed() >= params.deadline {
            return Pause::DeadlineReached;
        }
        if remaining.is_zero() {
            return Pause::Elapsed;
        }
        let slice = remaining.min(POLL_SLICE);
        std::thread::sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
}

fn loss_for(params: &TrainParams, step: u64) -> f64 {
    let decayed = params.initial_loss - params.loss_decay * (step - params.start_step) as f64;
    round4(decayed.max(0.0))
}

/// Round to four decimal places so the emitted schedule serializes without
/// float noise (`0.5 - 0.1` prints as `0.4`).
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
