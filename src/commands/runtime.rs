use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::cli::{Cli, Commands};
use crate::domain::constants::{
    INITIAL_LOSS, LOSS_DECAY_PER_STEP, TOKEN_BUCKET_CAPACITY, TOKEN_REFILL_SECS,
};
use crate::domain::models::{RunRecord, RunStatus};
use crate::services::config::{self, ConfigOverlay, GpuOverlay};
use crate::services::format::format_duration;
use crate::services::governor::{self, GovernorError};
use crate::services::monitor;
use crate::services::store::{self, StoreError};
use crate::trainer::{self, TrainParams};

pub fn handle_run_command(cli: &Cli) -> anyhow::Result<bool> {
    let Commands::Run {
        run_id,
        name,
        steps,
        step_interval_ms,
        max_run_minutes,
        max_parallel,
        checkpoint_every_minutes,
        resume_from,
        gpu_probe,
    } = &cli.command
    else {
        return Ok(false);
    };

    let flags = ConfigOverlay {
        run_id: run_id.clone(),
        name: name.clone(),
        steps: *steps,
        step_interval_ms: *step_interval_ms,
        max_run_minutes: *max_run_minutes,
        max_parallel: *max_parallel,
        min_free_ram_gb: None,
        gpu_memory_limit: None,
        checkpoint_every_minutes: *checkpoint_every_minutes,
        resume_from: resume_from.clone(),
        gpu: GpuOverlay {
            probe: *gpu_probe,
            min_free_vram_mb: None,
            max_temp_c: None,
        },
    };
    let config = config::load(cli.config.as_deref(), flags)?;

    let mut state = store::load_state()?;

    // The token is charged before anything else; a denied run still spent it.
    let tokens_ok = governor::acquire(
        &mut state.bucket,
        1,
        TOKEN_BUCKET_CAPACITY,
        TOKEN_REFILL_SECS,
        store::now_secs(),
    );
    store::save_state(&state)?;
    if !tokens_ok {
        return Err(GovernorError::Denied("token bucket exhausted".to_string()).into());
    }

    let snapshot = monitor::snapshot(config.gpu.probe);
    let decision = governor::admit(&snapshot, &config, store::running_count(&state));
    if !decision.allowed {
        let reason = decision
            .reason
            .unwrap_or_else(|| "resources unavailable".to_string());
        return Err(GovernorError::Denied(reason).into());
    }

    let run_id = config
        .run_id
        .clone()
        .unwrap_or_else(|| format!("run-{}", store::now_millis()));

    let (start_step, initial_loss) = match &config.resume_from {
        Some(checkpoint) => {
            let (last_step, last_loss) = store::resolve_resume(&state, &run_id, checkpoint)?;
            if last_step >= config.steps {
                return Err(StoreError::ResumeComplete(run_id, last_step).into());
            }
            (
                last_step + 1,
                trainer::round4((last_loss - LOSS_DECAY_PER_STEP).max(0.0)),
            )
        }
        None => (1, INITIAL_LOSS),
    };

    let now_ms = store::now_millis();
    let (start_time, prior_checkpoints) = match &config.resume_from {
        Some(_) => {
            let existing = store::get_run(&state, &run_id)?;
            (existing.start_time, existing.checkpoints.clone())
        }
        None => (now_ms, Vec::new()),
    };

    store::upsert_run(
        &mut state,
        RunRecord {
            id: run_id.clone(),
            name: config.name.clone(),
            status: RunStatus::Running,
            checkpoints: prior_checkpoints,
            last_checkpoint: None,
            last_step: (start_step > 1).then(|| start_step - 1),
            last_loss: None,
            start_time,
            end_time: None,
        },
    );
    store::save_state(&state)?;
    store::audit(
        "run_start",
        serde_json::json!({
            "run_id": run_id,
            "steps": config.steps,
            "resumed": config.resume_from.is_some()
        }),
    );
    info!("starting training run {run_id}");

    let interrupt = install_interrupt_flag()?;
    let params = TrainParams {
        steps: config.steps,
        step_interval: Duration::from_millis(config.step_interval_ms),
        initial_loss,
        loss_decay: LOSS_DECAY_PER_STEP,
        checkpoint_every: config
            .checkpoint_every_minutes
            .map(|minutes| Duration::from_secs_f64(minutes * 60.0)),
        deadline: Duration::from_secs_f64(config.max_run_minutes * 60.0),
        start_step,
    };

    let stdout = std::io::stdout();
    let outcome = trainer::run(&params, &mut stdout.lock(), &interrupt)?;

    let mut finished = store::get_run(&state, &run_id)?.clone();
    finished.status = outcome.status;
    finished.last_step = Some(outcome.last_step);
    finished.last_loss = Some(outcome.last_loss);
    finished.checkpoints.extend(outcome.checkpoints.iter().cloned());
    finished.end_time = Some(store::now_millis());
    store::upsert_run(&mut state, finished);
    store::save_state(&state)?;
    store::audit(
        "run_end",
        serde_json::json!({
            "run_id": run_id,
            "status": outcome.status.to_string(),
            "last_step": outcome.last_step
        }),
    );

    info!(
        "run {run_id} {} in {}",
        outcome.status,
        format_duration(0, outcome.duration_ms)
    );
    Ok(true)
}

/// First interrupt asks the trainer to stop after a final checkpoint; a
/// second one force-quits without saving.
fn install_interrupt_flag() -> anyhow::Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    let presses = AtomicUsize::new(0);
    ctrlc::set_handler(move || {
        if presses.fetch_add(1, Ordering::SeqCst) == 0 {
            info!("interrupt received, saving checkpoint (press again to force quit)");
            handler_flag.store(true, Ordering::SeqCst);
        } else {
            std::process::exit(1);
        }
    })?;
    Ok(flag)
}
