//! Stable defaults shared across the crate.

/// Default number of simulated training steps.
pub const DEFAULT_STEPS: u64 = 2;

/// Default pause between steps, in milliseconds.
pub const DEFAULT_STEP_INTERVAL_MS: u64 = 100;

/// Loss emitted for the first step of a fresh run.
pub const INITIAL_LOSS: f64 = 0.5;

/// Linear per-step loss decay of the simulated schedule.
pub const LOSS_DECAY_PER_STEP: f64 = 0.1;

/// Checkpoint path reported when a run is interrupted or timeboxed.
pub const FINAL_CHECKPOINT: &str = "ckpt-final";

pub const DEFAULT_MAX_RUN_MINUTES: f64 = 10.0;
pub const DEFAULT_MAX_PARALLEL: u32 = 2;
pub const DEFAULT_MIN_FREE_RAM_GB: f64 = 4.0;
pub const DEFAULT_GPU_MEMORY_LIMIT: &str = "80%";
pub const DEFAULT_MIN_FREE_VRAM_MB: f64 = 2500.0;
pub const DEFAULT_MAX_TEMP_C: f64 = 85.0;

/// Runs admitted before the token bucket is empty.
pub const TOKEN_BUCKET_CAPACITY: u32 = 4;

/// One token earned back per this many seconds.
pub const TOKEN_REFILL_SECS: u64 = 60;

/// Governor warns (but still admits) within this margin below the GPU
/// temperature limit.
pub const TEMP_WARN_MARGIN_C: f64 = 3.0;

/// Config files probed in the current directory, first found wins.
pub const CONFIG_FILE_NAMES: [&str; 2] = ["trainctl.config.json", ".trainctl.json"];
