use crate::cli::GpuProbeKind;
use crate::domain::constants::{
    DEFAULT_GPU_MEMORY_LIMIT, DEFAULT_MAX_PARALLEL, DEFAULT_MAX_RUN_MINUTES, DEFAULT_MAX_TEMP_C,
    DEFAULT_MIN_FREE_RAM_GB, DEFAULT_MIN_FREE_VRAM_MB, DEFAULT_STEPS, DEFAULT_STEP_INTERVAL_MS,
};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
pub struct JsonOut<T: Serialize> {
    pub ok: bool,
    pub data: T,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub ok: bool,
    pub error: ErrorBody,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Timeboxed,
    Stopped,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Timeboxed => "timeboxed",
            RunStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RunRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: RunStatus,
    #[serde(default)]
    pub checkpoints: Vec<String>,
    /// Single-checkpoint field from older state files; read as a fallback
    /// when `checkpoints` is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checkpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_step: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_loss: Option<f64>,
    pub start_time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
}

/// Persisted token-bucket state. `last_refill` is epoch seconds; zero marks a
/// bucket that has never been refilled (fresh state file).
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct BucketState {
    pub tokens: u32,
    pub last_refill: u64,
}

impl Default for BucketState {
    fn default() -> Self {
        Self {
            tokens: crate::domain::constants::TOKEN_BUCKET_CAPACITY,
            last_refill: 0,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct State {
    #[serde(default)]
    pub runs: Vec<RunRecord>,
    #[serde(default)]
    pub bucket: BucketState,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum GpuMemoryLimit {
    Megabytes(f64),
    /// Relative limit such as `"80%"`.
    Expression(String),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GpuConfig {
    pub probe: GpuProbeKind,
    pub min_free_vram_mb: f64,
    pub max_temp_c: f64,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            probe: GpuProbeKind::Auto,
            min_free_vram_mb: DEFAULT_MIN_FREE_VRAM_MB,
            max_temp_c: DEFAULT_MAX_TEMP_C,
        }
    }
}

/// Effective run configuration after merging defaults, the config file, and
/// CLI flags.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub steps: u64,
    pub step_interval_ms: u64,
    pub max_run_minutes: f64,
    pub max_parallel: u32,
    pub min_free_ram_gb: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_memory_limit: Option<GpuMemoryLimit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_every_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_from: Option<String>,
    pub gpu: GpuConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            run_id: None,
            name: None,
            steps: DEFAULT_STEPS,
            step_interval_ms: DEFAULT_STEP_INTERVAL_MS,
            max_run_minutes: DEFAULT_MAX_RUN_MINUTES,
            max_parallel: DEFAULT_MAX_PARALLEL,
            min_free_ram_gb: DEFAULT_MIN_FREE_RAM_GB,
            gpu_memory_limit: Some(GpuMemoryLimit::Expression(
                DEFAULT_GPU_MEMORY_LIMIT.to_string(),
            )),
            checkpoint_every_minutes: None,
            resume_from: None,
            gpu: GpuConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GpuReading {
    pub vram_used_mb: f64,
    pub vram_free_mb: f64,
    pub temperature_c: f64,
    pub utilization_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceSnapshot {
    pub ram_free_gb: f64,
    pub ram_total_gb: f64,
    pub load_1m: f64,
    pub gpu: Option<GpuReading>,
    pub monitoring_failed: bool,
}

#[derive(Serialize)]
pub struct ExperimentDetail {
    pub run: RunRecord,
    pub latest_checkpoint: Option<String>,
}

#[derive(Serialize)]
pub struct CompareReport {
    pub a: RunRecord,
    pub b: RunRecord,
    /// `b.last_loss - a.last_loss`, rounded like emitted losses.
    pub loss_delta: Option<f64>,
    pub step_delta: Option<i64>,
}
