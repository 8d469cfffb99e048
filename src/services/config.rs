use crate::cli::GpuProbeKind;
use crate::domain::constants::CONFIG_FILE_NAMES;
use crate::domain::models::{Config, GpuMemoryLimit};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be positive")]
    NotPositive(&'static str),
    #[error("max_parallel must be at least 1")]
    ZeroParallel,
    #[error("run_id must not be empty")]
    EmptyRunId,
    #[error("Path traversal ('..') is not allowed in {0}")]
    PathTraversal(&'static str),
    #[error("gpu_memory_limit must be positive megabytes or a percentage like \"80%\"")]
    BadGpuMemoryLimit,
    #[error("resume_from requires an explicit run_id")]
    ResumeWithoutRunId,
}

/// Partial config as read from a file or assembled from CLI flags. Every
/// field is optional; merge order is defaults < file < flags.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigOverlay {
    pub run_id: Option<String>,
    pub name: Option<String>,
    pub steps: Option<u64>,
    pub step_interval_ms: Option<u64>,
    pub max_run_minutes: Option<f64>,
    pub max_parallel: Option<u32>,
    pub min_free_ram_gb: Option<f64>,
    pub gpu_memory_limit: Option<GpuMemoryLimit>,
    pub checkpoint_every_minutes: Option<f64>,
    pub resume_from: Option<String>,
    pub gpu: GpuOverlay,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GpuOverlay {
    pub probe: Option<GpuProbeKind>,
    pub min_free_vram_mb: Option<f64>,
    pub max_temp_c: Option<f64>,
}

/// Load the effective config: discover a config file, overlay it on the
/// defaults, overlay the CLI flags on top, then validate.
pub fn load(explicit_path: Option<&str>, flags: ConfigOverlay) -> anyhow::Result<Config> {
    let mut config = Config::default();
    if let Some(file) = read_file_overlay(explicit_path) {
        apply(&mut config, file);
    }
    apply(&mut config, flags);
    validate(&config)?;
    Ok(config)
}

fn candidate_paths(explicit_path: Option<&str>) -> Vec<PathBuf> {
    explicit_path
        .map(PathBuf::from)
        .into_iter()
        .chain(CONFIG_FILE_NAMES.iter().copied().map(PathBuf::from))
        .collect()
}

/// First readable, parsable candidate wins. Unparsable files are warned
/// about and skipped; missing files are skipped silently.
fn read_file_overlay(explicit_path: Option<&str>) -> Option<ConfigOverlay> {
    for path in candidate_paths(explicit_path) {
        if !path.exists() {
            continue;
        }
        match read_overlay(&path) {
            Ok(overlay) => return Some(overlay),
            Err(err) => warn!("could not parse config file at {}: {err}", path.display()),
        }
    }
    None
}

fn read_overlay(path: &Path) -> anyhow::Result<ConfigOverlay> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn apply(config: &mut Config, overlay: ConfigOverlay) {
    if overlay.run_id.is_some() {
        config.run_id = overlay.run_id;
    }
    if overlay.name.is_some() {
        config.name = overlay.name;
    }
    if let Some(v) = overlay.steps {
        config.steps = v;
    }
    if let Some(v) = overlay.step_interval_ms {
        config.step_interval_ms = v;
    }
    if let Some(v) = overlay.max_run_minutes {
        config.max_run_minutes = v;
    }
    if let Some(v) = overlay.max_parallel {
        config.max_parallel = v;
    }
    if let Some(v) = overlay.min_free_ram_gb {
        config.min_free_ram_gb = v;
    }
    if overlay.gpu_memory_limit.is_some() {
        config.gpu_memory_limit = overlay.gpu_memory_limit;
    }
    if overlay.checkpoint_every_minutes.is_some() {
        config.checkpoint_every_minutes = overlay.checkpoint_every_minutes;
    }
    if overlay.resume_from.is_some() {
        config.resume_from = overlay.resume_from;
    }
    if let Some(v) = overlay.gpu.probe {
        config.gpu.probe = v;
    }
    if let Some(v) = overlay.gpu.min_free_vram_mb {
        config.gpu.min_free_vram_mb = v;
    }
    if let Some(v) = overlay.gpu.max_temp_c {
        config.gpu.max_temp_c = v;
    }
}

pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.steps == 0 {
        return Err(ConfigError::NotPositive("steps"));
    }
    if config.max_run_minutes <= 0.0 {
        return Err(ConfigError::NotPositive("max_run_minutes"));
    }
    if config.max_parallel == 0 {
        return Err(ConfigError::ZeroParallel);
    }
    if config.min_free_ram_gb <= 0.0 {
        return Err(ConfigError::NotPositive("min_free_ram_gb"));
    }
    if let Some(minutes) = config.checkpoint_every_minutes {
        if minutes <= 0.0 {
            return Err(ConfigError::NotPositive("checkpoint_every_minutes"));
        }
    }
    if matches!(&config.run_id, Some(id) if id.is_empty()) {
        return Err(ConfigError::EmptyRunId);
    }
    if let Some(resume) = &config.resume_from {
        if resume.is_empty() || resume.contains("..") {
            return Err(ConfigError::PathTraversal("resume_from"));
        }
        if config.run_id.is_none() {
            return Err(ConfigError::ResumeWithoutRunId);
        }
    }
    if let Some(limit) = &config.gpu_memory_limit {
        validate_gpu_memory_limit(limit)?;
    }
    if config.gpu.min_free_vram_mb <= 0.0 {
        return Err(ConfigError::NotPositive("gpu.min_free_vram_mb"));
    }
    if config.gpu.max_temp_c <= 0.0 {
        return Err(ConfigError::NotPositive("gpu.max_temp_c"));
    }
    Ok(())
}

fn validate_gpu_memory_limit(limit: &GpuMemoryLimit) -> Result<(), ConfigError> {
    match limit {
        GpuMemoryLimit::Megabytes(mb) if *mb > 0.0 => Ok(()),
        GpuMemoryLimit::Expression(s) => {
            let percent = s
                .strip_suffix('%')
                .and_then(|p| p.trim().parse::<f64>().ok())
                .filter(|p| *p > 0.0 && *p <= 100.0);
            if percent.is_some() {
                Ok(())
            } else {
                Err(ConfigError::BadGpuMemoryLimit)
            }
        }
        _ => Err(ConfigError::BadGpuMemoryLimit),
    }
}
