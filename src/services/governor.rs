use crate::domain::constants::TEMP_WARN_MARGIN_C;
use crate::domain::models::{BucketState, Config, ResourceSnapshot};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum GovernorError {
    #[error("governor rejected run: {0}")]
    Denied(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl Decision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Take `cost` tokens from the bucket, refilling first. A fresh bucket
/// (`last_refill == 0`) starts full. Zero-cost acquisitions always succeed.
///
/// The refill only advances `last_refill` by whole earned intervals so that
/// partial progress toward the next token survives across CLI invocations.
pub fn acquire(
    bucket: &mut BucketState,
    cost: u32,
    capacity: u32,
    refill_secs: u64,
    now_secs: u64,
) -> bool {
    refill(bucket, capacity, refill_secs, now_secs);
    if bucket.tokens >= cost {
        bucket.tokens -= cost;
        true
    } else {
        false
    }
}

fn refill(bucket: &mut BucketState, capacity: u32, refill_secs: u64, now_secs: u64) {
    if bucket.last_refill == 0 {
        bucket.tokens = capacity;
        bucket.last_refill = now_secs;
        return;
    }
    let elapsed = now_secs.saturating_sub(bucket.last_refill);
    let earned = (elapsed / refill_secs.max(1)) as u32;
    if earned > 0 {
        bucket.tokens = bucket.tokens.saturating_add(earned).min(capacity);
        bucket.last_refill += u64::from(earned) * refill_secs.max(1);
    }
}

/// Resource-side admission checks. The token bucket is charged separately
/// (and first) by the caller so that no GPU probe runs when tokens are
/// already exhausted.
pub fn admit(snapshot: &ResourceSnapshot, config: &Config, running: usize) -> Decision {
    if snapshot.monitoring_failed {
        warn!("resource monitoring failed, entering conservative mode");
        if config.max_parallel > 1 {
            return Decision::deny(
                "resource monitoring failed, max_parallel must be 1 in conservative mode",
            );
        }
        return Decision::allow();
    }

    if running >= config.max_parallel as usize {
        return Decision::deny(format!(
            "max parallel runs reached ({running} running >= {})",
            config.max_parallel
        ));
    }

    if let Some(gpu) = &snapshot.gpu {
        let max_temp = config.gpu.max_temp_c;
        if gpu.temperature_c >= max_temp {
            return Decision::deny(format!(
                "GPU temperature too high ({}°C >= {max_temp}°C), cooling down",
                gpu.temperature_c
            ));
        }
        if gpu.temperature_c >= max_temp - TEMP_WARN_MARGIN_C {
            warn!(
                "GPU temperature {}°C is high (limit {max_temp}°C)",
                gpu.temperature_c
            );
        }
        if gpu.vram_free_mb < config.gpu.min_free_vram_mb {
            return Decision::deny(format!(
                "low VRAM ({} MB free < {} MB required)",
                gpu.vram_free_mb, config.gpu.min_free_vram_mb
            ));
        }
    }

    if snapshot.ram_free_gb < config.min_free_ram_gb {
        return Decision::deny(format!(
            "low RAM ({:.2} GB free < {} GB required)",
            snapshot.ram_free_gb, config.min_free_ram_gb
        ));
    }

    Decision::allow()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::GpuReading;

    fn bucket(tokens: u32, last_refill: u64) -> BucketState {
        BucketState {
            tokens,
            last_refill,
        }
    }

    fn snapshot() -> ResourceSnapshot {
        ResourceSnapshot {
            ram_free_gb: 16.0,
            ram_total_gb: 32.0,
            load_1m: 1.0,
            gpu: None,
            monitoring_failed: false,
        }
    }

    fn gpu(free_mb: f64, temp_c: f64) -> GpuReading {
        GpuReading {
            vram_used_mb: 2048.0,
            vram_free_mb: free_mb,
            temperature_c: temp_c,
            utilization_percent: 50.0,
        }
    }

    #[test]
    fn fresh_bucket_starts_at_full_capacity() {
        let mut b = BucketState::default();
        assert!(acquire(&mut b, 4, 4, 60, 1_000));
        assert!(!acquire(&mut b, 1, 4, 60, 1_000));
    }

    #[test]
    fn refill_is_capped_at_capacity() {
        let mut b = bucket(4, 1_000);
        // five minutes idle, still only capacity tokens
        assert!(acquire(&mut b, 4, 4, 60, 1_300));
        assert!(!acquire(&mut b, 1, 4, 60, 1_300));
    }

    #[test]
    fn zero_cost_acquisition_always_succeeds() {
        let mut b = bucket(0, 1_000);
        assert!(acquire(&mut b, 0, 4, 60, 1_000));
    }

    #[test]
    fn refills_one_token_per_interval() {
        let mut b = bucket(0, 1_000);
        assert!(acquire(&mut b, 1, 4, 60, 1_060));
        assert!(!acquire(&mut b, 1, 4, 60, 1_060));
        assert!(acquire(&mut b, 1, 4, 60, 1_120));
    }

    #[test]
    fn partial_intervals_are_not_lost() {
        let mut b = bucket(0, 1_000);
        // 30s in: nothing earned yet, and the refill clock must not reset
        assert!(!acquire(&mut b, 1, 4, 60, 1_030));
        assert!(acquire(&mut b, 1, 4, 60, 1_060));
    }

    #[test]
    fn rejects_cost_beyond_available_tokens() {
        let mut b = bucket(1, 1_000);
        assert!(!acquire(&mut b, 2, 4, 60, 1_000));
        assert!(acquire(&mut b, 1, 4, 60, 1_000));
    }

    #[test]
    fn custom_refill_interval() {
        let mut b = bucket(0, 1_000);
        assert!(acquire(&mut b, 1, 4, 30, 1_030));
        assert!(!acquire(&mut b, 1, 4, 30, 1_030));
    }

    #[test]
    fn admits_with_healthy_resources() {
        let d = admit(&snapshot(), &Config::default(), 0);
        assert!(d.allowed);
    }

    #[test]
    fn denies_when_temperature_at_or_above_limit() {
        let mut snap = snapshot();
        snap.gpu = Some(gpu(12_000.0, 90.0));
        let d = admit(&snap, &Config::default(), 0);
        assert!(!d.allowed);
        assert!(d.reason.unwrap().contains("temperature too high"));

        // reaching the limit exactly also rejects
        snap.gpu = Some(gpu(12_000.0, 85.0));
        assert!(!admit(&snap, &Config::default(), 0).allowed);
    }

    #[test]
    fn warns_but_admits_near_the_temperature_limit() {
        let mut snap = snapshot();
        snap.gpu = Some(gpu(12_000.0, 83.0));
        assert!(admit(&snap, &Config::default(), 0).allowed);
    }

    #[test]
    fn denies_on_low_vram() {
        let mut snap = snapshot();
        snap.gpu = Some(gpu(1_000.0, 60.0));
        let d = admit(&snap, &Config::default(), 0);
        assert!(!d.allowed);
        assert!(d.reason.unwrap().contains("low VRAM"));
    }

    #[test]
    fn admits_without_a_gpu_reading() {
        let d = admit(&snapshot(), &Config::default(), 0);
        assert!(d.allowed);
    }

    #[test]
    fn denies_on_low_ram() {
        let mut snap = snapshot();
        snap.ram_free_gb = 1.5;
        let d = admit(&snap, &Config::default(), 0);
        assert!(!d.allowed);
        assert!(d.reason.unwrap().contains("low RAM"));
    }

    #[test]
    fn conservative_mode_denies_parallel_configs() {
        let mut snap = snapshot();
        snap.monitoring_failed = true;
        snap.ram_free_gb = 0.0;
        snap.load_1m = 999.0;
        let d = admit(&snap, &Config::default(), 0);
        assert!(!d.allowed);
        assert!(d.reason.unwrap().contains("monitoring failed"));
    }

    #[test]
    fn conservative_mode_admits_single_run_configs() {
        let mut snap = snapshot();
        snap.monitoring_failed = true;
        snap.ram_free_gb = 0.0;
        let mut config = Config::default();
        config.max_parallel = 1;
        assert!(admit(&snap, &config, 0).allowed);
    }

    #[test]
    fn denies_when_running_runs_fill_the_parallel_budget() {
        let d = admit(&snapshot(), &Config::default(), 2);
        assert!(!d.allowed);
        assert!(d.reason.unwrap().contains("max parallel"));
    }
}
