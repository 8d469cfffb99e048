use crate::cli::GpuProbeKind;
use crate::domain::models::ResourceSnapshot;
use crate::services::probes;
use tracing::warn;

/// Snapshot the machine. RAM and load come from `/proc`; any failure there
/// flips `monitoring_failed` and substitutes conservative sentinel values so
/// the governor can refuse to overcommit.
pub fn snapshot(probe: GpuProbeKind) -> ResourceSnapshot {
    match read_memory().zip(read_load()) {
        Some(((free_gb, total_gb), load_1m)) => ResourceSnapshot {
            ram_free_gb: free_gb,
            ram_total_gb: total_gb,
            load_1m,
            gpu: probes::dispatch(probe),
            monitoring_failed: false,
        },
        None => {
            warn!("resource monitoring failed, reporting conservative values");
            ResourceSnapshot {
                ram_free_gb: 0.0,
                ram_total_gb: 0.0,
                load_1m: 999.0,
                gpu: None,
                monitoring_failed: true,
            }
        }
    }
}

fn read_memory() -> Option<(f64, f64)> {
    parse_meminfo(&std::fs::read_to_string("/proc/meminfo").ok()?)
}

fn read_load() -> Option<f64> {
    parse_loadavg(&std::fs::read_to_string("/proc/loadavg").ok()?)
}

/// Free/total RAM in GB. Prefers `MemAvailable` (what a new allocation can
/// actually get) over `MemFree`.
fn parse_meminfo(text: &str) -> Option<(f64, f64)> {
    let mut total_kb = None;
    let mut available_kb = None;
    let mut free_kb = None;
    for line in text.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let Some(kb) = rest.trim().trim_end_matches("kB").trim().parse::<u64>().ok() else {
            continue;
        };
        match key {
            "MemTotal" => total_kb = Some(kb),
            "MemAvailable" => available_kb = Some(kb),
            "MemFree" => free_kb = Some(kb),
            _ => {}
        }
        if total_kb.is_some() && available_kb.is_some() {
            break;
        }
    }
    let total = total_kb?;
    let free = available_kb.or(free_kb)?;
    Some((kb_to_gb(free), kb_to_gb(total)))
}

fn parse_loadavg(text: &str) -> Option<f64> {
    text.split_whitespace().next()?.parse().ok()
}

fn kb_to_gb(kb: u64) -> f64 {
    kb as f64 / (1024.0 * 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &str = "MemTotal:       32614212 kB\n\
                           MemFree:         1883196 kB\n\
                           MemAvailable:   24103168 kB\n\
                           Buffers:         1035920 kB\n";

    #[test]
    fn meminfo_prefers_mem_available() {
        let (free, total) = parse_meminfo(MEMINFO).expect("parse");
        assert!((free - 22.987).abs() < 0.01);
        assert!((total - 31.103).abs() < 0.01);
    }

    #[test]
    fn meminfo_falls_back_to_mem_free() {
        let text = "MemTotal:       8388608 kB\nMemFree:        4194304 kB\n";
        let (free, total) = parse_meminfo(text).expect("parse");
        assert_eq!(free, 4.0);
        assert_eq!(total, 8.0);
    }

    #[test]
    fn meminfo_garbage_is_none() {
        assert_eq!(parse_meminfo("not meminfo at all"), None);
        assert_eq!(parse_meminfo(""), None);
    }

    #[test]
    fn loadavg_takes_the_one_minute_field() {
        assert_eq!(parse_loadavg("0.52 0.58 0.59 1/467 31337\n"), Some(0.52));
    }

    #[test]
    fn loadavg_garbage_is_none() {
        assert_eq!(parse_loadavg(""), None);
        assert_eq!(parse_loadavg("whatever"), None);
    }
}
