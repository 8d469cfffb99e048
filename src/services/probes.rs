use crate::cli::GpuProbeKind;
use crate::domain::models::GpuReading;
use std::process::Command;
use tracing::debug;

/// Probe the GPU the configured way. `auto` tries nvidia-smi first, then
/// rocm-smi; `none` skips probing entirely. A machine without a working
/// probe simply yields `None`.
pub fn dispatch(kind: GpuProbeKind) -> Option<GpuReading> {
    match kind {
        GpuProbeKind::None => None,
        GpuProbeKind::NvidiaSmi => probe_nvidia_smi(),
        GpuProbeKind::Rocm => probe_rocm_smi(),
        GpuProbeKind::Auto => probe_nvidia_smi().or_else(probe_rocm_smi),
    }
}

pub fn probe_nvidia_smi() -> Option<GpuReading> {
    let stdout = run_probe(
        "nvidia-smi",
        &[
            "--query-gpu=memory.used,memory.free,temperature.gpu,utilization.gpu",
            "--format=csv,noheader,nounits",
        ],
    )?;
    parse_nvidia_csv(&stdout)
}

pub fn probe_rocm_smi() -> Option<GpuReading> {
    let stdout = run_probe(
        "rocm-smi",
        &["--showmeminfo", "vram", "--showtemp", "--showuse", "--csv"],
    )?;
    parse_rocm_csv(&stdout)
}

fn run_probe(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        debug!("{program} exited with {}", output.status);
        return None;
    }
    String::from_utf8(output.stdout).ok()
}

/// One `used, free, temp, util` row per GPU. Rows with unparsable fields are
/// skipped; of the rest the GPU with the most free VRAM wins.
pub fn parse_nvidia_csv(stdout: &str) -> Option<GpuReading> {
    let mut best: Option<GpuReading> = None;
    for line in stdout.trim().lines() {
        let fields: Vec<f64> = line
            .split(',')
            .map(str::trim)
            .filter_map(|f| f.parse().ok())
            .collect();
        if fields.len() < 4 {
            continue;
        }
        let reading = GpuReading {
            vram_used_mb: fields[0],
            vram_free_mb: fields[1],
            temperature_c: fields[2],
            utilization_percent: fields[3],
        };
        if best.map_or(true, |b| reading.vram_free_mb > b.vram_free_mb) {
            best = Some(reading);
        }
    }
    best
}

/// rocm-smi CSV: column layout varies across ROCm versions, so columns are
/// located by header name. VRAM comes in bytes and is converted to MB.
pub fn parse_rocm_csv(stdout: &str) -> Option<GpuReading> {
    let mut lines = stdout.trim().lines();
    let header = lines.next()?.to_ascii_lowercase();
    let cols: Vec<&str> = header.split(',').map(str::trim).collect();

    let find = |pred: &dyn Fn(&str) -> bool| cols.iter().position(|c| pred(c));
    let total_idx = find(&|c| c.contains("total") && c.contains("vram"))?;
    let used_idx = find(&|c| c.contains("used") && c.contains("vram"))?;
    let temp_idx = find(&|c| c.contains("temperature") || c.contains("temp"));
    let util_idx = find(&|c| c.contains("gpu use") || c.contains("utilization"));

    let mut best: Option<GpuReading> = None;
    for line in lines {
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        let field = |idx: Option<usize>| -> Option<f64> {
            idx.and_then(|i| parts.get(i)).and_then(|v| v.parse().ok())
        };
        let Some(total_bytes) = field(Some(total_idx)) else {
            continue;
        };
        let Some(used_bytes) = field(Some(used_idx)) else {
            continue;
        };
        let total_mb = (total_bytes / (1024.0 * 1024.0)).floor();
        let used_mb = (used_bytes / (1024.0 * 1024.0)).floor();
        let reading = GpuReading {
            vram_used_mb: used_mb,
            vram_free_mb: total_mb - used_mb,
            temperature_c: field(temp_idx).unwrap_or(0.0).round(),
            utilization_percent: field(util_idx).unwrap_or(0.0).round(),
        };
        if best.map_or(true, |b| reading.vram_free_mb > b.vram_free_mb) {
            best = Some(reading);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nvidia_single_gpu() {
        let r = parse_nvidia_csv("2048, 14336, 62, 45\n").expect("reading");
        assert_eq!(r.vram_used_mb, 2048.0);
        assert_eq!(r.vram_free_mb, 14336.0);
        assert_eq!(r.temperature_c, 62.0);
        assert_eq!(r.utilization_percent, 45.0);
    }

    #[test]
    fn nvidia_picks_gpu_with_most_free_vram() {
        let r = parse_nvidia_csv("12288, 4096, 70, 90\n4096, 12288, 55, 30\n").expect("reading");
        assert_eq!(r.vram_free_mb, 12288.0);
        assert_eq!(r.temperature_c, 55.0);
    }

    #[test]
    fn nvidia_skips_rows_with_bad_fields() {
        let r = parse_nvidia_csv("N/A, N/A, N/A, N/A\n4096, 12288, 55, 30\n").expect("reading");
        assert_eq!(r.vram_free_mb, 12288.0);
    }

    #[test]
    fn nvidia_all_bad_rows_is_none() {
        assert_eq!(parse_nvidia_csv("N/A, N/A, N/A, N/A\n"), None);
        assert_eq!(parse_nvidia_csv(""), None);
        assert_eq!(parse_nvidia_csv("\n"), None);
    }

    #[test]
    fn rocm_finds_columns_by_header_name() {
        let csv = "device,VRAM Total Memory (B),VRAM Total Used Memory (B),\
                   Temperature (Sensor edge) (C),GPU use (%)\n\
                   card0,17163091968,4294967296,55.0,40.0\n";
        let r = parse_rocm_csv(csv).expect("reading");
        assert_eq!(r.vram_used_mb, 4096.0);
        assert_eq!(r.vram_free_mb, 16368.0 - 4096.0);
        assert_eq!(r.temperature_c, 55.0);
        assert_eq!(r.utilization_percent, 40.0);
    }

    #[test]
    fn rocm_picks_gpu_with_most_free_vram() {
        let csv = "device,vram total (b),vram used (b),temp (c),gpu use (%)\n\
                   card0,17179869184,17000000000,70,95\n\
                   card1,17179869184,1073741824,45,10\n";
        let r = parse_rocm_csv(csv).expect("reading");
        assert_eq!(r.vram_used_mb, 1024.0);
        assert_eq!(r.temperature_c, 45.0);
    }

    #[test]
    fn rocm_without_vram_headers_is_none() {
        assert_eq!(parse_rocm_csv("device,temp\ncard0,55\n"), None);
        assert_eq!(parse_rocm_csv(""), None);
    }

    #[test]
    fn dispatch_none_probes_nothing() {
        assert_eq!(dispatch(GpuProbeKind::None), None);
    }
}
