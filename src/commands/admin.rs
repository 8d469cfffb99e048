use std::path::Path;

use crate::cli::{Cli, Commands, ExperimentCommands};
use crate::domain::models::{CompareReport, Config, ExperimentDetail, JsonOut, RunRecord};
use crate::services::config::{self, ConfigOverlay};
use crate::services::format::{format_duration, pad_left, pad_right};
use crate::services::monitor;
use crate::services::output::{print_one, print_out};
use crate::services::store;
use crate::trainer;

pub fn handle_admin_commands(cli: &Cli) -> anyhow::Result<bool> {
    match &cli.command {
        Commands::Status => status(cli)?,
        Commands::Init => init(cli)?,
        Commands::Experiments { command } => match command {
            ExperimentCommands::List => experiments_list(cli)?,
            ExperimentCommands::Show { run_id } => experiments_show(cli, run_id)?,
        },
        Commands::Compare { run_a, run_b } => compare(cli, run_a, run_b)?,
        Commands::Run { .. } => return Ok(false),
    }
    Ok(true)
}

fn status(cli: &Cli) -> anyhow::Result<()> {
    let config = config::load(cli.config.as_deref(), ConfigOverlay::default())?;
    let snapshot = monitor::snapshot(config.gpu.probe);
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&JsonOut {
                ok: true,
                data: snapshot
            })?
        );
    } else {
        println!("Resource Status:");
        println!("CPU load (1m): {:.2}", snapshot.load_1m);
        println!(
            "RAM: {:.2} GB free / {:.2} GB total",
            snapshot.ram_free_gb, snapshot.ram_total_gb
        );
        match &snapshot.gpu {
            Some(gpu) => println!(
                "GPU: {:.0} MB free VRAM, {:.0}°C, {:.0}% util",
                gpu.vram_free_mb, gpu.temperature_c, gpu.utilization_percent
            ),
            None => println!("GPU: not detected"),
        }
        if snapshot.monitoring_failed {
            println!("monitoring failed, conservative values shown");
        }
    }
    Ok(())
}

fn init(cli: &Cli) -> anyhow::Result<()> {
    let path = Path::new(".trainctl.json");
    if path.exists() {
        anyhow::bail!("{} already exists, refusing to overwrite", path.display());
    }
    std::fs::write(path, serde_json::to_string_pretty(&Config::default())?)?;
    store::audit("init", serde_json::json!({ "path": ".trainctl.json" }));
    print_one(cli.json, ".trainctl.json", |p| format!("wrote {p}"))
}

fn experiments_list(cli: &Cli) -> anyhow::Result<()> {
    let state = store::load_state()?;
    let runs = store::list_runs(&state);
    print_out(cli.json, &runs, run_row)
}

fn run_row(run: &RunRecord) -> String {
    let loss = run
        .last_loss
        .map(|l| format!("{l:.4}"))
        .unwrap_or_else(|| "n/a".to_string());
    let duration = run
        .end_time
        .map(|end| format_duration(run.start_time, end))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{}\t{}\t{}\t{}",
        pad_right(&run.id, 24),
        run.status,
        pad_left(&loss, 8),
        duration
    )
}

fn experiments_show(cli: &Cli, run_id: &str) -> anyhow::Result<()> {
    let state = store::load_state()?;
    let run = store::get_run(&state, run_id)?.clone();
    let latest_checkpoint = store::latest_checkpoint(&run).map(str::to_string);
    let detail = ExperimentDetail {
        run,
        latest_checkpoint,
    };
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&JsonOut {
                ok: true,
                data: detail
            })?
        );
    } else {
        println!("id: {}", detail.run.id);
        if let Some(name) = &detail.run.name {
            println!("name: {name}");
        }
        println!("status: {}", detail.run.status);
        println!(
            "last step: {}",
            detail
                .run
                .last_step
                .map(|s| s.to_string())
                .unwrap_or_else(|| "n/a".to_string())
        );
        println!(
            "last loss: {}",
            detail
                .run
                .last_loss
                .map(|l| format!("{l:.4}"))
                .unwrap_or_else(|| "n/a".to_string())
        );
        println!(
            "latest checkpoint: {}",
            detail.latest_checkpoint.as_deref().unwrap_or("n/a")
        );
        if let Some(end) = detail.run.end_time {
            println!(
                "duration: {}",
                format_duration(detail.run.start_time, end)
            );
        }
    }
    Ok(())
}

fn compare(cli: &Cli, run_a: &str, run_b: &str) -> anyhow::Result<()> {
    let state = store::load_state()?;
    let a = store::get_run(&state, run_a)?.clone();
    let b = store::get_run(&state, run_b)?.clone();
    let loss_delta = match (a.last_loss, b.last_loss) {
        (Some(x), Some(y)) => Some(trainer::round4(y - x)),
        _ => None,
    };
    let step_delta = match (a.last_step, b.last_step) {
        (Some(x), Some(y)) => Some(y as i64 - x as i64),
        _ => None,
    };
    let report = CompareReport {
        a,
        b,
        loss_delta,
        step_delta,
    };
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&JsonOut {
                ok: true,
                data: report
            })?
        );
    } else {
        println!("{}", run_row(&report.a));
        println!("{}", run_row(&report.b));
        println!(
            "loss delta: {}",
            report
                .loss_delta
                .map(|d| format!("{d:+.4}"))
                .unwrap_or_else(|| "n/a".to_string())
        );
        println!(
            "step delta: {}",
            report
                .step_delta
                .map(|d| format!("{d:+}"))
                .unwrap_or_else(|| "n/a".to_string())
        );
    }
    Ok(())
}
