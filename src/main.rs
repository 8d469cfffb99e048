use clap::Parser;

mod cli;
mod commands;
mod domain;
mod services;
mod trainer;

use cli::Cli;
use domain::models::{ErrorBody, ErrorOut};
use services::config::ConfigError;
use services::governor::GovernorError;
use services::store::StoreError;

fn main() {
    setup_tracing();
    let cli = Cli::parse();
    if let Err(err) = dispatch(&cli) {
        report_error(&cli, &err);
        std::process::exit(1);
    }
}

fn dispatch(cli: &Cli) -> anyhow::Result<()> {
    if commands::handle_admin_commands(cli)? {
        return Ok(());
    }
    if commands::handle_run_command(cli)? {
        return Ok(());
    }
    unreachable!("every command has a handler")
}

/// Diagnostics go to stderr; stdout is reserved for command output and the
/// NDJSON run stream.
fn setup_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn report_error(cli: &Cli, err: &anyhow::Error) {
    if cli.json {
        let out = ErrorOut {
            ok: false,
            error: ErrorBody {
                code: error_code(err).to_string(),
                message: format!("{err:#}"),
            },
        };
        match serde_json::to_string_pretty(&out) {
            Ok(body) => println!("{body}"),
            Err(_) => eprintln!("error: {err:#}"),
        }
    } else {
        eprintln!("error: {err:#}");
    }
}

fn error_code(err: &anyhow::Error) -> &'static str {
    for cause in err.chain() {
        if cause.downcast_ref::<ConfigError>().is_some() {
            return "CONFIG_INVALID";
        }
        if cause.downcast_ref::<GovernorError>().is_some() {
            return "GOVERNOR_DENY";
        }
        if let Some(store_err) = cause.downcast_ref::<StoreError>() {
            return match store_err {
                StoreError::RunNotFound(_) => "RUN_NOT_FOUND",
                _ => "CONFIG_INVALID",
            };
        }
    }
    "INTERNAL"
}
