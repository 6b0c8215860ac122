//! cep-race — Binary Entrypoint
//! Races the configured CEP providers and prints whichever answers first.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use cep_race::config::RaceConfig;
use cep_race::{RaceOutcome, ResolutionPolicy};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "cep-race", version, about = "Race CEP lookup endpoints, keep the fastest answer")]
struct Cli {
    /// Postal code to look up (8 digits, hyphen optional)
    #[arg(long)]
    cep: Option<String>,

    /// Race deadline in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// first-event or first-success
    #[arg(long)]
    policy: Option<ResolutionPolicy>,

    /// TOML config file; falls back to $CEP_RACE_CONFIG, then config/cep_race.toml
    #[arg(long, env = "CEP_RACE_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cep_race=info,warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(cli: &Cli) -> Result<RaceConfig> {
    let mut cfg = match &cli.config {
        Some(path) => {
            let mut cfg = RaceConfig::load_from(path)?;
            // Env overrides still apply on top of an explicit file.
            cfg.apply_env()?;
            cfg
        }
        None => RaceConfig::load_default()?,
    };
    if let Some(cep) = &cli.cep {
        cfg.cep = cep.clone();
    }
    if let Some(ms) = cli.timeout_ms {
        cfg.timeout_ms = ms;
    }
    if let Some(policy) = cli.policy {
        cfg.policy = policy;
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let outcome = match load_config(&cli) {
        Ok(cfg) => cep_race::lookup(&cfg).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(RaceOutcome::Won(win)) => {
            println!("Response received:");
            println!("Source: {}", win.source.url);
            println!("Content: {}", win.payload_text());
            ExitCode::SUCCESS
        }
        Ok(other) => {
            if let Err(e) = other.into_result() {
                tracing::error!(error = %e, "lookup failed");
            }
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = ?e, "cannot run lookup");
            ExitCode::FAILURE
        }
    }
}
