// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod cep;
pub mod config;
pub mod error;
pub mod fetch;
pub mod race;

mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::error::{FetchError, RaceError};
pub use crate::fetch::{Fetcher, HttpFetcher};
pub use crate::race::{
    race, FetchFailure, FetchResult, FetchSuccess, RaceCoordinator, RaceOutcome,
    ResolutionPolicy, Source,
};

use std::sync::Arc;

use crate::config::RaceConfig;

/// Build the HTTP fetcher and race every configured source for the configured CEP.
pub async fn lookup(cfg: &RaceConfig) -> anyhow::Result<RaceOutcome> {
    let sources = cfg.race_sources()?;
    let cep = cfg.parsed_cep()?;
    let fetcher = HttpFetcher::new(cfg.connect_timeout())?;
    let coordinator = RaceCoordinator::new(Arc::new(fetcher)).with_policy(cfg.policy);
    tracing::info!(
        cep = %cep.formatted(),
        sources = sources.len(),
        policy = ?coordinator.policy(),
        "looking up CEP"
    );
    Ok(coordinator.race(&sources, cfg.timeout()).await)
}
