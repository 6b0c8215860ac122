// src/config.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cep::{self, Cep, ProviderTemplate, CEP_PLACEHOLDER};
use crate::race::types::{ResolutionPolicy, Source};

pub const ENV_CONFIG_PATH: &str = "CEP_RACE_CONFIG";
pub const ENV_CEP: &str = "CEP_RACE_CEP";
pub const ENV_TIMEOUT_MS: &str = "CEP_RACE_TIMEOUT_MS";
pub const DEFAULT_CONFIG_PATH: &str = "config/cep_race.toml";

fn default_cep() -> String {
    cep::DEFAULT_CEP.to_string()
}
fn default_timeout_ms() -> u64 {
    1_000
}
fn default_connect_timeout_ms() -> u64 {
    4_000
}

/// Everything one run of the binary needs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RaceConfig {
    #[serde(default = "default_cep")]
    pub cep: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub policy: ResolutionPolicy,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Empty means the built-in providers.
    #[serde(default)]
    pub sources: Vec<ProviderTemplate>,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            cep: default_cep(),
            timeout_ms: default_timeout_ms(),
            policy: ResolutionPolicy::default(),
            connect_timeout_ms: default_connect_timeout_ms(),
            sources: Vec::new(),
        }
    }
}

impl RaceConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: RaceConfig = toml::from_str(s).context("parsing race config toml")?;
        Ok(cfg)
    }

    /// Load from an explicit TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading race config from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("in race config {}", path.display()))
    }

    /// Load using env var + fallbacks, then apply env overrides:
    /// 1) $CEP_RACE_CONFIG (must exist)
    /// 2) config/cep_race.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let p = PathBuf::from(DEFAULT_CONFIG_PATH);
            if p.exists() {
                Self::load_from(&p)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env()?;
        Ok(cfg)
    }

    /// Apply `$CEP_RACE_CEP` / `$CEP_RACE_TIMEOUT_MS` on top of the loaded values.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var(ENV_CEP) {
            if !v.trim().is_empty() {
                self.cep = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var(ENV_TIMEOUT_MS) {
            self.timeout_ms = v
                .trim()
                .parse()
                .with_context(|| format!("{ENV_TIMEOUT_MS}={v} is not a number of milliseconds"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            bail!("timeout_ms must be greater than zero");
        }
        self.parsed_cep()?;
        for t in &self.sources {
            if t.name.trim().is_empty() || t.url.trim().is_empty() {
                bail!("every source needs a non-empty name and url");
            }
            if !t.url.contains(CEP_PLACEHOLDER) {
                tracing::warn!(source = %t.name, "source url has no {{cep}} placeholder");
            }
        }
        Ok(())
    }

    pub fn parsed_cep(&self) -> Result<Cep> {
        Ok(self.cep.parse::<Cep>()?)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn templates(&self) -> Vec<ProviderTemplate> {
        if self.sources.is_empty() {
            cep::default_providers()
        } else {
            self.sources.clone()
        }
    }

    /// Validated race sources for the configured CEP.
    pub fn race_sources(&self) -> Result<Vec<Source>> {
        self.validate()?;
        let cep = self.parsed_cep()?;
        Ok(cep::sources_for(&cep, &self.templates()))
    }
}
