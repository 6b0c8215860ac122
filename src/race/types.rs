// src/race/types.rs
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FetchError, RaceError};

/// One candidate endpoint in a race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub name: String, // e.g. "brasilapi", "viacep"
    pub url: String,
}

impl Source {
    /// Unlabelled source; the URL doubles as its name.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            name: url.clone(),
            url,
        }
    }

    pub fn named(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name == self.url {
            f.write_str(&self.url)
        } else {
            write!(f, "{} ({})", self.name, self.url)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSuccess {
    pub source: Source,
    pub payload: Vec<u8>,
}

impl FetchSuccess {
    /// Payload as text, replacing invalid UTF-8.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Payload decoded as JSON; both default providers answer with an object.
    pub fn payload_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.payload)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub source: Source,
    pub cause: FetchError,
}

/// Terminal report of a single fetcher. Produced once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    Success(FetchSuccess),
    Failure(FetchFailure),
}

impl FetchResult {
    pub fn from_fetch(source: Source, res: Result<Vec<u8>, FetchError>) -> Self {
        match res {
            Ok(payload) => FetchResult::Success(FetchSuccess { source, payload }),
            Err(cause) => FetchResult::Failure(FetchFailure { source, cause }),
        }
    }
}

/// How the coordinator treats a failure that arrives before any success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionPolicy {
    /// The earliest terminal event of any kind decides the race.
    #[default]
    FirstEvent,
    /// Failures are held back until every source has failed.
    FirstSuccess,
}

impl std::str::FromStr for ResolutionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first-event" | "first_event" => Ok(ResolutionPolicy::FirstEvent),
            "first-success" | "first_success" => Ok(ResolutionPolicy::FirstSuccess),
            other => Err(format!(
                "unknown policy `{other}` (expected first-event or first-success)"
            )),
        }
    }
}

/// Result of one race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaceOutcome {
    Won(FetchSuccess),
    TimedOut { after: Duration },
    Errored(FetchFailure),
    /// Every fetcher went away without reporting (e.g. no sources at all).
    Exhausted,
}

impl RaceOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RaceOutcome::Won(_) => "won",
            RaceOutcome::TimedOut { .. } => "timed_out",
            RaceOutcome::Errored(_) => "errored",
            RaceOutcome::Exhausted => "exhausted",
        }
    }

    pub fn is_won(&self) -> bool {
        matches!(self, RaceOutcome::Won(_))
    }

    pub fn into_result(self) -> Result<FetchSuccess, RaceError> {
        match self {
            RaceOutcome::Won(s) => Ok(s),
            RaceOutcome::TimedOut { after } => Err(RaceError::Timeout(after)),
            RaceOutcome::Errored(f) => Err(RaceError::Fetch {
                source_name: f.source.name,
                cause: f.cause,
            }),
            RaceOutcome::Exhausted => Err(RaceError::Exhausted),
        }
    }
}
