// src/telemetry.rs
//! Race telemetry through the `metrics` facade. Without an installed recorder
//! every call here is a no-op.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;

use crate::error::FetchError;
use crate::race::types::RaceOutcome;

/// One-time metrics registration.
pub(crate) fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("race_runs_total", "Races started.");
        describe_counter!(
            "race_outcomes_total",
            "Races resolved, labelled by outcome."
        );
        describe_counter!(
            "fetch_errors_total",
            "Fetcher failures reported to a coordinator, labelled by kind."
        );
        describe_histogram!("race_duration_ms", "Time to resolve a race in milliseconds.");
    });
}

pub(crate) fn record_start() {
    ensure_described();
    counter!("race_runs_total").increment(1);
}

pub(crate) fn record_fetch_error(err: &FetchError) {
    counter!("fetch_errors_total", "kind" => err.kind()).increment(1);
}

pub(crate) fn record_outcome(outcome: &RaceOutcome, elapsed: Duration) {
    counter!("race_outcomes_total", "outcome" => outcome.label()).increment(1);
    histogram!("race_duration_ms").record(elapsed.as_secs_f64() * 1_000.0);
}
