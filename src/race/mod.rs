// src/race/mod.rs
//! First-responder race: spawn one fetcher per source, resolve on the first
//! terminal event or the deadline, cancel the rest.

pub mod types;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::fetch::Fetcher;
use crate::telemetry;

pub use types::{
    FetchFailure, FetchResult, FetchSuccess, RaceOutcome, ResolutionPolicy, Source,
};

/// Orchestrates one fetcher per source and resolves to a single [`RaceOutcome`].
#[derive(Clone)]
pub struct RaceCoordinator {
    fetcher: Arc<dyn Fetcher>,
    policy: ResolutionPolicy,
}

impl RaceCoordinator {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            policy: ResolutionPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ResolutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> ResolutionPolicy {
        self.policy
    }

    /// Race `sources` against each other and `timeout`.
    ///
    /// Returns without waiting for losing fetchers; they are cancelled and
    /// any late result they produce is dropped.
    pub async fn race(&self, sources: &[Source], timeout: Duration) -> RaceOutcome {
        let cancel = CancellationToken::new();
        // Cancels on every exit path, including the caller dropping this future.
        let _guard = cancel.clone().drop_guard();
        self.race_with_token(sources, timeout, cancel).await
    }

    /// Same as [`race`](Self::race) but bound to a caller-owned token, so an
    /// outer shutdown can abort the in-flight fetches. The token is cancelled
    /// once the race resolves.
    pub async fn race_with_token(
        &self,
        sources: &[Source],
        timeout: Duration,
        cancel: CancellationToken,
    ) -> RaceOutcome {
        telemetry::record_start();
        let t0 = Instant::now();

        // Capacity N: each fetcher sends at most once, so no send can block.
        let (tx, mut rx) = mpsc::channel::<FetchResult>(sources.len().max(1));
        for source in sources {
            tokio::spawn(run_fetcher(
                Arc::clone(&self.fetcher),
                source.clone(),
                tx.clone(),
                cancel.clone(),
            ));
        }
        drop(tx);

        tracing::debug!(
            sources = sources.len(),
            timeout_ms = timeout.as_millis() as u64,
            policy = ?self.policy,
            fetcher = self.fetcher.name(),
            "race started"
        );

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let mut failures = 0usize;
        let mut first_failure: Option<FetchFailure> = None;

        let outcome = loop {
            tokio::select! {
                biased;
                msg = rx.recv() => match msg {
                    Some(FetchResult::Success(win)) => break RaceOutcome::Won(win),
                    Some(FetchResult::Failure(fail)) => {
                        telemetry::record_fetch_error(&fail.cause);
                        match self.policy {
                            ResolutionPolicy::FirstEvent => break RaceOutcome::Errored(fail),
                            ResolutionPolicy::FirstSuccess => {
                                failures += 1;
                                tracing::debug!(
                                    source = %fail.source.name,
                                    error = %fail.cause,
                                    failures,
                                    "failure held back, waiting for a success"
                                );
                                let first = first_failure.get_or_insert(fail);
                                if failures == sources.len() {
                                    break RaceOutcome::Errored(first.clone());
                                }
                            }
                        }
                    }
                    // Every sender is gone without a winner.
                    None => break match first_failure.take() {
                        Some(fail) => RaceOutcome::Errored(fail),
                        None => RaceOutcome::Exhausted,
                    },
                },
                _ = &mut deadline => break RaceOutcome::TimedOut { after: timeout },
            }
        };

        cancel.cancel();
        let elapsed = t0.elapsed();
        telemetry::record_outcome(&outcome, elapsed);
        log_outcome(&outcome, elapsed);
        outcome
    }
}

/// Convenience wrapper: race with the default first-event policy.
pub async fn race(fetcher: Arc<dyn Fetcher>, sources: &[Source], timeout: Duration) -> RaceOutcome {
    RaceCoordinator::new(fetcher).race(sources, timeout).await
}

/// One fetcher task: fetch, then report once unless the race already closed.
async fn run_fetcher(
    fetcher: Arc<dyn Fetcher>,
    source: Source,
    tx: mpsc::Sender<FetchResult>,
    cancel: CancellationToken,
) {
    let res = fetcher.fetch(&source, &cancel).await;
    if cancel.is_cancelled() {
        tracing::trace!(source = %source.name, "race closed, dropping late result");
        return;
    }
    // Buffered and sent at most once; an error only means the receiver is gone.
    if tx.try_send(FetchResult::from_fetch(source, res)).is_err() {
        tracing::trace!("result channel closed before report");
    }
}

fn log_outcome(outcome: &RaceOutcome, elapsed: Duration) {
    let elapsed_ms = elapsed.as_secs_f64() * 1_000.0;
    match outcome {
        RaceOutcome::Won(win) => tracing::info!(
            source = %win.source.name,
            bytes = win.payload.len(),
            elapsed_ms,
            "race won"
        ),
        RaceOutcome::Errored(fail) => tracing::warn!(
            source = %fail.source.name,
            url = fail.cause.url(),
            error = %fail.cause,
            elapsed_ms,
            "race resolved with an error"
        ),
        RaceOutcome::TimedOut { after } => tracing::warn!(
            timeout_ms = after.as_millis() as u64,
            "race timed out"
        ),
        RaceOutcome::Exhausted => tracing::warn!(elapsed_ms, "race exhausted without a result"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted reply for one URL.
    #[derive(Clone)]
    enum Script {
        Ok(u64, &'static str),
        Fail(u64, u16),
        Silent,
    }

    /// Fake fetcher replaying scripts per URL. When `honor_cancel` is false it
    /// keeps running after the race closes, like a slow straggler.
    struct Scripted {
        scripts: HashMap<String, Script>,
        honor_cancel: bool,
        cancel_on_finish: bool,
        finished: AtomicUsize,
    }

    impl Scripted {
        fn new(scripts: &[(&str, Script)]) -> Self {
            Self {
                scripts: scripts
                    .iter()
                    .map(|(u, s)| (u.to_string(), s.clone()))
                    .collect(),
                honor_cancel: true,
                cancel_on_finish: false,
                finished: AtomicUsize::new(0),
            }
        }

        async fn play(&self, source: &Source) -> Result<Vec<u8>, FetchError> {
            match self.scripts.get(&source.url).cloned().unwrap_or(Script::Silent) {
                Script::Ok(ms, body) => {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(body.as_bytes().to_vec())
                }
                Script::Fail(ms, status) => {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Err(FetchError::UnexpectedStatus {
                        url: source.url.clone(),
                        status,
                    })
                }
                Script::Silent => std::future::pending().await,
            }
        }
    }

    #[async_trait]
    impl Fetcher for Scripted {
        async fn fetch(
            &self,
            source: &Source,
            cancel: &CancellationToken,
        ) -> Result<Vec<u8>, FetchError> {
            let res = if self.honor_cancel {
                tokio::select! {
                    _ = cancel.cancelled() => Err(FetchError::Cancelled { url: source.url.clone() }),
                    r = self.play(source) => r,
                }
            } else {
                self.play(source).await
            };
            // A straggler noticing the race closed fires the token again.
            if self.cancel_on_finish && cancel.is_cancelled() {
                cancel.cancel();
            }
            self.finished.fetch_add(1, Ordering::SeqCst);
            res
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn sources(urls: &[&str]) -> Vec<Source> {
        urls.iter().map(|u| Source::new(*u)).collect()
    }

    #[tokio::test]
    async fn single_fast_success_wins_over_silent_sources() {
        let f = Arc::new(Scripted::new(&[
            ("a", Script::Silent),
            ("b", Script::Ok(10, "payload-b")),
            ("c", Script::Silent),
        ]));
        let out = race(f, &sources(&["a", "b", "c"]), Duration::from_millis(500)).await;
        match out {
            RaceOutcome::Won(win) => {
                assert_eq!(win.source.url, "b");
                assert_eq!(win.payload_text(), "payload-b");
            }
            other => panic!("expected Won, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn all_failing_reports_the_first_failure() {
        let f = Arc::new(Scripted::new(&[
            ("a", Script::Fail(60, 500)),
            ("b", Script::Fail(10, 500)),
        ]));
        let t0 = Instant::now();
        let out = race(f, &sources(&["a", "b"]), Duration::from_millis(1000)).await;
        assert!(t0.elapsed() < Duration::from_millis(1000));
        match out {
            RaceOutcome::Errored(fail) => {
                assert_eq!(fail.source.url, "b");
                assert_eq!(
                    fail.cause,
                    FetchError::UnexpectedStatus {
                        url: "b".into(),
                        status: 500
                    }
                );
            }
            other => panic!("expected Errored, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn nothing_resolving_times_out_near_the_deadline() {
        let f = Arc::new(Scripted::new(&[("a", Script::Silent), ("b", Script::Silent)]));
        let timeout = Duration::from_millis(100);
        let t0 = Instant::now();
        let out = race(f, &sources(&["a", "b"]), timeout).await;
        let elapsed = t0.elapsed();
        assert_eq!(out, RaceOutcome::TimedOut { after: timeout });
        assert!(elapsed >= timeout, "returned early: {elapsed:?}");
        assert!(elapsed < timeout + Duration::from_millis(200), "too late: {elapsed:?}");
    }

    #[tokio::test]
    async fn early_failure_preempts_later_success() {
        let f = Arc::new(Scripted::new(&[
            ("a", Script::Fail(10, 503)),
            ("b", Script::Ok(50, "late")),
        ]));
        let out = race(f, &sources(&["a", "b"]), Duration::from_millis(1000)).await;
        match out {
            RaceOutcome::Errored(fail) => assert_eq!(fail.source.url, "a"),
            other => panic!("first-event policy should report the failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_success_policy_waits_past_early_failure() {
        let f = Arc::new(Scripted::new(&[
            ("a", Script::Fail(10, 503)),
            ("b", Script::Ok(50, "late")),
        ]));
        let out = RaceCoordinator::new(f)
            .with_policy(ResolutionPolicy::FirstSuccess)
            .race(&sources(&["a", "b"]), Duration::from_millis(1000))
            .await;
        match out {
            RaceOutcome::Won(win) => assert_eq!(win.source.url, "b"),
            other => panic!("expected Won, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_success_policy_reports_first_failure_when_all_fail() {
        let f = Arc::new(Scripted::new(&[
            ("a", Script::Fail(40, 500)),
            ("b", Script::Fail(10, 404)),
        ]));
        let out = RaceCoordinator::new(f)
            .with_policy(ResolutionPolicy::FirstSuccess)
            .race(&sources(&["a", "b"]), Duration::from_millis(1000))
            .await;
        match out {
            RaceOutcome::Errored(fail) => assert_eq!(fail.source.url, "b"),
            other => panic!("expected Errored, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_success_policy_times_out_with_failure_and_silence() {
        let f = Arc::new(Scripted::new(&[("a", Script::Fail(10, 500)), ("b", Script::Silent)]));
        let timeout = Duration::from_millis(150);
        let out = RaceCoordinator::new(f)
            .with_policy(ResolutionPolicy::FirstSuccess)
            .race(&sources(&["a", "b"]), timeout)
            .await;
        // The held failure is not reported once the deadline wins.
        assert_eq!(out, RaceOutcome::TimedOut { after: timeout });
    }

    #[tokio::test]
    async fn slow_loser_finishes_without_blocking() {
        let mut scripted = Scripted::new(&[("a", Script::Ok(10, "fast")), ("b", Script::Ok(510, "slow"))]);
        scripted.honor_cancel = false;
        let f = Arc::new(scripted);

        let out = race(f.clone(), &sources(&["a", "b"]), Duration::from_millis(2000)).await;
        assert!(out.is_won());

        // The loser completes ~500ms after the winner; its task must then end,
        // releasing its handle on the fetcher.
        let deadline = Instant::now() + Duration::from_secs(3);
        while Arc::strong_count(&f) > 1 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(f.finished.load(Ordering::SeqCst), 2);
        assert_eq!(Arc::strong_count(&f), 1, "a fetcher task is still alive");
    }

    #[tokio::test]
    async fn repeated_cancellation_is_harmless() {
        let mut scripted = Scripted::new(&[
            ("a", Script::Ok(10, "a")),
            ("b", Script::Fail(20, 500)),
            ("c", Script::Ok(30, "c")),
        ]);
        scripted.honor_cancel = false;
        scripted.cancel_on_finish = true;
        let f = Arc::new(scripted);

        let cancel = CancellationToken::new();
        let out = RaceCoordinator::new(f.clone())
            .race_with_token(&sources(&["a", "b", "c"]), Duration::from_millis(500), cancel.clone())
            .await;
        assert!(out.is_won());
        cancel.cancel();
        cancel.cancel();
        assert!(cancel.is_cancelled());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(f.finished.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn outer_cancellation_aborts_fetches() {
        let f = Arc::new(Scripted::new(&[("a", Script::Silent)]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        // Cancelled fetchers never report, so the race ends once they are gone.
        let out = RaceCoordinator::new(f)
            .race_with_token(&sources(&["a"]), Duration::from_millis(500), cancel)
            .await;
        assert_eq!(out, RaceOutcome::Exhausted);
    }

    #[tokio::test]
    async fn empty_source_list_is_exhausted() {
        let f = Arc::new(Scripted::new(&[]));
        let out = race(f, &[], Duration::from_millis(100)).await;
        assert_eq!(out, RaceOutcome::Exhausted);
    }

    #[tokio::test]
    async fn literal_two_source_scenario() {
        let f = Arc::new(Scripted::new(&[
            ("A", Script::Ok(20, r#"{"cep":"17128072"}"#)),
            ("B", Script::Ok(80, r#"{"cep":"17128072","city":"X"}"#)),
        ]));
        let out = race(f, &sources(&["A", "B"]), Duration::from_millis(1000)).await;
        let win = out.into_result().expect("A should win");
        assert_eq!(win.source, Source::new("A"));
        assert_eq!(win.payload, br#"{"cep":"17128072"}"#.to_vec());
    }
}
