// src/fetch/http.rs
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::fetch::Fetcher;
use crate::race::types::Source;

const USER_AGENT: &str = concat!("cep-race/", env!("CARGO_PKG_VERSION"));

/// reqwest-backed fetcher. One client is shared by every source in a race.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(connect_timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(connect_timeout)
            .build()
            .context("building reqwest client")?;
        Ok(Self { client })
    }

    // The response lives inside this future only; dropping it on cancellation
    // or returning early releases the connection.
    async fn get(&self, source: &Source) -> Result<Vec<u8>, FetchError> {
        let url = Url::parse(&source.url).map_err(|e| FetchError::RequestConstruction {
            url: source.url.clone(),
            message: e.to_string(),
        })?;

        let resp = self.client.get(url).send().await.map_err(|e| {
            if e.is_builder() {
                FetchError::RequestConstruction {
                    url: source.url.clone(),
                    message: e.to_string(),
                }
            } else {
                FetchError::Transport {
                    url: source.url.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(FetchError::UnexpectedStatus {
                url: source.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().await.map_err(|e| FetchError::BodyRead {
            url: source.url.clone(),
            message: e.to_string(),
        })?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        source: &Source,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, FetchError> {
        let t0 = Instant::now();
        let res = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled { url: source.url.clone() }),
            r = self.get(source) => r,
        };

        let elapsed_ms = t0.elapsed().as_secs_f64() * 1_000.0;
        match &res {
            Ok(body) => tracing::debug!(
                source = %source.name,
                bytes = body.len(),
                elapsed_ms,
                "http fetch ok"
            ),
            Err(FetchError::Cancelled { .. }) => {
                tracing::debug!(source = %source.name, elapsed_ms, "http fetch cancelled")
            }
            Err(e) => tracing::warn!(
                source = %source.name,
                error = %e,
                kind = e.kind(),
                elapsed_ms,
                "http fetch failed"
            ),
        }
        res
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn malformed_url_is_a_construction_error() {
        let f = HttpFetcher::new(Duration::from_secs(1)).unwrap();
        let err = f
            .fetch(&Source::new("not a url"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(
            matches!(err, FetchError::RequestConstruction { .. }),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn already_cancelled_token_short_circuits() {
        let f = HttpFetcher::new(Duration::from_secs(1)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = f
            .fetch(&Source::new("http://127.0.0.1:9/"), &cancel)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            FetchError::Cancelled {
                url: "http://127.0.0.1:9/".into()
            }
        );
    }
}
