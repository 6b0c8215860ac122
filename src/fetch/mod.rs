// src/fetch/mod.rs
pub mod http;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::race::types::Source;

pub use http::HttpFetcher;

/// Capability the race coordinator consumes: fetch one source, yield its body.
///
/// Implementations must stop work promptly once `cancel` fires. Returning
/// [`FetchError::Cancelled`] in that case is the convention; the coordinator
/// never surfaces it.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, source: &Source, cancel: &CancellationToken)
        -> Result<Vec<u8>, FetchError>;

    fn name(&self) -> &'static str;
}
