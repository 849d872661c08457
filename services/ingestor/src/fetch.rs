//! Source Fetcher - downloads the raw CSV document with a bounded timeout.

use crate::error::IngestError;
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Build the HTTP client used for every fetch. The timeout bounds the whole
/// request; retries, if wanted, belong to the scheduler that invokes us.
pub fn build_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent("fuel-price-ingestor/0.1 (prezzi medi regionali carburanti)")
        .build()
}

/// Fetch the document, treating any transport error or non-success HTTP
/// status as a single fetch failure.
pub async fn fetch_document(
    client: &reqwest::Client,
    url: &str,
) -> Result<Vec<u8>, IngestError> {
    let resp = client.get(url).send().await?.error_for_status()?;
    let bytes = resp.bytes().await?;
    Ok(bytes.to_vec())
}

/// Content hash of the raw document, recorded per job run so an unchanged
/// publication can be detected without re-parsing.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}
