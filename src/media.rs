use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

const SEARCH_ENDPOINT: &str = "https://tenor.googleapis.com/v2/search";

/// Hard deadline on a search round-trip. The session read loop awaits command
/// resolution inline, so an unbounded request would hold up keep-alive replies
/// for every frame queued behind it.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Encodings a chat background may use, most preferred first.
pub const PREFERRED_ENCODINGS: [&str; 4] =
    ["tinygif_transparent", "tinygif", "gif_transparent", "gif"];

/// A service failure, as opposed to a successful search with no results
/// (which is `Ok` with an empty candidate list).
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media search request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("media search returned status {0}")]
    Status(reqwest::StatusCode),
}

/// One ranked search result exposing zero or more named encodings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaCandidate {
    #[serde(default)]
    pub media_formats: HashMap<String, MediaEncoding>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaEncoding {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<MediaCandidate>,
}

#[derive(Debug, Clone)]
pub struct MediaClient {
    client: reqwest::Client,
    endpoint: String,
    key: String,
    client_key: String,
}

impl MediaClient {
    pub fn new(key: String, client_key: String) -> Self {
        Self::with_endpoint(SEARCH_ENDPOINT.to_owned(), key, client_key, SEARCH_TIMEOUT)
    }

    fn with_endpoint(
        endpoint: String,
        key: String,
        client_key: String,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            endpoint,
            key,
            client_key,
        }
    }

    /// Ranked candidates for a search query. Results are pre-filtered to the
    /// encodings a background can actually use and randomized server-side.
    pub async fn search(&self, query: &str) -> Result<Vec<MediaCandidate>, MediaError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", self.key.as_str()),
                ("client_key", self.client_key.as_str()),
                ("q", query),
                ("contentfilter", "low"),
                ("media_filter", "tinygif,tinygif_transparent,gif,gif_transparent"),
                ("ar_range", "wide"),
                ("random", "true"),
                ("limit", "20"),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(MediaError::Status(response.status()));
        }
        let parsed = response.json::<SearchResponse>().await?;
        Ok(parsed.results)
    }
}

/// First candidate exposing a preferred encoding, scanning candidates in rank
/// order and encodings in preference order within each candidate.
pub fn pick_background(results: &[MediaCandidate]) -> Option<&str> {
    for candidate in results {
        for encoding in PREFERRED_ENCODINGS {
            if let Some(format) = candidate.media_formats.get(encoding) {
                if !format.url.is_empty() {
                    return Some(&format.url);
                }
            }
        }
    }
    None
}
