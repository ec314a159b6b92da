use serde::{Deserialize, Serialize};

/// One timing record for a completed, non-exempt request.
///
/// Serialized as `{ "url": ..., "duration": ... }`, which is the entry
/// format of the collection endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    url: String,
    #[serde(rename = "duration")]
    duration_ms: u64,
}

impl Sample {
    pub fn new(url: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            url: url.into(),
            duration_ms,
        }
    }

    /// Target of the request as passed to `open`.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Wall-clock milliseconds between `send` and completion.
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }
}

/// Body of a flush request: `{ "stats": [ {url, duration}, ... ] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsBatch {
    pub stats: Vec<Sample>,
}

impl StatsBatch {
    pub fn new(stats: Vec<Sample>) -> Self {
        Self { stats }
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}
