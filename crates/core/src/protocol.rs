use crate::error::{FuelError, FuelResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of a cache-only lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheStatus {
    /// The asset (or file) is on disk at this path
    AlreadyExists(PathBuf),
    /// Nothing cached; no network call was made
    NotCached,
}

impl CacheStatus {
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            CacheStatus::AlreadyExists(path) => Some(path),
            CacheStatus::NotCached => None,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, CacheStatus::AlreadyExists(_))
    }

    /// Turn a miss into [`FuelError::NotCached`] for callers that need the path.
    pub fn into_path(self, unique_name: &str) -> FuelResult<PathBuf> {
        match self {
            CacheStatus::AlreadyExists(path) => Ok(path),
            CacheStatus::NotCached => Err(FuelError::NotCached(unique_name.to_string())),
        }
    }
}

/// One GET exchange with a Fuel server, as handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestRequest {
    /// Base URL of the server, e.g. `https://fuel.example.org`
    pub server: String,
    /// Protocol version segment, e.g. `1.0`
    pub version: String,
    /// Resource path below the version, e.g. `alice/models/Chair.zip`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl RestRequest {
    pub fn get(
        server: impl Into<String>,
        version: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            version: version.into(),
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Full URL: `<server>/<version>/<path>` with the query string appended.
    /// Redundant slashes between the three parts are dropped.
    pub fn url(&self) -> String {
        let mut url = self.server.trim_end_matches('/').to_string();
        for part in [self.version.as_str(), self.path.as_str()] {
            let part = part.trim_matches('/');
            if !part.is_empty() {
                url.push('/');
                url.push_str(part);
            }
        }
        if !self.query.is_empty() {
            let query: Vec<String> = self
                .query
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect();
            url.push('?');
            url.push_str(&query.join("&"));
        }
        url
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestResponse {
    pub status: u16,
    pub data: Vec<u8>,
}

impl RestResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
