use thiserror::Error;

/// Every way a Fuel client operation can fail.
///
/// Callers match on the kind to decide between retrying, falling back to a
/// cached copy, or reporting upward.
#[derive(Debug, Error)]
pub enum FuelError {
    #[error("No servers configured")]
    NoServersConfigured,

    #[error("Fetch from {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Could not parse '{input}': {reason}")]
    Parse { input: String, reason: String },

    #[error("Could not save {unique_name} to the cache: {reason}")]
    Save { unique_name: String, reason: String },

    #[error("{0} is not in the local cache")]
    NotCached(String),

    #[error("Upload of {0} failed: uploading is not supported yet")]
    Upload(String),

    #[error("Delete of {0} failed: deleting is not supported yet")]
    Delete(String),
}

impl FuelError {
    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        FuelError::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn parse(input: impl Into<String>, reason: impl ToString) -> Self {
        FuelError::Parse {
            input: input.into(),
            reason: reason.to_string(),
        }
    }

    pub fn save(unique_name: impl Into<String>, reason: impl ToString) -> Self {
        FuelError::Save {
            unique_name: unique_name.into(),
            reason: reason.to_string(),
        }
    }

    /// Only network failures can succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FuelError::Fetch { .. })
    }
}

pub type FuelResult<T> = std::result::Result<T, FuelError>;
