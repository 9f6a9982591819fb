use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    /// Network failure or timeout talking to the remote tier or counter store.
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    /// A caller-supplied loader returned an error. Never cached.
    #[error("Loader failure: {0}")]
    LoaderFailure(String),

    /// Out-of-range thresholds or sizes; the previous config stays in effect.
    #[error("Invalid config: {0}")]
    ConfigInvalid(String),

    #[error("rate-limited: {key_class}")]
    RateLimited { key_class: String },

    #[error("Serde JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Worker pool error: {0}")]
    WorkerPool(String),
}

impl CacheError {
    #[must_use]
    pub fn is_remote_unavailable(&self) -> bool {
        matches!(self, Self::RemoteUnavailable(_))
    }
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
