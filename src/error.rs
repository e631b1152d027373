use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("Unknown location '{city}' for source '{site}'")]
    UnknownLocation { site: String, city: String },

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Browser session error: {0}")]
    Browser(String),

    #[error("Missing required field '{0}'")]
    ExtractionMissing(&'static str),

    #[error("Invalid selector '{0}'")]
    Selector(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Corrupt state file {}: {error}", .path.display())]
    StateCorrupt {
        path: PathBuf,
        #[source]
        error: serde_json::Error,
    },

    #[error("State I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),
}
