//! Error types.
//!
//! None of these escape the public engine operations at runtime: transport
//! failures are logged and retried, or written into the analysis result.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write snapshot {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown lane {lane:?} for {name:?}")]
    UnknownLane { name: String, lane: String },
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("failed to encode sync message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode sync message: {0}")]
    Decode(#[source] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("no analysis service configured")]
    NoSource,

    #[error("analysis request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("analysis service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("analysis stream interrupted: {0}")]
    Interrupted(String),
}
