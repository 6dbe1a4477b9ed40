use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum MirrorError {
    #[error("feed request failed: {0}")]
    FeedHttp(String),

    #[error("feed returned status {status}: {message}")]
    FeedStatus { status: u16, message: String },

    #[error("failed to decode feed response: {0}")]
    FeedDecode(String),

    #[error("asset request failed for {url}: {message}")]
    AssetHttp { url: String, message: String },

    #[error("asset {url} returned status {status}")]
    AssetStatus { url: String, status: u16 },

    #[error("invalid catalog entry: {0}")]
    InvalidEntry(String),

    #[error("unreadable snapshot {0}")]
    SnapshotParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{failed} of {total} downloads failed")]
    #[diagnostic(help("re-run to resume; existing files are skipped"))]
    DownloadsFailed { failed: usize, total: usize },
}

impl MirrorError {
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            MirrorError::FeedHttp(_)
                | MirrorError::FeedStatus { .. }
                | MirrorError::FeedDecode(_)
                | MirrorError::AssetHttp { .. }
                | MirrorError::AssetStatus { .. }
        )
    }
}
