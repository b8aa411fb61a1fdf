// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use thiserror::Error;

use crate::service::DownloadId;

/// Errors that can occur when fetching or parsing RSS feeds
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to fetch feed from {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to read feed file {path}: {source}")]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse RSS feed: {0}")]
    ParseFailed(#[from] rss::Error),

    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Episode '{title}' has no enclosure (audio file)")]
    MissingEnclosure { title: String },
}

/// Categorical reason a download did not complete, as reported to listeners
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadErrorCode {
    #[error("network failure")]
    Network,

    #[error("server answered with HTTP {0}")]
    Http(u16),

    #[error("local storage unavailable")]
    Storage,

    #[error("unknown download failure")]
    Unknown,
}

/// Errors raised by a download service
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to prepare destination {path}: {source}")]
    DestinationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Download {0} is not known to the download service")]
    UnknownId(DownloadId),
}

impl DownloadError {
    /// Map this error onto the categorical code surfaced to listeners
    pub fn code(&self) -> DownloadErrorCode {
        match self {
            DownloadError::HttpFailed { .. } | DownloadError::StreamFailed { .. } => {
                DownloadErrorCode::Network
            }
            DownloadError::HttpStatus { status, .. } => DownloadErrorCode::Http(*status),
            DownloadError::DestinationFailed { .. } | DownloadError::FileWriteFailed { .. } => {
                DownloadErrorCode::Storage
            }
            DownloadError::UnknownId(_) => DownloadErrorCode::Unknown,
        }
    }
}

/// Errors that can occur while persisting the episode metadata journal
#[derive(Error, Debug)]
pub enum JournalError {
    #[error("Failed to create journal directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write metadata journal {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to replace metadata journal {path}: {source}")]
    CommitFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Journal task did not finish: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

/// Errors that can occur when loading the configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine the {0} directory for this platform")]
    NoPlatformDirectory(&'static str),

    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_maps_to_http_code() {
        let err = DownloadError::HttpStatus {
            url: "https://example.com/ep.mp3".to_string(),
            status: 404,
        };
        assert_eq!(err.code(), DownloadErrorCode::Http(404));
    }

    #[test]
    fn file_errors_map_to_storage_code() {
        let err = DownloadError::FileWriteFailed {
            path: PathBuf::from("/tmp/ep.mp3"),
            source: std::io::Error::other("disk full"),
        };
        assert_eq!(err.code(), DownloadErrorCode::Storage);
    }

    #[test]
    fn unknown_id_names_the_download() {
        let err = DownloadError::UnknownId(DownloadId(42));
        assert_eq!(
            err.to_string(),
            "Download 42 is not known to the download service"
        );
    }
}
