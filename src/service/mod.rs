// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod http;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use url::Url;

use crate::error::{DownloadError, DownloadErrorCode};

pub use http::HttpDownloadService;

/// Opaque handle issued by a download service for one enqueued download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DownloadId(pub u64);

impl fmt::Display for DownloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What to fetch and where the finished file has to end up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: Url,
    pub destination: PathBuf,
    pub title: String,
    pub description: Option<String>,
}

/// Lifecycle notifications for one download, in the order they happen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadUpdate {
    /// Percent complete in [0, 100]
    Progress(u8),
    /// Finished; carries the final local file
    Completed(PathBuf),
    Failed(DownloadErrorCode),
}

/// A download accepted by the service
#[derive(Debug)]
pub struct EnqueuedDownload {
    pub id: DownloadId,
    /// Ends after a `Completed` or `Failed` update, or when the download is removed
    pub updates: UnboundedReceiver<DownloadUpdate>,
}

/// Capability performing long-running downloads outside the manager
///
/// Implementations serialize the updates of a single download; the manager
/// drives one lifecycle task per enqueued download.
#[async_trait]
pub trait DownloadService: Send + Sync {
    /// Start a download and hand out its id plus the update stream
    async fn enqueue(&self, request: DownloadRequest) -> Result<EnqueuedDownload, DownloadError>;

    /// Cancel a download and forget about it
    ///
    /// Returns `DownloadError::UnknownId` when the id was never issued or has
    /// already been cleaned up.
    async fn remove(&self, id: DownloadId) -> Result<(), DownloadError>;
}

/// A shared reference to a download service
pub type SharedDownloadService = Arc<dyn DownloadService>;
