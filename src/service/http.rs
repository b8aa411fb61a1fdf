// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use super::{DownloadId, DownloadRequest, DownloadService, DownloadUpdate, EnqueuedDownload};
use crate::episode::{download_to_file, partial_path};
use crate::error::DownloadError;
use crate::http::MediaClient;

struct ActiveDownload {
    task: AbortHandle,
    destination: PathBuf,
}

type ActiveDownloads = Arc<Mutex<HashMap<DownloadId, ActiveDownload>>>;

fn lock(active: &ActiveDownloads) -> MutexGuard<'_, HashMap<DownloadId, ActiveDownload>> {
    active.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Download service running every download as a tokio task over a `MediaClient`
///
/// Ids are issued from 1 upwards and forgotten once a download finishes, so a
/// later `remove` of a finished download reports `UnknownId`.
pub struct HttpDownloadService<C> {
    client: C,
    next_id: AtomicU64,
    active: ActiveDownloads,
}

impl<C: MediaClient + Clone + 'static> HttpDownloadService<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            next_id: AtomicU64::new(1),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of downloads currently running
    pub fn active_count(&self) -> usize {
        lock(&self.active).len()
    }
}

#[async_trait]
impl<C: MediaClient + Clone + 'static> DownloadService for HttpDownloadService<C> {
    async fn enqueue(&self, request: DownloadRequest) -> Result<EnqueuedDownload, DownloadError> {
        let id = DownloadId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::unbounded_channel();

        let client = self.client.clone();
        let active = self.active.clone();
        let destination = request.destination.clone();

        // Hold the registry while spawning so the task cannot deregister
        // itself before it has been registered.
        let mut downloads = lock(&self.active);
        let handle = tokio::spawn(async move {
            let update =
                match download_to_file(&client, &request.url, &request.destination, &tx).await {
                    Ok(path) => DownloadUpdate::Completed(path),
                    Err(e) => {
                        warn!("Download of '{}' failed: {}", request.title, e);
                        let _ = tokio::fs::remove_file(partial_path(&request.destination)).await;
                        DownloadUpdate::Failed(e.code())
                    }
                };
            lock(&active).remove(&id);
            let _ = tx.send(update);
        });
        downloads.insert(
            id,
            ActiveDownload {
                task: handle.abort_handle(),
                destination,
            },
        );
        drop(downloads);

        debug!("Enqueued download {}", id);
        Ok(EnqueuedDownload { id, updates: rx })
    }

    async fn remove(&self, id: DownloadId) -> Result<(), DownloadError> {
        let download = lock(&self.active)
            .remove(&id)
            .ok_or(DownloadError::UnknownId(id))?;

        download.task.abort();
        let _ = tokio::fs::remove_file(partial_path(&download.destination)).await;
        debug!("Removed download {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DownloadErrorCode;
    use crate::http::{ByteStream, MediaResponse};
    use bytes::Bytes;
    use tempfile::tempdir;
    use url::Url;

    #[derive(Clone)]
    struct MockMediaClient {
        status: u16,
        data: &'static [u8],
    }

    #[async_trait]
    impl MediaClient for MockMediaClient {
        async fn fetch(&self, _url: &str) -> Result<Bytes, reqwest::Error> {
            Ok(Bytes::from_static(self.data))
        }

        async fn open_stream(&self, _url: &str) -> Result<MediaResponse, reqwest::Error> {
            let data = self.data;
            let body: ByteStream =
                Box::pin(futures::stream::once(async move { Ok(Bytes::from_static(data)) }));

            Ok(MediaResponse {
                status: self.status,
                content_length: Some(data.len() as u64),
                body,
            })
        }
    }

    fn request(destination: PathBuf) -> DownloadRequest {
        DownloadRequest {
            url: Url::parse("https://example.com/ep.mp3").unwrap(),
            destination,
            title: "Episode".to_string(),
            description: None,
        }
    }

    async fn last_update(download: &mut EnqueuedDownload) -> Option<DownloadUpdate> {
        let mut last = None;
        while let Some(update) = download.updates.recv().await {
            last = Some(update);
        }
        last
    }

    #[tokio::test]
    async fn enqueue_issues_increasing_ids() {
        let dir = tempdir().unwrap();
        let service = HttpDownloadService::new(MockMediaClient {
            status: 200,
            data: b"audio",
        });

        let first = service.enqueue(request(dir.path().join("a.mp3"))).await.unwrap();
        let second = service.enqueue(request(dir.path().join("b.mp3"))).await.unwrap();

        assert_eq!(first.id, DownloadId(1));
        assert_eq!(second.id, DownloadId(2));
    }

    #[tokio::test]
    async fn completed_download_reports_final_path_and_is_forgotten() {
        let dir = tempdir().unwrap();
        let destination = dir.path().join("Cast").join("ep.mp3");
        let service = HttpDownloadService::new(MockMediaClient {
            status: 200,
            data: b"audio",
        });

        let mut download = service.enqueue(request(destination.clone())).await.unwrap();

        assert_eq!(
            last_update(&mut download).await,
            Some(DownloadUpdate::Completed(destination.clone()))
        );
        assert!(destination.exists());
        assert_eq!(service.active_count(), 0);
        assert!(matches!(
            service.remove(download.id).await,
            Err(DownloadError::UnknownId(_))
        ));
    }

    #[tokio::test]
    async fn failed_download_reports_error_code() {
        let dir = tempdir().unwrap();
        let service = HttpDownloadService::new(MockMediaClient {
            status: 503,
            data: b"",
        });

        let mut download = service
            .enqueue(request(dir.path().join("ep.mp3")))
            .await
            .unwrap();

        assert_eq!(
            last_update(&mut download).await,
            Some(DownloadUpdate::Failed(DownloadErrorCode::Http(503)))
        );
    }

    #[tokio::test]
    async fn remove_unknown_id_is_reported() {
        let service = HttpDownloadService::new(MockMediaClient {
            status: 200,
            data: b"",
        });

        let result = service.remove(DownloadId(99)).await;
        assert!(matches!(result, Err(DownloadError::UnknownId(DownloadId(99)))));
    }
}
