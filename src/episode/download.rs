// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use log::debug;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

use crate::error::DownloadError;
use crate::http::MediaClient;
use crate::service::DownloadUpdate;

/// Suffix of files that are still being written
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Location an in-flight download is streamed to before it is moved into place
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    (done.saturating_mul(100) / total).min(100) as u8
}

/// Stream a media file to `destination`
///
/// The body is written to a `.partial` sibling first and renamed once complete,
/// so the destination only ever holds finished files. Percent progress is sent
/// whenever it changes, provided the server announced a content length.
/// Returns the final path on success.
pub async fn download_to_file<C: MediaClient>(
    client: &C,
    url: &Url,
    destination: &Path,
    updates: &UnboundedSender<DownloadUpdate>,
) -> Result<PathBuf, DownloadError> {
    let response = client
        .open_stream(url.as_str())
        .await
        .map_err(|e| DownloadError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    if response.status >= 400 {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::DestinationFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }

    let partial = partial_path(destination);
    let mut file = File::create(&partial)
        .await
        .map_err(|e| DownloadError::DestinationFailed {
            path: partial.clone(),
            source: e,
        })?;

    let mut bytes_downloaded: u64 = 0;
    let mut last_percent = None;
    let mut stream = response.body;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;

        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: partial.clone(),
                source: e,
            })?;

        bytes_downloaded += chunk.len() as u64;

        if let Some(total) = response.content_length {
            let percent = percent_of(bytes_downloaded, total);
            if last_percent != Some(percent) {
                last_percent = Some(percent);
                let _ = updates.send(DownloadUpdate::Progress(percent));
            }
        }
    }

    file.flush()
        .await
        .map_err(|e| DownloadError::FileWriteFailed {
            path: partial.clone(),
            source: e,
        })?;
    drop(file);

    tokio::fs::rename(&partial, destination)
        .await
        .map_err(|e| DownloadError::FileWriteFailed {
            path: destination.to_path_buf(),
            source: e,
        })?;

    debug!("Downloaded {} bytes to {}", bytes_downloaded, destination.display());

    Ok(destination.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{ByteStream, MediaResponse};
    use async_trait::async_trait;
    use bytes::Bytes;
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    struct MockMediaClient {
        chunks: Vec<&'static [u8]>,
        status: u16,
        announce_length: bool,
    }

    #[async_trait]
    impl MediaClient for MockMediaClient {
        async fn fetch(&self, _url: &str) -> Result<Bytes, reqwest::Error> {
            Ok(Bytes::new())
        }

        async fn open_stream(&self, _url: &str) -> Result<MediaResponse, reqwest::Error> {
            let total: usize = self.chunks.iter().map(|c| c.len()).sum();
            let chunks: Vec<Result<Bytes, reqwest::Error>> = self
                .chunks
                .iter()
                .map(|c| Ok(Bytes::from_static(*c)))
                .collect();
            let body: ByteStream = Box::pin(futures::stream::iter(chunks));

            Ok(MediaResponse {
                status: self.status,
                content_length: self.announce_length.then_some(total as u64),
                body,
            })
        }
    }

    fn url() -> Url {
        Url::parse("https://example.com/episode.mp3").unwrap()
    }

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/pods/Cast/Ep.mp3")),
            PathBuf::from("/pods/Cast/Ep.mp3.partial")
        );
    }

    #[test]
    fn percent_is_bounded() {
        assert_eq!(percent_of(0, 10), 0);
        assert_eq!(percent_of(5, 10), 50);
        assert_eq!(percent_of(20, 10), 100);
        assert_eq!(percent_of(5, 0), 0);
    }

    #[tokio::test]
    async fn download_writes_file_and_reports_progress() {
        let dir = tempdir().unwrap();
        let destination = dir.path().join("Cast").join("Ep.mp3");
        let client = MockMediaClient {
            chunks: vec![&b"hello "[..], &b"world"[..]],
            status: 200,
            announce_length: true,
        };
        let (tx, mut rx) = mpsc::unbounded_channel();

        let path = download_to_file(&client, &url(), &destination, &tx)
            .await
            .unwrap();

        assert_eq!(path, destination);
        assert_eq!(std::fs::read(&destination).unwrap(), b"hello world");
        assert!(!partial_path(&destination).exists());

        let mut percents = Vec::new();
        while let Ok(DownloadUpdate::Progress(p)) = rx.try_recv() {
            percents.push(p);
        }
        assert_eq!(percents, vec![54, 100]);
    }

    #[tokio::test]
    async fn download_without_length_reports_no_progress() {
        let dir = tempdir().unwrap();
        let destination = dir.path().join("Ep.mp3");
        let client = MockMediaClient {
            chunks: vec![&b"data"[..]],
            status: 200,
            announce_length: false,
        };
        let (tx, mut rx) = mpsc::unbounded_channel();

        download_to_file(&client, &url(), &destination, &tx)
            .await
            .unwrap();

        assert!(rx.try_recv().is_err());
        assert!(destination.exists());
    }

    #[tokio::test]
    async fn download_fails_on_http_error() {
        let dir = tempdir().unwrap();
        let destination = dir.path().join("Ep.mp3");
        let client = MockMediaClient {
            chunks: vec![&b"Not Found"[..]],
            status: 404,
            announce_length: true,
        };
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = download_to_file(&client, &url(), &destination, &tx).await;

        match result.unwrap_err() {
            DownloadError::HttpStatus { status, .. } => assert_eq!(status, 404),
            other => panic!("Expected HttpStatus error, got {other:?}"),
        }
        assert!(!destination.exists());
    }
}
