// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Download lifecycle: start, progress, completion, failure and deletion.
//!
//! Service callbacks carry the ticket they belong to and only apply while
//! the record still holds that very ticket: the request number until the
//! service issues an id, the download id after. Anything else is a leftover
//! of a download that was deleted or superseded and gets dropped.

use std::io;
use std::path::PathBuf;

use log::{debug, info, warn};

use super::{EpisodeManager, lock};
use crate::episode::sanitize_file_path;
use crate::error::{DownloadError, DownloadErrorCode};
use crate::feed::Episode;
use crate::listener::DownloadEvent;
use crate::metadata::DownloadTicket;
use crate::service::{DownloadId, DownloadRequest, DownloadUpdate};

impl EpisodeManager {
    /// Start downloading an episode
    ///
    /// Does nothing if the episode is already downloading or downloaded. The
    /// record is marked as requested before this returns, so the episode
    /// reports as downloading right away.
    pub fn download(&self, episode: &Episode) {
        let (ticket, request) = {
            let mut state = self.state();
            let ticket = DownloadTicket::Requested(state.last_request + 1);
            let meta = state.metadata.entry(episode.id().to_string()).or_default();
            if meta.is_downloading() || meta.is_downloaded() {
                debug!("{} is already downloading or downloaded", episode.id());
                return;
            }

            meta.download = ticket;
            meta.file_path = None;
            meta.download_progress = None;
            meta.copy_episode_fields(episode);
            state.last_request += 1;
            state.mark_changed();

            let request = DownloadRequest {
                url: episode.media_url.clone(),
                destination: self.destination_for(episode),
                title: episode.name.clone(),
                description: episode.description.clone(),
            };
            (ticket, request)
        };

        info!("Downloading {} to {}", episode.id(), request.destination.display());

        let manager = self.clone();
        let episode = episode.clone();
        self.inner
            .runtime
            .spawn(async move { manager.run_download(episode, ticket, request).await });
    }

    /// Deterministic location of an episode's download
    pub fn destination_for(&self, episode: &Episode) -> PathBuf {
        self.inner.config.download_dir.join(sanitize_file_path(
            &episode.podcast.name,
            &episode.name,
            episode.id(),
        ))
    }

    async fn run_download(
        self,
        episode: Episode,
        ticket: DownloadTicket,
        request: DownloadRequest,
    ) {
        let service = self.inner.service.clone();

        let mut download = match service.enqueue(request).await {
            Ok(download) => download,
            Err(e) => {
                warn!("Could not enqueue {}: {}", episode.id(), e);
                self.on_failed(&episode, ticket, e.code());
                return;
            }
        };
        let id = download.id;

        if !self.on_enqueued(&episode, ticket, id) {
            debug!("Cancelling download {} of {}: no longer requested", id, episode.id());
            if let Err(e) = service.remove(id).await {
                debug!("Cancelling download {} failed: {}", id, e);
            }
            return;
        }

        while let Some(update) = download.updates.recv().await {
            match update {
                DownloadUpdate::Progress(percent) => self.on_progress(&episode, id, percent),
                DownloadUpdate::Completed(path) => {
                    self.on_completed(&episode, id, path);
                    return;
                }
                DownloadUpdate::Failed(error) => {
                    self.on_failed(&episode, DownloadTicket::Enqueued(id), error);
                    return;
                }
            }
        }

        debug!("Updates of download {} ended without a result", id);
    }

    /// Record the id the service issued; false if the request was withdrawn
    pub(crate) fn on_enqueued(
        &self,
        episode: &Episode,
        ticket: DownloadTicket,
        id: DownloadId,
    ) -> bool {
        let mut state = self.state();
        let Some(meta) = state.metadata.get_mut(episode.id()) else {
            return false;
        };
        if meta.download != ticket {
            return false;
        }

        meta.download = DownloadTicket::Enqueued(id);
        state.mark_changed();
        true
    }

    pub(crate) fn on_progress(&self, episode: &Episode, id: DownloadId, percent: u8) {
        let percent = percent.min(100);
        {
            let mut state = self.state();
            match state.metadata.get_mut(episode.id()) {
                Some(meta)
                    if meta.download == DownloadTicket::Enqueued(id) && meta.file_path.is_none() =>
                {
                    meta.download_progress = Some(percent);
                }
                _ => return,
            }
        }

        self.notify(DownloadEvent::Progress {
            episode: episode.clone(),
            percent,
        });
    }

    pub(crate) fn on_completed(&self, episode: &Episode, id: DownloadId, path: PathBuf) {
        {
            let mut state = self.state();
            let Some(meta) = state.metadata.get_mut(episode.id()) else {
                return;
            };
            if meta.download != DownloadTicket::Enqueued(id) {
                debug!("Ignoring completion of stale download {}", id);
                return;
            }

            meta.file_path = Some(path);
            meta.download_progress = None;
            state.mark_changed();
            if let Some(size) = state.downloads_size.as_mut() {
                *size += 1;
            }
        }

        info!("Downloaded {}", episode.id());
        self.notify(DownloadEvent::Succeeded {
            episode: episode.clone(),
        });
    }

    /// Revert a download that failed while its record held `ticket`
    pub(crate) fn on_failed(
        &self,
        episode: &Episode,
        ticket: DownloadTicket,
        error: DownloadErrorCode,
    ) {
        {
            let mut state = self.state();
            let Some(meta) = state.metadata.get_mut(episode.id()) else {
                return;
            };
            if meta.download != ticket {
                debug!("Ignoring failure of stale download of {}", episode.id());
                return;
            }

            meta.download = DownloadTicket::None;
            meta.file_path = None;
            meta.download_progress = None;
            state.mark_changed();
        }

        warn!("Download of {} failed: {}", episode.id(), error);
        self.notify(DownloadEvent::Failed {
            episode: episode.clone(),
            error,
        });
    }

    /// Cancel or delete the download of an episode
    ///
    /// The record is reset before this returns; cancelling at the service
    /// and removing the file happen in the background and are awaited by
    /// [`EpisodeManager::close`].
    pub fn delete_download(&self, episode: &Episode) {
        let (ticket, file_path) = {
            let mut state = self.state();
            let Some(meta) = state.metadata.get_mut(episode.id()) else {
                return;
            };
            let was_downloaded = meta.is_downloaded();
            if !was_downloaded && !meta.is_downloading() {
                return;
            }

            let ticket = std::mem::take(&mut meta.download);
            let file_path = meta.file_path.take();
            meta.download_progress = None;
            state.mark_changed();
            if was_downloaded && let Some(size) = state.downloads_size.as_mut() {
                *size = size.saturating_sub(1);
            }
            (ticket, file_path)
        };

        info!("Deleted download of {}", episode.id());
        self.notify(DownloadEvent::Deleted {
            episode: episode.clone(),
        });

        let service = self.inner.service.clone();
        let cleanup = self.inner.runtime.spawn(async move {
            if let DownloadTicket::Enqueued(id) = ticket {
                match service.remove(id).await {
                    Ok(()) | Err(DownloadError::UnknownId(_)) => {}
                    Err(e) => warn!("Could not cancel download {}: {}", id, e),
                }
            }
            if let Some(path) = file_path {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => debug!("Removed {}", path.display()),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => warn!("Could not remove {}: {}", path.display(), e),
                }
            }
        });

        let mut cleanups = lock(&self.inner.cleanups);
        cleanups.retain(|handle| !handle.is_finished());
        cleanups.push(cleanup);
    }

    /// Reset every download still in flight
    ///
    /// Ids in the journal were issued by the service of an earlier process
    /// and mean nothing to the current one. Call this right after `open`,
    /// before the first `download`, when the service does not survive
    /// restarts. Returns the reset episodes.
    pub fn forget_in_flight(&self) -> Vec<Episode> {
        let mut state = self.state();
        let mut forgotten = Vec::new();
        let mut reset = 0;

        for (id, meta) in state.metadata.iter_mut() {
            if !meta.is_downloading() {
                continue;
            }
            reset += 1;
            meta.download = DownloadTicket::None;
            meta.download_progress = None;
            if let Some(episode) = meta.to_episode(id) {
                forgotten.push(episode);
            }
        }

        if reset > 0 {
            info!("Forgot {} interrupted downloads", reset);
            state.mark_changed();
        }
        forgotten
    }

    /// Show the episode a download notification belongs to
    ///
    /// Returns false if no record holds `id` or no navigator is installed.
    pub fn handle_notification_click(&self, id: DownloadId) -> bool {
        let episode = self
            .state()
            .metadata
            .iter()
            .find(|(_, meta)| meta.download == DownloadTicket::Enqueued(id))
            .and_then(|(key, meta)| meta.to_episode(key));
        let navigator = lock(&self.inner.navigator).clone();

        match (episode, navigator) {
            (Some(episode), Some(navigator)) => {
                navigator.show_episode(&episode);
                true
            }
            _ => false,
        }
    }
}
