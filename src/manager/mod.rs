// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The episode manager: owner of the in-memory metadata map.
//!
//! All mutations go through one mutex-guarded state, which is the single
//! writer every download lifecycle task, deletion and query funnels through.
//! Listeners are always notified after that lock has been released.

mod coordinator;
mod query;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use log::{info, warn};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::JournalError;
use crate::feed::Episode;
use crate::listener::{DownloadEvent, ListenerSet, SharedDownloadListener, SharedNavigator};
use crate::metadata::{EpisodeMetadata, MetadataMap, load_journal, save_journal};
use crate::service::SharedDownloadService;

/// Result of a save checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The journal was rewritten with this many records
    Stored(usize),
    /// Nothing changed since the last successful save
    Unchanged,
}

struct ManagerState {
    metadata: MetadataMap,
    /// Bumped by every persistent mutation
    revision: u64,
    /// Revision most recently written to the journal
    saved_revision: u64,
    /// Number of downloaded episodes, once computed
    downloads_size: Option<usize>,
    /// Number of the most recent download request
    last_request: u64,
}

impl ManagerState {
    fn mark_changed(&mut self) {
        self.revision += 1;
    }

    fn is_dirty(&self) -> bool {
        self.revision != self.saved_revision
    }
}

struct Inner {
    config: Config,
    service: SharedDownloadService,
    runtime: Handle,
    state: Mutex<ManagerState>,
    listeners: Mutex<ListenerSet>,
    navigator: Mutex<Option<SharedNavigator>>,
    cleanups: Mutex<Vec<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tracks, persists and reconciles the download state of every episode.
///
/// Cheap to clone; all clones share the same state. Must be opened from
/// within a tokio runtime, which is then used for all background work.
#[derive(Clone)]
pub struct EpisodeManager {
    inner: Arc<Inner>,
}

impl EpisodeManager {
    /// Load the journal and reconcile it against the download directory
    ///
    /// Loading never fails; a missing or corrupt journal starts the manager
    /// with whatever could be recovered.
    pub async fn open(config: Config, service: SharedDownloadService) -> Self {
        let start = Instant::now();
        let journal = config.journal_path();
        let download_dir = config.download_dir.clone();

        let metadata =
            match tokio::task::spawn_blocking(move || load_journal(&journal, &download_dir)).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Metadata load task failed: {}", e);
                    MetadataMap::new()
                }
            };

        info!(
            "Episode manager ready with {} records after {}ms",
            metadata.len(),
            start.elapsed().as_millis()
        );
        Self::from_parts(config, service, metadata)
    }

    fn from_parts(config: Config, service: SharedDownloadService, metadata: MetadataMap) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                service,
                runtime: Handle::current(),
                state: Mutex::new(ManagerState {
                    metadata,
                    revision: 0,
                    saved_revision: 0,
                    downloads_size: None,
                    last_request: 0,
                }),
                listeners: Mutex::new(ListenerSet::default()),
                navigator: Mutex::new(None),
                cleanups: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    fn state(&self) -> MutexGuard<'_, ManagerState> {
        lock(&self.inner.state)
    }

    /// Whether in-memory state differs from the journal
    pub fn is_dirty(&self) -> bool {
        self.state().is_dirty()
    }

    /// Persist the metadata map if anything changed
    ///
    /// Records without data are dropped first. The dirty flag is only cleared
    /// if the write succeeded and nothing changed while it was running.
    pub async fn save(&self) -> Result<SaveOutcome, JournalError> {
        let (snapshot, revision) = {
            let mut state = self.state();
            if !state.is_dirty() {
                return Ok(SaveOutcome::Unchanged);
            }
            state.metadata.retain(|_, meta| meta.has_data());
            (state.metadata.clone(), state.revision)
        };

        let path = self.inner.config.journal_path();
        let stored = tokio::task::spawn_blocking(move || save_journal(&path, &snapshot)).await??;

        let mut state = self.state();
        state.saved_revision = state.saved_revision.max(revision);
        info!("Stored {} metadata records", stored);

        Ok(SaveOutcome::Stored(stored))
    }

    /// Wait for pending cleanups, then save
    pub async fn close(self) -> Result<SaveOutcome, JournalError> {
        let pending = std::mem::take(&mut *lock(&self.inner.cleanups));
        for handle in pending {
            if let Err(e) = handle.await {
                warn!("Cleanup task failed: {}", e);
            }
        }
        self.save().await
    }

    pub fn add_download_listener(&self, listener: SharedDownloadListener) {
        lock(&self.inner.listeners).add(listener);
    }

    pub fn remove_download_listener(&self, listener: &SharedDownloadListener) {
        lock(&self.inner.listeners).remove(listener);
    }

    /// Install the hook used when a download notification is clicked
    pub fn set_navigator(&self, navigator: SharedNavigator) {
        *lock(&self.inner.navigator) = Some(navigator);
    }

    fn notify(&self, event: DownloadEvent) {
        let listeners = lock(&self.inner.listeners).clone();
        listeners.notify(&event);
    }

    /// Apply `update` to the record of `episode`, creating it if needed.
    /// `update` returns whether it changed anything.
    fn update_record(&self, episode: &Episode, update: impl FnOnce(&mut EpisodeMetadata) -> bool) {
        let mut state = self.state();
        let meta = state.metadata.entry(episode.id().to_string()).or_default();
        if meta.episode_name.is_none() {
            meta.copy_episode_fields(episode);
        }
        if update(meta) {
            state.mark_changed();
        }
    }

    /// Playback position to resume the episode at, in milliseconds
    pub fn resume_at(&self, episode: &Episode) -> Option<u64> {
        self.state()
            .metadata
            .get(episode.id())
            .and_then(|meta| meta.resume_at)
    }

    pub fn set_resume_at(&self, episode: &Episode, position: Option<u64>) {
        self.update_record(episode, |meta| {
            let changed = meta.resume_at != position;
            meta.resume_at = position;
            changed
        });
    }

    /// Whether the episode has been marked as listened to
    pub fn is_old(&self, episode: &Episode) -> bool {
        self.state()
            .metadata
            .get(episode.id())
            .and_then(|meta| meta.is_old)
            .unwrap_or(false)
    }

    pub fn set_old(&self, episode: &Episode, old: bool) {
        self.update_record(episode, |meta| {
            let changed = meta.is_old != Some(old);
            meta.is_old = Some(old);
            changed
        });
    }

    /// Position of the episode in the playlist
    pub fn playlist_position(&self, episode: &Episode) -> Option<u32> {
        self.state()
            .metadata
            .get(episode.id())
            .and_then(|meta| meta.playlist_position)
    }

    pub fn set_playlist_position(&self, episode: &Episode, position: Option<u32>) {
        self.update_record(episode, |meta| {
            let changed = meta.playlist_position != position;
            meta.playlist_position = position;
            changed
        });
    }
}
