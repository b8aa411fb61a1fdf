// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use log::warn;

use super::EpisodeManager;
use crate::feed::{Episode, Podcast};

impl EpisodeManager {
    pub fn is_downloaded(&self, episode: &Episode) -> bool {
        self.state()
            .metadata
            .get(episode.id())
            .is_some_and(|meta| meta.is_downloaded())
    }

    pub fn is_downloading(&self, episode: &Episode) -> bool {
        self.state()
            .metadata
            .get(episode.id())
            .is_some_and(|meta| meta.is_downloading())
    }

    pub fn is_downloading_or_downloaded(&self, episode: &Episode) -> bool {
        self.state()
            .metadata
            .get(episode.id())
            .is_some_and(|meta| meta.is_downloading() || meta.is_downloaded())
    }

    /// Last reported percent of a running download
    pub fn download_progress(&self, episode: &Episode) -> Option<u8> {
        self.state()
            .metadata
            .get(episode.id())
            .filter(|meta| meta.is_downloading())
            .and_then(|meta| meta.download_progress)
    }

    /// Local file of a downloaded episode
    pub fn local_path(&self, episode: &Episode) -> Option<PathBuf> {
        self.state()
            .metadata
            .get(episode.id())
            .filter(|meta| meta.is_downloaded())
            .and_then(|meta| meta.file_path.clone())
    }

    /// Episode rebuilt from its cached record
    pub fn episode(&self, id: &str) -> Option<Episode> {
        self.state()
            .metadata
            .get(id)
            .and_then(|meta| meta.to_episode(id))
    }

    /// All downloaded episodes, newest first
    ///
    /// Checks every candidate file on disk, so prefer
    /// [`EpisodeManager::load_downloads`] from async code.
    pub fn downloads(&self) -> Vec<Episode> {
        let candidates: Vec<_> = self
            .state()
            .metadata
            .iter()
            .filter(|(_, meta)| meta.download.is_tracked() && meta.file_path.is_some())
            .map(|(id, meta)| (id.clone(), meta.clone()))
            .collect();

        let mut episodes: Vec<Episode> = candidates
            .into_iter()
            .filter(|(_, meta)| meta.is_downloaded())
            .filter_map(|(id, meta)| meta.to_episode(&id))
            .collect();
        episodes.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then_with(|| a.id().cmp(b.id())));

        self.state().downloads_size = Some(episodes.len());
        episodes
    }

    /// Number of downloaded episodes
    pub fn downloads_size(&self) -> usize {
        if let Some(size) = self.state().downloads_size {
            return size;
        }
        self.downloads().len()
    }

    /// Downloaded episodes off the async executor, optionally of one podcast
    ///
    /// Podcasts are matched by feed URL when known, by name otherwise.
    pub async fn load_downloads(&self, podcast: Option<&Podcast>) -> Vec<Episode> {
        let manager = self.clone();
        let episodes = match tokio::task::spawn_blocking(move || manager.downloads()).await {
            Ok(episodes) => episodes,
            Err(e) => {
                warn!("Loading downloads failed: {}", e);
                return Vec::new();
            }
        };

        match podcast {
            None => episodes,
            Some(podcast) => episodes
                .into_iter()
                .filter(|episode| belongs_to(episode, podcast))
                .collect(),
        }
    }
}

fn belongs_to(episode: &Episode, podcast: &Podcast) -> bool {
    match &podcast.url {
        Some(url) => episode.podcast.url.as_ref() == Some(url),
        None => episode.podcast.name == podcast.name,
    }
}
