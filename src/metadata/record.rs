// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use url::Url;

use crate::feed::{Episode, Podcast};
use crate::service::DownloadId;

/// Download handle state of a record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DownloadTicket {
    /// No download tracked by the service
    #[default]
    None,
    /// Enqueue was requested but the service has not issued an id yet.
    /// Carries the number of the request within this process, 0 for records
    /// read from the journal.
    Requested(u64),
    Enqueued(DownloadId),
}

impl DownloadTicket {
    pub fn is_tracked(&self) -> bool {
        !matches!(self, DownloadTicket::None)
    }

    /// Numeric form used in the journal; `Requested` is written as 0
    pub fn as_journal_value(&self) -> Option<u64> {
        match self {
            DownloadTicket::None => None,
            DownloadTicket::Requested(_) => Some(0),
            DownloadTicket::Enqueued(id) => Some(id.0),
        }
    }

    pub fn from_journal_value(value: u64) -> Self {
        match value {
            0 => DownloadTicket::Requested(0),
            id => DownloadTicket::Enqueued(DownloadId(id)),
        }
    }
}

/// Persisted facts about one episode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpisodeMetadata {
    pub download: DownloadTicket,
    /// Absolute location of the finished download
    pub file_path: Option<PathBuf>,
    /// Last reported percent; never persisted
    pub download_progress: Option<u8>,
    pub episode_name: Option<String>,
    pub episode_date: Option<DateTime<Utc>>,
    pub episode_description: Option<String>,
    pub podcast_name: Option<String>,
    pub podcast_url: Option<String>,
    /// Playback resume position in milliseconds
    pub resume_at: Option<u64>,
    /// Episode has been marked as listened to
    pub is_old: Option<bool>,
    /// Position of the episode in the playlist
    pub playlist_position: Option<u32>,
}

/// Episode identifier to metadata record
pub type MetadataMap = HashMap<String, EpisodeMetadata>;

impl EpisodeMetadata {
    /// Whether this record carries anything worth persisting
    pub fn has_data(&self) -> bool {
        self.episode_name.is_some()
            || self.download.is_tracked()
            || self.file_path.is_some()
            || self.resume_at.is_some()
            || self.is_old.is_some()
            || self.playlist_position.is_some()
    }

    /// Download tracked and not yet finished
    pub fn is_downloading(&self) -> bool {
        self.download.is_tracked() && self.file_path.is_none()
    }

    /// Download tracked, finished, and the file is still there
    pub fn is_downloaded(&self) -> bool {
        self.download.is_tracked() && self.file_path.as_deref().is_some_and(Path::exists)
    }

    /// Cache the descriptive fields of an episode
    pub fn copy_episode_fields(&mut self, episode: &Episode) {
        self.episode_name = Some(episode.name.clone());
        self.episode_date = episode.pub_date;
        self.episode_description = episode.description.clone();
        self.podcast_name = Some(episode.podcast.name.clone());
        self.podcast_url = episode.podcast.url.as_ref().map(Url::to_string);
    }

    /// Rebuild a minimal episode from the cached fields
    ///
    /// Returns `None` if the identifier is not a URL or the episode or podcast
    /// name was never cached.
    pub fn to_episode(&self, id: &str) -> Option<Episode> {
        let media_url = Url::parse(id).ok()?;

        Some(Episode {
            podcast: Podcast {
                name: self.podcast_name.clone()?,
                url: self.podcast_url.as_deref().and_then(|u| Url::parse(u).ok()),
            },
            name: self.episode_name.clone()?,
            media_url,
            pub_date: self.episode_date,
            description: self.episode_description.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_episode() -> Episode {
        Episode {
            podcast: Podcast {
                name: "Test Cast".to_string(),
                url: Some(Url::parse("https://example.com/feed.xml").unwrap()),
            },
            name: "Pilot".to_string(),
            media_url: Url::parse("https://example.com/pilot.mp3").unwrap(),
            pub_date: DateTime::from_timestamp_millis(1_705_320_000_000),
            description: Some("The first one".to_string()),
        }
    }

    #[test]
    fn ticket_journal_values() {
        assert_eq!(DownloadTicket::None.as_journal_value(), None);
        assert_eq!(DownloadTicket::Requested(5).as_journal_value(), Some(0));
        assert_eq!(
            DownloadTicket::Enqueued(DownloadId(7)).as_journal_value(),
            Some(7)
        );
        assert_eq!(
            DownloadTicket::from_journal_value(0),
            DownloadTicket::Requested(0)
        );
        assert_eq!(
            DownloadTicket::from_journal_value(12),
            DownloadTicket::Enqueued(DownloadId(12))
        );
    }

    #[test]
    fn empty_record_has_no_data() {
        assert!(!EpisodeMetadata::default().has_data());
    }

    #[test]
    fn progress_and_description_alone_are_not_data() {
        let meta = EpisodeMetadata {
            download_progress: Some(40),
            episode_description: Some("text".to_string()),
            ..Default::default()
        };
        assert!(!meta.has_data());
    }

    #[test]
    fn any_meaningful_field_is_data() {
        let with_name = EpisodeMetadata {
            episode_name: Some("Pilot".to_string()),
            ..Default::default()
        };
        let with_ticket = EpisodeMetadata {
            download: DownloadTicket::Requested(1),
            ..Default::default()
        };
        let with_position = EpisodeMetadata {
            playlist_position: Some(2),
            ..Default::default()
        };
        let with_resume = EpisodeMetadata {
            resume_at: Some(1000),
            ..Default::default()
        };
        assert!(with_name.has_data());
        assert!(with_ticket.has_data());
        assert!(with_position.has_data());
        assert!(with_resume.has_data());
    }

    #[test]
    fn downloading_and_downloaded_are_exclusive() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("ep.mp3");
        std::fs::write(&file, b"audio").unwrap();

        let mut meta = EpisodeMetadata {
            download: DownloadTicket::Enqueued(DownloadId(3)),
            ..Default::default()
        };
        assert!(meta.is_downloading());
        assert!(!meta.is_downloaded());

        meta.file_path = Some(file.clone());
        assert!(!meta.is_downloading());
        assert!(meta.is_downloaded());

        std::fs::remove_file(&file).unwrap();
        assert!(!meta.is_downloading());
        assert!(!meta.is_downloaded());
    }

    #[test]
    fn untracked_file_is_not_downloaded() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("ep.mp3");
        std::fs::write(&file, b"audio").unwrap();

        let meta = EpisodeMetadata {
            file_path: Some(file),
            ..Default::default()
        };
        assert!(!meta.is_downloaded());
        assert!(!meta.is_downloading());
    }

    #[test]
    fn copy_then_materialize_recovers_episode() {
        let episode = make_episode();
        let mut meta = EpisodeMetadata::default();
        meta.copy_episode_fields(&episode);

        assert_eq!(meta.to_episode(episode.id()), Some(episode));
    }

    #[test]
    fn materialize_requires_names() {
        let meta = EpisodeMetadata {
            episode_name: Some("Pilot".to_string()),
            ..Default::default()
        };
        assert!(meta.to_episode("https://example.com/pilot.mp3").is_none());
    }

    #[test]
    fn materialize_requires_url_identifier() {
        let mut meta = EpisodeMetadata::default();
        meta.copy_episode_fields(&make_episode());
        assert!(meta.to_episode("not a url").is_none());
    }
}
