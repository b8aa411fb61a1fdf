// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use crate::error::DownloadErrorCode;
use crate::feed::Episode;

/// Download lifecycle notifications fanned out to registered listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    /// Percent complete in [0, 100]
    Progress { episode: Episode, percent: u8 },

    /// The episode file is available locally
    Succeeded { episode: Episode },

    /// The download failed; the episode is back to "not downloaded"
    Failed {
        episode: Episode,
        error: DownloadErrorCode,
    },

    /// Download and local file were removed on request
    Deleted { episode: Episode },
}

impl DownloadEvent {
    pub fn episode(&self) -> &Episode {
        match self {
            DownloadEvent::Progress { episode, .. }
            | DownloadEvent::Succeeded { episode }
            | DownloadEvent::Failed { episode, .. }
            | DownloadEvent::Deleted { episode } => episode,
        }
    }
}

/// Observer of download lifecycle events.
///
/// Called without any manager lock held, so implementations may query the
/// manager from inside `on_download_event`.
pub trait DownloadListener: Send + Sync {
    fn on_download_event(&self, event: &DownloadEvent);
}

/// A shared reference to a download listener
pub type SharedDownloadListener = Arc<dyn DownloadListener>;

/// Host hook asked to bring a specific episode to the user's attention,
/// e.g. after a click on a download notification
pub trait EpisodeNavigator: Send + Sync {
    fn show_episode(&self, episode: &Episode);
}

/// A shared reference to an episode navigator
pub type SharedNavigator = Arc<dyn EpisodeNavigator>;

/// Registered listeners, compared by identity
#[derive(Default, Clone)]
pub(crate) struct ListenerSet {
    listeners: Vec<SharedDownloadListener>,
}

impl ListenerSet {
    /// Add a listener unless this very instance is already registered
    pub fn add(&mut self, listener: SharedDownloadListener) {
        if !self.listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            self.listeners.push(listener);
        }
    }

    pub fn remove(&mut self, listener: &SharedDownloadListener) {
        self.listeners.retain(|l| !Arc::ptr_eq(l, listener));
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn notify(&self, event: &DownloadEvent) {
        for listener in &self.listeners {
            listener.on_download_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::Podcast;
    use std::sync::Mutex;
    use url::Url;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<DownloadEvent>>,
    }

    impl DownloadListener for Recorder {
        fn on_download_event(&self, event: &DownloadEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn episode() -> Episode {
        Episode {
            podcast: Podcast {
                name: "Cast".to_string(),
                url: None,
            },
            name: "Ep".to_string(),
            media_url: Url::parse("https://example.com/ep.mp3").unwrap(),
            pub_date: None,
            description: None,
        }
    }

    #[test]
    fn listener_set_ignores_duplicate_registration() {
        let recorder: SharedDownloadListener = Arc::new(Recorder::default());
        let mut set = ListenerSet::default();

        set.add(recorder.clone());
        set.add(recorder.clone());
        assert_eq!(set.len(), 1);

        set.add(Arc::new(Recorder::default()));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn removed_listener_is_not_notified() {
        let recorder = Arc::new(Recorder::default());
        let shared: SharedDownloadListener = recorder.clone();
        let mut set = ListenerSet::default();
        set.add(shared.clone());

        set.notify(&DownloadEvent::Deleted { episode: episode() });
        set.remove(&shared);
        set.notify(&DownloadEvent::Deleted { episode: episode() });

        assert_eq!(recorder.events.lock().unwrap().len(), 1);
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn event_exposes_episode() {
        let event = DownloadEvent::Failed {
            episode: episode(),
            error: DownloadErrorCode::Network,
        };
        assert_eq!(event.episode().name, "Ep");
    }
}
