// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod config;
pub mod episode;
pub mod error;
pub mod feed;
pub mod http;
pub mod listener;
pub mod manager;
pub mod metadata;
pub mod service;

// Re-export main types for convenience
pub use config::Config;
pub use error::{ConfigError, DownloadError, DownloadErrorCode, FeedError, JournalError};
pub use feed::{Episode, Feed, Podcast, is_url, load_feed, parse_feed};
pub use http::{MediaClient, ReqwestClient};
pub use listener::{
    DownloadEvent, DownloadListener, EpisodeNavigator, SharedDownloadListener, SharedNavigator,
};
pub use manager::{EpisodeManager, SaveOutcome};
pub use service::{DownloadId, DownloadService, HttpDownloadService, SharedDownloadService};
