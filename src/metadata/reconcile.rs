// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use log::debug;

use super::record::{DownloadTicket, MetadataMap};
use crate::episode::sanitize_file_path;

/// What a reconciliation run changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Downloads that finished while nobody was watching
    pub backfilled: usize,
    /// Downloads whose file disappeared
    pub invalidated: usize,
}

/// Align loaded records with what is actually on disk
///
/// First backfills the file path of tracked downloads whose file exists at
/// the deterministic download location, then invalidates every tracked
/// download whose file is gone. The second pass must see the results of the
/// first.
pub fn reconcile(records: &mut MetadataMap, download_dir: &Path) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for (id, meta) in records.iter_mut() {
        if !meta.download.is_tracked() || meta.file_path.is_some() {
            continue;
        }
        let (Some(podcast), Some(episode)) = (&meta.podcast_name, &meta.episode_name) else {
            continue;
        };

        let candidate = download_dir.join(sanitize_file_path(podcast, episode, id));
        if candidate.exists() {
            debug!("Found finished download for {} at {}", id, candidate.display());
            meta.file_path = Some(candidate);
            report.backfilled += 1;
        }
    }

    for (id, meta) in records.iter_mut() {
        if !meta.download.is_tracked() {
            continue;
        }
        if meta.file_path.as_deref().is_some_and(|path| !path.exists()) {
            debug!("Download of {} vanished from disk", id);
            meta.download = DownloadTicket::None;
            meta.file_path = None;
            report.invalidated += 1;
        }
    }

    report
}
