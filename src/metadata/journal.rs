// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fs::File;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::reconcile::reconcile;
use super::record::{DownloadTicket, EpisodeMetadata, MetadataMap};
use crate::episode::partial_path;
use crate::error::JournalError;

/// Tag and attribute names of the journal file
mod tags {
    pub const ROOT: &str = "xml";
    pub const DATE_MODIFIED: &str = "dateModified";
    pub const METADATA: &str = "metadata";
    pub const EPISODE_URL: &str = "episodeUrl";
    pub const EPISODE_NAME: &str = "episodeName";
    pub const EPISODE_DATE: &str = "episodeDate";
    pub const EPISODE_DESCRIPTION: &str = "episodeDescription";
    pub const PODCAST_NAME: &str = "podcastName";
    pub const PODCAST_URL: &str = "podcastUrl";
    pub const DOWNLOAD_ID: &str = "downloadId";
    pub const LOCAL_FILE_PATH: &str = "localFilePath";
    pub const RESUME_AT: &str = "episodeResumeAt";
    pub const EPISODE_STATE: &str = "episodeState";
    pub const PLAYLIST_POSITION: &str = "playlistPosition";
}

const FILE_ENCODING: &str = "UTF-8";

/// Sub-fields of a metadata record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    EpisodeName,
    EpisodeDate,
    EpisodeDescription,
    PodcastName,
    PodcastUrl,
    DownloadId,
    LocalFilePath,
    ResumeAt,
    EpisodeState,
    PlaylistPosition,
}

impl Field {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        const FIELDS: [(&str, Field); 10] = [
            (tags::EPISODE_NAME, Field::EpisodeName),
            (tags::EPISODE_DATE, Field::EpisodeDate),
            (tags::EPISODE_DESCRIPTION, Field::EpisodeDescription),
            (tags::PODCAST_NAME, Field::PodcastName),
            (tags::PODCAST_URL, Field::PodcastUrl),
            (tags::DOWNLOAD_ID, Field::DownloadId),
            (tags::LOCAL_FILE_PATH, Field::LocalFilePath),
            (tags::RESUME_AT, Field::ResumeAt),
            (tags::EPISODE_STATE, Field::EpisodeState),
            (tags::PLAYLIST_POSITION, Field::PlaylistPosition),
        ];

        FIELDS
            .iter()
            .find(|(name, _)| tag.eq_ignore_ascii_case(name.as_bytes()))
            .map(|(_, field)| *field)
    }
}

/// A record while its sub-fields are being read
struct PendingRecord {
    episode_url: Option<String>,
    meta: EpisodeMetadata,
    /// Set once a sub-field failed to parse; the record is then dropped
    broken: bool,
}

impl PendingRecord {
    fn apply(&mut self, field: Field, text: String) {
        let meta = &mut self.meta;
        let parsed = match field {
            Field::EpisodeName => {
                meta.episode_name = Some(text);
                true
            }
            Field::EpisodeDescription => {
                meta.episode_description = Some(text);
                true
            }
            Field::PodcastName => {
                meta.podcast_name = Some(text);
                true
            }
            Field::PodcastUrl => {
                meta.podcast_url = Some(text);
                true
            }
            Field::LocalFilePath => {
                meta.file_path = Some(PathBuf::from(text));
                true
            }
            Field::EpisodeDate => text
                .trim()
                .parse::<i64>()
                .ok()
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .map(|date| meta.episode_date = Some(date))
                .is_some(),
            Field::DownloadId => text
                .trim()
                .parse::<u64>()
                .map(|id| meta.download = DownloadTicket::from_journal_value(id))
                .is_ok(),
            Field::ResumeAt => text
                .trim()
                .parse::<u64>()
                .map(|at| meta.resume_at = Some(at))
                .is_ok(),
            Field::EpisodeState => text
                .trim()
                .parse::<bool>()
                .map(|old| meta.is_old = Some(old))
                .is_ok(),
            Field::PlaylistPosition => text
                .trim()
                .parse::<u32>()
                .map(|position| meta.playlist_position = Some(position))
                .is_ok(),
        };

        if !parsed {
            self.broken = true;
        }
    }
}

fn is_tag(name: &[u8], tag: &str) -> bool {
    name.eq_ignore_ascii_case(tag.as_bytes())
}

fn episode_url_attribute(start: &BytesStart<'_>) -> Option<String> {
    start
        .attributes()
        .flatten()
        .find(|attr| is_tag(attr.key.as_ref(), tags::EPISODE_URL))
        .and_then(|attr| attr.unescape_value().ok())
        .map(|value| value.into_owned())
}

/// Parse journal content into records
///
/// Broken records, including ones with text that is not valid UTF-8, are
/// skipped one by one. A structural XML error ends the parse, keeping
/// everything read up to that point.
pub fn parse_journal(content: &[u8]) -> MetadataMap {
    let mut reader = Reader::from_reader(content);
    let mut records = MetadataMap::new();

    let mut current: Option<PendingRecord> = None;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let name = start.local_name();
                if is_tag(name.as_ref(), tags::METADATA) {
                    current = Some(PendingRecord {
                        episode_url: episode_url_attribute(&start),
                        meta: EpisodeMetadata::default(),
                        broken: false,
                    });
                    field = None;
                } else if current.is_some() {
                    field = Field::from_tag(name.as_ref());
                    text.clear();
                }
            }
            Ok(Event::Text(content)) if field.is_some() => match content.unescape() {
                Ok(value) => text.push_str(&value),
                Err(e) => {
                    debug!("Undecodable text in metadata journal: {}", e);
                    if let Some(record) = current.as_mut() {
                        record.broken = true;
                    }
                }
            },
            Ok(Event::CData(content)) if field.is_some() => match std::str::from_utf8(&content) {
                Ok(value) => text.push_str(value),
                Err(e) => {
                    debug!("Undecodable CDATA in metadata journal: {}", e);
                    if let Some(record) = current.as_mut() {
                        record.broken = true;
                    }
                }
            },
            Ok(Event::End(end)) => {
                let name = end.local_name();
                if is_tag(name.as_ref(), tags::METADATA) {
                    match current.take() {
                        Some(PendingRecord {
                            episode_url: Some(url),
                            meta,
                            broken: false,
                        }) => {
                            records.insert(url, meta);
                        }
                        Some(record) => {
                            warn!(
                                "Skipping unreadable metadata record {}",
                                record.episode_url.as_deref().unwrap_or("<no episode url>")
                            );
                        }
                        None => {}
                    }
                } else if let Some(done) = field.take()
                    && let Some(record) = current.as_mut()
                {
                    record.apply(done, std::mem::take(&mut text));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(
                    "Metadata journal is corrupt at byte {}: {}",
                    reader.buffer_position(),
                    e
                );
                break;
            }
            _ => {}
        }
    }

    records
}

/// Load the journal and reconcile it against the download directory
///
/// Never fails: a missing journal means no records, a corrupt one yields
/// whatever could be recovered.
pub fn load_journal(path: &Path, download_dir: &Path) -> MetadataMap {
    let start = Instant::now();

    let mut records = match std::fs::read(path) {
        Ok(content) => parse_journal(&content),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No metadata journal at {}", path.display());
            MetadataMap::new()
        }
        Err(e) => {
            warn!("Failed to read metadata journal {}: {}", path.display(), e);
            MetadataMap::new()
        }
    };

    let report = reconcile(&mut records, download_dir);
    if report.backfilled > 0 || report.invalidated > 0 {
        info!(
            "Reconciled metadata: {} downloads found, {} downloads gone",
            report.backfilled, report.invalidated
        );
    }

    info!(
        "Read {} metadata records in {}ms",
        records.len(),
        start.elapsed().as_millis()
    );

    records
}

fn write_data(out: &mut impl Write, tag: &str, value: Option<&str>) -> std::io::Result<()> {
    match value {
        Some(value) => writeln!(
            out,
            "\t\t<{tag}>{}</{tag}>",
            html_escape::encode_text(value)
        ),
        None => Ok(()),
    }
}

fn write_record(out: &mut impl Write, id: &str, meta: &EpisodeMetadata) -> std::io::Result<()> {
    writeln!(
        out,
        "\t<{} {}=\"{}\">",
        tags::METADATA,
        tags::EPISODE_URL,
        html_escape::encode_double_quoted_attribute(id)
    )?;
    write_data(out, tags::EPISODE_NAME, meta.episode_name.as_deref())?;
    write_data(
        out,
        tags::EPISODE_DATE,
        meta.episode_date
            .map(|date| date.timestamp_millis().to_string())
            .as_deref(),
    )?;
    write_data(
        out,
        tags::EPISODE_DESCRIPTION,
        meta.episode_description.as_deref(),
    )?;
    write_data(out, tags::PODCAST_NAME, meta.podcast_name.as_deref())?;
    write_data(out, tags::PODCAST_URL, meta.podcast_url.as_deref())?;
    write_data(
        out,
        tags::DOWNLOAD_ID,
        meta.download
            .as_journal_value()
            .map(|id| id.to_string())
            .as_deref(),
    )?;
    write_data(
        out,
        tags::LOCAL_FILE_PATH,
        meta.file_path
            .as_deref()
            .map(|path| path.to_string_lossy())
            .as_deref(),
    )?;
    write_data(
        out,
        tags::RESUME_AT,
        meta.resume_at.map(|at| at.to_string()).as_deref(),
    )?;
    write_data(
        out,
        tags::EPISODE_STATE,
        meta.is_old.map(|old| old.to_string()).as_deref(),
    )?;
    write_data(
        out,
        tags::PLAYLIST_POSITION,
        meta.playlist_position
            .map(|position| position.to_string())
            .as_deref(),
    )?;
    writeln!(out, "\t</{}>", tags::METADATA)
}

fn write_journal(
    out: &mut impl Write,
    records: &[(&String, &EpisodeMetadata)],
) -> std::io::Result<()> {
    writeln!(out, "<?xml version=\"1.0\" encoding=\"{}\"?>", FILE_ENCODING)?;
    writeln!(
        out,
        "<{} {}=\"{}\">",
        tags::ROOT,
        tags::DATE_MODIFIED,
        Utc::now().timestamp_millis()
    )?;
    for (id, meta) in records {
        write_record(out, id, meta)?;
    }
    writeln!(out, "</{}>", tags::ROOT)?;
    out.flush()
}

/// Persist all records that carry data, replacing the journal atomically
///
/// The journal is written to a `.partial` sibling, synced and renamed over the
/// old file. On any error the old journal stays untouched. Returns the number
/// of records written.
pub fn save_journal(path: &Path, records: &MetadataMap) -> Result<usize, JournalError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| JournalError::CreateDirectoryFailed {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let mut kept: Vec<_> = records.iter().filter(|(_, meta)| meta.has_data()).collect();
    kept.sort_by(|a, b| a.0.cmp(b.0));

    let partial = partial_path(path);
    let written = File::create(&partial).and_then(|file| {
        let mut out = BufWriter::new(file);
        write_journal(&mut out, &kept)?;
        out.into_inner().map_err(|e| e.into_error())?.sync_all()
    });

    if let Err(e) = written {
        let _ = std::fs::remove_file(&partial);
        return Err(JournalError::WriteFailed {
            path: partial,
            source: e,
        });
    }

    std::fs::rename(&partial, path).map_err(|e| {
        let _ = std::fs::remove_file(&partial);
        JournalError::CommitFailed {
            path: path.to_path_buf(),
            source: e,
        }
    })?;

    debug!("Stored {} metadata records to {}", kept.len(), path.display());
    Ok(kept.len())
}
