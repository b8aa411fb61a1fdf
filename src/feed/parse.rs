// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

use crate::error::FeedError;

/// The podcast an episode belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Podcast {
    pub name: String,
    /// Feed location, if known
    pub url: Option<Url>,
}

/// A single podcast episode, identified by its media URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Episode {
    pub podcast: Podcast,
    pub name: String,
    pub media_url: Url,
    pub pub_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

impl Episode {
    /// Stable identifier used as the key into the metadata map
    pub fn id(&self) -> &str {
        self.media_url.as_str()
    }
}

/// A parsed feed: the podcast and its episodes, newest first
#[derive(Debug, Clone)]
pub struct Feed {
    pub podcast: Podcast,
    pub episodes: Vec<Episode>,
}

/// Parse RSS feed XML bytes into a podcast and its episodes
///
/// Items without an enclosure are skipped.
pub fn parse_feed(xml_bytes: &[u8], feed_url: Url) -> Result<Feed, FeedError> {
    let channel = rss::Channel::read_from(xml_bytes)?;

    let podcast = Podcast {
        name: channel.title().trim().to_string(),
        url: Some(feed_url),
    };

    let mut episodes: Vec<Episode> = channel
        .items()
        .iter()
        .filter_map(|item| parse_episode(item, &podcast).ok())
        .collect();

    episodes.sort_by(|a, b| b.pub_date.cmp(&a.pub_date));

    Ok(Feed { podcast, episodes })
}

fn parse_episode(item: &rss::Item, podcast: &Podcast) -> Result<Episode, FeedError> {
    let name = item
        .title()
        .map(|t| t.trim().to_string())
        .unwrap_or_else(|| "Untitled Episode".to_string());

    let enclosure = item
        .enclosure()
        .ok_or_else(|| FeedError::MissingEnclosure { title: name.clone() })?;

    let pub_date = item
        .pub_date()
        .or_else(|| item.dublin_core_ext().and_then(|dc| dc.dates().first().map(String::as_str)))
        .and_then(parse_pub_date);

    Ok(Episode {
        podcast: podcast.clone(),
        name,
        media_url: Url::parse(enclosure.url())?,
        pub_date,
        description: item.description().map(String::from),
    })
}

fn parse_pub_date(date_str: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(date_str.trim())
        .or_else(|_| DateTime::parse_from_rfc3339(date_str.trim()))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title> Test Podcast </title>
    <description>A test podcast</description>
    <link>https://example.com</link>
    <item>
      <title>Older</title>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <enclosure url="https://example.com/ep1.mp3" type="audio/mpeg"/>
    </item>
    <item>
      <title>Newer</title>
      <description>Second episode</description>
      <pubDate>Mon, 08 Jan 2024 12:00:00 +0000</pubDate>
      <enclosure url="https://example.com/ep2.mp3" type="audio/mpeg"/>
    </item>
    <item>
      <title>No Audio</title>
    </item>
  </channel>
</rss>"#;

    fn feed_url() -> Url {
        Url::parse("https://example.com/feed.xml").unwrap()
    }

    #[test]
    fn parse_feed_extracts_podcast() {
        let feed = parse_feed(SAMPLE_FEED.as_bytes(), feed_url()).unwrap();

        assert_eq!(feed.podcast.name, "Test Podcast");
        assert_eq!(feed.podcast.url, Some(feed_url()));
    }

    #[test]
    fn parse_feed_orders_newest_first_and_skips_items_without_enclosure() {
        let feed = parse_feed(SAMPLE_FEED.as_bytes(), feed_url()).unwrap();

        assert_eq!(feed.episodes.len(), 2);
        assert_eq!(feed.episodes[0].name, "Newer");
        assert_eq!(feed.episodes[0].id(), "https://example.com/ep2.mp3");
        assert_eq!(
            feed.episodes[0].description,
            Some("Second episode".to_string())
        );
        assert_eq!(feed.episodes[1].podcast.name, "Test Podcast");
    }

    #[test]
    fn parse_pub_date_accepts_rfc3339() {
        let date = parse_pub_date("2024-01-15T12:00:00+00:00").unwrap();
        assert_eq!(date.timestamp_millis(), 1_705_320_000_000);
    }

    #[test]
    fn parse_pub_date_rejects_garbage() {
        assert!(parse_pub_date("sometime last week").is_none());
    }
}
