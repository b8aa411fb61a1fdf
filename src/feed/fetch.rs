// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use url::Url;

use crate::error::FeedError;
use crate::http::MediaClient;

use super::parse::{Feed, parse_feed};

/// Fetch and parse a podcast feed from a URL or a local file path
pub async fn load_feed<C: MediaClient>(client: &C, source: &str) -> Result<Feed, FeedError> {
    if is_url(source) {
        let feed_url = Url::parse(source)?;
        let bytes = client
            .fetch(source)
            .await
            .map_err(|e| FeedError::FetchFailed {
                url: source.to_string(),
                source: e,
            })?;
        parse_feed(&bytes, feed_url)
    } else {
        let path = Path::new(source);
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| FeedError::FileReadFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
        parse_feed(&bytes, file_path_to_url(path)?)
    }
}

/// Construct a file:// URL for a local feed file
fn file_path_to_url(path: &Path) -> Result<Url, FeedError> {
    let absolute = std::path::absolute(path).map_err(|e| FeedError::FileReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(Url::from_file_path(&absolute)
        .or_else(|_| Url::parse(&format!("file://{}", absolute.display())))?)
}

/// Determine if a string is a URL or a file path
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}
