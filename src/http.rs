// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};

/// A streaming response body
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Response to a media request: status, announced length and body stream
pub struct MediaResponse {
    pub status: u16,
    /// Content-Length header value, used to compute percent progress
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

/// Network access used for feeds and episode media
#[async_trait]
pub trait MediaClient: Send + Sync {
    /// Fetch a small resource (a feed) in one piece
    async fn fetch(&self, url: &str) -> Result<Bytes, reqwest::Error>;

    /// Open a streaming response for a potentially large media file
    async fn open_stream(&self, url: &str) -> Result<MediaResponse, reqwest::Error>;
}

/// `MediaClient` backed by reqwest
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MediaClient for ReqwestClient {
    async fn fetch(&self, url: &str) -> Result<Bytes, reqwest::Error> {
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await
    }

    async fn open_stream(&self, url: &str) -> Result<MediaResponse, reqwest::Error> {
        let response = self.client.get(url).send().await?;

        Ok(MediaResponse {
            status: response.status().as_u16(),
            content_length: response.content_length(),
            body: response.bytes_stream().boxed(),
        })
    }
}
