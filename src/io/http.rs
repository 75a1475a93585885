//! Chunked archive downloads for streamed extraction.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use reqwest::Client;

use crate::error::{Error, Result};

/// Returns true for `http://` and `https://` sources.
pub fn is_http_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Start a GET request and expose the body as a chunk stream.
///
/// Chunks arrive as the server sends them; nothing is buffered beyond what
/// the HTTP client holds for a single read.
pub async fn download(url: &str) -> Result<impl Stream<Item = io::Result<Bytes>> + use<>> {
    let client = Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .build()
        .map_err(io::Error::other)?;

    let resp = client.get(url).send().await.map_err(io::Error::other)?;
    if !resp.status().is_success() {
        return Err(Error::Io(io::Error::other(format!(
            "HTTP request failed with status: {}",
            resp.status()
        ))));
    }

    if let Some(len) = resp.content_length() {
        tracing::debug!(url, bytes = len, "downloading archive");
    }

    Ok(resp.bytes_stream().map_err(io::Error::other))
}
