// Remote asset sources

use async_trait::async_trait;
use futures_util::stream::StreamExt;
use std::path::Path;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server answered {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Somewhere assets can be downloaded from.
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Write the asset `file_name` to `dest`, returning the number of bytes written.
    async fn fetch(&self, file_name: &str, dest: &Path) -> Result<u64, FetchError>;

    fn describe(&self, file_name: &str) -> String;
}

/// Plain HTTP root, e.g. a map redirect server.
pub struct HttpSource {
    client: reqwest::Client,
    root: String,
}

impl HttpSource {
    pub fn new(root: &str) -> Self {
        Self::with_client(root, reqwest::Client::new())
    }

    pub fn with_client(root: &str, client: reqwest::Client) -> Self {
        Self {
            client,
            root: root.trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, file_name: &str) -> String {
        format!("{}/{}", self.root, file_name)
    }
}

#[async_trait]
impl AssetSource for HttpSource {
    async fn fetch(&self, file_name: &str, dest: &Path) -> Result<u64, FetchError> {
        let url = self.url_for(file_name);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }

    fn describe(&self, file_name: &str) -> String {
        self.url_for(file_name)
    }
}
