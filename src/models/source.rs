use crate::error::{Error, Result};
use reqwest::blocking::Client;
use std::io::Read;
use std::time::Duration;

/// An open artifact download.
pub struct Download {
    pub total: Option<u64>,
    pub body: Box<dyn Read>,
}

/// Where artifact bytes come from.
pub trait ArtifactSource {
    fn open(&self, url: &str) -> Result<Download>;
}

pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("classranker/", env!("CARGO_PKG_VERSION")))
            // Large artifacts; no overall deadline
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| Error::network("client", e))?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl ArtifactSource for HttpSource {
    fn open(&self, url: &str) -> Result<Download> {
        let response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::network(url, e))?;

        Ok(Download {
            total: response.content_length(),
            body: Box::new(response),
        })
    }
}
