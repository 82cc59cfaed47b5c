// src/fetch/mod.rs

use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;
use tokio::{fs, time::sleep};
use tracing::{debug, error, warn};
use url::Url;

use crate::config::FetchConfig;

/// Reads source documents, either over HTTP or from local files.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    max_retries: u32,
    initial_backoff_ms: u64,
}

impl Fetcher {
    pub fn new(cfg: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(cfg.user_agent.as_str())
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            max_retries: cfg.max_retries,
            initial_backoff_ms: cfg.backoff_ms,
        })
    }

    /// Body of `location`: fetched when it is an http(s) URL, read from disk otherwise.
    pub async fn read_text(&self, location: &str) -> Result<String> {
        match Url::parse(location) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                self.get_text_with_retry(&url).await
            }
            _ => {
                debug!(path = %location, "reading local source");
                fs::read_to_string(location)
                    .await
                    .with_context(|| format!("reading {}", location))
            }
        }
    }

    async fn get_text_core(&self, url: &Url) -> Result<String> {
        debug!("Fetching text from {}", url);
        self.client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?
            .error_for_status()
            .with_context(|| format!("Non-success status {}", url))?
            .text()
            .await
            .with_context(|| format!("Reading text from {}", url))
    }

    async fn get_text_with_retry(&self, url: &Url) -> Result<String> {
        let mut attempts = 0;
        loop {
            match self.get_text_core(url).await {
                Ok(t) => return Ok(t),
                Err(e) if attempts < self.max_retries => {
                    attempts += 1;
                    let backoff = self.initial_backoff_ms * 2u64.pow(attempts - 1);
                    warn!(%url, attempt = attempts, delay_ms = backoff, error = %e, "Retrying");
                    sleep(Duration::from_millis(backoff)).await;
                }
                Err(e) => {
                    error!(%url, error = %e, "Exhausted retries");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn local_paths_are_read_from_disk() -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new()?;
        write!(tmp, "<html></html>")?;
        let fetcher = Fetcher::new(&FetchConfig::default())?;
        let path = tmp.path().to_string_lossy().to_string();
        assert_eq!(fetcher.read_text(&path).await?, "<html></html>");
        Ok(())
    }

    #[tokio::test]
    async fn missing_local_file_is_an_error() -> Result<()> {
        let fetcher = Fetcher::new(&FetchConfig::default())?;
        let err = fetcher
            .read_text("/definitely/not/here.html")
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("/definitely/not/here.html"));
        Ok(())
    }
}
