// src/source/http.rs

//! HTTP client for upstream sources
//!
//! Wraps a blocking reqwest client with bounded retries. Connection errors,
//! timeouts and 5xx/429 responses are retried with a linearly growing delay;
//! any other non-success status fails immediately.

use crate::config::FetchSection;
use crate::error::{Error, Result, Stage};
use crate::kitchen::runner::Deadline;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const STREAM_BUFFER_SIZE: usize = 8192;

/// Outcome of a single attempt
enum Attempt<T> {
    Done(T),
    Retry(String),
}

pub struct HttpClient {
    client: Client,
    retries: u32,
    retry_delay: Duration,
    request_timeout: Duration,
}

impl HttpClient {
    pub fn new(config: &FetchSection) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::SourceFetch(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retries: config.retries.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            request_timeout: Duration::from_secs(config.http_timeout_secs),
        })
    }

    /// Fetch a small text document (API responses, directory listings)
    pub fn get_text(&self, url: &str, deadline: &Deadline) -> Result<String> {
        self.with_retries(url, deadline, |response| match response.text() {
            Ok(body) => Ok(Attempt::Done(body)),
            Err(e) => Ok(Attempt::Retry(format!("failed to read body: {}", e))),
        })
    }

    /// Stream a URL into `dest`, returning the byte count
    pub fn download(&self, url: &str, dest: &Path, deadline: &Deadline) -> Result<u64> {
        info!("Downloading {}", url);
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.with_retries(url, deadline, |mut response| {
            let mut file = File::create(dest)?;
            let progress = progress_bar(response.content_length(), &name);
            let mut buffer = [0u8; STREAM_BUFFER_SIZE];
            let mut written = 0u64;
            loop {
                deadline.check(Stage::Fetch)?;
                let n = match response.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) => {
                        progress.abandon();
                        return Ok(Attempt::Retry(format!("transfer interrupted: {}", e)));
                    }
                };
                file.write_all(&buffer[..n])?;
                written += n as u64;
                progress.set_position(written);
            }
            file.sync_all()?;
            progress.finish_and_clear();
            debug!("Downloaded {} bytes from {}", written, url);
            Ok(Attempt::Done(written))
        })
    }

    fn with_retries<T>(
        &self,
        url: &str,
        deadline: &Deadline,
        mut on_success: impl FnMut(Response) -> Result<Attempt<T>>,
    ) -> Result<T> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            deadline.check(Stage::Fetch)?;
            let timeout = deadline
                .remaining()
                .map_or(self.request_timeout, |left| left.min(self.request_timeout));

            let failure = match self.client.get(url).timeout(timeout).send() {
                Ok(response) if response.status().is_success() => match on_success(response)? {
                    Attempt::Done(value) => return Ok(value),
                    Attempt::Retry(reason) => reason,
                },
                Ok(response) if is_transient(response.status()) => {
                    format!("HTTP {}", response.status())
                }
                Ok(response) => {
                    return Err(Error::SourceFetch(format!(
                        "HTTP {} from {}",
                        response.status(),
                        url
                    )));
                }
                Err(e) => e.to_string(),
            };

            if attempt >= self.retries {
                return Err(Error::SourceFetch(format!(
                    "{} failed after {} attempts: {}",
                    url, attempt, failure
                )));
            }
            warn!(
                "Fetch attempt {} for {} failed: {}, retrying...",
                attempt, url, failure
            );
            std::thread::sleep(self.retry_delay * attempt);
        }
    }
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn progress_bar(length: Option<u64>, name: &str) -> ProgressBar {
    let pb = match length {
        Some(len) => ProgressBar::new(len),
        None => ProgressBar::new_spinner(),
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message(name.to_string());
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient(StatusCode::BAD_GATEWAY));
        assert!(is_transient(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient(StatusCode::NOT_FOUND));
        assert!(!is_transient(StatusCode::FORBIDDEN));
    }

    #[test]
    fn test_client_builds_from_config() {
        let config = FetchSection {
            retries: 0,
            ..FetchSection::default()
        };
        let client = HttpClient::new(&config).unwrap();
        assert_eq!(client.retries, 1);
    }
}
