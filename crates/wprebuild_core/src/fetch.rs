use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::archive::{ExtractError, Extraction, extract_zip};
use crate::config::HttpSettings;
use crate::error::PackageError;

/// Retrieves the raw bytes behind a package URL.
pub trait PackageTransport {
    /// Stream the body of `url` into `sink` and return the number of bytes written.
    /// Anything but HTTP 200 is `PackageError::NotFound`.
    fn download(&self, url: &str, sink: &mut dyn Write) -> Result<u64, PackageError>;
}

pub struct HttpTransport {
    client: Client,
    user_agent: String,
    retries: usize,
    retry_delay_ms: u64,
}

impl HttpTransport {
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        let total = (settings.timeout_ms > 0).then(|| Duration::from_millis(settings.timeout_ms));
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(settings.connect_timeout_ms))
            .timeout(total)
            .build()
            .context("failed to build package HTTP client")?;
        Ok(Self {
            client,
            user_agent: settings.user_agent.clone(),
            retries: settings.retries,
            retry_delay_ms: settings.retry_delay_ms,
        })
    }

    fn wait_before_retry(&self, attempt: usize) {
        sleep(Duration::from_millis(
            self.retry_delay_ms.saturating_mul(attempt as u64 + 1),
        ));
    }
}

impl PackageTransport for HttpTransport {
    fn download(&self, url: &str, sink: &mut dyn Write) -> Result<u64, PackageError> {
        let mut attempt = 0;
        loop {
            debug!(url, attempt, "requesting package");
            let response = self
                .client
                .get(url)
                .header(USER_AGENT, self.user_agent.as_str())
                .send();

            match response {
                Ok(mut response) => {
                    let status = response.status();
                    if status == StatusCode::OK {
                        return io::copy(&mut response, sink)
                            .map_err(|source| PackageError::io(url, source));
                    }
                    if attempt < self.retries && is_retryable_status(status) {
                        warn!(url, %status, "retrying package request");
                        self.wait_before_retry(attempt);
                        attempt += 1;
                        continue;
                    }
                    return Err(PackageError::NotFound {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                Err(error) => {
                    if attempt < self.retries && is_retryable_error(&error) {
                        warn!(url, %error, "retrying package request");
                        self.wait_before_retry(attempt);
                        attempt += 1;
                        continue;
                    }
                    return Err(PackageError::Network {
                        url: url.to_string(),
                        source: error,
                    });
                }
            }
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}

/// Downloads a package into a scoped temporary file and unpacks it.
pub struct ArchiveFetcher<T> {
    transport: T,
    temp_dir: Option<PathBuf>,
}

impl<T: PackageTransport> ArchiveFetcher<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            temp_dir: None,
        }
    }

    /// Keep downloads in `dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The temporary download is removed when this returns, whatever the outcome.
    pub fn fetch_and_extract(
        &self,
        url: &str,
        destination: &Path,
        extraction: Extraction,
    ) -> Result<(), PackageError> {
        let mut download = match &self.temp_dir {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .map_err(|source| PackageError::io(url, source))?;

        let bytes = self.transport.download(url, download.as_file_mut())?;
        download
            .as_file_mut()
            .flush()
            .map_err(|source| PackageError::io(url, source))?;
        debug!(url, bytes, "package downloaded");

        extract_zip(download.path(), destination, extraction).map_err(|error| match error {
            ExtractError::Invalid(reason) => PackageError::format(url, reason),
            ExtractError::Io(source) => PackageError::io(url, source),
        })
    }
}
