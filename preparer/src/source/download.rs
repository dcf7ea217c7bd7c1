//! Blocking HTTP retrieval of source archives and hash manifests.
//!
//! Downloads land in a temporary file beside the destination and are renamed
//! into place once complete. Retries are left to the caller.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

/// Connection timeout for upstream downloads. The body transfer is unbounded.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches a URL into a file.
#[cfg_attr(test, mockall::automock)]
pub trait SourceDownloader {
    /// Fetch `url` and write the body to `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the file cannot be written.
    fn download(&self, url: &str, dest: &Path) -> Result<(), DownloadError>;
}

/// Errors arising from download operations.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// HTTP request failed.
    #[error("download failed for {url}: {reason}")]
    HttpError {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The requested file was not found (HTTP 404).
    #[error("not found: {url}")]
    NotFound {
        /// The URL that returned 404.
        url: String,
    },

    /// I/O error writing the downloaded file.
    #[error("I/O error writing {path}: {source}")]
    Io {
        /// Destination being written.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// HTTP downloader using `ureq`.
pub struct HttpDownloader;

impl SourceDownloader for HttpDownloader {
    fn download(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let io_error = |source| DownloadError::Io {
            path: dest.display().to_string(),
            source,
        };
        let response = http_agent()
            .get(url)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;

        let parent = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staging = tempfile::NamedTempFile::new_in(parent).map_err(io_error)?;
        std::io::copy(&mut response.into_body().as_reader(), staging.as_file_mut())
            .map_err(io_error)?;
        staging
            .persist(dest)
            .map_err(|e| io_error(e.error))?;
        Ok(())
    }
}

/// Shared `ureq` agent with connection timeout configuration.
fn http_agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        let config = ureq::Agent::config_builder()
            .timeout_connect(Some(CONNECT_TIMEOUT))
            .build();
        ureq::Agent::new_with_config(config)
    })
}

/// Map a ureq error to a [`DownloadError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> DownloadError {
    match err {
        ureq::Error::StatusCode(404) => DownloadError::NotFound {
            url: url.to_owned(),
        },
        other => DownloadError::HttpError {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}
