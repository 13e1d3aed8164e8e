//! HTTP fetching with per-entry request headers.
//!
//! Header values are environment-expanded when the request is built, so a
//! token exported after the manifest was written is still picked up.

use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use binman_schema::manifest::split_header;
use futures::StreamExt;
use regex::{Captures, Regex};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode, Url};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::Reporter;

/// Errors from resolving, requesting or saving a download.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The resolved URL is not an absolute http(s) URL.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A header line has no `": "` separator.
    #[error("malformed header '{0}': expected 'Name: value'")]
    MalformedHeader(String),

    /// A header name or expanded value is not legal HTTP.
    #[error("invalid header '{name}': {reason}")]
    InvalidHeader {
        /// Header name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The server answered with a non-2xx status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Requested URL.
        url: String,
        /// Response status.
        status: StatusCode,
    },

    /// The request could not be completed.
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Writing the downloaded body failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

static ENV_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("environment reference pattern is valid")
});

/// Expand `${VAR}` and `$VAR` references using `lookup`. Unset variables
/// expand to the empty string.
pub fn expand_env_with(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    ENV_REF
        .replace_all(value, |caps: &Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map_or("", |m| m.as_str());
            lookup(name).unwrap_or_default()
        })
        .into_owned()
}

/// Build a header map from `"Name: value"` lines, expanding each value with
/// `lookup`.
///
/// # Errors
///
/// Returns [`FetchError::MalformedHeader`] for a line without `": "` and
/// [`FetchError::InvalidHeader`] when the name or expanded value is not a
/// legal HTTP header.
pub fn build_headers(
    lines: &[String],
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<HeaderMap, FetchError> {
    let mut headers = HeaderMap::new();
    for line in lines {
        let (name, value) =
            split_header(line).ok_or_else(|| FetchError::MalformedHeader(line.clone()))?;

        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| FetchError::InvalidHeader {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        // The expanded value may hold a secret; keep it out of the error.
        let header_value = HeaderValue::from_str(&expand_env_with(value, &lookup)).map_err(
            |e| FetchError::InvalidHeader {
                name: name.to_string(),
                reason: e.to_string(),
            },
        )?;

        headers.append(header_name, header_value);
    }
    Ok(headers)
}

/// Parse `url`, accepting only absolute `http` and `https` URLs.
///
/// # Errors
///
/// Returns [`FetchError::InvalidUrl`] otherwise.
pub fn parse_url(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(FetchError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

/// Request for a download operation
#[derive(Debug)]
pub struct DownloadRequest<'a> {
    /// Binary name, for progress reporting.
    pub name: &'a str,
    /// Version, for progress reporting.
    pub version: &'a str,
    /// Resolved URL.
    pub url: &'a str,
    /// Raw `"Name: value"` header lines.
    pub headers: &'a [String],
    /// File the body is written to.
    pub dest: &'a Path,
}

/// Shared HTTP client for one run.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Build a fetcher with an optional per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Transport`] if the HTTP client cannot be built.
    pub fn new(timeout: Option<Duration>) -> Result<Self, FetchError> {
        let mut builder = Client::builder().user_agent(crate::USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Issue a GET for `url` and check the status.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Status`] for a non-2xx response and
    /// [`FetchError::Transport`] when the request itself fails.
    pub async fn fetch(&self, url: &str, headers: &[String]) -> Result<Response, FetchError> {
        let parsed = parse_url(url)?;
        let headers = build_headers(headers, |name| std::env::var(name).ok())?;

        let response = self.client.get(parsed).headers(headers).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }
        Ok(response)
    }

    /// Stream the body of `req.url` into `req.dest`, returning the number of
    /// bytes written.
    ///
    /// The response is owned by this call and released on every exit path.
    ///
    /// # Errors
    ///
    /// Any [`FetchError`] from [`fetch`](Self::fetch), or an IO error while
    /// writing the destination file.
    pub async fn download(
        &self,
        req: DownloadRequest<'_>,
        reporter: &dyn Reporter,
    ) -> Result<u64, FetchError> {
        let response = self.fetch(req.url, req.headers).await?;
        let total_size = response.content_length();

        reporter.downloading(req.name, req.version, 0, total_size);

        let mut file = File::create(req.dest).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            reporter.downloading(req.name, req.version, downloaded, total_size);
        }

        file.flush().await?;
        debug!(url = req.url, dest = %req.dest.display(), bytes = downloaded, "download complete");
        Ok(downloaded)
    }
}
