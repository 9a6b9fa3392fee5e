//! HTTP access for the audio asset.

use std::io::Read;
use std::sync::OnceLock;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Something that can turn a URL into the bytes behind it.
pub trait Fetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("GET {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("GET {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("Reading body of {url} failed: {source}")]
    Body {
        url: String,
        source: std::io::Error,
    },
    #[error("Body of {url} exceeded {max_bytes} bytes")]
    TooLarge { url: String, max_bytes: usize },
}

/// Join a possibly relative asset path against the configured base URL.
pub fn resolve_url(base: &str, path: &str) -> Result<String, FetchError> {
    if let Ok(absolute) = Url::parse(path) {
        return Ok(absolute.into());
    }
    let base_url = Url::parse(base).map_err(|source| FetchError::InvalidUrl {
        url: base.to_owned(),
        source,
    })?;
    base_url
        .join(path)
        .map(String::from)
        .map_err(|source| FetchError::InvalidUrl {
            url: path.to_owned(),
            source,
        })
}

fn agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build()
    })
}

/// Blocking fetcher that reads the whole body into memory.
pub struct HttpFetcher {
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        tracing::info!(%url, "fetching audio");
        let response = agent().get(url).call().map_err(|err| match err {
            ureq::Error::Status(status, _) => FetchError::Status {
                url: url.to_owned(),
                status,
            },
            ureq::Error::Transport(transport) => FetchError::Transport {
                url: url.to_owned(),
                message: transport.to_string(),
            },
        })?;
        // ureq follows redirects and only hands back 2xx here, but a 1xx/3xx
        // final status still means there is no body worth caching
        let status = response.status();
        if !(200..300).contains(&status) {
            return Err(FetchError::Status {
                url: url.to_owned(),
                status,
            });
        }
        read_limited(response.into_reader(), url, self.max_bytes)
    }
}

fn read_limited(reader: impl Read, url: &str, max_bytes: usize) -> Result<Vec<u8>, FetchError> {
    let mut bytes = Vec::new();
    reader
        .take(max_bytes as u64 + 1)
        .read_to_end(&mut bytes)
        .map_err(|source| FetchError::Body {
            url: url.to_owned(),
            source,
        })?;
    if bytes.len() > max_bytes {
        return Err(FetchError::TooLarge {
            url: url.to_owned(),
            max_bytes,
        });
    }
    tracing::debug!(%url, len = bytes.len(), "fetched body");
    Ok(bytes)
}
