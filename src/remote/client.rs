//! # Wire Client
//!
//! The only code that speaks HTTP. It returns raw bodies; deciding whether a
//! body is acceptable is the validators' job, and deciding whether to try
//! again is the retry executor's.
//!
//! Transport policy: plain `http://` is allowed only for loopback, private
//! network and `.local` hosts. Anything else must be `https://`, and
//! certificate validation is left at reqwest's defaults.

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{StatusCode, Url};
use serde::Serialize;

use super::types::{MediaKind, RawResponse};

// ============================================================================
// Errors
// ============================================================================

/// Why a single attempt failed before producing a usable body.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// DNS, refused, reset, TLS failure. Retryable.
    Connect(String),
    /// The request ran past its deadline. Retryable.
    Timeout,
    /// The server answered with an error status.
    /// Retryable for 5xx, 408 and 429 only.
    Status { status: u16, message: String },
    /// The download crossed the ceiling. Never retried.
    TooLarge { limit: usize, received: usize },
    /// Plain HTTP to a public host. Never retried.
    Insecure(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Connect(_) | TransportError::Timeout => true,
            TransportError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            TransportError::TooLarge { .. } | TransportError::Insecure(_) => false,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Connect(msg) => write!(f, "connection error: {msg}"),
            TransportError::Timeout => write!(f, "request timed out"),
            TransportError::Status { status, message } => {
                write!(f, "HTTP {status}: {message}")
            }
            TransportError::TooLarge { limit, received } => {
                write!(f, "payload exceeded {limit} bytes (received {received})")
            }
            TransportError::Insecure(url) => write!(f, "refusing plain HTTP to {url}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if let Some(status) = e.status() {
            TransportError::Status {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            TransportError::Connect(e.to_string())
        }
    }
}

/// Construction-time failures. These are fatal configuration errors.
#[derive(Debug)]
pub enum ClientError {
    InvalidUrl(String),
    InsecureTransport(String),
    Build(reqwest::Error),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::InvalidUrl(msg) => write!(f, "invalid server URL: {msg}"),
            ClientError::InsecureTransport(host) => write!(
                f,
                "plain HTTP is only allowed for local hosts; use https:// for {host}"
            ),
            ClientError::Build(e) => write!(f, "failed to build HTTP client: {e}"),
        }
    }
}

impl std::error::Error for ClientError {}

// ============================================================================
// Transport policy
// ============================================================================

fn is_local_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}

/// True when `host` names this machine or the local network.
pub fn is_local_host(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = host.parse::<IpAddr>() {
        return is_local_ip(ip);
    }
    let host = host.to_ascii_lowercase();
    host == "localhost" || host.ends_with(".localhost") || host.ends_with(".local")
}

/// Ok if the URL is https, or plain http to a local destination.
pub fn check_transport(url: &Url) -> Result<(), TransportError> {
    match url.scheme() {
        "https" => Ok(()),
        "http" if url.host_str().is_some_and(is_local_host) => Ok(()),
        _ => Err(TransportError::Insecure(url.to_string())),
    }
}

// ============================================================================
// Client trait
// ============================================================================

/// The remote operations the core depends on. All of them return unvalidated
/// bodies.
#[async_trait]
pub trait WireClient: Send + Sync {
    async fn check_status(&self) -> Result<RawResponse, TransportError>;

    async fn search(
        &self,
        query: &str,
        kind: MediaKind,
        page: u32,
    ) -> Result<RawResponse, TransportError>;

    async fn browse(&self, kind: MediaKind, page: u32) -> Result<RawResponse, TransportError>;

    async fn detail(&self, id: u64, kind: MediaKind) -> Result<RawResponse, TransportError>;

    async fn submit_request(&self, id: u64, kind: MediaKind)
    -> Result<RawResponse, TransportError>;

    /// Downloads `url`, aborting as soon as more than `limit` bytes arrive.
    async fn fetch_image(&self, url: &str, limit: usize) -> Result<RawResponse, TransportError>;
}

// ============================================================================
// reqwest implementation
// ============================================================================

#[derive(Serialize, Debug)]
struct MediaRequestBody {
    #[serde(rename = "mediaId")]
    media_id: u64,
    #[serde(rename = "mediaType")]
    media_type: MediaKind,
}

/// Talks to a Jellyseerr-compatible server at `{base_url}/api/v1`.
pub struct SeerrClient {
    api_url: Url,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl SeerrClient {
    /// Builds the client, refusing plain HTTP to non-local hosts.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, ClientError> {
        let trimmed = base_url.trim_end_matches('/');
        let api_url = Url::parse(&format!("{trimmed}/api/v1/"))
            .map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        let host = api_url
            .host_str()
            .ok_or_else(|| ClientError::InvalidUrl(format!("{base_url}: no host")))?
            .to_string();
        if check_transport(&api_url).is_err() {
            return Err(ClientError::InsecureTransport(host));
        }
        if api_url.scheme() == "http" {
            warn!("Using plain HTTP to local host {} - API key is sent in cleartext", host);
        }

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .pool_max_idle_per_host(20)
            .user_agent(concat!("marquee/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ClientError::Build)?;

        let api_key = api_key.filter(|k| !k.is_empty());
        match &api_key {
            Some(key) => info!("API key configured (length: {})", key.len()),
            None => info!("No API key configured"),
        }

        Ok(Self {
            api_url,
            api_key,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.api_url
            .join(path)
            .map_err(|e| TransportError::Connect(format!("bad endpoint {path}: {e}")))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("X-Api-Key", key),
            None => builder,
        }
    }

    /// Sends a request, maps error statuses, and reads the whole body.
    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<RawResponse, TransportError> {
        let response = self.authorize(builder).send().await?;
        let status = response.status();
        debug!("{} -> {}", response.url(), status);

        if !status.is_success() {
            return Err(status_error(status, response).await);
        }

        let body = response.bytes().await?;
        Ok(RawResponse {
            status: status.as_u16(),
            body: body.to_vec(),
        })
    }
}

async fn status_error(status: StatusCode, response: reqwest::Response) -> TransportError {
    if status == StatusCode::UNAUTHORIZED {
        warn!("Authentication failed - check the API key");
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    TransportError::Status {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl WireClient for SeerrClient {
    async fn check_status(&self) -> Result<RawResponse, TransportError> {
        let url = self.endpoint("status")?;
        self.send(self.client.get(url)).await
    }

    async fn search(
        &self,
        query: &str,
        kind: MediaKind,
        page: u32,
    ) -> Result<RawResponse, TransportError> {
        debug!("search {:?} ({}) page {}", query, kind, page);
        let url = self.endpoint("search")?;
        let page = page.to_string();
        self.send(self.client.get(url).query(&[("query", query), ("page", page.as_str())]))
            .await
    }

    async fn browse(&self, kind: MediaKind, page: u32) -> Result<RawResponse, TransportError> {
        let path = match kind {
            MediaKind::Movie => "discover/movies",
            MediaKind::Tv => "discover/tv",
        };
        let url = self.endpoint(path)?;
        let page = page.to_string();
        self.send(
            self.client
                .get(url)
                .query(&[("page", page.as_str()), ("sortBy", "popularity.desc")]),
        )
        .await
    }

    async fn detail(&self, id: u64, kind: MediaKind) -> Result<RawResponse, TransportError> {
        let url = self.endpoint(&format!("{}/{}", kind.as_str(), id))?;
        self.send(self.client.get(url)).await
    }

    async fn submit_request(
        &self,
        id: u64,
        kind: MediaKind,
    ) -> Result<RawResponse, TransportError> {
        let url = self.endpoint("request")?;
        let body = MediaRequestBody {
            media_id: id,
            media_type: kind,
        };
        info!("Submitting request for {} {}", kind, id);
        self.send(self.client.post(url).json(&body)).await
    }

    async fn fetch_image(&self, url: &str, limit: usize) -> Result<RawResponse, TransportError> {
        let url = Url::parse(url).map_err(|e| TransportError::Connect(format!("{url}: {e}")))?;
        check_transport(&url)?;

        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }

        if let Some(declared) = response.content_length()
            && declared as usize > limit
        {
            warn!("Image declares {} bytes (max {})", declared, limit);
            return Err(TransportError::TooLarge {
                limit,
                received: declared as usize,
            });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > limit {
                warn!(
                    "Image exceeded size limit during download: {} bytes",
                    body.len() + chunk.len()
                );
                return Err(TransportError::TooLarge {
                    limit,
                    received: body.len() + chunk.len(),
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(RawResponse {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_hosts() {
        assert!(is_local_host("localhost"));
        assert!(is_local_host("127.0.0.1"));
        assert!(is_local_host("192.168.1.20"));
        assert!(is_local_host("10.0.0.5"));
        assert!(is_local_host("nas.local"));
        assert!(is_local_host("[::1]"));
        assert!(!is_local_host("example.com"));
        assert!(!is_local_host("8.8.8.8"));
    }

    #[test]
    fn test_check_transport() {
        let ok = Url::parse("https://image.tmdb.org/t/p/w500/a.jpg").unwrap();
        assert!(check_transport(&ok).is_ok());
        let local = Url::parse("http://192.168.1.5:5055/api/v1/").unwrap();
        assert!(check_transport(&local).is_ok());
        let public = Url::parse("http://media.example.com/").unwrap();
        assert!(matches!(
            check_transport(&public),
            Err(TransportError::Insecure(_))
        ));
        let ftp = Url::parse("ftp://localhost/").unwrap();
        assert!(check_transport(&ftp).is_err());
    }

    #[test]
    fn test_new_refuses_public_plain_http() {
        let result = SeerrClient::new("http://media.example.com", None, Duration::from_secs(5));
        assert!(matches!(result, Err(ClientError::InsecureTransport(_))));

        let result = SeerrClient::new("https://media.example.com/", None, Duration::from_secs(5));
        assert!(result.is_ok());

        let result = SeerrClient::new("not a url", None, Duration::from_secs(5));
        assert!(matches!(result, Err(ClientError::InvalidUrl(_))));
    }

    #[test]
    fn test_endpoint_joins_under_api_prefix() {
        let client =
            SeerrClient::new("http://localhost:5055/", None, Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.endpoint("discover/movies").unwrap().as_str(),
            "http://localhost:5055/api/v1/discover/movies"
        );
    }

    #[test]
    fn test_retryable_statuses() {
        let status = |s| TransportError::Status {
            status: s,
            message: String::new(),
        };
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(401).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(TransportError::Timeout.is_retryable());
        assert!(
            !TransportError::TooLarge {
                limit: 1,
                received: 2
            }
            .is_retryable()
        );
    }
}
