//! Test utilities shared across the crate.
//!
//! This module is only compiled during tests (`#[cfg(test)]`).

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use crate::core::coordinator::CoordinatorSettings;
use crate::core::retry::RetryPolicy;
use crate::remote::{MediaKind, RawResponse, TransportError, WireClient};

/// One call the fake received.
#[derive(Debug, Clone, PartialEq)]
pub enum FakeCall {
    Status,
    Search { query: String, kind: MediaKind, page: u32 },
    Browse { kind: MediaKind, page: u32 },
    Detail { id: u64, kind: MediaKind },
    Submit { id: u64, kind: MediaKind },
    Image { url: String, limit: usize },
}

/// What the fake answers with, and after how long.
pub struct Scripted {
    pub delay: Duration,
    pub response: Result<RawResponse, TransportError>,
}

impl Scripted {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            delay: Duration::ZERO,
            response: Ok(RawResponse::ok(body)),
        }
    }

    pub fn err(error: TransportError) -> Self {
        Self {
            delay: Duration::ZERO,
            response: Err(error),
        }
    }

    pub fn status(status: u16) -> Self {
        Self::err(TransportError::Status {
            status,
            message: format!("HTTP {status}"),
        })
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type Script = dyn Fn(&FakeCall) -> Scripted + Send + Sync;

/// A `WireClient` that answers from a closure and records every call.
/// `fetch_image` honours the size ceiling like the real client does.
pub struct FakeClient {
    script: Box<Script>,
    calls: Mutex<Vec<FakeCall>>,
}

impl FakeClient {
    pub fn new(script: impl Fn(&FakeCall) -> Scripted + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&FakeCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    async fn answer(&self, call: FakeCall) -> Result<RawResponse, TransportError> {
        self.calls.lock().unwrap().push(call.clone());
        let scripted = (self.script)(&call);
        if !scripted.delay.is_zero() {
            tokio::time::sleep(scripted.delay).await;
        }
        let response = scripted.response?;
        if let FakeCall::Image { limit, .. } = call
            && response.body.len() > limit
        {
            return Err(TransportError::TooLarge {
                limit,
                received: response.body.len(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl WireClient for FakeClient {
    async fn check_status(&self) -> Result<RawResponse, TransportError> {
        self.answer(FakeCall::Status).await
    }

    async fn search(
        &self,
        query: &str,
        kind: MediaKind,
        page: u32,
    ) -> Result<RawResponse, TransportError> {
        self.answer(FakeCall::Search {
            query: query.to_string(),
            kind,
            page,
        })
        .await
    }

    async fn browse(&self, kind: MediaKind, page: u32) -> Result<RawResponse, TransportError> {
        self.answer(FakeCall::Browse { kind, page }).await
    }

    async fn detail(&self, id: u64, kind: MediaKind) -> Result<RawResponse, TransportError> {
        self.answer(FakeCall::Detail { id, kind }).await
    }

    async fn submit_request(
        &self,
        id: u64,
        kind: MediaKind,
    ) -> Result<RawResponse, TransportError> {
        self.answer(FakeCall::Submit { id, kind }).await
    }

    async fn fetch_image(&self, url: &str, limit: usize) -> Result<RawResponse, TransportError> {
        self.answer(FakeCall::Image {
            url: url.to_string(),
            limit,
        })
        .await
    }
}

/// Coordinator settings with millisecond backoff so retry paths stay fast.
pub fn test_settings() -> CoordinatorSettings {
    CoordinatorSettings {
        retry: RetryPolicy {
            base_backoff: Duration::from_millis(1),
            attempt_timeout: Duration::from_secs(2),
            ..RetryPolicy::default()
        },
        ..CoordinatorSettings::default()
    }
}

/// A search/discover body. `media_type` is `"movie"` or `"tv"`.
pub fn listing_json(media_type: &str, rows: &[(u64, &str)]) -> String {
    let results: Vec<serde_json::Value> = rows
        .iter()
        .map(|(id, title)| {
            serde_json::json!({
                "id": id,
                "mediaType": media_type,
                "title": title,
                "name": title,
                "releaseDate": "1999-03-31",
                "posterPath": format!("/{id}.jpg"),
            })
        })
        .collect();
    serde_json::json!({ "page": 1, "totalPages": 1, "results": results }).to_string()
}

/// A detail body that validates as either kind.
pub fn detail_json(id: u64, title: &str) -> String {
    serde_json::json!({
        "id": id,
        "title": title,
        "name": title,
        "overview": "A computer hacker learns the truth.",
        "releaseDate": "1999-03-31",
        "runtime": 136,
        "genres": [{ "name": "Action" }],
        "mediaInfo": { "status": 5 },
    })
    .to_string()
}

/// `size` bytes that pass the JPEG magic check.
pub fn jpeg(size: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; size.max(3)];
    bytes[..3].copy_from_slice(&[0xFF, 0xD8, 0xFF]);
    bytes
}
