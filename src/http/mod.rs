/// HTTP resource access
///
/// `HttpClient` owns the request policy (bearer token, 401 handling, error
/// mapping). The bytes travel through a `Transport`, which is `reqwest` in
/// production and a scripted in-memory responder under test (the `testing`
/// feature exposes it to downstream suites).

pub mod client;
#[cfg(any(test, feature = "testing"))]
pub mod scripted;
pub mod transport;

pub use client::HttpClient;
pub use reqwest::Method;
#[cfg(any(test, feature = "testing"))]
pub use scripted::{Reply, ScriptedTransport};
pub use transport::ReqwestTransport;

use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// Request body encodings used by the API
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

/// A fully-built outgoing request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    /// All values of a header, case-insensitive
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .collect()
    }
}

/// A received response, status and raw body
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> ClientResult<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ClientError::InvalidResponse(format!("Malformed JSON body: {}", e)))
    }

    /// Body as lossy UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Network transport trait
///
/// Implementations report transport failures (no response at all) as
/// `ClientError::Network`; every HTTP status, including errors, is a
/// successful `HttpResponse`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> ClientResult<HttpResponse>;
}
