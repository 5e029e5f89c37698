/// reqwest-backed transport
use crate::{
    error::{ClientError, ClientResult},
    http::{HttpRequest, HttpResponse, RequestBody, Transport},
};
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client};
use tracing::debug;

/// Production transport
///
/// No timeout is configured: a hung request keeps only its own operation in
/// `Loading`, and every view offers a manual refresh.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a new transport
    pub fn new(user_agent: &str) -> ClientResult<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> ClientResult<HttpResponse> {
        debug!("{} {}", request.method, request.url);

        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            Some(RequestBody::Json(value)) => builder.json(&value),
            Some(RequestBody::Form(pairs)) => builder.form(&pairs),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?
            .to_vec();

        debug!("-> {} ({} bytes)", status, body.len());

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}
