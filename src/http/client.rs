/// Authenticated request wrapper with the central 401 policy
use crate::{
    error::{ClientError, ClientResult},
    http::{HttpRequest, HttpResponse, Method, RequestBody, Transport},
    notify::NotificationHub,
    session::SessionManager,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub(crate) const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Please try again later.";

/// HTTP resource client
///
/// Every other component talks to the API through this type. Protected calls
/// carry the current bearer token; a 401 clears the session (if it still
/// holds that token) and resolves with `ClientError::Unauthorized`.
#[derive(Clone)]
pub struct HttpClient {
    base_url: String,
    transport: Arc<dyn Transport>,
    session: Arc<SessionManager>,
    notifier: NotificationHub,
}

impl HttpClient {
    pub fn new(
        base_url: &str,
        transport: Arc<dyn Transport>,
        session: Arc<SessionManager>,
        notifier: NotificationHub,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
            session,
            notifier,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Protected request
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
    ) -> ClientResult<HttpResponse> {
        let token = self.session.token();
        let request = self.build(method, path, body, token.as_deref());
        let response = self.transport.send(request).await?;

        if response.status == 401 {
            self.handle_unauthorized(token.as_deref());
            return Err(ClientError::Unauthorized);
        }

        if !response.is_success() {
            return Err(api_error(&response));
        }

        Ok(response)
    }

    /// Request without credentials or 401 handling
    pub async fn request_public(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
    ) -> ClientResult<HttpResponse> {
        let request = self.build(method, path, body, None);
        let response = self.transport.send(request).await?;

        if !response.is_success() {
            return Err(api_error(&response));
        }

        Ok(response)
    }

    fn build(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
        token: Option<&str>,
    ) -> HttpRequest {
        let mut headers = vec![("Accept".to_string(), "application/json".to_string())];
        if let Some(token) = token {
            headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }

        HttpRequest {
            method,
            url: format!("{}{}", self.base_url, path),
            headers,
            body,
        }
    }

    fn handle_unauthorized(&self, token_used: Option<&str>) {
        let Some(token_used) = token_used else {
            debug!("401 on a request sent without a token");
            return;
        };

        match self.session.expire_session(token_used) {
            Ok(true) => {
                warn!("Access token rejected, session cleared");
                self.notifier.error(ClientError::Unauthorized.to_string());
            }
            Ok(false) => debug!("401 for a token that is no longer current"),
            Err(e) => error!("Failed to clear expired session: {}", e),
        }
    }
}

/// Map a non-2xx response to `ClientError::Api`
pub(crate) fn api_error(response: &HttpResponse) -> ClientError {
    let message = server_message(response).unwrap_or_else(|| generic_message(response.status));

    ClientError::Api {
        status: response.status,
        message,
    }
}

/// Message used when the server did not send one
pub(crate) fn generic_message(status: u16) -> String {
    match status {
        429 => RATE_LIMIT_MESSAGE.to_string(),
        status => format!("Request failed with status {}", status),
    }
}

/// Replace the generic status message with an endpoint-specific one
///
/// Server-provided messages and the rate limit message are kept.
pub(crate) fn with_default_message(err: ClientError, default: impl Fn(u16) -> String) -> ClientError {
    match err {
        ClientError::Api { status, message } if status != 429 && message == generic_message(status) => {
            ClientError::Api {
                status,
                message: default(status),
            }
        }
        other => other,
    }
}

/// `detail` or `message` from an error body
///
/// Validation errors carry `detail` as a list of `{msg}` objects; the first
/// message is used.
pub(crate) fn server_message(response: &HttpResponse) -> Option<String> {
    let body: Value = serde_json::from_slice(&response.body).ok()?;

    let detail = match body.get("detail") {
        Some(Value::String(detail)) => Some(detail.clone()),
        Some(Value::Array(items)) => items
            .first()
            .and_then(|item| item.get("msg"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };

    detail.or_else(|| {
        body.get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
    })
}
