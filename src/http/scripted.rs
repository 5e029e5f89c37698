/// Scripted in-memory transport
///
/// Answers requests from per-route reply queues and records every request it
/// receives. Only built for tests and the `testing` feature.
use crate::{
    error::{ClientError, ClientResult},
    http::{HttpRequest, HttpResponse, Method, Transport},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

/// One scripted answer
#[derive(Clone)]
pub struct Reply {
    result: Result<HttpResponse, String>,
    gate: Option<Arc<Notify>>,
}

impl Reply {
    /// JSON body with the given status
    pub fn json(status: u16, value: serde_json::Value) -> Self {
        Self::bytes(status, "application/json", value.to_string().into_bytes())
    }

    /// Raw body with the given status and content type
    pub fn bytes(status: u16, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            result: Ok(HttpResponse {
                status,
                content_type: Some(content_type.to_string()),
                body,
            }),
            gate: None,
        }
    }

    /// Empty body
    pub fn status(status: u16) -> Self {
        Self {
            result: Ok(HttpResponse {
                status,
                content_type: None,
                body: Vec::new(),
            }),
            gate: None,
        }
    }

    /// Transport failure with no response
    pub fn network_error(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            gate: None,
        }
    }

    /// Hold the reply until `gate` is notified
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

struct Route {
    method: Method,
    path: String,
    replies: VecDeque<Reply>,
}

/// Transport answering from scripted replies
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    log: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for `method path`
    ///
    /// Replies are consumed in order; the last one keeps answering once the
    /// queue is down to it. Unscripted routes answer 404.
    pub fn push(&self, method: Method, path: &str, reply: Reply) -> &Self {
        let mut routes = self.routes.lock();
        match routes
            .iter_mut()
            .find(|route| route.method == method && route.path == path)
        {
            Some(route) => route.replies.push_back(reply),
            None => routes.push(Route {
                method,
                path: path.to_string(),
                replies: VecDeque::from([reply]),
            }),
        }
        self
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.log.lock().clone()
    }

    /// Number of requests received so far
    pub fn request_count(&self) -> usize {
        self.log.lock().len()
    }

    fn next_reply(&self, method: &Method, path: &str) -> Option<Reply> {
        let mut routes = self.routes.lock();
        let route = routes
            .iter_mut()
            .find(|route| &route.method == method && route.path == path)?;
        if route.replies.len() > 1 {
            route.replies.pop_front()
        } else {
            route.replies.front().cloned()
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> ClientResult<HttpResponse> {
        let path = reqwest::Url::parse(&request.url)
            .map(|url| url.path().to_string())
            .map_err(|e| ClientError::Network(format!("Invalid URL {}: {}", request.url, e)))?;

        let reply = self.next_reply(&request.method, &path);
        self.log.lock().push(request);

        let Some(reply) = reply else {
            return Ok(HttpResponse {
                status: 404,
                content_type: None,
                body: Vec::new(),
            });
        };

        if let Some(gate) = reply.gate {
            gate.notified().await;
        }

        reply.result.map_err(ClientError::Network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(method: Method, url: &str) -> HttpRequest {
        HttpRequest {
            method,
            url: url.to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    #[tokio::test]
    async fn test_replies_are_consumed_in_order() {
        let transport = ScriptedTransport::new();
        transport
            .push(Method::GET, "/urls", Reply::status(500))
            .push(Method::GET, "/urls", Reply::json(200, json!([])));

        let first = transport.send(request(Method::GET, "http://api.test/urls")).await.unwrap();
        let second = transport.send(request(Method::GET, "http://api.test/urls")).await.unwrap();
        let third = transport.send(request(Method::GET, "http://api.test/urls")).await.unwrap();

        assert_eq!(first.status, 500);
        assert_eq!(second.status, 200);
        assert_eq!(third.status, 200);
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn test_unscripted_route_is_404() {
        let transport = ScriptedTransport::new();
        let response = transport.send(request(Method::GET, "http://api.test/url")).await.unwrap();
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_network_error_reply() {
        let transport = ScriptedTransport::new();
        transport.push(Method::GET, "/urls", Reply::network_error("connection refused"));

        let err = transport
            .send(request(Method::GET, "http://api.test/urls"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "connection refused");
    }
}
