/// Typed access to the link endpoints
use crate::{
    error::{ClientError, ClientResult},
    http::{client::with_default_message, HttpClient, Method, RequestBody},
    links::{short_url, LinkCollection, RawLink, SecretKey},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

/// Outcome of `POST /url`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortenResult {
    pub key: String,
    pub short_url: String,
    pub links_remaining: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ShortenResponse {
    key: String,
    #[serde(default)]
    links_remaining: Option<u64>,
}

/// Link endpoints on top of the HTTP client
#[derive(Clone)]
pub struct LinkApi {
    http: HttpClient,
    short_link_base: String,
}

impl LinkApi {
    pub fn new(http: HttpClient, short_link_base: &str) -> Self {
        Self {
            http,
            short_link_base: short_link_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn short_link_base(&self) -> &str {
        &self.short_link_base
    }

    /// `GET /urls`, transformed into the canonical shape
    pub async fn fetch_links(&self) -> ClientResult<LinkCollection> {
        self.require_token()?;

        let response = self.http.request(Method::GET, "/urls", None).await?;
        let items: Vec<serde_json::Value> = response.json()?;
        let total = items.len();
        let raw: Vec<RawLink> = items
            .into_iter()
            .enumerate()
            .filter_map(|(index, item)| RawLink::parse(index + 1, item))
            .collect();
        debug!("Fetched {} links ({} skipped)", raw.len(), total - raw.len());

        Ok(LinkCollection::from_raw(raw, &self.short_link_base))
    }

    /// `DELETE /delete/{secret_key}`
    pub async fn delete_link(&self, secret_key: &SecretKey) -> ClientResult<()> {
        self.require_token()?;

        let path = format!("/delete/{}", urlencoding::encode(secret_key.expose()));
        self.http
            .request(Method::DELETE, &path, None)
            .await
            .map_err(|e| with_default_message(e, |status| format!("Failed to delete link: {}", status)))?;

        Ok(())
    }

    /// Validate and submit a URL for shortening
    pub async fn shorten(&self, target_url: &str) -> ClientResult<ShortenResult> {
        let target_url = validate_target_url(target_url)?;
        self.require_token()?;

        let body = RequestBody::Json(json!({ "target_url": target_url }));
        let response = self
            .http
            .request(Method::POST, "/url", Some(body))
            .await
            .map_err(|e| {
                with_default_message(e, |status| match status {
                    400 => "Invalid URL provided".to_string(),
                    _ => "Failed to shorten URL".to_string(),
                })
            })?;

        let created: ShortenResponse = response.json()?;
        info!("Shortened URL as {}", created.key);

        Ok(ShortenResult {
            short_url: short_url(&self.short_link_base, &created.key),
            key: created.key,
            links_remaining: created.links_remaining,
        })
    }

    fn require_token(&self) -> ClientResult<()> {
        match self.http.session().token() {
            Some(_) => Ok(()),
            None => Err(ClientError::NotAuthenticated),
        }
    }
}

/// Trimmed URL if it is an absolute http(s) URL
pub fn validate_target_url(target_url: &str) -> ClientResult<String> {
    let trimmed = target_url.trim();
    if trimmed.is_empty() {
        return Err(ClientError::Validation("Please enter a URL".to_string()));
    }

    match reqwest::Url::parse(trimmed) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(trimmed.to_string()),
        _ => Err(ClientError::Validation(
            "Please enter a valid URL (must start with http:// or https://)".to_string(),
        )),
    }
}
