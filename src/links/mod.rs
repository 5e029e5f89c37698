/// Link records, the collection type and sorting
///
/// `RawLink` is the wire shape of `GET /urls`; everything the views consume
/// is the canonical `LinkRecord`.

pub mod api;
pub mod cache;
pub mod view_model;

pub use api::{LinkApi, ShortenResult};
pub use cache::{CacheLease, CollectionCache};
pub use view_model::{LinkCollectionViewModel, LinkViewSnapshot, ViewPhase};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

/// One entry of the `GET /urls` payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLink {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub original_url: Option<String>,
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub clicks: Option<i64>,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Click counts arrive as integers, floats or numeric strings
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Some(serde_json::Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        _ => None,
    })
}

impl RawLink {
    /// Parse one array element; a malformed entry is logged and skipped
    pub fn parse(position: usize, value: serde_json::Value) -> Option<Self> {
        match serde_json::from_value(value) {
            Ok(raw) => Some(raw),
            Err(e) => {
                warn!("Skipping malformed link at position {}: {}", position, e);
                None
            }
        }
    }
}

/// Per-link delete capability
///
/// Never printed, never serialized.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

impl fmt::Display for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Active,
    Inactive,
}

/// Canonical link shape
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRecord {
    pub id: String,
    pub key: String,
    pub short_url: String,
    pub original_url: String,
    pub clicks: u64,
    pub status: LinkStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub secret_key: Option<SecretKey>,
}

impl LinkRecord {
    /// Transform a wire record; `position` is 1-based
    pub fn from_raw(raw: RawLink, position: usize, short_link_base: &str, now: DateTime<Utc>) -> Self {
        let key = raw.key.unwrap_or_default();
        let id = match raw.id {
            Some(serde_json::Value::String(id)) if !id.is_empty() => id,
            Some(serde_json::Value::Number(id)) => id.to_string(),
            _ if !key.is_empty() => key.clone(),
            _ => position.to_string(),
        };

        let status = match raw.status.as_deref() {
            Some(status) if status.eq_ignore_ascii_case("inactive") => LinkStatus::Inactive,
            _ => LinkStatus::Active,
        };

        Self {
            short_url: short_url(short_link_base, &key),
            id,
            key,
            original_url: raw.original_url.or(raw.target_url).unwrap_or_default(),
            clicks: raw.clicks.unwrap_or(0).max(0) as u64,
            status,
            created_at: raw
                .date_created
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or(now),
            secret_key: raw.secret_key.filter(|s| !s.is_empty()).map(SecretKey::new),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == LinkStatus::Active
    }
}

/// `<base>/s/<key>`
pub fn short_url(base: &str, key: &str) -> String {
    format!("{}/s/{}", base.trim_end_matches('/'), key)
}

/// RFC 3339, or a naive ISO-8601 timestamp taken as UTC
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Clicks,
    CreatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn flip(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    /// Table header behaviour: same field flips, new field starts ascending
    pub fn toggled(self, field: SortField) -> Self {
        if self.field == field {
            Self::new(field, self.direction.flip())
        } else {
            Self::new(field, SortDirection::Ascending)
        }
    }
}

impl Default for SortSpec {
    /// Newest first
    fn default() -> Self {
        Self::new(SortField::CreatedAt, SortDirection::Descending)
    }
}

/// Which consuming view a collection backs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    /// Dashboard table showing the newest `cap` links
    Compact(usize),
    /// Full link history
    History,
}

impl ViewKind {
    pub fn cap(self) -> Option<usize> {
        match self {
            ViewKind::Compact(cap) => Some(cap),
            ViewKind::History => None,
        }
    }
}

/// Ordered links with unique ids
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkCollection {
    records: Vec<LinkRecord>,
}

impl LinkCollection {
    /// Transform a payload, dropping records whose id was already seen
    pub fn from_raw(raw: Vec<RawLink>, short_link_base: &str) -> Self {
        let now = Utc::now();
        let mut seen = HashSet::new();
        let records = raw
            .into_iter()
            .enumerate()
            .map(|(index, raw)| LinkRecord::from_raw(raw, index + 1, short_link_base, now))
            .filter(|record| {
                let fresh = seen.insert(record.id.clone());
                if !fresh {
                    warn!("Dropping link with duplicate id {}", record.id);
                }
                fresh
            })
            .collect();

        Self { records }
    }

    pub fn from_records(records: Vec<LinkRecord>) -> Self {
        let mut seen = HashSet::new();
        let records = records
            .into_iter()
            .filter(|record| seen.insert(record.id.clone()))
            .collect();
        Self { records }
    }

    /// Stable sort
    pub fn sort_by(&mut self, spec: SortSpec) {
        self.records.sort_by(|a, b| {
            let ordering = match spec.field {
                SortField::Clicks => a.clicks.cmp(&b.clicks),
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            };
            match spec.direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        });
    }

    pub fn truncate(&mut self, cap: usize) {
        self.records.truncate(cap);
    }

    pub fn retain(&mut self, keep: impl FnMut(&LinkRecord) -> bool) {
        self.records.retain(keep);
    }

    /// Remove the record with this id
    pub fn remove(&mut self, id: &str) -> Option<LinkRecord> {
        let index = self.records.iter().position(|record| record.id == id)?;
        Some(self.records.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<&LinkRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LinkRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[LinkRecord] {
        &self.records
    }
}

impl<'a> IntoIterator for &'a LinkCollection {
    type Item = &'a LinkRecord;
    type IntoIter = std::slice::Iter<'a, LinkRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
