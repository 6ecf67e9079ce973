//! Request and response shapes of the `topic/data` endpoint.
//!
//! Field names follow the JSON the endpoint speaks (camelCase). Record keys
//! and values are binary; they are rendered as UTF-8 text when valid and as
//! base64 otherwise, tagged so a client can tell which.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tideline_browser::{Page, SortDirection};
use tideline_core::{Record, Timestamp};

use crate::error::{ApiError, ApiResult};

/// Sort order as named on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortOrder {
    /// Oldest records first.
    #[default]
    Oldest,
    /// Newest records first.
    Newest,
}

impl From<SortOrder> for SortDirection {
    fn from(order: SortOrder) -> Self {
        match order {
            SortOrder::Oldest => Self::Asc,
            SortOrder::Newest => Self::Desc,
        }
    }
}

/// A timestamp bound: epoch milliseconds, or RFC 3339 text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimestampParam {
    /// Milliseconds since the Unix epoch.
    Millis(i64),
    /// RFC 3339 date-time, or epoch milliseconds as text.
    Text(String),
}

impl TimestampParam {
    /// Resolves the bound to a timestamp.
    ///
    /// # Errors
    /// Returns `BadRequest` if the text is neither a number nor RFC 3339.
    pub fn resolve(&self) -> ApiResult<Timestamp> {
        match self {
            Self::Millis(millis) => Ok(Timestamp::from_millis(*millis)),
            Self::Text(text) => {
                let text = text.trim();
                if let Ok(millis) = text.parse::<i64>() {
                    return Ok(Timestamp::from_millis(millis));
                }
                DateTime::parse_from_rfc3339(text)
                    .map(|dt| Timestamp::from_millis(dt.timestamp_millis()))
                    .map_err(|err| ApiError::bad_request(format!("invalid timestamp {text:?}: {err}")))
            }
        }
    }
}

/// Query of the `topic/data` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicDataRequest {
    /// Cluster to browse.
    pub cluster_id: String,
    /// Topic to browse.
    pub topic_id: String,
    /// Sort order.
    #[serde(default)]
    pub sort: SortOrder,
    /// Restrict to one partition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<u64>,
    /// Only records at or after this time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimestampParam>,
    /// Search expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Continuation token from the previous response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    /// Page number the client believes it is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    /// Records per page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

impl TopicDataRequest {
    /// Creates a first-page request with defaults.
    #[must_use]
    pub fn new(cluster_id: impl Into<String>, topic_id: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            topic_id: topic_id.into(),
            ..Self::default()
        }
    }

    /// Returns the request for the page after `response`, if there is one.
    #[must_use]
    pub fn next_page(&self, response: &TopicDataResponse) -> Option<Self> {
        response.after.as_ref().map(|after| Self {
            after: Some(after.clone()),
            page_number: Some(response.page.saturating_add(1)),
            ..self.clone()
        })
    }
}

/// Binary payload rendered for JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "data", rename_all = "lowercase")]
pub enum Payload {
    /// Valid UTF-8.
    Utf8(String),
    /// Anything else, standard base64.
    Base64(String),
}

impl Payload {
    /// Renders bytes as text when possible.
    #[must_use]
    pub fn from_bytes(bytes: &Bytes) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => Self::Utf8(text.to_string()),
            Err(_) => Self::Base64(STANDARD.encode(bytes)),
        }
    }
}

/// One record header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderDto {
    /// Header name.
    pub key: Payload,
    /// Header value.
    pub value: Payload,
}

/// One record as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDto {
    /// Partition the record was read from.
    pub partition: u64,
    /// Offset within the partition.
    pub offset: u64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// The timestamp as RFC 3339, if representable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_iso: Option<String>,
    /// Record key.
    pub key: Option<Payload>,
    /// Record value.
    pub value: Payload,
    /// Headers in record order.
    pub headers: Vec<HeaderDto>,
    /// Size charged against read budgets.
    pub size: usize,
}

impl From<&Record> for RecordDto {
    fn from(record: &Record) -> Self {
        let millis = record.timestamp.as_millis();
        Self {
            partition: record.partition.get(),
            offset: record.offset.get(),
            timestamp: millis,
            timestamp_iso: DateTime::<Utc>::from_timestamp_millis(millis)
                .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            key: record.key.as_ref().map(Payload::from_bytes),
            value: Payload::from_bytes(&record.value),
            headers: record
                .headers
                .iter()
                .map(|h| HeaderDto {
                    key: Payload::from_bytes(&h.key),
                    value: Payload::from_bytes(&h.value),
                })
                .collect(),
            size: record.size(),
        }
    }
}

/// Response of the `topic/data` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicDataResponse {
    /// Records of this page in sort order.
    pub results: Vec<RecordDto>,
    /// Token for the next page; absent on the last page.
    pub after: Option<String>,
    /// 1-based page number.
    pub page: u32,
    /// True if some partition ran out of time.
    pub partial: bool,
    /// Records left in the browsed range when the page was fetched.
    pub record_count: u64,
}

impl From<Page> for TopicDataResponse {
    fn from(page: Page) -> Self {
        Self {
            results: page.records.iter().map(RecordDto::from).collect(),
            after: page.next.map(|next| next.token),
            page: page.page_number,
            partial: page.partial,
            record_count: page.remaining_estimate,
        }
    }
}
