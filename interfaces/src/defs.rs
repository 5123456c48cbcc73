use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One page request against a named upstream source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub content_type: String,
    pub path: String,
    pub limit: u32,
    pub sort_desc: bool,
    pub device_id: Option<String>,
    pub next_token: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl PageRequest {
    pub fn first_page(content_type: &str, path: &str, limit: u32, sort_desc: bool) -> Self {
        Self {
            content_type: content_type.to_owned(),
            path: path.to_owned(),
            limit,
            sort_desc,
            device_id: None,
            next_token: None,
            start_date: None,
            end_date: None,
        }
    }

    /// Query string pairs in the order the upstream API documents them.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("content_type", self.content_type.clone()),
            ("limit", self.limit.to_string()),
            ("sort_desc", self.sort_desc.to_string()),
        ];
        if let Some(device_id) = &self.device_id {
            pairs.push(("device_id", device_id.clone()));
        }
        if let Some(token) = &self.next_token {
            pairs.push(("next_token", token.clone()));
        }
        // The API only honours a range when both ends are present.
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            pairs.push(("start_date", start.to_rfc3339_opts(SecondsFormat::Secs, true)));
            pairs.push(("end_date", end.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        pairs
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 4xx responses mean the request itself is wrong; sending it again won't help.
    pub fn is_client_error(&self) -> bool {
        matches!(self.status(), Some(status) if (400..500).contains(&status))
    }
}

/// Receives the merged, ordered, deduplicated feed whenever it changes.
pub trait FeedSink<T>: Send {
    fn present(&mut self, items: &[T], has_more: bool);
}
