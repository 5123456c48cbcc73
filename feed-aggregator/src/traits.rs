use crate::types::{PageRequest, TransportError};
use async_trait::async_trait;
use serde_json::Value;

/// Anything that can serve one page of records for a named source.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Human-readable name for logs
    fn source_name(&self) -> String;

    /// Fetch one page. The body is handed back as-is; shaping it into a page
    /// (and tolerating a malformed one) is the caller's job.
    async fn fetch_page(&self, request: &PageRequest) -> std::result::Result<Value, TransportError>;
}
