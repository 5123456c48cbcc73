// Shared helpers for the feed-aggregator integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use feed_aggregator::{
    ContentType, EngineConfig, FeedSink, Item, Normalizer, PageRequest, PageSource, SourceConfig,
    TransportError,
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, Once};
use tokio::sync::Notify;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// What a scripted source answers for one call.
#[derive(Debug, Clone)]
pub enum Reply {
    Body(Value),
    Fail(TransportError),
}

impl Reply {
    pub fn page(items: Vec<Value>, next_token: Option<&str>) -> Self {
        Reply::Body(json!({ "items": items, "next_token": next_token }))
    }

    pub fn status(status: u16) -> Self {
        Reply::Fail(TransportError::Status {
            status,
            message: "scripted".to_string(),
        })
    }
}

/// In-memory `PageSource` answering from a per-content-type queue of replies.
/// An empty queue answers with an empty, final page.
#[derive(Default)]
pub struct ScriptedSource {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<PageRequest>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, content_type: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(content_type.to_string())
            .or_default()
            .push_back(reply);
    }

    /// The next call picks its reply, then waits until the returned handle is notified.
    pub fn hold_next_call(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_for(&self, content_type: &str) -> Vec<PageRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.content_type == content_type)
            .collect()
    }

    pub fn calls_for(&self, content_type: &str) -> usize {
        self.requests_for(content_type).len()
    }

    pub fn total_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    fn source_name(&self) -> String {
        "scripted".to_string()
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<Value, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&request.content_type)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Reply::page(Vec::new(), None));

        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        match reply {
            Reply::Body(body) => Ok(body),
            Reply::Fail(e) => Err(e),
        }
    }
}

/// Remembers every presentation it receives.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub frames: Arc<Mutex<Vec<(Vec<String>, bool)>>>,
}

impl FeedSink<Item> for RecordingSink {
    fn present(&mut self, items: &[Item], has_more: bool) {
        let ids = items.iter().map(|item| item.id.clone()).collect();
        self.frames.lock().unwrap().push((ids, has_more));
    }
}

/// Engine config with fast retries, querying every known source.
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.fetch.max_attempts = 2;
    config.fetch.retry_base_delay_ms = 10;
    config
}

pub fn single_source_config(content_type: ContentType) -> EngineConfig {
    let mut config = test_config();
    config.sources = vec![SourceConfig::new(content_type)];
    config
}

pub fn classification(id: &str, timestamp: &str, species: &str, confidence: f64) -> Value {
    json!({
        "id": id,
        "device_id": "garden-01",
        "timestamp": timestamp,
        "species": species,
        "species_confidence": confidence,
    })
}

pub fn environment(id: &str, timestamp: &str, temperature: f64) -> Value {
    json!({
        "id": id,
        "device_id": "garden-01",
        "timestamp": timestamp,
        "temperature": temperature,
        "location": "greenhouse",
    })
}

pub fn video(id: &str, timestamp: &str, duration: f64) -> Value {
    json!({
        "id": id,
        "device_id": "garden-02",
        "video_key": format!("videos/{}.mp4", id),
        "timestamp": timestamp,
        "duration": duration,
    })
}

pub fn item(content_type: ContentType, record: Value) -> Item {
    Normalizer::default()
        .normalize(&content_type, record)
        .expect("test records are objects")
}

/// Source-assigned ids, in display order.
pub fn source_ids(items: &[Item]) -> Vec<String> {
    items
        .iter()
        .map(|item| item.str_field(&["id"]).unwrap_or_default().to_string())
        .collect()
}
