//! Append-only in-memory history playing the remote store: answers the
//! kernel's query/insert commands and keeps every row ever written.
//!
//! Wire contract (topics, command and response shapes) mirrors the kernel's
//! store bridge; both sides must evolve together.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const TOPIC_STORE_QUERY: &str = "carrefour/store/query@v1";
pub const TOPIC_STORE_INSERT: &str = "carrefour/store/insert@v1";
pub const TOPIC_STORE_RESPONSE: &str = "carrefour/store/response@v1";
pub const TOPIC_DATA_FEED: &str = "carrefour/traffic/data@v1";
pub const TOPIC_CONFIG_FEED: &str = "carrefour/traffic/config@v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamKind {
    #[serde(rename = "traffic_data")]
    Samples,
    #[serde(rename = "traffic_config")]
    Config,
}

impl StreamKind {
    pub fn feed_topic(self) -> &'static str {
        match self {
            StreamKind::Samples => TOPIC_DATA_FEED,
            StreamKind::Config => TOPIC_CONFIG_FEED,
        }
    }
}

/// Incoming commands from the kernel (same contract as the kernel bridge)
#[derive(Debug, Deserialize)]
#[serde(tag = "action")]
pub enum StoreCommand {
    #[serde(rename = "query")]
    Query {
        request_id: String,
        stream: StreamKind,
        limit: usize,
    },
    #[serde(rename = "insert")]
    Insert {
        request_id: String,
        stream: StreamKind,
        row: Value,
    },
}

/// Responses published back to the kernel
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum StoreResponse {
    #[serde(rename = "success")]
    Success { request_id: String, rows: Vec<Value> },
    #[serde(rename = "error")]
    Error { request_id: String, error: String },
}

#[derive(Default)]
pub struct HistoryStore {
    samples: Mutex<Vec<Value>>,
    configs: Mutex<Vec<Value>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, stream: StreamKind, row: Value) {
        match stream {
            StreamKind::Samples => self.samples.lock().push(row),
            StreamKind::Config => self.configs.lock().push(row),
        }
    }

    /// Latest rows first, insertion order standing in for timestamp order
    /// (rows are only ever appended as they happen)
    pub fn latest(&self, stream: StreamKind, limit: usize) -> Vec<Value> {
        let rows = match stream {
            StreamKind::Samples => self.samples.lock(),
            StreamKind::Config => self.configs.lock(),
        };
        rows.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self, stream: StreamKind) -> usize {
        match stream {
            StreamKind::Samples => self.samples.lock().len(),
            StreamKind::Config => self.configs.lock().len(),
        }
    }
}

/// Outcome of an insert, so the caller can rebroadcast and apply side effects
pub struct Inserted {
    pub stream: StreamKind,
    pub row: Value,
}

/// Process one command against the history; the returned response must be
/// published on the response topic, and `Inserted` (if any) on its feed topic.
pub fn process_command(
    store: &HistoryStore,
    payload: &[u8],
) -> (StoreResponse, Option<Inserted>) {
    let command = match serde_json::from_slice::<StoreCommand>(payload) {
        Ok(command) => command,
        Err(e) => {
            return (
                StoreResponse::Error {
                    request_id: "unknown".to_string(),
                    error: format!("invalid command JSON: {e}"),
                },
                None,
            )
        }
    };

    match command {
        StoreCommand::Query {
            request_id,
            stream,
            limit,
        } => (
            StoreResponse::Success {
                request_id,
                rows: store.latest(stream, limit),
            },
            None,
        ),
        StoreCommand::Insert {
            request_id,
            stream,
            row,
        } => {
            if !row.is_object() {
                return (
                    StoreResponse::Error {
                        request_id,
                        error: "row must be a JSON object".to_string(),
                    },
                    None,
                );
            }
            store.append(stream, row.clone());
            (
                StoreResponse::Success {
                    request_id,
                    rows: Vec::new(),
                },
                Some(Inserted { stream, row }),
            )
        }
    }
}
