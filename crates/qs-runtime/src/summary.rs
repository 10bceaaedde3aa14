use std::collections::BTreeMap;

use qs_core::{QsValue, QueueSpeed};
use serde::Serialize;

use crate::queue::{Queue, QueueMode, QueueState};

/// Serializable snapshot of one queue for hosts and debugging tools.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSummary {
    pub id: String,
    pub debug_id: String,
    pub script: Option<String>,
    pub mode: QueueMode,
    pub state: QueueState,
    pub speed: QueueSpeed,
    pub size: usize,
    pub pending: Vec<String>,
    pub definitions: BTreeMap<String, QsValue>,
    pub held: Vec<String>,
    pub started_at_ms: Option<u64>,
}

impl QueueSummary {
    pub fn from_queue(queue: &Queue) -> Self {
        Self {
            id: queue.id().to_string(),
            debug_id: queue.debug_id().to_string(),
            script: queue.script_name().map(str::to_string),
            mode: queue.mode(),
            state: queue.state(),
            speed: queue.speed(),
            size: queue.size(),
            pending: queue.pending_commands(),
            definitions: queue.definitions().clone(),
            held: queue.held_results().into_keys().collect(),
            started_at_ms: queue
                .started_at()
                .map(|at| u64::try_from(at.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}
