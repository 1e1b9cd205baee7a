//! Memory event bus (spec §4.D "Events"): `memoryAdded | memoryUpdated |
//! memoryDeleted | memoriesPruned{count, strategy}`.
//!
//! Grounded on the teacher's `orchestrator/event_bus.rs` broadcast-channel
//! pattern, scoped to one instance per `MemoryManager` rather than a global
//! singleton.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::pruning::PruneStrategy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum MemoryEvent {
    MemoryAdded { id: String, kind: String },
    MemoryUpdated { id: String },
    MemoryDeleted { id: String },
    MemoriesPruned { count: usize, strategy: PruneStrategy },
}

pub struct MemoryEventBus {
    tx: broadcast::Sender<MemoryEvent>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Publishing never blocks on slow subscribers and never fails when
    /// there are none (spec §4.D: "handler faults are logged and do not
    /// block others").
    pub fn publish(&self, event: MemoryEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MemoryEvent> {
        self.tx.subscribe()
    }
}

impl Default for MemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}
