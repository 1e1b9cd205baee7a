//! Data Model (spec §3): the plain structs and enums shared by every
//! component. Kept free of component logic so each module in `rate/`,
//! `memory/`, `scheduler/`, etc. can depend on these without cycles.

pub mod agent;
pub mod crew_output;
pub mod entity;
pub mod execution_plan;
pub mod knowledge_chunk;
pub mod memory_entry;
pub mod task;
pub mod task_output;

pub use agent::{Agent, InterpolatedAgent};
pub use crew_output::{CrewMetrics, CrewOutput};
pub use entity::{Entity, Relationship};
pub use execution_plan::{ExecutionPlan, TaskOrderItem};
pub use knowledge_chunk::KnowledgeChunk;
pub use memory_entry::{MemoryEntry, MemoryKind};
pub use task::{CachingStrategy, Priority, Task};
pub use task_output::{StreamingOutput, TaskOutput, TaskOutputMetadata, TokenUsage};
