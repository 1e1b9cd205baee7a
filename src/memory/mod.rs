//! Memory Manager (spec §4.D): short-term, long-term, and entity memories
//! on top of a storage port, with pruning and an event stream.

mod entity_memory;
mod events;
mod long_term;
mod manager;
mod pruning;
mod short_term;

pub use entity_memory::EntityMemory;
pub use events::{MemoryEvent, MemoryEventBus};
pub use long_term::LongTermMemory;
pub use manager::{MemoryCategory, MemoryManager, MemoryManagerConfig};
pub use pruning::{select_for_pruning, PruneStrategy};
pub use short_term::{ShortTermConfig, ShortTermMemory};
