//! `crew_runtime` — the execution core of a multi-agent LLM orchestration
//! runtime: a task scheduler and dependency resolver, a manager-driven
//! hierarchical planner, a tiered memory subsystem, and a request rate
//! controller, wired together behind a single [`crew::Crew`] façade.
//!
//! The language model, the tools an agent can invoke, and the embedding
//! model are opaque ports (see [`ports`]) supplied by the caller; this
//! crate owns only the orchestration around them.
//!
//! Module layout mirrors the component table in the design docs, leaves
//! first: [`rate`] and [`retry`] are the lowest-level primitives,
//! [`vectorstore`] sits under [`memory`], [`context`] aggregates memory for
//! [`agent_runtime`], which the [`scheduler`] and [`planner`] drive, and
//! [`crew`] is the top-level façade that wires all of the above together.

pub mod agent_runtime;
pub mod config;
pub mod context;
pub mod crew;
pub mod error;
pub mod memory;
pub mod model;
pub mod planner;
pub mod ports;
pub mod rate;
pub mod retry;
pub mod scheduler;
pub mod telemetry;
pub mod utils;
pub mod vectorstore;

pub use crew::{Crew, CrewConfig, Process};
pub use error::{CoreError, CoreResult};
