// src/dag/mod.rs

//! Service dependency graphs.
//!
//! - [`declaration`] defines services and the resource map they resolve into.
//! - [`validate`] checks a declaration list for duplicate providers, missing
//!   providers and cycles.
//! - [`layers`] computes which services are ready given what is resolved.
//! - [`scheduler`] turns a declaration list into one scoped resource that
//!   acquires layer by layer.

pub mod declaration;
pub mod layers;
pub mod scheduler;
pub mod validate;

pub use declaration::{Declaration, Node, ResourceMap, ServiceName, Value};
pub use layers::{partition_ready, plan_layers};
pub use scheduler::schedule;
pub use validate::{validate, Flaw, FlawedGraph};
