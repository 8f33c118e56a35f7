// src/exec/mod.rs

//! Process-backed services.
//!
//! Each manifest service becomes a [`Declaration`](crate::dag::Declaration)
//! whose scoped resource is an OS process started with `tokio::process`:
//!
//! - [`process`] spawns the command, waits for readiness (`ready_on_stdout`,
//!   `ready_after`, or a successful exit), and stops it again.
//! - [`service`] wires that into declarations.

pub mod process;
pub mod service;

pub use process::ServiceHandle;
pub use service::{declaration_for, declarations};
