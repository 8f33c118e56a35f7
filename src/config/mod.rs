// src/config/mod.rs

//! Service manifest loading and validation for the `bootdag` binary.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a manifest from disk (`loader.rs`).
//! - Validate settings and the dependency graph (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_manifest_path, load_and_validate, load_from_path};
pub use model::{ConfigSection, Manifest, RawManifest, ServiceConfig, ServiceSpec};
