// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::dag::{Node, ServiceName};
use crate::types::{Readiness, Timeouts};

/// Top-level manifest as read from a TOML file.
///
/// ```toml
/// [config]
/// ready_timeout = "30s"
/// stop_timeout = "5s"
///
/// [service.db]
/// cmd = "postgres -D data"
/// ready_on_stdout = "ready to accept connections"
///
/// [service.app]
/// cmd = "./app"
/// needs = ["db"]
/// ready_after = "2s"
/// ```
///
/// This type is not validated; convert it with `Manifest::try_from`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawManifest {
    /// Global settings from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// All services from `[service.<name>]`, keyed by service name.
    #[serde(default)]
    pub service: BTreeMap<String, ServiceConfig>,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// How long any service may take to become ready.
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout: String,

    /// How long to wait for a force-killed service process to be reaped.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: String,
}

fn default_ready_timeout() -> String {
    "30s".to_string()
}

fn default_stop_timeout() -> String {
    "5s".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            ready_timeout: default_ready_timeout(),
            stop_timeout: default_stop_timeout(),
        }
    }
}

/// `[service.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Shell command that starts the service.
    pub cmd: String,

    /// Services that must be ready before this one starts.
    #[serde(default)]
    pub needs: Vec<String>,

    /// Regex matched against stdout lines; the first match marks the service
    /// ready.
    #[serde(default)]
    pub ready_on_stdout: Option<String>,

    /// Duration string (e.g. `"2s"`) after which a still-running process is
    /// considered ready.
    #[serde(default)]
    pub ready_after: Option<String>,
}

/// A validated service, ready to be turned into a declaration.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub name: ServiceName,
    pub cmd: String,
    pub needs: Vec<ServiceName>,
    pub readiness: Readiness,
}

impl Node for ServiceSpec {
    fn name(&self) -> &str {
        &self.name
    }

    fn needs(&self) -> &[ServiceName] {
        &self.needs
    }
}

/// A validated manifest.
///
/// Constructed only through `TryFrom<RawManifest>`, so holding one means the
/// services form a well-formed dependency graph.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub timeouts: Timeouts,
    /// Services in name order.
    pub services: Vec<ServiceSpec>,
}

impl Manifest {
    /// Construct without validation. Only `config::validate` calls this.
    pub(crate) fn new_unchecked(timeouts: Timeouts, services: Vec<ServiceSpec>) -> Self {
        Self { timeouts, services }
    }
}
