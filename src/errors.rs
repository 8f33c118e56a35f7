// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::dag::validate::FlawedGraph;
use crate::dag::ServiceName;

#[derive(Error, Debug)]
pub enum BootError {
    /// The declaration list failed validation; nothing was acquired.
    #[error(transparent)]
    Graph(#[from] FlawedGraph),

    /// No declaration in the remaining set could be scheduled.
    #[error("Cannot bootstrap: unable to provide for: {}", .pending.join("; "))]
    Deadlock { pending: Vec<ServiceName> },

    /// A service's acquisition failed.
    #[error("failed to acquire service '{service}': {source:#}")]
    Acquisition {
        service: ServiceName,
        #[source]
        source: anyhow::Error,
    },

    /// A scoped acquisition failed outside of any named service.
    #[error("acquisition failed: {0:#}")]
    Acquire(#[source] anyhow::Error),

    /// Everything was acquired and consumed, but some release actions failed.
    #[error("{} release action(s) failed: {}", .failures.len(), render_failures(.failures))]
    Release { failures: Vec<anyhow::Error> },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BootError {
    /// Attribute a raw acquisition failure to the service that produced it.
    ///
    /// Errors that already carry more structure pass through unchanged.
    pub fn for_service(self, service: &str) -> Self {
        match self {
            BootError::Acquire(source) => BootError::Acquisition {
                service: service.to_string(),
                source,
            },
            other => other,
        }
    }
}

fn render_failures(failures: &[anyhow::Error]) -> String {
    failures
        .iter()
        .map(|e| format!("{e:#}"))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, BootError>;
