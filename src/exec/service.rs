// src/exec/service.rs

//! Turning manifest services into declarations.

use anyhow::anyhow;

use crate::config::{Manifest, ServiceSpec};
use crate::dag::Declaration;
use crate::exec::process::{launch, stop, ServiceHandle};
use crate::scope::Scoped;
use crate::types::Timeouts;

/// A declaration whose resource is the running process for `spec`.
///
/// Acquisition starts the process and waits for readiness, bounded by
/// `timeouts.ready`; release kills it and waits up to `timeouts.stop`.
pub fn declaration_for(spec: ServiceSpec, timeouts: Timeouts) -> Declaration {
    let name = spec.name.clone();
    let needs = spec.needs.clone();

    Declaration::with_needs(name, needs, move |deps| {
        let release_name = spec.name.clone();
        Scoped::<ServiceHandle>::bracket(
            async move {
                tokio::time::timeout(timeouts.ready, launch(&spec, &deps))
                    .await
                    .map_err(|_| {
                        anyhow!(
                            "service '{}' was not ready within {:?}",
                            spec.name,
                            timeouts.ready
                        )
                    })?
            },
            move |child| stop(release_name, child, timeouts.stop),
        )
    })
}

/// Declarations for every service in the manifest, in manifest order.
pub fn declarations(manifest: &Manifest) -> Vec<Declaration> {
    manifest
        .services
        .iter()
        .cloned()
        .map(|spec| declaration_for(spec, manifest.timeouts))
        .collect()
}
