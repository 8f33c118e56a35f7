// src/dag/scheduler.rs

//! Layered acquisition of a validated declaration list.
//!
//! The scheduler repeatedly picks every declaration whose needs are already
//! resolved, acquires that layer with [`Scoped::join`], merges the results
//! into a fresh [`ResourceMap`], and nests the next layer inside. Releasing
//! the resulting scope therefore unwinds the last layer first.

use tracing::{debug, info};

use crate::dag::declaration::{Declaration, ResourceMap, ServiceName, Value};
use crate::dag::layers::{deadlock, partition_ready};
use crate::scope::Scoped;

/// Build the scoped resource that acquires every declaration.
///
/// Assumes `declarations` passed [`validate`](crate::dag::validate()); if the
/// graph still cannot make progress the scope fails with
/// [`BootError::Deadlock`](crate::errors::BootError::Deadlock).
pub fn schedule(declarations: Vec<Declaration>) -> Scoped<ResourceMap> {
    complete(declarations, Scoped::pure(ResourceMap::new()), 1)
}

fn complete(
    remaining: Vec<Declaration>,
    resolved: Scoped<ResourceMap>,
    layer: usize,
) -> Scoped<ResourceMap> {
    if remaining.is_empty() {
        return resolved;
    }

    resolved.nest(move |resources| {
        let (ready, pending) = partition_ready(remaining, |name| resources.contains(name));

        if ready.is_empty() {
            let err = deadlock(&pending);
            return Scoped::fail(err);
        }

        complete(pending, acquire_layer(layer, ready, resources), layer + 1)
    })
}

/// Acquire one layer concurrently and extend `resources` with the results.
fn acquire_layer(
    layer: usize,
    ready: Vec<Declaration>,
    resources: ResourceMap,
) -> Scoped<ResourceMap> {
    let names: Vec<ServiceName> = ready.iter().map(|d| d.name().to_string()).collect();
    debug!(layer, services = ?names, "acquiring layer");

    let members = ready
        .into_iter()
        .map(|decl| {
            let name = decl.name().to_string();
            let scoped = decl.into_scoped(&resources);
            let label = name.clone();
            let context = name.clone();
            scoped
                .map(move |value| {
                    debug!(service = %name, "service acquired");
                    (name, value)
                })
                .map_err(move |err| err.for_service(&context))
                .labelled(label)
        })
        .collect();

    Scoped::join(members).map(move |pairs: Vec<(ServiceName, Value)>| {
        info!(layer, services = ?names, "layer ready");
        resources.extended(pairs)
    })
}
