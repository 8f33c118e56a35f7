// src/lib.rs

//! Application bootstrapping over a service dependency graph.
//!
//! Services are described by [`Declaration`]s: a name, the names they need,
//! and how to acquire them as a [`Scoped`] resource. [`bootstrap`] validates
//! the graph and returns one scoped resource that acquires every service with
//! as much parallelism as the dependencies allow, and releases them in
//! reverse order however the scope ends.
//!
//! ```no_run
//! use bootdag::{bootstrap, Declaration, ResourceMap, Scoped};
//!
//! # async fn example() -> bootdag::errors::Result<()> {
//! let services = bootstrap(vec![
//!     Declaration::new("config", &[], |_| Scoped::pure(String::from("postgres://localhost"))),
//!     Declaration::new("db", &["config"], |deps: ResourceMap| {
//!         let url = deps.get::<String>("config").cloned().unwrap_or_default();
//!         Scoped::hook(async move { Ok(url) }, |_conn| async { Ok(()) })
//!     }),
//! ])?;
//!
//! services
//!     .use_with(|resources| async move {
//!         println!("db: {:?}", resources.get::<String>("db"));
//!         Ok::<_, bootdag::errors::BootError>(())
//!     })
//!     .await
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod dag;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod scope;
pub mod types;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::{default_manifest_path, load_and_validate};
use crate::config::Manifest;
use crate::errors::{BootError, Result};
use crate::types::Readiness;

pub use crate::dag::{Declaration, ResourceMap, ServiceName, Value};
pub use crate::scope::{Lease, Scoped};

/// Validate `declarations` and compose them into one scoped resource whose
/// value is the complete [`ResourceMap`].
///
/// Graph defects are reported here, before anything is acquired. Acquisition
/// failures surface when the returned scope is entered, after everything
/// acquired so far has been released.
pub fn bootstrap(declarations: Vec<Declaration>) -> Result<Scoped<ResourceMap>> {
    dag::validate(&declarations)?;
    info!(services = declarations.len(), "bootstrapping services");
    Ok(dag::schedule(declarations))
}

/// High-level entry point used by `main.rs`.
///
/// Loads the manifest, starts every service layer by layer, holds them until
/// Ctrl-C (or immediately with `--once`), then stops them in reverse order.
pub async fn run(args: CliArgs) -> Result<()> {
    let manifest_path = args.config.clone().unwrap_or_else(default_manifest_path);
    let manifest = load_and_validate(&manifest_path)?;

    if args.dry_run {
        print_dry_run(&manifest)?;
        return Ok(());
    }

    // Ctrl-C → graceful shutdown. Registered before startup so an early
    // Ctrl-C is remembered and acted on once the current layer settles.
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("failed to listen for Ctrl+C: {e}");
            return;
        }
        let _ = shutdown_tx.send(true);
    });

    let services = bootstrap(exec::declarations(&manifest))?;
    let once = args.once;

    services
        .use_with(|resources| async move {
            let names: Vec<_> = resources.names().collect();
            info!(services = ?names, "all services ready");

            if once {
                info!("--once given; stopping services");
                return Ok(());
            }

            info!("press Ctrl-C to stop");
            if shutdown_rx.wait_for(|stop| *stop).await.is_err() {
                debug!("shutdown listener went away; stopping services");
            }
            info!("shutdown requested; stopping services");
            Ok::<_, BootError>(())
        })
        .await?;

    info!("all services stopped");
    Ok(())
}

/// Simple dry-run output: print services, their needs, and the startup layers.
fn print_dry_run(manifest: &Manifest) -> Result<()> {
    let layers = dag::plan_layers(&manifest.services)?;

    println!("bootdag dry-run");
    println!("  config.ready_timeout = {:?}", manifest.timeouts.ready);
    println!("  config.stop_timeout = {:?}", manifest.timeouts.stop);
    println!();

    println!("services ({}):", manifest.services.len());
    for spec in manifest.services.iter() {
        println!("  - {}", spec.name);
        println!("      cmd: {}", spec.cmd);
        if !spec.needs.is_empty() {
            println!("      needs: {:?}", spec.needs);
        }
        match &spec.readiness {
            Readiness::Stdout(re) => println!("      ready_on_stdout: {}", re.as_str()),
            Readiness::After(d) => println!("      ready_after: {d:?}"),
            Readiness::Exit => println!("      one-shot (ready on exit 0)"),
        }
    }
    println!();

    println!("layers ({}):", layers.len());
    for (idx, layer) in layers.iter().enumerate() {
        println!("  {}: {}", idx + 1, layer.join(", "));
    }

    debug!("dry-run complete (nothing started)");
    Ok(())
}
