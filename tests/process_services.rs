#![cfg(unix)]

mod common;

use std::time::{Duration, Instant};

use bootdag::bootstrap;
use bootdag::config::Manifest;
use bootdag::errors::BootError;
use bootdag::exec::{declarations, ServiceHandle};

use crate::common::builders::{ManifestBuilder, ServiceConfigBuilder};
use crate::common::{init_tracing, with_timeout};

async fn start(manifest: &Manifest) -> Result<Vec<ServiceHandle>, BootError> {
    let services = bootstrap(declarations(manifest))?;
    with_timeout(services.use_with(|map| async move {
        let handles = map
            .names()
            .filter_map(|name| map.get::<ServiceHandle>(name).cloned())
            .collect::<Vec<_>>();
        Ok::<_, BootError>(handles)
    }))
    .await
}

fn failed_service(err: &BootError) -> &str {
    match err {
        BootError::Acquisition { service, .. } => service,
        other => panic!("expected an acquisition error, got {other:?}"),
    }
}

#[tokio::test]
async fn one_shot_service_succeeds_on_exit_zero() {
    init_tracing();
    let manifest = ManifestBuilder::new()
        .with_service("migrate", ServiceConfigBuilder::new("true").build())
        .build();

    let handles = start(&manifest).await.unwrap();
    assert_eq!(handles.len(), 1);
    assert_eq!(handles[0].name, "migrate");
}

#[tokio::test]
async fn one_shot_service_fails_on_nonzero_exit() {
    init_tracing();
    let manifest = ManifestBuilder::new()
        .with_service("migrate", ServiceConfigBuilder::new("exit 3").build())
        .build();

    let err = start(&manifest).await.unwrap_err();
    assert_eq!(failed_service(&err), "migrate");
    assert!(err.to_string().contains("exit status: 3"), "{err}");
}

#[tokio::test]
async fn long_running_service_ready_on_stdout() {
    init_tracing();
    let manifest = ManifestBuilder::new()
        .stop_timeout("2s")
        .with_service(
            "db",
            ServiceConfigBuilder::new("echo booting; echo 'db ready'; exec sleep 30")
                .ready_on_stdout("ready$")
                .build(),
        )
        .build();

    let handles = start(&manifest).await.unwrap();
    assert!(handles[0].pid.is_some());
}

#[tokio::test]
async fn long_running_service_ready_after_delay() {
    init_tracing();
    let manifest = ManifestBuilder::new()
        .with_service(
            "cache",
            ServiceConfigBuilder::new("exec sleep 30").ready_after("50ms").build(),
        )
        .build();

    let handles = start(&manifest).await.unwrap();
    assert_eq!(handles[0].name, "cache");
}

#[tokio::test]
async fn dependents_see_their_environment() {
    init_tracing();
    let manifest = ManifestBuilder::new()
        .with_service(
            "db",
            ServiceConfigBuilder::new("exec sleep 30").ready_after("50ms").build(),
        )
        .with_service(
            "checker",
            ServiceConfigBuilder::new(
                r#"test "$BOOTDAG_SERVICE" = checker && test "$BOOTDAG_NEEDS" = db && test -n "$BOOTDAG_DB_PID""#,
            )
            .needs("db")
            .build(),
        )
        .build();

    let handles = start(&manifest).await.unwrap();
    let names: Vec<_> = handles.iter().map(|h| h.name.as_str()).collect();
    assert_eq!(names, vec!["checker", "db"]);
}

#[tokio::test]
async fn process_exiting_before_ready_fails() {
    init_tracing();
    let manifest = ManifestBuilder::new()
        .with_service(
            "web",
            ServiceConfigBuilder::new("echo starting; exit 1")
                .ready_on_stdout("listening")
                .build(),
        )
        .build();

    let err = start(&manifest).await.unwrap_err();
    assert_eq!(failed_service(&err), "web");
}

#[tokio::test]
async fn ready_after_notices_early_exit() {
    init_tracing();
    let manifest = ManifestBuilder::new()
        .with_service(
            "web",
            ServiceConfigBuilder::new("exit 4").ready_after("2s").build(),
        )
        .build();

    let err = start(&manifest).await.unwrap_err();
    assert_eq!(failed_service(&err), "web");
    assert!(err.to_string().contains("before becoming ready"), "{err}");
}

#[tokio::test]
async fn ready_timeout_bounds_startup() {
    init_tracing();
    let manifest = ManifestBuilder::new()
        .ready_timeout("200ms")
        .with_service(
            "stuck",
            ServiceConfigBuilder::new("exec sleep 30")
                .ready_on_stdout("never printed")
                .build(),
        )
        .build();

    let err = start(&manifest).await.unwrap_err();
    assert_eq!(failed_service(&err), "stuck");
    assert!(err.to_string().contains("was not ready within"), "{err}");
}

#[tokio::test]
async fn failing_dependent_stops_running_dependencies() {
    init_tracing();
    let manifest = ManifestBuilder::new()
        .with_service(
            "db",
            ServiceConfigBuilder::new("exec sleep 30").ready_after("50ms").build(),
        )
        .with_service("app", ServiceConfigBuilder::new("exit 2").needs("db").build())
        .build();

    let err = start(&manifest).await.unwrap_err();
    assert_eq!(failed_service(&err), "app");
}

#[tokio::test]
async fn release_kills_services_that_ignore_sigterm() {
    init_tracing();
    let manifest = ManifestBuilder::new()
        .stop_timeout("2s")
        .with_service(
            "stubborn",
            ServiceConfigBuilder::new("trap '' TERM; echo up; exec sleep 30")
                .ready_on_stdout("^up$")
                .build(),
        )
        .build();

    let started = Instant::now();
    let handles = start(&manifest).await.unwrap();

    assert_eq!(handles[0].name, "stubborn");
    assert!(started.elapsed() < Duration::from_secs(2), "stop took {:?}", started.elapsed());
}
