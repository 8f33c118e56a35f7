mod common;

use std::time::Duration;

use bootdag::errors::BootError;
use bootdag::{bootstrap, Declaration, ResourceMap, Scoped};

use crate::common::{graph_message, init_tracing, with_timeout, Event, Recorder};

fn answer(name: &str, needs: &[&str]) -> Declaration {
    Declaration::new(name, needs, |_| Scoped::pure(42))
}

async fn resolve(declarations: Vec<Declaration>) -> ResourceMap {
    let services = bootstrap(declarations).expect("graph should be valid");
    with_timeout(services.use_with(|map| async move { Ok::<_, BootError>(map) }))
        .await
        .expect("bootstrap should succeed")
}

#[tokio::test]
async fn empty_declaration_list_resolves_to_empty_map() {
    init_tracing();
    let map = resolve(Vec::new()).await;
    assert!(map.is_empty());
}

#[tokio::test]
async fn single_service() {
    init_tracing();
    let map = resolve(vec![answer("x", &[])]).await;
    assert_eq!(map.len(), 1);
    assert_eq!(map.get::<i32>("x"), Some(&42));
}

#[tokio::test]
async fn dependency_declared_after_dependent() {
    init_tracing();
    let map = resolve(vec![answer("x", &["y"]), answer("y", &[])]).await;
    assert_eq!(map.names().collect::<Vec<_>>(), vec!["x", "y"]);
    assert_eq!(map.get::<i32>("x"), Some(&42));
    assert_eq!(map.get::<i32>("y"), Some(&42));
}

#[test]
fn missing_provider_fails_before_acquiring() {
    let recorder = Recorder::new();
    let err = bootstrap(vec![recorder.service("x", &["y"])]).err().unwrap();
    assert_eq!(
        graph_message(err),
        "Flawed dependency graph:\n  - [x] needs [y], which has no provider"
    );
    assert!(recorder.events().is_empty());
}

#[test]
fn circular_dependency() {
    let err = bootstrap(vec![answer("x", &["y"]), answer("y", &["x"])]).err().unwrap();
    assert_eq!(
        graph_message(err),
        "Flawed dependency graph:\n  - [x] circles around via [x -> y -> x]"
    );
}

#[test]
fn duplicate_provider_lists_both_providers() {
    let err = bootstrap(vec![answer("x", &["y"]), answer("x", &["z"])]).err().unwrap();
    assert_eq!(
        graph_message(err),
        "Flawed dependency graph:\n  - [x] has 2 providers:\n    - One depending on [y]; and\n    - One depending on [z]"
    );
}

#[test]
fn cycle_and_missing_provider_reported_together() {
    let err = bootstrap(vec![answer("x", &["y"]), answer("y", &["x", "z"])]).err().unwrap();
    assert_eq!(
        graph_message(err),
        "Flawed dependency graph:\n  - [x] circles around via [x -> y -> x]\n  - [y] needs [z], which has no provider"
    );
}

#[tokio::test]
async fn application_stack_acquires_in_layers() {
    init_tracing();
    let recorder = Recorder::new();
    let declarations = vec![
        recorder.service("app", &["redis", "postgres"]),
        recorder.service("config", &[]),
        recorder.delayed("postgres", &["config"], Duration::from_millis(20)),
        recorder.service("redis", &["config"]),
    ];

    let map = resolve(declarations).await;
    assert_eq!(map.get::<String>("app").map(String::as_str), Some("app"));

    let acquired = recorder.acquired();
    assert_eq!(acquired.first().map(String::as_str), Some("config"));
    assert_eq!(acquired.last().map(String::as_str), Some("app"));

    // app sees exactly what it asked for.
    assert!(recorder
        .position(&Event::Started {
            name: "app".into(),
            saw: vec!["postgres".into(), "redis".into()],
        })
        .is_some());
}

#[tokio::test]
async fn services_can_read_typed_dependencies() {
    init_tracing();
    let declarations = vec![
        Declaration::new("config", &[], |_| Scoped::pure(String::from("postgres://db:5432"))),
        Declaration::new("pool_size", &[], |_| Scoped::pure(8usize)),
        Declaration::new("db", &["config", "pool_size"], |deps: ResourceMap| {
            Scoped::acquire(async move {
                let url = deps.require::<String>("config")?;
                let size = deps.require::<usize>("pool_size")?;
                Ok(format!("{url} x{size}"))
            })
        }),
    ];
    let map = resolve(declarations).await;
    assert_eq!(
        map.get::<String>("db").map(String::as_str),
        Some("postgres://db:5432 x8")
    );
}

#[tokio::test]
async fn bootstrap_result_composes_as_a_scope() {
    init_tracing();
    let recorder = Recorder::new();
    let services = bootstrap(vec![recorder.service("db", &[])]).unwrap();

    let count = services
        .map(|map| map.len())
        .use_with(|n| async move { Ok::<_, BootError>(n) })
        .await
        .unwrap();

    assert_eq!(count, 1);
    assert_eq!(recorder.released(), vec!["db"]);
}
