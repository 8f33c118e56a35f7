use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use bootdag::{Declaration, ResourceMap, Scoped};

/// Something that happened to a recorded service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Acquisition began; carries the names visible to it.
    Started { name: String, saw: Vec<String> },
    Acquired(String),
    Released(String),
    Failed(String),
}

/// Builds declarations that log their lifecycle into a shared event list.
///
/// Every recorded service resolves to its own name as a `String`.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A service that acquires immediately.
    pub fn service(&self, name: &str, needs: &[&str]) -> Declaration {
        self.delayed(name, needs, Duration::ZERO)
    }

    /// A service whose acquisition takes `delay`.
    pub fn delayed(&self, name: &str, needs: &[&str], delay: Duration) -> Declaration {
        let events = Arc::clone(&self.events);
        let owned = name.to_string();
        Declaration::new(name, needs, move |deps: ResourceMap| {
            push(&events, Event::Started { name: owned.clone(), saw: visible(&deps) });
            let acquired = Arc::clone(&events);
            let released = Arc::clone(&events);
            Scoped::hook(
                async move {
                    tokio::time::sleep(delay).await;
                    push(&acquired, Event::Acquired(owned.clone()));
                    Ok(owned)
                },
                move |value: String| async move {
                    push(&released, Event::Released(value));
                    Ok(())
                },
            )
        })
    }

    /// A service whose acquisition fails after `delay`.
    pub fn failing(&self, name: &str, needs: &[&str], delay: Duration) -> Declaration {
        let events = Arc::clone(&self.events);
        let owned = name.to_string();
        Declaration::new(name, needs, move |deps: ResourceMap| {
            push(&events, Event::Started { name: owned.clone(), saw: visible(&deps) });
            Scoped::<String>::acquire(async move {
                tokio::time::sleep(delay).await;
                push(&events, Event::Failed(owned.clone()));
                Err(anyhow!("{owned} refused to start"))
            })
        })
    }

    /// A service that acquires fine but whose release fails.
    pub fn sticky(&self, name: &str, needs: &[&str]) -> Declaration {
        let events = Arc::clone(&self.events);
        let owned = name.to_string();
        Declaration::new(name, needs, move |_deps: ResourceMap| {
            let released = Arc::clone(&events);
            Scoped::hook(
                async move { Ok(owned) },
                move |value: String| async move {
                    push(&released, Event::Released(value.clone()));
                    Err(anyhow!("{value} would not let go"))
                },
            )
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Names in the order they were acquired.
    pub fn acquired(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Acquired(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Names in the order they were released.
    pub fn released(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Released(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Position of an event in the log, for ordering assertions.
    pub fn position(&self, event: &Event) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }
}

fn push(events: &Mutex<Vec<Event>>, event: Event) {
    events.lock().unwrap().push(event);
}

fn visible(deps: &ResourceMap) -> Vec<String> {
    deps.names().map(str::to_string).collect()
}
