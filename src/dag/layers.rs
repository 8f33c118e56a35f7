// src/dag/layers.rs

//! Ready-set computation shared by the scheduler and the dry-run planner.

use std::collections::HashSet;

use crate::dag::declaration::{Node, ServiceName};
use crate::errors::{BootError, Result};

/// Split `remaining` into nodes whose needs are all resolved and the rest.
///
/// Both halves keep their original relative order.
pub fn partition_ready<N, F>(remaining: Vec<N>, is_resolved: F) -> (Vec<N>, Vec<N>)
where
    N: Node,
    F: Fn(&str) -> bool,
{
    remaining
        .into_iter()
        .partition(|node| node.needs().iter().all(|need| is_resolved(need)))
}

/// Error for a non-empty remainder that cannot make progress.
pub fn deadlock<N: Node>(pending: &[N]) -> BootError {
    BootError::Deadlock {
        pending: pending.iter().map(|n| n.name().to_string()).collect(),
    }
}

/// Compute the layers the scheduler would acquire, without acquiring anything.
pub fn plan_layers<N: Node>(nodes: &[N]) -> Result<Vec<Vec<ServiceName>>> {
    let mut resolved: HashSet<&str> = HashSet::new();
    let mut remaining: Vec<&N> = nodes.iter().collect();
    let mut layers = Vec::new();

    while !remaining.is_empty() {
        let (ready, pending) = partition_ready(remaining, |name| resolved.contains(name));
        if ready.is_empty() {
            return Err(deadlock(&pending));
        }
        for node in &ready {
            resolved.insert(Node::name(*node));
        }
        layers.push(ready.iter().map(|n| n.name().to_string()).collect());
        remaining = pending;
    }

    Ok(layers)
}

impl<N: Node> Node for &N {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn needs(&self) -> &[ServiceName] {
        (**self).needs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct N(&'static str, Vec<ServiceName>);

    impl Node for N {
        fn name(&self) -> &str {
            self.0
        }
        fn needs(&self) -> &[ServiceName] {
            &self.1
        }
    }

    fn make(name: &'static str, needs: &[&str]) -> N {
        N(name, needs.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn partition_keeps_order() {
        let nodes = vec![make("a", &[]), make("b", &["a"]), make("c", &[])];
        let (ready, pending) = partition_ready(nodes, |_| false);
        assert_eq!(ready.iter().map(|n| n.0).collect::<Vec<_>>(), vec!["a", "c"]);
        assert_eq!(pending.iter().map(|n| n.0).collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn plans_application_layers() {
        let nodes = vec![
            make("app", &["redis", "postgres"]),
            make("redis", &["config"]),
            make("postgres", &["config"]),
            make("config", &[]),
        ];
        let layers = plan_layers(&nodes).unwrap();
        assert_eq!(
            layers,
            vec![
                vec!["config".to_string()],
                vec!["redis".to_string(), "postgres".to_string()],
                vec!["app".to_string()],
            ]
        );
    }

    #[test]
    fn empty_plan() {
        assert!(plan_layers::<N>(&[]).unwrap().is_empty());
    }

    #[test]
    fn unresolvable_remainder_is_a_deadlock() {
        let nodes = vec![make("ok", &[]), make("x", &["y"]), make("y", &["x"])];
        match plan_layers(&nodes) {
            Err(BootError::Deadlock { pending }) => assert_eq!(pending, vec!["x", "y"]),
            other => panic!("expected deadlock, got {other:?}"),
        }
    }
}
