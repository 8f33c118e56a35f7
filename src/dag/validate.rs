// src/dag/validate.rs

//! Dependency graph validation.
//!
//! Proves a list of [`Node`]s is well-formed before anything is acquired:
//! - every name has exactly one provider,
//! - every dependency has a provider,
//! - the `needs` edges form no cycle.
//!
//! All defects are collected and reported together in one [`FlawedGraph`].

use std::collections::{HashMap, HashSet};
use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::dag::declaration::{Node, ServiceName};

/// One defect in a dependency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flaw {
    /// `name` is declared more than once; `providers` holds each
    /// declaration's `needs`, in declaration order.
    DuplicateProvider {
        name: ServiceName,
        providers: Vec<Vec<ServiceName>>,
    },
    /// `dependent` needs `missing`, which nobody declares.
    MissingProvider {
        dependent: ServiceName,
        missing: ServiceName,
    },
    /// `name` was revisited while still on the traversal path. `cycle` runs
    /// from its first occurrence back to itself.
    CircularDependency {
        name: ServiceName,
        cycle: Vec<ServiceName>,
    },
}

impl fmt::Display for Flaw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flaw::DuplicateProvider { name, providers } => {
                let lines = providers
                    .iter()
                    .map(|needs| format!("    - One depending on [{}]", needs.join("; ")))
                    .collect::<Vec<_>>()
                    .join("; and\n");
                write!(f, "[{name}] has {} providers:\n{lines}", providers.len())
            }
            Flaw::MissingProvider { dependent, missing } => {
                write!(f, "[{dependent}] needs [{missing}], which has no provider")
            }
            Flaw::CircularDependency { name, cycle } => {
                write!(f, "[{name}] circles around via [{}]", cycle.join(" -> "))
            }
        }
    }
}

/// Every defect found in a dependency graph, in discovery order.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Flawed dependency graph:\n{}", render(.flaws))]
pub struct FlawedGraph {
    pub flaws: Vec<Flaw>,
}

fn render(flaws: &[Flaw]) -> String {
    flaws
        .iter()
        .map(|flaw| format!("  - {flaw}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Validate a full declaration list.
///
/// Duplicate providers are checked first and, if any exist, reported on their
/// own: the closure walk below assumes each name resolves to one provider.
/// Otherwise every declaration is walked depth-first for missing providers and
/// cycles. A walk that hits a cycle does not continue past the repeated node.
pub fn validate<N: Node>(nodes: &[N]) -> Result<(), FlawedGraph> {
    let duplicates = find_duplicates(nodes);
    if !duplicates.is_empty() {
        return Err(FlawedGraph { flaws: duplicates });
    }

    let index: HashMap<&str, &N> = nodes.iter().map(|n| (n.name(), n)).collect();
    let mut walk = Walk {
        index,
        path: Vec::new(),
        checked: HashSet::new(),
        flaws: Vec::new(),
    };

    for node in nodes {
        walk.visit(node);
    }

    if walk.flaws.is_empty() {
        debug!(services = nodes.len(), "dependency graph is well-formed");
        Ok(())
    } else {
        Err(FlawedGraph { flaws: walk.flaws })
    }
}

/// Group providers by name, preserving first-occurrence order.
fn find_duplicates<N: Node>(nodes: &[N]) -> Vec<Flaw> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&N>> = HashMap::new();

    for node in nodes {
        let group = groups.entry(node.name()).or_default();
        if group.is_empty() {
            order.push(node.name());
        }
        group.push(node);
    }

    order
        .into_iter()
        .filter_map(|name| {
            let group = &groups[name];
            (group.len() > 1).then(|| Flaw::DuplicateProvider {
                name: name.to_string(),
                providers: group.iter().map(|n| n.needs().to_vec()).collect(),
            })
        })
        .collect()
}

/// Traversal state threaded through the depth-first walk.
struct Walk<'a, N> {
    index: HashMap<&'a str, &'a N>,
    /// Names on the current recursion stack, outermost first.
    path: Vec<&'a str>,
    /// Names that can produce no further flaws.
    checked: HashSet<&'a str>,
    flaws: Vec<Flaw>,
}

impl<'a, N: Node> Walk<'a, N> {
    fn visit(&mut self, node: &'a N) {
        let name = node.name();

        if self.checked.contains(name) {
            return;
        }

        if let Some(start) = self.path.iter().position(|p| *p == name) {
            let mut cycle: Vec<ServiceName> =
                self.path[start..].iter().map(|s| s.to_string()).collect();
            cycle.push(name.to_string());
            self.flaws.push(Flaw::CircularDependency {
                name: name.to_string(),
                cycle,
            });
            self.checked.insert(name);
            return;
        }

        self.path.push(name);
        for need in node.needs() {
            match self.index.get(need.as_str()) {
                Some(&dep) => self.visit(dep),
                None => {
                    self.flaws.push(Flaw::MissingProvider {
                        dependent: name.to_string(),
                        missing: need.clone(),
                    });
                    self.checked.insert(need.as_str());
                }
            }
        }
        self.path.pop();

        self.checked.insert(name);
    }
}
