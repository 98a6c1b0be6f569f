//! Immutable node registry.
//!
//! Graphs are registered once at startup and validated before the first
//! event: entry node present, no dangling transition targets, fallback
//! completeness for every node, and the service nodes every graph needs.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::domain::Domain;
use crate::routing::Trigger;

use super::node::NodeDefinition;

/// Node every graph must provide for `no-match` on configuration errors
pub const NODE_FALLBACK: &str = "fallback";

/// Node every graph must provide for tripped breakers / exhausted retries
pub const NODE_SERVICE_UNAVAILABLE: &str = "service_unavailable";

/// Declarative graph for one domain
pub struct GraphDefinition {
    pub domain: Domain,

    /// Node executed when a conversation has no current node
    pub entry: String,

    /// Graph-level transitions consulted when the current node's own table
    /// has no entry for a trigger (tenant-wide keywords, topic switches)
    pub global_transitions: BTreeMap<String, String>,

    pub nodes: Vec<NodeDefinition>,
}

/// Structural problems found while building the registry
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("Graph for domain '{domain}' registered twice")]
    DuplicateGraph { domain: &'static str },

    #[error("Duplicate node '{node}' in domain '{domain}'")]
    DuplicateNode { domain: &'static str, node: String },

    #[error("Entry node '{entry}' not found in domain '{domain}'")]
    MissingEntry { domain: &'static str, entry: String },

    #[error("Node '{node}' in domain '{domain}' routes trigger '{trigger}' to unknown node '{target}'")]
    DanglingTarget {
        domain: &'static str,
        node: String,
        trigger: String,
        target: String,
    },

    #[error("Node '{node}' in domain '{domain}' declares fallback to unknown node '{target}'")]
    DanglingFallback {
        domain: &'static str,
        node: String,
        target: String,
    },

    #[error("Domain '{domain}' is missing required service node '{node}'")]
    MissingServiceNode { domain: &'static str, node: &'static str },

    #[error("No graph registered for domain '{domain}'")]
    MissingGraph { domain: &'static str },
}

struct Graph {
    entry: String,
    global_transitions: BTreeMap<String, String>,
    nodes: HashMap<String, NodeDefinition>,
}

/// How a trigger resolved to its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionVia {
    /// The current node's own transition table
    Node,

    /// The graph-level transition table
    Global,

    /// The node's declared fallback (trigger was unknown or `no-match`)
    Fallback,
}

/// A resolved transition
#[derive(Debug, Clone)]
pub struct Resolution {
    pub target: String,
    pub via: ResolutionVia,
}

/// Read-only registry of all domain graphs, built once per process
pub struct NodeRegistry {
    graphs: HashMap<Domain, Graph>,
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("domains", &self.graphs.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl NodeRegistry {
    /// Build and validate. Any structural error aborts startup.
    pub fn build(definitions: Vec<GraphDefinition>) -> Result<Self, RegistryError> {
        let mut graphs = HashMap::new();

        for def in definitions {
            let domain_name = def.domain.as_str();

            let mut nodes = HashMap::new();
            for node in def.nodes {
                if nodes.contains_key(&node.name) {
                    return Err(RegistryError::DuplicateNode {
                        domain: domain_name,
                        node: node.name,
                    });
                }
                nodes.insert(node.name.clone(), node);
            }

            let graph = Graph {
                entry: def.entry,
                global_transitions: def.global_transitions,
                nodes,
            };
            Self::validate_graph(domain_name, &graph)?;

            if graphs.insert(def.domain, graph).is_some() {
                return Err(RegistryError::DuplicateGraph {
                    domain: domain_name,
                });
            }
        }

        Ok(Self { graphs })
    }

    fn validate_graph(domain: &'static str, graph: &Graph) -> Result<(), RegistryError> {
        if !graph.nodes.contains_key(&graph.entry) {
            return Err(RegistryError::MissingEntry {
                domain,
                entry: graph.entry.clone(),
            });
        }

        for required in [NODE_FALLBACK, NODE_SERVICE_UNAVAILABLE] {
            if !graph.nodes.contains_key(required) {
                return Err(RegistryError::MissingServiceNode {
                    domain,
                    node: required,
                });
            }
        }

        for node in graph.nodes.values() {
            for (trigger, target) in &node.transitions {
                if !graph.nodes.contains_key(target) {
                    return Err(RegistryError::DanglingTarget {
                        domain,
                        node: node.name.clone(),
                        trigger: trigger.clone(),
                        target: target.clone(),
                    });
                }
            }

            // Fallback completeness: `no-match` must resolve everywhere
            if !graph.nodes.contains_key(&node.fallback) {
                return Err(RegistryError::DanglingFallback {
                    domain,
                    node: node.name.clone(),
                    target: node.fallback.clone(),
                });
            }
        }

        for (trigger, target) in &graph.global_transitions {
            if !graph.nodes.contains_key(target) {
                return Err(RegistryError::DanglingTarget {
                    domain,
                    node: "<global>".to_string(),
                    trigger: trigger.clone(),
                    target: target.clone(),
                });
            }
        }

        Ok(())
    }

    fn graph(&self, domain: Domain) -> Result<&Graph, RegistryError> {
        self.graphs.get(&domain).ok_or(RegistryError::MissingGraph {
            domain: domain.as_str(),
        })
    }

    /// Entry node name for a domain
    pub fn entry(&self, domain: Domain) -> Result<&str, RegistryError> {
        Ok(&self.graph(domain)?.entry)
    }

    /// Node definition by name
    pub fn node(&self, domain: Domain, name: &str) -> Option<&NodeDefinition> {
        self.graphs.get(&domain)?.nodes.get(name)
    }

    /// All node names of a domain (validation reports, tests)
    pub fn node_names(&self, domain: Domain) -> Vec<&str> {
        self.graphs
            .get(&domain)
            .map(|g| g.nodes.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Resolve a trigger at a node. Deterministic: a pure function of
    /// (node, trigger). Precedence: node table, then graph globals, then
    /// the node's fallback.
    pub fn resolve(
        &self,
        domain: Domain,
        node: &NodeDefinition,
        trigger: &Trigger,
    ) -> Result<Resolution, RegistryError> {
        let graph = self.graph(domain)?;
        let key = trigger.key();

        if let Some(target) = node.transitions.get(&key) {
            return Ok(Resolution {
                target: target.clone(),
                via: ResolutionVia::Node,
            });
        }
        if let Some(target) = graph.global_transitions.get(&key) {
            return Ok(Resolution {
                target: target.clone(),
                via: ResolutionVia::Global,
            });
        }
        Ok(Resolution {
            target: node.fallback.clone(),
            via: ResolutionVia::Fallback,
        })
    }
}
