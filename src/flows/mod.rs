//! Domain flow extensions: per-vertical node graphs plugged into the
//! state machine through the node capability interface.

pub mod common;
pub mod medical;
pub mod pharmacy;

use crate::engine::registry::{NodeRegistry, RegistryError};

/// Build the registry with every shipped domain graph
pub fn build_registry() -> Result<NodeRegistry, RegistryError> {
    NodeRegistry::build(vec![medical::graph(), pharmacy::graph()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Domain;

    #[test]
    fn test_all_graphs_validate() {
        let registry = build_registry().unwrap();
        assert_eq!(registry.entry(Domain::Medical).unwrap(), "welcome");
        assert_eq!(registry.entry(Domain::Pharmacy).unwrap(), "welcome");
    }

    #[test]
    fn test_fallback_completeness() {
        // Every node of every graph resolves `no-match` to a defined node
        let registry = build_registry().unwrap();

        for domain in [Domain::Medical, Domain::Pharmacy] {
            for name in registry.node_names(domain) {
                let node = registry.node(domain, name).unwrap();
                let resolved = registry
                    .resolve(domain, node, &crate::routing::Trigger::NoMatch)
                    .unwrap();
                assert!(
                    registry.node(domain, &resolved.target).is_some(),
                    "{}:{} has an undefined no-match target",
                    domain.as_str(),
                    name
                );
            }
        }
    }
}
