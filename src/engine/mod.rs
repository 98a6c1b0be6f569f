//! Conversation state machine and node registry.
//!
//! - `node`: the node capability and declarative definitions
//! - `registry`: immutable, validated graphs (one per domain)
//! - `machine`: per-event step execution
//! - `services`: capability bundle composed into node behaviors

pub mod machine;
pub mod node;
pub mod registry;
pub mod services;

pub use machine::{EngineError, StateMachine, StepResult};
pub use node::{AwaitedSlot, NodeBehavior, NodeDefinition, NodeError, NodeOutcome, SlotKind};
pub use registry::{
    GraphDefinition, NodeRegistry, RegistryError, NODE_FALLBACK, NODE_SERVICE_UNAVAILABLE,
};
pub use services::{NodeServices, ResponseFormatter};
