//! Persistence interfaces and reference implementations.
//!
//! The relational store behind tenant configuration is out of scope; what
//! lives here are the interfaces the router needs plus a YAML-backed
//! tenant store, a read-through tenant cache, and two conversation
//! stores (in-memory, and an append-only JSONL log).

pub mod conversation;
pub mod jsonl;
pub mod tenant;

pub use conversation::{ConversationStore, InMemoryConversationStore};
pub use jsonl::JsonlConversationStore;
pub use tenant::{InMemoryTenantStore, TenantCache, TenantFile, TenantStore, YamlTenantStore};
