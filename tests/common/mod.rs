//! Shared fakes for integration tests.

#![allow(dead_code)]

pub mod memory_store;
pub mod scripted_node;

pub use memory_store::MemoryStore;
pub use scripted_node::{NodeBehavior, ScriptedNode};
