// src/dag/mod.rs

//! Component-command dependency graph and the to-do list resolver.
//!
//! - [`component_command`] defines the `(component, command)` node key.
//! - [`graph`] holds the petgraph-backed, cycle-checked graph.
//! - [`resolver`] orders a requested set of nodes, forward or reverse.

pub mod component_command;
pub mod graph;
pub mod resolver;

pub use component_command::ComponentCommand;
pub use graph::DependencyGraph;
pub use resolver::Direction;
