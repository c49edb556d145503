// src/config/mod.rs

//! Configuration loading and validation for clusterdag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it and build the stack dependency graph (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_from_str};
pub use model::{
    AgentSection, ComponentConfig, ConfigFile, ConfigSection, DependencyConfig, RawConfigFile,
    ServiceConfig, StackSection,
};
pub use validate::{build_dependency_graph, validate_raw_config};
