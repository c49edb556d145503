// src/stack.rs

//! Read-only stack metadata: services, components and their dependency
//! graph. Built once from configuration and shared behind an `Arc`.

use std::collections::{BTreeMap, HashMap};

use crate::config::{build_dependency_graph, StackSection};
use crate::dag::DependencyGraph;
use crate::errors::Result;
use crate::types::ComponentCategory;

#[derive(Debug, Clone)]
pub struct ServiceDef {
    pub name: String,
    pub display_name: String,
    pub user: String,
    pub required_services: Vec<String>,
    /// Component names in the order they appear in configuration.
    pub components: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ComponentDef {
    pub name: String,
    pub service_name: String,
    pub display_name: String,
    pub category: ComponentCategory,
    pub script: Option<String>,
    pub custom_commands: Vec<String>,
}

impl ComponentDef {
    pub fn is_client(&self) -> bool {
        self.category == ComponentCategory::Client
    }
}

#[derive(Debug, Clone)]
pub struct StackMetadata {
    pub name: String,
    pub version: String,
    pub user_group: String,
    pub root_dir: String,
    services: BTreeMap<String, ServiceDef>,
    components: HashMap<String, ComponentDef>,
    graph: DependencyGraph,
}

impl StackMetadata {
    /// Build metadata from a validated `[stack]` section.
    pub fn from_config(stack: &StackSection) -> Result<Self> {
        let graph = build_dependency_graph(stack)?;

        let mut services = BTreeMap::new();
        let mut components = HashMap::new();

        for (key, svc) in &stack.service {
            let service_name = key.to_lowercase();
            let mut names = Vec::with_capacity(svc.component.len());
            for (component_name, comp) in &svc.component {
                let name = component_name.to_lowercase();
                names.push(name.clone());
                components.insert(
                    name.clone(),
                    ComponentDef {
                        display_name: comp
                            .display_name
                            .clone()
                            .unwrap_or_else(|| title_case(&name)),
                        name,
                        service_name: service_name.clone(),
                        category: comp.category,
                        script: comp.script.clone(),
                        custom_commands: comp.custom_commands.clone(),
                    },
                );
            }

            services.insert(
                service_name.clone(),
                ServiceDef {
                    name: service_name.clone(),
                    display_name: svc
                        .display_name
                        .clone()
                        .unwrap_or_else(|| title_case(&service_name)),
                    user: svc.user.clone(),
                    required_services: svc
                        .required_services
                        .iter()
                        .map(|r| r.to_lowercase())
                        .collect(),
                    components: names,
                },
            );
        }

        Ok(Self {
            name: stack.name.clone(),
            version: stack.version.clone(),
            user_group: stack.user_group.clone(),
            root_dir: stack.root_dir.clone(),
            services,
            components,
            graph,
        })
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Service and component names are matched case-insensitively.
    pub fn service(&self, name: &str) -> Option<&ServiceDef> {
        self.services.get(&name.to_lowercase())
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceDef> {
        self.services.values()
    }

    pub fn component(&self, name: &str) -> Option<&ComponentDef> {
        self.components.get(&name.to_lowercase())
    }

    /// Service owning `component`.
    pub fn service_of(&self, component: &str) -> Option<&ServiceDef> {
        self.component(component)
            .and_then(|c| self.services.get(&c.service_name))
    }

    /// Unknown components are treated as non-clients.
    pub fn is_client(&self, component: &str) -> bool {
        self.component(component).is_some_and(ComponentDef::is_client)
    }
}

fn title_case(name: &str) -> String {
    name.split(['_', '-'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
