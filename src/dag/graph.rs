// src/dag/graph.rs

use std::collections::HashMap;

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::dag::ComponentCommand;
use crate::errors::{ClusterdagError, Result};

/// Component-command dependency graph for one stack.
///
/// Edge `A -> B` means "B is blocked by A": A must complete before B starts.
/// Nodes are numbered in the order they first appear in the stack metadata;
/// that number is the tie-break used by the resolver.
///
/// The graph is built once and is read-only afterwards, so it can be shared
/// across jobs behind an `Arc` without locking.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraphMap<usize, ()>,
    nodes: Vec<ComponentCommand>,
    index: HashMap<ComponentCommand, usize>,
}

impl DependencyGraph {
    /// Build a graph from `(blocked, blockers)` entries in declaration order.
    ///
    /// Fails with [`ClusterdagError::DependencyCycle`] when the entries
    /// describe an impossible ordering.
    pub fn from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (ComponentCommand, Vec<ComponentCommand>)>,
    {
        let mut dg = DependencyGraph::default();

        for (blocked, blockers) in entries {
            let to = dg.intern(blocked);
            for blocker in blockers {
                let from = dg.intern(blocker);
                dg.graph.add_edge(from, to, ());
            }
        }

        dg.ensure_acyclic()?;
        debug!(
            nodes = dg.nodes.len(),
            edges = dg.graph.edge_count(),
            "dependency graph built"
        );
        Ok(dg)
    }

    fn intern(&mut self, node: ComponentCommand) -> usize {
        if let Some(&idx) = self.index.get(&node) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(node.clone());
        self.index.insert(node, idx);
        self.graph.add_node(idx);
        idx
    }

    fn ensure_acyclic(&self) -> Result<()> {
        for scc in tarjan_scc(&self.graph) {
            let self_loop = scc.len() == 1 && self.graph.contains_edge(scc[0], scc[0]);
            if scc.len() > 1 || self_loop {
                let mut members = scc;
                members.sort_unstable();
                return Err(ClusterdagError::DependencyCycle {
                    nodes: members.iter().map(|&i| self.nodes[i].to_string()).collect(),
                });
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in declaration order.
    pub fn nodes(&self) -> &[ComponentCommand] {
        &self.nodes
    }

    pub fn contains(&self, node: &ComponentCommand) -> bool {
        self.index.contains_key(node)
    }

    /// Declaration position of a node, if the graph knows it.
    pub fn position(&self, node: &ComponentCommand) -> Option<usize> {
        self.index.get(node).copied()
    }

    /// Nodes that must complete before `node` may start.
    pub fn blockers_of(&self, node: &ComponentCommand) -> Vec<&ComponentCommand> {
        self.neighbors(node, petgraph::Direction::Incoming)
    }

    /// Nodes that wait for `node`.
    pub fn blocked_by(&self, node: &ComponentCommand) -> Vec<&ComponentCommand> {
        self.neighbors(node, petgraph::Direction::Outgoing)
    }

    fn neighbors(
        &self,
        node: &ComponentCommand,
        dir: petgraph::Direction,
    ) -> Vec<&ComponentCommand> {
        let Some(&idx) = self.index.get(node) else {
            return Vec::new();
        };
        let mut out: Vec<usize> = self.graph.neighbors_directed(idx, dir).collect();
        out.sort_unstable();
        out.into_iter().map(|i| &self.nodes[i]).collect()
    }

    /// Successor indices of a node (internal numbering).
    pub(crate) fn successors(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        self.graph.neighbors_directed(idx, petgraph::Direction::Outgoing)
    }

    pub(crate) fn node_at(&self, idx: usize) -> &ComponentCommand {
        &self.nodes[idx]
    }
}
