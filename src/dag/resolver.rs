// src/dag/resolver.rs

//! Turns the dependency graph into an ordered to-do list for an action.
//!
//! The requested node set is `available components x commands`. Ordering
//! constraints between requested nodes come from three places:
//! - direct graph edges,
//! - paths through graph nodes that were *not* requested (so `A -> X -> B`
//!   still orders A before B when X is absent),
//! - the command list itself: for each component, `commands[i]` runs before
//!   `commands[i + 1]`.
//!
//! Kahn's algorithm picks among ready nodes by declaration position in the
//! stack metadata, then by request position, so the output is identical
//! across runs.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::debug;

use crate::dag::{ComponentCommand, DependencyGraph};
use crate::errors::{ClusterdagError, Result};
use crate::types::Command;

/// Edge direction used when walking the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Blockers first ("B starts after A").
    Forward,
    /// Dependents first ("stop B before A").
    Reverse,
}

impl DependencyGraph {
    /// Ordered to-do list for `commands` over `available` components.
    ///
    /// Components not mentioned by the graph still appear in the output; they
    /// carry no ordering constraints beyond the per-component command chain
    /// and sort after graph nodes when ready at the same time.
    pub fn build_todo_list(
        &self,
        available: &[String],
        commands: &[Command],
        direction: Direction,
    ) -> Result<Vec<ComponentCommand>> {
        let mut components: Vec<String> = Vec::new();
        for c in available {
            let c = c.to_lowercase();
            if !components.contains(&c) {
                components.push(c);
            }
        }

        // Requested nodes, command-major.
        let mut requested: Vec<ComponentCommand> = Vec::new();
        for &command in commands {
            for component in &components {
                let node = ComponentCommand::new(component, command);
                if !requested.contains(&node) {
                    requested.push(node);
                }
            }
        }
        let slot: HashMap<&ComponentCommand, usize> =
            requested.iter().enumerate().map(|(i, n)| (n, i)).collect();

        let mut edges: HashSet<(usize, usize)> = HashSet::new();
        for (from_slot, node) in requested.iter().enumerate() {
            let Some(start) = self.position(node) else {
                continue;
            };
            for to in self.reachable_requested(start, &slot) {
                edges.insert((from_slot, to));
            }
        }
        for component in &components {
            for pair in commands.windows(2) {
                let from = ComponentCommand::new(component, pair[0]);
                let to = ComponentCommand::new(component, pair[1]);
                if let (Some(&f), Some(&t)) = (slot.get(&from), slot.get(&to)) {
                    if f != t {
                        edges.insert((f, t));
                    }
                }
            }
        }

        let n = requested.len();
        let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut indegree = vec![0usize; n];
        for &(a, b) in &edges {
            let (from, to) = match direction {
                Direction::Forward => (a, b),
                Direction::Reverse => (b, a),
            };
            outgoing[from].push(to);
            indegree[to] += 1;
        }

        let key = |i: usize| {
            let decl = self.position(&requested[i]).unwrap_or(usize::MAX);
            Reverse((decl, i))
        };

        let mut ready: BinaryHeap<Reverse<(usize, usize)>> = (0..n)
            .filter(|&i| indegree[i] == 0)
            .map(key)
            .collect();

        let mut order: Vec<usize> = Vec::with_capacity(n);
        while let Some(Reverse((_, i))) = ready.pop() {
            order.push(i);
            for &next in &outgoing[i] {
                indegree[next] -= 1;
                if indegree[next] == 0 {
                    ready.push(key(next));
                }
            }
        }

        if order.len() < n {
            let emitted: HashSet<usize> = order.iter().copied().collect();
            let nodes = (0..n)
                .filter(|i| !emitted.contains(i))
                .map(|i| requested[i].to_string())
                .collect();
            return Err(ClusterdagError::DependencyCycle { nodes });
        }

        let todo: Vec<ComponentCommand> =
            order.into_iter().map(|i| requested[i].clone()).collect();
        debug!(
            ?commands,
            ?direction,
            todo = ?todo.iter().map(|c| c.to_string()).collect::<Vec<_>>(),
            "resolved to-do list"
        );
        Ok(todo)
    }

    /// Teardown order for `STOP`.
    ///
    /// Declared `*-STOP` dependencies are used as-is when the stack has any.
    /// Otherwise the `START` graph is walked in reverse and relabeled.
    pub fn stop_order(&self, available: &[String]) -> Result<Vec<ComponentCommand>> {
        let has_stop_nodes = self.nodes().iter().any(|n| n.command == Command::Stop);
        if has_stop_nodes {
            return self.build_todo_list(available, &[Command::Stop], Direction::Forward);
        }

        let reversed = self.build_todo_list(available, &[Command::Start], Direction::Reverse)?;
        Ok(reversed
            .into_iter()
            .map(|cc| cc.with_command(Command::Stop))
            .collect())
    }

    /// Requested nodes reachable from `start`, walking through unrequested
    /// nodes but stopping at the first requested node on each path.
    fn reachable_requested(
        &self,
        start: usize,
        slot: &HashMap<&ComponentCommand, usize>,
    ) -> Vec<usize> {
        let mut found = Vec::new();
        let mut seen: HashSet<usize> = HashSet::new();
        let mut stack: Vec<usize> = self.successors(start).collect();

        while let Some(idx) = stack.pop() {
            if !seen.insert(idx) {
                continue;
            }
            match slot.get(self.node_at(idx)) {
                Some(&s) => found.push(s),
                None => stack.extend(self.successors(idx)),
            }
        }
        found
    }
}
