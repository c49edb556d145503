// tests/resolver_props.rs

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;

use clusterdag::dag::Direction;
use clusterdag::stack::StackMetadata;
use clusterdag::types::{Command, ComponentCategory};
use clusterdag_test_utils::builders::StackBuilder;

/// `edges[i]` lists the components `c{i}` waits for; only lower indices, so
/// the graph is acyclic by construction.
fn dag_strategy(max: usize) -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1..=max).prop_flat_map(|n| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..n), n).prop_map(
            |raw| {
                raw.into_iter()
                    .enumerate()
                    .map(|(i, picks)| {
                        let mut deps: Vec<usize> = if i == 0 {
                            Vec::new()
                        } else {
                            picks.into_iter().map(|p| p % i).collect()
                        };
                        deps.sort_unstable();
                        deps.dedup();
                        deps
                    })
                    .collect()
            },
        )
    })
}

fn build_stack(edges: &[Vec<usize>]) -> StackMetadata {
    let mut builder = StackBuilder::new("prop").service("svc", "svc");
    for i in 0..edges.len() {
        builder = builder.component("svc", &format!("c{i}"), ComponentCategory::Master);
    }
    for (i, deps) in edges.iter().enumerate() {
        if deps.is_empty() {
            continue;
        }
        let blockers: Vec<String> = deps.iter().map(|d| format!("C{d}-START")).collect();
        let refs: Vec<&str> = blockers.iter().map(String::as_str).collect();
        builder = builder.dependency(&format!("C{i}-START"), &refs);
    }
    builder.build()
}

/// Does `from` have to start before `to`?
fn reaches(edges: &[Vec<usize>], from: usize, to: usize) -> bool {
    let mut stack = vec![to];
    let mut seen = HashSet::new();
    while let Some(node) = stack.pop() {
        if !seen.insert(node) {
            continue;
        }
        for &dep in &edges[node] {
            if dep == from {
                return true;
            }
            stack.push(dep);
        }
    }
    false
}

proptest! {
    #[test]
    fn todo_list_respects_every_path(
        edges in dag_strategy(8),
        picks in proptest::collection::vec(any::<usize>(), 1..8),
        reverse in any::<bool>(),
    ) {
        let n = edges.len();
        let stack = build_stack(&edges);
        let requested: Vec<usize> = {
            let mut v: Vec<usize> = picks.iter().map(|p| p % n).collect();
            v.sort_unstable();
            v.dedup();
            v
        };
        let available: Vec<String> = requested.iter().map(|i| format!("c{i}")).collect();
        let direction = if reverse { Direction::Reverse } else { Direction::Forward };

        let todo = stack
            .graph()
            .build_todo_list(&available, &[Command::Start], direction)
            .unwrap();

        // Exactly the requested nodes, once each.
        prop_assert_eq!(todo.len(), requested.len());
        let position: HashMap<String, usize> = todo
            .iter()
            .enumerate()
            .map(|(pos, cc)| (cc.component.clone(), pos))
            .collect();
        prop_assert_eq!(position.len(), requested.len());

        for &a in &requested {
            for &b in &requested {
                if a != b && reaches(&edges, a, b) {
                    let (pa, pb) = (position[&format!("c{a}")], position[&format!("c{b}")]);
                    if reverse {
                        prop_assert!(pb < pa, "c{} must precede c{} in reverse", b, a);
                    } else {
                        prop_assert!(pa < pb, "c{} must precede c{}", a, b);
                    }
                }
            }
        }
    }

    #[test]
    fn todo_list_is_deterministic(
        edges in dag_strategy(8),
        picks in proptest::collection::vec(any::<usize>(), 1..8),
    ) {
        let n = edges.len();
        let stack = build_stack(&edges);
        let available: Vec<String> = picks.iter().map(|p| format!("c{}", p % n)).collect();
        let commands = [Command::Init, Command::Start];

        let first = stack.graph().build_todo_list(&available, &commands, Direction::Forward).unwrap();
        let second = stack.graph().build_todo_list(&available, &commands, Direction::Forward).unwrap();
        prop_assert_eq!(&first, &second);

        // INIT precedes START for each component.
        for (pos, cc) in first.iter().enumerate() {
            if cc.command == Command::Start {
                let init = first
                    .iter()
                    .position(|o| o.component == cc.component && o.command == Command::Init)
                    .unwrap();
                prop_assert!(init < pos);
            }
        }
    }
}
