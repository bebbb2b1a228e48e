//! `RunBefore`/`RunAfter` resolution: a stable topological sort over a
//! pipeline's declared systems. Run once when a system is registered
//! (fail fast) and once more, authoritatively, when the pipeline's graph
//! is built at `run()` time — spec's "dependency resolution runs twice;
//! if the required position changes, the declaration is circular".
//! Here that shows up as running the same deterministic sort at both
//! call sites and aborting if either produces an incomplete order
//! (a genuine cycle), rather than two passes disagreeing on a fixed
//! input, which a pure function never would.

use std::collections::{BTreeSet, HashSet};

/// A system's declared ordering constraint against another system in
/// the same pipeline, referenced by name.
#[derive(Debug, Clone)]
pub enum Dependency {
    Before(&'static str),
    After(&'static str),
}

/// Resolves `names[i]`'s dependencies into a linear order. Ties (systems
/// with no constraint between them) keep their original relative order
/// via a `BTreeSet` ready-set, so registration order still matters when
/// nothing says otherwise. Returns fewer than `names.len()` indices iff
/// the constraints are circular.
pub(crate) fn resolve_order(names: &[&'static str], deps: &[Vec<Dependency>]) -> Vec<usize> {
    let n = names.len();
    let mut before: Vec<HashSet<usize>> = vec![HashSet::new(); n];
    let mut indegree = vec![0usize; n];
    let index_of = |name: &str| names.iter().position(|&x| x == name);

    for (i, constraints) in deps.iter().enumerate() {
        for dep in constraints {
            let edge = match dep {
                Dependency::Before(target) => index_of(target).map(|j| (i, j)),
                Dependency::After(target) => index_of(target).map(|j| (j, i)),
            };
            if let Some((from, to)) = edge {
                if before[from].insert(to) {
                    indegree[to] += 1;
                }
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(&next) = ready.iter().next() {
        ready.remove(&next);
        order.push(next);
        for &succ in &before[next] {
            indegree[succ] -= 1;
            if indegree[succ] == 0 {
                ready.insert(succ);
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconstrained_systems_keep_registration_order() {
        let names = ["a", "b", "c"];
        let deps = vec![vec![], vec![], vec![]];
        assert_eq!(resolve_order(&names, &deps), vec![0, 1, 2]);
    }

    #[test]
    fn run_before_and_run_after_agree_regardless_of_declaration_order() {
        let names = ["a", "b"];
        let before_decl = vec![vec![Dependency::Before("b")], vec![]];
        let after_decl = vec![vec![], vec![Dependency::After("a")]];
        assert_eq!(resolve_order(&names, &before_decl), vec![0, 1]);
        assert_eq!(resolve_order(&names, &after_decl), vec![0, 1]);
    }

    #[test]
    fn circular_declaration_yields_an_incomplete_order() {
        let names = ["a", "b"];
        let deps = vec![vec![Dependency::Before("b")], vec![Dependency::Before("a")]];
        assert!(resolve_order(&names, &deps).len() < names.len());
    }
}
