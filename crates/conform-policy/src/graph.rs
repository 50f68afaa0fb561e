use std::collections::BTreeSet;

use conform_domain::{Dependency, ResourceId};
use conform_resource::Resource;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::error::PolicyError;

/// Topological order of `resources` under `deps`: for every edge
/// "A depends on B", B is placed before A. Ties are broken by insertion
/// order, so the result is deterministic.
pub fn order(resources: &[Resource], deps: &[Dependency]) -> Result<Vec<usize>, PolicyError> {
    let ids: Vec<ResourceId> = resources.iter().map(|r| r.id()).collect();
    let index_of = |id: &ResourceId| ids.iter().position(|i| i == id);

    // provider → dependent, so Kahn emits providers first
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..resources.len()).map(|i| graph.add_node(i)).collect();

    for dep in deps {
        let dependent = index_of(&dep.dependent)
            .ok_or_else(|| PolicyError::UnknownDependency(dep.dependent.clone()))?;
        let provider = index_of(&dep.provider)
            .ok_or_else(|| PolicyError::UnknownDependency(dep.provider.clone()))?;
        graph.add_edge(nodes[provider], nodes[dependent], ());
    }

    let mut indegree: Vec<usize> = nodes
        .iter()
        .map(|n| graph.neighbors_directed(*n, Direction::Incoming).count())
        .collect();

    let mut ready: BTreeSet<usize> = indegree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| i)
        .collect();

    let mut sorted = Vec::with_capacity(resources.len());
    while let Some(&next) = ready.iter().next() {
        ready.remove(&next);
        sorted.push(next);
        for succ in graph.neighbors(nodes[next]) {
            let j = graph[succ];
            indegree[j] -= 1;
            if indegree[j] == 0 {
                ready.insert(j);
            }
        }
    }

    if sorted.len() != resources.len() {
        return Err(PolicyError::CyclicDependency(name_cycle(&graph, &ids, &sorted)));
    }

    Ok(sorted)
}

/// Extract one concrete cycle from the nodes Kahn could not emit.
fn name_cycle(graph: &DiGraph<usize, ()>, ids: &[ResourceId], sorted: &[usize]) -> Vec<ResourceId> {
    let remaining: BTreeSet<usize> = (0..ids.len()).filter(|i| !sorted.contains(i)).collect();
    let Some(&start) = remaining.iter().next() else {
        return Vec::new();
    };

    // every remaining node has a predecessor among the remaining nodes, so
    // walking backwards must revisit one within |remaining| + 1 steps
    let mut path = vec![start];
    let mut current = start;
    loop {
        let pred = graph
            .node_indices()
            .find(|n| graph[*n] == current)
            .and_then(|n| {
                graph
                    .neighbors_directed(n, Direction::Incoming)
                    .map(|p| graph[p])
                    .find(|p| remaining.contains(p))
            });
        let Some(pred) = pred else {
            break;
        };
        if let Some(pos) = path.iter().position(|&p| p == pred) {
            let mut cycle: Vec<ResourceId> = path[pos..].iter().rev().map(|&i| ids[i].clone()).collect();
            if let Some(first) = cycle.first().cloned() {
                cycle.push(first);
            }
            return cycle;
        }
        path.push(pred);
        current = pred;
    }

    path.into_iter().map(|i| ids[i].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use conform_domain::ResourceKind;

    fn res(kind: ResourceKind, key: &str) -> Resource {
        Resource::new(kind, key)
    }

    fn dep(dependent: &Resource, provider: &Resource) -> Dependency {
        Dependency::new(dependent.id(), provider.id())
    }

    #[test]
    fn providers_come_before_dependents() {
        let user = res(ResourceKind::User, "web");
        let dir = res(ResourceKind::Dir, "/srv/www");
        let file = res(ResourceKind::File, "/srv/www/index.html");

        let deps = vec![dep(&file, &dir), dep(&file, &user), dep(&dir, &user)];
        let resources = vec![file, dir, user];

        let order = order(&resources, &deps).unwrap();
        let keys: Vec<&str> = order.iter().map(|&i| resources[i].key()).collect();
        assert_eq!(keys, ["web", "/srv/www", "/srv/www/index.html"]);
    }

    #[test]
    fn unrelated_resources_keep_insertion_order() {
        let resources = vec![
            res(ResourceKind::Package, "nginx"),
            res(ResourceKind::User, "alice"),
            res(ResourceKind::Sysctl, "vm.swappiness"),
        ];

        let order = order(&resources, &[]).unwrap();
        assert_eq!(order, [0, 1, 2]);
    }

    #[test]
    fn cycles_are_rejected_and_named() {
        let a = res(ResourceKind::Service, "a");
        let b = res(ResourceKind::Service, "b");
        let deps = vec![dep(&a, &b), dep(&b, &a)];
        let resources = vec![a, b];

        let err = order(&resources, &deps).unwrap_err();
        match err {
            PolicyError::CyclicDependency(cycle) => {
                assert!(cycle.len() >= 2, "cycle should name its members: {:?}", cycle);
                assert_eq!(cycle.first(), cycle.last(), "cycle should close on itself");
            }
            other => panic!("expected CyclicDependency, got {:?}", other),
        }
    }

    #[test]
    fn unknown_dependency_endpoints_are_rejected() {
        let a = res(ResourceKind::Service, "a");
        let ghost = res(ResourceKind::Service, "ghost");
        let deps = vec![dep(&a, &ghost)];
        let resources = vec![a];

        assert!(matches!(
            order(&resources, &deps),
            Err(PolicyError::UnknownDependency(_))
        ));
    }

    #[test]
    fn every_edge_is_respected() {
        // a chain plus a diamond
        let r: Vec<Resource> = ["a", "b", "c", "d"]
            .iter()
            .map(|k| res(ResourceKind::Package, k))
            .collect();
        let deps = vec![dep(&r[3], &r[1]), dep(&r[3], &r[2]), dep(&r[1], &r[0]), dep(&r[2], &r[0])];

        let order = order(&r, &deps).unwrap();
        let pos = |i: usize| order.iter().position(|&x| x == i).unwrap();
        assert!(pos(0) < pos(1));
        assert!(pos(0) < pos(2));
        assert!(pos(1) < pos(3));
        assert!(pos(2) < pos(3));
    }
}
