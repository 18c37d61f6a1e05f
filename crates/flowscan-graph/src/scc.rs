//! Connected component analysis.
//!
//! Tarjan's algorithm in iterative form (explicit DFS frames, no recursion)
//! plus a weakly connected component pass over the undirected view. Both
//! return components in a deterministic order derived from node ids.

use crate::types::{NodeId, TransferGraph};

/// All strongly connected components, singletons included. Component member
/// lists are sorted by node id; components are ordered by their smallest
/// member.
#[must_use]
pub fn strongly_connected_components(graph: &TransferGraph) -> Vec<Vec<NodeId>> {
    let n = graph.node_count();
    let mut index = vec![usize::MAX; n];
    let mut lowlink = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<NodeId> = Vec::new();
    let mut next_index = 0usize;
    let mut components: Vec<Vec<NodeId>> = Vec::new();

    // DFS frame: node plus position in its out-edge list.
    let mut frames: Vec<(NodeId, usize)> = Vec::new();

    for start in 0..n {
        if index[start] != usize::MAX {
            continue;
        }
        frames.push((start, 0));

        while let Some(frame) = frames.last_mut() {
            let (v, pos) = (frame.0, frame.1);
            if pos == 0 {
                index[v] = next_index;
                lowlink[v] = next_index;
                next_index += 1;
                stack.push(v);
                on_stack[v] = true;
            }

            let out = graph.out_edges(v);
            if pos < out.len() {
                frame.1 += 1;
                let (_, w) = graph.endpoints(out[pos]);
                if index[w] == usize::MAX {
                    frames.push((w, 0));
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w]);
                }
            } else {
                if lowlink[v] == index[v] {
                    let mut component = Vec::new();
                    loop {
                        let w = stack.pop().expect("tarjan stack underflow");
                        on_stack[w] = false;
                        component.push(w);
                        if w == v {
                            break;
                        }
                    }
                    component.sort_unstable();
                    components.push(component);
                }
                frames.pop();
                if let Some(parent) = frames.last() {
                    let p = parent.0;
                    lowlink[p] = lowlink[p].min(lowlink[v]);
                }
            }
        }
    }

    components.sort_by_key(|c| c[0]);
    components
}

/// All weakly connected components (edge direction ignored), singletons
/// included, with the same ordering guarantees as the strong variant.
#[must_use]
pub fn weakly_connected_components(graph: &TransferGraph) -> Vec<Vec<NodeId>> {
    let n = graph.node_count();
    let mut visited = vec![false; n];
    let mut components = Vec::new();

    for start in 0..n {
        if visited[start] {
            continue;
        }
        let mut component = Vec::new();
        let mut queue = std::collections::VecDeque::from([start]);
        visited[start] = true;

        while let Some(v) = queue.pop_front() {
            component.push(v);
            let neighbors = graph
                .out_edges(v)
                .iter()
                .map(|&e| graph.endpoints(e).1)
                .chain(graph.in_edges(v).iter().map(|&e| graph.endpoints(e).0));
            for w in neighbors {
                if !visited[w] {
                    visited[w] = true;
                    queue.push_back(w);
                }
            }
        }

        component.sort_unstable();
        components.push(component);
    }

    components
}
