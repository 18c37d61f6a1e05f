//! Circular fund-flow detection.
//!
//! Elementary cycles are enumerated per strongly connected component with a
//! bounded DFS: within an SCC, a cycle is discovered only from its smallest
//! node id, so every cycle is produced exactly once. Enumeration stops at
//! the per-SCC cap and prunes at the maximum cycle length.

use std::collections::HashSet;

use flowscan_core::canonical::cycle_identity;
use flowscan_core::config::DetectionConfig;
use flowscan_core::error::Result;
use flowscan_core::pattern::{
    DetectionMethod, PatternInstance, PatternPayload, PatternType,
};
use tracing::debug;

use super::{Detector, RunContext};
use crate::scc::strongly_connected_components;
use crate::types::{NodeId, TransferGraph};

/// Detector for circular transaction patterns.
pub struct CycleDetector;

impl Detector for CycleDetector {
    fn name(&self) -> &'static str {
        "cycle"
    }

    fn detect(
        &self,
        graph: &TransferGraph,
        ctx: &RunContext,
        config: &DetectionConfig,
    ) -> Result<Vec<PatternInstance>> {
        let cfg = &config.cycle_detection;
        let mut patterns = Vec::new();
        let mut seen_ids: HashSet<String> = HashSet::new();

        for scc in strongly_connected_components(graph) {
            if scc.len() < 2 {
                continue;
            }
            let members: HashSet<NodeId> = scc.iter().copied().collect();
            let mut cycles = Vec::new();
            enumerate_cycles(
                graph,
                &members,
                &scc,
                cfg.min_cycle_length,
                cfg.max_cycle_length,
                cfg.max_cycles_per_scc,
                &mut cycles,
            );
            if cycles.len() >= cfg.max_cycles_per_scc {
                debug!(
                    scc_size = scc.len(),
                    cap = cfg.max_cycles_per_scc,
                    "cycle enumeration capped for component"
                );
            }

            for cycle in cycles {
                let addrs: Vec<String> = cycle
                    .iter()
                    .map(|&n| graph.address(n).to_string())
                    .collect();
                let (canonical_path, hash) = cycle_identity(&addrs);
                let pattern_id =
                    flowscan_core::canonical::pattern_id(PatternType::Cycle, &hash);
                if !seen_ids.insert(pattern_id.clone()) {
                    continue;
                }

                let mut bottleneck = f64::INFINITY;
                let mut total_volume = 0.0;
                let mut tx_count = 0u64;
                let mut start_ms = i64::MAX;
                let mut end_ms = i64::MIN;
                for i in 0..cycle.len() {
                    let from = cycle[i];
                    let to = cycle[(i + 1) % cycle.len()];
                    // Every consecutive pair has an edge: the cycle was
                    // discovered by walking them.
                    if let Some(edge_idx) = graph.edge_between(from, to) {
                        let edge = graph.edge(edge_idx);
                        bottleneck = bottleneck.min(edge.amount_usd_sum);
                        total_volume += edge.amount_usd_sum;
                        tx_count += edge.tx_count;
                        start_ms = start_ms.min(edge.first_seen_ms);
                        end_ms = end_ms.max(edge.last_seen_ms);
                    }
                }
                if !bottleneck.is_finite() {
                    continue;
                }

                let length = canonical_path.len();
                patterns.push(PatternInstance {
                    window_days: ctx.partition.window_days,
                    processing_date: ctx.partition.processing_date,
                    pattern_id,
                    pattern_type: PatternType::Cycle,
                    pattern_hash: hash,
                    addresses_involved: canonical_path.clone(),
                    address_roles: vec!["cycle_member".to_string(); length],
                    severity_score: 0.8,
                    confidence_score: cfg.confidence_score,
                    risk_score: 0.8,
                    anomaly_score: 0.0,
                    pattern_start_ms: start_ms,
                    pattern_end_ms: end_ms,
                    pattern_duration_hours: PatternInstance::duration_hours(start_ms, end_ms),
                    evidence_transaction_count: tx_count,
                    evidence_volume_usd: total_volume,
                    detection_method: DetectionMethod::CycleDetection,
                    version: 0,
                    payload: PatternPayload::Cycle {
                        path: canonical_path,
                        length,
                        bottleneck_volume_usd: bottleneck,
                    },
                });
            }
        }

        debug!(patterns = patterns.len(), "cycle detection complete");
        Ok(patterns)
    }
}

/// Enumerate elementary cycles inside one SCC, anchored at each node in
/// ascending id order and restricted to larger ids beyond the anchor.
fn enumerate_cycles(
    graph: &TransferGraph,
    members: &HashSet<NodeId>,
    scc: &[NodeId],
    min_len: usize,
    max_len: usize,
    cap: usize,
    out: &mut Vec<Vec<NodeId>>,
) {
    for &start in scc {
        if out.len() >= cap {
            return;
        }
        let mut path = vec![start];
        let mut on_path: HashSet<NodeId> = HashSet::from([start]);
        let mut frames: Vec<(NodeId, usize)> = vec![(start, 0)];

        while let Some(frame) = frames.last_mut() {
            let (v, pos) = (frame.0, frame.1);
            let edges = graph.out_edges(v);
            if pos < edges.len() {
                frame.1 += 1;
                let (_, w) = graph.endpoints(edges[pos]);
                if w == start {
                    if path.len() >= min_len && path.len() <= max_len {
                        out.push(path.clone());
                        if out.len() >= cap {
                            return;
                        }
                    }
                } else if w > start
                    && members.contains(&w)
                    && !on_path.contains(&w)
                    && path.len() < max_len
                {
                    path.push(w);
                    on_path.insert(w);
                    frames.push((w, 0));
                }
            } else {
                frames.pop();
                on_path.remove(&v);
                path.pop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransferEdge;
    use chrono::NaiveDate;
    use flowscan_core::store::Partition;

    fn ctx() -> RunContext {
        RunContext {
            partition: Partition::new(
                "ethereum",
                7,
                NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            ),
            risk_sources: Vec::new(),
        }
    }

    fn graph(edges: &[(&str, &str, f64)]) -> TransferGraph {
        TransferGraph::from_edges(
            edges
                .iter()
                .map(|(f, t, v)| TransferEdge::new(*f, *t, 1, *v, 0, 3_600_000))
                .collect(),
        )
    }

    #[test]
    fn test_three_node_cycle_bottleneck() {
        let g = graph(&[("a", "b", 100.0), ("b", "c", 50.0), ("c", "a", 80.0)]);
        let patterns = CycleDetector
            .detect(&g, &ctx(), &DetectionConfig::default())
            .unwrap();

        assert_eq!(patterns.len(), 1);
        let p = &patterns[0];
        match &p.payload {
            PatternPayload::Cycle {
                path,
                length,
                bottleneck_volume_usd,
            } => {
                assert_eq!(*length, 3);
                assert_eq!(*bottleneck_volume_usd, 50.0);
                assert_eq!(path[0], "a");
            }
            other => panic!("unexpected payload: {other:?}"),
        }
        assert_eq!(p.evidence_volume_usd, 230.0);
    }

    #[test]
    fn test_cycle_found_once_regardless_of_entry() {
        // Two cycles sharing node b: a->b->a would be too short (len 2 < 3),
        // so only the 3-cycle qualifies, exactly once.
        let g = graph(&[
            ("a", "b", 10.0),
            ("b", "c", 10.0),
            ("c", "a", 10.0),
            ("b", "a", 10.0),
        ]);
        let patterns = CycleDetector
            .detect(&g, &ctx(), &DetectionConfig::default())
            .unwrap();
        assert_eq!(patterns.len(), 1);
    }

    #[test]
    fn test_length_bounds_respected() {
        // 2-cycle only; default minimum is 3.
        let g = graph(&[("a", "b", 10.0), ("b", "a", 10.0)]);
        let patterns = CycleDetector
            .detect(&g, &ctx(), &DetectionConfig::default())
            .unwrap();
        assert!(patterns.is_empty());

        let mut config = DetectionConfig::default();
        config.cycle_detection.min_cycle_length = 2;
        let patterns = CycleDetector.detect(&g, &ctx(), &config).unwrap();
        assert_eq!(patterns.len(), 1);
    }

    #[test]
    fn test_dag_has_no_cycles() {
        let g = graph(&[("a", "b", 10.0), ("b", "c", 10.0), ("a", "c", 10.0)]);
        let patterns = CycleDetector
            .detect(&g, &ctx(), &DetectionConfig::default())
            .unwrap();
        assert!(patterns.is_empty());
    }

    #[test]
    fn test_per_scc_cap() {
        // Complete directed graph on 4 nodes has many 3- and 4-cycles.
        let names = ["a", "b", "c", "d"];
        let mut edges = Vec::new();
        for f in names {
            for t in names {
                if f != t {
                    edges.push((f, t, 10.0));
                }
            }
        }
        let g = graph(&edges);

        let mut config = DetectionConfig::default();
        config.cycle_detection.max_cycles_per_scc = 3;
        let patterns = CycleDetector.detect(&g, &ctx(), &config).unwrap();
        assert_eq!(patterns.len(), 3);
    }

    #[test]
    fn test_empty_graph() {
        let g = graph(&[]);
        let patterns = CycleDetector
            .detect(&g, &ctx(), &DetectionConfig::default())
            .unwrap();
        assert!(patterns.is_empty());
    }
}
