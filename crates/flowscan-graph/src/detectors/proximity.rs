//! Proximity-to-risk detection.
//!
//! Every address within `max_distance` undirected hops of a risk source
//! gets one pattern carrying its minimum distance and the nearest source.
//! Risk sources come from the run context; when the label set is empty the
//! detector falls back to a volume/degree heuristic over the graph itself.

use std::collections::VecDeque;

use flowscan_core::canonical::{pattern_id, proximity_identity};
use flowscan_core::config::DetectionConfig;
use flowscan_core::error::Result;
use flowscan_core::pattern::{
    DetectionMethod, PatternInstance, PatternPayload, PatternType,
};
use tracing::debug;

use super::{Detector, RunContext};
use crate::types::{NodeId, TransferGraph};

/// Detector for proximity-based risk patterns.
pub struct ProximityDetector;

impl Detector for ProximityDetector {
    fn name(&self) -> &'static str {
        "proximity"
    }

    fn detect(
        &self,
        graph: &TransferGraph,
        ctx: &RunContext,
        config: &DetectionConfig,
    ) -> Result<Vec<PatternInstance>> {
        let cfg = &config.proximity_analysis;
        if graph.is_empty() {
            return Ok(Vec::new());
        }

        let mut sources: Vec<NodeId> = ctx
            .risk_sources
            .iter()
            .filter_map(|addr| graph.node_id(addr))
            .collect();
        if sources.is_empty() {
            sources = heuristic_risk_nodes(graph, config);
            if !sources.is_empty() {
                debug!(
                    sources = sources.len(),
                    "no labeled risk sources; using volume/degree heuristic"
                );
            }
        }
        if sources.is_empty() {
            return Ok(Vec::new());
        }
        // Lexicographic source order decides ties when two sources are
        // equally near an address.
        sources.sort_by(|&a, &b| graph.address(a).cmp(graph.address(b)));
        sources.dedup();

        // nearest[n] = (distance, source) for the closest source seen so far.
        let mut nearest: Vec<Option<(u32, NodeId)>> = vec![None; graph.node_count()];
        for &source in &sources {
            bfs_from(graph, source, cfg.max_distance, &mut nearest);
        }

        let mut patterns = Vec::new();
        for node in graph.nodes() {
            let Some((distance, source)) = nearest[node] else {
                continue;
            };
            if distance == 0 || sources.contains(&node) {
                continue;
            }

            let address = graph.address(node).to_string();
            let source_addr = graph.address(source).to_string();
            let hash = proximity_identity(&address, &source_addr);
            let id = pattern_id(PatternType::ProximityRisk, &hash);

            let propagation = 1.0 / f64::from(distance + 1);
            let severity = propagation * cfg.base_severity;

            let incident = graph
                .in_edges(node)
                .iter()
                .chain(graph.out_edges(node).iter());
            let mut start_ms = i64::MAX;
            let mut end_ms = i64::MIN;
            for &e in incident {
                let edge = graph.edge(e);
                start_ms = start_ms.min(edge.first_seen_ms);
                end_ms = end_ms.max(edge.last_seen_ms);
            }

            patterns.push(PatternInstance {
                window_days: ctx.partition.window_days,
                processing_date: ctx.partition.processing_date,
                pattern_id: id,
                pattern_type: PatternType::ProximityRisk,
                pattern_hash: hash,
                addresses_involved: vec![source_addr.clone(), address.clone()],
                address_roles: vec!["risk_source".to_string(), "suspect".to_string()],
                severity_score: severity,
                confidence_score: cfg.confidence_score,
                risk_score: severity,
                anomaly_score: severity,
                pattern_start_ms: start_ms,
                pattern_end_ms: end_ms,
                pattern_duration_hours: PatternInstance::duration_hours(start_ms, end_ms),
                evidence_transaction_count: (graph.in_degree(node) + graph.out_degree(node))
                    as u64,
                evidence_volume_usd: graph.total_volume(node),
                detection_method: DetectionMethod::ProximityAnalysis,
                version: 0,
                payload: PatternPayload::Proximity {
                    risk_source_address: source_addr,
                    distance_to_risk: distance,
                    risk_propagation_score: propagation,
                },
            });
        }

        debug!(patterns = patterns.len(), "proximity detection complete");
        Ok(patterns)
    }
}

/// Undirected BFS from one source, improving the per-node nearest record.
/// An equal distance never replaces an earlier source.
fn bfs_from(
    graph: &TransferGraph,
    source: NodeId,
    max_distance: u32,
    nearest: &mut [Option<(u32, NodeId)>],
) {
    let mut distance = vec![u32::MAX; graph.node_count()];
    distance[source] = 0;
    let mut queue = VecDeque::from([source]);

    while let Some(v) = queue.pop_front() {
        let d = distance[v];
        if d >= max_distance {
            continue;
        }
        let neighbors = graph
            .out_edges(v)
            .iter()
            .map(|&e| graph.endpoints(e).1)
            .chain(graph.in_edges(v).iter().map(|&e| graph.endpoints(e).0));
        for w in neighbors {
            if distance[w] == u32::MAX {
                distance[w] = d + 1;
                queue.push_back(w);
                if nearest[w].map_or(true, |(best, _)| d + 1 < best) {
                    nearest[w] = Some((d + 1, source));
                }
            }
        }
    }
}

/// Fallback risk identification: high total volume combined with high
/// degree.
fn heuristic_risk_nodes(graph: &TransferGraph, config: &DetectionConfig) -> Vec<NodeId> {
    let cfg = &config.proximity_analysis;
    graph
        .nodes()
        .filter(|&n| {
            graph.total_volume(n) > cfg.high_volume_threshold
                && graph.in_degree(n) + graph.out_degree(n) > cfg.high_degree_threshold
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransferEdge;
    use chrono::NaiveDate;
    use flowscan_core::store::Partition;

    fn ctx_with_risk(risk: &[&str]) -> RunContext {
        RunContext {
            partition: Partition::new(
                "ethereum",
                7,
                NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            ),
            risk_sources: risk.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    fn chain(names: &[&str]) -> TransferGraph {
        TransferGraph::from_edges(
            names
                .windows(2)
                .map(|w| TransferEdge::new(w[0], w[1], 1, 100.0, 0, 3_600_000))
                .collect(),
        )
    }

    fn payload(p: &PatternInstance) -> (&str, u32, f64) {
        match &p.payload {
            PatternPayload::Proximity {
                risk_source_address,
                distance_to_risk,
                risk_propagation_score,
            } => (risk_source_address, *distance_to_risk, *risk_propagation_score),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_decay_by_distance() {
        let g = chain(&["risk", "one", "two"]);
        let patterns = ProximityDetector
            .detect(&g, &ctx_with_risk(&["risk"]), &DetectionConfig::default())
            .unwrap();
        assert_eq!(patterns.len(), 2);

        let one = patterns
            .iter()
            .find(|p| p.addresses_involved[1] == "one")
            .unwrap();
        let two = patterns
            .iter()
            .find(|p| p.addresses_involved[1] == "two")
            .unwrap();
        assert_eq!(payload(one), ("risk", 1, 0.5));
        let (_, d, score) = payload(two);
        assert_eq!(d, 2);
        assert!((score - 1.0 / 3.0).abs() < 1e-12);
        assert!((one.severity_score - 0.5 * 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_max_distance_cutoff() {
        // 8-node chain: the last node sits 7 hops out, beyond the default
        // max distance of 6.
        let names = ["risk", "n1", "n2", "n3", "n4", "n5", "n6", "n7"];
        let g = chain(&names);
        let patterns = ProximityDetector
            .detect(&g, &ctx_with_risk(&["risk"]), &DetectionConfig::default())
            .unwrap();
        assert_eq!(patterns.len(), 6);
        assert!(!patterns.iter().any(|p| p.addresses_involved[1] == "n7"));
    }

    #[test]
    fn test_direction_ignored() {
        // Edge points toward the risk source; proximity still propagates.
        let g = TransferGraph::from_edges(vec![TransferEdge::new(
            "suspect", "risk", 1, 100.0, 0, 3_600_000,
        )]);
        let patterns = ProximityDetector
            .detect(&g, &ctx_with_risk(&["risk"]), &DetectionConfig::default())
            .unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(payload(&patterns[0]).1, 1);
    }

    #[test]
    fn test_tie_breaks_to_lexicographically_first_source() {
        // "alpha" and "zeta" are both one hop from "mid".
        let g = TransferGraph::from_edges(vec![
            TransferEdge::new("alpha", "mid", 1, 100.0, 0, 3_600_000),
            TransferEdge::new("zeta", "mid", 1, 100.0, 0, 3_600_000),
        ]);
        let patterns = ProximityDetector
            .detect(
                &g,
                &ctx_with_risk(&["zeta", "alpha"]),
                &DetectionConfig::default(),
            )
            .unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(payload(&patterns[0]).0, "alpha");
    }

    #[test]
    fn test_heuristic_fallback_when_unlabeled() {
        // A high-volume, high-degree hub plays risk source when no labels
        // are supplied.
        let mut edges = Vec::new();
        for i in 0..12 {
            edges.push(TransferEdge::new(
                format!("n{i:02}"),
                "hub",
                1,
                20_000.0,
                0,
                3_600_000,
            ));
        }
        let g = TransferGraph::from_edges(edges);
        let patterns = ProximityDetector
            .detect(&g, &ctx_with_risk(&[]), &DetectionConfig::default())
            .unwrap();
        assert!(!patterns.is_empty());
        assert!(patterns.iter().all(|p| p.addresses_involved[0] == "hub"));
    }

    #[test]
    fn test_no_sources_no_patterns() {
        let g = chain(&["a", "b"]);
        let patterns = ProximityDetector
            .detect(&g, &ctx_with_risk(&[]), &DetectionConfig::default())
            .unwrap();
        assert!(patterns.is_empty());
    }
}
