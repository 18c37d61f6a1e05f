//! Layering path detection.
//!
//! Searches for chains of intermediaries moving consistent volumes between
//! high-volume endpoints. Candidates are bounded three ways: a node-volume
//! percentile floor, caps on candidate sources and targets, and a global
//! budget on simple paths examined.

use std::collections::HashSet;

use flowscan_core::canonical::{path_identity, pattern_id};
use flowscan_core::config::DetectionConfig;
use flowscan_core::error::Result;
use flowscan_core::pattern::{
    DetectionMethod, PatternInstance, PatternPayload, PatternType,
};
use tracing::debug;

use super::{mean, percentile, std_dev, Detector, RunContext};
use crate::types::{NodeId, TransferGraph};

/// Detector for layering patterns in transaction flows.
pub struct LayeringDetector;

impl Detector for LayeringDetector {
    fn name(&self) -> &'static str {
        "layering"
    }

    fn detect(
        &self,
        graph: &TransferGraph,
        ctx: &RunContext,
        config: &DetectionConfig,
    ) -> Result<Vec<PatternInstance>> {
        let cfg = &config.path_analysis;
        if graph.is_empty() {
            return Ok(Vec::new());
        }

        let volumes: Vec<f64> = graph.nodes().map(|n| graph.total_volume(n)).collect();
        let floor = percentile(&volumes, cfg.high_volume_percentile);
        let mut candidates: Vec<NodeId> = graph
            .nodes()
            .filter(|&n| volumes[n] >= floor)
            .collect();
        // Highest volume first; address breaks ties so runs are stable.
        candidates.sort_by(|&a, &b| {
            volumes[b]
                .total_cmp(&volumes[a])
                .then_with(|| graph.address(a).cmp(graph.address(b)))
        });

        if candidates.len() < 2 {
            return Ok(Vec::new());
        }
        let sources = &candidates[..candidates.len().min(cfg.max_source_nodes)];
        let targets = &candidates[..candidates.len().min(cfg.max_target_nodes)];

        let mut patterns = Vec::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut paths_checked = 0usize;

        'outer: for &source in sources {
            for &target in targets {
                if source == target {
                    continue;
                }
                if paths_checked >= cfg.max_paths_to_check {
                    debug!(
                        budget = cfg.max_paths_to_check,
                        "path search budget exhausted"
                    );
                    break 'outer;
                }

                let mut path = vec![source];
                let mut on_path: HashSet<NodeId> = HashSet::from([source]);
                walk_paths(
                    graph,
                    target,
                    cfg.max_path_length,
                    cfg.max_paths_to_check,
                    &mut path,
                    &mut on_path,
                    &mut paths_checked,
                    &mut |full_path| {
                        if full_path.len() < cfg.min_path_length {
                            return;
                        }
                        if let Some(p) =
                            qualify_path(graph, ctx, config, full_path, &mut seen_ids)
                        {
                            patterns.push(p);
                        }
                    },
                );
            }
        }

        debug!(patterns = patterns.len(), paths_checked, "layering detection complete");
        Ok(patterns)
    }
}

/// Depth-first enumeration of simple paths ending at `target`, bounded by
/// node count and the global budget.
#[allow(clippy::too_many_arguments)]
fn walk_paths(
    graph: &TransferGraph,
    target: NodeId,
    max_nodes: usize,
    budget: usize,
    path: &mut Vec<NodeId>,
    on_path: &mut HashSet<NodeId>,
    checked: &mut usize,
    visit: &mut impl FnMut(&[NodeId]),
) {
    if *checked >= budget {
        return;
    }
    let current = *path.last().expect("path is never empty");
    for &edge_idx in graph.out_edges(current) {
        if *checked >= budget {
            return;
        }
        let (_, next) = graph.endpoints(edge_idx);
        if next == target {
            if path.len() + 1 <= max_nodes {
                *checked += 1;
                path.push(target);
                visit(path);
                path.pop();
            }
        } else if !on_path.contains(&next) && path.len() + 2 <= max_nodes {
            path.push(next);
            on_path.insert(next);
            walk_paths(graph, target, max_nodes, budget, path, on_path, checked, visit);
            on_path.remove(&next);
            path.pop();
        }
    }
}

fn qualify_path(
    graph: &TransferGraph,
    ctx: &RunContext,
    config: &DetectionConfig,
    path: &[NodeId],
    seen_ids: &mut HashSet<String>,
) -> Option<PatternInstance> {
    let cfg = &config.path_analysis;

    let mut hop_volumes = Vec::with_capacity(path.len() - 1);
    let mut tx_count = 0u64;
    let mut start_ms = i64::MAX;
    let mut end_ms = i64::MIN;
    for pair in path.windows(2) {
        let edge_idx = graph.edge_between(pair[0], pair[1])?;
        let edge = graph.edge(edge_idx);
        hop_volumes.push(edge.amount_usd_sum);
        tx_count += edge.tx_count;
        start_ms = start_ms.min(edge.first_seen_ms);
        end_ms = end_ms.max(edge.last_seen_ms);
    }

    let mean_volume = mean(&hop_volumes);
    if mean_volume < cfg.layering_min_volume {
        return None;
    }
    let cv = std_dev(&hop_volumes) / mean_volume.max(1.0);
    if cv >= cfg.layering_cv_threshold {
        return None;
    }

    let addrs: Vec<String> = path.iter().map(|&n| graph.address(n).to_string()).collect();
    let hash = path_identity(&addrs);
    let id = pattern_id(PatternType::LayeringPath, &hash);
    if !seen_ids.insert(id.clone()) {
        return None;
    }

    let mut roles = vec!["intermediary".to_string(); addrs.len()];
    roles[0] = "source".to_string();
    *roles.last_mut().expect("path has at least 3 nodes") = "destination".to_string();

    Some(PatternInstance {
        window_days: ctx.partition.window_days,
        processing_date: ctx.partition.processing_date,
        pattern_id: id,
        pattern_type: PatternType::LayeringPath,
        pattern_hash: hash,
        addresses_involved: addrs.clone(),
        address_roles: roles,
        severity_score: 0.7,
        confidence_score: cfg.confidence_score,
        risk_score: 0.7,
        anomaly_score: 0.0,
        pattern_start_ms: start_ms,
        pattern_end_ms: end_ms,
        pattern_duration_hours: PatternInstance::duration_hours(start_ms, end_ms),
        evidence_transaction_count: tx_count,
        evidence_volume_usd: hop_volumes.iter().sum(),
        detection_method: DetectionMethod::PathAnalysis,
        version: 0,
        payload: PatternPayload::Layering {
            depth: addrs.len(),
            volume_usd: mean_volume,
            source_address: addrs[0].clone(),
            destination_address: addrs[addrs.len() - 1].clone(),
            path: addrs,
        },
    })
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

    /// Config with the percentile floor disabled so small test graphs are
    /// fully searched.
    fn open_config() -> DetectionConfig {
        let mut config = DetectionConfig::default();
        config.path_analysis.high_volume_percentile = 0.0;
        config
    }

    #[test]
    fn test_consistent_chain_detected() {
        let g = graph(&[
            ("src", "m1", 1_000.0),
            ("m1", "m2", 1_000.0),
            ("m2", "dst", 1_000.0),
        ]);
        let patterns = LayeringDetector.detect(&g, &ctx(), &open_config()).unwrap();

        let chain = patterns
            .iter()
            .find(|p| match &p.payload {
                PatternPayload::Layering { depth, .. } => *depth == 4,
                _ => false,
            })
            .expect("4-node chain detected");
        match &chain.payload {
            PatternPayload::Layering {
                path,
                volume_usd,
                source_address,
                destination_address,
                ..
            } => {
                assert_eq!(path, &["src", "m1", "m2", "dst"]);
                assert_eq!(*volume_usd, 1_000.0);
                assert_eq!(source_address, "src");
                assert_eq!(destination_address, "dst");
            }
            _ => unreachable!(),
        }
        assert_eq!(
            chain.address_roles,
            vec!["source", "intermediary", "intermediary", "destination"]
        );
    }

    #[test]
    fn test_inconsistent_volumes_rejected() {
        // Final hop collapses to 5; CV is far above the threshold.
        let g = graph(&[
            ("src", "m1", 100.0),
            ("m1", "m2", 100.0),
            ("m2", "dst", 5.0),
        ]);
        let mut config = open_config();
        config.path_analysis.layering_min_volume = 1.0;
        let patterns = LayeringDetector.detect(&g, &ctx(), &config).unwrap();
        let depths: Vec<usize> = patterns
            .iter()
            .filter_map(|p| match &p.payload {
                PatternPayload::Layering { depth, .. } => Some(*depth),
                _ => None,
            })
            .collect();
        assert!(!depths.contains(&4), "inconsistent chain must not qualify");
    }

    #[test]
    fn test_min_volume_floor() {
        // Consistent but tiny volumes stay below the default floor.
        let g = graph(&[
            ("src", "m1", 10.0),
            ("m1", "m2", 10.0),
            ("m2", "dst", 10.0),
        ]);
        let patterns = LayeringDetector.detect(&g, &ctx(), &open_config()).unwrap();
        assert!(patterns.is_empty());
    }

    #[test]
    fn test_percentile_floor_prunes_low_volume_nodes() {
        // One dominant chain plus low-volume noise; with the default 90th
        // percentile floor only the top nodes seed the search, and the
        // noise chain endpoints never qualify as candidates.
        let mut edges = vec![
            ("src", "m1", 50_000.0),
            ("m1", "m2", 50_000.0),
            ("m2", "dst", 50_000.0),
        ];
        for i in 0..20 {
            let from = format!("noise{i}");
            edges.push((Box::leak(from.into_boxed_str()), "sink", 1.0));
        }
        let g = graph(&edges);
        let patterns = LayeringDetector
            .detect(&g, &ctx(), &DetectionConfig::default())
            .unwrap();
        assert!(patterns
            .iter()
            .all(|p| !p.addresses_involved.iter().any(|a| a.starts_with("noise"))));
    }

    #[test]
    fn test_empty_graph() {
        let g = graph(&[]);
        let patterns = LayeringDetector
            .detect(&g, &ctx(), &DetectionConfig::default())
            .unwrap();
        assert!(patterns.is_empty());
    }
}
