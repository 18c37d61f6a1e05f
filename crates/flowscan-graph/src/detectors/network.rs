//! Network pattern detection: anomalous SCCs and smurfing communities.
//!
//! Two variants share the network family. Strongly connected components
//! within the size band qualify directly; their size z-score against all
//! SCC sizes is kept as a reporting score. Weakly connected components in
//! the same band qualify as smurfing communities when enough of their
//! edges are small transfers, regardless of density.

use std::collections::HashSet;

use flowscan_core::canonical::{network_identity, pattern_id};
use flowscan_core::config::DetectionConfig;
use flowscan_core::error::Result;
use flowscan_core::pattern::{
    DetectionMethod, NetworkSubtype, PatternInstance, PatternPayload, PatternType,
};
use tracing::debug;

use super::{mean, std_dev, Detector, RunContext};
use crate::scc::{strongly_connected_components, weakly_connected_components};
use crate::types::{NodeId, TransferGraph};

/// Detector for network-based patterns: SCC analysis and smurfing networks.
pub struct NetworkDetector;

impl Detector for NetworkDetector {
    fn name(&self) -> &'static str {
        "network"
    }

    fn detect(
        &self,
        graph: &TransferGraph,
        ctx: &RunContext,
        config: &DetectionConfig,
    ) -> Result<Vec<PatternInstance>> {
        let mut patterns = Vec::new();
        let mut seen_ids: HashSet<String> = HashSet::new();

        self.analyze_sccs(graph, ctx, config, &mut seen_ids, &mut patterns);
        self.detect_smurfing(graph, ctx, config, &mut seen_ids, &mut patterns);

        debug!(patterns = patterns.len(), "network detection complete");
        Ok(patterns)
    }
}

impl NetworkDetector {
    fn analyze_sccs(
        &self,
        graph: &TransferGraph,
        ctx: &RunContext,
        config: &DetectionConfig,
        seen_ids: &mut HashSet<String>,
        patterns: &mut Vec<PatternInstance>,
    ) {
        let cfg = &config.network_analysis;
        let sccs = strongly_connected_components(graph);
        if sccs.is_empty() {
            return;
        }

        let sizes: Vec<f64> = sccs.iter().map(|s| s.len() as f64).collect();
        let mean_size = mean(&sizes);
        let std_size = std_dev(&sizes);

        for scc in &sccs {
            if scc.len() < cfg.min_scc_size || scc.len() > cfg.max_scc_size {
                continue;
            }

            // Reporting score only; qualification is the size band above.
            let anomaly_score = if std_size > 0.0 {
                let z = (scc.len() as f64 - mean_size).abs() / std_size;
                (z / cfg.z_score_normalization).min(1.0)
            } else {
                0.0
            };

            if let Some(p) = self.build_network_pattern(
                graph,
                ctx,
                config,
                scc,
                NetworkSubtype::AnomalousScc,
                anomaly_score,
                seen_ids,
            ) {
                patterns.push(p);
            }
        }
    }

    fn detect_smurfing(
        &self,
        graph: &TransferGraph,
        ctx: &RunContext,
        config: &DetectionConfig,
        seen_ids: &mut HashSet<String>,
        patterns: &mut Vec<PatternInstance>,
    ) {
        let cfg = &config.network_analysis;
        for component in weakly_connected_components(graph) {
            if component.len() < cfg.min_scc_size || component.len() > cfg.max_scc_size {
                continue;
            }
            if !self.is_smurfing(graph, config, &component) {
                continue;
            }
            let severity = self.smurfing_severity(graph, config, &component);
            if let Some(p) = self.build_network_pattern(
                graph,
                ctx,
                config,
                &component,
                NetworkSubtype::SmurfingCommunity,
                severity,
                seen_ids,
            ) {
                patterns.push(p);
            }
        }
    }

    fn is_smurfing(
        &self,
        graph: &TransferGraph,
        config: &DetectionConfig,
        members: &[NodeId],
    ) -> bool {
        let cfg = &config.network_analysis;
        let edges = internal_edges(graph, members);
        if edges.is_empty() {
            return false;
        }
        let small = edges
            .iter()
            .filter(|&&e| graph.edge(e).avg_amount_usd() < cfg.small_transaction_threshold)
            .count();
        small as f64 / edges.len() as f64 > cfg.small_tx_ratio_threshold
    }

    fn smurfing_severity(
        &self,
        graph: &TransferGraph,
        config: &DetectionConfig,
        members: &[NodeId],
    ) -> f64 {
        let cfg = &config.network_analysis;
        let size_factor = (members.len() as f64 / cfg.max_size_factor).min(1.0);
        let density_factor = (density(graph, members) / cfg.max_density_factor).min(1.0);
        size_factor * cfg.size_severity_weight + density_factor * cfg.density_severity_weight
    }

    #[allow(clippy::too_many_arguments)]
    fn build_network_pattern(
        &self,
        graph: &TransferGraph,
        ctx: &RunContext,
        config: &DetectionConfig,
        members: &[NodeId],
        subtype: NetworkSubtype,
        score: f64,
        seen_ids: &mut HashSet<String>,
    ) -> Option<PatternInstance> {
        let cfg = &config.network_analysis;
        let addrs: Vec<String> = members
            .iter()
            .map(|&n| graph.address(n).to_string())
            .collect();
        let (sorted_members, hash) = network_identity(&addrs);
        let id = pattern_id(PatternType::SmurfingNetwork, &hash);
        if !seen_ids.insert(id.clone()) {
            return None;
        }

        let edges = internal_edges(graph, members);
        let mut total_volume = 0.0;
        let mut tx_count = 0u64;
        let mut start_ms = i64::MAX;
        let mut end_ms = i64::MIN;
        for &e in &edges {
            let edge = graph.edge(e);
            total_volume += edge.amount_usd_sum;
            tx_count += edge.tx_count;
            start_ms = start_ms.min(edge.first_seen_ms);
            end_ms = end_ms.max(edge.last_seen_ms);
        }
        if edges.is_empty() {
            start_ms = ctx.partition.window_start_ms();
            end_ms = start_ms;
        }

        let hubs = identify_hubs(graph, members);
        let roles: Vec<String> = sorted_members
            .iter()
            .map(|addr| {
                if hubs.contains(addr) {
                    "hub".to_string()
                } else {
                    "participant".to_string()
                }
            })
            .collect();

        Some(PatternInstance {
            window_days: ctx.partition.window_days,
            processing_date: ctx.partition.processing_date,
            pattern_id: id,
            pattern_type: PatternType::SmurfingNetwork,
            pattern_hash: hash,
            addresses_involved: sorted_members.clone(),
            address_roles: roles,
            severity_score: score,
            confidence_score: cfg.confidence_score,
            risk_score: (score * cfg.risk_score_multiplier).min(1.0),
            anomaly_score: score,
            pattern_start_ms: start_ms,
            pattern_end_ms: end_ms,
            pattern_duration_hours: PatternInstance::duration_hours(start_ms, end_ms),
            evidence_transaction_count: tx_count,
            evidence_volume_usd: total_volume,
            detection_method: match subtype {
                NetworkSubtype::AnomalousScc => DetectionMethod::SccAnalysis,
                NetworkSubtype::SmurfingCommunity => DetectionMethod::NetworkAnalysis,
            },
            version: 0,
            payload: PatternPayload::Network {
                size: sorted_members.len(),
                density: density(graph, members),
                members: sorted_members,
                hub_addresses: hubs,
                subtype,
            },
        })
    }
}

fn internal_edges(graph: &TransferGraph, members: &[NodeId]) -> Vec<usize> {
    let set: HashSet<NodeId> = members.iter().copied().collect();
    let mut edges = Vec::new();
    for &n in members {
        for &e in graph.out_edges(n) {
            if set.contains(&graph.endpoints(e).1) {
                edges.push(e);
            }
        }
    }
    edges
}

/// Directed density: internal edges over `n * (n - 1)`.
fn density(graph: &TransferGraph, members: &[NodeId]) -> f64 {
    let n = members.len();
    if n <= 1 {
        return 0.0;
    }
    internal_edges(graph, members).len() as f64 / (n * (n - 1)) as f64
}

/// Top members by combined degree, one hub per five members, none for
/// components smaller than three.
fn identify_hubs(graph: &TransferGraph, members: &[NodeId]) -> Vec<String> {
    if members.len() < 3 {
        return Vec::new();
    }
    let mut by_degree: Vec<(NodeId, usize)> = members
        .iter()
        .map(|&n| (n, graph.in_degree(n) + graph.out_degree(n)))
        .collect();
    by_degree.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| graph.address(a.0).cmp(graph.address(b.0)))
    });
    let hub_count = (members.len() / 5).max(1);
    by_degree
        .into_iter()
        .take(hub_count)
        .map(|(n, _)| graph.address(n).to_string())
        .collect()
}
