//! Threshold evasion detection.
//!
//! Flags addresses whose outgoing transfers cluster just below a reporting
//! threshold. Per-transfer amounts are reconstructed from the aggregated
//! edges (edge mean replicated per transfer), so the band test works on
//! weighted counts rather than materialized amount lists.

use std::collections::HashSet;

use flowscan_core::canonical::{pattern_id, threshold_identity};
use flowscan_core::config::{DetectionConfig, ThresholdConfig};
use flowscan_core::error::Result;
use flowscan_core::pattern::{
    DetectionMethod, PatternInstance, PatternPayload, PatternType,
};
use tracing::debug;

use super::{Detector, RunContext};
use crate::types::{NodeId, TransferGraph};

const DAY_MS: i64 = 86_400_000;

/// Detector for threshold evasion patterns.
pub struct ThresholdDetector;

impl Detector for ThresholdDetector {
    fn name(&self) -> &'static str {
        "threshold"
    }

    fn detect(
        &self,
        graph: &TransferGraph,
        ctx: &RunContext,
        config: &DetectionConfig,
    ) -> Result<Vec<PatternInstance>> {
        let cfg = &config.threshold_detection;
        let mut patterns = Vec::new();

        for node in graph.nodes() {
            for tier in &cfg.tiers {
                if let Some(p) = analyze_node(graph, ctx, cfg, node, &tier.name, tier.value_usd)
                {
                    patterns.push(p);
                }
            }
        }

        debug!(patterns = patterns.len(), "threshold detection complete");
        Ok(patterns)
    }
}

fn analyze_node(
    graph: &TransferGraph,
    ctx: &RunContext,
    cfg: &ThresholdConfig,
    node: NodeId,
    threshold_type: &str,
    threshold_value: f64,
) -> Option<PatternInstance> {
    // (edge mean amount, transfer count, edge index) per outgoing edge.
    let mut buckets: Vec<(f64, u64, usize)> = Vec::new();
    let mut total_tx = 0u64;
    for &e in graph.out_edges(node) {
        let edge = graph.edge(e);
        if edge.tx_count == 0 {
            continue;
        }
        buckets.push((edge.avg_amount_usd(), edge.tx_count, e));
        total_tx += edge.tx_count;
    }
    if total_tx < cfg.min_transactions_near_threshold {
        return None;
    }

    let lower = threshold_value * cfg.near_threshold_lower_pct;
    let upper = threshold_value * cfg.near_threshold_upper_pct;
    let near: Vec<&(f64, u64, usize)> = buckets
        .iter()
        .filter(|(amount, _, _)| (lower..=upper).contains(amount))
        .collect();
    let near_count: u64 = near.iter().map(|(_, c, _)| c).sum();
    if near_count < cfg.min_transactions_near_threshold {
        return None;
    }

    let clustering_score = near_count as f64 / total_tx as f64;
    if clustering_score < cfg.clustering_score_threshold {
        return None;
    }

    // Weighted mean and deviation of the in-band amounts.
    let near_mean = near
        .iter()
        .map(|(a, c, _)| a * *c as f64)
        .sum::<f64>()
        / near_count as f64;
    let near_var = near
        .iter()
        .map(|(a, c, _)| (a - near_mean).powi(2) * *c as f64)
        .sum::<f64>()
        / near_count as f64;
    let cv = near_var.sqrt() / near_mean.max(1.0);
    let size_consistency = (1.0 - cv).max(0.0);
    if size_consistency < cfg.size_consistency_threshold {
        return None;
    }
    let max_size = near
        .iter()
        .map(|(a, _, _)| *a)
        .fold(f64::NEG_INFINITY, f64::max);

    let mut start_ms = i64::MAX;
    let mut end_ms = i64::MIN;
    let mut days: HashSet<i64> = HashSet::new();
    for (_, _, e) in &near {
        let edge = graph.edge(*e);
        start_ms = start_ms.min(edge.first_seen_ms);
        end_ms = end_ms.max(edge.last_seen_ms);
        days.insert(edge.first_seen_ms.div_euclid(DAY_MS));
        days.insert(edge.last_seen_ms.div_euclid(DAY_MS));
    }
    let unique_days = days.len() as u32;
    let temporal_spread_score =
        (f64::from(unique_days) / f64::from(ctx.partition.window_days)).min(1.0);

    let avoidance = (clustering_score * cfg.clustering_severity_weight
        + size_consistency * cfg.consistency_severity_weight
        + temporal_spread_score * cfg.temporal_severity_weight)
        .min(1.0);

    let address = graph.address(node).to_string();
    let hash = threshold_identity(&address, threshold_type, threshold_value);
    let id = pattern_id(PatternType::ThresholdEvasion, &hash);

    Some(PatternInstance {
        window_days: ctx.partition.window_days,
        processing_date: ctx.partition.processing_date,
        pattern_id: id,
        pattern_type: PatternType::ThresholdEvasion,
        pattern_hash: hash,
        addresses_involved: vec![address.clone()],
        address_roles: vec!["primary_address".to_string()],
        severity_score: avoidance,
        confidence_score: cfg.confidence_score,
        risk_score: (avoidance * cfg.risk_score_multiplier).min(1.0),
        anomaly_score: avoidance,
        pattern_start_ms: start_ms,
        pattern_end_ms: end_ms,
        pattern_duration_hours: PatternInstance::duration_hours(start_ms, end_ms),
        evidence_transaction_count: near_count,
        evidence_volume_usd: near_mean * near_count as f64,
        detection_method: DetectionMethod::TemporalAnalysis,
        version: 0,
        payload: PatternPayload::Threshold {
            primary_address: address,
            threshold_type: threshold_type.to_string(),
            threshold_value_usd: threshold_value,
            transactions_near_threshold: near_count,
            avg_transaction_size: near_mean,
            max_transaction_size: max_size,
            clustering_score,
            size_consistency,
            unique_days,
            temporal_spread_score,
            threshold_avoidance_score: avoidance,
        },
    })
}
