//! Temporal burst detection.
//!
//! Builds a per-address hourly transfer-count histogram from the edge
//! histograms and flags maximal runs of hours whose counts stand out from
//! the address's own baseline. Edges without histograms contribute nothing;
//! when no edge in the graph carries one, the detector logs a warning and
//! returns nothing, a degraded mode rather than an error.

use flowscan_core::canonical::{burst_identity, pattern_id};
use flowscan_core::config::DetectionConfig;
use flowscan_core::error::Result;
use flowscan_core::pattern::{
    DetectionMethod, PatternInstance, PatternPayload, PatternType,
};
use tracing::{debug, warn};

use super::{mean, std_dev, Detector, RunContext};
use crate::types::{NodeId, TransferGraph};

const HOUR_MS: i64 = 3_600_000;

/// Detector for temporal burst patterns.
pub struct BurstDetector;

impl Detector for BurstDetector {
    fn name(&self) -> &'static str {
        "burst"
    }

    fn detect(
        &self,
        graph: &TransferGraph,
        ctx: &RunContext,
        config: &DetectionConfig,
    ) -> Result<Vec<PatternInstance>> {
        let cfg = &config.burst_detection;
        if graph.is_empty() {
            return Ok(Vec::new());
        }
        if !(0..graph.edge_count()).any(|e| graph.edge(e).hourly_tx_counts.is_some()) {
            warn!("no edge carries hourly counts; burst detection skipped");
            return Ok(Vec::new());
        }

        let window_start_ms = ctx.partition.window_start_ms();
        let mut patterns = Vec::new();

        for node in graph.nodes() {
            let histogram = address_histogram(graph, node);
            if histogram.is_empty() {
                continue;
            }
            let counts: Vec<f64> = histogram.iter().map(|&c| f64::from(c)).collect();
            let base_mean = mean(&counts);
            let base_std = std_dev(&counts);
            if base_std <= 0.0 {
                continue;
            }

            for run in burst_runs(&counts, base_mean, base_std, cfg.z_score_threshold) {
                let (start_hour, end_hour) = run;
                let run_len = end_hour - start_hour;
                let burst_tx: f64 = counts[start_hour..end_hour].iter().sum();
                if burst_tx < cfg.min_burst_transactions as f64
                    || run_len < cfg.min_burst_hours
                {
                    continue;
                }

                let burst_rate = burst_tx / run_len as f64;
                let outside: Vec<f64> = counts[..start_hour]
                    .iter()
                    .chain(counts[end_hour..].iter())
                    .copied()
                    .collect();
                let normal_rate = mean(&outside);
                let intensity = if normal_rate > 0.0 {
                    burst_rate / normal_rate
                } else {
                    burst_rate
                };
                if intensity < cfg.min_burst_intensity {
                    continue;
                }
                let z_score = (burst_rate - base_mean) / base_std;

                let address = graph.address(node).to_string();
                let burst_start_ms = window_start_ms + start_hour as i64 * HOUR_MS;
                let burst_end_ms = window_start_ms + end_hour as i64 * HOUR_MS;
                let hash = burst_identity(&address, burst_start_ms, burst_end_ms);
                let id = pattern_id(PatternType::TemporalBurst, &hash);

                // Volume attributed to the burst in proportion to its share
                // of the address's transfers.
                let total_tx: f64 = counts.iter().sum();
                let burst_volume = if total_tx > 0.0 {
                    graph.total_volume(node) * (burst_tx / total_tx)
                } else {
                    0.0
                };

                let severity = burst_severity(cfg, intensity, burst_volume, z_score);

                patterns.push(PatternInstance {
                    window_days: ctx.partition.window_days,
                    processing_date: ctx.partition.processing_date,
                    pattern_id: id,
                    pattern_type: PatternType::TemporalBurst,
                    pattern_hash: hash,
                    addresses_involved: vec![address.clone()],
                    address_roles: vec!["burst_source".to_string()],
                    severity_score: severity,
                    confidence_score: cfg.confidence_score,
                    risk_score: (severity * cfg.risk_score_multiplier).min(1.0),
                    anomaly_score: severity,
                    pattern_start_ms: burst_start_ms,
                    pattern_end_ms: burst_end_ms,
                    pattern_duration_hours: run_len as i64,
                    evidence_transaction_count: burst_tx as u64,
                    evidence_volume_usd: burst_volume,
                    detection_method: DetectionMethod::TemporalAnalysis,
                    version: 0,
                    payload: PatternPayload::Burst {
                        address,
                        burst_start_ms,
                        burst_end_ms,
                        normal_tx_rate: normal_rate,
                        burst_tx_rate: burst_rate,
                        burst_intensity: intensity,
                        z_score,
                        hourly_distribution: histogram.clone(),
                    },
                });
            }
        }

        debug!(patterns = patterns.len(), "burst detection complete");
        Ok(patterns)
    }
}

/// Per-address hourly counts summed over every incident edge histogram.
fn address_histogram(graph: &TransferGraph, node: NodeId) -> Vec<u32> {
    let mut histogram: Vec<u32> = Vec::new();
    let incident = graph
        .in_edges(node)
        .iter()
        .chain(graph.out_edges(node).iter());
    for &e in incident {
        if let Some(counts) = &graph.edge(e).hourly_tx_counts {
            if counts.len() > histogram.len() {
                histogram.resize(counts.len(), 0);
            }
            for (i, c) in counts.iter().enumerate() {
                histogram[i] += c;
            }
        }
    }
    histogram
}

/// Maximal runs of consecutive hours whose z-score exceeds the threshold,
/// as half-open `(start, end)` hour indices.
fn burst_runs(
    counts: &[f64],
    base_mean: f64,
    base_std: f64,
    z_threshold: f64,
) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut run_start: Option<usize> = None;
    for (i, &count) in counts.iter().enumerate() {
        let z = (count - base_mean) / base_std;
        if z > z_threshold {
            run_start.get_or_insert(i);
        } else if let Some(start) = run_start.take() {
            runs.push((start, i));
        }
    }
    if let Some(start) = run_start {
        runs.push((start, counts.len()));
    }
    runs
}

fn burst_severity(
    cfg: &flowscan_core::config::BurstConfig,
    intensity: f64,
    volume_usd: f64,
    z_score: f64,
) -> f64 {
    let intensity_factor = (intensity / 10.0).min(1.0);
    let volume_factor = (volume_usd / 100_000.0).min(1.0);
    let z_factor = (z_score / 5.0).min(1.0);
    (intensity_factor * cfg.intensity_severity_weight
        + volume_factor * cfg.volume_severity_weight
        + z_factor * cfg.z_score_severity_weight)
        .min(1.0)
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

    /// 48 quiet hours with a 2-hour spike in the middle.
    fn spiky_histogram() -> Vec<u32> {
        let mut h = vec![1u32; 48];
        h[20] = 30;
        h[21] = 30;
        h
    }

    #[test]
    fn test_burst_detected_with_window_bounds() {
        let edge = TransferEdge::new("a", "b", 106, 10_000.0, 0, 3_600_000)
            .with_hourly_counts(spiky_histogram());
        let g = TransferGraph::from_edges(vec![edge]);
        let patterns = BurstDetector
            .detect(&g, &ctx(), &DetectionConfig::default())
            .unwrap();

        // Both endpoints share the edge histogram, so both burst.
        assert_eq!(patterns.len(), 2);
        let p = &patterns[0];
        let window_start = ctx().partition.window_start_ms();
        match &p.payload {
            PatternPayload::Burst {
                burst_start_ms,
                burst_end_ms,
                burst_intensity,
                burst_tx_rate,
                ..
            } => {
                assert_eq!(*burst_start_ms, window_start + 20 * HOUR_MS);
                assert_eq!(*burst_end_ms, window_start + 22 * HOUR_MS);
                assert_eq!(*burst_tx_rate, 30.0);
                assert!(*burst_intensity >= 3.0);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
        assert_eq!(p.evidence_transaction_count, 60);
        assert_eq!(p.pattern_duration_hours, 2);
    }

    #[test]
    fn test_flat_activity_no_burst() {
        let edge = TransferEdge::new("a", "b", 48, 1_000.0, 0, 3_600_000)
            .with_hourly_counts(vec![1; 48]);
        let g = TransferGraph::from_edges(vec![edge]);
        let patterns = BurstDetector
            .detect(&g, &ctx(), &DetectionConfig::default())
            .unwrap();
        assert!(patterns.is_empty());
    }

    #[test]
    fn test_small_spike_below_min_transactions() {
        // The spike stands out statistically but carries only 6 transfers,
        // below the default minimum of 10.
        let mut h = vec![0u32; 48];
        h[10] = 6;
        let edge = TransferEdge::new("a", "b", 6, 1_000.0, 0, 3_600_000).with_hourly_counts(h);
        let g = TransferGraph::from_edges(vec![edge]);
        let patterns = BurstDetector
            .detect(&g, &ctx(), &DetectionConfig::default())
            .unwrap();
        assert!(patterns.is_empty());
    }

    #[test]
    fn test_degraded_mode_without_histograms() {
        let g = TransferGraph::from_edges(vec![TransferEdge::new(
            "a", "b", 100, 10_000.0, 0, 3_600_000,
        )]);
        let patterns = BurstDetector
            .detect(&g, &ctx(), &DetectionConfig::default())
            .unwrap();
        assert!(patterns.is_empty());
    }

    #[test]
    fn test_rerun_reproduces_identity() {
        let edge = TransferEdge::new("a", "b", 106, 10_000.0, 0, 3_600_000)
            .with_hourly_counts(spiky_histogram());
        let g1 = TransferGraph::from_edges(vec![edge.clone()]);
        let g2 = TransferGraph::from_edges(vec![edge]);
        let p1 = BurstDetector.detect(&g1, &ctx(), &DetectionConfig::default()).unwrap();
        let p2 = BurstDetector.detect(&g2, &ctx(), &DetectionConfig::default()).unwrap();
        let ids1: Vec<&str> = p1.iter().map(|p| p.pattern_id.as_str()).collect();
        let ids2: Vec<&str> = p2.iter().map(|p| p.pattern_id.as_str()).collect();
        assert_eq!(ids1, ids2);
    }
}
