//! Star motif detection: fan-in and fan-out.
//!
//! A fan-in is a center address receiving from many distinct senders while
//! sending to almost nobody; a fan-out mirrors it. Participant bounds and
//! the opposing-degree caps come from configuration.

use std::collections::HashSet;

use flowscan_core::canonical::{motif_identity, pattern_id};
use flowscan_core::config::DetectionConfig;
use flowscan_core::error::Result;
use flowscan_core::pattern::{
    DetectionMethod, MotifKind, PatternInstance, PatternPayload,
};
use tracing::debug;

use super::{Detector, RunContext};
use crate::types::{NodeId, TransferGraph};

/// Detector for fan-in and fan-out motifs.
pub struct MotifDetector;

impl Detector for MotifDetector {
    fn name(&self) -> &'static str {
        "motif"
    }

    fn detect(
        &self,
        graph: &TransferGraph,
        ctx: &RunContext,
        config: &DetectionConfig,
    ) -> Result<Vec<PatternInstance>> {
        let cfg = &config.motif_detection;
        let mut patterns = Vec::new();
        let mut seen_ids: HashSet<String> = HashSet::new();

        for node in graph.nodes() {
            let in_peers = peers(graph, node, MotifKind::FanIn);
            let out_peers = peers(graph, node, MotifKind::FanOut);

            if in_peers.len() >= cfg.min_participants
                && in_peers.len() <= cfg.max_participants
                && graph.out_degree(node) <= cfg.fanin_max_out_degree
            {
                if let Some(p) = build_motif(
                    graph, ctx, config, node, MotifKind::FanIn, &in_peers, &mut seen_ids,
                ) {
                    patterns.push(p);
                }
            }

            if out_peers.len() >= cfg.min_participants
                && out_peers.len() <= cfg.max_participants
                && graph.in_degree(node) <= cfg.fanout_max_in_degree
            {
                if let Some(p) = build_motif(
                    graph, ctx, config, node, MotifKind::FanOut, &out_peers, &mut seen_ids,
                ) {
                    patterns.push(p);
                }
            }
        }

        debug!(patterns = patterns.len(), "motif detection complete");
        Ok(patterns)
    }
}

/// Distinct peripheral node ids on the motif side of the center.
fn peers(graph: &TransferGraph, center: NodeId, kind: MotifKind) -> Vec<NodeId> {
    let mut set: HashSet<NodeId> = HashSet::new();
    match kind {
        MotifKind::FanIn => {
            for &e in graph.in_edges(center) {
                set.insert(graph.endpoints(e).0);
            }
        }
        MotifKind::FanOut => {
            for &e in graph.out_edges(center) {
                set.insert(graph.endpoints(e).1);
            }
        }
    }
    let mut out: Vec<NodeId> = set.into_iter().collect();
    out.sort_unstable();
    out
}

fn build_motif(
    graph: &TransferGraph,
    ctx: &RunContext,
    config: &DetectionConfig,
    center: NodeId,
    kind: MotifKind,
    peer_nodes: &[NodeId],
    seen_ids: &mut HashSet<String>,
) -> Option<PatternInstance> {
    let cfg = &config.motif_detection;
    let center_addr = graph.address(center).to_string();
    let participants: Vec<String> = peer_nodes
        .iter()
        .map(|&n| graph.address(n).to_string())
        .collect();
    let (sorted_participants, hash) = motif_identity(kind, &center_addr, &participants);
    let id = pattern_id(kind.pattern_type(), &hash);
    if !seen_ids.insert(id.clone()) {
        return None;
    }

    let edges: &[usize] = match kind {
        MotifKind::FanIn => graph.in_edges(center),
        MotifKind::FanOut => graph.out_edges(center),
    };
    let mut volume = 0.0;
    let mut tx_count = 0u64;
    let mut start_ms = i64::MAX;
    let mut end_ms = i64::MIN;
    for &e in edges {
        let edge = graph.edge(e);
        volume += edge.amount_usd_sum;
        tx_count += edge.tx_count;
        start_ms = start_ms.min(edge.first_seen_ms);
        end_ms = end_ms.max(edge.last_seen_ms);
    }

    let peripheral_role = match kind {
        MotifKind::FanIn => "source",
        MotifKind::FanOut => "destination",
    };
    let mut addresses = Vec::with_capacity(sorted_participants.len() + 1);
    addresses.push(center_addr.clone());
    addresses.extend(sorted_participants.iter().cloned());
    let mut roles = vec!["center".to_string()];
    roles.extend(std::iter::repeat(peripheral_role.to_string()).take(sorted_participants.len()));

    let participant_count = sorted_participants.len();
    Some(PatternInstance {
        window_days: ctx.partition.window_days,
        processing_date: ctx.partition.processing_date,
        pattern_id: id,
        pattern_type: kind.pattern_type(),
        pattern_hash: hash,
        addresses_involved: addresses,
        address_roles: roles,
        severity_score: 0.6,
        confidence_score: cfg.confidence_score,
        risk_score: 0.6,
        anomaly_score: 0.0,
        pattern_start_ms: start_ms,
        pattern_end_ms: end_ms,
        pattern_duration_hours: PatternInstance::duration_hours(start_ms, end_ms),
        evidence_transaction_count: tx_count,
        evidence_volume_usd: volume,
        detection_method: DetectionMethod::MotifDetection,
        version: 0,
        payload: PatternPayload::Motif {
            motif_kind: kind,
            center_address: center_addr,
            participants: sorted_participants,
            participant_count,
        },
    })
}
