//! Edge sourcing and graph construction.
//!
//! The edge source is the only async seam in the crate: implementations
//! fetch pre-aggregated transfer edges for one partition from wherever they
//! live. The builder then normalizes the batch (drops self-transfers and
//! zero-activity edges, merges duplicate ordered pairs) and hands back the
//! immutable graph arena.

use crate::types::{TransferEdge, TransferGraph};
use async_trait::async_trait;
use flowscan_core::error::Result;
use flowscan_core::store::Partition;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, info};

/// Source of pre-aggregated transfer edges for one partition.
#[async_trait]
pub trait EdgeSource: Send + Sync {
    /// Fetch all edges whose activity falls inside the partition window.
    /// An empty result is a valid, empty window.
    async fn fetch_edges(&self, partition: &Partition) -> Result<Vec<TransferEdge>>;
}

/// Edge source over a fixed in-memory edge list. Backs tests and replays.
#[derive(Debug, Clone, Default)]
pub struct StaticEdgeSource {
    edges: Vec<TransferEdge>,
}

impl StaticEdgeSource {
    /// Create a source serving the given edges.
    #[must_use]
    pub fn new(edges: Vec<TransferEdge>) -> Self {
        Self { edges }
    }
}

#[async_trait]
impl EdgeSource for StaticEdgeSource {
    async fn fetch_edges(&self, _partition: &Partition) -> Result<Vec<TransferEdge>> {
        Ok(self.edges.clone())
    }
}

/// Normalizes an edge batch into a [`TransferGraph`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphBuilder;

impl GraphBuilder {
    /// Create a builder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Build the graph: drop self-transfers and edges with no activity,
    /// merge duplicate ordered pairs, then intern deterministically.
    #[must_use]
    pub fn build(&self, edges: Vec<TransferEdge>) -> TransferGraph {
        let input_count = edges.len();
        let mut dropped = 0usize;
        let mut merged: HashMap<(String, String), TransferEdge> = HashMap::new();

        for edge in edges {
            if edge.from_address == edge.to_address || edge.tx_count == 0 {
                dropped += 1;
                continue;
            }
            let key = (edge.from_address.clone(), edge.to_address.clone());
            match merged.entry(key) {
                Entry::Occupied(entry) => merge_into(entry.into_mut(), edge),
                Entry::Vacant(entry) => {
                    entry.insert(edge);
                }
            }
        }

        let graph = TransferGraph::from_edges(merged.into_values().collect());
        if dropped > 0 {
            debug!(dropped, "dropped self-transfer or zero-activity edges");
        }
        info!(
            input_edges = input_count,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "built transfer graph"
        );
        graph
    }
}

fn merge_into(existing: &mut TransferEdge, other: TransferEdge) {
    existing.tx_count += other.tx_count;
    existing.amount_usd_sum += other.amount_usd_sum;
    existing.first_seen_ms = existing.first_seen_ms.min(other.first_seen_ms);
    existing.last_seen_ms = existing.last_seen_ms.max(other.last_seen_ms);
    existing.hourly_tx_counts = match (existing.hourly_tx_counts.take(), other.hourly_tx_counts) {
        (Some(a), Some(b)) => {
            let (mut long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
            for (i, count) in short.iter().enumerate() {
                long[i] += count;
            }
            Some(long)
        }
        (Some(a), None) => Some(a),
        (None, b) => b,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn edge(from: &str, to: &str, tx: u64, amount: f64) -> TransferEdge {
        TransferEdge::new(from, to, tx, amount, 1_000, 2_000)
    }

    #[test]
    fn test_build_filters_and_merges() {
        let graph = GraphBuilder::new().build(vec![
            edge("a", "b", 2, 100.0),
            edge("a", "b", 3, 50.0),
            edge("a", "a", 1, 10.0),
            edge("b", "c", 0, 10.0),
            edge("b", "c", 1, 10.0),
        ]);

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        let a = graph.node_id("a").unwrap();
        let b = graph.node_id("b").unwrap();
        let merged = graph.edge(graph.edge_between(a, b).unwrap());
        assert_eq!(merged.tx_count, 5);
        assert_eq!(merged.amount_usd_sum, 150.0);
    }

    #[test]
    fn test_merge_keeps_time_bounds_and_histograms() {
        let first = TransferEdge::new("a", "b", 1, 10.0, 5_000, 6_000)
            .with_hourly_counts(vec![1, 0, 2]);
        let second = TransferEdge::new("a", "b", 1, 10.0, 1_000, 9_000)
            .with_hourly_counts(vec![0, 3]);
        let graph = GraphBuilder::new().build(vec![first, second]);

        let e = graph.edge(0);
        assert_eq!(e.first_seen_ms, 1_000);
        assert_eq!(e.last_seen_ms, 9_000);
        assert_eq!(e.hourly_tx_counts.as_deref(), Some(&[1, 3, 2][..]));
    }

    #[tokio::test]
    async fn test_static_edge_source() {
        let partition = Partition::new(
            "ethereum",
            7,
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        );
        let source = StaticEdgeSource::new(vec![edge("a", "b", 1, 10.0)]);
        let fetched = source.fetch_edges(&partition).await.unwrap();
        assert_eq!(fetched.len(), 1);
    }
}
