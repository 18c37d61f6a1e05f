//! Transfer-edge data model and the read-only graph arena.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stable node index into a [`TransferGraph`] arena.
pub type NodeId = usize;

/// One aggregated directed edge: all transfers from one address to another
/// within the window, pre-aggregated upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferEdge {
    /// Sending address.
    pub from_address: String,
    /// Receiving address.
    pub to_address: String,
    /// Number of underlying transfers.
    pub tx_count: u64,
    /// Total USD volume.
    pub amount_usd_sum: f64,
    /// Earliest transfer (epoch ms).
    pub first_seen_ms: i64,
    /// Latest transfer (epoch ms).
    pub last_seen_ms: i64,
    /// Optional per-hour transfer counts over the window, one bucket per
    /// hour starting at the window start. Absent when the upstream
    /// aggregation did not materialize timing histograms.
    #[serde(default)]
    pub hourly_tx_counts: Option<Vec<u32>>,
}

impl TransferEdge {
    /// Create an edge without an hourly histogram.
    #[must_use]
    pub fn new(
        from_address: impl Into<String>,
        to_address: impl Into<String>,
        tx_count: u64,
        amount_usd_sum: f64,
        first_seen_ms: i64,
        last_seen_ms: i64,
    ) -> Self {
        Self {
            from_address: from_address.into(),
            to_address: to_address.into(),
            tx_count,
            amount_usd_sum,
            first_seen_ms,
            last_seen_ms,
            hourly_tx_counts: None,
        }
    }

    /// Attach an hourly transfer-count histogram.
    #[must_use]
    pub fn with_hourly_counts(mut self, counts: Vec<u32>) -> Self {
        self.hourly_tx_counts = Some(counts);
        self
    }

    /// Mean USD amount per underlying transfer.
    #[must_use]
    pub fn avg_amount_usd(&self) -> f64 {
        if self.tx_count == 0 {
            0.0
        } else {
            self.amount_usd_sum / self.tx_count as f64
        }
    }
}

/// Read-only directed transfer graph for one detection run.
///
/// Addresses are interned into a node arena; edges keep their full payload
/// and are reachable through out- and in-adjacency lists of edge indices.
/// Construction is deterministic: edges are sorted by `(from, to)` before
/// interning, so node and edge ids are a pure function of the input set.
#[derive(Debug, Clone)]
pub struct TransferGraph {
    addresses: Vec<String>,
    index: HashMap<String, NodeId>,
    edges: Vec<TransferEdge>,
    endpoints: Vec<(NodeId, NodeId)>,
    out_adj: Vec<Vec<usize>>,
    in_adj: Vec<Vec<usize>>,
}

impl TransferGraph {
    /// Build a graph from an edge list. Edges are sorted by address pair
    /// before interning; the caller is responsible for pre-merging
    /// duplicate pairs (the builder does).
    #[must_use]
    pub fn from_edges(mut edges: Vec<TransferEdge>) -> Self {
        edges.sort_by(|a, b| {
            (a.from_address.as_str(), a.to_address.as_str())
                .cmp(&(b.from_address.as_str(), b.to_address.as_str()))
        });

        let mut graph = Self {
            addresses: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
            endpoints: Vec::new(),
            out_adj: Vec::new(),
            in_adj: Vec::new(),
        };

        for edge in edges {
            let from = graph.intern(&edge.from_address);
            let to = graph.intern(&edge.to_address);
            let edge_idx = graph.edges.len();
            graph.endpoints.push((from, to));
            graph.out_adj[from].push(edge_idx);
            graph.in_adj[to].push(edge_idx);
            graph.edges.push(edge);
        }

        graph
    }

    fn intern(&mut self, address: &str) -> NodeId {
        if let Some(&id) = self.index.get(address) {
            return id;
        }
        let id = self.addresses.len();
        self.addresses.push(address.to_string());
        self.index.insert(address.to_string(), id);
        self.out_adj.push(Vec::new());
        self.in_adj.push(Vec::new());
        id
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.addresses.len()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Address of a node.
    #[must_use]
    pub fn address(&self, node: NodeId) -> &str {
        &self.addresses[node]
    }

    /// Node id of an address, if present.
    #[must_use]
    pub fn node_id(&self, address: &str) -> Option<NodeId> {
        self.index.get(address).copied()
    }

    /// Edge payload by edge index.
    #[must_use]
    pub fn edge(&self, edge_idx: usize) -> &TransferEdge {
        &self.edges[edge_idx]
    }

    /// `(from, to)` node ids of an edge.
    #[must_use]
    pub fn endpoints(&self, edge_idx: usize) -> (NodeId, NodeId) {
        self.endpoints[edge_idx]
    }

    /// Outgoing edge indices of a node.
    #[must_use]
    pub fn out_edges(&self, node: NodeId) -> &[usize] {
        &self.out_adj[node]
    }

    /// Incoming edge indices of a node.
    #[must_use]
    pub fn in_edges(&self, node: NodeId) -> &[usize] {
        &self.in_adj[node]
    }

    /// Out-degree of a node.
    #[must_use]
    pub fn out_degree(&self, node: NodeId) -> usize {
        self.out_adj[node].len()
    }

    /// In-degree of a node.
    #[must_use]
    pub fn in_degree(&self, node: NodeId) -> usize {
        self.in_adj[node].len()
    }

    /// Combined in- plus out-USD volume of a node.
    #[must_use]
    pub fn total_volume(&self, node: NodeId) -> f64 {
        let out: f64 = self.out_adj[node]
            .iter()
            .map(|&e| self.edges[e].amount_usd_sum)
            .sum();
        let inn: f64 = self.in_adj[node]
            .iter()
            .map(|&e| self.edges[e].amount_usd_sum)
            .sum();
        out + inn
    }

    /// Edge index from one node to another, if the edge exists.
    #[must_use]
    pub fn edge_between(&self, from: NodeId, to: NodeId) -> Option<usize> {
        self.out_adj[from]
            .iter()
            .copied()
            .find(|&e| self.endpoints[e].1 == to)
    }

    /// Iterator over all node ids.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> {
        0..self.node_count()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}
