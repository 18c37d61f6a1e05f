//! # Flowscan Graph
//!
//! Transfer graph construction and structural pattern detection.
//!
//! This crate provides:
//! - The transfer-edge data model and the read-only graph arena
//! - The async edge-source contract and the graph builder
//! - Strongly and weakly connected component analysis
//! - Seven structural detectors (cycle, layering, network, proximity,
//!   motif, burst, threshold)
//! - The detection engine orchestrating one partition end to end

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod detectors;
pub mod engine;
pub mod scc;
pub mod types;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::builder::{EdgeSource, GraphBuilder, StaticEdgeSource};
    pub use crate::detectors::{Detector, RunContext};
    pub use crate::engine::{DetectionEngine, RunReport};
    pub use crate::types::{NodeId, TransferEdge, TransferGraph};
}
