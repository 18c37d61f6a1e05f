//! # Flowscan Core
//!
//! Core abstractions for the flowscan structural pattern detection engine.
//!
//! This crate provides:
//! - Error taxonomy for detection runs
//! - Detection configuration with per-detector sections
//! - The `PatternInstance` data model (one record, seven typed payloads)
//! - Canonicalization and content hashing for pattern identity
//! - Deduplication and version assignment across reruns
//! - The partitioned pattern store contract with an in-memory reference store

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod canonical;
pub mod config;
pub mod dedup;
pub mod error;
pub mod pattern;
pub mod store;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::canonical::{
        burst_identity, canonical_cycle, cycle_identity, motif_identity, network_identity,
        path_identity, pattern_id, proximity_identity, threshold_identity,
    };
    pub use crate::config::DetectionConfig;
    pub use crate::dedup::{assign_versions, VersioningStats};
    pub use crate::error::{DetectError, Result};
    pub use crate::pattern::{
        DetectionMethod, MotifKind, NetworkSubtype, PatternFamily, PatternInstance,
        PatternPayload, PatternType, RiskLevel,
    };
    pub use crate::store::{InMemoryPatternStore, Partition, PartitionKey, PatternStore};
}
