//! Structural pattern detectors.
//!
//! Each detector is pure synchronous CPU work over the read-only graph:
//! no I/O, no shared mutable state, so the engine can fan all seven out on
//! blocking tasks. Every detector returns an empty vector on an empty
//! graph and deduplicates its own output by pattern id, keeping the first
//! occurrence.

use flowscan_core::config::DetectionConfig;
use flowscan_core::error::Result;
use flowscan_core::pattern::PatternInstance;
use flowscan_core::store::Partition;

use crate::types::TransferGraph;

pub mod burst;
pub mod cycle;
pub mod layering;
pub mod motif;
pub mod network;
pub mod proximity;
pub mod threshold;

pub use burst::BurstDetector;
pub use cycle::CycleDetector;
pub use layering::LayeringDetector;
pub use motif::MotifDetector;
pub use network::NetworkDetector;
pub use proximity::ProximityDetector;
pub use threshold::ThresholdDetector;

/// Per-run inputs shared by all detectors.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// The partition being processed.
    pub partition: Partition,
    /// Externally supplied risk-labeled addresses for proximity analysis.
    /// May be empty; the proximity detector then falls back to its
    /// volume/degree heuristic.
    pub risk_sources: Vec<String>,
}

/// One structural pattern detector.
pub trait Detector: Send + Sync {
    /// Stable detector name, used in reports and failure messages.
    fn name(&self) -> &'static str;

    /// Run detection over the graph.
    fn detect(
        &self,
        graph: &TransferGraph,
        ctx: &RunContext,
        config: &DetectionConfig,
    ) -> Result<Vec<PatternInstance>>;
}

/// The full detector set, in report order.
#[must_use]
pub fn all_detectors() -> Vec<Box<dyn Detector>> {
    vec![
        Box::new(CycleDetector),
        Box::new(LayeringDetector),
        Box::new(NetworkDetector),
        Box::new(ProximityDetector),
        Box::new(MotifDetector),
        Box::new(BurstDetector),
        Box::new(ThresholdDetector),
    ]
}

// ============================================================================
// Shared statistics helpers
// ============================================================================

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population standard deviation.
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Percentile with linear interpolation between closest ranks.
pub(crate) fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] + (sorted[hi] - sorted[lo]) * frac
    }
}
