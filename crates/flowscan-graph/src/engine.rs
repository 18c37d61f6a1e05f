//! Detection run orchestration.
//!
//! One run covers one partition: fetch edges, build the graph, fan the
//! detectors out on blocking tasks, then replace the partition in the
//! store. Writes are all-or-nothing: if any detector fails the run reports
//! the failures and leaves the prior partition contents untouched.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::NaiveDate;
use flowscan_core::config::DetectionConfig;
use flowscan_core::dedup::assign_versions;
use flowscan_core::error::{DetectError, Result};
use flowscan_core::pattern::PatternInstance;
use flowscan_core::store::{Partition, PatternStore};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::builder::{EdgeSource, GraphBuilder};
use crate::detectors::{all_detectors, Detector, RunContext};

/// Summary of one completed detection run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// Network the run covered.
    pub network: String,
    /// Trailing window length in days.
    pub window_days: u16,
    /// Processing date of the partition.
    pub processing_date: NaiveDate,
    /// Nodes in the built graph.
    pub node_count: usize,
    /// Edges in the built graph.
    pub edge_count: usize,
    /// Pattern count per detector, in detector order.
    pub detector_counts: Vec<(String, usize)>,
    /// Patterns written after deduplication.
    pub total_patterns: usize,
    /// Pattern ids seen for the first time.
    pub created: usize,
    /// Pattern ids carried over with a bumped version.
    pub superseded: usize,
    /// Duplicate rows dropped within the batch.
    pub deduplicated: usize,
}

/// Orchestrates detection runs against one pattern store.
pub struct DetectionEngine {
    store: Arc<dyn PatternStore>,
    config: DetectionConfig,
    detectors: Vec<Arc<dyn Detector>>,
}

impl DetectionEngine {
    /// Create an engine with the full detector set.
    #[must_use]
    pub fn new(store: Arc<dyn PatternStore>, config: DetectionConfig) -> Self {
        let detectors = all_detectors().into_iter().map(Arc::from).collect();
        Self {
            store,
            config,
            detectors,
        }
    }

    /// Create an engine with an explicit detector set. Used by tests and
    /// single-detector replays.
    #[must_use]
    pub fn with_detectors(
        store: Arc<dyn PatternStore>,
        config: DetectionConfig,
        detectors: Vec<Arc<dyn Detector>>,
    ) -> Self {
        Self {
            store,
            config,
            detectors,
        }
    }

    /// Run detection for one partition.
    ///
    /// Fetches edges, runs every detector concurrently, and replaces the
    /// partition contents. Any detector failure (error or panic) aborts
    /// the write and surfaces as [`DetectError::PartialRun`]; the prior
    /// partition rows stay in place.
    pub async fn run(
        &self,
        partition: Partition,
        source: &dyn EdgeSource,
        risk_sources: Vec<String>,
    ) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        info!(%run_id, %partition, "starting detection run");

        let edges = source.fetch_edges(&partition).await?;
        let graph = Arc::new(GraphBuilder::new().build(edges));
        let ctx = Arc::new(RunContext {
            partition: partition.clone(),
            risk_sources,
        });
        let config = Arc::new(self.config.clone());

        let mut join_set = JoinSet::new();
        for detector in &self.detectors {
            let detector = Arc::clone(detector);
            let graph = Arc::clone(&graph);
            let ctx = Arc::clone(&ctx);
            let config = Arc::clone(&config);
            join_set.spawn_blocking(move || {
                let name = detector.name();
                match catch_unwind(AssertUnwindSafe(|| detector.detect(&graph, &ctx, &config))) {
                    Ok(Ok(patterns)) => (name, Ok(patterns)),
                    Ok(Err(err)) => (name, Err(err)),
                    Err(_) => (
                        name,
                        Err(DetectError::detector(name, "detector panicked")),
                    ),
                }
            });
        }

        let mut by_detector: Vec<(String, Vec<PatternInstance>)> = Vec::new();
        let mut failed: Vec<String> = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(patterns))) => by_detector.push((name.to_string(), patterns)),
                Ok((name, Err(err))) => {
                    warn!(%run_id, detector = name, error = %err, "detector failed");
                    failed.push(name.to_string());
                }
                Err(join_err) => {
                    warn!(%run_id, error = %join_err, "detector task aborted");
                    failed.push("aborted".to_string());
                }
            }
        }

        if !failed.is_empty() {
            failed.sort();
            warn!(%run_id, failed = failed.len(), "run incomplete; nothing written");
            return Err(DetectError::PartialRun(failed));
        }

        // Restore detector order lost to completion order.
        let order: Vec<&'static str> = self.detectors.iter().map(|d| d.name()).collect();
        by_detector.sort_by_key(|(name, _)| {
            order
                .iter()
                .position(|n| *n == name.as_str())
                .unwrap_or(usize::MAX)
        });
        let detector_counts: Vec<(String, usize)> = by_detector
            .iter()
            .map(|(name, patterns)| (name.clone(), patterns.len()))
            .collect();
        let mut batch: Vec<PatternInstance> = by_detector
            .into_iter()
            .flat_map(|(_, patterns)| patterns)
            .collect();

        let key = partition.key();
        let prior = self.store.partition_versions(key)?;
        let stats = assign_versions(&mut batch, &prior);
        self.store.clear_partition(key)?;
        self.store.insert_batch(&batch)?;

        info!(
            %run_id,
            patterns = batch.len(),
            created = stats.created,
            superseded = stats.superseded,
            "detection run complete"
        );

        Ok(RunReport {
            run_id,
            network: partition.network,
            window_days: partition.window_days,
            processing_date: partition.processing_date,
            node_count: graph.node_count(),
            edge_count: graph.edge_count(),
            detector_counts,
            total_patterns: batch.len(),
            created: stats.created,
            superseded: stats.superseded,
            deduplicated: stats.deduplicated,
        })
    }
}
