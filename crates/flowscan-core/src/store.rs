//! Partitioned pattern store.
//!
//! Patterns live in seven collections, one per family, each keyed by
//! `(window_days, processing_date, pattern_id)`. A write replaces the whole
//! partition: the engine clears `(network, window_days, processing_date)`
//! and inserts the new batch, so reruns are idempotent and a rerun after a
//! graph change supersedes the prior rows with bumped versions.

use crate::error::{DetectError, Result};
use crate::pattern::{PatternFamily, PatternInstance, PatternType};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use tracing::debug;

/// Milliseconds per day.
const DAY_MS: i64 = 86_400_000;

// ============================================================================
// Partition
// ============================================================================

/// One detection partition: a network, a trailing window length, and the
/// processing date the window ends on.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Partition {
    /// Source network (e.g. "ethereum").
    pub network: String,
    /// Trailing window length in days.
    pub window_days: u16,
    /// Processing date; the window covers the `window_days` days ending at
    /// the end of this date.
    pub processing_date: NaiveDate,
}

impl Partition {
    /// Create a partition.
    #[must_use]
    pub fn new(network: impl Into<String>, window_days: u16, processing_date: NaiveDate) -> Self {
        Self {
            network: network.into(),
            window_days,
            processing_date,
        }
    }

    /// Store key for this partition.
    #[must_use]
    pub fn key(&self) -> PartitionKey {
        PartitionKey {
            window_days: self.window_days,
            processing_date: self.processing_date,
        }
    }

    /// Exclusive end of the window (epoch ms): start of the day after the
    /// processing date.
    #[must_use]
    pub fn window_end_ms(&self) -> i64 {
        self.processing_date
            .and_time(chrono::NaiveTime::MIN)
            .and_utc()
            .timestamp_millis()
            + DAY_MS
    }

    /// Inclusive start of the window (epoch ms).
    #[must_use]
    pub fn window_start_ms(&self) -> i64 {
        self.window_end_ms() - i64::from(self.window_days) * DAY_MS
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}d/{}",
            self.network, self.window_days, self.processing_date
        )
    }
}

/// The part of a partition that keys store rows. The network selects the
/// store deployment, not a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    /// Trailing window length in days.
    pub window_days: u16,
    /// Processing date.
    pub processing_date: NaiveDate,
}

// ============================================================================
// Store contract
// ============================================================================

/// Partitioned pattern storage.
///
/// All reads and writes are scoped to one partition key. Implementations
/// must apply last-version-wins within a key: inserting a row whose
/// `(window_days, processing_date, pattern_id)` already exists replaces the
/// prior row.
pub trait PatternStore: Send + Sync {
    /// Insert a batch of patterns, each routed to its family collection.
    fn insert_batch(&self, patterns: &[PatternInstance]) -> Result<()>;

    /// Remove every row of the partition across all seven families.
    /// Returns the number of rows removed.
    fn clear_partition(&self, key: PartitionKey) -> Result<usize>;

    /// All patterns of one family within the partition, ordered by
    /// pattern id.
    fn partition_patterns(
        &self,
        family: PatternFamily,
        key: PartitionKey,
    ) -> Result<Vec<PatternInstance>>;

    /// All patterns of the partition across every family, optionally
    /// filtered to one pattern type, ordered by `(pattern_type, pattern_id)`.
    /// Reproduces the pre-split single-table read.
    fn union_view(
        &self,
        key: PartitionKey,
        pattern_type: Option<PatternType>,
    ) -> Result<Vec<PatternInstance>>;

    /// High-risk patterns of the partition at or above the risk floor,
    /// ordered by risk score descending, then severity descending, then
    /// pattern id.
    fn high_risk(&self, key: PartitionKey, min_risk_score: f64) -> Result<Vec<PatternInstance>>;

    /// Current version per pattern id within the partition, across all
    /// families. Feeds version assignment on the next rerun.
    fn partition_versions(&self, key: PartitionKey) -> Result<HashMap<String, u32>>;
}

// ============================================================================
// In-memory store
// ============================================================================

type FamilyRows = BTreeMap<(PartitionKey, String), PatternInstance>;

/// In-memory reference implementation of [`PatternStore`].
///
/// Backs tests and single-process deployments. Rows are held per family in
/// a `BTreeMap` keyed by `(partition_key, pattern_id)`, which gives ordered
/// partition scans for free.
#[derive(Default)]
pub struct InMemoryPatternStore {
    collections: RwLock<HashMap<PatternFamily, FamilyRows>>,
}

impl InMemoryPatternStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total rows across all families and partitions.
    #[must_use]
    pub fn len(&self) -> usize {
        let collections = self.collections.read().unwrap();
        collections.values().map(BTreeMap::len).sum()
    }

    /// Returns true if the store holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PatternStore for InMemoryPatternStore {
    fn insert_batch(&self, patterns: &[PatternInstance]) -> Result<()> {
        let mut collections = self.collections.write().unwrap();
        for pattern in patterns {
            let key = PartitionKey {
                window_days: pattern.window_days,
                processing_date: pattern.processing_date,
            };
            collections
                .entry(pattern.family())
                .or_default()
                .insert((key, pattern.pattern_id.clone()), pattern.clone());
        }
        Ok(())
    }

    fn clear_partition(&self, key: PartitionKey) -> Result<usize> {
        let mut collections = self.collections.write().unwrap();
        let mut removed = 0;
        for rows in collections.values_mut() {
            let before = rows.len();
            rows.retain(|(row_key, _), _| *row_key != key);
            removed += before - rows.len();
        }
        debug!(
            window_days = key.window_days,
            processing_date = %key.processing_date,
            removed,
            "cleared partition"
        );
        Ok(removed)
    }

    fn partition_patterns(
        &self,
        family: PatternFamily,
        key: PartitionKey,
    ) -> Result<Vec<PatternInstance>> {
        let collections = self.collections.read().unwrap();
        let Some(rows) = collections.get(&family) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .range((key, String::new())..)
            .take_while(|((row_key, _), _)| *row_key == key)
            .map(|(_, pattern)| pattern.clone())
            .collect())
    }

    fn union_view(
        &self,
        key: PartitionKey,
        pattern_type: Option<PatternType>,
    ) -> Result<Vec<PatternInstance>> {
        let mut all = Vec::new();
        for family in PatternFamily::ALL {
            all.extend(self.partition_patterns(*family, key)?);
        }
        if let Some(pt) = pattern_type {
            all.retain(|p| p.pattern_type == pt);
        }
        all.sort_by(|a, b| {
            (a.pattern_type.as_str(), &a.pattern_id).cmp(&(b.pattern_type.as_str(), &b.pattern_id))
        });
        Ok(all)
    }

    fn high_risk(&self, key: PartitionKey, min_risk_score: f64) -> Result<Vec<PatternInstance>> {
        if !(0.0..=1.0).contains(&min_risk_score) {
            return Err(DetectError::input("min_risk_score must be in [0, 1]"));
        }
        let mut hits: Vec<PatternInstance> = self
            .union_view(key, None)?
            .into_iter()
            .filter(|p| p.pattern_type.is_high_risk() && p.risk_score >= min_risk_score)
            .collect();
        hits.sort_by(|a, b| {
            b.risk_score
                .total_cmp(&a.risk_score)
                .then(b.severity_score.total_cmp(&a.severity_score))
                .then(a.pattern_id.cmp(&b.pattern_id))
        });
        Ok(hits)
    }

    fn partition_versions(&self, key: PartitionKey) -> Result<HashMap<String, u32>> {
        let collections = self.collections.read().unwrap();
        let mut versions = HashMap::new();
        for rows in collections.values() {
            for ((row_key, pattern_id), pattern) in rows {
                if *row_key == key {
                    versions.insert(pattern_id.clone(), pattern.version);
                }
            }
        }
        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{DetectionMethod, PatternPayload, PatternType};

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn cycle_instance(key: PartitionKey, pattern_id: &str, risk: f64) -> PatternInstance {
        PatternInstance {
            window_days: key.window_days,
            processing_date: key.processing_date,
            pattern_id: pattern_id.to_string(),
            pattern_type: PatternType::Cycle,
            pattern_hash: pattern_id.trim_start_matches("cycle_").to_string(),
            addresses_involved: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            address_roles: vec!["cycle_member".to_string(); 3],
            severity_score: 0.5,
            confidence_score: 0.8,
            risk_score: risk,
            anomaly_score: 0.0,
            pattern_start_ms: 0,
            pattern_end_ms: 3_600_000,
            pattern_duration_hours: 1,
            evidence_transaction_count: 3,
            evidence_volume_usd: 300.0,
            detection_method: DetectionMethod::CycleDetection,
            version: 1,
            payload: PatternPayload::Cycle {
                path: vec!["a".to_string(), "b".to_string(), "c".to_string()],
                length: 3,
                bottleneck_volume_usd: 100.0,
            },
        }
    }

    fn burst_instance(key: PartitionKey, pattern_id: &str) -> PatternInstance {
        PatternInstance {
            pattern_type: PatternType::TemporalBurst,
            pattern_id: pattern_id.to_string(),
            detection_method: DetectionMethod::TemporalAnalysis,
            payload: PatternPayload::Burst {
                address: "a".to_string(),
                burst_start_ms: 0,
                burst_end_ms: 3_600_000,
                normal_tx_rate: 1.0,
                burst_tx_rate: 10.0,
                burst_intensity: 10.0,
                z_score: 4.0,
                hourly_distribution: vec![1, 10, 1],
            },
            ..cycle_instance(key, pattern_id, 0.9)
        }
    }

    #[test]
    fn test_insert_and_partition_scan() {
        let store = InMemoryPatternStore::new();
        let key = PartitionKey {
            window_days: 7,
            processing_date: date("2024-06-01"),
        };
        let other = PartitionKey {
            window_days: 30,
            processing_date: date("2024-06-01"),
        };
        store
            .insert_batch(&[
                cycle_instance(key, "cycle_b", 0.7),
                cycle_instance(key, "cycle_a", 0.7),
                cycle_instance(other, "cycle_a", 0.7),
            ])
            .unwrap();

        let rows = store.partition_patterns(PatternFamily::Cycle, key).unwrap();
        assert_eq!(rows.len(), 2);
        // Ordered by pattern id, and the other window is untouched.
        assert_eq!(rows[0].pattern_id, "cycle_a");
        assert_eq!(rows[1].pattern_id, "cycle_b");
        assert_eq!(
            store
                .partition_patterns(PatternFamily::Cycle, other)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_last_version_wins() {
        let store = InMemoryPatternStore::new();
        let key = PartitionKey {
            window_days: 7,
            processing_date: date("2024-06-01"),
        };
        let mut v1 = cycle_instance(key, "cycle_a", 0.7);
        v1.version = 1;
        let mut v2 = cycle_instance(key, "cycle_a", 0.9);
        v2.version = 2;
        store.insert_batch(&[v1]).unwrap();
        store.insert_batch(&[v2]).unwrap();

        let rows = store.partition_patterns(PatternFamily::Cycle, key).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].version, 2);
        assert_eq!(store.partition_versions(key).unwrap()["cycle_a"], 2);
    }

    #[test]
    fn test_clear_partition_spans_families() {
        let store = InMemoryPatternStore::new();
        let key = PartitionKey {
            window_days: 7,
            processing_date: date("2024-06-01"),
        };
        let other = PartitionKey {
            window_days: 7,
            processing_date: date("2024-06-02"),
        };
        store
            .insert_batch(&[
                cycle_instance(key, "cycle_a", 0.7),
                burst_instance(key, "temporal_burst_x"),
                cycle_instance(other, "cycle_a", 0.7),
            ])
            .unwrap();

        assert_eq!(store.clear_partition(key).unwrap(), 2);
        assert!(store.union_view(key, None).unwrap().is_empty());
        assert_eq!(store.union_view(other, None).unwrap().len(), 1);
    }

    #[test]
    fn test_union_view_order() {
        let store = InMemoryPatternStore::new();
        let key = PartitionKey {
            window_days: 7,
            processing_date: date("2024-06-01"),
        };
        store
            .insert_batch(&[
                burst_instance(key, "temporal_burst_x"),
                cycle_instance(key, "cycle_b", 0.7),
                cycle_instance(key, "cycle_a", 0.7),
            ])
            .unwrap();

        let all = store.union_view(key, None).unwrap();
        let ids: Vec<&str> = all.iter().map(|p| p.pattern_id.as_str()).collect();
        assert_eq!(ids, vec!["cycle_a", "cycle_b", "temporal_burst_x"]);

        let cycles_only = store
            .union_view(key, Some(PatternType::Cycle))
            .unwrap();
        assert_eq!(cycles_only.len(), 2);
    }

    #[test]
    fn test_high_risk_filters_and_orders() {
        let store = InMemoryPatternStore::new();
        let key = PartitionKey {
            window_days: 7,
            processing_date: date("2024-06-01"),
        };
        store
            .insert_batch(&[
                cycle_instance(key, "cycle_low", 0.3),
                cycle_instance(key, "cycle_hi", 0.9),
                cycle_instance(key, "cycle_mid", 0.75),
                // Bursts are low-risk regardless of score.
                burst_instance(key, "temporal_burst_x"),
            ])
            .unwrap();

        let hits = store.high_risk(key, 0.7).unwrap();
        let ids: Vec<&str> = hits.iter().map(|p| p.pattern_id.as_str()).collect();
        assert_eq!(ids, vec!["cycle_hi", "cycle_mid"]);

        assert!(store.high_risk(key, 1.5).is_err());
    }

    #[test]
    fn test_partition_window_bounds() {
        let partition = Partition::new("ethereum", 7, date("2024-06-01"));
        let end = partition.window_end_ms();
        let start = partition.window_start_ms();
        assert_eq!(end - start, 7 * DAY_MS);
        // End is the start of June 2nd.
        assert_eq!(
            end,
            date("2024-06-02")
                .and_time(chrono::NaiveTime::MIN)
                .and_utc()
                .timestamp_millis()
        );
    }
}
