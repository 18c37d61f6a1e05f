//! Deduplication and version assignment.
//!
//! Detectors can surface the same physical pattern more than once within a
//! run (two SCCs sharing a cycle, overlapping path searches). The batch is
//! deduplicated on `pattern_id` before versioning, keeping the first
//! occurrence. Versions then continue from the prior partition contents:
//! an id seen before gets `prior + 1`, a new id gets `1`.

use crate::pattern::PatternInstance;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Outcome counts of one version-assignment pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VersioningStats {
    /// Pattern ids seen for the first time in this partition.
    pub created: usize,
    /// Pattern ids that already existed and had their version bumped.
    pub superseded: usize,
    /// Duplicate rows dropped within the batch.
    pub deduplicated: usize,
}

/// Deduplicate a detection batch and assign versions against the prior
/// partition contents.
///
/// `prior_versions` maps pattern id to its current stored version, as
/// returned by the store's partition-versions scan.
pub fn assign_versions(
    patterns: &mut Vec<PatternInstance>,
    prior_versions: &HashMap<String, u32>,
) -> VersioningStats {
    let mut stats = VersioningStats::default();
    let mut seen: HashSet<String> = HashSet::with_capacity(patterns.len());

    patterns.retain(|pattern| {
        if seen.insert(pattern.pattern_id.clone()) {
            true
        } else {
            stats.deduplicated += 1;
            false
        }
    });

    for pattern in patterns.iter_mut() {
        match prior_versions.get(&pattern.pattern_id) {
            Some(prior) => {
                pattern.version = prior + 1;
                stats.superseded += 1;
            }
            None => {
                pattern.version = 1;
                stats.created += 1;
            }
        }
    }

    debug!(
        created = stats.created,
        superseded = stats.superseded,
        deduplicated = stats.deduplicated,
        "assigned pattern versions"
    );
    stats
}
