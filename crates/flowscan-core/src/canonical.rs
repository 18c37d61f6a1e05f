//! Canonicalization and content hashing for pattern identity.
//!
//! Each pattern type reduces to a unique canonical tuple before hashing so
//! that the same physical pattern found via different discovery orders
//! collapses to one identity:
//!
//! - ordered patterns (cycle, layering path) keep their traversal order,
//!   with cycles rotated so the lexicographically smallest address is first;
//! - unordered patterns (network members, motif participants) are sorted;
//! - single-anchor patterns (proximity, burst, threshold) hash the anchor
//!   address plus the qualifying scalar.
//!
//! The hash covers the pattern type concatenated with the canonical tuple
//! using a stable order-preserving serialization. No floating-point field
//! ever enters the hash, so reruns on an unchanged graph reproduce
//! identical hashes.

use crate::pattern::{MotifKind, PatternType};
use sha2::{Digest, Sha256};

/// Hex length of the truncated content hash.
const HASH_LEN: usize = 16;

fn digest(pattern_type: PatternType, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pattern_type.as_str().as_bytes());
    for part in parts {
        hasher.update(b"|");
        hasher.update(part.as_bytes());
    }
    let mut hash = hex::encode(hasher.finalize());
    hash.truncate(HASH_LEN);
    hash
}

/// Stable pattern identifier: `{pattern_type}_{pattern_hash}`.
#[must_use]
pub fn pattern_id(pattern_type: PatternType, pattern_hash: &str) -> String {
    format!("{}_{}", pattern_type.as_str(), pattern_hash)
}

/// Rotate a cycle so the lexicographically smallest address is first.
///
/// Traversal direction is preserved: a cycle and its reverse are distinct
/// flows unless edges exist both ways.
#[must_use]
pub fn canonical_cycle(path: &[String]) -> Vec<String> {
    if path.is_empty() {
        return Vec::new();
    }
    let pivot = path
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut rotated = Vec::with_capacity(path.len());
    rotated.extend_from_slice(&path[pivot..]);
    rotated.extend_from_slice(&path[..pivot]);
    rotated
}

/// Canonical form and hash for a cycle.
#[must_use]
pub fn cycle_identity(path: &[String]) -> (Vec<String>, String) {
    let canonical = canonical_cycle(path);
    let parts: Vec<&str> = canonical.iter().map(String::as_str).collect();
    let hash = digest(PatternType::Cycle, &parts);
    (canonical, hash)
}

/// Hash for a layering path. The source-to-destination sequence is already
/// a unique representative, so it is hashed as-is.
#[must_use]
pub fn path_identity(path: &[String]) -> String {
    let parts: Vec<&str> = path.iter().map(String::as_str).collect();
    digest(PatternType::LayeringPath, &parts)
}

/// Canonical (sorted) member list and hash for a network pattern.
#[must_use]
pub fn network_identity(members: &[String]) -> (Vec<String>, String) {
    let mut sorted: Vec<String> = members.to_vec();
    sorted.sort();
    let parts: Vec<&str> = sorted.iter().map(String::as_str).collect();
    let hash = digest(PatternType::SmurfingNetwork, &parts);
    (sorted, hash)
}

/// Canonical (sorted) participant list and hash for a motif. The kind and
/// center are part of the identity: swapping the center changes the hash.
#[must_use]
pub fn motif_identity(
    kind: MotifKind,
    center: &str,
    participants: &[String],
) -> (Vec<String>, String) {
    let mut sorted: Vec<String> = participants.to_vec();
    sorted.sort();
    let mut parts: Vec<&str> = Vec::with_capacity(sorted.len() + 2);
    parts.push(kind.as_str());
    parts.push(center);
    parts.extend(sorted.iter().map(String::as_str));
    let hash = digest(kind.pattern_type(), &parts);
    (sorted, hash)
}

/// Hash for a proximity pattern: anchor address plus its nearest risk source.
#[must_use]
pub fn proximity_identity(address: &str, risk_source: &str) -> String {
    digest(PatternType::ProximityRisk, &[risk_source, address])
}

/// Hash for a burst pattern: anchor address plus the burst window bounds.
#[must_use]
pub fn burst_identity(address: &str, burst_start_ms: i64, burst_end_ms: i64) -> String {
    let start = burst_start_ms.to_string();
    let end = burst_end_ms.to_string();
    digest(PatternType::TemporalBurst, &[address, &start, &end])
}

/// Hash for a threshold evasion pattern: anchor address plus the tier.
/// The tier value is hashed as whole USD to keep floats out of the hash.
#[must_use]
pub fn threshold_identity(address: &str, threshold_type: &str, threshold_value_usd: f64) -> String {
    let value = (threshold_value_usd as u64).to_string();
    digest(
        PatternType::ThresholdEvasion,
        &[address, threshold_type, &value],
    )
}
