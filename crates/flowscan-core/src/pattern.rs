//! Pattern data model.
//!
//! One abstract record (`PatternInstance`) with seven type-specific payload
//! variants. Detectors produce only their own variant; the store-write
//! boundary matches exhaustively on the payload.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Pattern Types and Families
// ============================================================================

/// The eight detected pattern types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// Circular fund flow.
    Cycle,
    /// Chain of intermediaries with consistent hop volumes.
    LayeringPath,
    /// Strongly connected or coordinated small-transfer network.
    SmurfingNetwork,
    /// Address within hop distance of a known risk source.
    ProximityRisk,
    /// Many distinct senders converging on one address.
    MotifFanin,
    /// One address distributing to many distinct receivers.
    MotifFanout,
    /// Sudden spike in hourly transfer activity.
    TemporalBurst,
    /// Transactions clustered just below a reporting threshold.
    ThresholdEvasion,
}

impl PatternType {
    /// Returns the pattern type as its wire string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            PatternType::Cycle => "cycle",
            PatternType::LayeringPath => "layering_path",
            PatternType::SmurfingNetwork => "smurfing_network",
            PatternType::ProximityRisk => "proximity_risk",
            PatternType::MotifFanin => "motif_fanin",
            PatternType::MotifFanout => "motif_fanout",
            PatternType::TemporalBurst => "temporal_burst",
            PatternType::ThresholdEvasion => "threshold_evasion",
        }
    }

    /// Parse a pattern type from its wire string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cycle" => Some(PatternType::Cycle),
            "layering_path" => Some(PatternType::LayeringPath),
            "smurfing_network" => Some(PatternType::SmurfingNetwork),
            "proximity_risk" => Some(PatternType::ProximityRisk),
            "motif_fanin" => Some(PatternType::MotifFanin),
            "motif_fanout" => Some(PatternType::MotifFanout),
            "temporal_burst" => Some(PatternType::TemporalBurst),
            "threshold_evasion" => Some(PatternType::ThresholdEvasion),
            _ => None,
        }
    }

    /// The storage family this pattern type belongs to. Both motif kinds
    /// share the motif collection.
    #[must_use]
    pub const fn family(&self) -> PatternFamily {
        match self {
            PatternType::Cycle => PatternFamily::Cycle,
            PatternType::LayeringPath => PatternFamily::Layering,
            PatternType::SmurfingNetwork => PatternFamily::Network,
            PatternType::ProximityRisk => PatternFamily::Proximity,
            PatternType::MotifFanin | PatternType::MotifFanout => PatternFamily::Motif,
            PatternType::TemporalBurst => PatternFamily::Burst,
            PatternType::ThresholdEvasion => PatternFamily::Threshold,
        }
    }

    /// Baseline risk classification for this pattern type.
    #[must_use]
    pub const fn risk_level(&self) -> RiskLevel {
        match self {
            PatternType::Cycle | PatternType::LayeringPath | PatternType::ThresholdEvasion => {
                RiskLevel::High
            }
            PatternType::SmurfingNetwork
            | PatternType::ProximityRisk
            | PatternType::MotifFanin
            | PatternType::MotifFanout => RiskLevel::Medium,
            PatternType::TemporalBurst => RiskLevel::Low,
        }
    }

    /// Returns true if this pattern type is classified as high risk.
    #[must_use]
    pub const fn is_high_risk(&self) -> bool {
        matches!(self.risk_level(), RiskLevel::High | RiskLevel::Critical)
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The seven independently addressable store collections, one per detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternFamily {
    /// Cycle patterns.
    Cycle,
    /// Layering path patterns.
    Layering,
    /// SCC and smurfing network patterns.
    Network,
    /// Proximity-to-risk patterns.
    Proximity,
    /// Fan-in and fan-out motifs.
    Motif,
    /// Temporal burst patterns.
    Burst,
    /// Threshold evasion patterns.
    Threshold,
}

impl PatternFamily {
    /// All seven families, in stable order.
    pub const ALL: &'static [PatternFamily] = &[
        PatternFamily::Cycle,
        PatternFamily::Layering,
        PatternFamily::Network,
        PatternFamily::Proximity,
        PatternFamily::Motif,
        PatternFamily::Burst,
        PatternFamily::Threshold,
    ];

    /// Returns the family name as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            PatternFamily::Cycle => "cycle",
            PatternFamily::Layering => "layering",
            PatternFamily::Network => "network",
            PatternFamily::Proximity => "proximity",
            PatternFamily::Motif => "motif",
            PatternFamily::Burst => "burst",
            PatternFamily::Threshold => "threshold",
        }
    }
}

impl fmt::Display for PatternFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Baseline risk classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Low risk.
    Low,
    /// Medium risk.
    Medium,
    /// High risk.
    High,
    /// Critical risk.
    Critical,
}

/// Detection method recorded on each pattern instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Elementary cycle enumeration within SCCs.
    CycleDetection,
    /// Bounded simple-path search with volume consistency.
    PathAnalysis,
    /// Strongly connected component analysis.
    SccAnalysis,
    /// Weak-component smurfing analysis.
    NetworkAnalysis,
    /// Multi-source shortest-path proximity search.
    ProximityAnalysis,
    /// Star subgraph census.
    MotifDetection,
    /// Hourly histogram analysis (bursts, threshold timing).
    TemporalAnalysis,
}

impl DetectionMethod {
    /// Returns the method as its wire string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::CycleDetection => "cycle_detection",
            DetectionMethod::PathAnalysis => "path_analysis",
            DetectionMethod::SccAnalysis => "scc_analysis",
            DetectionMethod::NetworkAnalysis => "network_analysis",
            DetectionMethod::ProximityAnalysis => "proximity_analysis",
            DetectionMethod::MotifDetection => "motif_detection",
            DetectionMethod::TemporalAnalysis => "temporal_analysis",
        }
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Fan-in vs fan-out orientation for motif patterns. Part of pattern
/// identity: swapping the kind changes the hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotifKind {
    /// Many senders, one receiver.
    FanIn,
    /// One sender, many receivers.
    FanOut,
}

impl MotifKind {
    /// Returns the kind as its wire string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MotifKind::FanIn => "fanin",
            MotifKind::FanOut => "fanout",
        }
    }

    /// The pattern type for this motif orientation.
    #[must_use]
    pub const fn pattern_type(&self) -> PatternType {
        match self {
            MotifKind::FanIn => PatternType::MotifFanin,
            MotifKind::FanOut => PatternType::MotifFanout,
        }
    }
}

/// How a network pattern was qualified.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkSubtype {
    /// Qualified as a strongly connected component within size bounds.
    AnomalousScc,
    /// Qualified as a coordinated small-transfer community.
    SmurfingCommunity,
}

/// Type-specific payload, one variant per detector family.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatternPayload {
    /// Circular flow payload.
    Cycle {
        /// Canonical cycle path (lexicographically smallest address first;
        /// traversal direction preserved).
        path: Vec<String>,
        /// Edge count of the cycle.
        length: usize,
        /// Minimum edge volume along the cycle: the value that could
        /// traverse the full loop without external top-up.
        bottleneck_volume_usd: f64,
    },
    /// Layering path payload.
    Layering {
        /// Ordered path from source to destination.
        path: Vec<String>,
        /// Node count of the path.
        depth: usize,
        /// Representative (mean) hop volume.
        volume_usd: f64,
        /// Path origin.
        source_address: String,
        /// Path endpoint.
        destination_address: String,
    },
    /// Network / smurfing payload.
    Network {
        /// Sorted member addresses.
        members: Vec<String>,
        /// Member count.
        size: usize,
        /// Actual edges / possible directed edges among members.
        density: f64,
        /// Members with disproportionately high combined degree.
        hub_addresses: Vec<String>,
        /// How the component qualified.
        subtype: NetworkSubtype,
    },
    /// Proximity-to-risk payload.
    Proximity {
        /// Nearest risk source (first discovered among equally near).
        risk_source_address: String,
        /// Minimum hop distance to any risk source.
        distance_to_risk: u32,
        /// Fixed decay `1 / (distance + 1)`, independent of path volume.
        risk_propagation_score: f64,
    },
    /// Star motif payload.
    Motif {
        /// Fan-in or fan-out.
        motif_kind: MotifKind,
        /// Hub address.
        center_address: String,
        /// Sorted peripheral addresses.
        participants: Vec<String>,
        /// Distinct peripheral address count.
        participant_count: usize,
    },
    /// Temporal burst payload.
    Burst {
        /// Bursting address.
        address: String,
        /// Burst window start (epoch ms).
        burst_start_ms: i64,
        /// Burst window end (epoch ms, exclusive).
        burst_end_ms: i64,
        /// Baseline hourly rate outside the burst interval.
        normal_tx_rate: f64,
        /// Hourly rate inside the burst interval.
        burst_tx_rate: f64,
        /// `burst_tx_rate / normal_tx_rate`.
        burst_intensity: f64,
        /// Standardized deviation of the burst rate against the address's
        /// overall hourly distribution.
        z_score: f64,
        /// Hourly transaction counts for the address over the window.
        hourly_distribution: Vec<u32>,
    },
    /// Threshold evasion payload.
    Threshold {
        /// Structuring address.
        primary_address: String,
        /// Threshold tier name (e.g. "reporting_10k").
        threshold_type: String,
        /// Threshold tier value in USD.
        threshold_value_usd: f64,
        /// Transactions in the near-threshold band.
        transactions_near_threshold: u64,
        /// Mean amount within the band.
        avg_transaction_size: f64,
        /// Maximum amount within the band.
        max_transaction_size: f64,
        /// Fraction of the address's transactions inside the band.
        clustering_score: f64,
        /// `1 - CV` of amounts within the band, floored at zero.
        size_consistency: f64,
        /// Distinct UTC days touched by near-threshold activity.
        unique_days: u32,
        /// Evenness of the activity across the window's days.
        temporal_spread_score: f64,
        /// Combined clustering / consistency / temporal score for ranking.
        threshold_avoidance_score: f64,
    },
}

impl PatternPayload {
    /// The pattern type of this payload.
    #[must_use]
    pub fn pattern_type(&self) -> PatternType {
        match self {
            PatternPayload::Cycle { .. } => PatternType::Cycle,
            PatternPayload::Layering { .. } => PatternType::LayeringPath,
            PatternPayload::Network { .. } => PatternType::SmurfingNetwork,
            PatternPayload::Proximity { .. } => PatternType::ProximityRisk,
            PatternPayload::Motif { motif_kind, .. } => motif_kind.pattern_type(),
            PatternPayload::Burst { .. } => PatternType::TemporalBurst,
            PatternPayload::Threshold { .. } => PatternType::ThresholdEvasion,
        }
    }
}

// ============================================================================
// Pattern Instance
// ============================================================================

/// One detected pattern instance.
///
/// `pattern_hash` is a pure function of the pattern type plus the
/// canonicalized identity fields of that type. It never depends on timing,
/// evidence counts, or version, so reruns over an unchanged graph reproduce
/// identical hash sets.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PatternInstance {
    /// Trailing window length in days.
    pub window_days: u16,
    /// Processing date identifying the partition.
    pub processing_date: NaiveDate,
    /// Stable identifier: `{pattern_type}_{pattern_hash}`.
    pub pattern_id: String,
    /// Pattern type.
    pub pattern_type: PatternType,
    /// Content hash of the canonical identity tuple.
    pub pattern_hash: String,
    /// Involved addresses (ordered or unordered per type).
    pub addresses_involved: Vec<String>,
    /// Role per address, parallel to `addresses_involved`.
    pub address_roles: Vec<String>,
    /// Severity score in `[0, 1]`.
    pub severity_score: f64,
    /// Detector confidence in `[0, 1]`.
    pub confidence_score: f64,
    /// Risk score in `[0, 1]`.
    pub risk_score: f64,
    /// Anomaly score in `[0, 1]`.
    pub anomaly_score: f64,
    /// Earliest activity covered by the pattern (epoch ms).
    pub pattern_start_ms: i64,
    /// Latest activity covered by the pattern (epoch ms).
    pub pattern_end_ms: i64,
    /// Duration in whole hours.
    pub pattern_duration_hours: i64,
    /// Supporting transaction count.
    pub evidence_transaction_count: u64,
    /// Supporting USD volume.
    pub evidence_volume_usd: f64,
    /// How the pattern was detected.
    pub detection_method: DetectionMethod,
    /// Monotonically increasing per `pattern_id`; assigned by the dedup
    /// pass, zero until then.
    pub version: u32,
    /// Type-specific payload.
    pub payload: PatternPayload,
}

impl PatternInstance {
    /// The store collection this instance belongs to.
    #[must_use]
    pub fn family(&self) -> PatternFamily {
        self.pattern_type.family()
    }

    /// Duration in whole hours between two epoch-ms bounds.
    #[must_use]
    pub fn duration_hours(start_ms: i64, end_ms: i64) -> i64 {
        (end_ms.saturating_sub(start_ms)) / 3_600_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_type_round_trip() {
        for pt in [
            PatternType::Cycle,
            PatternType::LayeringPath,
            PatternType::SmurfingNetwork,
            PatternType::ProximityRisk,
            PatternType::MotifFanin,
            PatternType::MotifFanout,
            PatternType::TemporalBurst,
            PatternType::ThresholdEvasion,
        ] {
            assert_eq!(PatternType::parse(pt.as_str()), Some(pt));
        }
        assert_eq!(PatternType::parse("unknown"), None);
    }

    #[test]
    fn test_motif_kinds_share_family() {
        assert_eq!(PatternType::MotifFanin.family(), PatternFamily::Motif);
        assert_eq!(PatternType::MotifFanout.family(), PatternFamily::Motif);
        assert_eq!(PatternFamily::ALL.len(), 7);
    }

    #[test]
    fn test_risk_classification() {
        assert!(PatternType::Cycle.is_high_risk());
        assert!(PatternType::ThresholdEvasion.is_high_risk());
        assert!(!PatternType::TemporalBurst.is_high_risk());
        assert_eq!(PatternType::SmurfingNetwork.risk_level(), RiskLevel::Medium);
    }

    #[test]
    fn test_payload_pattern_type() {
        let payload = PatternPayload::Motif {
            motif_kind: MotifKind::FanOut,
            center_address: "hub".to_string(),
            participants: vec![],
            participant_count: 0,
        };
        assert_eq!(payload.pattern_type(), PatternType::MotifFanout);
    }

    #[test]
    fn test_duration_hours() {
        assert_eq!(PatternInstance::duration_hours(0, 7_200_000), 2);
        assert_eq!(PatternInstance::duration_hours(7_200_000, 0), 0);
    }
}
