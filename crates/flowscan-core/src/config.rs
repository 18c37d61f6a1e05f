//! Detection configuration.
//!
//! One section per detector, deserializable from JSON with defaults for
//! every field, so a partial settings file only has to name the values it
//! overrides. Section defaults carry the documented production thresholds.

use crate::error::{DetectError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Full configuration for one detection run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Cycle detection section.
    pub cycle_detection: CycleConfig,
    /// Layering path analysis section.
    pub path_analysis: LayeringConfig,
    /// Network / smurfing analysis section.
    pub network_analysis: NetworkConfig,
    /// Proximity-to-risk section.
    pub proximity_analysis: ProximityConfig,
    /// Motif detection section.
    pub motif_detection: MotifConfig,
    /// Temporal burst section.
    pub burst_detection: BurstConfig,
    /// Threshold evasion section.
    pub threshold_detection: ThresholdConfig,
}

impl DetectionConfig {
    /// Load configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Parse configuration from a JSON string and validate it.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: DetectionConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        let c = &self.cycle_detection;
        if c.min_cycle_length < 2 {
            return Err(DetectError::config("min_cycle_length must be at least 2"));
        }
        if c.max_cycle_length < c.min_cycle_length {
            return Err(DetectError::config(
                "max_cycle_length must be >= min_cycle_length",
            ));
        }
        if c.max_cycle_length > 64 {
            return Err(DetectError::config("max_cycle_length must be <= 64"));
        }

        let p = &self.path_analysis;
        if p.min_path_length < 3 || p.max_path_length < p.min_path_length {
            return Err(DetectError::config(
                "path length bounds must satisfy 3 <= min <= max",
            ));
        }
        if !(0.0..=100.0).contains(&p.high_volume_percentile) {
            return Err(DetectError::config(
                "high_volume_percentile must be in [0, 100]",
            ));
        }

        let n = &self.network_analysis;
        if n.min_scc_size < 2 || n.max_scc_size < n.min_scc_size {
            return Err(DetectError::config(
                "scc size bounds must satisfy 2 <= min <= max",
            ));
        }

        if self.proximity_analysis.max_distance == 0 {
            return Err(DetectError::config("max_distance must be positive"));
        }

        let m = &self.motif_detection;
        if m.min_participants < 2 || m.max_participants < m.min_participants {
            return Err(DetectError::config(
                "motif participant bounds must satisfy 2 <= min <= max",
            ));
        }

        let t = &self.threshold_detection;
        if t.tiers.is_empty() {
            return Err(DetectError::config(
                "threshold_detection requires at least one tier",
            ));
        }
        if t.near_threshold_lower_pct >= t.near_threshold_upper_pct
            || t.near_threshold_upper_pct > 1.0
        {
            return Err(DetectError::config(
                "near-threshold band must satisfy lower < upper <= 1.0",
            ));
        }

        Ok(())
    }
}

/// Cycle detection parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Minimum cycle length (edges).
    pub min_cycle_length: usize,
    /// Maximum cycle length (edges). Validated up to 64.
    pub max_cycle_length: usize,
    /// Enumeration cap per strongly connected component.
    pub max_cycles_per_scc: usize,
    /// Confidence recorded on detected cycles.
    pub confidence_score: f64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            min_cycle_length: 3,
            max_cycle_length: 8,
            max_cycles_per_scc: 1_000,
            confidence_score: 0.8,
        }
    }
}

/// Layering path analysis parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LayeringConfig {
    /// Minimum path depth (nodes).
    pub min_path_length: usize,
    /// Maximum path depth (nodes).
    pub max_path_length: usize,
    /// Global budget on simple paths examined per run.
    pub max_paths_to_check: usize,
    /// Candidate source cap.
    pub max_source_nodes: usize,
    /// Candidate target cap.
    pub max_target_nodes: usize,
    /// Noise floor: only nodes at or above this total-volume percentile
    /// seed the path search.
    pub high_volume_percentile: f64,
    /// Minimum representative hop volume for a qualifying path.
    pub layering_min_volume: f64,
    /// Maximum coefficient of variation across hop volumes.
    pub layering_cv_threshold: f64,
    /// Confidence recorded on detected paths.
    pub confidence_score: f64,
}

impl Default for LayeringConfig {
    fn default() -> Self {
        Self {
            min_path_length: 3,
            max_path_length: 8,
            max_paths_to_check: 10_000,
            max_source_nodes: 20,
            max_target_nodes: 20,
            high_volume_percentile: 90.0,
            layering_min_volume: 1_000.0,
            layering_cv_threshold: 0.5,
            confidence_score: 0.75,
        }
    }
}

/// Network / smurfing analysis parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Minimum qualifying component size.
    pub min_scc_size: usize,
    /// Maximum qualifying component size.
    pub max_scc_size: usize,
    /// Per-transaction amount below which an edge counts as small.
    pub small_transaction_threshold: f64,
    /// Minimum fraction of small edges for the smurfing variant.
    pub small_tx_ratio_threshold: f64,
    /// Z-score divisor when normalizing SCC size anomaly into [0, 1].
    pub z_score_normalization: f64,
    /// Size weight in the smurfing severity formula.
    pub size_severity_weight: f64,
    /// Density weight in the smurfing severity formula.
    pub density_severity_weight: f64,
    /// Component size at which the size factor saturates.
    pub max_size_factor: f64,
    /// Density at which the density factor saturates.
    pub max_density_factor: f64,
    /// Confidence recorded on detected networks.
    pub confidence_score: f64,
    /// Multiplier converting severity into risk.
    pub risk_score_multiplier: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            min_scc_size: 3,
            max_scc_size: 30,
            small_transaction_threshold: 500.0,
            small_tx_ratio_threshold: 0.6,
            z_score_normalization: 3.0,
            size_severity_weight: 0.5,
            density_severity_weight: 0.5,
            max_size_factor: 20.0,
            max_density_factor: 0.5,
            confidence_score: 0.7,
            risk_score_multiplier: 0.8,
        }
    }
}

/// Proximity-to-risk parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximityConfig {
    /// Maximum hop distance from a risk source.
    pub max_distance: u32,
    /// Base severity scaled by the propagation decay.
    pub base_severity: f64,
    /// Confidence recorded on detected proximities.
    pub confidence_score: f64,
    /// Fallback risk identification: minimum total volume.
    pub high_volume_threshold: f64,
    /// Fallback risk identification: minimum combined degree.
    pub high_degree_threshold: usize,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            max_distance: 6,
            base_severity: 0.8,
            confidence_score: 0.75,
            high_volume_threshold: 100_000.0,
            high_degree_threshold: 10,
        }
    }
}

/// Motif detection parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MotifConfig {
    /// Minimum distinct peripheral addresses.
    pub min_participants: usize,
    /// Maximum distinct peripheral addresses.
    pub max_participants: usize,
    /// Maximum out-degree for a fan-in center.
    pub fanin_max_out_degree: usize,
    /// Maximum in-degree for a fan-out center.
    pub fanout_max_in_degree: usize,
    /// Confidence recorded on detected motifs.
    pub confidence_score: f64,
}

impl Default for MotifConfig {
    fn default() -> Self {
        Self {
            min_participants: 5,
            max_participants: 50,
            fanin_max_out_degree: 2,
            fanout_max_in_degree: 2,
            confidence_score: 0.7,
        }
    }
}

/// Temporal burst parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BurstConfig {
    /// Hourly-count z-score above which an hour is burst-candidate.
    pub z_score_threshold: f64,
    /// Minimum transactions inside the burst interval.
    pub min_burst_transactions: u64,
    /// Minimum burst duration in hours.
    pub min_burst_hours: usize,
    /// Minimum burst rate / baseline rate ratio.
    pub min_burst_intensity: f64,
    /// Intensity weight in the severity formula.
    pub intensity_severity_weight: f64,
    /// Volume weight in the severity formula.
    pub volume_severity_weight: f64,
    /// Z-score weight in the severity formula.
    pub z_score_severity_weight: f64,
    /// Confidence recorded on detected bursts.
    pub confidence_score: f64,
    /// Multiplier converting severity into risk.
    pub risk_score_multiplier: f64,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            z_score_threshold: 2.0,
            min_burst_transactions: 10,
            min_burst_hours: 1,
            min_burst_intensity: 3.0,
            intensity_severity_weight: 0.4,
            volume_severity_weight: 0.3,
            z_score_severity_weight: 0.3,
            confidence_score: 0.75,
            risk_score_multiplier: 0.8,
        }
    }
}

/// One regulatory threshold tier.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThresholdTier {
    /// Tier name (enters the pattern identity).
    pub name: String,
    /// Tier value in USD.
    pub value_usd: f64,
}

/// Threshold evasion parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Threshold tiers checked per address.
    pub tiers: Vec<ThresholdTier>,
    /// Lower bound of the near-threshold band, as a fraction of the tier.
    pub near_threshold_lower_pct: f64,
    /// Upper bound of the near-threshold band, as a fraction of the tier.
    pub near_threshold_upper_pct: f64,
    /// Minimum transactions inside the band.
    pub min_transactions_near_threshold: u64,
    /// Minimum fraction of the address's transactions inside the band.
    pub clustering_score_threshold: f64,
    /// Minimum `1 - CV` of the in-band amounts.
    pub size_consistency_threshold: f64,
    /// Clustering weight in the avoidance score.
    pub clustering_severity_weight: f64,
    /// Consistency weight in the avoidance score.
    pub consistency_severity_weight: f64,
    /// Temporal-spread weight in the avoidance score.
    pub temporal_severity_weight: f64,
    /// Confidence recorded on detected evasions.
    pub confidence_score: f64,
    /// Multiplier converting severity into risk.
    pub risk_score_multiplier: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                ThresholdTier {
                    name: "reporting_10k".to_string(),
                    value_usd: 10_000.0,
                },
                ThresholdTier {
                    name: "reporting_50k".to_string(),
                    value_usd: 50_000.0,
                },
                ThresholdTier {
                    name: "reporting_100k".to_string(),
                    value_usd: 100_000.0,
                },
            ],
            near_threshold_lower_pct: 0.80,
            near_threshold_upper_pct: 0.99,
            min_transactions_near_threshold: 5,
            clustering_score_threshold: 0.70,
            size_consistency_threshold: 0.80,
            clustering_severity_weight: 0.4,
            consistency_severity_weight: 0.4,
            temporal_severity_weight: 0.2,
            confidence_score: 0.8,
            risk_score_multiplier: 0.9,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        DetectionConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_overrides() {
        let config = DetectionConfig::from_json_str(
            r#"{ "cycle_detection": { "max_cycle_length": 12 } }"#,
        )
        .unwrap();
        assert_eq!(config.cycle_detection.max_cycle_length, 12);
        // Untouched sections keep their defaults.
        assert_eq!(config.cycle_detection.min_cycle_length, 3);
        assert_eq!(config.motif_detection.min_participants, 5);
    }

    #[test]
    fn test_invalid_cycle_bounds_rejected() {
        let err = DetectionConfig::from_json_str(
            r#"{ "cycle_detection": { "min_cycle_length": 10, "max_cycle_length": 4 } }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_cycle_length"));

        let err = DetectionConfig::from_json_str(
            r#"{ "cycle_detection": { "max_cycle_length": 100 } }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("<= 64"));
    }

    #[test]
    fn test_invalid_band_rejected() {
        let err = DetectionConfig::from_json_str(
            r#"{ "threshold_detection": { "near_threshold_lower_pct": 0.99, "near_threshold_upper_pct": 0.8 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, DetectError::ConfigError(_)));
    }

    #[test]
    fn test_empty_tiers_rejected() {
        let err =
            DetectionConfig::from_json_str(r#"{ "threshold_detection": { "tiers": [] } }"#)
                .unwrap_err();
        assert!(err.to_string().contains("tier"));
    }
}
