//! Blame tuning parameters.
//!
//! Floats are quantized to integers before hashing, so `params_hash` does
//! not depend on float formatting.

use serde::{Deserialize, Serialize};

use crate::canonical::canonical_hash_hex;

/// Quantization factor for float normalization.
const FLOAT_QUANTIZATION_FACTOR: f64 = 1_000_000.0;

/// Default number of nodes assumed per way when weighting progress.
pub const DEFAULT_ASSUMED_WAY_NODE_COUNT: usize = 50;

/// Default maximum total length of a roundabout cycle, in meters.
pub const DEFAULT_ROUNDABOUT_MAX_LENGTH_M: f64 = 1000.0;

/// Default maximum relation nesting depth.
pub const DEFAULT_MAX_MEMBERSHIP_DEPTH: usize = 32;

/// Blame configuration.
///
/// ## Parameters
///
/// - `assumed_way_node_count`: progress weight of a way member, in nodes,
///   used before its real node count is known
/// - `roundabout_max_length_m`: a chain of paths longer than this is never
///   considered a roundabout
/// - `max_membership_depth`: members nested deeper than this below the root
///   are skipped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlameConfig {
    /// Assumed nodes per way for progress weighting.
    pub assumed_way_node_count: usize,
    /// Roundabout length threshold in meters.
    pub roundabout_max_length_m: f64,
    /// Relation nesting bound.
    pub max_membership_depth: usize,
}

#[derive(Serialize)]
struct QuantizedBlameConfig {
    assumed_way_node_count: usize,
    roundabout_max_length_mm: i64,
    max_membership_depth: usize,
}

impl BlameConfig {
    /// Create a configuration with custom parameters.
    pub fn new(assumed_way_node_count: usize, roundabout_max_length_m: f64, max_membership_depth: usize) -> Self {
        Self {
            assumed_way_node_count: assumed_way_node_count.max(1),
            roundabout_max_length_m: roundabout_max_length_m.max(0.0),
            max_membership_depth: max_membership_depth.max(1),
        }
    }

    /// Hash of the parameters, for callers caching results per configuration.
    pub fn params_hash(&self) -> String {
        canonical_hash_hex(&QuantizedBlameConfig {
            assumed_way_node_count: self.assumed_way_node_count,
            roundabout_max_length_mm: (self.roundabout_max_length_m * FLOAT_QUANTIZATION_FACTOR / 1000.0).round() as i64,
            max_membership_depth: self.max_membership_depth,
        })
    }
}

impl Default for BlameConfig {
    fn default() -> Self {
        Self {
            assumed_way_node_count: DEFAULT_ASSUMED_WAY_NODE_COUNT,
            roundabout_max_length_m: DEFAULT_ROUNDABOUT_MAX_LENGTH_M,
            max_membership_depth: DEFAULT_MAX_MEMBERSHIP_DEPTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BlameConfig::default();
        assert_eq!(config.assumed_way_node_count, 50);
        assert_eq!(config.roundabout_max_length_m, 1000.0);
    }

    #[test]
    fn test_params_hash_determinism() {
        assert_eq!(BlameConfig::default().params_hash(), BlameConfig::default().params_hash());
    }

    #[test]
    fn test_params_hash_changes() {
        let mut other = BlameConfig::default();
        other.roundabout_max_length_m = 500.0;
        assert_ne!(BlameConfig::default().params_hash(), other.params_hash());
    }

    #[test]
    fn test_new_clamps() {
        let config = BlameConfig::new(0, -5.0, 0);
        assert_eq!(config.assumed_way_node_count, 1);
        assert_eq!(config.roundabout_max_length_m, 0.0);
        assert_eq!(config.max_membership_depth, 1);
    }
}
