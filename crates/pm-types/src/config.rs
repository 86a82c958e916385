// ─────────────────────────────────────────────────────────────────────
// Principia Kernel — Configuration
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

use crate::error::{PmError, PmResult};

/// Runtime configuration shared by the registry, runner and gates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Relative tolerance for tolerance gates.
    /// Default: 1e-3.
    pub rel_tolerance: f64,

    /// Maximum |pull| (in combined sigma) for a sigma gate to pass.
    /// Default: 3.0.
    pub sigma_threshold: f64,

    /// Minimum chi-square p-value for a goodness-of-fit gate to pass.
    /// Default: 0.05.
    pub p_value_floor: f64,

    /// Halt the run at the first failing formula.
    /// Default: false (failures only skip their dependents).
    pub stop_on_error: bool,

    /// Let formulas overwrite `Established` entries owned by another source.
    /// Default: false.
    pub allow_overwrite_established: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            rel_tolerance: 1e-3,
            sigma_threshold: 3.0,
            p_value_floor: 0.05,
            stop_on_error: false,
            allow_overwrite_established: false,
        }
    }
}

impl KernelConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> PmResult<()> {
        if !(self.rel_tolerance > 0.0 && self.rel_tolerance <= 1.0) {
            return Err(PmError::Config(format!(
                "rel_tolerance must be in (0, 1], got {}",
                self.rel_tolerance
            )));
        }
        if !(self.sigma_threshold > 0.0 && self.sigma_threshold.is_finite()) {
            return Err(PmError::Config(format!(
                "sigma_threshold must be finite and > 0, got {}",
                self.sigma_threshold
            )));
        }
        if !(self.p_value_floor > 0.0 && self.p_value_floor < 1.0) {
            return Err(PmError::Config(format!(
                "p_value_floor must be in (0, 1), got {}",
                self.p_value_floor
            )));
        }
        Ok(())
    }

    /// Load from JSON string. Missing fields take their defaults.
    pub fn from_json(json: &str) -> PmResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PmError::Config(format!("JSON parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> PmResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(KernelConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_tolerance() {
        let cfg = KernelConfig {
            rel_tolerance: 0.0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(PmError::Config(_))));
    }

    #[test]
    fn test_rejects_nan_sigma_threshold() {
        let cfg = KernelConfig {
            sigma_threshold: f64::NAN,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_p_floor_of_one() {
        let cfg = KernelConfig {
            p_value_floor: 1.0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg = KernelConfig::from_json(r#"{"sigma_threshold": 2.0}"#).unwrap();
        assert_eq!(cfg.sigma_threshold, 2.0);
        assert_eq!(cfg.rel_tolerance, 1e-3);
        assert!(!cfg.stop_on_error);
    }

    #[test]
    fn test_invalid_json_value_rejected() {
        let err = KernelConfig::from_json(r#"{"p_value_floor": 2.0}"#).unwrap_err();
        assert!(err.to_string().contains("p_value_floor"));
    }

    #[test]
    fn test_malformed_json() {
        let err = KernelConfig::from_json("{").unwrap_err();
        assert!(err.to_string().contains("JSON parse error"));
    }
}
