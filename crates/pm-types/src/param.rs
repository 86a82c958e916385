// ─────────────────────────────────────────────────────────────────────
// Principia Kernel — Parameter Types
// ─────────────────────────────────────────────────────────────────────
//! Registry rows: a scalar value plus provenance (who wrote it, what
//! kind of value it is) and an optional experimental comparison bound.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PmError, PmResult};

/// Provenance tag of a registered value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParamStatus {
    /// Externally accepted input (measured constant, exact SI value).
    Established,
    /// Hand-chosen model input.
    Seed,
    /// Computed by a formula from other registry values.
    Derived,
    /// Fitted against data.
    Calibrated,
    /// Computed value intended for comparison with experiment.
    Predicted,
}

impl ParamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamStatus::Established => "ESTABLISHED",
            ParamStatus::Seed => "SEED",
            ParamStatus::Derived => "DERIVED",
            ParamStatus::Calibrated => "CALIBRATED",
            ParamStatus::Predicted => "PREDICTED",
        }
    }

    /// Parse a status tag, case-insensitive.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.to_ascii_uppercase().as_str() {
            "ESTABLISHED" => Some(ParamStatus::Established),
            "SEED" => Some(ParamStatus::Seed),
            "DERIVED" => Some(ParamStatus::Derived),
            "CALIBRATED" => Some(ParamStatus::Calibrated),
            "PREDICTED" => Some(ParamStatus::Predicted),
            _ => None,
        }
    }
}

impl fmt::Display for ParamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Experimental comparison bound attached to a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentalBound {
    /// Central measured value.
    pub value: f64,
    /// One-sigma uncertainty (0 for exact values).
    pub sigma: f64,
    /// Dataset label, e.g. "CODATA 2022".
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<f64>,
}

impl ExperimentalBound {
    pub fn new(value: f64, sigma: f64, source: impl Into<String>) -> Self {
        Self {
            value,
            sigma,
            source: source.into(),
            lower: None,
            upper: None,
        }
    }

    /// Explicit (possibly asymmetric) acceptance interval.
    pub fn with_interval(mut self, lower: f64, upper: f64) -> Self {
        self.lower = Some(lower);
        self.upper = Some(upper);
        self
    }

    pub fn validate(&self) -> PmResult<()> {
        if !self.value.is_finite() || !self.sigma.is_finite() {
            return Err(PmError::Numerical(format!(
                "experimental bound from '{}' is not finite",
                self.source
            )));
        }
        if self.sigma < 0.0 {
            return Err(PmError::Numerical(format!(
                "experimental sigma must be >= 0, got {}",
                self.sigma
            )));
        }
        if let (Some(lo), Some(hi)) = (self.lower, self.upper) {
            if lo > hi {
                return Err(PmError::Numerical(format!(
                    "experimental interval is inverted: [{lo}, {hi}]"
                )));
            }
        }
        Ok(())
    }

    /// Acceptance interval: the explicit bounds when set, else value ± sigma.
    pub fn interval(&self) -> (f64, f64) {
        (
            self.lower.unwrap_or(self.value - self.sigma),
            self.upper.unwrap_or(self.value + self.sigma),
        )
    }

    pub fn contains(&self, x: f64) -> bool {
        let (lo, hi) = self.interval();
        (lo..=hi).contains(&x)
    }
}

/// One registry row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamEntry {
    pub path: String,
    pub value: f64,
    /// Module or formula id that wrote the value.
    pub source: String,
    pub status: ParamStatus,
    /// Theory-side one-sigma uncertainty, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental: Option<ExperimentalBound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// 1 on first write, incremented on each overwrite.
    #[serde(default = "first_revision")]
    pub revision: u32,
}

fn first_revision() -> u32 {
    1
}

impl ParamEntry {
    pub fn new(
        path: impl Into<String>,
        value: f64,
        source: impl Into<String>,
        status: ParamStatus,
    ) -> Self {
        Self {
            path: path.into(),
            value,
            source: source.into(),
            status,
            uncertainty: None,
            experimental: None,
            description: None,
            revision: 1,
        }
    }

    pub fn with_uncertainty(mut self, sigma: f64) -> Self {
        self.uncertainty = Some(sigma);
        self
    }

    pub fn with_experimental(mut self, bound: ExperimentalBound) -> Self {
        self.experimental = Some(bound);
        self
    }

    pub fn with_description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Check path, finiteness of every number and bound consistency.
    pub fn validate(&self) -> PmResult<()> {
        validate_path(&self.path)?;
        if !self.value.is_finite() {
            return Err(PmError::Numerical(format!(
                "value for '{}' is not finite: {}",
                self.path, self.value
            )));
        }
        if let Some(u) = self.uncertainty {
            if !u.is_finite() || u < 0.0 {
                return Err(PmError::Numerical(format!(
                    "uncertainty for '{}' must be finite and >= 0, got {u}",
                    self.path
                )));
            }
        }
        if let Some(bound) = &self.experimental {
            bound.validate()?;
        }
        Ok(())
    }
}

/// Validate a dotted parameter path such as `geometry.alpha_inverse`.
pub fn validate_path(path: &str) -> PmResult<()> {
    let invalid = |reason: &str| PmError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };
    if path.is_empty() {
        return Err(invalid("empty path"));
    }
    for segment in path.split('.') {
        if segment.is_empty() {
            return Err(invalid("empty segment"));
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(invalid("segments may only contain [A-Za-z0-9_]"));
        }
    }
    Ok(())
}
