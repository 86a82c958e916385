// ─────────────────────────────────────────────────────────────────────
// Principia Kernel — Chi-Square Goodness of Fit
// ─────────────────────────────────────────────────────────────────────
//! χ² = rᵀ C⁻¹ r over residuals r = predicted − observed.
//!
//! With uncorrelated observables C is diagonal and χ² reduces to the sum
//! of squared pulls. The p-value is the upper tail of the χ² distribution
//! with `n − n_fitted` degrees of freedom, and the sigma equivalent is the
//! two-sided Gaussian significance of that p-value.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

use pm_types::{PmError, PmResult};

use crate::linalg::{covariance_from_correlation, invert_spd, quadratic_form};

/// Smallest p-value fed to the normal quantile; keeps the sigma finite.
const P_FLOOR: f64 = 1e-300;

/// One compared quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observable {
    pub name: String,
    pub predicted: f64,
    pub observed: f64,
    /// One-sigma uncertainty of the comparison. Must be > 0.
    pub sigma: f64,
}

impl Observable {
    pub fn new(name: impl Into<String>, predicted: f64, observed: f64, sigma: f64) -> Self {
        Self {
            name: name.into(),
            predicted,
            observed,
            sigma,
        }
    }

    pub fn residual(&self) -> f64 {
        self.predicted - self.observed
    }

    pub fn pull(&self) -> f64 {
        self.residual() / self.sigma
    }

    fn validate(&self) -> PmResult<()> {
        if !self.predicted.is_finite() || !self.observed.is_finite() {
            return Err(PmError::Numerical(format!(
                "observable '{}' has non-finite values",
                self.name
            )));
        }
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(PmError::Numerical(format!(
                "observable '{}' sigma must be finite and > 0, got {}",
                self.name, self.sigma
            )));
        }
        Ok(())
    }
}

/// Per-observable pull (residual / sigma).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pull {
    pub name: String,
    pub value: f64,
}

/// Outcome of a chi-square test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChiSquareResult {
    pub chi2: f64,
    pub dof: usize,
    /// χ² / dof.
    pub reduced: f64,
    pub p_value: f64,
    pub sigma_equivalent: f64,
    pub pulls: Vec<Pull>,
}

impl ChiSquareResult {
    /// Largest |pull|, with its observable name.
    pub fn worst_pull(&self) -> Option<&Pull> {
        self.pulls
            .iter()
            .max_by(|a, b| a.value.abs().total_cmp(&b.value.abs()))
    }
}

/// Upper-tail probability P(X ≥ chi2) for X ~ χ²(dof).
pub fn p_value(chi2: f64, dof: usize) -> PmResult<f64> {
    if !chi2.is_finite() || chi2 < 0.0 {
        return Err(PmError::Numerical(format!(
            "chi2 must be finite and >= 0, got {chi2}"
        )));
    }
    if dof == 0 {
        return Err(PmError::DegreesOfFreedom {
            observations: 0,
            fitted: 0,
        });
    }
    let dist = ChiSquared::new(dof as f64)
        .map_err(|e| PmError::Numerical(format!("chi-square distribution: {e}")))?;
    Ok(dist.sf(chi2).clamp(0.0, 1.0))
}

/// Two-sided Gaussian significance equivalent to a p-value.
///
/// p = 1 maps to 0σ; p = 0.0455 maps to ≈2σ.
pub fn sigma_equivalent(p: f64) -> f64 {
    if !p.is_finite() || p >= 1.0 {
        return 0.0;
    }
    let p = p.max(P_FLOOR);
    match Normal::new(0.0, 1.0) {
        Ok(normal) => (-normal.inverse_cdf(p / 2.0)).max(0.0),
        Err(_) => 0.0,
    }
}

fn degrees_of_freedom(observations: usize, fitted: usize) -> PmResult<usize> {
    if observations == 0 || fitted >= observations {
        return Err(PmError::DegreesOfFreedom {
            observations,
            fitted,
        });
    }
    Ok(observations - fitted)
}

fn finish(chi2: f64, observables: &[Observable], dof: usize) -> PmResult<ChiSquareResult> {
    let p = p_value(chi2, dof)?;
    let result = ChiSquareResult {
        chi2,
        dof,
        reduced: chi2 / dof as f64,
        p_value: p,
        sigma_equivalent: sigma_equivalent(p),
        pulls: observables
            .iter()
            .map(|o| Pull {
                name: o.name.clone(),
                value: o.pull(),
            })
            .collect(),
    };
    log::debug!(
        "chi2 = {:.4} over {} dof (p = {:.4e}, {:.2} sigma)",
        result.chi2,
        result.dof,
        result.p_value,
        result.sigma_equivalent
    );
    Ok(result)
}

/// Chi-square for uncorrelated observables: Σ pullᵢ².
pub fn chi_square_diagonal(
    observables: &[Observable],
    n_fitted: usize,
) -> PmResult<ChiSquareResult> {
    let dof = degrees_of_freedom(observables.len(), n_fitted)?;
    for o in observables {
        o.validate()?;
    }
    let chi2: f64 = observables.iter().map(|o| o.pull().powi(2)).sum();
    finish(chi2, observables, dof)
}

/// Chi-square with an explicit covariance matrix: rᵀ C⁻¹ r.
///
/// The observables' own sigmas are used only for the reported pulls.
pub fn chi_square_from_covariance(
    observables: &[Observable],
    covariance: &DMatrix<f64>,
    n_fitted: usize,
) -> PmResult<ChiSquareResult> {
    let dof = degrees_of_freedom(observables.len(), n_fitted)?;
    for o in observables {
        o.validate()?;
    }
    let inverse = invert_spd(covariance)?;
    let residuals: Vec<f64> = observables.iter().map(Observable::residual).collect();
    let chi2 = quadratic_form(&residuals, &inverse)?;
    if chi2 < 0.0 {
        return Err(PmError::Numerical(format!(
            "negative chi2 {chi2} from covariance quadratic form"
        )));
    }
    finish(chi2, observables, dof)
}

/// Chi-square with correlations: covariance built from the observables'
/// sigmas and the given correlation matrix.
pub fn chi_square_covariance(
    observables: &[Observable],
    correlation: &[Vec<f64>],
    n_fitted: usize,
) -> PmResult<ChiSquareResult> {
    let sigmas: Vec<f64> = observables.iter().map(|o| o.sigma).collect();
    let covariance = covariance_from_correlation(&sigmas, correlation)?;
    chi_square_from_covariance(observables, &covariance, n_fitted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(name: &str, predicted: f64, observed: f64, sigma: f64) -> Observable {
        Observable::new(name, predicted, observed, sigma)
    }

    #[test]
    fn test_pull() {
        assert!((obs("a", 12.0, 10.0, 0.5).pull() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_diagonal_sum_of_squared_pulls() {
        let set = [obs("a", 1.0, 0.0, 1.0), obs("b", 0.0, 2.0, 1.0)];
        let r = chi_square_diagonal(&set, 0).unwrap();
        assert!((r.chi2 - 5.0).abs() < 1e-12);
        assert_eq!(r.dof, 2);
        assert!((r.reduced - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_perfect_agreement() {
        let set = [obs("a", 1.0, 1.0, 0.1), obs("b", 2.0, 2.0, 0.1)];
        let r = chi_square_diagonal(&set, 0).unwrap();
        assert_eq!(r.chi2, 0.0);
        assert!((r.p_value - 1.0).abs() < 1e-12);
        assert_eq!(r.sigma_equivalent, 0.0);
    }

    #[test]
    fn test_p_value_one_dof_at_one() {
        // P(χ²₁ ≥ 1) = 2(1 − Φ(1)) ≈ 0.3173
        let p = p_value(1.0, 1).unwrap();
        assert!((p - 0.317_310_5).abs() < 1e-6, "p = {p}");
    }

    #[test]
    fn test_p_value_two_dof_closed_form() {
        // χ²₂ upper tail is exp(−x/2).
        let p = p_value(3.0, 2).unwrap();
        assert!((p - (-1.5f64).exp()).abs() < 1e-9, "p = {p}");
    }

    #[test]
    fn test_sigma_equivalent_known_points() {
        assert!((sigma_equivalent(0.317_310_5) - 1.0).abs() < 1e-4);
        assert!((sigma_equivalent(0.045_500_26) - 2.0).abs() < 1e-4);
        assert_eq!(sigma_equivalent(1.0), 0.0);
    }

    #[test]
    fn test_sigma_equivalent_tiny_p_is_finite() {
        let z = sigma_equivalent(0.0);
        assert!(z.is_finite());
        assert!(z > 30.0);
    }

    #[test]
    fn test_covariance_with_identity_matches_diagonal() {
        let set = [obs("a", 1.0, 0.0, 2.0), obs("b", 3.0, 1.0, 1.0)];
        let identity = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let diag = chi_square_diagonal(&set, 0).unwrap();
        let full = chi_square_covariance(&set, &identity, 0).unwrap();
        assert!((diag.chi2 - full.chi2).abs() < 1e-12);
    }

    #[test]
    fn test_covariance_accepts_tiny_sigmas() {
        let set = [
            obs("electron_mass_kg", 9.109e-31, 9.109e-31 + 2.8e-40, 2.8e-40),
            obs("proton_mass_kg", 1.6726e-27, 1.6726e-27, 5.2e-37),
        ];
        let identity = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let diag = chi_square_diagonal(&set, 0).unwrap();
        let full = chi_square_covariance(&set, &identity, 0).unwrap();
        assert!(diag.chi2 > 0.5);
        assert!(((diag.chi2 - full.chi2) / diag.chi2).abs() < 1e-6);
    }

    #[test]
    fn test_positive_correlation_reduces_chi2_for_same_sign_residuals() {
        let set = [obs("a", 1.0, 0.0, 1.0), obs("b", 1.0, 0.0, 1.0)];
        let corr = vec![vec![1.0, 0.5], vec![0.5, 1.0]];
        let r = chi_square_covariance(&set, &corr, 0).unwrap();
        // [1,1] C⁻¹ [1,1] with C = [[1,.5],[.5,1]] → 2 / 1.5
        assert!((r.chi2 - 4.0 / 3.0).abs() < 1e-12, "chi2 = {}", r.chi2);
    }

    #[test]
    fn test_explicit_covariance() {
        let set = [obs("a", 2.0, 0.0, 2.0)];
        let cov = DMatrix::from_row_slice(1, 1, &[4.0]);
        let r = chi_square_from_covariance(&set, &cov, 0).unwrap();
        assert!((r.chi2 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_dof_must_be_positive() {
        let set = [obs("a", 1.0, 0.0, 1.0)];
        assert!(matches!(
            chi_square_diagonal(&set, 1),
            Err(PmError::DegreesOfFreedom { observations: 1, fitted: 1 })
        ));
        assert!(chi_square_diagonal(&[], 0).is_err());
    }

    #[test]
    fn test_zero_sigma_rejected() {
        let set = [obs("a", 1.0, 0.0, 0.0)];
        assert!(matches!(
            chi_square_diagonal(&set, 0),
            Err(PmError::Numerical(_))
        ));
    }

    #[test]
    fn test_worst_pull() {
        let set = [
            obs("a", 1.0, 0.0, 1.0),
            obs("b", -3.0, 0.0, 1.0),
            obs("c", 2.0, 0.0, 1.0),
        ];
        let r = chi_square_diagonal(&set, 0).unwrap();
        assert_eq!(r.worst_pull().unwrap().name, "b");
    }

    #[test]
    fn test_fitted_parameters_reduce_dof() {
        let set = [
            obs("a", 1.0, 0.0, 1.0),
            obs("b", 1.0, 0.0, 1.0),
            obs("c", 1.0, 0.0, 1.0),
        ];
        let r = chi_square_diagonal(&set, 1).unwrap();
        assert_eq!(r.dof, 2);
        assert!((r.reduced - 1.5).abs() < 1e-12);
    }
}
