// ─────────────────────────────────────────────────────────────────────
// Principia Kernel — Covariance Linear Algebra
// ─────────────────────────────────────────────────────────────────────
//! Covariance construction and inversion for correlated chi-square.
//!
//! Covariance matrices are symmetric positive definite, so inversion goes
//! through Cholesky; a failed factorisation is reported rather than
//! silently regularised.

use nalgebra::{DMatrix, DVector};

use pm_types::{PmError, PmResult};

const SYMMETRY_TOL: f64 = 1e-12;

/// Build C_ij = ρ_ij σ_i σ_j from per-observable sigmas and a correlation
/// matrix given as rows.
pub fn covariance_from_correlation(
    sigmas: &[f64],
    correlation: &[Vec<f64>],
) -> PmResult<DMatrix<f64>> {
    let n = sigmas.len();
    if correlation.len() != n || correlation.iter().any(|row| row.len() != n) {
        return Err(PmError::Dimension(format!(
            "correlation must be {n}x{n} to match {n} sigmas"
        )));
    }
    for (i, &s) in sigmas.iter().enumerate() {
        if !(s.is_finite() && s > 0.0) {
            return Err(PmError::Numerical(format!(
                "sigma[{i}] must be finite and > 0, got {s}"
            )));
        }
    }
    for i in 0..n {
        if (correlation[i][i] - 1.0).abs() > SYMMETRY_TOL {
            return Err(PmError::Numerical(format!(
                "correlation diagonal must be 1, got rho[{i}][{i}] = {}",
                correlation[i][i]
            )));
        }
        for j in 0..n {
            let rho = correlation[i][j];
            if !rho.is_finite() || rho.abs() > 1.0 {
                return Err(PmError::Numerical(format!(
                    "rho[{i}][{j}] must be in [-1, 1], got {rho}"
                )));
            }
            if (rho - correlation[j][i]).abs() > SYMMETRY_TOL {
                return Err(PmError::Numerical(format!(
                    "correlation is not symmetric at ({i}, {j})"
                )));
            }
        }
    }
    Ok(DMatrix::from_fn(n, n, |i, j| {
        correlation[i][j] * sigmas[i] * sigmas[j]
    }))
}

/// Invert a symmetric positive-definite matrix via Cholesky.
pub fn invert_spd(cov: &DMatrix<f64>) -> PmResult<DMatrix<f64>> {
    if !cov.is_square() {
        return Err(PmError::Dimension(format!(
            "covariance must be square, got {}x{}",
            cov.nrows(),
            cov.ncols()
        )));
    }
    if cov.iter().any(|v| !v.is_finite()) {
        return Err(PmError::Numerical(
            "covariance contains non-finite entries".to_string(),
        ));
    }
    let n = cov.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let scale = cov[(i, j)].abs().max(cov[(j, i)].abs());
            if (cov[(i, j)] - cov[(j, i)]).abs() > SYMMETRY_TOL * scale {
                return Err(PmError::Numerical(format!(
                    "covariance is not symmetric at ({i}, {j})"
                )));
            }
        }
    }
    let not_pd = || PmError::NotPositiveDefinite(format!("{n}x{n} covariance"));
    let chol = cov.clone().cholesky().ok_or_else(not_pd)?;

    // A vanishing pivot passes the factorisation but the matrix is
    // singular. Each pivot is judged against its own variance so the test
    // does not depend on the units of the observables.
    let pivots = chol.l_dirty().diagonal();
    if pivots
        .iter()
        .zip(cov.diagonal().iter())
        .any(|(&l, &c)| l * l <= f64::EPSILON * c)
    {
        return Err(not_pd());
    }

    let inverse = chol.inverse();
    if inverse.iter().any(|v| !v.is_finite()) {
        return Err(not_pd());
    }
    Ok(inverse)
}

/// Quadratic form rᵀ M r.
pub fn quadratic_form(residuals: &[f64], matrix: &DMatrix<f64>) -> PmResult<f64> {
    let n = residuals.len();
    if matrix.nrows() != n || matrix.ncols() != n {
        return Err(PmError::Dimension(format!(
            "{} residuals against a {}x{} matrix",
            n,
            matrix.nrows(),
            matrix.ncols()
        )));
    }
    let r = DVector::from_column_slice(residuals);
    Ok(r.dot(&(matrix * &r)))
}
