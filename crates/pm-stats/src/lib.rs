// ─────────────────────────────────────────────────────────────────────
// Principia Kernel — Statistics
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Goodness-of-fit statistics for comparing computed values against
//! reference data.
//!
//!   - `linalg`: correlation → covariance, Cholesky inverse, quadratic form
//!   - `chi2`: diagonal and full-covariance chi-square, p-value, sigma
//!     equivalent, per-observable pulls

pub mod chi2;
pub mod linalg;

pub use chi2::{
    chi_square_covariance, chi_square_diagonal, chi_square_from_covariance, p_value,
    sigma_equivalent, ChiSquareResult, Observable, Pull,
};
pub use linalg::{covariance_from_correlation, invert_spd, quadratic_form};
