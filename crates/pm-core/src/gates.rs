// ─────────────────────────────────────────────────────────────────────
// Principia Kernel — Gate Checks and Certificates
// ─────────────────────────────────────────────────────────────────────
//! Gate checks turn a numeric comparison into a PASS/FAIL `CheckResult`;
//! the `Certifier` bundles them into a `Certificate` for one subject.
//!
//! Checks never return errors: a comparison that cannot be made (unknown
//! path, missing bound, NaN) is itself a failed check.

use serde_json::json;

use pm_stats::{chi_square_covariance, chi_square_diagonal, ChiSquareResult, Observable};
use pm_types::{Certificate, CheckResult, KernelConfig, PmError, PmResult};

use crate::registry::{Comparison, ParamRegistry};

/// Tolerance below which a value counts as an integer.
const INTEGRAL_TOL: f64 = 1e-9;

/// |computed − reference| ≤ rel_tol·|reference| (absolute when reference is 0).
pub fn check_tolerance(name: &str, computed: f64, reference: f64, rel_tol: f64) -> CheckResult {
    if !computed.is_finite() || !reference.is_finite() {
        return CheckResult::fail(name, format!("non-finite comparison: {computed} vs {reference}"));
    }
    let deviation = (computed - reference).abs();
    let allowed = if reference == 0.0 {
        rel_tol
    } else {
        rel_tol * reference.abs()
    };
    let metrics = json!({
        "computed": computed,
        "reference": reference,
        "deviation": deviation,
        "allowed": allowed,
    });
    if deviation <= allowed {
        CheckResult::pass(
            name,
            format!("{computed} within {rel_tol:e} of {reference}"),
        )
        .with_metrics(metrics)
    } else {
        CheckResult::fail(
            name,
            format!("{computed} deviates from {reference} by {deviation:e} (allowed {allowed:e})"),
        )
        .with_metrics(metrics)
    }
}

/// |pull| ≤ threshold. Exact references (no pull) require equality.
pub fn check_sigma(name: &str, comparison: &Comparison, threshold: f64) -> CheckResult {
    let metrics = json!({
        "computed": comparison.computed,
        "experimental": comparison.experimental,
        "sigma": comparison.sigma,
        "pull": comparison.pull,
        "source": comparison.reference_source,
    });
    match comparison.pull {
        Some(pull) if pull.abs() <= threshold => CheckResult::pass(
            name,
            format!("{:.2} sigma from {}", pull.abs(), comparison.reference_source),
        )
        .with_metrics(metrics),
        Some(pull) => CheckResult::fail(
            name,
            format!(
                "{:.2} sigma from {} (threshold {threshold})",
                pull.abs(),
                comparison.reference_source
            ),
        )
        .with_metrics(metrics),
        None if comparison.deviation == 0.0 => {
            CheckResult::pass(name, "matches exact reference").with_metrics(metrics)
        }
        None => CheckResult::fail(
            name,
            format!(
                "differs from exact reference by {:e}",
                comparison.deviation
            ),
        )
        .with_metrics(metrics),
    }
}

/// Value is integral and equal to `expected`.
pub fn check_exact(name: &str, computed: f64, expected: i64) -> CheckResult {
    let rounded = computed.round();
    if !computed.is_finite() || (computed - rounded).abs() > INTEGRAL_TOL {
        return CheckResult::fail(name, format!("{computed} is not an integer"));
    }
    if rounded == expected as f64 {
        CheckResult::pass(name, format!("{expected} exactly"))
    } else {
        CheckResult::fail(name, format!("expected {expected}, got {rounded}"))
    }
}

/// lo ≤ value ≤ hi.
pub fn check_range(name: &str, value: f64, lo: f64, hi: f64) -> CheckResult {
    if (lo..=hi).contains(&value) {
        CheckResult::pass(name, format!("{value} in [{lo}, {hi}]"))
    } else {
        CheckResult::fail(name, format!("{value} outside [{lo}, {hi}]"))
    }
}

/// p-value ≥ p_floor.
pub fn check_chi_square(name: &str, result: &ChiSquareResult, p_floor: f64) -> CheckResult {
    let metrics = json!({
        "chi2": result.chi2,
        "dof": result.dof,
        "reduced": result.reduced,
        "p_value": result.p_value,
        "sigma_equivalent": result.sigma_equivalent,
    });
    let message = format!(
        "chi2/dof = {:.3}/{} (p = {:.3e})",
        result.chi2, result.dof, result.p_value
    );
    if result.p_value >= p_floor {
        CheckResult::pass(name, message).with_metrics(metrics)
    } else {
        CheckResult::fail(name, format!("{message} below p floor {p_floor}")).with_metrics(metrics)
    }
}

/// Builds certificates from registry contents.
pub struct Certifier<'a> {
    registry: &'a ParamRegistry,
    config: KernelConfig,
}

impl<'a> Certifier<'a> {
    pub fn new(registry: &'a ParamRegistry, config: KernelConfig) -> Self {
        Self { registry, config }
    }

    /// Tolerance check of a registry value against a reference number.
    pub fn tolerance(&self, path: &str, reference: f64) -> CheckResult {
        match self.registry.get(path) {
            Some(value) => check_tolerance(path, value, reference, self.config.rel_tolerance),
            None => CheckResult::fail(path, "parameter not registered"),
        }
    }

    /// Sigma check of a registry value against its attached bound.
    pub fn sigma(&self, path: &str) -> CheckResult {
        match self.registry.compare(path) {
            Ok(comparison) => check_sigma(path, &comparison, self.config.sigma_threshold),
            Err(e) => CheckResult::fail(path, e.to_string()),
        }
    }

    /// Chi-square over the given bounded paths. Each observable uses the
    /// combined experimental and theory sigma from `compare`.
    pub fn chi_square(
        &self,
        paths: &[&str],
        correlation: Option<&[Vec<f64>]>,
    ) -> PmResult<ChiSquareResult> {
        let mut observables = Vec::with_capacity(paths.len());
        for path in paths {
            let c = self.registry.compare(path)?;
            if c.sigma <= 0.0 {
                return Err(PmError::Numerical(format!(
                    "'{path}' has zero combined sigma; exact values cannot enter chi2"
                )));
            }
            observables.push(Observable::new(*path, c.computed, c.experimental, c.sigma));
        }
        match correlation {
            Some(rho) => chi_square_covariance(&observables, rho, 0),
            None => chi_square_diagonal(&observables, 0),
        }
    }

    /// Chi-square gate over the given paths; errors become a failed check.
    pub fn chi_square_gate(
        &self,
        name: &str,
        paths: &[&str],
        correlation: Option<&[Vec<f64>]>,
    ) -> CheckResult {
        match self.chi_square(paths, correlation) {
            Ok(result) => check_chi_square(name, &result, self.config.p_value_floor),
            Err(e) => CheckResult::fail(name, e.to_string()),
        }
    }

    /// One sigma check per registry entry that carries a bound.
    pub fn certify_registry(&self, subject: &str) -> Certificate {
        let checks = self
            .registry
            .compare_all()
            .iter()
            .map(|c| check_sigma(&c.path, c, self.config.sigma_threshold))
            .collect();
        self.certify(subject, checks)
    }

    /// Wrap checks in a certificate, logging failures.
    pub fn certify(&self, subject: &str, checks: Vec<CheckResult>) -> Certificate {
        let cert = Certificate::new(subject, checks);
        for failure in cert.failures() {
            log::warn!("[{subject}] gate {} FAIL: {}", failure.name, failure.message);
        }
        log::info!("{}", cert.summary());
        cert
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pm_types::{ExperimentalBound, ParamEntry, ParamStatus, Verdict};

    fn comparison(computed: f64, experimental: f64, sigma: f64) -> Comparison {
        let deviation = computed - experimental;
        Comparison {
            path: "x".into(),
            computed,
            experimental,
            reference_source: "test".into(),
            sigma,
            deviation,
            rel_deviation: None,
            pull: (sigma > 0.0).then(|| deviation / sigma),
            within_interval: false,
        }
    }

    fn bounded(reg: &ParamRegistry, path: &str, value: f64, exp: f64, sigma: f64) {
        reg.set_entry(
            ParamEntry::new(path, value, "f", ParamStatus::Predicted)
                .with_experimental(ExperimentalBound::new(exp, sigma, "ref")),
        )
        .unwrap();
    }

    #[test]
    fn test_tolerance_pass_and_fail() {
        assert!(check_tolerance("a", 137.036, 137.035999, 1e-6).passed);
        assert!(!check_tolerance("a", 137.1, 137.035999, 1e-6).passed);
    }

    #[test]
    fn test_tolerance_zero_reference_is_absolute() {
        assert!(check_tolerance("z", 1e-4, 0.0, 1e-3).passed);
        assert!(!check_tolerance("z", 1e-2, 0.0, 1e-3).passed);
    }

    #[test]
    fn test_tolerance_nan_fails() {
        assert!(!check_tolerance("n", f64::NAN, 1.0, 0.1).passed);
    }

    #[test]
    fn test_sigma_gate() {
        assert!(check_sigma("s", &comparison(10.2, 10.0, 0.1), 3.0).passed);
        assert!(!check_sigma("s", &comparison(10.4, 10.0, 0.1), 3.0).passed);
    }

    #[test]
    fn test_sigma_gate_exact_reference() {
        assert!(check_sigma("e", &comparison(3.0, 3.0, 0.0), 3.0).passed);
        assert!(!check_sigma("e", &comparison(3.0001, 3.0, 0.0), 3.0).passed);
    }

    #[test]
    fn test_exact() {
        assert!(check_exact("n_gen", 3.0, 3).passed);
        assert!(!check_exact("n_gen", 3.0, 4).passed);
        assert!(!check_exact("n_gen", 3.2, 3).passed);
        assert!(!check_exact("n_gen", f64::NAN, 3).passed);
    }

    #[test]
    fn test_range() {
        assert!(check_range("r", 0.5, 0.0, 1.0).passed);
        assert!(check_range("r", 1.0, 0.0, 1.0).passed);
        assert!(!check_range("r", 1.5, 0.0, 1.0).passed);
    }

    #[test]
    fn test_certifier_unknown_path_fails() {
        let reg = ParamRegistry::new();
        let cert = Certifier::new(&reg, KernelConfig::default());
        assert!(!cert.tolerance("missing", 1.0).passed);
        assert!(!cert.sigma("missing").passed);
    }

    #[test]
    fn test_certify_registry() {
        let reg = ParamRegistry::new();
        bounded(&reg, "good", 1.01, 1.0, 0.01);
        bounded(&reg, "bad", 2.0, 1.0, 0.01);
        reg.set("unbounded", 5.0, "f", ParamStatus::Derived).unwrap();

        let certifier = Certifier::new(&reg, KernelConfig::default());
        let cert = certifier.certify_registry("all");
        assert_eq!(cert.checks.len(), 2);
        assert_eq!(cert.verdict, Verdict::Fail);
        assert_eq!(cert.failures().next().unwrap().name, "bad");
    }

    #[test]
    fn test_chi_square_gate_passes_for_good_agreement() {
        let reg = ParamRegistry::new();
        bounded(&reg, "a", 1.0, 1.0, 0.1);
        bounded(&reg, "b", 2.05, 2.0, 0.1);
        let certifier = Certifier::new(&reg, KernelConfig::default());
        let check = certifier.chi_square_gate("fit", &["a", "b"], None);
        assert!(check.passed, "{}", check.message);
    }

    #[test]
    fn test_chi_square_gate_fails_for_bad_agreement() {
        let reg = ParamRegistry::new();
        bounded(&reg, "a", 2.0, 1.0, 0.1);
        bounded(&reg, "b", 3.0, 2.0, 0.1);
        let certifier = Certifier::new(&reg, KernelConfig::default());
        assert!(!certifier.chi_square_gate("fit", &["a", "b"], None).passed);
    }

    #[test]
    fn test_chi_square_with_correlation() {
        let reg = ParamRegistry::new();
        bounded(&reg, "a", 1.1, 1.0, 0.1);
        bounded(&reg, "b", 2.1, 2.0, 0.1);
        let certifier = Certifier::new(&reg, KernelConfig::default());
        let rho = vec![vec![1.0, 0.5], vec![0.5, 1.0]];
        let result = certifier.chi_square(&["a", "b"], Some(rho.as_slice())).unwrap();
        assert!((result.chi2 - 4.0 / 3.0).abs() < 1e-9, "chi2 = {}", result.chi2);
    }

    #[test]
    fn test_chi_square_rejects_exact_reference() {
        let reg = ParamRegistry::new();
        bounded(&reg, "c", 1.0, 1.0, 0.0);
        let certifier = Certifier::new(&reg, KernelConfig::default());
        assert!(certifier.chi_square(&["c"], None).is_err());
        assert!(!certifier.chi_square_gate("fit", &["c"], None).passed);
    }
}
