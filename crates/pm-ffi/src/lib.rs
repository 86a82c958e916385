// ─────────────────────────────────────────────────────────────────────
// Principia Kernel — PyO3 FFI Bindings
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
// Note: #[deny(unsafe_code)] not applied. PyO3 proc macros generate
// unsafe blocks internally; all hand-written code in this crate is safe.
//! Python-callable wrappers around the registry, runner, and gates.
//!
//! # FFI Safety
//!
//! - GIL acquired via `Python::with_gil` before every formula callback.
//! - Python exceptions raised by a formula become `PmError::Formula`; the
//!   runner records the formula as failed and skips its dependents.
//! - All config validated before storage (`KernelConfig::validate()`).
//!
//! Install: `pip install -e crates/pm-ffi` (requires maturin).
//!
//! Usage from Python:
//! ```python
//! from principia_kernel import Registry, Runner
//!
//! reg = Registry()
//! reg.set("topology.b3", 24.0, "input", "SEED")
//! run = Runner()
//! run.add_formula("generations", ["topology.b3"], ["topology.n_gen"],
//!                 lambda x: {"topology.n_gen": x["topology.b3"] // 8})
//! report = run.run(reg)
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use pyo3::exceptions::{PyKeyError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use pm_core::{
    codata_2022, desi_2024, nufit_5_2, pdg_2024, Certifier, Comparison, FnFormula,
    FormulaInputs, FormulaOutcome, FormulaOutput, ParamRegistry, ReferenceDataset, RunReport,
    SimulationRunner,
};
use pm_stats::{ChiSquareResult, Observable};
use pm_types::{Certificate, ExperimentalBound, KernelConfig, ParamStatus, PmError};

fn to_py_err(e: PmError) -> PyErr {
    match e {
        PmError::UnknownParameter(_) | PmError::UnknownReference { .. } => {
            PyKeyError::new_err(e.to_string())
        }
        other => PyValueError::new_err(other.to_string()),
    }
}

fn parse_status(tag: &str) -> PyResult<ParamStatus> {
    ParamStatus::parse(tag)
        .ok_or_else(|| PyValueError::new_err(format!("unknown parameter status '{tag}'")))
}

fn builtin_dataset(name: &str) -> PyResult<ReferenceDataset> {
    match name.to_ascii_lowercase().as_str() {
        "codata_2022" | "codata" => Ok(codata_2022()),
        "pdg_2024" | "pdg" => Ok(pdg_2024()),
        "nufit_5_2" | "nufit" => Ok(nufit_5_2()),
        "desi_2024" | "desi" => Ok(desi_2024()),
        _ => Err(PyKeyError::new_err(format!("unknown reference dataset '{name}'"))),
    }
}

// ─── PyKernelConfig ─────────────────────────────────────────────────

/// Python-visible kernel configuration.
#[pyclass(name = "KernelConfig")]
#[derive(Clone)]
struct PyKernelConfig {
    inner: KernelConfig,
}

#[pymethods]
impl PyKernelConfig {
    #[new]
    #[pyo3(signature = (
        rel_tolerance = 1e-3,
        sigma_threshold = 3.0,
        p_value_floor = 0.05,
        stop_on_error = false,
        allow_overwrite_established = false,
    ))]
    fn new(
        rel_tolerance: f64,
        sigma_threshold: f64,
        p_value_floor: f64,
        stop_on_error: bool,
        allow_overwrite_established: bool,
    ) -> PyResult<Self> {
        let config = KernelConfig {
            rel_tolerance,
            sigma_threshold,
            p_value_floor,
            stop_on_error,
            allow_overwrite_established,
        };
        config.validate().map_err(to_py_err)?;
        Ok(Self { inner: config })
    }

    /// Construct from JSON string; missing fields take defaults.
    #[staticmethod]
    fn from_json(json: &str) -> PyResult<Self> {
        let config = KernelConfig::from_json(json).map_err(to_py_err)?;
        Ok(Self { inner: config })
    }

    fn to_json(&self) -> PyResult<String> {
        self.inner.to_json().map_err(to_py_err)
    }

    #[getter]
    fn rel_tolerance(&self) -> f64 {
        self.inner.rel_tolerance
    }

    #[getter]
    fn sigma_threshold(&self) -> f64 {
        self.inner.sigma_threshold
    }

    #[getter]
    fn p_value_floor(&self) -> f64 {
        self.inner.p_value_floor
    }

    #[getter]
    fn stop_on_error(&self) -> bool {
        self.inner.stop_on_error
    }

    #[getter]
    fn allow_overwrite_established(&self) -> bool {
        self.inner.allow_overwrite_established
    }

    fn __repr__(&self) -> String {
        format!(
            "KernelConfig(rel_tolerance={}, sigma_threshold={}, p_value_floor={}, stop_on_error={}, allow_overwrite_established={})",
            self.inner.rel_tolerance,
            self.inner.sigma_threshold,
            self.inner.p_value_floor,
            self.inner.stop_on_error,
            self.inner.allow_overwrite_established
        )
    }
}

// ─── PyRegistry ─────────────────────────────────────────────────────

fn comparison_dict<'py>(py: Python<'py>, c: &Comparison) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("path", &c.path)?;
    dict.set_item("computed", c.computed)?;
    dict.set_item("experimental", c.experimental)?;
    dict.set_item("reference_source", &c.reference_source)?;
    dict.set_item("sigma", c.sigma)?;
    dict.set_item("deviation", c.deviation)?;
    dict.set_item("rel_deviation", c.rel_deviation)?;
    dict.set_item("pull", c.pull)?;
    dict.set_item("within_interval", c.within_interval)?;
    Ok(dict)
}

/// Shared parameter registry.
#[pyclass(name = "Registry")]
struct PyRegistry {
    inner: Arc<ParamRegistry>,
}

#[pymethods]
impl PyRegistry {
    #[new]
    #[pyo3(signature = (config = None))]
    fn new(config: Option<PyKernelConfig>) -> Self {
        let cfg = config.map(|c| c.inner).unwrap_or_default();
        Self {
            inner: Arc::new(ParamRegistry::from_config(&cfg)),
        }
    }

    /// Write a value. Returns the entry's new revision.
    #[pyo3(signature = (path, value, source, status = "SEED"))]
    fn set(&self, path: &str, value: f64, source: &str, status: &str) -> PyResult<u32> {
        self.inner
            .set(path, value, source, parse_status(status)?)
            .map_err(to_py_err)
    }

    fn get(&self, path: &str) -> Option<f64> {
        self.inner.get(path)
    }

    /// Full entry as a dict, or None.
    fn entry<'py>(&self, py: Python<'py>, path: &str) -> PyResult<Option<Bound<'py, PyDict>>> {
        let Some(e) = self.inner.entry(path) else {
            return Ok(None);
        };
        let dict = PyDict::new(py);
        dict.set_item("path", &e.path)?;
        dict.set_item("value", e.value)?;
        dict.set_item("source", &e.source)?;
        dict.set_item("status", e.status.as_str())?;
        dict.set_item("uncertainty", e.uncertainty)?;
        dict.set_item("description", e.description.as_deref())?;
        dict.set_item("revision", e.revision)?;
        if let Some(b) = &e.experimental {
            let bound = PyDict::new(py);
            bound.set_item("value", b.value)?;
            bound.set_item("sigma", b.sigma)?;
            bound.set_item("source", &b.source)?;
            bound.set_item("interval", b.interval())?;
            dict.set_item("experimental", bound)?;
        }
        Ok(Some(dict))
    }

    fn set_uncertainty(&self, path: &str, sigma: f64) -> PyResult<()> {
        self.inner.set_uncertainty(path, sigma).map_err(to_py_err)
    }

    #[pyo3(signature = (path, value, sigma, source, lower = None, upper = None))]
    fn attach_experimental(
        &self,
        path: &str,
        value: f64,
        sigma: f64,
        source: &str,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> PyResult<()> {
        let mut bound = ExperimentalBound::new(value, sigma, source);
        bound.lower = lower;
        bound.upper = upper;
        self.inner
            .attach_experimental(path, bound)
            .map_err(to_py_err)
    }

    /// Attach a bound from a built-in dataset (`codata_2022`, `pdg_2024`,
    /// `nufit_5_2`, `desi_2024`).
    fn attach_reference(&self, path: &str, dataset: &str, key: &str) -> PyResult<()> {
        builtin_dataset(dataset)?
            .attach(&self.inner, path, key)
            .map_err(to_py_err)
    }

    fn compare<'py>(&self, py: Python<'py>, path: &str) -> PyResult<Bound<'py, PyDict>> {
        let c = self.inner.compare(path).map_err(to_py_err)?;
        comparison_dict(py, &c)
    }

    fn compare_all<'py>(&self, py: Python<'py>) -> PyResult<Vec<Bound<'py, PyDict>>> {
        self.inner
            .compare_all()
            .iter()
            .map(|c| comparison_dict(py, c))
            .collect()
    }

    fn paths(&self) -> Vec<String> {
        self.inner.paths()
    }

    fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.inner
            .with_prefix(prefix)
            .into_iter()
            .map(|e| e.path)
            .collect()
    }

    fn to_json(&self) -> PyResult<String> {
        self.inner.to_json().map_err(to_py_err)
    }

    /// Restore from `to_json` output, optionally with a config.
    #[staticmethod]
    #[pyo3(signature = (json, config = None))]
    fn from_json(json: &str, config: Option<PyKernelConfig>) -> PyResult<Self> {
        let cfg = config.map(|c| c.inner).unwrap_or_default();
        let registry = ParamRegistry::from_json_with_config(json, &cfg).map_err(to_py_err)?;
        Ok(Self {
            inner: Arc::new(registry),
        })
    }

    #[getter]
    fn allow_overwrite_established(&self) -> bool {
        self.inner.allows_overwrite_established()
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn __contains__(&self, path: &str) -> bool {
        self.inner.contains(path)
    }

    fn __repr__(&self) -> String {
        format!("Registry(entries={})", self.inner.len())
    }
}

// ─── PyRunReport ────────────────────────────────────────────────────

/// Trace of a runner invocation.
#[pyclass(name = "RunReport")]
#[derive(Clone)]
struct PyRunReport {
    inner: RunReport,
}

#[pymethods]
impl PyRunReport {
    #[getter]
    fn elapsed_ms(&self) -> f64 {
        self.inner.elapsed_ms
    }

    fn is_success(&self) -> bool {
        self.inner.is_success()
    }

    /// Formula ids in execution order.
    fn order(&self) -> Vec<String> {
        self.inner.records.iter().map(|r| r.id.clone()).collect()
    }

    fn succeeded(&self) -> Vec<String> {
        self.inner.succeeded().map(|r| r.id.clone()).collect()
    }

    /// `(id, error)` pairs.
    fn failed(&self) -> Vec<(String, String)> {
        self.inner
            .records
            .iter()
            .filter_map(|r| match &r.outcome {
                FormulaOutcome::Failed { error } => Some((r.id.clone(), error.clone())),
                _ => None,
            })
            .collect()
    }

    /// `(id, reason)` pairs.
    fn skipped(&self) -> Vec<(String, String)> {
        self.inner
            .records
            .iter()
            .filter_map(|r| match &r.outcome {
                FormulaOutcome::Skipped { reason } => Some((r.id.clone(), reason.clone())),
                _ => None,
            })
            .collect()
    }

    fn to_json(&self) -> PyResult<String> {
        self.inner.to_json().map_err(to_py_err)
    }

    fn __repr__(&self) -> String {
        format!(
            "RunReport(succeeded={}, failed={}, skipped={}, elapsed_ms={:.3})",
            self.inner.succeeded().count(),
            self.inner.failed().count(),
            self.inner.skipped().count(),
            self.inner.elapsed_ms
        )
    }
}

// ─── PyRunner ───────────────────────────────────────────────────────

/// Call a Python formula: dict of inputs in, dict of outputs out.
fn call_formula(
    callback: &PyObject,
    inputs: &FormulaInputs,
    status: ParamStatus,
) -> PyResult<Vec<FormulaOutput>> {
    Python::with_gil(|py| {
        let args = PyDict::new(py);
        for (path, value) in inputs.iter() {
            args.set_item(path, value)?;
        }
        let result = callback.call1(py, (args,))?;
        let values: BTreeMap<String, f64> = result.extract(py)?;
        Ok(values
            .into_iter()
            .map(|(path, value)| FormulaOutput::new(path, value, status))
            .collect())
    })
}

/// Dependency-ordered formula runner.
#[pyclass(name = "Runner")]
struct PyRunner {
    inner: SimulationRunner,
}

#[pymethods]
impl PyRunner {
    #[new]
    #[pyo3(signature = (config = None))]
    fn new(config: Option<PyKernelConfig>) -> Self {
        let cfg = config.map(|c| c.inner).unwrap_or_default();
        Self {
            inner: SimulationRunner::new(cfg),
        }
    }

    /// Register a Python formula.
    ///
    /// Args:
    ///     id: Unique formula id; recorded as the source of its outputs.
    ///     inputs: Registry paths the callback reads.
    ///     outputs: Registry paths the callback writes.
    ///     callback: Callable[[dict[str, float]], dict[str, float]].
    ///     status: Status tag for written values (default PREDICTED).
    #[pyo3(signature = (id, inputs, outputs, callback, status = "PREDICTED"))]
    fn add_formula(
        &mut self,
        id: String,
        inputs: Vec<String>,
        outputs: Vec<String>,
        callback: PyObject,
        status: &str,
    ) -> PyResult<()> {
        let status = parse_status(status)?;
        let formula_id = id.clone();
        let formula = FnFormula::new(id, inputs, outputs, move |resolved| {
            call_formula(&callback, resolved, status).map_err(|e| PmError::Formula {
                formula: formula_id.clone(),
                message: e.to_string(),
            })
        });
        self.inner.register(Arc::new(formula)).map_err(to_py_err)?;
        log::debug!("registered Python formula ({} total)", self.inner.len());
        Ok(())
    }

    /// Execution order without running anything.
    fn plan(&self) -> PyResult<Vec<String>> {
        self.inner.plan().map_err(to_py_err)
    }

    fn run(&self, registry: &PyRegistry) -> PyResult<PyRunReport> {
        let report = self.inner.run(&registry.inner).map_err(to_py_err)?;
        Ok(PyRunReport { inner: report })
    }

    fn ids(&self) -> Vec<String> {
        self.inner.ids()
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }
}

// ─── PyChiSquareResult ──────────────────────────────────────────────

#[pyclass(name = "ChiSquareResult")]
#[derive(Clone)]
struct PyChiSquareResult {
    inner: ChiSquareResult,
}

#[pymethods]
impl PyChiSquareResult {
    #[getter]
    fn chi2(&self) -> f64 {
        self.inner.chi2
    }

    #[getter]
    fn dof(&self) -> usize {
        self.inner.dof
    }

    #[getter]
    fn reduced(&self) -> f64 {
        self.inner.reduced
    }

    #[getter]
    fn p_value(&self) -> f64 {
        self.inner.p_value
    }

    #[getter]
    fn sigma_equivalent(&self) -> f64 {
        self.inner.sigma_equivalent
    }

    #[getter]
    fn pulls(&self) -> Vec<(String, f64)> {
        self.inner
            .pulls
            .iter()
            .map(|p| (p.name.clone(), p.value))
            .collect()
    }

    fn __repr__(&self) -> String {
        format!(
            "ChiSquareResult(chi2={:.4}, dof={}, p_value={:.4}, sigma={:.2})",
            self.inner.chi2, self.inner.dof, self.inner.p_value, self.inner.sigma_equivalent
        )
    }
}

fn to_observables(rows: Vec<(String, f64, f64, f64)>) -> Vec<Observable> {
    rows.into_iter()
        .map(|(name, predicted, observed, sigma)| Observable::new(name, predicted, observed, sigma))
        .collect()
}

/// Chi-square for uncorrelated observables.
///
/// Args:
///     observables: list of (name, predicted, observed, sigma).
///     n_fitted: number of fitted parameters subtracted from dof.
#[pyfunction]
#[pyo3(signature = (observables, n_fitted = 0))]
fn chi_square_diagonal(
    observables: Vec<(String, f64, f64, f64)>,
    n_fitted: usize,
) -> PyResult<PyChiSquareResult> {
    let inner = pm_stats::chi_square_diagonal(&to_observables(observables), n_fitted)
        .map_err(to_py_err)?;
    Ok(PyChiSquareResult { inner })
}

/// Chi-square with a correlation matrix between observables.
#[pyfunction]
#[pyo3(signature = (observables, correlation, n_fitted = 0))]
fn chi_square_covariance(
    observables: Vec<(String, f64, f64, f64)>,
    correlation: Vec<Vec<f64>>,
    n_fitted: usize,
) -> PyResult<PyChiSquareResult> {
    let inner =
        pm_stats::chi_square_covariance(&to_observables(observables), &correlation, n_fitted)
            .map_err(to_py_err)?;
    Ok(PyChiSquareResult { inner })
}

// ─── PyCertificate ──────────────────────────────────────────────────

/// PASS/FAIL certificate over a set of gate checks.
#[pyclass(name = "Certificate")]
#[derive(Clone)]
struct PyCertificate {
    inner: Certificate,
}

#[pymethods]
impl PyCertificate {
    #[getter]
    fn subject(&self) -> &str {
        &self.inner.subject
    }

    #[getter]
    fn verdict(&self) -> String {
        self.inner.verdict.to_string()
    }

    fn passed(&self) -> bool {
        self.inner.passed()
    }

    fn passed_count(&self) -> usize {
        self.inner.passed_count()
    }

    fn failed_count(&self) -> usize {
        self.inner.failed_count()
    }

    fn checks<'py>(&self, py: Python<'py>) -> PyResult<Vec<Bound<'py, PyDict>>> {
        self.inner
            .checks
            .iter()
            .map(|c| {
                let dict = PyDict::new(py);
                dict.set_item("name", &c.name)?;
                dict.set_item("passed", c.passed)?;
                dict.set_item("verdict", c.verdict().to_string())?;
                dict.set_item("message", &c.message)?;
                Ok(dict)
            })
            .collect()
    }

    fn summary(&self) -> String {
        self.inner.summary()
    }

    fn to_json(&self) -> PyResult<String> {
        serde_json::to_string_pretty(&self.inner).map_err(|e| to_py_err(e.into()))
    }

    fn __repr__(&self) -> String {
        format!("Certificate({})", self.inner.summary())
    }
}

/// Sigma-gate every bounded registry entry.
#[pyfunction]
#[pyo3(signature = (registry, subject, config = None))]
fn certify_registry(
    registry: &PyRegistry,
    subject: &str,
    config: Option<PyKernelConfig>,
) -> PyCertificate {
    let cfg = config.map(|c| c.inner).unwrap_or_default();
    let certifier = Certifier::new(&registry.inner, cfg);
    PyCertificate {
        inner: certifier.certify_registry(subject),
    }
}

/// Chi-square gate over bounded registry paths.
#[pyfunction]
#[pyo3(signature = (registry, name, paths, correlation = None, config = None))]
fn certify_chi_square(
    registry: &PyRegistry,
    name: &str,
    paths: Vec<String>,
    correlation: Option<Vec<Vec<f64>>>,
    config: Option<PyKernelConfig>,
) -> PyCertificate {
    let cfg = config.map(|c| c.inner).unwrap_or_default();
    let certifier = Certifier::new(&registry.inner, cfg);
    let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    let check = certifier.chi_square_gate(name, &refs, correlation.as_deref());
    PyCertificate {
        inner: certifier.certify(name, vec![check]),
    }
}

// ─── Module Registration ────────────────────────────────────────────

/// Principia Kernel: provenance-tracked parameter registry, dependency
/// ordered formula runner, and statistical certification gates.
///
/// - `KernelConfig`: configuration
/// - `Registry`: parameter registry
/// - `Runner` / `RunReport`: formula execution
/// - `chi_square_diagonal`, `chi_square_covariance`: goodness of fit
/// - `Certificate`, `certify_registry`, `certify_chi_square`: gates
#[pymodule]
fn principia_kernel(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyKernelConfig>()?;
    m.add_class::<PyRegistry>()?;
    m.add_class::<PyRunner>()?;
    m.add_class::<PyRunReport>()?;
    // Statistics
    m.add_class::<PyChiSquareResult>()?;
    m.add_function(wrap_pyfunction!(chi_square_diagonal, m)?)?;
    m.add_function(wrap_pyfunction!(chi_square_covariance, m)?)?;
    // Gates
    m.add_class::<PyCertificate>()?;
    m.add_function(wrap_pyfunction!(certify_registry, m)?)?;
    m.add_function(wrap_pyfunction!(certify_chi_square, m)?)?;
    Ok(())
}
