// ─────────────────────────────────────────────────────────────────────
// Principia Kernel — Formula Interface
// ─────────────────────────────────────────────────────────────────────
//! A formula is one independently runnable computation: it declares the
//! registry paths it reads and the paths it writes, and maps resolved
//! inputs to outputs. The runner derives execution order from those
//! declarations.

use std::collections::BTreeMap;

use pm_types::{ParamEntry, ParamStatus, PmError, PmResult};

/// Resolved input values handed to `Formula::compute`.
#[derive(Debug, Clone, Default)]
pub struct FormulaInputs {
    formula: String,
    values: BTreeMap<String, f64>,
}

impl FormulaInputs {
    pub fn new(formula: impl Into<String>, values: BTreeMap<String, f64>) -> Self {
        Self {
            formula: formula.into(),
            values,
        }
    }

    /// Value of a declared input. Reading an undeclared path is an error,
    /// so hidden dependencies cannot slip past the planner.
    pub fn get(&self, path: &str) -> PmResult<f64> {
        self.values
            .get(path)
            .copied()
            .ok_or_else(|| PmError::MissingDependency {
                formula: self.formula.clone(),
                path: path.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One value written by a formula.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaOutput {
    pub path: String,
    pub value: f64,
    pub status: ParamStatus,
    pub uncertainty: Option<f64>,
    pub description: Option<String>,
}

impl FormulaOutput {
    pub fn new(path: impl Into<String>, value: f64, status: ParamStatus) -> Self {
        Self {
            path: path.into(),
            value,
            status,
            uncertainty: None,
            description: None,
        }
    }

    pub fn derived(path: impl Into<String>, value: f64) -> Self {
        Self::new(path, value, ParamStatus::Derived)
    }

    pub fn predicted(path: impl Into<String>, value: f64) -> Self {
        Self::new(path, value, ParamStatus::Predicted)
    }

    pub fn with_uncertainty(mut self, sigma: f64) -> Self {
        self.uncertainty = Some(sigma);
        self
    }

    pub fn with_description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Registry row attributed to `source`.
    pub fn into_entry(self, source: &str) -> ParamEntry {
        ParamEntry {
            path: self.path,
            value: self.value,
            source: source.to_string(),
            status: self.status,
            uncertainty: self.uncertainty,
            experimental: None,
            description: self.description,
            revision: 1,
        }
    }
}

/// Trait for computation units driven by the runner.
pub trait Formula: Send + Sync {
    /// Unique id; also recorded as the `source` of every output.
    fn id(&self) -> &str;

    /// Registry paths read by `compute`.
    fn inputs(&self) -> &[String];

    /// Registry paths written by `compute`.
    fn outputs(&self) -> &[String];

    fn compute(&self, inputs: &FormulaInputs) -> PmResult<Vec<FormulaOutput>>;
}

type ComputeFn = Box<dyn Fn(&FormulaInputs) -> PmResult<Vec<FormulaOutput>> + Send + Sync>;

/// Formula backed by a closure.
///
/// Used by the Python bindings to run Python callables, and anywhere a
/// one-off formula does not warrant its own type.
pub struct FnFormula {
    id: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    compute_fn: ComputeFn,
}

impl FnFormula {
    pub fn new<I, O>(
        id: impl Into<String>,
        inputs: I,
        outputs: O,
        compute_fn: impl Fn(&FormulaInputs) -> PmResult<Vec<FormulaOutput>> + Send + Sync + 'static,
    ) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self {
            id: id.into(),
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
            compute_fn: Box::new(compute_fn),
        }
    }
}

impl Formula for FnFormula {
    fn id(&self) -> &str {
        &self.id
    }

    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn outputs(&self) -> &[String] {
        &self.outputs
    }

    fn compute(&self, inputs: &FormulaInputs) -> PmResult<Vec<FormulaOutput>> {
        (self.compute_fn)(inputs)
    }
}
