// ─────────────────────────────────────────────────────────────────────
// Principia Kernel — Simulation Runner
// ─────────────────────────────────────────────────────────────────────
//! Runs registered formulas against a registry in dependency order.
//!
//! # Ordering
//!
//! Formula B depends on formula A when one of B's inputs is one of A's
//! outputs. The plan is a topological order of that graph; among formulas
//! that are ready at the same time, the one registered first runs first.
//! Registering formulas in a hand-written order therefore reproduces that
//! order exactly whenever the dependencies allow it.
//!
//! # Failure handling
//!
//! A failing formula (error, panic, bad output) is recorded as `Failed`
//! and none of its outputs are written. Every formula downstream of it is
//! `Skipped`; independent formulas still run. With `stop_on_error` the run
//! ends at the first failure and all remaining formulas are `Skipped`.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use pm_types::{validate_path, KernelConfig, PmError, PmResult};

use crate::formula::{Formula, FormulaInputs};
use crate::registry::ParamRegistry;

/// What happened to one formula during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FormulaOutcome {
    Succeeded,
    Failed { error: String },
    Skipped { reason: String },
}

/// Per-formula trace entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaRecord {
    pub id: String,
    pub outcome: FormulaOutcome,
    /// Paths written (empty unless `Succeeded`).
    pub outputs: Vec<String>,
    pub elapsed_us: u64,
}

/// Trace of a full run, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub records: Vec<FormulaRecord>,
    pub elapsed_ms: f64,
}

impl RunReport {
    pub fn record(&self, id: &str) -> Option<&FormulaRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &FormulaRecord> {
        self.records
            .iter()
            .filter(|r| r.outcome == FormulaOutcome::Succeeded)
    }

    pub fn failed(&self) -> impl Iterator<Item = &FormulaRecord> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, FormulaOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &FormulaRecord> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, FormulaOutcome::Skipped { .. }))
    }

    pub fn is_success(&self) -> bool {
        self.records
            .iter()
            .all(|r| r.outcome == FormulaOutcome::Succeeded)
    }

    pub fn to_json(&self) -> PmResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Ordered collection of formulas plus the run loop.
pub struct SimulationRunner {
    config: KernelConfig,
    formulas: Vec<Arc<dyn Formula>>,
    /// output path → index of the producing formula.
    producers: HashMap<String, usize>,
}

impl Default for SimulationRunner {
    fn default() -> Self {
        Self::new(KernelConfig::default())
    }
}

impl SimulationRunner {
    pub fn new(config: KernelConfig) -> Self {
        Self {
            config,
            formulas: Vec::new(),
            producers: HashMap::new(),
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Add a formula. Ids must be unique and no two formulas may declare
    /// the same output.
    pub fn register(&mut self, formula: Arc<dyn Formula>) -> PmResult<()> {
        let id = formula.id().to_string();
        if id.trim().is_empty() {
            return Err(PmError::Config("formula id must not be empty".to_string()));
        }
        if self.formulas.iter().any(|f| f.id() == id) {
            return Err(PmError::DuplicateFormula(id));
        }
        for path in formula.inputs().iter().chain(formula.outputs()) {
            validate_path(path)?;
        }
        let mut seen = HashSet::new();
        for path in formula.outputs() {
            if !seen.insert(path.as_str()) {
                return Err(PmError::DuplicateOutput {
                    path: path.clone(),
                    first: id.clone(),
                    second: id,
                });
            }
            if let Some(&owner) = self.producers.get(path) {
                return Err(PmError::DuplicateOutput {
                    path: path.clone(),
                    first: self.formulas[owner].id().to_string(),
                    second: id,
                });
            }
        }

        let index = self.formulas.len();
        for path in formula.outputs() {
            self.producers.insert(path.clone(), index);
        }
        log::debug!(
            "registered formula '{id}' ({} inputs, {} outputs)",
            formula.inputs().len(),
            formula.outputs().len()
        );
        self.formulas.push(formula);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }

    /// Formula ids in registration order.
    pub fn ids(&self) -> Vec<String> {
        self.formulas.iter().map(|f| f.id().to_string()).collect()
    }

    /// Indices of the formulas that produce `index`'s inputs.
    fn upstream(&self, index: usize) -> BTreeSet<usize> {
        self.formulas[index]
            .inputs()
            .iter()
            .filter_map(|path| self.producers.get(path).copied())
            .collect()
    }

    /// Kahn's algorithm with registration order as the tie-break.
    fn plan_indices(&self) -> PmResult<Vec<usize>> {
        let n = self.formulas.len();
        let mut indegree = vec![0usize; n];
        let mut downstream: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (i, degree) in indegree.iter_mut().enumerate() {
            for up in self.upstream(i) {
                *degree += 1;
                downstream[up].push(i);
            }
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &child in &downstream[next] {
                indegree[child] -= 1;
                if indegree[child] == 0 {
                    ready.insert(child);
                }
            }
        }

        if order.len() < n {
            // Formulas left over are on a cycle or downstream of one;
            // only the former are reported.
            let members = (0..n)
                .filter(|&i| indegree[i] > 0 && on_cycle(&downstream, i))
                .map(|i| self.formulas[i].id().to_string())
                .collect();
            return Err(PmError::DependencyCycle(members));
        }
        Ok(order)
    }

    /// Execution order as formula ids.
    pub fn plan(&self) -> PmResult<Vec<String>> {
        Ok(self
            .plan_indices()?
            .into_iter()
            .map(|i| self.formulas[i].id().to_string())
            .collect())
    }

    /// Run every formula in plan order against `registry`.
    ///
    /// Returns `Err` only when no plan exists (dependency cycle);
    /// per-formula failures are reported in the `RunReport`.
    pub fn run(&self, registry: &ParamRegistry) -> PmResult<RunReport> {
        let order = self.plan_indices()?;
        let start = Instant::now();
        let mut report = RunReport::default();
        let mut blocked: HashSet<usize> = HashSet::new();
        let mut halted = false;

        for index in order {
            let formula = &self.formulas[index];
            let id = formula.id().to_string();

            if halted {
                blocked.insert(index);
                report.records.push(skipped(id, "run halted after an earlier failure"));
                continue;
            }
            if let Some(up) = self.upstream(index).into_iter().find(|u| blocked.contains(u)) {
                let reason = format!("upstream formula '{}' did not complete", self.formulas[up].id());
                log::warn!("skipping '{id}': {reason}");
                blocked.insert(index);
                report.records.push(skipped(id, &reason));
                continue;
            }

            let t0 = Instant::now();
            let result = self.execute(formula.as_ref(), registry);
            let elapsed_us = t0.elapsed().as_micros() as u64;

            match result {
                Ok(outputs) => {
                    log::debug!("formula '{id}' wrote {} values in {elapsed_us} us", outputs.len());
                    report.records.push(FormulaRecord {
                        id,
                        outcome: FormulaOutcome::Succeeded,
                        outputs,
                        elapsed_us,
                    });
                }
                Err(e) => {
                    log::error!("formula '{id}' failed: {e}");
                    blocked.insert(index);
                    halted = self.config.stop_on_error;
                    report.records.push(FormulaRecord {
                        id,
                        outcome: FormulaOutcome::Failed {
                            error: e.to_string(),
                        },
                        outputs: Vec::new(),
                        elapsed_us,
                    });
                }
            }
        }

        report.elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        log::info!(
            "run finished: {} succeeded, {} failed, {} skipped in {:.2} ms",
            report.succeeded().count(),
            report.failed().count(),
            report.skipped().count(),
            report.elapsed_ms
        );
        Ok(report)
    }

    /// Resolve inputs, compute, check outputs, write atomically.
    fn execute(&self, formula: &dyn Formula, registry: &ParamRegistry) -> PmResult<Vec<String>> {
        let id = formula.id();

        let mut values = BTreeMap::new();
        for path in formula.inputs() {
            let value = registry.get(path).ok_or_else(|| PmError::MissingDependency {
                formula: id.to_string(),
                path: path.clone(),
            })?;
            values.insert(path.clone(), value);
        }
        let inputs = FormulaInputs::new(id, values);

        let outputs = match catch_unwind(AssertUnwindSafe(|| formula.compute(&inputs))) {
            Ok(result) => result?,
            Err(_) => {
                return Err(PmError::Formula {
                    formula: id.to_string(),
                    message: "formula panicked".to_string(),
                })
            }
        };

        let declared: HashSet<&str> = formula.outputs().iter().map(String::as_str).collect();
        for out in &outputs {
            if !declared.contains(out.path.as_str()) {
                return Err(PmError::UndeclaredOutput {
                    formula: id.to_string(),
                    path: out.path.clone(),
                });
            }
        }
        let produced: HashSet<&str> = outputs.iter().map(|o| o.path.as_str()).collect();
        if let Some(missing) = formula
            .outputs()
            .iter()
            .find(|p| !produced.contains(p.as_str()))
        {
            return Err(PmError::Formula {
                formula: id.to_string(),
                message: format!("declared output '{missing}' was not produced"),
            });
        }

        let written: Vec<String> = outputs.iter().map(|o| o.path.clone()).collect();
        let rows = outputs.into_iter().map(|o| o.into_entry(id)).collect();
        registry.set_entries_with(rows, self.config.allow_overwrite_established)?;
        Ok(written)
    }
}

/// Whether `start` can reach itself through `downstream` edges.
fn on_cycle(downstream: &[Vec<usize>], start: usize) -> bool {
    let mut seen = HashSet::new();
    let mut stack = downstream[start].clone();
    while let Some(node) = stack.pop() {
        if node == start {
            return true;
        }
        if seen.insert(node) {
            stack.extend(downstream[node].iter().copied());
        }
    }
    false
}

fn skipped(id: String, reason: &str) -> FormulaRecord {
    FormulaRecord {
        id,
        outcome: FormulaOutcome::Skipped {
            reason: reason.to_string(),
        },
        outputs: Vec::new(),
        elapsed_us: 0,
    }
}
