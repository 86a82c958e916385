// ─────────────────────────────────────────────────────────────────────
// Principia Kernel — Core Engine
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Parameter registry, formula runner, and certification gates.
//!
//! # Invariants
//!
//! 1. **Every value has provenance**: a registry entry always carries the
//!    id of the formula (or caller) that wrote it and a status tag.
//!
//! 2. **Established values are protected**: an `ESTABLISHED` entry can only
//!    be rewritten by its own source unless
//!    `KernelConfig::allow_overwrite_established` is set on the registry
//!    or on the runner performing the write.
//!
//! 3. **Formula writes are atomic**: a formula's outputs land in the
//!    registry together or not at all. A panic, an error, a non-finite
//!    value, or an undeclared output leaves the registry untouched.
//!
//! 4. **Order is derived, not hand-coded**: the runner sorts formulas
//!    topologically from their declared inputs and outputs. Ties keep
//!    registration order, so a run is deterministic.

pub mod formula;
pub mod gates;
pub mod reference;
pub mod registry;
pub mod runner;

pub use formula::{FnFormula, Formula, FormulaInputs, FormulaOutput};
pub use gates::Certifier;
pub use reference::{
    codata_2022, desi_2024, nufit_5_2, pdg_2024, ReferenceDataset, ReferenceValue,
};
pub use registry::{Comparison, ParamRegistry, RegistrySnapshot};
pub use runner::{FormulaOutcome, FormulaRecord, RunReport, SimulationRunner};
