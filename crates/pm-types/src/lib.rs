// ─────────────────────────────────────────────────────────────────────
// Principia Kernel — Types
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Type definitions, configuration, and error hierarchy shared by the
//! parameter registry, the formula runner and the statistics crate.

pub mod certificate;
pub mod config;
pub mod error;
pub mod param;

pub use certificate::{Certificate, CheckResult, Verdict};
pub use config::KernelConfig;
pub use error::{PmError, PmResult};
pub use param::{validate_path, ExperimentalBound, ParamEntry, ParamStatus};
