// ─────────────────────────────────────────────────────────────────────
// Principia Kernel — Reference Datasets
// ─────────────────────────────────────────────────────────────────────
//! Published central values and uncertainties used as experimental
//! bounds.
//!
//! Data sources:
//!   - CODATA 2022 recommended values (exact SI constants have sigma 0)
//!   - PDG 2024 Review of Particle Physics summary tables
//!   - NuFIT 5.2 global fit, normal ordering
//!   - DESI 2024 DR1 BAO + CMB + PantheonPlus (w0waCDM)
//!
//! Asymmetric errors are stored as an explicit interval plus the larger
//! side as sigma.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use pm_types::{ExperimentalBound, PmError, PmResult};

use crate::registry::ParamRegistry;

/// One published value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceValue {
    pub key: String,
    pub value: f64,
    pub sigma: f64,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<f64>,
}

impl ReferenceValue {
    pub fn new(key: &str, value: f64, sigma: f64, unit: &str) -> Self {
        Self {
            key: key.to_string(),
            value,
            sigma,
            unit: unit.to_string(),
            lower: None,
            upper: None,
        }
    }

    /// Asymmetric error: value +plus −minus.
    pub fn asymmetric(key: &str, value: f64, plus: f64, minus: f64, unit: &str) -> Self {
        Self {
            lower: Some(value - minus),
            upper: Some(value + plus),
            ..Self::new(key, value, plus.max(minus), unit)
        }
    }

    pub fn is_exact(&self) -> bool {
        self.sigma == 0.0
    }
}

/// Named collection of reference values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDataset {
    pub name: String,
    pub values: BTreeMap<String, ReferenceValue>,
}

impl ReferenceDataset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, value: ReferenceValue) {
        self.values.insert(value.key.clone(), value);
    }

    fn with(mut self, value: ReferenceValue) -> Self {
        self.insert(value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ReferenceValue> {
        self.values.get(key)
    }

    pub fn require(&self, key: &str) -> PmResult<&ReferenceValue> {
        self.get(key).ok_or_else(|| PmError::UnknownReference {
            dataset: self.name.clone(),
            key: key.to_string(),
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Experimental bound for `key`, labelled with the dataset name.
    pub fn bound(&self, key: &str) -> PmResult<ExperimentalBound> {
        let r = self.require(key)?;
        let mut bound = ExperimentalBound::new(r.value, r.sigma, self.name.clone());
        bound.lower = r.lower;
        bound.upper = r.upper;
        Ok(bound)
    }

    /// Attach `key`'s bound to registry entry `path`.
    pub fn attach(&self, registry: &ParamRegistry, path: &str, key: &str) -> PmResult<()> {
        registry.attach_experimental(path, self.bound(key)?)
    }

    /// Attach several `(path, key)` pairs; stops at the first error.
    pub fn attach_all(&self, registry: &ParamRegistry, pairs: &[(&str, &str)]) -> PmResult<()> {
        for (path, key) in pairs {
            self.attach(registry, path, key)?;
        }
        Ok(())
    }

    /// Load a custom dataset. Every value must be finite with sigma ≥ 0.
    pub fn from_json(json: &str) -> PmResult<Self> {
        let dataset: Self = serde_json::from_str(json)?;
        for (key, r) in &dataset.values {
            if key != &r.key {
                return Err(PmError::Config(format!(
                    "dataset '{}' maps key '{key}' to value keyed '{}'",
                    dataset.name, r.key
                )));
            }
            dataset.bound(key)?.validate()?;
        }
        Ok(dataset)
    }
}

/// CODATA 2022 recommended values.
pub fn codata_2022() -> ReferenceDataset {
    ReferenceDataset::new("CODATA 2022")
        .with(ReferenceValue::new("speed_of_light", 299_792_458.0, 0.0, "m s^-1"))
        .with(ReferenceValue::new("planck_constant", 6.626_070_15e-34, 0.0, "J Hz^-1"))
        .with(ReferenceValue::new("elementary_charge", 1.602_176_634e-19, 0.0, "C"))
        .with(ReferenceValue::new("boltzmann_constant", 1.380_649e-23, 0.0, "J K^-1"))
        .with(ReferenceValue::new("avogadro_constant", 6.022_140_76e23, 0.0, "mol^-1"))
        .with(ReferenceValue::new(
            "fine_structure_inverse",
            137.035_999_177,
            0.000_000_021,
            "",
        ))
        .with(ReferenceValue::new(
            "gravitational_constant",
            6.674_30e-11,
            0.000_15e-11,
            "m^3 kg^-1 s^-2",
        ))
        .with(ReferenceValue::new(
            "proton_electron_mass_ratio",
            1_836.152_673_426,
            0.000_000_032,
            "",
        ))
        .with(ReferenceValue::new(
            "electron_mass_energy",
            0.510_998_950_69,
            0.000_000_000_16,
            "MeV",
        ))
}

/// PDG 2024 summary values.
pub fn pdg_2024() -> ReferenceDataset {
    ReferenceDataset::new("PDG 2024")
        .with(ReferenceValue::new("z_mass", 91.1880, 0.0020, "GeV"))
        .with(ReferenceValue::new("w_mass", 80.3692, 0.0133, "GeV"))
        .with(ReferenceValue::new("higgs_mass", 125.20, 0.11, "GeV"))
        .with(ReferenceValue::new("top_mass", 172.57, 0.29, "GeV"))
        .with(ReferenceValue::new("alpha_s_mz", 0.1180, 0.0009, ""))
        .with(ReferenceValue::new("sin2_theta_w_msbar", 0.23129, 0.00004, ""))
        .with(ReferenceValue::new("n_light_neutrinos", 2.9963, 0.0074, ""))
}

/// NuFIT 5.2 oscillation parameters, normal ordering.
pub fn nufit_5_2() -> ReferenceDataset {
    ReferenceDataset::new("NuFIT 5.2")
        .with(ReferenceValue::new("sin2_theta12", 0.303, 0.012, ""))
        .with(ReferenceValue::asymmetric("sin2_theta13", 0.02225, 0.00056, 0.00059, ""))
        .with(ReferenceValue::asymmetric("sin2_theta23", 0.451, 0.019, 0.016, ""))
        .with(ReferenceValue::asymmetric("delta_cp", 232.0, 36.0, 26.0, "deg"))
        .with(ReferenceValue::asymmetric("dm2_21", 7.41e-5, 0.21e-5, 0.20e-5, "eV^2"))
        .with(ReferenceValue::asymmetric("dm2_3l", 2.507e-3, 0.026e-3, 0.027e-3, "eV^2"))
}

/// DESI 2024 dark-energy parameters (BAO + CMB + PantheonPlus).
pub fn desi_2024() -> ReferenceDataset {
    ReferenceDataset::new("DESI 2024")
        .with(ReferenceValue::new("w0", -0.827, 0.063, ""))
        .with(ReferenceValue::asymmetric("wa", -0.75, 0.29, 0.25, ""))
        .with(ReferenceValue::new("omega_m", 0.3085, 0.0068, ""))
}
