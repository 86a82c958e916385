// ─────────────────────────────────────────────────────────────────────
// Principia Kernel — Parameter Registry
// ─────────────────────────────────────────────────────────────────────
//! Shared namespace of provenance-tagged scalar values.
//!
//! Paths are dotted (`geometry.alpha_inverse`) and kept in a `BTreeMap`
//! so listings come out sorted. The registry is `Sync`: formulas run
//! against `&ParamRegistry` and all mutation goes through a
//! `parking_lot::RwLock`.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use pm_types::{ExperimentalBound, KernelConfig, ParamEntry, ParamStatus, PmError, PmResult};

/// Comparison of a registered value against its experimental bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub path: String,
    pub computed: f64,
    pub experimental: f64,
    /// Dataset the bound came from.
    pub reference_source: String,
    /// sqrt(σ_exp² + σ_theory²).
    pub sigma: f64,
    /// computed − experimental.
    pub deviation: f64,
    /// |deviation| / |experimental|; `None` when experimental is 0.
    pub rel_deviation: Option<f64>,
    /// deviation / sigma; `None` when sigma is 0.
    pub pull: Option<f64>,
    /// Whether `computed` lies inside the bound's acceptance interval.
    pub within_interval: bool,
}

/// Serializable copy of the registry contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub entries: Vec<ParamEntry>,
}

/// Thread-safe parameter registry.
pub struct ParamRegistry {
    entries: RwLock<BTreeMap<String, ParamEntry>>,
    allow_overwrite_established: bool,
}

impl Default for ParamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            allow_overwrite_established: false,
        }
    }

    pub fn from_config(config: &KernelConfig) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            allow_overwrite_established: config.allow_overwrite_established,
        }
    }

    /// Insert or overwrite a value. Returns the new revision.
    pub fn set(
        &self,
        path: &str,
        value: f64,
        source: &str,
        status: ParamStatus,
    ) -> PmResult<u32> {
        self.set_entry(ParamEntry::new(path, value, source, status))
    }

    /// Insert or overwrite a full row. Returns the new revision.
    ///
    /// On overwrite, optional fields left `None` in `entry` keep their
    /// previous values and the revision is incremented.
    pub fn set_entry(&self, entry: ParamEntry) -> PmResult<u32> {
        entry.validate()?;
        let mut entries = self.entries.write();
        let merged = self.merge(
            entries.get(&entry.path),
            entry,
            self.allow_overwrite_established,
        )?;
        let revision = merged.revision;
        log::debug!(
            "set {} = {} [{} from {}] rev {}",
            merged.path,
            merged.value,
            merged.status,
            merged.source,
            revision
        );
        entries.insert(merged.path.clone(), merged);
        Ok(revision)
    }

    /// Write several rows atomically: either all are stored or none.
    pub fn set_entries(&self, batch: Vec<ParamEntry>) -> PmResult<()> {
        self.set_entries_with(batch, false)
    }

    /// `set_entries` where the caller may also permit overwriting
    /// `Established` rows. Protection is lifted when either the registry
    /// or the caller allows it.
    pub fn set_entries_with(
        &self,
        batch: Vec<ParamEntry>,
        allow_overwrite_established: bool,
    ) -> PmResult<()> {
        let allow = allow_overwrite_established || self.allow_overwrite_established;
        for entry in &batch {
            entry.validate()?;
        }
        let mut entries = self.entries.write();
        let mut merged = Vec::with_capacity(batch.len());
        for entry in batch {
            let previous = merged
                .iter()
                .rev()
                .find(|e: &&ParamEntry| e.path == entry.path)
                .or_else(|| entries.get(&entry.path));
            let row = self.merge(previous, entry, allow)?;
            merged.push(row);
        }
        for row in merged {
            log::debug!(
                "set {} = {} [{} from {}] rev {}",
                row.path,
                row.value,
                row.status,
                row.source,
                row.revision
            );
            entries.insert(row.path.clone(), row);
        }
        Ok(())
    }

    fn merge(
        &self,
        previous: Option<&ParamEntry>,
        mut entry: ParamEntry,
        allow_overwrite_established: bool,
    ) -> PmResult<ParamEntry> {
        let Some(old) = previous else {
            entry.revision = 1;
            return Ok(entry);
        };
        if old.status == ParamStatus::Established
            && old.source != entry.source
            && !allow_overwrite_established
        {
            return Err(PmError::ProtectedParameter {
                path: entry.path,
                owner: old.source.clone(),
                writer: entry.source,
            });
        }
        if entry.uncertainty.is_none() {
            entry.uncertainty = old.uncertainty;
        }
        if entry.experimental.is_none() {
            entry.experimental = old.experimental.clone();
        }
        if entry.description.is_none() {
            entry.description = old.description.clone();
        }
        entry.revision = old.revision + 1;
        Ok(entry)
    }

    pub fn get(&self, path: &str) -> Option<f64> {
        self.entries.read().get(path).map(|e| e.value)
    }

    /// Like `get`, but an absent path is an error.
    pub fn require(&self, path: &str) -> PmResult<f64> {
        self.get(path)
            .ok_or_else(|| PmError::UnknownParameter(path.to_string()))
    }

    pub fn entry(&self, path: &str) -> Option<ParamEntry> {
        self.entries.read().get(path).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.read().contains_key(path)
    }

    pub fn remove(&self, path: &str) -> Option<ParamEntry> {
        self.entries.write().remove(path)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// All paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Entries at `prefix` or below `prefix.`, sorted by path.
    pub fn with_prefix(&self, prefix: &str) -> Vec<ParamEntry> {
        let nested = format!("{prefix}.");
        self.entries
            .read()
            .range(prefix.to_string()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .filter(|(path, _)| path.as_str() == prefix || path.starts_with(&nested))
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn by_status(&self, status: ParamStatus) -> Vec<ParamEntry> {
        self.filtered(|e| e.status == status)
    }

    pub fn by_source(&self, source: &str) -> Vec<ParamEntry> {
        self.filtered(|e| e.source == source)
    }

    fn filtered(&self, keep: impl Fn(&ParamEntry) -> bool) -> Vec<ParamEntry> {
        self.entries
            .read()
            .values()
            .filter(|e| keep(e))
            .cloned()
            .collect()
    }

    /// Set the theory-side uncertainty of an existing entry.
    pub fn set_uncertainty(&self, path: &str, sigma: f64) -> PmResult<()> {
        if !(sigma.is_finite() && sigma >= 0.0) {
            return Err(PmError::Numerical(format!(
                "uncertainty for '{path}' must be finite and >= 0, got {sigma}"
            )));
        }
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(path)
            .ok_or_else(|| PmError::UnknownParameter(path.to_string()))?;
        entry.uncertainty = Some(sigma);
        Ok(())
    }

    /// Attach (or replace) the experimental bound of an existing entry.
    pub fn attach_experimental(&self, path: &str, bound: ExperimentalBound) -> PmResult<()> {
        bound.validate()?;
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(path)
            .ok_or_else(|| PmError::UnknownParameter(path.to_string()))?;
        log::debug!("attach {} bound {} ± {} to {path}", bound.source, bound.value, bound.sigma);
        entry.experimental = Some(bound);
        Ok(())
    }

    /// Compare an entry against its experimental bound.
    pub fn compare(&self, path: &str) -> PmResult<Comparison> {
        let entry = self
            .entry(path)
            .ok_or_else(|| PmError::UnknownParameter(path.to_string()))?;
        compare_entry(&entry).ok_or_else(|| PmError::UnknownReference {
            dataset: "experimental".to_string(),
            key: path.to_string(),
        })
    }

    /// Comparisons for every entry that carries a bound, sorted by path.
    pub fn compare_all(&self) -> Vec<Comparison> {
        self.entries.read().values().filter_map(compare_entry).collect()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            entries: self.entries.read().values().cloned().collect(),
        }
    }

    /// Replace the whole contents with a snapshot. Provenance protection
    /// does not apply: the snapshot is taken as authoritative.
    pub fn restore(&self, snapshot: RegistrySnapshot) -> PmResult<()> {
        let mut fresh = BTreeMap::new();
        for entry in snapshot.entries {
            entry.validate()?;
            fresh.insert(entry.path.clone(), entry);
        }
        *self.entries.write() = fresh;
        Ok(())
    }

    pub fn to_json(&self) -> PmResult<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }

    /// Rebuild a registry with default settings from `to_json` output.
    pub fn from_json(json: &str) -> PmResult<Self> {
        Self::from_json_with_config(json, &KernelConfig::default())
    }

    pub fn from_json_with_config(json: &str, config: &KernelConfig) -> PmResult<Self> {
        let snapshot: RegistrySnapshot = serde_json::from_str(json)?;
        let registry = Self::from_config(config);
        registry.restore(snapshot)?;
        Ok(registry)
    }

    pub fn allows_overwrite_established(&self) -> bool {
        self.allow_overwrite_established
    }
}

fn compare_entry(entry: &ParamEntry) -> Option<Comparison> {
    let bound = entry.experimental.as_ref()?;
    let theory = entry.uncertainty.unwrap_or(0.0);
    let sigma = (bound.sigma.powi(2) + theory.powi(2)).sqrt();
    let deviation = entry.value - bound.value;
    Some(Comparison {
        path: entry.path.clone(),
        computed: entry.value,
        experimental: bound.value,
        reference_source: bound.source.clone(),
        sigma,
        deviation,
        rel_deviation: (bound.value != 0.0).then(|| deviation.abs() / bound.value.abs()),
        pull: (sigma > 0.0).then(|| deviation / sigma),
        within_interval: bound.contains(entry.value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> ParamRegistry {
        let reg = ParamRegistry::new();
        reg.set("topology.b3", 24.0, "seed", ParamStatus::Seed).unwrap();
        reg.set("geometry.alpha_inverse", 137.036, "alpha", ParamStatus::Predicted)
            .unwrap();
        reg.set("geometry.alpha", 1.0 / 137.036, "alpha", ParamStatus::Derived)
            .unwrap();
        reg.set("constants.c", 299_792_458.0, "codata", ParamStatus::Established)
            .unwrap();
        reg
    }

    #[test]
    fn test_set_and_get() {
        let reg = seeded();
        assert_eq!(reg.get("topology.b3"), Some(24.0));
        assert_eq!(reg.len(), 4);
        assert!(reg.get("missing").is_none());
    }

    #[test]
    fn test_require_unknown() {
        let reg = seeded();
        assert_eq!(
            reg.require("nope"),
            Err(PmError::UnknownParameter("nope".into()))
        );
    }

    #[test]
    fn test_invalid_path_rejected() {
        let reg = ParamRegistry::new();
        assert!(matches!(
            reg.set("bad..path", 1.0, "s", ParamStatus::Seed),
            Err(PmError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_non_finite_rejected() {
        let reg = ParamRegistry::new();
        assert!(matches!(
            reg.set("x", f64::INFINITY, "s", ParamStatus::Derived),
            Err(PmError::Numerical(_))
        ));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_overwrite_bumps_revision_and_keeps_bound() {
        let reg = seeded();
        reg.attach_experimental(
            "geometry.alpha_inverse",
            ExperimentalBound::new(137.035999177, 2.1e-8, "CODATA 2022"),
        )
        .unwrap();
        let rev = reg
            .set("geometry.alpha_inverse", 137.04, "alpha", ParamStatus::Predicted)
            .unwrap();
        assert_eq!(rev, 2);
        let e = reg.entry("geometry.alpha_inverse").unwrap();
        assert_eq!(e.value, 137.04);
        assert!(e.experimental.is_some());
    }

    #[test]
    fn test_established_protected_from_other_source() {
        let reg = seeded();
        let err = reg
            .set("constants.c", 3.0e8, "rounding", ParamStatus::Derived)
            .unwrap_err();
        assert!(matches!(err, PmError::ProtectedParameter { .. }));
        assert_eq!(reg.get("constants.c"), Some(299_792_458.0));
    }

    #[test]
    fn test_established_same_source_may_update() {
        let reg = seeded();
        assert!(reg
            .set("constants.c", 299_792_458.0, "codata", ParamStatus::Established)
            .is_ok());
    }

    #[test]
    fn test_overwrite_allowed_by_config() {
        let cfg = KernelConfig {
            allow_overwrite_established: true,
            ..Default::default()
        };
        let reg = ParamRegistry::from_config(&cfg);
        reg.set("c", 1.0, "a", ParamStatus::Established).unwrap();
        assert!(reg.set("c", 2.0, "b", ParamStatus::Derived).is_ok());
    }

    #[test]
    fn test_set_entries_with_caller_permission() {
        let reg = seeded();
        let row = ParamEntry::new("constants.c", 3.0e8, "rounding", ParamStatus::Derived);
        assert!(matches!(
            reg.set_entries(vec![row.clone()]),
            Err(PmError::ProtectedParameter { .. })
        ));
        reg.set_entries_with(vec![row], true).unwrap();
        assert_eq!(reg.get("constants.c"), Some(3.0e8));
    }

    #[test]
    fn test_from_json_with_config_keeps_overwrite_setting() {
        let json = seeded().to_json().unwrap();
        let cfg = KernelConfig {
            allow_overwrite_established: true,
            ..Default::default()
        };
        let restored = ParamRegistry::from_json_with_config(&json, &cfg).unwrap();
        assert!(restored.allows_overwrite_established());
        assert!(restored
            .set("constants.c", 3.0e8, "rounding", ParamStatus::Derived)
            .is_ok());
        assert!(!ParamRegistry::from_json(&json)
            .unwrap()
            .allows_overwrite_established());
    }

    #[test]
    fn test_compare_zero_experimental_has_no_rel_deviation() {
        let reg = ParamRegistry::new();
        reg.set_entry(
            ParamEntry::new("cosmology.curvature", 0.001, "f", ParamStatus::Predicted)
                .with_experimental(ExperimentalBound::new(0.0, 0.002, "ref")),
        )
        .unwrap();
        let c = reg.compare("cosmology.curvature").unwrap();
        assert_eq!(c.rel_deviation, None);
        assert!((c.pull.unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_set_entries_is_atomic() {
        let reg = seeded();
        let batch = vec![
            ParamEntry::new("new.value", 1.0, "f", ParamStatus::Derived),
            ParamEntry::new("constants.c", 1.0, "f", ParamStatus::Derived),
        ];
        assert!(reg.set_entries(batch).is_err());
        assert!(!reg.contains("new.value"));
    }

    #[test]
    fn test_set_entries_repeated_path_counts_revisions() {
        let reg = ParamRegistry::new();
        reg.set_entries(vec![
            ParamEntry::new("x", 1.0, "f", ParamStatus::Derived),
            ParamEntry::new("x", 2.0, "f", ParamStatus::Derived),
        ])
        .unwrap();
        let e = reg.entry("x").unwrap();
        assert_eq!(e.value, 2.0);
        assert_eq!(e.revision, 2);
    }

    #[test]
    fn test_prefix_respects_segment_boundary() {
        let reg = seeded();
        reg.set("geometryx.other", 1.0, "s", ParamStatus::Seed).unwrap();
        let paths: Vec<String> = reg
            .with_prefix("geometry")
            .into_iter()
            .map(|e| e.path)
            .collect();
        assert_eq!(paths, vec!["geometry.alpha", "geometry.alpha_inverse"]);
    }

    #[test]
    fn test_by_status_and_source() {
        let reg = seeded();
        assert_eq!(reg.by_status(ParamStatus::Seed).len(), 1);
        assert_eq!(reg.by_source("alpha").len(), 2);
    }

    #[test]
    fn test_paths_sorted() {
        let reg = seeded();
        let paths = reg.paths();
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(paths, sorted);
    }

    #[test]
    fn test_attach_to_unknown_path() {
        let reg = ParamRegistry::new();
        let err = reg
            .attach_experimental("x", ExperimentalBound::new(1.0, 0.1, "d"))
            .unwrap_err();
        assert_eq!(err, PmError::UnknownParameter("x".into()));
    }

    #[test]
    fn test_compare_combines_sigmas() {
        let reg = ParamRegistry::new();
        reg.set_entry(
            ParamEntry::new("m", 10.5, "f", ParamStatus::Predicted)
                .with_uncertainty(0.3)
                .with_experimental(ExperimentalBound::new(10.0, 0.4, "PDG")),
        )
        .unwrap();
        let c = reg.compare("m").unwrap();
        assert!((c.sigma - 0.5).abs() < 1e-12);
        assert!((c.pull.unwrap() - 1.0).abs() < 1e-12);
        assert!((c.rel_deviation.unwrap() - 0.05).abs() < 1e-12);
        assert!(!c.within_interval);
    }

    #[test]
    fn test_compare_exact_reference_has_no_pull() {
        let reg = ParamRegistry::new();
        reg.set_entry(
            ParamEntry::new("n", 3.0, "f", ParamStatus::Predicted)
                .with_experimental(ExperimentalBound::new(3.0, 0.0, "exact")),
        )
        .unwrap();
        let c = reg.compare("n").unwrap();
        assert!(c.pull.is_none());
        assert!(c.within_interval);
    }

    #[test]
    fn test_compare_without_bound() {
        let reg = seeded();
        assert!(matches!(
            reg.compare("topology.b3"),
            Err(PmError::UnknownReference { .. })
        ));
    }

    #[test]
    fn test_compare_all_only_bounded() {
        let reg = seeded();
        reg.attach_experimental("geometry.alpha", ExperimentalBound::new(0.0073, 1e-6, "x"))
            .unwrap();
        let all = reg.compare_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].path, "geometry.alpha");
    }

    #[test]
    fn test_json_roundtrip() {
        let reg = seeded();
        reg.set_uncertainty("geometry.alpha_inverse", 0.01).unwrap();
        let json = reg.to_json().unwrap();
        let back = ParamRegistry::from_json(&json).unwrap();
        assert_eq!(back.snapshot(), reg.snapshot());
    }

    #[test]
    fn test_restore_rejects_invalid_entries() {
        let reg = seeded();
        let snapshot = RegistrySnapshot {
            entries: vec![ParamEntry::new("ok", f64::NAN, "s", ParamStatus::Seed)],
        };
        assert!(reg.restore(snapshot).is_err());
        assert_eq!(reg.len(), 4);
    }

    #[test]
    fn test_remove_and_clear() {
        let reg = seeded();
        assert!(reg.remove("topology.b3").is_some());
        assert!(!reg.contains("topology.b3"));
        reg.clear();
        assert!(reg.is_empty());
    }
}
