//! # Stage: Traffic Assignment
//!
//! ## Responsibility
//! Maps `(experiment, user)` to a variant so that a user always sees the same
//! variant for a given experiment, and the share of users per variant
//! converges to the configured traffic percentages.
//!
//! ## Guarantees
//! - Deterministic: the bucket is a pure function of the two ids (SHA-1 of
//!   the key, top 53 bits scaled to `[0, 1)`), independent of process state
//! - Immutable tables: a split table is built once from a snapshot of the
//!   variants at start and never mutated; reads share it through `Arc`
//! - Read-mostly: lookups take a shared `RwLock` guard only long enough to
//!   clone the `Arc`
//!
//! ## NOT Responsible For
//! - Experiment lifecycle (the registry installs and removes tables)

use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use sha1::{Digest, Sha1};

use super::model::Variant;

/// Uniform bucket in `[0, 1)` for a user within an experiment.
pub fn bucket(experiment_id: &str, user_id: &str) -> f64 {
    let mut hasher = Sha1::new();
    hasher.update(experiment_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(user_id.as_bytes());
    let digest = hasher.finalize();

    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let x = u64::from_be_bytes(head) >> 11;
    x as f64 / (1u64 << 53) as f64
}

// ---------------------------------------------------------------------------
// SplitTable
// ---------------------------------------------------------------------------

/// Cumulative-threshold table for one running experiment.
#[derive(Debug, Clone)]
pub struct SplitTable {
    experiment_id: String,
    variants: Vec<Variant>,
    /// Running sum of `traffic_percent / 100` in declared order.
    thresholds: Vec<f64>,
}

impl SplitTable {
    /// Build a table from a copy of the variants. `variants` must be non-empty.
    pub fn new(experiment_id: &str, variants: &[Variant]) -> Self {
        let mut acc = 0.0;
        let thresholds = variants
            .iter()
            .map(|v| {
                acc += v.traffic_percent / 100.0;
                acc
            })
            .collect();
        Self {
            experiment_id: experiment_id.to_string(),
            variants: variants.to_vec(),
            thresholds,
        }
    }

    pub fn experiment_id(&self) -> &str { &self.experiment_id }

    pub fn variants(&self) -> &[Variant] { &self.variants }

    /// Variant for a bucket value in `[0, 1)`.
    ///
    /// Picks the first variant whose cumulative threshold exceeds `h`, so a
    /// 0 % variant never receives traffic. When rounding leaves the last
    /// threshold below `h` the last variant is used.
    pub fn pick(&self, h: f64) -> Option<&Variant> {
        self.thresholds
            .iter()
            .position(|&t| h < t)
            .and_then(|i| self.variants.get(i))
            .or_else(|| self.variants.last())
    }

    pub fn assign(&self, user_id: &str) -> Option<&Variant> {
        self.pick(bucket(&self.experiment_id, user_id))
    }
}

// ---------------------------------------------------------------------------
// TrafficSplitter
// ---------------------------------------------------------------------------

/// Holds one [`SplitTable`] per running experiment.
#[derive(Debug, Default)]
pub struct TrafficSplitter {
    tables: RwLock<HashMap<String, Arc<SplitTable>>>,
}

impl TrafficSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<SplitTable>>> {
        self.tables.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<SplitTable>>> {
        self.tables.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Install the split for an experiment. Returns `false` (and keeps the
    /// existing table) if one is already installed.
    pub fn configure(&self, experiment_id: &str, variants: &[Variant]) -> bool {
        if variants.is_empty() {
            return false;
        }
        let mut tables = self.write();
        if tables.contains_key(experiment_id) {
            return false;
        }
        tables.insert(
            experiment_id.to_string(),
            Arc::new(SplitTable::new(experiment_id, variants)),
        );
        true
    }

    /// Remove an experiment's table. Returns whether one was installed.
    pub fn remove(&self, experiment_id: &str) -> bool {
        self.write().remove(experiment_id).is_some()
    }

    pub fn is_configured(&self, experiment_id: &str) -> bool {
        self.read().contains_key(experiment_id)
    }

    pub fn table(&self, experiment_id: &str) -> Option<Arc<SplitTable>> {
        self.read().get(experiment_id).cloned()
    }

    /// Variant for `user_id`, or `None` if the experiment has no table.
    pub fn assign(&self, experiment_id: &str, user_id: &str) -> Option<Variant> {
        let table = self.table(experiment_id)?;
        table.assign(user_id).cloned()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn variants(shares: &[f64]) -> Vec<Variant> {
        shares
            .iter()
            .enumerate()
            .map(|(i, &s)| Variant::new(format!("v{i}"), s))
            .collect()
    }

    #[test]
    fn test_bucket_in_unit_interval() {
        for i in 0..1_000 {
            let h = bucket("exp", &format!("user-{i}"));
            assert!((0.0..1.0).contains(&h), "h={h}");
        }
    }

    #[test]
    fn test_bucket_deterministic() {
        assert_eq!(bucket("exp1", "user-42"), bucket("exp1", "user-42"));
    }

    #[test]
    fn test_bucket_depends_on_experiment() {
        let differs = (0..100)
            .filter(|i| {
                let u = format!("user-{i}");
                bucket("exp1", &u) != bucket("exp2", &u)
            })
            .count();
        assert_eq!(differs, 100);
    }

    #[test]
    fn test_bucket_not_length_keyed() {
        // Same-length ids must not collapse onto one bucket.
        assert_ne!(bucket("exp", "aaaa"), bucket("exp", "bbbb"));
    }

    #[test]
    fn test_bucket_key_separator_prevents_ambiguity() {
        assert_ne!(bucket("ab", "c"), bucket("a", "bc"));
    }

    #[test]
    fn test_pick_uses_cumulative_thresholds() {
        let t = SplitTable::new("e", &variants(&[20.0, 30.0, 50.0]));
        assert_eq!(t.pick(0.0).unwrap().id, "v0");
        assert_eq!(t.pick(0.19).unwrap().id, "v0");
        assert_eq!(t.pick(0.2).unwrap().id, "v1");
        assert_eq!(t.pick(0.49).unwrap().id, "v1");
        assert_eq!(t.pick(0.5).unwrap().id, "v2");
        assert_eq!(t.pick(0.999).unwrap().id, "v2");
    }

    #[test]
    fn test_pick_falls_back_to_last_variant() {
        // Shares that round short of 1.0 must not bias the first variant.
        let t = SplitTable::new("e", &variants(&[50.0, 49.999_999_9]));
        assert_eq!(t.pick(0.999_999_999_9).unwrap().id, "v1");
    }

    #[test]
    fn test_zero_share_variant_never_picked() {
        let t = SplitTable::new("e", &variants(&[0.0, 100.0]));
        for i in 0..500 {
            assert_eq!(t.assign(&format!("u{i}")).unwrap().id, "v1");
        }
    }

    #[test]
    fn test_table_is_a_snapshot() {
        let mut vs = variants(&[50.0, 50.0]);
        let t = SplitTable::new("e", &vs);
        vs[0].traffic_percent = 100.0;
        vs[1].traffic_percent = 0.0;
        assert_eq!(t.variants()[0].traffic_percent, 50.0);
    }

    #[test]
    fn test_splitter_configure_once() {
        let s = TrafficSplitter::new();
        assert!(s.configure("e", &variants(&[50.0, 50.0])));
        assert!(!s.configure("e", &variants(&[100.0, 0.0])));
        assert_eq!(s.table("e").unwrap().variants()[0].traffic_percent, 50.0);
    }

    #[test]
    fn test_splitter_rejects_empty_variants() {
        let s = TrafficSplitter::new();
        assert!(!s.configure("e", &[]));
        assert!(!s.is_configured("e"));
    }

    #[test]
    fn test_splitter_assign_unknown_is_none() {
        let s = TrafficSplitter::new();
        assert!(s.assign("nope", "user").is_none());
    }

    #[test]
    fn test_splitter_remove() {
        let s = TrafficSplitter::new();
        s.configure("e", &variants(&[50.0, 50.0]));
        assert!(s.remove("e"));
        assert!(!s.remove("e"));
        assert!(s.assign("e", "user").is_none());
    }

    #[test]
    fn test_split_approximately_correct() {
        let t = SplitTable::new("e", &variants(&[20.0, 80.0]));
        let first = (0..10_000)
            .filter(|i| t.assign(&format!("user-{i}")).map(|v| v.id.as_str()) == Some("v0"))
            .count();
        // ~2000 ± 5σ (σ = 40)
        assert!((1_800..=2_200).contains(&first), "expected ~2000, got {first}");
    }
}
