use std::collections::BTreeMap;

use crate::error::{Result, SimError};
use crate::simulation::ensemble::Ensemble;

/// Map an `f64` onto a `u64` whose unsigned order matches `f64::total_cmp`.
fn ordered_bits(x: f64) -> u64 {
    let bits = x.to_bits();
    if bits >> 63 == 1 {
        !bits
    } else {
        bits | (1 << 63)
    }
}

fn from_ordered_bits(bits: u64) -> f64 {
    if bits >> 63 == 1 {
        f64::from_bits(bits & !(1 << 63))
    } else {
        f64::from_bits(!bits)
    }
}

/// Identifies one run of a parameter scan by lattice size and coupling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunKey {
    pub size: usize,
    coupling: u64,
}

impl RunKey {
    /// `-0.0` and `0.0` map to the same key.
    pub fn new(size: usize, coupling: f64) -> Self {
        let coupling = if coupling == 0.0 { 0.0 } else { coupling };
        Self {
            size,
            coupling: ordered_bits(coupling),
        }
    }

    pub fn coupling(&self) -> f64 {
        from_ordered_bits(self.coupling)
    }
}

/// One entry of a scan: the ensemble and how much burn-in was discarded.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub ensemble: Ensemble,
    pub relaxation: usize,
}

/// Ensembles of a parameter scan keyed by `(size, coupling)`.
///
/// Iteration is ordered by size, then by coupling.
#[derive(Debug, Default, Clone)]
pub struct RunRegistry {
    runs: BTreeMap<RunKey, RunRecord>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for an ensemble: it must be square with a uniform scalar coupling.
    pub fn key_of(ensemble: &Ensemble) -> Result<RunKey> {
        let (nx, ny) = ensemble.grid_shape();
        if nx != ny {
            return Err(SimError::invalid(format!(
                "scan runs must be square, got ({nx}, {ny})"
            )));
        }
        let b = ensemble.config().b.as_uniform().ok_or_else(|| {
            SimError::invalid("scan runs must use a scalar coupling b")
        })?;
        Ok(RunKey::new(nx, b))
    }

    /// Insert a run, returning the record it replaced, if any.
    pub fn insert(&mut self, ensemble: Ensemble, relaxation: usize) -> Result<Option<RunRecord>> {
        let key = Self::key_of(&ensemble)?;
        Ok(self.runs.insert(
            key,
            RunRecord {
                ensemble,
                relaxation,
            },
        ))
    }

    pub fn get(&self, size: usize, coupling: f64) -> Option<&RunRecord> {
        self.runs.get(&RunKey::new(size, coupling))
    }

    pub fn get_mut(&mut self, size: usize, coupling: f64) -> Option<&mut RunRecord> {
        self.runs.get_mut(&RunKey::new(size, coupling))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RunKey, &RunRecord)> {
        self.runs.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&RunKey, &mut RunRecord)> {
        self.runs.iter_mut()
    }

    /// All runs on an `size` by `size` lattice, by increasing coupling.
    pub fn with_size(&self, size: usize) -> impl Iterator<Item = (&RunKey, &RunRecord)> {
        self.runs
            .range(RunKey::new(size, f64::NEG_INFINITY)..=RunKey::new(size, f64::INFINITY))
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnsembleConfig;
    use crate::field::ControlField;

    fn ensemble(n: usize, b: f64) -> Ensemble {
        Ensemble::new(EnsembleConfig::square(n, 1, 0.5, b, 0.0).with_seed(3)).unwrap()
    }

    #[test]
    fn test_ordered_bits_round_trip() {
        for x in [-2.5, -0.0, 0.0, 0.44, 1.0, f64::INFINITY] {
            assert_eq!(from_ordered_bits(ordered_bits(x)).to_bits(), x.to_bits());
        }
        assert!(ordered_bits(-1.0) < ordered_bits(-0.5));
        assert!(ordered_bits(-0.5) < ordered_bits(0.2));
        assert!(ordered_bits(0.2) < ordered_bits(0.44));
    }

    #[test]
    fn test_keyed_lookup_and_order() {
        let mut reg = RunRegistry::new();
        for (n, b) in [(10, 0.44), (5, 0.2), (10, 0.2), (5, 0.5)] {
            assert!(reg.insert(ensemble(n, b), 0).unwrap().is_none());
        }
        assert_eq!(reg.len(), 4);
        assert!(reg.get(10, 0.44).is_some());
        assert!(reg.get(10, 0.45).is_none());

        let keys: Vec<(usize, f64)> = reg.iter().map(|(k, _)| (k.size, k.coupling())).collect();
        assert_eq!(keys, vec![(5, 0.2), (5, 0.5), (10, 0.2), (10, 0.44)]);

        let tens: Vec<f64> = reg.with_size(10).map(|(k, _)| k.coupling()).collect();
        assert_eq!(tens, vec![0.2, 0.44]);

        reg.get_mut(5, 0.2).unwrap().relaxation = 7;
        assert_eq!(reg.get(5, 0.2).unwrap().relaxation, 7);
        assert!(reg.insert(ensemble(5, 0.2), 1).unwrap().is_some());
    }

    #[test]
    fn test_signed_zero_coupling_shares_key() {
        assert_eq!(RunKey::new(4, -0.0), RunKey::new(4, 0.0));
        assert_eq!(RunKey::new(4, -0.0).coupling().to_bits(), 0.0f64.to_bits());

        let mut reg = RunRegistry::new();
        assert!(reg.insert(ensemble(4, 0.0), 0).unwrap().is_none());
        assert!(reg.get(4, -0.0).is_some());
        assert!(reg.insert(ensemble(4, -0.0), 0).unwrap().is_some());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_rejects_unkeyable_runs() {
        let mut reg = RunRegistry::new();
        let mut cfg = EnsembleConfig::square(4, 1, 0.5, 0.3, 0.0).with_seed(1);
        cfg.grid_shape = (4, 5);
        assert!(reg.insert(Ensemble::new(cfg).unwrap(), 0).is_err());

        let mut cfg = EnsembleConfig::square(4, 1, 0.5, 0.3, 0.0).with_seed(1);
        cfg.b = ControlField::Temporal(vec![0.3; 4]);
        assert!(reg.insert(Ensemble::new(cfg).unwrap(), 0).is_err());
        assert!(reg.is_empty());
    }
}
