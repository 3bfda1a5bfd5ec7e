use serde::Serialize;

use crate::error::{Result, SimError};
use crate::field::SiteField;
use crate::simulation::Ensemble;
use crate::statistics::observables::{energy, magnetisation};

/// Mean over ensemble members with its standard error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Estimate {
    pub mean: f64,
    pub error: f64,
}

impl Estimate {
    /// Mean of per-member values with the standard error of that mean.
    pub fn from_members(values: &[f64]) -> Self {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let error = if values.len() > 1 {
            let var = values.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
            (var / n).sqrt()
        } else {
            0.0
        };
        Self { mean, error }
    }

    /// `|error / mean|`; infinite or NaN when the mean is zero.
    pub fn relative_error(&self) -> f64 {
        (self.error / self.mean).abs()
    }
}

/// Running sums of one member's magnetisation and energy moments.
#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    m: f64,
    abs_m: f64,
    m2: f64,
    m4: f64,
    e: f64,
    e2: f64,
}

impl Moments {
    fn add(&mut self, m: f64, e: f64) {
        let m2 = m * m;
        self.m += m;
        self.abs_m += m.abs();
        self.m2 += m2;
        self.m4 += m2 * m2;
        self.e += e;
        self.e2 += e * e;
    }
}

/// Time sums of [`Moments`] for every member of an ensemble.
#[derive(Debug, Clone)]
struct MemberMoments {
    count: usize,
    members: Vec<Moments>,
}

impl MemberMoments {
    fn new(sysnum: usize) -> Self {
        Self {
            count: 0,
            members: vec![Moments::default(); sysnum],
        }
    }

    /// Add one recorded state, given per-member magnetisations and energies.
    fn record(&mut self, mags: &[f64], energies: &[f64]) {
        self.count += 1;
        for ((acc, &m), &e) in self.members.iter_mut().zip(mags).zip(energies) {
            acc.add(m, e);
        }
    }

    /// Time average of one moment per member, summarised over members.
    fn estimate(&self, moment: impl Fn(&Moments) -> f64) -> Estimate {
        let count = self.count.max(1) as f64;
        let averages: Vec<f64> = self.members.iter().map(|acc| moment(acc) / count).collect();
        Estimate::from_members(&averages)
    }
}

/// The field `h` as seen by every recorded state, if it never changed.
fn static_field(ensemble: &Ensemble) -> Result<SiteField<'_>> {
    if ensemble.iternum() == 0 {
        return Err(SimError::missing("no recorded states to summarise"));
    }
    ensemble
        .config()
        .h
        .frozen()
        .ok_or_else(|| SimError::invalid("summary needs a time-independent field h"))
}

/// Member-averaged energy per spin over every recorded state.
///
/// Each member's energy is averaged over time first; the error is the
/// standard error of those averages.
pub fn energy_estimate(ensemble: &Ensemble) -> Result<Estimate> {
    let h = static_field(ensemble)?;
    let lattice = ensemble.lattice();
    let mut sums = vec![0.0; ensemble.sysnum()];
    for state in ensemble.trajectory().iter() {
        for (acc, e) in sums.iter_mut().zip(energy(lattice, state, &h)) {
            *acc += e;
        }
    }
    let count = ensemble.iternum() as f64;
    let averages: Vec<f64> = sums.iter().map(|s| s / count).collect();
    Ok(Estimate::from_members(&averages))
}

/// Time- and member-averaged observables of a recorded ensemble.
///
/// Moments are time averages per member; the reported value is the mean
/// over members and the error is the spread between members.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsembleSummary {
    pub iternum: usize,
    pub sysnum: usize,
    /// ⟨m⟩, mean magnetisation per spin.
    pub mag: Estimate,
    /// ⟨|m|⟩.
    pub abs_mag: Estimate,
    /// ⟨m²⟩.
    pub mag2: Estimate,
    /// ⟨m⁴⟩.
    pub mag4: Estimate,
    /// ⟨e⟩, mean energy per spin.
    pub energy: Estimate,
    /// ⟨e²⟩.
    pub energy2: Estimate,
    /// `1 - ⟨m⁴⟩ / (3 ⟨m²⟩²)`.
    pub binder: f64,
    /// Specific heat per spin `b² N (⟨e²⟩ - ⟨e⟩²)`; only for a scalar coupling.
    pub specific_heat: Option<f64>,
    /// Susceptibility per spin `b N (⟨m²⟩ - ⟨|m|⟩²)`; only for a scalar coupling.
    pub susceptibility: Option<f64>,
}

impl EnsembleSummary {
    /// Summarise every recorded state of `ensemble`.
    ///
    /// The energy is evaluated with the ensemble's current field `h`, which
    /// must not vary in time.
    pub fn from_ensemble(ensemble: &Ensemble) -> Result<Self> {
        let h = static_field(ensemble)?;
        let iternum = ensemble.iternum();
        let lattice = ensemble.lattice();
        let sysnum = ensemble.sysnum();

        let mut moments = MemberMoments::new(sysnum);
        for state in ensemble.trajectory().iter() {
            moments.record(
                &magnetisation(state, lattice.n_spins),
                &energy(lattice, state, &h),
            );
        }

        let mag = moments.estimate(|acc| acc.m);
        let abs_mag = moments.estimate(|acc| acc.abs_m);
        let mag2 = moments.estimate(|acc| acc.m2);
        let mag4 = moments.estimate(|acc| acc.m4);
        let energy = moments.estimate(|acc| acc.e);
        let energy2 = moments.estimate(|acc| acc.e2);

        let binder = if mag2.mean > 0.0 {
            1.0 - mag4.mean / (3.0 * mag2.mean * mag2.mean)
        } else {
            0.0
        };
        let n = lattice.n_spins as f64;
        let b = ensemble.config().b.as_uniform();
        let specific_heat = b.map(|b| b * b * n * (energy2.mean - energy.mean * energy.mean));
        let susceptibility = b.map(|b| b * n * (mag2.mean - abs_mag.mean * abs_mag.mean));

        Ok(Self {
            iternum,
            sysnum,
            mag,
            abs_mag,
            mag2,
            mag4,
            energy,
            energy2,
            binder,
            specific_heat,
            susceptibility,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnsembleConfig, RunConfig};
    use crate::field::ControlField;
    use approx::assert_relative_eq;

    #[test]
    fn test_ordered_ensemble_summary() {
        let cfg = EnsembleConfig::square(5, 3, 0.0, 5.0, 0.0).with_seed(9);
        let mut ens = Ensemble::new(cfg).unwrap();
        ens.simulate(&RunConfig::fresh(10)).unwrap();

        let summary = EnsembleSummary::from_ensemble(&ens).unwrap();
        assert_eq!(summary.iternum, 10);
        assert_relative_eq!(summary.mag.mean, 1.0);
        assert_relative_eq!(summary.mag.error, 0.0);
        assert_relative_eq!(summary.mag4.mean, 1.0);
        assert_relative_eq!(summary.energy.mean, -2.0);
        assert_relative_eq!(summary.binder, 2.0 / 3.0);
        assert_relative_eq!(summary.specific_heat.unwrap(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(summary.susceptibility.unwrap(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_member_moments_average_over_time() {
        let mut moments = MemberMoments::new(2);
        moments.record(&[1.0, -0.5], &[-2.0, 0.0]);
        moments.record(&[-1.0, 0.5], &[-1.0, 1.0]);

        let abs_m = moments.estimate(|acc| acc.abs_m);
        assert_relative_eq!(abs_m.mean, 0.75);
        assert_relative_eq!(abs_m.error, 0.25);
        assert_relative_eq!(moments.estimate(|acc| acc.m).mean, 0.0);
        assert_relative_eq!(moments.estimate(|acc| acc.m4).mean, (1.0 + 0.0625) / 2.0);
        assert_relative_eq!(moments.estimate(|acc| acc.e2).mean, (2.5 + 0.5) / 2.0);

        let empty = MemberMoments::new(3).estimate(|acc| acc.e);
        assert_eq!(empty.mean, 0.0);
    }

    #[test]
    fn test_energy_estimate_matches_summary() {
        let mut ens = Ensemble::new(EnsembleConfig::square(5, 4, 0.5, 0.3, 0.2).with_seed(12)).unwrap();
        ens.simulate(&RunConfig::fresh(12)).unwrap();
        let summary = EnsembleSummary::from_ensemble(&ens).unwrap();
        let estimate = energy_estimate(&ens).unwrap();
        assert_relative_eq!(estimate.mean, summary.energy.mean, epsilon = 1e-12);
        assert_relative_eq!(estimate.error, summary.energy.error, epsilon = 1e-12);
        assert!(estimate.error > 0.0);
    }

    #[test]
    fn test_fluctuation_estimates_need_scalar_coupling() {
        let mut cfg = EnsembleConfig::square(3, 2, 0.5, 0.3, 0.0).with_seed(9);
        cfg.b = ControlField::spatial(3, 3, vec![0.3; 9]).unwrap();
        let ens = Ensemble::new(cfg).unwrap();
        let summary = EnsembleSummary::from_ensemble(&ens).unwrap();
        assert!(summary.specific_heat.is_none());
        assert!(summary.susceptibility.is_none());
    }

    #[test]
    fn test_time_dependent_field_is_rejected() {
        let mut cfg = EnsembleConfig::square(3, 2, 0.5, 0.3, 0.0).with_seed(9);
        cfg.h = ControlField::Temporal(vec![0.0; 4]);
        let ens = Ensemble::new(cfg).unwrap();
        assert!(matches!(
            EnsembleSummary::from_ensemble(&ens),
            Err(SimError::InvalidParameter(_))
        ));
    }
}
