pub mod ensemble;
pub mod registry;
pub mod trajectory;

pub use ensemble::{Ensemble, EnsembleMetadata, StreamState};
pub use registry::{RunKey, RunRecord, RunRegistry};
pub use trajectory::Trajectory;

use std::sync::atomic::AtomicBool;

use rayon::prelude::*;
use tracing::{info, warn};
use validator::Validate;

use crate::config::{ConvergenceConfig, EnsembleConfig, RunConfig, ScanConfig};
use crate::error::{Result, SimError};
use crate::statistics::{energy_estimate, Estimate};

/// Build, relax and record one ensemble.
///
/// Runs `relaxation + iternum` states from a fresh initial state, then
/// discards the first `relaxation` of them.
pub fn run_relaxed(
    config: EnsembleConfig,
    relaxation: usize,
    iternum: usize,
    sequential: bool,
    interrupted: &AtomicBool,
    on_sweep: &(dyn Fn() + Sync),
) -> Result<Ensemble> {
    let mut ensemble = Ensemble::new(config)?;
    let run = RunConfig::fresh(relaxation + iternum).sequential(sequential);
    ensemble.simulate_with(&run, interrupted, on_sweep)?;
    if relaxation > 0 {
        ensemble.trim_init(relaxation)?;
    }
    Ok(ensemble)
}

/// Outcome of [`run_until_converged`].
#[derive(Debug, Clone)]
pub struct ConvergedRun {
    pub ensemble: Ensemble,
    /// Energy per spin over every state kept after relaxation.
    pub energy: Estimate,
    /// Whether the tolerance was met before the cap.
    pub converged: bool,
}

/// Relax an ensemble, then extend it `check_every` sweeps at a time until
/// the member-averaged energy has `|error / mean| < tol` or the trajectory
/// holds `max_iternum` states.
///
/// Needs at least two members, since the error is their spread.
pub fn run_until_converged(
    config: EnsembleConfig,
    criteria: &ConvergenceConfig,
    sequential: bool,
    interrupted: &AtomicBool,
    on_sweep: &(dyn Fn() + Sync),
) -> Result<ConvergedRun> {
    criteria.validate()?;
    if config.sysnum < 2 {
        return Err(SimError::invalid(
            "energy convergence needs at least two members",
        ));
    }
    let mut ensemble = run_relaxed(
        config,
        criteria.relaxation,
        1,
        sequential,
        interrupted,
        on_sweep,
    )?;

    loop {
        let chunk = criteria
            .check_every
            .min(criteria.max_iternum.saturating_sub(ensemble.iternum()));
        let run = RunConfig::resume(chunk).sequential(sequential);
        ensemble.simulate_with(&run, interrupted, on_sweep)?;

        let energy = energy_estimate(&ensemble)?;
        let rel_err = energy.relative_error();
        info!(
            iternum = ensemble.iternum(),
            mean = energy.mean,
            error = energy.error,
            rel_err,
            "energy checked"
        );
        if rel_err < criteria.tol {
            return Ok(ConvergedRun {
                ensemble,
                energy,
                converged: true,
            });
        }
        if ensemble.iternum() >= criteria.max_iternum {
            warn!(max_iternum = criteria.max_iternum, rel_err, "tolerance not reached");
            return Ok(ConvergedRun {
                ensemble,
                energy,
                converged: false,
            });
        }
    }
}

/// Run every point of a `(size, coupling)` scan and collect the results.
///
/// Runs are processed in parallel, each advancing its replicas on a single
/// thread. For a single run the replicas are parallelised instead.
pub fn run_scan(
    scan: &ScanConfig,
    interrupted: &AtomicBool,
    on_sweep: &(dyn Fn() + Sync),
) -> Result<RunRegistry> {
    scan.validate()?;
    let configs = scan.ensemble_configs();
    info!(runs = configs.len(), iternum = scan.iternum, "scan started");

    let ensembles: Vec<Ensemble> = if configs.len() == 1 {
        configs
            .into_iter()
            .map(|c| run_relaxed(c, scan.relaxation, scan.iternum, false, interrupted, on_sweep))
            .collect::<Result<_>>()?
    } else {
        configs
            .into_par_iter()
            .map(|c| run_relaxed(c, scan.relaxation, scan.iternum, true, interrupted, on_sweep))
            .collect::<Result<_>>()?
    };

    let mut registry = RunRegistry::new();
    for ensemble in ensembles {
        registry.insert(ensemble, scan.relaxation)?;
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_relaxed_trims_burn_in() {
        let cfg = EnsembleConfig::square(4, 2, 0.5, 0.3, 0.0).with_seed(8);
        let ens = run_relaxed(cfg, 5, 10, false, &AtomicBool::new(false), &|| {}).unwrap();
        assert_eq!(ens.iternum(), 10);
        assert_eq!(ens.shape(), [10, 2, 4, 4]);
    }

    #[test]
    fn test_frozen_ensemble_converges_after_one_check() {
        let cfg = EnsembleConfig::square(5, 3, 0.0, 5.0, 0.0).with_seed(21);
        let criteria = ConvergenceConfig {
            relaxation: 4,
            check_every: 10,
            max_iternum: 1000,
            tol: 0.01,
        };
        let out =
            run_until_converged(cfg, &criteria, false, &AtomicBool::new(false), &|| {}).unwrap();
        assert!(out.converged);
        assert_eq!(out.ensemble.iternum(), 11);
        assert!((out.energy.mean + 2.0).abs() < 1e-12);
        assert_eq!(out.energy.error, 0.0);
    }

    #[test]
    fn test_unreachable_tolerance_stops_at_cap() {
        let cfg = EnsembleConfig::square(4, 2, 0.5, 0.3, 0.0).with_seed(22);
        let criteria = ConvergenceConfig {
            relaxation: 0,
            check_every: 10,
            max_iternum: 35,
            tol: 0.0,
        };
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let on_sweep = || {
            calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        };
        let out =
            run_until_converged(cfg, &criteria, true, &AtomicBool::new(false), &on_sweep).unwrap();
        assert!(!out.converged);
        assert_eq!(out.ensemble.iternum(), 35);
        assert_eq!(calls.load(std::sync::atomic::Ordering::Relaxed), 34);
    }

    #[test]
    fn test_convergence_needs_two_members() {
        let cfg = EnsembleConfig::square(4, 1, 0.0, 5.0, 0.0).with_seed(23);
        let err = run_until_converged(
            cfg,
            &ConvergenceConfig::default(),
            false,
            &AtomicBool::new(false),
            &|| {},
        )
        .unwrap_err();
        assert!(matches!(err, SimError::InvalidParameter(_)));
    }

    #[test]
    fn test_scan_fills_registry() {
        let scan = ScanConfig {
            sizes: vec![4, 6],
            couplings: vec![0.2, 0.6],
            sysnum: 2,
            p: 0.5,
            h: 0.0,
            relaxation: 3,
            iternum: 5,
            seed: Some(10),
        };
        let reg = run_scan(&scan, &AtomicBool::new(false), &|| {}).unwrap();
        assert_eq!(reg.len(), 4);
        let rec = reg.get(6, 0.6).unwrap();
        assert_eq!(rec.relaxation, 3);
        assert_eq!(rec.ensemble.shape(), [5, 2, 6, 6]);
    }
}
