use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::field::ControlField;

fn validate_ensemble_config(cfg: &EnsembleConfig) -> Result<(), ValidationError> {
    if cfg.grid_shape.0 == 0 || cfg.grid_shape.1 == 0 {
        return Err(ValidationError::new("grid_shape must be non-zero in both axes"));
    }
    if cfg.sysnum < 1 {
        return Err(ValidationError::new("sysnum must be >= 1"));
    }
    // Written so that NaN is rejected too.
    if !(0.0..=1.0).contains(&cfg.p) {
        return Err(ValidationError::new("p must lie in [0, 1]"));
    }
    let grid = [cfg.grid_shape.0, cfg.grid_shape.1];
    if cfg.b.check(None, grid).is_err() {
        return Err(ValidationError::new("b does not broadcast to the grid"));
    }
    if cfg.h.check(None, grid).is_err() {
        return Err(ValidationError::new("h does not broadcast to the grid"));
    }
    Ok(())
}

/// Parameters shared by every member of an ensemble.
#[derive(Debug, Clone, PartialEq, Validate, Serialize, Deserialize)]
#[validate(schema(function = "validate_ensemble_config"))]
pub struct EnsembleConfig {
    /// `(nx, ny)`.
    pub grid_shape: (usize, usize),
    /// Number of independent replicas.
    pub sysnum: usize,
    /// Probability that a site starts as -1.
    pub p: f64,
    /// Coupling `J / kT`.
    pub b: ControlField,
    /// External field `muH / J`.
    pub h: ControlField,
    /// Start every replica from the same configuration.
    pub identical: bool,
    /// Base seed for the per-replica generators; drawn from entropy when absent.
    pub seed: Option<u64>,
}

impl EnsembleConfig {
    /// Square `n` by `n` grid with scalar coupling and field.
    pub fn square(n: usize, sysnum: usize, p: f64, b: f64, h: f64) -> Self {
        Self {
            grid_shape: (n, n),
            sysnum,
            p,
            b: ControlField::Scalar(b),
            h: ControlField::Scalar(h),
            identical: false,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_identical(mut self, identical: bool) -> Self {
        self.identical = identical;
        self
    }
}

fn validate_run_config(cfg: &RunConfig) -> Result<(), ValidationError> {
    if cfg.reset && cfg.iternum < 1 {
        return Err(ValidationError::new(
            "iternum must be >= 1 when resetting (the initial state is recorded)",
        ));
    }
    if cfg.regen_init && !cfg.reset {
        return Err(ValidationError::new("regen_init requires reset"));
    }
    Ok(())
}

/// Options for one call to [`crate::Ensemble::simulate`].
#[derive(Debug, Clone, Copy, PartialEq, Validate)]
#[validate(schema(function = "validate_run_config"))]
pub struct RunConfig {
    /// States recorded by this call. For a reset run this includes the
    /// initial state.
    pub iternum: usize,
    /// Discard the trajectory back to the initial state first.
    pub reset: bool,
    /// Draw a fresh initial state when resetting.
    pub regen_init: bool,
    /// Advance replicas on the current thread instead of the rayon pool.
    pub sequential: bool,
}

impl RunConfig {
    /// Fresh run from the current initial state.
    pub fn fresh(iternum: usize) -> Self {
        Self {
            iternum,
            reset: true,
            regen_init: false,
            sequential: false,
        }
    }

    /// Append `iternum` states to the existing trajectory.
    pub fn resume(iternum: usize) -> Self {
        Self {
            iternum,
            reset: false,
            regen_init: false,
            sequential: false,
        }
    }

    pub fn regenerated(mut self) -> Self {
        self.regen_init = true;
        self
    }

    pub fn sequential(mut self, sequential: bool) -> Self {
        self.sequential = sequential;
        self
    }

    /// Sweeps this call performs.
    pub fn n_sweeps(&self) -> usize {
        if self.reset {
            self.iternum.saturating_sub(1)
        } else {
            self.iternum
        }
    }
}

fn validate_convergence_config(cfg: &ConvergenceConfig) -> Result<(), ValidationError> {
    if cfg.check_every < 1 {
        return Err(ValidationError::new("check_every must be >= 1"));
    }
    if cfg.max_iternum < 2 {
        return Err(ValidationError::new("max_iternum must leave room for one sweep"));
    }
    if cfg.tol.is_nan() || cfg.tol < 0.0 {
        return Err(ValidationError::new("tol must be non-negative"));
    }
    Ok(())
}

/// When to stop a run that simulates until its energy is known precisely.
#[derive(Debug, Clone, Copy, PartialEq, Validate, Serialize, Deserialize)]
#[validate(schema(function = "validate_convergence_config"))]
pub struct ConvergenceConfig {
    /// States discarded before measuring.
    pub relaxation: usize,
    /// Sweeps between two checks of the estimate.
    pub check_every: usize,
    /// Hard cap on the recorded states.
    pub max_iternum: usize,
    /// Target for `|error / mean|` of the member-averaged energy.
    pub tol: f64,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            relaxation: 150,
            check_every: 100,
            max_iternum: 10_000,
            tol: 0.01,
        }
    }
}

fn validate_scan_config(cfg: &ScanConfig) -> Result<(), ValidationError> {
    if cfg.sizes.is_empty() || cfg.sizes.contains(&0) {
        return Err(ValidationError::new("sizes must be non-empty and non-zero"));
    }
    if cfg.couplings.is_empty() {
        return Err(ValidationError::new("couplings must be non-empty"));
    }
    let mut couplings = cfg.couplings.clone();
    couplings.sort_by(f64::total_cmp);
    if couplings.windows(2).any(|w| w[0] == w[1]) {
        return Err(ValidationError::new("couplings must be distinct"));
    }
    if cfg.sysnum < 1 {
        return Err(ValidationError::new("sysnum must be >= 1"));
    }
    if !(0.0..=1.0).contains(&cfg.p) {
        return Err(ValidationError::new("p must lie in [0, 1]"));
    }
    if cfg.iternum < 1 {
        return Err(ValidationError::new("iternum must be >= 1"));
    }
    Ok(())
}

/// A grid of square ensembles over lattice sizes and couplings.
#[derive(Debug, Clone, PartialEq, Validate, Serialize, Deserialize)]
#[validate(schema(function = "validate_scan_config"))]
pub struct ScanConfig {
    pub sizes: Vec<usize>,
    pub couplings: Vec<f64>,
    pub sysnum: usize,
    pub p: f64,
    pub h: f64,
    /// States discarded from the front of every run.
    pub relaxation: usize,
    /// States kept per run after relaxation.
    pub iternum: usize,
    pub seed: Option<u64>,
}

impl ScanConfig {
    /// One ensemble config per `(size, coupling)` pair, in size-major order.
    ///
    /// With a seed, run `k` gets base seed `seed + k * (sysnum + 1)` so no two
    /// runs share a generator stream.
    pub fn ensemble_configs(&self) -> Vec<EnsembleConfig> {
        let stride = self.sysnum as u64 + 1;
        self.sizes
            .iter()
            .flat_map(|&n| self.couplings.iter().map(move |&b| (n, b)))
            .enumerate()
            .map(|(k, (n, b))| {
                let mut cfg = EnsembleConfig::square(n, self.sysnum, self.p, b, self.h);
                cfg.seed = self
                    .seed
                    .map(|s| s.wrapping_add((k as u64).wrapping_mul(stride)));
                cfg
            })
            .collect()
    }
}
