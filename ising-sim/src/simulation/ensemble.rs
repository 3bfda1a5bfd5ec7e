use std::sync::atomic::{AtomicBool, Ordering};

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use validator::Validate;

use crate::config::{EnsembleConfig, RunConfig};
use crate::error::{Result, SimError};
use crate::field::ControlField;
use crate::geometry::Lattice;
use crate::mcmc;
use crate::simulation::trajectory::Trajectory;
use crate::spins;

/// Everything needed to interpret a persisted trajectory array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleMetadata {
    #[serde(flatten)]
    pub config: EnsembleConfig,
    /// Number of recorded snapshots.
    pub iternum: usize,
    /// Generator positions at the end of the record. Records written
    /// without them continue on jumped-ahead streams instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streams: Option<StreamState>,
}

/// Saved positions of the member generators and the shared init generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamState {
    pub members: Vec<Xoshiro256StarStar>,
    pub init: Xoshiro256StarStar,
}

impl EnsembleMetadata {
    /// Logical shape of the trajectory array, `[iternum, sysnum, nx, ny]`.
    pub fn shape(&self) -> [usize; 4] {
        [
            self.iternum,
            self.config.sysnum,
            self.config.grid_shape.0,
            self.config.grid_shape.1,
        ]
    }
}

fn seeded_rngs(base_seed: u64, sysnum: usize) -> (Vec<Xoshiro256StarStar>, Xoshiro256StarStar) {
    let rngs = (0..sysnum)
        .map(|i| Xoshiro256StarStar::seed_from_u64(base_seed.wrapping_add(i as u64)))
        .collect();
    let init_rng = Xoshiro256StarStar::seed_from_u64(base_seed.wrapping_add(sysnum as u64));
    (rngs, init_rng)
}

/// Base streams moved `2^192` draws ahead, clear of anything a run seeded
/// from scratch will reach.
fn jumped_rngs(base_seed: u64, sysnum: usize) -> (Vec<Xoshiro256StarStar>, Xoshiro256StarStar) {
    let (mut rngs, mut init_rng) = seeded_rngs(base_seed, sysnum);
    for rng in rngs.iter_mut() {
        rng.long_jump();
    }
    init_rng.long_jump();
    (rngs, init_rng)
}

/// A batch of independent Ising replicas evolved under shared parameters,
/// together with the full history of their states.
///
/// The trajectory always starts with the initial state and ends with the
/// final one; `iternum` is its length.
#[derive(Debug, Clone)]
pub struct Ensemble {
    config: EnsembleConfig,
    lattice: Lattice,
    /// One PRNG per replica.
    rngs: Vec<Xoshiro256StarStar>,
    /// Draws the shared configuration when replicas start identical.
    init_rng: Xoshiro256StarStar,
    init_state: Option<Vec<i8>>,
    trajectory: Trajectory,
    accepted: u64,
    attempted: u64,
}

impl Ensemble {
    /// Validate `config` and draw a fresh initial state.
    ///
    /// Replica generators are seeded `seed, seed + 1, …`; without a seed one
    /// is drawn from entropy and stored back into the config so the run can
    /// be reproduced from its metadata.
    pub fn new(mut config: EnsembleConfig) -> Result<Self> {
        config.validate()?;
        let base_seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
        config.seed = Some(base_seed);

        let (nx, ny) = config.grid_shape;
        let lattice = Lattice::new(nx, ny)?;
        let (rngs, init_rng) = seeded_rngs(base_seed, config.sysnum);
        let trajectory = Trajectory::new(lattice.shape, config.sysnum);

        let mut ensemble = Self {
            config,
            lattice,
            rngs,
            init_rng,
            init_state: None,
            trajectory,
            accepted: 0,
            attempted: 0,
        };
        ensemble.reset(true)?;
        Ok(ensemble)
    }

    /// Rebuild an ensemble from persisted metadata and its flat
    /// `(iternum, sysnum, nx, ny)` array.
    ///
    /// Saved generator positions are restored, so continuing a reloaded
    /// ensemble draws exactly what the original would have drawn.
    pub fn from_record(metadata: EnsembleMetadata, data: Vec<i8>) -> Result<Self> {
        let EnsembleMetadata {
            mut config,
            iternum,
            streams,
        } = metadata;
        config.validate()?;
        let base_seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
        config.seed = Some(base_seed);

        let (nx, ny) = config.grid_shape;
        let lattice = Lattice::new(nx, ny)?;
        let trajectory = Trajectory::from_raw(lattice.shape, config.sysnum, iternum, data)?;
        let (rngs, init_rng) = match streams {
            Some(StreamState { members, init }) => {
                if members.len() != config.sysnum {
                    return Err(SimError::DataIntegrity {
                        index: None,
                        detail: format!(
                            "{} saved generators for {} members",
                            members.len(),
                            config.sysnum
                        ),
                    });
                }
                (members, init)
            }
            None => {
                warn!("record has no generator state; continuing on jumped streams");
                jumped_rngs(base_seed, config.sysnum)
            }
        };
        let init_state = trajectory.first().map(<[i8]>::to_vec);

        debug!(iternum, sysnum = config.sysnum, nx, ny, "ensemble reconstructed");

        Ok(Self {
            config,
            lattice,
            rngs,
            init_rng,
            init_state,
            trajectory,
            accepted: 0,
            attempted: 0,
        })
    }

    pub fn metadata(&self) -> EnsembleMetadata {
        EnsembleMetadata {
            config: self.config.clone(),
            iternum: self.iternum(),
            streams: Some(StreamState {
                members: self.rngs.clone(),
                init: self.init_rng.clone(),
            }),
        }
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn sysnum(&self) -> usize {
        self.config.sysnum
    }

    pub fn grid_shape(&self) -> (usize, usize) {
        self.config.grid_shape
    }

    /// Number of recorded states, initial state included.
    pub fn iternum(&self) -> usize {
        self.trajectory.len()
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    /// The full record as a flat `(iternum, sysnum, nx, ny)` array.
    pub fn as_array(&self) -> &[i8] {
        self.trajectory.as_slice()
    }

    /// `[iternum, sysnum, nx, ny]`.
    pub fn shape(&self) -> [usize; 4] {
        self.trajectory.shape()
    }

    /// Ensemble state at recorded iteration `t`.
    pub fn snapshot(&self, t: usize) -> Option<&[i8]> {
        self.trajectory.get(t)
    }

    /// Lattice of member `k` at recorded iteration `t`.
    pub fn member(&self, t: usize, k: usize) -> Option<&[i8]> {
        self.trajectory.member(t, k)
    }

    pub fn init_state(&self) -> Option<&[i8]> {
        self.init_state.as_deref()
    }

    pub fn final_state(&self) -> Option<&[i8]> {
        self.trajectory.last()
    }

    /// Fraction of accepted flip attempts since construction.
    pub fn acceptance_rate(&self) -> Option<f64> {
        (self.attempted > 0).then(|| self.accepted as f64 / self.attempted as f64)
    }

    /// Replace the coupling used by subsequent runs.
    pub fn set_b(&mut self, b: ControlField) -> Result<()> {
        b.check(None, self.lattice.shape)?;
        self.config.b = b;
        Ok(())
    }

    /// Replace the external field used by subsequent runs.
    pub fn set_h(&mut self, h: ControlField) -> Result<()> {
        h.check(None, self.lattice.shape)?;
        self.config.h = h;
        Ok(())
    }

    /// Erase the simulated history, keeping only the initial state.
    ///
    /// With `regen_init` a new initial state is drawn first.
    pub fn reset(&mut self, regen_init: bool) -> Result<()> {
        if regen_init {
            let state = spins::new_ensemble(
                self.lattice.n_spins,
                self.config.p,
                self.config.identical,
                &mut self.rngs,
                &mut self.init_rng,
            )?;
            self.init_state = Some(state);
        }
        let init = self
            .init_state
            .as_deref()
            .ok_or_else(|| SimError::missing("no initial state to reset to; use regen_init"))?;
        self.trajectory.restart_from(init);
        info!(regen_init, sysnum = self.config.sysnum, "ensemble reset");
        Ok(())
    }

    /// Run without progress reporting or interruption.
    pub fn simulate(&mut self, run: &RunConfig) -> Result<()> {
        self.simulate_with(run, &AtomicBool::new(false), &|| {})
    }

    /// Evolve the ensemble and record every intermediate state.
    ///
    /// With `run.reset` the trajectory is first cut back to the initial state
    /// and the run records `run.iternum` states in total (so performs
    /// `iternum - 1` sweeps). Otherwise `run.iternum` new states are appended
    /// after the current final state.
    ///
    /// `b` and `h` are resolved against `(run.iternum, nx, ny)`; the state at
    /// call-local index `t` is produced with field slice `t`.
    ///
    /// `on_sweep` is called once per completed sweep and `interrupted` is
    /// polled before each sweep. All new states and generator advances are
    /// staged and only committed once every sweep has completed, so a failed
    /// or interrupted call leaves the ensemble exactly as it was.
    pub fn simulate_with(
        &mut self,
        run: &RunConfig,
        interrupted: &AtomicBool,
        on_sweep: &(dyn Fn() + Sync),
    ) -> Result<()> {
        run.validate()?;

        let grid = self.lattice.shape;
        let b = self.config.b.resolve(run.iternum, grid)?;
        let h = self.config.h.resolve(run.iternum, grid)?;

        let mut rngs = self.rngs.clone();
        let mut init_rng = self.init_rng.clone();

        let start: Vec<i8> = if run.reset {
            if run.regen_init {
                spins::new_ensemble(
                    self.lattice.n_spins,
                    self.config.p,
                    self.config.identical,
                    &mut rngs,
                    &mut init_rng,
                )?
            } else {
                self.init_state
                    .clone()
                    .ok_or_else(|| SimError::missing("no initial state to reset to"))?
            }
        } else {
            self.trajectory
                .last()
                .map(<[i8]>::to_vec)
                .ok_or_else(|| SimError::missing("no recorded state to continue from"))?
        };

        let n_sweeps = run.n_sweeps();
        let first_step = run.iternum - n_sweeps;
        debug!(
            n_sweeps,
            reset = run.reset,
            sysnum = self.config.sysnum,
            nx = grid[0],
            ny = grid[1],
            "simulation started"
        );

        let mut staged = Vec::with_capacity(n_sweeps * start.len());
        let mut current = start.clone();
        let mut accepted = 0u64;

        for (done, t) in (first_step..run.iternum).enumerate() {
            if interrupted.load(Ordering::Relaxed) {
                return Err(SimError::Interrupted {
                    completed: done,
                    requested: n_sweeps,
                });
            }
            accepted += mcmc::metropolis_sweep(
                &self.lattice,
                &mut current,
                &b.at(t),
                &h.at(t),
                &mut rngs,
                run.sequential,
            ) as u64;
            staged.extend_from_slice(&current);
            on_sweep();
        }

        if run.reset {
            if run.regen_init {
                self.init_state = Some(start.clone());
            }
            self.trajectory.restart_from(&start);
        }
        self.trajectory.append_raw(staged);
        self.rngs = rngs;
        self.init_rng = init_rng;
        self.accepted += accepted;
        self.attempted += (n_sweeps * start.len()) as u64;

        debug!(iternum = self.iternum(), "simulation finished");
        Ok(())
    }

    /// Discard the first `k` recorded states (relaxation period).
    ///
    /// The new first state becomes the initial state, so a later reset
    /// without regeneration returns to it.
    pub fn trim_init(&mut self, k: usize) -> Result<()> {
        self.trajectory.trim_front(k)?;
        self.init_state = self.trajectory.first().map(<[i8]>::to_vec);
        info!(trimmed = k, iternum = self.iternum(), "relaxation period discarded");
        Ok(())
    }

    /// Ensemble mean of a per-lattice observable at each recorded iteration.
    pub fn ensemble_mean<F>(&self, observable: F) -> Vec<f64>
    where
        F: Fn(&[i8]) -> f64,
    {
        self.trajectory.ensemble_mean(observable)
    }

    /// Ensemble standard deviation of a per-lattice observable at each
    /// recorded iteration.
    pub fn ensemble_std<F>(&self, observable: F) -> Vec<f64>
    where
        F: Fn(&[i8]) -> f64,
    {
        self.trajectory.ensemble_std(observable)
    }
}
