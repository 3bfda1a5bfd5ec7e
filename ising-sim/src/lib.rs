pub mod config;
pub mod error;
pub mod field;
pub mod geometry;
pub mod mcmc;
pub mod simulation;
pub mod spins;
pub mod statistics;

mod parallel;

pub use config::{ConvergenceConfig, EnsembleConfig, RunConfig, ScanConfig};
pub use error::{Result, SimError};
pub use field::{ControlField, SiteField};
pub use geometry::Lattice;
pub use simulation::{
    run_relaxed, run_scan, run_until_converged, ConvergedRun, Ensemble, EnsembleMetadata, RunKey,
    RunRecord, RunRegistry, StreamState, Trajectory,
};
pub use statistics::{EnsembleSummary, Estimate};
