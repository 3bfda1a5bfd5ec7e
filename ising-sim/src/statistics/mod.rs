pub mod autocorrelation;
pub mod equilibration;
pub mod observables;
pub mod results;

pub use autocorrelation::{autocorrelation, autocorrelation_batch, efolding_time, integrated_time};
pub use equilibration::{flatness_profile, isflat, rolling_average};
pub use observables::{energy, magnetisation, mean_spin};
pub use results::{energy_estimate, EnsembleSummary, Estimate};
