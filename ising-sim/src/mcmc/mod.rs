pub mod step;
pub mod sweep;

pub use step::{delta_energy, metropolis_step};
pub use sweep::{iterate, iterate_ensemble, metropolis_sweep, sweep_in_place};
