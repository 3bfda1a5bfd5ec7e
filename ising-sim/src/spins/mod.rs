pub mod energy;
pub mod init;

pub use energy::{compute_energies, site_energy};
pub use init::{new_ensemble, new_grid};
