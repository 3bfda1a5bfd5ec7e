use crate::geometry::Lattice;

/// Half the energy change of flipping `site`: `s * (sum of neighbours + h)`.
#[inline]
pub fn delta_energy(lattice: &Lattice, spins: &[i8], site: usize, h: f64) -> f64 {
    spins[site] as f64 * (lattice.neighbor_sum(spins, site) as f64 + h)
}

/// Attempt one Metropolis flip of `site` against the uniform draw `u`.
///
/// The flip is accepted when `exp(-2 b dE) > u`, with `dE` from
/// [`delta_energy`]. Since `u < 1`, moves with `dE <= 0` are always accepted
/// for non-negative `b`. Returns whether the spin was flipped.
#[inline]
pub fn metropolis_step(
    lattice: &Lattice,
    spins: &mut [i8],
    site: usize,
    b: f64,
    h: f64,
    u: f64,
) -> bool {
    let de = delta_energy(lattice, spins, site, h);
    if (-2.0 * b * de).exp() > u {
        spins[site] = -spins[site];
        true
    } else {
        false
    }
}
