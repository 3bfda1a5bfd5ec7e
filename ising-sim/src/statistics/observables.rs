use crate::field::SiteField;
use crate::geometry::Lattice;
use crate::spins;

/// Mean spin of one lattice.
#[inline]
pub fn mean_spin(spins: &[i8]) -> f64 {
    let total: i64 = spins.iter().map(|&s| s as i64).sum();
    total as f64 / spins.len() as f64
}

/// Mean spin of every lattice in a flat batch of `n_spins`-site lattices.
///
/// Any leading time/ensemble axes are folded into the batch, so a whole
/// trajectory yields a flat `(iternum, sysnum)` series.
pub fn magnetisation(spins: &[i8], n_spins: usize) -> Vec<f64> {
    spins.chunks_exact(n_spins).map(mean_spin).collect()
}

/// Energy per site of every lattice in a flat batch.
pub fn energy(lattice: &Lattice, spins: &[i8], h: &SiteField) -> Vec<f64> {
    spins::compute_energies(lattice, spins, h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_magnetisation_known_states() {
        let mut batch = vec![1i8; 16];
        batch.extend(vec![-1i8; 16]);
        batch.extend((0..16).map(|i| if (i / 4 + i % 4) % 2 == 0 { 1i8 } else { -1 }));
        assert_eq!(magnetisation(&batch, 16), vec![1.0, -1.0, 0.0]);
    }

    #[test]
    fn test_checkerboard_energy() {
        let lat = Lattice::square(4).unwrap();
        let board: Vec<i8> = (0..16)
            .map(|i| if (i / 4 + i % 4) % 2 == 0 { 1 } else { -1 })
            .collect();
        let e = energy(&lat, &board, &SiteField::Uniform(0.0));
        assert_relative_eq!(e[0], 2.0);
    }
}
