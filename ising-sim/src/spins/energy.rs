use crate::field::SiteField;
use crate::geometry::Lattice;

/// Energy of site `i`: its forward bonds plus its field term.
///
/// Summing this over every site counts each bond exactly once.
#[inline]
pub fn site_energy(lattice: &Lattice, spins: &[i8], h: &SiteField, i: usize) -> f64 {
    let si = spins[i] as f64;
    let forward = spins[lattice.neighbor(i, 0, true)] as f64
        + spins[lattice.neighbor(i, 1, true)] as f64;
    -si * (forward + h.get(i))
}

/// Compute the per-site energy of every system in a flat batch.
///
/// `spins`: flat `(n_systems * n_spins)`, values +1/-1, any number of leading
/// time/ensemble axes folded into `n_systems`.
///
/// Returns `E / N` for each system, where
/// `E = -sum_<ij> s_i s_j - sum_i h_i s_i` over nearest-neighbour bonds.
pub fn compute_energies(lattice: &Lattice, spins: &[i8], h: &SiteField) -> Vec<f64> {
    let n_spins = lattice.n_spins;
    spins
        .chunks_exact(n_spins)
        .map(|system| {
            let total: f64 = (0..n_spins)
                .map(|i| site_energy(lattice, system, h, i))
                .sum();
            total / n_spins as f64
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_aligned_ground_state() {
        let lat = Lattice::square(4).unwrap();
        let spins = vec![1i8; 16];
        let e = compute_energies(&lat, &spins, &SiteField::Uniform(0.0));
        assert_relative_eq!(e[0], -2.0);

        let e = compute_energies(&lat, &spins, &SiteField::Uniform(0.5));
        assert_relative_eq!(e[0], -2.5);
    }

    #[test]
    fn test_checkerboard() {
        let lat = Lattice::square(4).unwrap();
        let spins: Vec<i8> = (0..16)
            .map(|k| if (k / 4 + k % 4) % 2 == 0 { 1 } else { -1 })
            .collect();
        let e = compute_energies(&lat, &spins, &SiteField::Uniform(0.0));
        assert_relative_eq!(e[0], 2.0);
    }

    #[test]
    fn test_batched_systems() {
        let lat = Lattice::new(2, 3).unwrap();
        let mut spins = vec![1i8; 6];
        spins.extend(vec![-1i8; 6]);
        let h = vec![1.0; 6];
        let e = compute_energies(&lat, &spins, &SiteField::PerSite(&h));
        assert_eq!(e.len(), 2);
        assert_relative_eq!(e[0], -3.0);
        assert_relative_eq!(e[1], -1.0);
    }

    #[test]
    fn test_single_flip_matches_delta() {
        // Flipping site i changes the total energy by 2 * s_i * (neighbours + h_i).
        let lat = Lattice::new(3, 5).unwrap();
        let spins: Vec<i8> = (0..15).map(|k| if k % 3 == 0 { -1 } else { 1 }).collect();
        let h: Vec<f64> = (0..15).map(|k| 0.1 * k as f64).collect();
        let field = SiteField::PerSite(&h);
        let n = lat.n_spins as f64;

        for i in 0..lat.n_spins {
            let before = compute_energies(&lat, &spins, &field)[0] * n;
            let mut flipped = spins.clone();
            flipped[i] = -flipped[i];
            let after = compute_energies(&lat, &flipped, &field)[0] * n;
            let delta = spins[i] as f64 * (lat.neighbor_sum(&spins, i) as f64 + h[i]);
            assert_relative_eq!(after - before, 2.0 * delta, epsilon = 1e-9);
        }
    }
}
