use rand::Rng;
use rand_xoshiro::Xoshiro256StarStar;

use crate::field::SiteField;
use crate::geometry::Lattice;
use crate::mcmc::step::metropolis_step;
use crate::parallel::par_over_members;

/// One Monte Carlo sweep on a single lattice, in place.
///
/// Performs exactly `n_spins` flip attempts, each at a site drawn uniformly
/// with replacement, so some sites may be visited twice and others not at all.
/// Returns the number of accepted flips.
pub fn sweep_in_place<R: Rng>(
    lattice: &Lattice,
    spins: &mut [i8],
    b: &SiteField,
    h: &SiteField,
    rng: &mut R,
) -> usize {
    let n_spins = lattice.n_spins;
    let mut accepted = 0;
    for _ in 0..n_spins {
        let site = rng.gen_range(0..n_spins);
        let u: f64 = rng.gen();
        if metropolis_step(lattice, spins, site, b.get(site), h.get(site), u) {
            accepted += 1;
        }
    }
    accepted
}

/// Advance a copy of `spins` by one sweep and return it.
pub fn iterate<R: Rng>(
    lattice: &Lattice,
    spins: &[i8],
    b: &SiteField,
    h: &SiteField,
    rng: &mut R,
) -> Vec<i8> {
    let mut next = spins.to_vec();
    sweep_in_place(lattice, &mut next, b, h, rng);
    next
}

/// Metropolis sweep over every member of an ensemble, in place.
///
/// `spins` holds `rngs.len()` lattices back to back; member `k` draws only from
/// `rngs[k]`. Returns the total number of accepted flips.
#[cfg_attr(feature = "profile", inline(never))]
pub fn metropolis_sweep(
    lattice: &Lattice,
    spins: &mut [i8],
    b: &SiteField,
    h: &SiteField,
    rngs: &mut [Xoshiro256StarStar],
    sequential: bool,
) -> usize {
    par_over_members(spins, rngs, lattice.n_spins, sequential, |slice, rng| {
        sweep_in_place(lattice, slice, b, h, rng)
    })
}

/// Advance a copy of an ensemble state by one sweep and return it.
pub fn iterate_ensemble(
    lattice: &Lattice,
    state: &[i8],
    b: &SiteField,
    h: &SiteField,
    rngs: &mut [Xoshiro256StarStar],
    sequential: bool,
) -> Vec<i8> {
    let mut next = state.to_vec();
    metropolis_sweep(lattice, &mut next, b, h, rngs, sequential);
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn seeded(n: usize, base: u64) -> Vec<Xoshiro256StarStar> {
        (0..n)
            .map(|i| Xoshiro256StarStar::seed_from_u64(base + i as u64))
            .collect()
    }

    #[test]
    fn test_iterate_leaves_input_untouched() {
        let lat = Lattice::square(8).unwrap();
        let spins = vec![1i8; 64];
        let mut rng = Xoshiro256StarStar::seed_from_u64(0);
        let next = iterate(
            &lat,
            &spins,
            &SiteField::Uniform(0.0),
            &SiteField::Uniform(0.0),
            &mut rng,
        );
        assert!(spins.iter().all(|&s| s == 1));
        // b = 0 accepts every attempt, so the state must have changed.
        assert_ne!(next, spins);
        assert!(next.iter().all(|&s| s == 1 || s == -1));
    }

    #[test]
    fn test_sweep_attempts_n_spins_flips() {
        // At b = 0 every attempt is accepted, so accepted == attempts.
        let lat = Lattice::new(5, 7).unwrap();
        let mut spins = vec![1i8; 35];
        let mut rng = Xoshiro256StarStar::seed_from_u64(11);
        let accepted = sweep_in_place(
            &lat,
            &mut spins,
            &SiteField::Uniform(0.0),
            &SiteField::Uniform(0.0),
            &mut rng,
        );
        assert_eq!(accepted, 35);
    }

    #[test]
    fn test_cold_aligned_state_is_stable() {
        // dE = 4 everywhere and exp(-2 * 50 * 4) is far below the draw resolution.
        let lat = Lattice::square(6).unwrap();
        let mut spins = vec![-1i8; 36];
        let mut rng = Xoshiro256StarStar::seed_from_u64(5);
        let accepted = sweep_in_place(
            &lat,
            &mut spins,
            &SiteField::Uniform(50.0),
            &SiteField::Uniform(0.0),
            &mut rng,
        );
        assert_eq!(accepted, 0);
        assert!(spins.iter().all(|&s| s == -1));
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let lat = Lattice::square(10).unwrap();
        let state: Vec<i8> = (0..400).map(|k| if k % 3 == 0 { -1 } else { 1 }).collect();
        let b = SiteField::Uniform(0.4);
        let h = SiteField::Uniform(0.1);

        let mut rngs_a = seeded(4, 100);
        let mut rngs_b = seeded(4, 100);
        let mut a = state.clone();
        let mut b_state = state.clone();
        for _ in 0..5 {
            a = iterate_ensemble(&lat, &a, &b, &h, &mut rngs_a, true);
            b_state = iterate_ensemble(&lat, &b_state, &b, &h, &mut rngs_b, false);
        }
        assert_eq!(a, b_state);
    }

    #[test]
    fn test_members_evolve_independently() {
        let lat = Lattice::square(6).unwrap();
        let state = vec![1i8; 36 * 3];
        let mut rngs = seeded(3, 9);
        let next = iterate_ensemble(
            &lat,
            &state,
            &SiteField::Uniform(0.0),
            &SiteField::Uniform(0.0),
            &mut rngs,
            false,
        );
        let members: Vec<&[i8]> = next.chunks_exact(36).collect();
        assert_ne!(members[0], members[1]);
        assert_ne!(members[1], members[2]);
    }

    #[test]
    fn test_strong_field_aligns_spins() {
        let lat = Lattice::square(8).unwrap();
        let mut spins = vec![-1i8; 64];
        let mut rng = Xoshiro256StarStar::seed_from_u64(21);
        // A positive field favours +1: for s = -1 surrounded by -1,
        // dE = -1 * (-4 + 10) < 0.
        for _ in 0..50 {
            sweep_in_place(
                &lat,
                &mut spins,
                &SiteField::Uniform(1.0),
                &SiteField::Uniform(10.0),
                &mut rng,
            );
        }
        let up = spins.iter().filter(|&&s| s == 1).count();
        assert!(up > 60, "only {up} spins aligned with the field");
    }
}
