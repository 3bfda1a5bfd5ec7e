use rand_xoshiro::Xoshiro256StarStar;
use rayon::prelude::*;

/// Dispatch a per-member closure over ensemble members, optionally in parallel.
///
/// Member `k` gets the spin slice `spins[k * n_spins .. (k + 1) * n_spins]`
/// and `rngs[k]`, so every task owns a disjoint slice and its own generator
/// and the outcome does not depend on scheduling. The closure's return values
/// (e.g. accepted moves) are summed.
///
/// When `sequential` is true, members are processed on the current thread (no
/// rayon overhead, best when an outer loop over runs already saturates all
/// physical cores).
pub fn par_over_members(
    spins: &mut [i8],
    rngs: &mut [Xoshiro256StarStar],
    n_spins: usize,
    sequential: bool,
    body: impl Fn(&mut [i8], &mut Xoshiro256StarStar) -> usize + Send + Sync,
) -> usize {
    debug_assert_eq!(spins.len(), rngs.len() * n_spins);

    if sequential {
        spins
            .chunks_exact_mut(n_spins)
            .zip(rngs.iter_mut())
            .map(|(slice, rng)| body(slice, rng))
            .sum()
    } else {
        spins
            .par_chunks_exact_mut(n_spins)
            .zip(rngs.par_iter_mut())
            .map(|(slice, rng)| body(slice, rng))
            .sum()
    }
}
