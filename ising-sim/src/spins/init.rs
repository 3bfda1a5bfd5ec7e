use rand::Rng;
use rand_xoshiro::Xoshiro256StarStar;

use crate::error::{Result, SimError};

fn check_p(p: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&p) {
        return Err(SimError::invalid(format!("p must lie in [0, 1], got {p}")));
    }
    Ok(())
}

/// Fill `spins` with a fresh configuration: each site is -1 with probability
/// `p` and +1 otherwise.
#[inline]
fn draw_into<R: Rng>(spins: &mut [i8], p: f64, rng: &mut R) {
    for s in spins.iter_mut() {
        *s = if rng.gen::<f64>() > p { 1 } else { -1 };
    }
}

/// Draw one random configuration of `n_spins` sites.
pub fn new_grid<R: Rng>(n_spins: usize, p: f64, rng: &mut R) -> Result<Vec<i8>> {
    check_p(p)?;
    let mut spins = vec![0i8; n_spins];
    draw_into(&mut spins, p, rng);
    Ok(spins)
}

/// Draw the initial configurations of a whole ensemble.
///
/// Returns a flat buffer of `rngs.len() * n_spins` spins, member `k` at
/// `[k * n_spins, (k + 1) * n_spins)`. With `identical` a single
/// configuration is drawn from `init_rng` and copied into every member;
/// otherwise member `k` draws from `rngs[k]`.
pub fn new_ensemble(
    n_spins: usize,
    p: f64,
    identical: bool,
    rngs: &mut [Xoshiro256StarStar],
    init_rng: &mut Xoshiro256StarStar,
) -> Result<Vec<i8>> {
    check_p(p)?;
    let n_systems = rngs.len();
    let mut spins = vec![0i8; n_systems * n_spins];
    if n_spins == 0 {
        return Ok(spins);
    }

    if identical {
        let template = new_grid(n_spins, p, init_rng)?;
        for member in spins.chunks_exact_mut(n_spins) {
            member.copy_from_slice(&template);
        }
    } else {
        for (member, rng) in spins.chunks_exact_mut(n_spins).zip(rngs.iter_mut()) {
            draw_into(member, p, rng);
        }
    }
    Ok(spins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rngs(n: usize) -> (Vec<Xoshiro256StarStar>, Xoshiro256StarStar) {
        let rngs = (0..n)
            .map(|i| Xoshiro256StarStar::seed_from_u64(7 + i as u64))
            .collect();
        (rngs, Xoshiro256StarStar::seed_from_u64(7 + n as u64))
    }

    #[test]
    fn test_p_extremes_are_deterministic() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(1);
        assert!(new_grid(100, 0.0, &mut rng).unwrap().iter().all(|&s| s == 1));
        assert!(new_grid(100, 1.0, &mut rng).unwrap().iter().all(|&s| s == -1));
    }

    #[test]
    fn test_p_out_of_range() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(1);
        assert!(matches!(
            new_grid(4, 1.01, &mut rng),
            Err(SimError::InvalidParameter(_))
        ));
        let (mut r, mut init) = rngs(2);
        assert!(new_ensemble(4, -0.5, false, &mut r, &mut init).is_err());
    }

    #[test]
    fn test_down_fraction_tracks_p() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(3);
        let spins = new_grid(40_000, 0.3, &mut rng).unwrap();
        let down = spins.iter().filter(|&&s| s == -1).count() as f64 / spins.len() as f64;
        assert!((down - 0.3).abs() < 0.01, "down fraction {down}");
    }

    #[test]
    fn test_identical_members() {
        let (mut r, mut init) = rngs(6);
        let spins = new_ensemble(64, 0.5, true, &mut r, &mut init).unwrap();
        let first = &spins[..64];
        for member in spins.chunks_exact(64) {
            assert_eq!(member, first);
        }
    }

    #[test]
    fn test_independent_members_differ() {
        let (mut r, mut init) = rngs(6);
        let spins = new_ensemble(64, 0.5, false, &mut r, &mut init).unwrap();
        let first = &spins[..64];
        assert!(spins.chunks_exact(64).skip(1).any(|m| m != first));
        assert!(spins.iter().all(|&s| s == 1 || s == -1));
    }
}
