use crate::error::{Result, SimError};

/// Number of nearest neighbours of a site on the square lattice.
pub const COORDINATION: usize = 4;

/// Periodic square lattice with a precomputed neighbour table.
///
/// Sites are indexed in row-major (C) order: site `(i, j)` has flat index
/// `i * ny + j`, with `i` running along the first axis of length `nx`.
/// Both axes wrap around, so the neighbour of row 0 in the backward direction
/// is row `nx - 1`.
#[derive(Debug, Clone)]
pub struct Lattice {
    /// Extent along each axis, `[nx, ny]`.
    pub shape: [usize; 2],
    /// Row-major strides, `[ny, 1]`.
    pub strides: [usize; 2],
    /// Total number of sites (`nx * ny`).
    pub n_spins: usize,
    /// Layout: `neighbors[(i * 2 + dim) * 2 + dir]` where `dir = 0` is forward
    /// and `dir = 1` is backward.
    neighbors: Vec<u32>,
}

impl Lattice {
    /// Create an `nx` by `ny` torus. Both extents must be non-zero.
    pub fn new(nx: usize, ny: usize) -> Result<Self> {
        if nx == 0 || ny == 0 {
            return Err(SimError::invalid(format!(
                "grid_shape must be non-zero in both axes, got ({nx}, {ny})"
            )));
        }

        let shape = [nx, ny];
        let strides = [ny, 1];
        let n_spins = nx * ny;

        let mut neighbors = vec![0u32; n_spins * 4];
        for flat in 0..n_spins {
            let coords = [flat / ny, flat % ny];
            for dim in 0..2 {
                for (dir, step) in [(0, 1usize), (1, shape[dim] - 1)] {
                    let mut c = coords;
                    c[dim] = (c[dim] + step) % shape[dim];
                    neighbors[(flat * 2 + dim) * 2 + dir] = (c[0] * ny + c[1]) as u32;
                }
            }
        }

        Ok(Self {
            shape,
            strides,
            n_spins,
            neighbors,
        })
    }

    /// Square `n` by `n` torus.
    pub fn square(n: usize) -> Result<Self> {
        Self::new(n, n)
    }

    #[inline]
    pub fn nx(&self) -> usize {
        self.shape[0]
    }

    #[inline]
    pub fn ny(&self) -> usize {
        self.shape[1]
    }

    /// Flat index of site `(i, j)`.
    #[inline]
    pub fn index(&self, i: usize, j: usize) -> usize {
        i * self.strides[0] + j
    }

    /// Return the neighbour of site `flat_idx` along axis `dim`.
    /// `forward = true` means +1, `forward = false` means -1.
    #[inline]
    pub fn neighbor(&self, flat_idx: usize, dim: usize, forward: bool) -> usize {
        self.neighbors[(flat_idx * 2 + dim) * 2 + (!forward as usize)] as usize
    }

    /// Sum of the four toroidal neighbours of `flat_idx` in `spins`.
    #[inline]
    pub fn neighbor_sum(&self, spins: &[i8], flat_idx: usize) -> i32 {
        let base = flat_idx * COORDINATION;
        self.neighbors[base..base + COORDINATION]
            .iter()
            .map(|&j| spins[j as usize] as i32)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_2d_neighbors() {
        // 3x4 lattice
        let lat = Lattice::new(3, 4).unwrap();
        assert_eq!(lat.n_spins, 12);
        assert_eq!(lat.strides, [4, 1]);

        // (0,0): forward along axis 0 -> (1,0)=4, along axis 1 -> (0,1)=1
        assert_eq!(lat.neighbor(0, 0, true), 4);
        assert_eq!(lat.neighbor(0, 1, true), 1);

        // (0,0): backward wraps to (2,0)=8 and (0,3)=3
        assert_eq!(lat.neighbor(0, 0, false), 8);
        assert_eq!(lat.neighbor(0, 1, false), 3);

        // (2,3): forward wraps to (0,3)=3 and (2,0)=8
        assert_eq!(lat.neighbor(11, 0, true), 3);
        assert_eq!(lat.neighbor(11, 1, true), 8);
    }

    #[test]
    fn test_neighbor_sum_wraps() {
        let lat = Lattice::new(3, 3).unwrap();
        let mut spins = vec![1i8; 9];
        // Neighbours of (0,0) are (1,0)=3, (2,0)=6, (0,1)=1, (0,2)=2
        spins[6] = -1;
        spins[2] = -1;
        assert_eq!(lat.neighbor_sum(&spins, 0), 0);
        // (1,1) only sees +1 neighbours
        assert_eq!(lat.neighbor_sum(&spins, lat.index(1, 1)), 4);
    }

    #[test]
    fn test_thin_lattice() {
        // A single row: both axis-0 neighbours are the site itself.
        let lat = Lattice::new(1, 5).unwrap();
        assert_eq!(lat.neighbor(2, 0, true), 2);
        assert_eq!(lat.neighbor(2, 0, false), 2);
        assert_eq!(lat.neighbor(4, 1, true), 0);
    }

    #[test]
    fn test_zero_extent_rejected() {
        assert!(Lattice::new(0, 4).is_err());
        assert!(Lattice::square(0).is_err());
    }
}
