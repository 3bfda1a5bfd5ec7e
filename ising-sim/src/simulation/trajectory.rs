use crate::error::{Result, SimError};

/// Append-only record of ensemble snapshots.
///
/// Snapshots live back to back in one flat arena of logical shape
/// `(iternum, sysnum, nx, ny)`; snapshot `t` occupies
/// `data[t * sysnum * n_spins .. (t + 1) * sysnum * n_spins]` and never aliases
/// the working state of a running sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    grid_shape: [usize; 2],
    sysnum: usize,
    n_spins: usize,
    data: Vec<i8>,
}

impl Trajectory {
    /// Empty trajectory for `sysnum` lattices of `grid_shape`.
    pub fn new(grid_shape: [usize; 2], sysnum: usize) -> Self {
        Self {
            grid_shape,
            sysnum,
            n_spins: grid_shape[0] * grid_shape[1],
            data: Vec::new(),
        }
    }

    /// Rebuild a trajectory from a flat `(iternum, sysnum, nx, ny)` array.
    ///
    /// Fails with [`SimError::DataIntegrity`] if the array length disagrees
    /// with the declared shape or any entry is not +1/-1.
    pub fn from_raw(
        grid_shape: [usize; 2],
        sysnum: usize,
        iternum: usize,
        data: Vec<i8>,
    ) -> Result<Self> {
        let traj = Self::new(grid_shape, sysnum);
        let snap = traj.snapshot_len();
        let expected = [iternum, sysnum, grid_shape[0], grid_shape[1]];
        if data.len() != iternum * snap {
            let actual = if snap > 0 && data.len() % snap == 0 {
                vec![data.len() / snap, sysnum, grid_shape[0], grid_shape[1]]
            } else {
                vec![data.len()]
            };
            return Err(SimError::shape_mismatch(&expected, &actual));
        }
        if let Some(pos) = data.iter().position(|&s| s != 1 && s != -1) {
            let t = pos / snap;
            let k = (pos % snap) / traj.n_spins;
            return Err(SimError::DataIntegrity {
                index: Some(pos),
                detail: format!(
                    "spin value {} is not +1/-1 (iteration {t}, system {k})",
                    data[pos]
                ),
            });
        }
        Ok(Self { data, ..traj })
    }

    #[inline]
    fn snapshot_len(&self) -> usize {
        self.sysnum * self.n_spins
    }

    /// Number of recorded snapshots.
    pub fn len(&self) -> usize {
        match self.snapshot_len() {
            0 => 0,
            snap => self.data.len() / snap,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn grid_shape(&self) -> [usize; 2] {
        self.grid_shape
    }

    pub fn sysnum(&self) -> usize {
        self.sysnum
    }

    /// `[iternum, sysnum, nx, ny]`.
    pub fn shape(&self) -> [usize; 4] {
        [self.len(), self.sysnum, self.grid_shape[0], self.grid_shape[1]]
    }

    /// Ensemble state at iteration `t`.
    pub fn get(&self, t: usize) -> Option<&[i8]> {
        let snap = self.snapshot_len();
        self.data.get(t * snap..(t + 1) * snap)
    }

    /// Lattice of member `k` at iteration `t`.
    pub fn member(&self, t: usize, k: usize) -> Option<&[i8]> {
        if k >= self.sysnum {
            return None;
        }
        self.get(t)
            .map(|state| &state[k * self.n_spins..(k + 1) * self.n_spins])
    }

    pub fn first(&self) -> Option<&[i8]> {
        self.get(0)
    }

    pub fn last(&self) -> Option<&[i8]> {
        self.len().checked_sub(1).and_then(|t| self.get(t))
    }

    /// Snapshots in time order.
    pub fn iter(&self) -> impl Iterator<Item = &[i8]> {
        self.data.chunks_exact(self.snapshot_len().max(1))
    }

    /// The whole record as a flat `(iternum, sysnum, nx, ny)` array.
    pub fn as_slice(&self) -> &[i8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<i8> {
        self.data
    }

    pub fn push(&mut self, state: &[i8]) {
        debug_assert_eq!(state.len(), self.snapshot_len());
        self.data.extend_from_slice(state);
    }

    /// Append whole snapshots staged elsewhere.
    pub(crate) fn append_raw(&mut self, staged: Vec<i8>) {
        debug_assert_eq!(staged.len() % self.snapshot_len().max(1), 0);
        if self.data.is_empty() {
            self.data = staged;
        } else {
            self.data.extend(staged);
        }
    }

    /// Forget everything and start again from `state`.
    pub(crate) fn restart_from(&mut self, state: &[i8]) {
        self.data.clear();
        self.push(state);
    }

    /// Drop the first `k` snapshots.
    ///
    /// At least one snapshot must survive, so `k` must be smaller than
    /// [`Trajectory::len`].
    pub fn trim_front(&mut self, k: usize) -> Result<()> {
        let len = self.len();
        if len == 0 {
            return Err(SimError::missing("cannot trim an empty trajectory"));
        }
        if k >= len {
            return Err(SimError::invalid(format!(
                "cannot trim {k} of {len} iterations, at least one must remain"
            )));
        }
        self.data.drain(..k * self.snapshot_len());
        Ok(())
    }

    /// Evaluate `observable` on every member at every iteration.
    ///
    /// Returns a flat `(iternum, sysnum)` series.
    pub fn observable_series<F>(&self, observable: F) -> Vec<f64>
    where
        F: Fn(&[i8]) -> f64,
    {
        self.data
            .chunks_exact(self.n_spins.max(1))
            .map(observable)
            .collect()
    }

    /// Ensemble mean of `observable` at each iteration.
    pub fn ensemble_mean<F>(&self, observable: F) -> Vec<f64>
    where
        F: Fn(&[i8]) -> f64,
    {
        let n = self.sysnum as f64;
        self.observable_series(observable)
            .chunks_exact(self.sysnum.max(1))
            .map(|row| row.iter().sum::<f64>() / n)
            .collect()
    }

    /// Ensemble (population) standard deviation of `observable` at each iteration.
    pub fn ensemble_std<F>(&self, observable: F) -> Vec<f64>
    where
        F: Fn(&[i8]) -> f64,
    {
        let n = self.sysnum as f64;
        self.observable_series(observable)
            .chunks_exact(self.sysnum.max(1))
            .map(|row| {
                let mean = row.iter().sum::<f64>() / n;
                let var = row.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n;
                var.sqrt()
            })
            .collect()
    }
}
