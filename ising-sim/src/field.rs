//! Space/time-varying control parameters (coupling `b` and field `h`).
//!
//! A [`ControlField`] is declared once per ensemble and resolved against the
//! `(T, nx, ny)` extent of each run. Resolution is the only place shapes are
//! checked, so a run either sees a well-formed field for every step or never
//! starts.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlField {
    /// Constant across space and time.
    Scalar(f64),
    /// Shape `[nx, ny]`, constant across time.
    Spatial { shape: [usize; 2], values: Vec<f64> },
    /// Shape `[T]`, constant across space.
    Temporal(Vec<f64>),
    /// Shape `[T, nx, ny]`.
    SpaceTime { shape: [usize; 3], values: Vec<f64> },
}

impl From<f64> for ControlField {
    fn from(v: f64) -> Self {
        Self::Scalar(v)
    }
}

impl Default for ControlField {
    fn default() -> Self {
        Self::Scalar(0.0)
    }
}

impl ControlField {
    /// Classify an untyped array by its shape.
    ///
    /// `[]` and `[1]` are scalars, any other 1D shape is per-time, 2D is
    /// per-site and 3D is per-time-per-site. Anything else, or a value count
    /// that disagrees with the shape, is rejected.
    pub fn from_array(shape: &[usize], values: Vec<f64>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if values.len() != expected {
            return Err(SimError::invalid(format!(
                "control field of shape {shape:?} needs {expected} values, got {}",
                values.len()
            )));
        }
        match *shape {
            [] | [1] => Ok(Self::Scalar(values[0])),
            [_] => Ok(Self::Temporal(values)),
            [nx, ny] => Ok(Self::Spatial {
                shape: [nx, ny],
                values,
            }),
            [t, nx, ny] => Ok(Self::SpaceTime {
                shape: [t, nx, ny],
                values,
            }),
            _ => Err(SimError::invalid(format!(
                "cannot broadcast control field of shape {shape:?} to (iternum, nx, ny)"
            ))),
        }
    }

    /// Per-site values for every step of a `[nx, ny]` grid.
    pub fn spatial(nx: usize, ny: usize, values: Vec<f64>) -> Result<Self> {
        Self::from_array(&[nx, ny], values)
    }

    /// A uniform field that repeats `period` over `iternum` steps,
    /// cutting the last cycle short if needed.
    pub fn periodic(period: &[f64], iternum: usize) -> Result<Self> {
        if period.is_empty() {
            return Err(SimError::invalid("periodic field needs at least one value"));
        }
        Ok(Self::Temporal(
            period.iter().copied().cycle().take(iternum).collect(),
        ))
    }

    /// Logical shape of the declared field.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Self::Scalar(_) => vec![],
            Self::Spatial { shape, .. } => shape.to_vec(),
            Self::Temporal(v) => vec![v.len()],
            Self::SpaceTime { shape, .. } => shape.to_vec(),
        }
    }

    /// `Some(v)` when the field takes the same value everywhere and always.
    pub fn as_uniform(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// The per-site view of a field that does not vary in time.
    pub fn frozen(&self) -> Option<SiteField<'_>> {
        match self {
            Self::Scalar(v) => Some(SiteField::Uniform(*v)),
            Self::Spatial { values, .. } => Some(SiteField::PerSite(values)),
            _ => None,
        }
    }

    /// Check that the field broadcasts to `(iternum, grid[0], grid[1])`.
    ///
    /// Spatial extents can be checked without knowing `iternum`; pass `None`
    /// to skip the time axis.
    pub fn check(&self, iternum: Option<usize>, grid: [usize; 2]) -> Result<()> {
        let reject = || {
            let want = match iternum {
                Some(t) => format!("({t}, {}, {})", grid[0], grid[1]),
                None => format!("(iternum, {}, {})", grid[0], grid[1]),
            };
            Err(SimError::invalid(format!(
                "cannot broadcast control field of shape {:?} to {want}",
                self.shape()
            )))
        };
        match self {
            Self::Scalar(_) => Ok(()),
            Self::Spatial { shape, values } => {
                if *shape != grid || values.len() != grid[0] * grid[1] {
                    return reject();
                }
                Ok(())
            }
            Self::Temporal(v) => match iternum {
                Some(t) if v.len() != t => reject(),
                _ => Ok(()),
            },
            Self::SpaceTime { shape, values } => {
                let spatial_ok = shape[1..] == grid[..];
                let time_ok = iternum.map_or(true, |t| shape[0] == t);
                if !spatial_ok || !time_ok || values.len() != shape.iter().product::<usize>() {
                    return reject();
                }
                Ok(())
            }
        }
    }

    /// Resolve against a run of `iternum` recorded states on `grid`.
    pub fn resolve(&self, iternum: usize, grid: [usize; 2]) -> Result<ResolvedField<'_>> {
        self.check(Some(iternum), grid)?;
        Ok(ResolvedField {
            field: self,
            n_spins: grid[0] * grid[1],
        })
    }
}

/// A field whose shape has been checked against a concrete run.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedField<'a> {
    field: &'a ControlField,
    n_spins: usize,
}

impl<'a> ResolvedField<'a> {
    /// Values seen by every site at call-local step `t`.
    pub fn at(&self, t: usize) -> SiteField<'a> {
        match self.field {
            ControlField::Scalar(v) => SiteField::Uniform(*v),
            ControlField::Temporal(v) => SiteField::Uniform(v[t]),
            ControlField::Spatial { values, .. } => SiteField::PerSite(values),
            ControlField::SpaceTime { values, .. } => {
                SiteField::PerSite(&values[t * self.n_spins..(t + 1) * self.n_spins])
            }
        }
    }
}

/// A control parameter frozen at one time step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SiteField<'a> {
    Uniform(f64),
    PerSite(&'a [f64]),
}

impl SiteField<'_> {
    #[inline]
    pub fn get(&self, site: usize) -> f64 {
        match self {
            Self::Uniform(v) => *v,
            Self::PerSite(values) => values[site],
        }
    }
}
