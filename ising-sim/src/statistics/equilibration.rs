use crate::error::{Result, SimError};
use crate::simulation::Ensemble;

/// Moving average over `window` points, built from a cumulative sum.
///
/// Entry `i` averages `values[i + 1..=i + window]`, so the output has
/// `len - window` entries.
pub fn rolling_average(values: &[f64], window: usize) -> Result<Vec<f64>> {
    if window == 0 || window > values.len() {
        return Err(SimError::invalid(format!(
            "window {window} must lie in 1..={}",
            values.len()
        )));
    }
    let mut cumsum = Vec::with_capacity(values.len() + 1);
    cumsum.push(0.0);
    let mut acc = 0.0;
    for &v in values {
        acc += v;
        cumsum.push(acc);
    }
    let w = window as f64;
    Ok((0..values.len() - window)
        .map(|i| (cumsum[i + window + 1] - cumsum[i + 1]) / w)
        .collect())
}

/// Flatness test for every smoothed point of the ensemble-averaged observable.
///
/// The ensemble mean series is differenced and both the differences and the
/// series itself are smoothed over `timescale` iterations. A point is flat if
/// the smoothed slope is below `tolerance`, either outright (`absolute`) or
/// relative to the smoothed value at the same iteration.
pub fn flatness_profile<F>(
    observable: F,
    ensemble: &Ensemble,
    timescale: usize,
    tolerance: f64,
    absolute: bool,
) -> Result<Vec<bool>>
where
    F: Fn(&[i8]) -> f64,
{
    if ensemble.iternum() == 0 {
        return Err(SimError::missing("no recorded states to test for flatness"));
    }
    let series = ensemble.ensemble_mean(observable);
    let diffs: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();
    if timescale == 0 || timescale >= diffs.len() {
        return Err(SimError::invalid(format!(
            "timescale {timescale} needs more than {timescale} recorded sweeps, have {}",
            diffs.len()
        )));
    }

    let slope = rolling_average(&diffs, timescale)?;
    let level = rolling_average(&series, timescale)?;
    Ok(slope
        .iter()
        .enumerate()
        .map(|(i, &d)| {
            if absolute {
                d.abs() < tolerance
            } else {
                (d / level[i + 1]).abs() < tolerance
            }
        })
        .collect())
}

/// Whether the ensemble-averaged observable has stopped drifting, judged on
/// the most recent smoothed point. See [`flatness_profile`].
pub fn isflat<F>(
    observable: F,
    ensemble: &Ensemble,
    timescale: usize,
    tolerance: f64,
    absolute: bool,
) -> Result<bool>
where
    F: Fn(&[i8]) -> f64,
{
    let profile = flatness_profile(observable, ensemble, timescale, tolerance, absolute)?;
    Ok(profile.last().copied().unwrap_or(false))
}
