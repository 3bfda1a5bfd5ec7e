use rayon::prelude::*;

use crate::error::{Result, SimError};

/// Normalised autocorrelation Γ(τ) of a time series for lags `0..maxtau`.
///
/// `maxtau` defaults to half the series length. A series without variance is
/// perfectly correlated with itself, so every lag reports 1.0.
pub fn autocorrelation(series: &[f64], maxtau: Option<usize>) -> Result<Vec<f64>> {
    let n = series.len();
    if n == 0 {
        return Err(SimError::invalid("cannot correlate an empty series"));
    }
    let maxtau = maxtau.unwrap_or(n / 2);
    if maxtau > n {
        return Err(SimError::invalid(format!(
            "maxtau {maxtau} exceeds series length {n}"
        )));
    }

    let mean = series.iter().sum::<f64>() / n as f64;
    let var = series.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n as f64;
    if var <= 0.0 {
        return Ok(vec![1.0; maxtau]);
    }

    Ok((0..maxtau)
        .map(|tau| {
            let count = n - tau;
            let cov: f64 = series[..count]
                .iter()
                .zip(&series[tau..])
                .map(|(&a, &b)| (a - mean) * (b - mean))
                .sum();
            cov / (count as f64 * var)
        })
        .collect())
}

/// Autocorrelation of every member in a flat `(iternum, sysnum)` series.
///
/// Returns one Γ(τ) row per member.
pub fn autocorrelation_batch(
    series: &[f64],
    sysnum: usize,
    maxtau: Option<usize>,
) -> Result<Vec<Vec<f64>>> {
    if sysnum == 0 || series.len() % sysnum != 0 {
        return Err(SimError::invalid(format!(
            "series of length {} does not split into {sysnum} members",
            series.len()
        )));
    }
    (0..sysnum)
        .into_par_iter()
        .map(|k| {
            let member: Vec<f64> = series.iter().skip(k).step_by(sysnum).copied().collect();
            autocorrelation(&member, maxtau)
        })
        .collect()
}

/// First lag at which Γ(τ) drops below `1/e`.
pub fn efolding_time(acf: &[f64]) -> Option<usize> {
    let threshold = (-1.0f64).exp();
    acf.iter().position(|&g| g < threshold)
}

/// Integrated autocorrelation time with Sokal's self-consistent window (c = 5).
pub fn integrated_time(acf: &[f64]) -> f64 {
    let mut tau = 0.5;
    for (w, &g) in acf.iter().enumerate().skip(1) {
        tau += g;
        if w as f64 >= 5.0 * tau {
            return tau;
        }
    }
    tau
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_constant_series_is_fully_correlated() {
        let acf = autocorrelation(&[0.7; 10], None).unwrap();
        assert_eq!(acf, vec![1.0; 5]);
    }

    #[test]
    fn test_alternating_series() {
        let series: Vec<f64> = (0..20).map(|t| if t % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let acf = autocorrelation(&series, Some(4)).unwrap();
        assert_relative_eq!(acf[0], 1.0);
        assert_relative_eq!(acf[1], -1.0);
        assert_relative_eq!(acf[2], 1.0);
        assert_eq!(efolding_time(&acf), Some(1));
    }

    #[test]
    fn test_maxtau_bounds() {
        let series = [1.0, 2.0, 3.0];
        assert!(autocorrelation(&series, Some(4)).is_err());
        assert_eq!(autocorrelation(&series, Some(3)).unwrap().len(), 3);
        assert!(autocorrelation(&[], None).is_err());
    }

    #[test]
    fn test_batch_splits_members() {
        // member 0 constant, member 1 alternating
        let series: Vec<f64> = (0..10)
            .flat_map(|t| [2.0, if t % 2 == 0 { 1.0 } else { -1.0 }])
            .collect();
        let rows = autocorrelation_batch(&series, 2, Some(3)).unwrap();
        assert_eq!(rows[0], vec![1.0; 3]);
        assert_relative_eq!(rows[1][1], -1.0);
        assert!(autocorrelation_batch(&series, 3, None).is_err());
    }

    #[test]
    fn test_efolding_and_integrated_time() {
        let acf: Vec<f64> = (0..50).map(|t| (-(t as f64) / 4.0).exp()).collect();
        assert_eq!(efolding_time(&acf), Some(5));
        let tau = integrated_time(&acf);
        assert!(tau > 3.0 && tau < 5.0, "tau = {tau}");
        assert_eq!(efolding_time(&[1.0, 0.9]), None);
    }
}
