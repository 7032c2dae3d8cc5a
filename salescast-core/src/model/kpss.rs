//! KPSS level-stationarity test and the differencing order it implies.

use super::diff::difference;

/// 5% critical value for the level-stationarity KPSS statistic.
pub const KPSS_CRITICAL_5PCT: f64 = 0.463;

/// KPSS statistic for level stationarity with the short Bartlett lag
/// truncation `trunc(3 * sqrt(n) / 13)`.
///
/// Returns `None` for fewer than three points or a constant series.
pub fn kpss_level_statistic(data: &[f64]) -> Option<f64> {
    let n = data.len();
    if n < 3 || is_constant(data) {
        return None;
    }
    let nf = n as f64;
    let mean = data.iter().sum::<f64>() / nf;
    let resid: Vec<f64> = data.iter().map(|x| x - mean).collect();

    let mut cumsum = 0.0;
    let eta: f64 = resid
        .iter()
        .map(|r| {
            cumsum += r;
            cumsum * cumsum
        })
        .sum::<f64>()
        / (nf * nf);

    let lags = ((3.0 * nf.sqrt()) / 13.0).trunc() as usize;
    let mut s2 = resid.iter().map(|r| r * r).sum::<f64>() / nf;
    for lag in 1..=lags.min(n - 1) {
        let weight = 1.0 - lag as f64 / (lags + 1) as f64;
        let gamma = resid[lag..]
            .iter()
            .zip(&resid[..n - lag])
            .map(|(a, b)| a * b)
            .sum::<f64>()
            / nf;
        s2 += 2.0 * weight * gamma;
    }

    if s2 <= 0.0 || !s2.is_finite() {
        return None;
    }
    Some(eta / s2)
}

/// Number of differences (at most `max_d`) until the KPSS test no longer
/// rejects level stationarity at 5%.
pub fn ndiffs(data: &[f64], max_d: usize) -> usize {
    let mut d = 0;
    let mut current = data.to_vec();
    while d < max_d {
        match kpss_level_statistic(&current) {
            Some(stat) if stat > KPSS_CRITICAL_5PCT => {
                current = difference(&current, 1);
                d += 1;
            }
            _ => break,
        }
    }
    d
}

fn is_constant(data: &[f64]) -> bool {
    data.windows(2).all(|w| w[0] == w[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise(n: usize) -> Vec<f64> {
        // Deterministic, roughly white sequence.
        (0..n)
            .map(|i| ((i as f64 * 12.9898).sin() * 43758.5453).fract() - 0.5)
            .collect()
    }

    #[test]
    fn white_noise_needs_no_differencing() {
        let x = noise(200);
        let stat = kpss_level_statistic(&x).unwrap();
        assert!(stat < KPSS_CRITICAL_5PCT, "stat {stat}");
        assert_eq!(ndiffs(&x, 2), 0);
    }

    #[test]
    fn trend_needs_differencing() {
        let x: Vec<f64> = noise(200)
            .iter()
            .enumerate()
            .map(|(i, e)| i as f64 * 0.5 + e)
            .collect();
        assert!(kpss_level_statistic(&x).unwrap() > KPSS_CRITICAL_5PCT);
        assert!(ndiffs(&x, 2) >= 1);
    }

    #[test]
    fn constant_series_has_no_statistic() {
        assert!(kpss_level_statistic(&[3.0; 50]).is_none());
        assert_eq!(ndiffs(&[3.0; 50], 2), 0);
    }

    #[test]
    fn max_d_bounds_the_answer() {
        let x: Vec<f64> = (0..100).map(|i| (i * i * i) as f64).collect();
        assert!(ndiffs(&x, 1) <= 1);
        assert_eq!(ndiffs(&x, 0), 0);
    }
}
