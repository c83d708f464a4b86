use itertools::Itertools;
use statrs::statistics::Statistics;

use crate::data::spectrum::Spectrum;
use crate::error::{ProcessingError, Result};

/// Index of the element of a sorted slice closest to `target`.
///
/// Returns `None` for an empty slice.
///
/// # Examples
///
/// ```
/// use origami::algorithm::utility::nearest_index;
///
/// let axis = vec![1.0, 2.0, 3.0, 4.0];
/// assert_eq!(nearest_index(&axis, 2.4), Some(1));
/// assert_eq!(nearest_index(&axis, 2.6), Some(2));
/// assert_eq!(nearest_index(&axis, -5.0), Some(0));
/// assert_eq!(nearest_index(&axis, 50.0), Some(3));
/// ```
pub fn nearest_index(sorted: &[f64], target: f64) -> Option<usize> {
    if sorted.is_empty() {
        return None;
    }
    let i = sorted.partition_point(|&v| v < target);
    if i == 0 {
        return Some(0);
    }
    if i >= sorted.len() {
        return Some(sorted.len() - 1);
    }
    if (sorted[i] - target).abs() < (sorted[i - 1] - target).abs() {
        Some(i)
    } else {
        Some(i - 1)
    }
}

/// Half-open index range `[start, end)` between the points closest to `x_min` and `x_max`.
///
/// Bounds given in the wrong order are swapped.
pub fn narrow_range_indices(x: &[f64], x_min: f64, x_max: f64) -> (usize, usize) {
    let (start, end) = match (nearest_index(x, x_min), nearest_index(x, x_max)) {
        (Some(a), Some(b)) => (a, b),
        _ => return (0, 0),
    };
    if start > end { (end, start) } else { (start, end) }
}

/// Narrow view of a spectrum between the points closest to `x_min` and `x_max`.
///
/// The end point is exclusive.
pub fn narrow_range(spectrum: &Spectrum, x_min: f64, x_max: f64) -> Spectrum {
    let (start, end) = narrow_range_indices(&spectrum.x, x_min, x_max);
    Spectrum::from_parts(spectrum.x[start..end].to_vec(), spectrum.y[start..end].to_vec())
}

/// Crops a spectrum to `[x_min, x_max]`, clamped to the data range.
///
/// # Errors
///
/// `InvalidParameter` when the clamped range collapses to a single value.
pub fn crop(spectrum: &Spectrum, x_min: f64, x_max: f64) -> Result<Spectrum> {
    if spectrum.is_empty() {
        return Ok(Spectrum::default());
    }
    let (data_min, data_max) = (spectrum.x[0], spectrum.x[spectrum.len() - 1]);
    let lo = x_min.max(data_min);
    let hi = x_max.min(data_max);
    if lo >= hi {
        return Err(ProcessingError::invalid(
            "crop range",
            format!("[{}, {}] does not overlap the data range [{}, {}]", x_min, x_max, data_min, data_max),
        ));
    }
    Ok(spectrum.filter_ranged(lo, hi, f64::NEG_INFINITY, f64::INFINITY))
}

/// `n` evenly spaced values from `start` to `end`, both inclusive.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| if i == n - 1 { end } else { start + step * i as f64 }).collect()
        }
    }
}

/// First differences of a sequence.
pub fn diff(values: &[f64]) -> Vec<f64> {
    values.iter().tuple_windows().map(|(a, b)| b - a).collect()
}

/// Mean and population standard deviation, `None` for an empty slice.
pub fn mean_and_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    Some((values.iter().mean(), values.iter().population_std_dev()))
}

/// Rounds to a fixed number of decimals.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub fn is_prime(value: usize) -> bool {
    if value < 2 {
        return false;
    }
    if value < 4 {
        return true;
    }
    if value % 2 == 0 {
        return false;
    }
    let mut divisor = 3;
    while divisor * divisor <= value {
        if value % divisor == 0 {
            return false;
        }
        divisor += 2;
    }
    true
}

/// Largest finite value of a slice, `None` if there is none.
pub fn max_value(values: &[f64]) -> Option<f64> {
    values.iter().cloned().filter(|v| v.is_finite()).reduce(f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linspace_hits_end() {
        let v = linspace(10.0, 50.0, 5);
        assert_eq!(v, vec![10.0, 20.0, 30.0, 40.0, 50.0]);
        assert_eq!(linspace(3.0, 9.0, 1), vec![3.0]);
        assert!(linspace(3.0, 9.0, 0).is_empty());
    }

    #[test]
    fn test_mean_and_std() {
        let (mean, std) = mean_and_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((mean - 5.0).abs() < 1e-12);
        assert!((std - 2.0).abs() < 1e-12);
        assert!(mean_and_std(&[]).is_none());
    }

    #[test]
    fn test_is_prime() {
        let primes: Vec<usize> = (0..30).filter(|&v| is_prime(v)).collect();
        assert_eq!(primes, vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
    }

    #[test]
    fn test_crop_clamps_to_data() {
        let s = Spectrum::new(vec![1.0, 2.0, 3.0, 4.0], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let cropped = crop(&s, 0.0, 2.5).unwrap();
        assert_eq!(cropped.x, vec![1.0, 2.0]);
        assert!(crop(&s, 10.0, 20.0).is_err());
    }

    #[test]
    fn test_narrow_range_swaps_bounds() {
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(narrow_range_indices(&x, 4.1, 1.9), (1, 4));
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.333_349, 4), 0.3333);
    }
}
