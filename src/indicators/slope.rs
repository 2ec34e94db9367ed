/// Linear slopes of an indicator series over the 3- and 5-sample windows
/// consumed by the signal evaluator
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Slopes {
    pub slope_3: Option<f64>,
    pub slope_5: Option<f64>,
}

/// Linear rate of change over the trailing `window` defined samples:
/// `(most_recent − value_at_window_start) / (window − 1)`.
///
/// This is not a regression fit; a flat series yields exactly 0. Returns
/// `None` until `window` defined samples exist. Undefined (`None`) samples
/// are skipped, not treated as zero.
pub fn slope(series: &[Option<f64>], window: usize) -> Option<f64> {
    if window < 2 {
        return None;
    }

    let defined: Vec<f64> = series.iter().flatten().copied().collect();
    if defined.len() < window {
        return None;
    }

    let tail = &defined[defined.len() - window..];
    Some((tail[window - 1] - tail[0]) / (window - 1) as f64)
}

/// Convenience: both evaluator windows at once
pub fn slopes(series: &[Option<f64>]) -> Slopes {
    Slopes {
        slope_3: slope(series, 3),
        slope_5: slope(series, 5),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defined(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().map(|v| Some(*v)).collect()
    }

    #[test]
    fn test_slope_constant_series_is_exactly_zero() {
        let series = defined(&[70.0; 10]);
        assert_eq!(slope(&series, 3), Some(0.0));
        assert_eq!(slope(&series, 5), Some(0.0));
    }

    #[test]
    fn test_slope_linear_series() {
        // Values rising by 2 per sample: slope is 2 regardless of window
        let series = defined(&[10.0, 12.0, 14.0, 16.0, 18.0, 20.0]);
        assert_eq!(slope(&series, 3), Some(2.0));
        assert_eq!(slope(&series, 5), Some(2.0));
    }

    #[test]
    fn test_slope_uses_endpoints_only() {
        // Middle values do not matter: (20 - 10) / 2 = 5
        let series = defined(&[10.0, 99.0, 20.0]);
        assert_eq!(slope(&series, 3), Some(5.0));
    }

    #[test]
    fn test_slope_undefined_below_window() {
        let series = defined(&[10.0, 12.0]);
        assert!(slope(&series, 3).is_none());
        assert!(slope(&series, 5).is_none());
    }

    #[test]
    fn test_slope_skips_undefined_samples() {
        let series = vec![None, None, Some(10.0), None, Some(12.0), Some(14.0)];
        // Only the three defined samples count: (14 - 10) / 2 = 2
        assert_eq!(slope(&series, 3), Some(2.0));
        assert!(slope(&series, 5).is_none());
    }

    #[test]
    fn test_slopes_pair() {
        let series = defined(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let s = slopes(&series);
        assert_eq!(s.slope_3, Some(1.0));
        assert_eq!(s.slope_5, Some(1.0));
    }
}
