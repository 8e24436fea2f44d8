//! Common helper functions for chart pattern detection
//!
//! Slice statistics and window iteration shared across all detector modules.
//! Callers never pass empty slices; the `argmin`/`argmax` family returns 0 for
//! them rather than panicking.

// ============================================================
// SLICE STATISTICS
// ============================================================

/// Index of the first minimum
#[inline]
pub fn argmin(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v < values[best] {
            best = i;
        }
    }
    best
}

/// Index of the first maximum
#[inline]
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

#[inline]
pub fn max_of(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

#[inline]
pub fn min_of(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

#[inline]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

// ============================================================
// SCORING / WINDOWS
// ============================================================

/// Whole-number confidence: `score` truncated, never above `cap`
#[inline]
pub fn capped_confidence(score: f64, cap: f64) -> f64 {
    score.floor().min(cap)
}

/// Window start offsets `0, step, 2*step, ...` strictly below `len - window`
#[inline]
pub fn window_starts(len: usize, window: usize, step: usize) -> impl Iterator<Item = usize> {
    (0..len.saturating_sub(window)).step_by(step.max(1))
}

/// True when `values` rises strictly from each element to the next
#[inline]
pub fn strictly_ascending(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] < w[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_extrema_take_first() {
        let v = [3.0, 1.0, 4.0, 1.0, 4.0];
        assert_eq!(argmin(&v), 1);
        assert_eq!(argmax(&v), 2);
        assert_eq!(argmin(&[]), 0);
    }

    #[test]
    fn test_window_starts() {
        assert_eq!(window_starts(100, 30, 10).collect::<Vec<_>>(), vec![0, 10, 20, 30, 40, 50, 60]);
        assert_eq!(window_starts(30, 30, 10).count(), 0);
        assert_eq!(window_starts(31, 30, 10).collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_capped_confidence() {
        assert_eq!(capped_confidence(72.9, 85.0), 72.0);
        assert_eq!(capped_confidence(99.0, 85.0), 85.0);
    }

    #[test]
    fn test_stats() {
        assert_eq!(mean(&[1.0, 2.0, 3.0]), 2.0);
        assert_eq!(max_of(&[1.0, 5.0, 3.0]), 5.0);
        assert_eq!(min_of(&[1.0, 5.0, 3.0]), 1.0);
        assert!(strictly_ascending(&[1.0, 2.0, 3.0]));
        assert!(!strictly_ascending(&[1.0, 1.0, 3.0]));
    }
}
