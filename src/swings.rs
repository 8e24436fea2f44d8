//! Swing high / swing low detection
//!
//! A bar is a peak when its high dominates a symmetric window of `lookback`
//! bars on each side and the window's range is a meaningful move. Valleys are
//! the mirror image on lows. Bars within `lookback` of either end can never be
//! swing points because their window is incomplete.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Period, Ratio, Result, OHLCV};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwingConfig {
    /// Bars compared on each side
    pub lookback: Period,
    /// Minimum window move, as a fraction of the extreme's counterpart
    pub min_move: Ratio,
}

impl Default for SwingConfig {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(5),
            min_move: Ratio::new_const(0.02),
        }
    }
}

impl SwingConfig {
    pub fn validate(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwingKind {
    Peak,
    Valley,
}

/// A confirmed swing. `price` is the bar high for peaks and the bar low for
/// valleys.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub index: usize,
    pub date: NaiveDate,
    pub price: f64,
    pub kind: SwingKind,
}

impl SwingPoint {
    #[inline]
    pub fn is_peak(&self) -> bool {
        self.kind == SwingKind::Peak
    }

    #[inline]
    pub fn is_valley(&self) -> bool {
        self.kind == SwingKind::Valley
    }
}

/// Swing points in index order plus per-row flags
#[derive(Debug, Clone, Default)]
pub struct Swings {
    pub points: Vec<SwingPoint>,
    pub is_peak: Vec<bool>,
    pub is_valley: Vec<bool>,
}

impl Swings {
    pub fn peaks(&self) -> impl Iterator<Item = &SwingPoint> + '_ {
        self.points.iter().filter(|p| p.is_peak())
    }

    pub fn valleys(&self) -> impl Iterator<Item = &SwingPoint> + '_ {
        self.points.iter().filter(|p| p.is_valley())
    }

    /// Most recent peak with `from <= index < to`
    pub fn last_peak_in(&self, from: usize, to: usize) -> Option<&SwingPoint> {
        let end = self.points.partition_point(|p| p.index < to);
        self.points[..end]
            .iter()
            .rev()
            .take_while(|p| p.index >= from)
            .find(|p| p.is_peak())
    }
}

/// Detect peaks and valleys over `bars`
pub fn detect_swings<T: OHLCV>(bars: &[T], cfg: &SwingConfig) -> Swings {
    let n = bars.len();
    let lookback = cfg.lookback.get();
    let threshold = cfg.min_move.get();

    let mut swings = Swings {
        points: Vec::new(),
        is_peak: vec![false; n],
        is_valley: vec![false; n],
    };
    if n < 2 * lookback + 1 {
        return swings;
    }

    for i in lookback..n - lookback {
        let window = &bars[i - lookback..=i + lookback];
        let high = bars[i].high();
        let low = bars[i].low();

        let peak = window.iter().all(|b| high >= b.high()) && {
            let window_low = window.iter().map(|b| b.low()).fold(f64::INFINITY, f64::min);
            window_low > 0.0 && (high - window_low) / window_low >= threshold
        };
        let valley = window.iter().all(|b| low <= b.low()) && {
            let window_high = window
                .iter()
                .map(|b| b.high())
                .fold(f64::NEG_INFINITY, f64::max);
            low > 0.0 && (window_high - low) / low >= threshold
        };

        // outside bar: dominant both ways, direction ambiguous
        let kind = match (peak, valley) {
            (true, false) => SwingKind::Peak,
            (false, true) => SwingKind::Valley,
            _ => continue,
        };
        let price = match kind {
            SwingKind::Peak => {
                swings.is_peak[i] = true;
                high
            }
            SwingKind::Valley => {
                swings.is_valley[i] = true;
                low
            }
        };
        swings.points.push(SwingPoint {
            index: i,
            date: bars[i].date(),
            price,
            kind,
        });
    }

    swings
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Bar;

    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                Bar::new(
                    start + chrono::Duration::days(i as i64),
                    c,
                    c * 1.01,
                    c * 0.99,
                    c,
                    1000.0,
                )
            })
            .collect()
    }

    #[test]
    fn test_v_shape_single_valley() {
        // down 30% over 30 bars, up 40% over 30 bars
        let mut closes: Vec<f64> = (0..=30).map(|i| 100.0 - i as f64).collect();
        closes.extend((1..=30).map(|i| 70.0 + i as f64 * 70.0 * 0.4 / 30.0));
        let bars = bars_from_closes(&closes);
        let swings = detect_swings(&bars, &SwingConfig::default());

        let valleys: Vec<_> = swings.valleys().collect();
        assert_eq!(valleys.len(), 1);
        assert_eq!(valleys[0].index, 30);
        assert_eq!(valleys[0].price, bars[30].low);
        assert_eq!(swings.peaks().count(), 0);
    }

    #[test]
    fn test_flat_series_has_no_swings() {
        let bars = bars_from_closes(&[50.0; 40]);
        let swings = detect_swings(&bars, &SwingConfig::default());
        // every bar ties its window on both sides, so none has a direction
        assert!(swings.points.is_empty());
    }

    #[test]
    fn test_margins_respected() {
        let closes: Vec<f64> = (0..60)
            .map(|i| 100.0 + 10.0 * ((i as f64) * 0.4).sin())
            .collect();
        let bars = bars_from_closes(&closes);
        let cfg = SwingConfig::default();
        let swings = detect_swings(&bars, &cfg);
        assert!(!swings.points.is_empty());
        for p in &swings.points {
            assert!(p.index >= 5 && p.index < 55);
        }
    }

    #[test]
    fn test_outside_bar_is_not_a_swing() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars: Vec<Bar> = (0..11)
            .map(|i| {
                let date = start + chrono::Duration::days(i);
                if i == 5 {
                    Bar::new(date, 100.0, 110.0, 90.0, 100.0, 1.0)
                } else {
                    Bar::new(date, 100.0, 101.0, 99.0, 100.0, 1.0)
                }
            })
            .collect();
        let swings = detect_swings(&bars, &SwingConfig::default());
        assert!(swings.points.is_empty());
        assert!(!swings.is_peak[5] && !swings.is_valley[5]);
    }

    #[test]
    fn test_short_series() {
        let bars = bars_from_closes(&[1.0, 2.0, 3.0]);
        let swings = detect_swings(&bars, &SwingConfig::default());
        assert!(swings.points.is_empty());
        assert_eq!(swings.is_peak.len(), 3);
    }

    #[test]
    fn test_last_peak_in() {
        let closes: Vec<f64> = (0..60)
            .map(|i| 100.0 + 10.0 * ((i as f64) * 0.4).sin())
            .collect();
        let bars = bars_from_closes(&closes);
        let swings = detect_swings(&bars, &SwingConfig::default());
        let last = swings.peaks().last().unwrap().index;
        assert_eq!(swings.last_peak_in(0, 60).unwrap().index, last);
        assert!(swings.last_peak_in(0, last).map_or(true, |p| p.index < last));
        assert!(swings.last_peak_in(last + 1, 60).is_none());
    }
}
