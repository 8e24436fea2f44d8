//! Relative strength versus a benchmark and Chaikin accumulation/distribution
//!
//! Both scores fall back to a neutral 50 whenever there is not enough history
//! to say anything; that is expected sparsity, not an error.

use serde::{Deserialize, Serialize};

use crate::series::{Series, TimeFrame};
use crate::{AnalysisError, OHLCVExt, Result, OHLCV};

/// Score used when a row cannot be ranked
pub const NEUTRAL_SCORE: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrengthConfig {
    /// Composite weights for the 1, 3, 6 and 12 month relative returns
    pub weights: [f64; 4],
    /// RS at or above this marks a market leader
    pub leader_rs: f64,
    /// AD at or above this marks a market leader
    pub leader_ad: f64,
    /// Benchmark ticker requested from the data provider
    pub benchmark: String,
}

impl Default for StrengthConfig {
    fn default() -> Self {
        Self {
            weights: [0.2, 0.2, 0.2, 0.4],
            leader_rs: 95.0,
            leader_ad: 95.0,
            benchmark: "SPY".to_string(),
        }
    }
}

impl StrengthConfig {
    pub fn validate(&self) -> Result<()> {
        if self.weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(AnalysisError::InvalidConfig(
                "relative strength weights must be finite and non-negative".into(),
            ));
        }
        if !(1.0..=99.0).contains(&self.leader_rs) {
            return Err(AnalysisError::OutOfRange {
                field: "leader_rs",
                value: self.leader_rs,
                min: 1.0,
                max: 99.0,
            });
        }
        if !(0.0..=100.0).contains(&self.leader_ad) {
            return Err(AnalysisError::OutOfRange {
                field: "leader_ad",
                value: self.leader_ad,
                min: 0.0,
                max: 100.0,
            });
        }
        Ok(())
    }
}

// ============================================================
// RELATIVE STRENGTH
// ============================================================

/// Map a weighted relative return (percentage points) onto 1..=99
#[inline]
pub fn rs_score(composite: f64) -> f64 {
    let score = if composite >= 50.0 {
        99.0
    } else if composite <= -50.0 {
        1.0
    } else {
        (composite + 50.0) / 100.0 * 98.0 + 1.0
    };
    (score * 10.0).round() / 10.0
}

#[inline]
fn pct_return(now: f64, then: f64) -> f64 {
    if then > 0.0 {
        (now - then) / then * 100.0
    } else {
        0.0
    }
}

/// Returns over each horizon ending at `idx`; 0 where history is too short
fn horizon_returns(closes: &[f64], idx: usize, horizons: &[usize; 4]) -> [f64; 4] {
    horizons.map(|h| {
        if idx >= h {
            pct_return(closes[idx], closes[idx - h])
        } else {
            0.0
        }
    })
}

/// Weighted multi-horizon relative strength of `series` against `benchmark`.
///
/// The benchmark is aligned to each row by the last benchmark date on or
/// before the row date, and uses the same bar lag as the instrument.
pub fn relative_strength(
    series: &Series,
    benchmark: Option<&Series>,
    cfg: &StrengthConfig,
) -> Result<Vec<f64>> {
    let n = series.len();
    let Some(benchmark) = benchmark else {
        return Ok(vec![NEUTRAL_SCORE; n]);
    };
    if benchmark.timeframe() != series.timeframe() {
        return Err(AnalysisError::InvalidConfig(format!(
            "benchmark is {} but series is {}",
            benchmark.timeframe(),
            series.timeframe()
        )));
    }

    let horizons = series.timeframe().rs_horizons();
    let month = horizons[0];
    let closes = series.closes();
    let bench_bars = benchmark.bars();
    let bench_closes = benchmark.closes();

    let scores = series
        .bars()
        .iter()
        .enumerate()
        .map(|(idx, bar)| {
            if idx < month {
                return NEUTRAL_SCORE;
            }
            let aligned = bench_bars.partition_point(|b| b.date <= bar.date);
            if aligned < month {
                return NEUTRAL_SCORE;
            }

            let stock = horizon_returns(&closes, idx, &horizons);
            let market = horizon_returns(&bench_closes, aligned - 1, &horizons);
            let composite: f64 = (0..4)
                .map(|k| (stock[k] - market[k]) * cfg.weights[k])
                .sum();
            rs_score(composite)
        })
        .collect();

    Ok(scores)
}

// ============================================================
// ACCUMULATION / DISTRIBUTION
// ============================================================

/// Chaikin accumulation/distribution line (cumulative money-flow volume)
pub fn ad_line<T: OHLCV>(bars: &[T]) -> Vec<f64> {
    bars.iter()
        .scan(0.0, |acc, b| {
            *acc += b.money_flow_multiplier() * b.volume();
            Some(*acc)
        })
        .collect()
}

/// Percentile rank (average ties, in percent) of the last element of `window`
pub fn percentile_rank_last(window: &[f64]) -> f64 {
    let Some(&last) = window.last() else {
        return NEUTRAL_SCORE;
    };
    let below = window.iter().filter(|&&v| v < last).count() as f64;
    let equal = window.iter().filter(|&&v| v == last).count() as f64;
    (below + (equal + 1.0) / 2.0) / window.len() as f64 * 100.0
}

/// Rolling percentile of the AD line, 0..=100.
///
/// The ranking window is one year of bars (or the whole series when shorter);
/// rows with fewer than max(10, window/4) values score 50.
pub fn accumulation_distribution<T: OHLCV>(bars: &[T], timeframe: TimeFrame) -> Vec<f64> {
    let ad = ad_line(bars);
    let window = timeframe.ad_window().min(ad.len());
    let min_periods = (window / 4).max(10);

    (0..ad.len())
        .map(|i| {
            let slice = &ad[(i + 1).saturating_sub(window)..=i];
            if slice.len() < min_periods {
                NEUTRAL_SCORE
            } else {
                percentile_rank_last(slice).clamp(0.0, 100.0)
            }
        })
        .collect()
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Bar;
    use chrono::NaiveDate;

    fn series(closes: &[f64], start_offset: i64) -> Series {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                Bar::new(
                    start + chrono::Duration::days(i as i64 + start_offset),
                    c,
                    c * 1.01,
                    c * 0.99,
                    c,
                    1000.0,
                )
            })
            .collect();
        Series::new(bars, TimeFrame::Daily).unwrap()
    }

    #[test]
    fn test_rs_score_mapping() {
        assert_eq!(rs_score(0.0), 50.0);
        assert_eq!(rs_score(50.0), 99.0);
        assert_eq!(rs_score(120.0), 99.0);
        assert_eq!(rs_score(-50.0), 1.0);
        assert_eq!(rs_score(-400.0), 1.0);
        assert_eq!(rs_score(25.0), 74.5);
    }

    #[test]
    fn test_rs_without_benchmark_is_neutral() {
        let s = series(&[10.0; 40], 0);
        let rs = relative_strength(&s, None, &StrengthConfig::default()).unwrap();
        assert!(rs.iter().all(|&v| v == 50.0));
    }

    #[test]
    fn test_rs_matches_benchmark() {
        let closes: Vec<f64> = (0..300).map(|i| 100.0 + i as f64).collect();
        let s = series(&closes, 0);
        let rs = relative_strength(&s, Some(&s), &StrengthConfig::default()).unwrap();
        assert!(rs.iter().all(|&v| v == 50.0));
    }

    #[test]
    fn test_rs_outperformer_scores_high() {
        let stock: Vec<f64> = (0..300).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        let bench: Vec<f64> = vec![100.0; 300];
        let rs = relative_strength(
            &series(&stock, 0),
            Some(&series(&bench, 0)),
            &StrengthConfig::default(),
        )
        .unwrap();
        assert_eq!(rs[20], 50.0);
        assert!(rs[21] > 50.0);
        assert_eq!(rs[299], 99.0);
    }

    #[test]
    fn test_rs_short_aligned_benchmark_is_neutral() {
        let stock: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        // benchmark starts 30 days after the stock
        let bench: Vec<f64> = vec![100.0; 60];
        let rs = relative_strength(
            &series(&stock, 0),
            Some(&series(&bench, 30)),
            &StrengthConfig::default(),
        )
        .unwrap();
        assert_eq!(rs[45], 50.0);
        assert!(rs[59] > 50.0);
    }

    #[test]
    fn test_rs_rejects_mixed_timeframes() {
        let s = series(&[10.0; 40], 0);
        let weekly = s.to_weekly();
        assert!(relative_strength(&s, Some(&weekly), &StrengthConfig::default()).is_err());
    }

    #[test]
    fn test_percentile_rank_ties() {
        assert_eq!(percentile_rank_last(&[1.0, 2.0, 3.0, 4.0]), 100.0);
        assert_eq!(percentile_rank_last(&[4.0, 3.0, 2.0, 1.0]), 25.0);
        assert_eq!(percentile_rank_last(&[5.0, 5.0, 5.0, 5.0]), 62.5);
    }

    #[test]
    fn test_ad_short_history_is_neutral() {
        let s = series(&[10.0; 9], 0);
        let ad = accumulation_distribution(s.bars(), TimeFrame::Daily);
        assert!(ad.iter().all(|&v| v == 50.0));
    }

    #[test]
    fn test_ad_accumulation_ranks_high() {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let bars: Vec<Bar> = (0..40)
            .map(|i| Bar::new(start + chrono::Duration::days(i), 10.0, 11.0, 9.0, 11.0, 500.0))
            .collect();
        let ad = accumulation_distribution(&bars, TimeFrame::Daily);
        // window = 40, min periods = 10
        assert_eq!(ad[8], 50.0);
        assert_eq!(ad[9], 100.0);
        assert_eq!(ad[39], 100.0);
        assert!(ad.iter().all(|v| (0.0..=100.0).contains(v)));
    }

    #[test]
    fn test_ad_line_flat_bar() {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let bars = vec![Bar::new(start, 10.0, 10.0, 10.0, 10.0, 100.0)];
        assert_eq!(ad_line(&bars), vec![0.0]);
    }
}
