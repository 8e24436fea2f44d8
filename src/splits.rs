//! Stock split detection and backward price adjustment

use chrono::NaiveDate;
use log::info;
use serde::{Deserialize, Serialize};

use crate::series::{Bar, Series};
use crate::{AnalysisError, Ratio, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub enabled: bool,
    /// One-bar close drop that can indicate a split (0.25 = -25%)
    pub min_price_drop: Ratio,
    /// One-bar volume increase that must accompany it (0.5 = +50%)
    pub min_volume_jump: f64,
    /// Snap the ratio to the nearest half-integer when this close to it
    pub snap_tolerance: Ratio,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_price_drop: Ratio::new_const(0.25),
            min_volume_jump: 0.5,
            snap_tolerance: Ratio::new_const(0.02),
        }
    }
}

impl SplitConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.min_volume_jump.is_finite() || self.min_volume_jump < 0.0 {
            return Err(AnalysisError::InvalidConfig(
                "min_volume_jump must be finite and non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// A detected split. Bars before `index` are divided by `ratio`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitEvent {
    pub index: usize,
    pub date: NaiveDate,
    pub ratio: f64,
}

fn snap_ratio(raw: f64, tolerance: f64) -> f64 {
    let half = (raw * 2.0).round() / 2.0;
    if half > 0.0 && ((raw - half) / half).abs() <= tolerance {
        half
    } else {
        raw
    }
}

/// Scan for split signatures: a sharp close drop together with a volume jump
pub fn detect_splits(bars: &[Bar], cfg: &SplitConfig) -> Vec<SplitEvent> {
    bars.windows(2)
        .enumerate()
        .filter_map(|(k, w)| {
            let (prev, curr) = (&w[0], &w[1]);
            let price_change = curr.close / prev.close - 1.0;
            let volume_jump = if prev.volume > 0.0 {
                curr.volume / prev.volume - 1.0 >= cfg.min_volume_jump
            } else {
                curr.volume > 0.0
            };
            if price_change < -cfg.min_price_drop.get() && volume_jump {
                Some(SplitEvent {
                    index: k + 1,
                    date: curr.date,
                    ratio: snap_ratio(prev.close / curr.close, cfg.snap_tolerance.get()),
                })
            } else {
                None
            }
        })
        .collect()
}

/// Back-adjust every detected split, most recent first. Returns the adjusted
/// series and the events in date order.
pub fn adjust_splits(series: &Series, cfg: &SplitConfig) -> (Series, Vec<SplitEvent>) {
    let events = detect_splits(series.bars(), cfg);
    if events.is_empty() {
        return (series.clone(), events);
    }

    let mut bars = series.bars().to_vec();
    for event in events.iter().rev() {
        info!(
            "split detected for {} on {}: {:.2}-for-1",
            series.symbol().unwrap_or("<unnamed>"),
            event.date,
            event.ratio
        );
        for bar in &mut bars[..event.index] {
            bar.open /= event.ratio;
            bar.high /= event.ratio;
            bar.low /= event.ratio;
            bar.close /= event.ratio;
            bar.volume *= event.ratio;
        }
    }

    let adjusted = Series::from_validated(
        series.symbol().map(str::to_string),
        series.timeframe(),
        bars,
    );
    (adjusted, events)
}

// ============================================================
// TESTS
// ============================================================
