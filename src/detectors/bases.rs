//! Base pattern detectors over sliding windows of closing prices
//!
//! Cup & Handle, Flat Base, Saucer Base and Ascending Base. All are bullish
//! continuation shapes and carry a breakout target.

#![allow(clippy::needless_range_loop)]

use super::helpers::{
    argmax, argmin, capped_confidence, max_of, min_of, strictly_ascending, window_starts,
};
use crate::{
    params::{period_param, ratio_param, ParamMap, ParamMeta, ParameterizedDetector},
    patterns::{ChartPatternDetector, PatternInput, PatternKind, PatternRecord},
    AnalysisError, Direction, Period, Ratio, Result,
};

impl_with_defaults!(
    CupAndHandleDetector,
    FlatBaseDetector,
    SaucerBaseDetector,
    AscendingBaseDetector,
);

fn check_bounds(field: &'static str, lower: Ratio, upper: Ratio) -> Result<()> {
    if lower.get() > upper.get() {
        return Err(AnalysisError::InvalidConfig(format!(
            "{field}: lower bound {} exceeds upper bound {}",
            lower.get(),
            upper.get()
        )));
    }
    Ok(())
}

// ============================================================
// CUP & HANDLE
// ============================================================

/// U-shaped cup that recovers to its rim, then a shallow handle
#[derive(Debug, Clone)]
pub struct CupAndHandleDetector {
    pub window: Period,
    pub step: Period,
    /// Bars reserved for the handle at the end of the window
    pub handle_len: Period,
    /// Cup low must sit at least this far below the rim
    pub min_cup_depth: Ratio,
    /// Recovery must come back to within this fraction of the rim
    pub recovery_tolerance: Ratio,
    pub min_handle_pullback: Ratio,
    pub max_handle_pullback: Ratio,
}

impl Default for CupAndHandleDetector {
    fn default() -> Self {
        Self {
            window: Period::new_const(50),
            step: Period::new_const(10),
            handle_len: Period::new_const(10),
            min_cup_depth: Ratio::new_const(0.05),
            recovery_tolerance: Ratio::new_const(0.05),
            min_handle_pullback: Ratio::new_const(0.03),
            max_handle_pullback: Ratio::new_const(0.12),
        }
    }
}

impl ChartPatternDetector for CupAndHandleDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::CupAndHandle
    }

    fn min_bars(&self) -> usize {
        self.window.get() + 1
    }

    fn detect(&self, input: &PatternInput<'_>) -> Vec<PatternRecord> {
        let closes = input.closes();
        let window = self.window.get();
        let handle_len = self.handle_len.get();
        let Some(cup_len) = window.checked_sub(handle_len).filter(|&c| c > 0) else {
            return Vec::new();
        };

        window_starts(closes.len(), window, self.step.get())
            .filter_map(|start| {
                let w = &closes[start..start + window];
                let rim = w[0];

                let low_idx = argmin(&w[..cup_len]);
                let low = w[low_idx];
                if low >= rim * (1.0 - self.min_cup_depth.get()) {
                    return None;
                }
                let recovery_idx = low_idx + argmax(&w[low_idx..cup_len]);
                let recovery = w[recovery_idx];
                if recovery < rim * (1.0 - self.recovery_tolerance.get()) {
                    return None;
                }
                if recovery_idx + handle_len >= window {
                    return None;
                }

                let handle_low = min_of(&w[recovery_idx..recovery_idx + handle_len]);
                let pullback = (recovery - handle_low) / recovery;
                if pullback < self.min_handle_pullback.get()
                    || pullback > self.max_handle_pullback.get()
                {
                    return None;
                }

                let depth = (rim - low) / rim;
                let end = start + recovery_idx + handle_len;
                let confidence = capped_confidence(60.0 + depth * 100.0, 85.0);
                Some(
                    input
                        .record(self.kind(), Direction::Bullish, confidence, start, end)
                        .with_key_points(vec![
                            input.key_point(start, rim),
                            input.key_point(start + low_idx, low),
                            input.key_point(start + recovery_idx, recovery),
                        ])
                        .with_resistance(rim)
                        .with_support(low)
                        .with_depth_pct(depth * 100.0)
                        .with_target(rim + (rim - low)),
                )
            })
            .collect()
    }

    fn validate_config(&self) -> Result<()> {
        if self.handle_len.get() >= self.window.get() {
            return Err(AnalysisError::InvalidConfig(
                "cup & handle: handle_len must be shorter than the window".into(),
            ));
        }
        check_bounds(
            "cup & handle pullback",
            self.min_handle_pullback,
            self.max_handle_pullback,
        )
    }
}

// ============================================================
// FLAT BASE
// ============================================================

/// Tight sideways range following a prior advance
#[derive(Debug, Clone)]
pub struct FlatBaseDetector {
    pub window: Period,
    pub step: Period,
    pub min_depth: Ratio,
    pub max_depth: Ratio,
    /// Bars before the window used to measure the prior advance
    pub prior_lookback: Period,
    /// Window must open at least this far above the prior close
    pub prior_advance: Ratio,
    /// Target above the base high
    pub breakout_gain: Ratio,
}

impl Default for FlatBaseDetector {
    fn default() -> Self {
        Self {
            window: Period::new_const(25),
            step: Period::new_const(5),
            min_depth: Ratio::new_const(0.03),
            max_depth: Ratio::new_const(0.15),
            prior_lookback: Period::new_const(20),
            prior_advance: Ratio::new_const(0.10),
            breakout_gain: Ratio::new_const(0.10),
        }
    }
}

impl ChartPatternDetector for FlatBaseDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::FlatBase
    }

    fn min_bars(&self) -> usize {
        self.window.get() + 1
    }

    /// Windows opening within `prior_lookback` bars of the series start have
    /// no prior to measure and skip the advance check
    fn detect(&self, input: &PatternInput<'_>) -> Vec<PatternRecord> {
        let closes = input.closes();
        let window = self.window.get();
        let lookback = self.prior_lookback.get();
        let max_depth = self.max_depth.get();

        window_starts(closes.len(), window, self.step.get())
            .filter_map(|start| {
                let w = &closes[start..start + window];
                let high = max_of(w);
                let low = min_of(w);
                let depth = (high - low) / high;
                if depth < self.min_depth.get() || depth > max_depth {
                    return None;
                }
                if start >= lookback
                    && w[0] < closes[start - lookback] * (1.0 + self.prior_advance.get())
                {
                    return None;
                }

                let end = start + window - 1;
                let confidence = capped_confidence(55.0 + (1.0 - depth / max_depth) * 20.0, 75.0);
                Some(
                    input
                        .record(self.kind(), Direction::Bullish, confidence, start, end)
                        .with_key_points(vec![
                            input.key_point(start, w[0]),
                            input.key_point(start + argmin(w), low),
                            input.key_point(start + argmax(w), high),
                        ])
                        .with_resistance(high)
                        .with_support(low)
                        .with_depth_pct(depth * 100.0)
                        .with_target(high * (1.0 + self.breakout_gain.get())),
                )
            })
            .collect()
    }

    fn validate_config(&self) -> Result<()> {
        check_bounds("flat base depth", self.min_depth, self.max_depth)
    }
}

// ============================================================
// SAUCER BASE
// ============================================================

/// Shallow rounded bottom with gradual slopes on both sides
#[derive(Debug, Clone)]
pub struct SaucerBaseDetector {
    pub window: Period,
    pub step: Period,
    /// Low must not sit in the outer fraction of the window on either side
    pub edge_margin: Ratio,
    pub min_depth: Ratio,
    pub max_depth: Ratio,
    /// Largest average per-bar move of either side, relative to its end price
    pub max_slope: Ratio,
    pub breakout_gain: Ratio,
}

impl Default for SaucerBaseDetector {
    fn default() -> Self {
        Self {
            window: Period::new_const(50),
            step: Period::new_const(10),
            edge_margin: Ratio::new_const(0.2),
            min_depth: Ratio::new_const(0.05),
            max_depth: Ratio::new_const(0.25),
            max_slope: Ratio::new_const(0.02),
            breakout_gain: Ratio::new_const(0.15),
        }
    }
}

impl ChartPatternDetector for SaucerBaseDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::SaucerBase
    }

    fn min_bars(&self) -> usize {
        self.window.get() + 1
    }

    fn detect(&self, input: &PatternInput<'_>) -> Vec<PatternRecord> {
        let closes = input.closes();
        let window = self.window.get();
        let edge = window as f64 * self.edge_margin.get();
        let max_depth = self.max_depth.get();
        let max_slope = self.max_slope.get();

        window_starts(closes.len(), window, self.step.get())
            .filter_map(|start| {
                let w = &closes[start..start + window];
                let low_idx = argmin(w);
                if low_idx == 0 || (low_idx as f64) < edge || (low_idx as f64) > window as f64 - edge {
                    return None;
                }
                let low = w[low_idx];
                let top = max_of(&w[..low_idx]).max(max_of(&w[low_idx..]));
                let depth = (top - low) / top;
                if depth < self.min_depth.get() || depth > max_depth {
                    return None;
                }

                let (first, last) = (w[0], w[window - 1]);
                let left_slope = (low - first) / (low_idx + 1) as f64;
                let right_slope = (last - low) / (window - low_idx) as f64;
                if left_slope.abs() > max_slope * first || right_slope.abs() > max_slope * last {
                    return None;
                }

                let end = start + window - 1;
                let confidence = capped_confidence(50.0 + (1.0 - depth / max_depth) * 20.0, 70.0);
                Some(
                    input
                        .record(self.kind(), Direction::Bullish, confidence, start, end)
                        .with_key_points(vec![
                            input.key_point(start, first),
                            input.key_point(start + low_idx, low),
                            input.key_point(end, last),
                        ])
                        .with_resistance(top)
                        .with_support(low)
                        .with_depth_pct(depth * 100.0)
                        .with_target(top * (1.0 + self.breakout_gain.get())),
                )
            })
            .collect()
    }

    fn validate_config(&self) -> Result<()> {
        if self.edge_margin.get() >= 0.5 {
            return Err(AnalysisError::InvalidConfig(
                "saucer base: edge_margin must be below 0.5".into(),
            ));
        }
        check_bounds("saucer base depth", self.min_depth, self.max_depth)
    }
}

// ============================================================
// ASCENDING BASE
// ============================================================

/// Stair-step advance: a run of higher lows, each after a moderate pullback
#[derive(Debug, Clone)]
pub struct AscendingBaseDetector {
    pub window: Period,
    pub step: Period,
    /// Half-width of the neighbourhood a local low must dominate; also the
    /// spacing of candidate lows
    pub trough_radius: Period,
    pub min_troughs: Period,
    pub min_pullback: Ratio,
    pub max_pullback: Ratio,
    pub breakout_gain: Ratio,
}

impl Default for AscendingBaseDetector {
    fn default() -> Self {
        Self {
            window: Period::new_const(60),
            step: Period::new_const(10),
            trough_radius: Period::new_const(5),
            min_troughs: Period::new_const(3),
            min_pullback: Ratio::new_const(0.05),
            max_pullback: Ratio::new_const(0.25),
            breakout_gain: Ratio::new_const(0.20),
        }
    }
}

impl AscendingBaseDetector {
    /// Candidate lows at multiples of the radius that are the minimum of
    /// their neighbourhood
    fn local_troughs(&self, w: &[f64]) -> Vec<usize> {
        let r = self.trough_radius.get();
        let mut troughs = Vec::new();
        for i in (r..w.len().saturating_sub(r)).step_by(r) {
            if w[i] == min_of(&w[i - r..=i + r]) {
                troughs.push(i);
            }
        }
        troughs
    }
}

impl ChartPatternDetector for AscendingBaseDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::AscendingBase
    }

    fn min_bars(&self) -> usize {
        self.window.get() + 1
    }

    fn detect(&self, input: &PatternInput<'_>) -> Vec<PatternRecord> {
        let closes = input.closes();
        let window = self.window.get();

        window_starts(closes.len(), window, self.step.get())
            .filter_map(|start| {
                let w = &closes[start..start + window];
                let troughs = self.local_troughs(w);
                if troughs.len() < self.min_troughs.get() {
                    return None;
                }
                let prices: Vec<f64> = troughs.iter().map(|&i| w[i]).collect();
                if !strictly_ascending(&prices) {
                    return None;
                }
                let pullbacks_ok = troughs.iter().all(|&i| {
                    let high_before = max_of(&w[..i]);
                    let pullback = (high_before - w[i]) / high_before;
                    pullback >= self.min_pullback.get() && pullback <= self.max_pullback.get()
                });
                if !pullbacks_ok {
                    return None;
                }

                let resistance = max_of(w);
                let end = start + window - 1;
                let confidence = capped_confidence(55.0 + 5.0 * troughs.len() as f64, 75.0);
                Some(
                    input
                        .record(self.kind(), Direction::Bullish, confidence, start, end)
                        .with_key_points(
                            troughs
                                .iter()
                                .map(|&i| input.key_point(start + i, w[i]))
                                .collect(),
                        )
                        .with_resistance(resistance)
                        .with_support(prices[0])
                        .with_target(resistance * (1.0 + self.breakout_gain.get())),
                )
            })
            .collect()
    }

    fn validate_config(&self) -> Result<()> {
        if 2 * self.trough_radius.get() >= self.window.get() {
            return Err(AnalysisError::InvalidConfig(
                "ascending base: trough_radius too large for the window".into(),
            ));
        }
        check_bounds("ascending base pullback", self.min_pullback, self.max_pullback)
    }
}

// ============================================================
// PARAMETERIZED DETECTOR IMPLEMENTATIONS
// ============================================================

static CUP_AND_HANDLE_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("window", 50.0, (40.0, 80.0, 10.0), "Bars per scan window"),
    ParamMeta::period("handle_len", 10.0, (5.0, 15.0, 5.0), "Bars reserved for the handle"),
    ParamMeta::ratio("min_cup_depth", 0.05, (0.03, 0.15, 0.01), "Minimum cup depth below the rim"),
    ParamMeta::ratio("min_handle_pullback", 0.03, (0.01, 0.05, 0.01), "Minimum handle pullback"),
    ParamMeta::ratio("max_handle_pullback", 0.12, (0.08, 0.15, 0.01), "Maximum handle pullback"),
];

static FLAT_BASE_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("window", 25.0, (15.0, 40.0, 5.0), "Bars per scan window"),
    ParamMeta::ratio("min_depth", 0.03, (0.01, 0.05, 0.01), "Minimum base depth"),
    ParamMeta::ratio("max_depth", 0.15, (0.10, 0.20, 0.01), "Maximum base depth"),
    ParamMeta::ratio("prior_advance", 0.10, (0.05, 0.30, 0.05), "Required advance into the base"),
];

static SAUCER_BASE_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("window", 50.0, (40.0, 80.0, 10.0), "Bars per scan window"),
    ParamMeta::ratio("min_depth", 0.05, (0.03, 0.10, 0.01), "Minimum saucer depth"),
    ParamMeta::ratio("max_depth", 0.25, (0.15, 0.35, 0.05), "Maximum saucer depth"),
    ParamMeta::ratio("max_slope", 0.02, (0.01, 0.05, 0.01), "Maximum average per-bar slope"),
];

static ASCENDING_BASE_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("window", 60.0, (45.0, 80.0, 5.0), "Bars per scan window"),
    ParamMeta::period("min_troughs", 3.0, (2.0, 5.0, 1.0), "Minimum number of higher lows"),
    ParamMeta::ratio("min_pullback", 0.05, (0.03, 0.10, 0.01), "Minimum pullback into each low"),
    ParamMeta::ratio("max_pullback", 0.25, (0.15, 0.30, 0.05), "Maximum pullback into each low"),
];

impl ParameterizedDetector for CupAndHandleDetector {
    fn param_meta() -> &'static [ParamMeta] {
        CUP_AND_HANDLE_PARAMS
    }

    fn with_params(params: &ParamMap<'_>) -> Result<Self> {
        Ok(Self {
            window: period_param(params, "window", 50)?,
            handle_len: period_param(params, "handle_len", 10)?,
            min_cup_depth: ratio_param(params, "min_cup_depth", 0.05)?,
            min_handle_pullback: ratio_param(params, "min_handle_pullback", 0.03)?,
            max_handle_pullback: ratio_param(params, "max_handle_pullback", 0.12)?,
            ..Self::default()
        })
    }
}

impl ParameterizedDetector for FlatBaseDetector {
    fn param_meta() -> &'static [ParamMeta] {
        FLAT_BASE_PARAMS
    }

    fn with_params(params: &ParamMap<'_>) -> Result<Self> {
        Ok(Self {
            window: period_param(params, "window", 25)?,
            min_depth: ratio_param(params, "min_depth", 0.03)?,
            max_depth: ratio_param(params, "max_depth", 0.15)?,
            prior_advance: ratio_param(params, "prior_advance", 0.10)?,
            ..Self::default()
        })
    }
}

impl ParameterizedDetector for SaucerBaseDetector {
    fn param_meta() -> &'static [ParamMeta] {
        SAUCER_BASE_PARAMS
    }

    fn with_params(params: &ParamMap<'_>) -> Result<Self> {
        Ok(Self {
            window: period_param(params, "window", 50)?,
            min_depth: ratio_param(params, "min_depth", 0.05)?,
            max_depth: ratio_param(params, "max_depth", 0.25)?,
            max_slope: ratio_param(params, "max_slope", 0.02)?,
            ..Self::default()
        })
    }
}

impl ParameterizedDetector for AscendingBaseDetector {
    fn param_meta() -> &'static [ParamMeta] {
        ASCENDING_BASE_PARAMS
    }

    fn with_params(params: &ParamMap<'_>) -> Result<Self> {
        Ok(Self {
            window: period_param(params, "window", 60)?,
            min_troughs: period_param(params, "min_troughs", 3)?,
            min_pullback: ratio_param(params, "min_pullback", 0.05)?,
            max_pullback: ratio_param(params, "max_pullback", 0.25)?,
            ..Self::default()
        })
    }
}
