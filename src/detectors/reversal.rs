//! Reversal pattern detectors built on swing points
//!
//! Head & Shoulders (and inverse) over three consecutive peaks/valleys,
//! Double Top/Bottom over two with an opposite swing in between.

use super::helpers::capped_confidence;
use crate::{
    params::{ratio_param, ParamMap, ParamMeta, ParameterizedDetector},
    patterns::{ChartPatternDetector, PatternInput, PatternKind, PatternRecord},
    Direction, Ratio, Result,
};

impl_with_defaults!(
    HeadAndShouldersDetector,
    InverseHeadAndShouldersDetector,
    DoubleTopDetector,
    DoubleBottomDetector,
);

// ============================================================
// HEAD & SHOULDERS
// ============================================================

/// Bearish: a head peak standing above two similar shoulders
#[derive(Debug, Clone)]
pub struct HeadAndShouldersDetector {
    /// Head must exceed the higher shoulder by this fraction
    pub head_margin: Ratio,
    /// Largest shoulder mismatch relative to the higher shoulder
    pub shoulder_tolerance: Ratio,
}

impl Default for HeadAndShouldersDetector {
    fn default() -> Self {
        Self {
            head_margin: Ratio::new_const(0.02),
            shoulder_tolerance: Ratio::new_const(0.05),
        }
    }
}

impl ChartPatternDetector for HeadAndShouldersDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::HeadAndShoulders
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect(&self, input: &PatternInput<'_>) -> Vec<PatternRecord> {
        let peaks = input.peaks();
        peaks
            .windows(3)
            .filter_map(|w| {
                let (left, head, right) = (w[0], w[1], w[2]);
                let shoulder = left.price.max(right.price);
                if head.price <= shoulder * (1.0 + self.head_margin.get()) {
                    return None;
                }
                if (left.price - right.price).abs() / shoulder > self.shoulder_tolerance.get() {
                    return None;
                }

                let neckline = (left.price + right.price) / 2.0;
                let height = head.price - neckline;
                let confidence = capped_confidence(60.0 + height / head.price * 100.0, 85.0);
                Some(
                    input
                        .record(self.kind(), Direction::Bearish, confidence, left.index, right.index)
                        .with_key_points(input.swing_key_points(&[left, head, right]))
                        .with_neckline(neckline)
                        .with_target(neckline - height),
                )
            })
            .collect()
    }
}

// ============================================================
// INVERSE HEAD & SHOULDERS
// ============================================================

/// Bullish mirror of Head & Shoulders on valleys
#[derive(Debug, Clone)]
pub struct InverseHeadAndShouldersDetector {
    pub head_margin: Ratio,
    pub shoulder_tolerance: Ratio,
}

impl Default for InverseHeadAndShouldersDetector {
    fn default() -> Self {
        Self {
            head_margin: Ratio::new_const(0.02),
            shoulder_tolerance: Ratio::new_const(0.05),
        }
    }
}

impl ChartPatternDetector for InverseHeadAndShouldersDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::InverseHeadAndShoulders
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect(&self, input: &PatternInput<'_>) -> Vec<PatternRecord> {
        let valleys = input.valleys();
        valleys
            .windows(3)
            .filter_map(|w| {
                let (left, head, right) = (w[0], w[1], w[2]);
                let shoulder = left.price.min(right.price);
                if head.price >= shoulder * (1.0 - self.head_margin.get()) {
                    return None;
                }
                if (left.price - right.price).abs() / shoulder > self.shoulder_tolerance.get() {
                    return None;
                }

                let neckline = (left.price + right.price) / 2.0;
                let height = neckline - head.price;
                let confidence = capped_confidence(60.0 + height / neckline * 100.0, 85.0);
                Some(
                    input
                        .record(self.kind(), Direction::Bullish, confidence, left.index, right.index)
                        .with_key_points(input.swing_key_points(&[left, head, right]))
                        .with_neckline(neckline)
                        .with_target(neckline + height),
                )
            })
            .collect()
    }
}

// ============================================================
// DOUBLE TOP / BOTTOM
// ============================================================

/// Bearish: two peaks at nearly the same price with a trough between
#[derive(Debug, Clone)]
pub struct DoubleTopDetector {
    /// Largest peak mismatch relative to the higher peak
    pub peak_tolerance: Ratio,
}

impl Default for DoubleTopDetector {
    fn default() -> Self {
        Self {
            peak_tolerance: Ratio::new_const(0.02),
        }
    }
}

impl ChartPatternDetector for DoubleTopDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::DoubleTop
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect(&self, input: &PatternInput<'_>) -> Vec<PatternRecord> {
        let peaks = input.peaks();
        peaks
            .windows(2)
            .filter_map(|w| {
                let (first, second) = (w[0], w[1]);
                let higher = first.price.max(second.price);
                if (first.price - second.price).abs() / higher > self.peak_tolerance.get() {
                    return None;
                }
                let trough = input
                    .swings_in(first.index + 1, second.index)
                    .iter()
                    .find(|s| s.is_valley())?;

                let height = first.price - trough.price;
                let confidence = capped_confidence(55.0 + height / first.price * 100.0, 80.0);
                Some(
                    input
                        .record(self.kind(), Direction::Bearish, confidence, first.index, second.index)
                        .with_key_points(input.swing_key_points(&[first, trough, second]))
                        .with_support(trough.price)
                        .with_target(trough.price - height),
                )
            })
            .collect()
    }
}

/// Bullish: two troughs at nearly the same price with a peak between
#[derive(Debug, Clone)]
pub struct DoubleBottomDetector {
    /// Largest trough mismatch relative to the lower trough
    pub trough_tolerance: Ratio,
}

impl Default for DoubleBottomDetector {
    fn default() -> Self {
        Self {
            trough_tolerance: Ratio::new_const(0.02),
        }
    }
}

impl ChartPatternDetector for DoubleBottomDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::DoubleBottom
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect(&self, input: &PatternInput<'_>) -> Vec<PatternRecord> {
        let valleys = input.valleys();
        valleys
            .windows(2)
            .filter_map(|w| {
                let (first, second) = (w[0], w[1]);
                let lower = first.price.min(second.price);
                if (first.price - second.price).abs() / lower > self.trough_tolerance.get() {
                    return None;
                }
                let peak = input
                    .swings_in(first.index + 1, second.index)
                    .iter()
                    .find(|s| s.is_peak())?;

                let height = peak.price - first.price;
                let confidence = capped_confidence(55.0 + height / peak.price * 100.0, 80.0);
                Some(
                    input
                        .record(self.kind(), Direction::Bullish, confidence, first.index, second.index)
                        .with_key_points(input.swing_key_points(&[first, peak, second]))
                        .with_resistance(peak.price)
                        .with_target(peak.price + height),
                )
            })
            .collect()
    }
}

// ============================================================
// PARAMETERIZED DETECTOR IMPLEMENTATIONS
// ============================================================

static HEAD_AND_SHOULDERS_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio(
        "head_margin",
        0.02,
        (0.01, 0.05, 0.01),
        "Minimum head excess over the higher shoulder",
    ),
    ParamMeta::ratio("shoulder_tolerance", 0.05, (0.02, 0.1, 0.01), "Maximum shoulder mismatch"),
];

static DOUBLE_TOP_PARAMS: &[ParamMeta] = &[ParamMeta::ratio(
    "peak_tolerance",
    0.02,
    (0.01, 0.05, 0.01),
    "Maximum mismatch between the two peaks",
)];

static DOUBLE_BOTTOM_PARAMS: &[ParamMeta] = &[ParamMeta::ratio(
    "trough_tolerance",
    0.02,
    (0.01, 0.05, 0.01),
    "Maximum mismatch between the two troughs",
)];

impl ParameterizedDetector for HeadAndShouldersDetector {
    fn param_meta() -> &'static [ParamMeta] {
        HEAD_AND_SHOULDERS_PARAMS
    }

    fn with_params(params: &ParamMap<'_>) -> Result<Self> {
        Ok(Self {
            head_margin: ratio_param(params, "head_margin", 0.02)?,
            shoulder_tolerance: ratio_param(params, "shoulder_tolerance", 0.05)?,
        })
    }
}

impl ParameterizedDetector for InverseHeadAndShouldersDetector {
    fn param_meta() -> &'static [ParamMeta] {
        HEAD_AND_SHOULDERS_PARAMS
    }

    fn with_params(params: &ParamMap<'_>) -> Result<Self> {
        Ok(Self {
            head_margin: ratio_param(params, "head_margin", 0.02)?,
            shoulder_tolerance: ratio_param(params, "shoulder_tolerance", 0.05)?,
        })
    }
}

impl ParameterizedDetector for DoubleTopDetector {
    fn param_meta() -> &'static [ParamMeta] {
        DOUBLE_TOP_PARAMS
    }

    fn with_params(params: &ParamMap<'_>) -> Result<Self> {
        Ok(Self {
            peak_tolerance: ratio_param(params, "peak_tolerance", 0.02)?,
        })
    }
}

impl ParameterizedDetector for DoubleBottomDetector {
    fn param_meta() -> &'static [ParamMeta] {
        DOUBLE_BOTTOM_PARAMS
    }

    fn with_params(params: &ParamMap<'_>) -> Result<Self> {
        Ok(Self {
            trough_tolerance: ratio_param(params, "trough_tolerance", 0.02)?,
        })
    }
}
