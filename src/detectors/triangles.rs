//! Triangle detectors over sliding windows of swing points
//!
//! Each window needs at least two peaks and two valleys. Ascending and
//! descending triangles have one flat side; symmetrical ones converge.

use super::helpers::{capped_confidence, max_of, mean, min_of, window_starts};
use crate::{
    params::{period_param, ratio_param, ParamMap, ParamMeta, ParameterizedDetector},
    patterns::{ChartPatternDetector, PatternInput, PatternKind, PatternRecord},
    swings::SwingPoint,
    AnalysisError, Direction, Period, Ratio, Result,
};

impl_with_defaults!(
    AscendingTriangleDetector,
    DescendingTriangleDetector,
    SymmetricalTriangleDetector,
);

/// Peaks and valleys of one window, in index order
struct WindowSwings<'s> {
    start: usize,
    end: usize,
    peaks: Vec<&'s SwingPoint>,
    valleys: Vec<&'s SwingPoint>,
}

impl WindowSwings<'_> {
    fn peak_prices(&self) -> Vec<f64> {
        self.peaks.iter().map(|p| p.price).collect()
    }

    fn valley_prices(&self) -> Vec<f64> {
        self.valleys.iter().map(|p| p.price).collect()
    }
}

/// Windows with at least two peaks and two valleys
fn swing_windows<'s>(input: &'s PatternInput<'_>, window: usize, step: usize) -> Vec<WindowSwings<'s>> {
    window_starts(input.len(), window, step)
        .filter_map(|start| {
            let local = input.swings_in(start, start + window);
            let peaks: Vec<_> = local.iter().filter(|s| s.is_peak()).collect();
            let valleys: Vec<_> = local.iter().filter(|s| s.is_valley()).collect();
            (peaks.len() >= 2 && valleys.len() >= 2).then_some(WindowSwings {
                start,
                end: start + window - 1,
                peaks,
                valleys,
            })
        })
        .collect()
}

fn validate_window(window: Period, step: Period) -> Result<()> {
    if window.get() < 2 {
        return Err(AnalysisError::InvalidConfig(
            "triangle window must span at least 2 bars".into(),
        ));
    }
    if step.get() > window.get() {
        return Err(AnalysisError::InvalidConfig(
            "triangle step must not exceed the window".into(),
        ));
    }
    Ok(())
}

// ============================================================
// ASCENDING TRIANGLE
// ============================================================

/// Bullish: flat resistance over rising lows
#[derive(Debug, Clone)]
pub struct AscendingTriangleDetector {
    pub window: Period,
    pub step: Period,
    /// Largest peak spread relative to the mean peak
    pub flat_tolerance: Ratio,
}

impl Default for AscendingTriangleDetector {
    fn default() -> Self {
        Self {
            window: Period::new_const(30),
            step: Period::new_const(10),
            flat_tolerance: Ratio::new_const(0.03),
        }
    }
}

impl ChartPatternDetector for AscendingTriangleDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::AscendingTriangle
    }

    fn min_bars(&self) -> usize {
        self.window.get() + 1
    }

    fn detect(&self, input: &PatternInput<'_>) -> Vec<PatternRecord> {
        swing_windows(input, self.window.get(), self.step.get())
            .into_iter()
            .filter_map(|w| {
                let highs = w.peak_prices();
                let lows = w.valley_prices();
                let resistance = mean(&highs);
                if max_of(&highs) - min_of(&highs) > resistance * self.flat_tolerance.get() {
                    return None;
                }
                let (first_low, last_low) = (lows[0], lows[lows.len() - 1]);
                if last_low <= first_low {
                    return None;
                }

                let confidence = capped_confidence(50.0 + 10.0 * highs.len() as f64, 75.0);
                Some(
                    input
                        .record(self.kind(), Direction::Bullish, confidence, w.start, w.end)
                        .with_key_points(input.swing_key_points(&w.peaks))
                        .with_resistance(resistance)
                        .with_support(first_low)
                        .with_target(resistance + (resistance - first_low)),
                )
            })
            .collect()
    }

    fn validate_config(&self) -> Result<()> {
        validate_window(self.window, self.step)
    }
}

// ============================================================
// DESCENDING TRIANGLE
// ============================================================

/// Bearish: flat support under falling highs
#[derive(Debug, Clone)]
pub struct DescendingTriangleDetector {
    pub window: Period,
    pub step: Period,
    /// Largest valley spread relative to the mean valley
    pub flat_tolerance: Ratio,
}

impl Default for DescendingTriangleDetector {
    fn default() -> Self {
        Self {
            window: Period::new_const(30),
            step: Period::new_const(10),
            flat_tolerance: Ratio::new_const(0.03),
        }
    }
}

impl ChartPatternDetector for DescendingTriangleDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::DescendingTriangle
    }

    fn min_bars(&self) -> usize {
        self.window.get() + 1
    }

    fn detect(&self, input: &PatternInput<'_>) -> Vec<PatternRecord> {
        swing_windows(input, self.window.get(), self.step.get())
            .into_iter()
            .filter_map(|w| {
                let highs = w.peak_prices();
                let lows = w.valley_prices();
                let support = mean(&lows);
                if max_of(&lows) - min_of(&lows) > support * self.flat_tolerance.get() {
                    return None;
                }
                let (first_high, last_high) = (highs[0], highs[highs.len() - 1]);
                if last_high >= first_high {
                    return None;
                }

                let confidence = capped_confidence(50.0 + 10.0 * lows.len() as f64, 75.0);
                Some(
                    input
                        .record(self.kind(), Direction::Bearish, confidence, w.start, w.end)
                        .with_key_points(input.swing_key_points(&w.valleys))
                        .with_support(support)
                        .with_resistance(first_high)
                        .with_target(support - (first_high - support)),
                )
            })
            .collect()
    }

    fn validate_config(&self) -> Result<()> {
        validate_window(self.window, self.step)
    }
}

// ============================================================
// SYMMETRICAL TRIANGLE
// ============================================================

/// Neutral: lower highs and higher lows converging on an apex
#[derive(Debug, Clone)]
pub struct SymmetricalTriangleDetector {
    pub window: Period,
    pub step: Period,
    /// Minimum contraction of both the highs and the lows
    pub convergence: Ratio,
}

impl Default for SymmetricalTriangleDetector {
    fn default() -> Self {
        Self {
            window: Period::new_const(30),
            step: Period::new_const(10),
            convergence: Ratio::new_const(0.03),
        }
    }
}

impl ChartPatternDetector for SymmetricalTriangleDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::SymmetricalTriangle
    }

    fn min_bars(&self) -> usize {
        self.window.get() + 1
    }

    fn detect(&self, input: &PatternInput<'_>) -> Vec<PatternRecord> {
        let c = self.convergence.get();
        swing_windows(input, self.window.get(), self.step.get())
            .into_iter()
            .filter_map(|w| {
                let highs = w.peak_prices();
                let lows = w.valley_prices();
                let last_high = highs[highs.len() - 1];
                let last_low = lows[lows.len() - 1];
                if last_high >= highs[0] * (1.0 - c) || last_low <= lows[0] * (1.0 + c) {
                    return None;
                }

                let touches = (highs.len() + lows.len()) as f64;
                let confidence = capped_confidence(45.0 + 5.0 * touches, 70.0);
                let mut points = w.peaks.clone();
                points.extend(w.valleys.iter().copied());
                Some(
                    input
                        .record(self.kind(), Direction::Neutral, confidence, w.start, w.end)
                        .with_key_points(input.swing_key_points(&points))
                        .with_resistance(highs[0])
                        .with_support(lows[0])
                        .with_apex((last_high + last_low) / 2.0),
                )
            })
            .collect()
    }

    fn validate_config(&self) -> Result<()> {
        validate_window(self.window, self.step)
    }
}

// ============================================================
// PARAMETERIZED DETECTOR IMPLEMENTATIONS
// ============================================================

static FLAT_TRIANGLE_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("window", 30.0, (20.0, 60.0, 10.0), "Bars per scan window"),
    ParamMeta::period("step", 10.0, (5.0, 20.0, 5.0), "Bars between window starts"),
    ParamMeta::ratio("flat_tolerance", 0.03, (0.01, 0.05, 0.01), "Maximum spread of the flat side"),
];

static SYMMETRICAL_TRIANGLE_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("window", 30.0, (20.0, 60.0, 10.0), "Bars per scan window"),
    ParamMeta::period("step", 10.0, (5.0, 20.0, 5.0), "Bars between window starts"),
    ParamMeta::ratio("convergence", 0.03, (0.01, 0.06, 0.01), "Minimum contraction of highs and lows"),
];

impl ParameterizedDetector for AscendingTriangleDetector {
    fn param_meta() -> &'static [ParamMeta] {
        FLAT_TRIANGLE_PARAMS
    }

    fn with_params(params: &ParamMap<'_>) -> Result<Self> {
        Ok(Self {
            window: period_param(params, "window", 30)?,
            step: period_param(params, "step", 10)?,
            flat_tolerance: ratio_param(params, "flat_tolerance", 0.03)?,
        })
    }
}

impl ParameterizedDetector for DescendingTriangleDetector {
    fn param_meta() -> &'static [ParamMeta] {
        FLAT_TRIANGLE_PARAMS
    }

    fn with_params(params: &ParamMap<'_>) -> Result<Self> {
        Ok(Self {
            window: period_param(params, "window", 30)?,
            step: period_param(params, "step", 10)?,
            flat_tolerance: ratio_param(params, "flat_tolerance", 0.03)?,
        })
    }
}

impl ParameterizedDetector for SymmetricalTriangleDetector {
    fn param_meta() -> &'static [ParamMeta] {
        SYMMETRICAL_TRIANGLE_PARAMS
    }

    fn with_params(params: &ParamMap<'_>) -> Result<Self> {
        Ok(Self {
            window: period_param(params, "window", 30)?,
            step: period_param(params, "step", 10)?,
            convergence: ratio_param(params, "convergence", 0.03)?,
        })
    }
}
