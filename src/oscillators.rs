//! Moving averages and momentum oscillators
//!
//! All column outputs are `Vec<Option<f64>>` aligned with the input closes.
//! A value is `None` until its indicator has warmed up; nothing is back-filled.

use serde::{Deserialize, Serialize};

use crate::{AnalysisError, OHLCVExt, Period, Result, OHLCV};

// ============================================================
// CONFIG
// ============================================================

/// Spans for every moving average and oscillator used by the classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscillatorConfig {
    /// Fastest EMA, crosses the short EMA for Neutral Buy/Sell (3)
    pub ema_fast: Period,
    /// Short EMA (9)
    pub ema_short: Period,
    /// Mid EMA (20)
    pub ema_mid: Period,
    /// Long EMA (34)
    pub ema_long: Period,
    /// Chart-only EMAs (50, 200)
    pub ema_chart_fast: Period,
    pub ema_chart_slow: Period,
    pub ppo_fast: Period,
    pub ppo_slow: Period,
    pub ppo_signal: Period,
    pub pmo_smooth1: Period,
    pub pmo_smooth2: Period,
    pub pmo_signal: Period,
    /// Rows back used by the rising/declining slope flags (3)
    pub slope_lookback: Period,
    pub atr_period: Period,
}

impl Default for OscillatorConfig {
    fn default() -> Self {
        Self {
            ema_fast: Period::new_const(3),
            ema_short: Period::new_const(9),
            ema_mid: Period::new_const(20),
            ema_long: Period::new_const(34),
            ema_chart_fast: Period::new_const(50),
            ema_chart_slow: Period::new_const(200),
            ppo_fast: Period::new_const(12),
            ppo_slow: Period::new_const(26),
            ppo_signal: Period::new_const(9),
            pmo_smooth1: Period::new_const(35),
            pmo_smooth2: Period::new_const(20),
            pmo_signal: Period::new_const(10),
            slope_lookback: Period::new_const(3),
            atr_period: Period::new_const(14),
        }
    }
}

impl OscillatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ppo_fast >= self.ppo_slow {
            return Err(AnalysisError::InvalidConfig(format!(
                "ppo_fast ({}) must be shorter than ppo_slow ({})",
                self.ppo_fast.get(),
                self.ppo_slow.get()
            )));
        }
        if self.ema_fast >= self.ema_short {
            return Err(AnalysisError::InvalidConfig(format!(
                "ema_fast ({}) must be shorter than ema_short ({})",
                self.ema_fast.get(),
                self.ema_short.get()
            )));
        }
        if self.ema_short >= self.ema_mid || self.ema_mid >= self.ema_long {
            return Err(AnalysisError::InvalidConfig(
                "classifier EMA spans must increase: short < mid < long".into(),
            ));
        }
        Ok(())
    }

    /// First row at which PPO and PMO columns are reported
    pub fn warmup(&self) -> usize {
        self.ema_long.get().max(self.ppo_slow.get()) - 1
    }

    /// First row at which a stage 2 or stage 3 label can be assigned
    pub fn stage_start(&self) -> usize {
        self.warmup() + 1
    }
}

// ============================================================
// PRIMITIVES
// ============================================================

/// Recursive EMA with alpha = 2/(span+1), seeded by the first value
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &v in values {
        let next = match prev {
            Some(p) => alpha * v + (1.0 - alpha) * p,
            None => v,
        };
        out.push(next);
        prev = Some(next);
    }
    out
}

/// EMA over a column with undefined entries. Seeds on the first defined value;
/// an undefined input carries the previous average forward without updating it.
pub fn ema_sparse(values: &[Option<f64>], span: usize) -> Vec<Option<f64>> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for v in values {
        let next = match (*v, prev) {
            (Some(v), Some(p)) => Some(alpha * v + (1.0 - alpha) * p),
            (Some(v), None) => Some(v),
            (None, p) => p,
        };
        out.push(next);
        prev = next;
    }
    out
}

/// Percentage Price Oscillator
#[derive(Debug, Clone, Default)]
pub struct Ppo {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// PPO = (EMA_fast - EMA_slow) / EMA_slow * 100, signal = EMA(PPO, signal)
pub fn ppo(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Ppo {
    let ema_fast = ema(closes, fast);
    let ema_slow = ema(closes, slow);
    let line: Vec<f64> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| (f - s) / s * 100.0)
        .collect();
    let signal = ema(&line, signal);
    let histogram = line.iter().zip(&signal).map(|(l, s)| l - s).collect();
    Ppo {
        line,
        signal,
        histogram,
    }
}

/// Price Momentum Oscillator
#[derive(Debug, Clone, Default)]
pub struct Pmo {
    pub line: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
}

/// PMO = EMA(EMA(ROC, smooth1), smooth2) * 10, signal = EMA(PMO, signal).
/// ROC is the one-bar percent change, undefined on the first bar.
pub fn pmo(closes: &[f64], smooth1: usize, smooth2: usize, signal: usize) -> Pmo {
    let roc: Vec<Option<f64>> = (0..closes.len())
        .map(|i| (i > 0).then(|| (closes[i] / closes[i - 1] - 1.0) * 100.0))
        .collect();
    let line: Vec<Option<f64>> = ema_sparse(&ema_sparse(&roc, smooth1), smooth2)
        .into_iter()
        .map(|v| v.map(|v| v * 10.0))
        .collect();
    let signal = ema_sparse(&line, signal);
    Pmo { line, signal }
}

/// Average true range: rolling mean of true range over `period` bars
pub fn atr<T: OHLCV>(bars: &[T], period: usize) -> Vec<Option<f64>> {
    let tr: Vec<f64> = bars
        .iter()
        .enumerate()
        .map(|(i, b)| b.true_range((i > 0).then(|| bars[i - 1].close())))
        .collect();
    rolling_mean(&tr, period)
}

/// Simple rolling mean, undefined until `period` values are available
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for i in 0..values.len() {
        sum += values[i];
        if i >= period {
            sum -= values[i - period];
        }
        out.push((i + 1 >= period).then_some(sum / period as f64));
    }
    out
}

// ============================================================
// SLOPE & CROSS FLAGS
// ============================================================

/// `values[i]` strictly above the value `n` rows earlier
#[inline]
pub fn rising(values: &[Option<f64>], i: usize, n: usize) -> bool {
    match pair(values, i, n) {
        Some((now, then)) => now > then,
        None => false,
    }
}

/// `values[i]` not above the value `n` rows earlier: the complement of
/// [`rising`] whenever both values are defined
#[inline]
pub fn declining(values: &[Option<f64>], i: usize, n: usize) -> bool {
    match pair(values, i, n) {
        Some((now, then)) => now <= then,
        None => false,
    }
}

fn pair(values: &[Option<f64>], i: usize, n: usize) -> Option<(f64, f64)> {
    if i < n {
        return None;
    }
    Some(((*values.get(i)?)?, (*values.get(i - n)?)?))
}

/// `a` moves from at-or-below `b` on row i-1 to strictly above on row i
#[inline]
pub fn cross_above(a: &[Option<f64>], b: &[Option<f64>], i: usize) -> bool {
    match cross_values(a, b, i) {
        Some((a0, b0, a1, b1)) => a0 <= b0 && a1 > b1,
        None => false,
    }
}

/// `a` moves from at-or-above `b` on row i-1 to strictly below on row i
#[inline]
pub fn cross_below(a: &[Option<f64>], b: &[Option<f64>], i: usize) -> bool {
    match cross_values(a, b, i) {
        Some((a0, b0, a1, b1)) => a0 >= b0 && a1 < b1,
        None => false,
    }
}

fn cross_values(a: &[Option<f64>], b: &[Option<f64>], i: usize) -> Option<(f64, f64, f64, f64)> {
    if i == 0 {
        return None;
    }
    Some((
        (*a.get(i - 1)?)?,
        (*b.get(i - 1)?)?,
        (*a.get(i)?)?,
        (*b.get(i)?)?,
    ))
}

// ============================================================
// OSCILLATOR TABLE
// ============================================================

/// Every indicator column the classifier and report need.
///
/// Columns are computed from the first bar so slopes near the warm-up
/// boundary compare against real values; [`Oscillators::row`] applies the
/// warm-up when values are reported.
#[derive(Debug, Clone, Default)]
pub struct Oscillators {
    pub ema_fast: Vec<Option<f64>>,
    pub ema_short: Vec<Option<f64>>,
    pub ema_mid: Vec<Option<f64>>,
    pub ema_long: Vec<Option<f64>>,
    pub ema_chart_fast: Vec<Option<f64>>,
    pub ema_chart_slow: Vec<Option<f64>>,
    pub ppo: Vec<Option<f64>>,
    pub ppo_signal: Vec<Option<f64>>,
    pub ppo_histogram: Vec<Option<f64>>,
    pub pmo: Vec<Option<f64>>,
    pub pmo_signal: Vec<Option<f64>>,
    pub config: OscillatorConfig,
}

/// Oscillator values of one row as reported. An EMA is undefined before
/// `span - 1`, PPO and PMO before the warm-up.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OscillatorRow {
    pub ema_fast: Option<f64>,
    pub ema_short: Option<f64>,
    pub ema_mid: Option<f64>,
    pub ema_long: Option<f64>,
    pub ema_chart_fast: Option<f64>,
    pub ema_chart_slow: Option<f64>,
    pub ppo: Option<f64>,
    pub ppo_signal: Option<f64>,
    pub ppo_histogram: Option<f64>,
    pub pmo: Option<f64>,
    pub pmo_signal: Option<f64>,
}

impl Oscillators {
    pub fn compute(closes: &[f64], cfg: &OscillatorConfig) -> Self {
        let full_ema = |span: Period| -> Vec<Option<f64>> {
            ema(closes, span.get()).into_iter().map(Some).collect()
        };

        let ppo = ppo(
            closes,
            cfg.ppo_fast.get(),
            cfg.ppo_slow.get(),
            cfg.ppo_signal.get(),
        );
        let pmo = pmo(
            closes,
            cfg.pmo_smooth1.get(),
            cfg.pmo_smooth2.get(),
            cfg.pmo_signal.get(),
        );

        Self {
            ema_fast: full_ema(cfg.ema_fast),
            ema_short: full_ema(cfg.ema_short),
            ema_mid: full_ema(cfg.ema_mid),
            ema_long: full_ema(cfg.ema_long),
            ema_chart_fast: full_ema(cfg.ema_chart_fast),
            ema_chart_slow: full_ema(cfg.ema_chart_slow),
            ppo: ppo.line.into_iter().map(Some).collect(),
            ppo_signal: ppo.signal.into_iter().map(Some).collect(),
            ppo_histogram: ppo.histogram.into_iter().map(Some).collect(),
            pmo: pmo.line,
            pmo_signal: pmo.signal,
            config: cfg.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.ppo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ppo.is_empty()
    }

    /// Stage 2 and 3 tests hold only from this row on
    #[inline]
    pub fn stage_ready(&self, i: usize) -> bool {
        i >= self.config.stage_start()
    }

    #[inline]
    pub fn rising(&self, column: &[Option<f64>], i: usize) -> bool {
        rising(column, i, self.config.slope_lookback.get())
    }

    #[inline]
    pub fn declining(&self, column: &[Option<f64>], i: usize) -> bool {
        declining(column, i, self.config.slope_lookback.get())
    }

    /// Values of row `i` with the warm-up applied
    pub fn row(&self, i: usize) -> OscillatorRow {
        let cfg = &self.config;
        let warmup = cfg.warmup();
        let ema_at = |column: &[Option<f64>], span: Period| reported(column, i, span.get() - 1);
        OscillatorRow {
            ema_fast: ema_at(&self.ema_fast, cfg.ema_fast),
            ema_short: ema_at(&self.ema_short, cfg.ema_short),
            ema_mid: ema_at(&self.ema_mid, cfg.ema_mid),
            ema_long: ema_at(&self.ema_long, cfg.ema_long),
            ema_chart_fast: ema_at(&self.ema_chart_fast, cfg.ema_chart_fast),
            ema_chart_slow: ema_at(&self.ema_chart_slow, cfg.ema_chart_slow),
            ppo: reported(&self.ppo, i, warmup),
            ppo_signal: reported(&self.ppo_signal, i, warmup),
            ppo_histogram: reported(&self.ppo_histogram, i, warmup),
            pmo: reported(&self.pmo, i, warmup),
            pmo_signal: reported(&self.pmo_signal, i, warmup),
        }
    }
}

fn reported(column: &[Option<f64>], i: usize, first: usize) -> Option<f64> {
    if i < first {
        return None;
    }
    column.get(i).copied().flatten().filter(|v| v.is_finite())
}

// ============================================================
// TESTS
// ============================================================
