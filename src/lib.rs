//! # trendstage
//!
//! Trend-stage classification, trade levels and chart pattern detection for
//! OHLCV price series.
//!
//! The crate turns a validated [`Series`] (plus an optional market benchmark)
//! into an [`AnalysisReport`]: one [`EnrichedRow`] per bar carrying moving
//! averages, oscillators, a [`TrendLabel`], relative strength, swing flags,
//! buy point / buy zone / stop loss and buy/exit signals, plus a list of
//! detected [`PatternRecord`]s.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use trendstage::prelude::*;
//!
//! let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let bars: Vec<Bar> = (0..120)
//!     .map(|i| {
//!         let c = 100.0 * 1.01f64.powi(i);
//!         Bar::new(start + chrono::Duration::days(i as i64), c, c * 1.01, c * 0.99, c, 1e6)
//!     })
//!     .collect();
//! let series = Series::new(bars, TimeFrame::Daily).unwrap();
//!
//! let analyzer = AnalyzerBuilder::new().build().unwrap();
//! let report = analyzer.analyze(&series, None).unwrap();
//! assert_eq!(report.rows.len(), 120);
//! ```

pub mod detectors;
pub mod levels;
pub mod oscillators;
pub mod params;
pub mod patterns;
pub mod provider;
pub mod report;
pub mod series;
pub mod splits;
pub mod stage;
pub mod strength;
pub mod swings;

pub mod prelude {
    pub use crate::{
        // Detectors
        detectors::*,
        // Trade levels
        levels::{ExitReason, Signal, TradeLevel, TradeLevelConfig, ZoneState},
        // Oscillators
        oscillators::{OscillatorConfig, OscillatorRow, Oscillators},
        // Parameters
        params::{
            builtin_with_params, param_grid, param_meta_for, period_param, ratio_param, ParamMap,
            ParamMeta, ParamType, ParameterizedDetector,
        },
        // Patterns
        patterns::{
            resolve_overlaps, BuiltinDetector, ChartPatternDetector, KeyPoint, PatternInput,
            PatternKind, PatternRecord, PatternScanner, PatternScannerBuilder, ScanConfig,
        },
        // Data provider contract
        provider::{CacheKey, MarketDataProvider, SeriesCache, SeriesRequest},
        // Report
        report::{AnalysisReport, EnrichedRow, StatusSummary},
        // Parallel
        scan_parallel,
        // Series
        series::{Bar, Series, TimeFrame},
        // Splits
        splits::{SplitConfig, SplitEvent},
        // Stage
        stage::{Arrow, StageMarkers, TrendLabel},
        // Strength
        strength::StrengthConfig,
        // Swings
        swings::{SwingConfig, SwingKind, SwingPoint, Swings},
        // Pipeline
        AnalysisConfig,
        // Errors
        AnalysisError,
        Analyzer,
        AnalyzerBuilder,
        Direction,
        OHLCVExt,
        Period,
        Ratio,
        Result,
        ScanError,
        ScanResult,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors that can occur while validating input or configuring the pipeline.
///
/// Expected data sparsity (warm-up rows, missing benchmark, no swing point in
/// range, failed shape tests) is never reported through this type.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Insufficient data: need {need} bars, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Invalid bar at index {index}: {reason}")]
    InvalidBar { index: usize, reason: &'static str },

    #[error("Dates not strictly ascending at index {index}")]
    NonAscendingDates { index: usize },

    #[error("Length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("Data provider error: {0}")]
    Provider(String),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(AnalysisError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(AnalysisError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }

    /// Same value expressed in percent (0.05 -> 5.0)
    #[inline]
    pub fn as_percent(self) -> f64 {
        self.0 * 100.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(AnalysisError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn date(&self) -> chrono::NaiveDate;
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    /// True range against the previous close (plain range when there is none)
    #[inline]
    fn true_range(&self, prev_close: Option<f64>) -> f64 {
        match prev_close {
            Some(pc) => self
                .range()
                .max((self.high() - pc).abs())
                .max((self.low() - pc).abs()),
            None => self.range(),
        }
    }

    /// Chaikin money-flow multiplier in [-1, 1]. A zero range is treated as
    /// 0.0001 so flat bars contribute nothing instead of dividing by zero.
    #[inline]
    fn money_flow_multiplier(&self) -> f64 {
        let mut range = self.range();
        if range == 0.0 {
            range = 0.0001;
        }
        ((self.close() - self.low()) - (self.high() - self.close())) / range
    }

    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        let values = [
            self.open(),
            self.high(),
            self.low(),
            self.close(),
            self.volume(),
        ];
        if values.iter().any(|v| v.is_nan()) {
            return Err(AnalysisError::InvalidBar {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if values.iter().any(|v| v.is_infinite()) {
            return Err(AnalysisError::InvalidBar {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        if self.high() < self.low() {
            return Err(AnalysisError::InvalidBar {
                index: 0,
                reason: "high < low",
            });
        }
        if self.low() <= 0.0 {
            return Err(AnalysisError::InvalidBar {
                index: 0,
                reason: "non-positive price",
            });
        }
        if self.volume() < 0.0 {
            return Err(AnalysisError::InvalidBar {
                index: 0,
                reason: "negative volume",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

// ============================================================
// DIRECTION
// ============================================================

/// Directional bias of a trend label or pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Neutral,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }
}

// ============================================================
// ANALYZER
// ============================================================

use log::{debug, warn};
use patterns::{PatternScanner, PatternScannerBuilder, ScanConfig};
use report::{AnalysisReport, EnrichedRow};
use series::Series;

/// Full pipeline configuration. Every constant of the pipeline lives here so
/// it can be tuned or loaded from a file; defaults reproduce the classic rules.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub oscillators: oscillators::OscillatorConfig,
    pub swings: swings::SwingConfig,
    pub levels: levels::TradeLevelConfig,
    pub strength: strength::StrengthConfig,
    pub splits: splits::SplitConfig,
    pub patterns: ScanConfig,
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        self.oscillators.validate()?;
        self.swings.validate()?;
        self.levels.validate()?;
        self.strength.validate()?;
        self.splits.validate()?;
        self.patterns.validate()?;
        Ok(())
    }
}

/// Runs the whole pipeline over one instrument.
///
/// Each pass is a pure function of its inputs; the analyzer only wires them
/// together and assembles the rows.
pub struct Analyzer {
    config: AnalysisConfig,
    scanner: PatternScanner,
}

impl Analyzer {
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn scanner(&self) -> &PatternScanner {
        &self.scanner
    }

    /// Analyze `series`, scoring relative strength against `benchmark` when given.
    pub fn analyze(&self, series: &Series, benchmark: Option<&Series>) -> Result<AnalysisReport> {
        let cfg = &self.config;

        let (series, split_events) = if cfg.splits.enabled {
            splits::adjust_splits(series, &cfg.splits)
        } else {
            (series.clone(), Vec::new())
        };
        let benchmark = match benchmark {
            Some(b) if cfg.splits.enabled => Some(splits::adjust_splits(b, &cfg.splits).0),
            Some(b) => Some(b.clone()),
            None => {
                warn!(
                    "no benchmark for {}: relative strength falls back to neutral",
                    series.symbol().unwrap_or("<unnamed>")
                );
                None
            }
        };

        let bars = series.bars();
        let closes = series.closes();

        let osc = oscillators::Oscillators::compute(&closes, &cfg.oscillators);
        let atr = oscillators::atr(bars, cfg.oscillators.atr_period.get());
        debug!("oscillators computed for {} bars", bars.len());

        let swings = swings::detect_swings(bars, &cfg.swings);
        let labels = stage::classify_all(&osc);

        let rs = strength::relative_strength(&series, benchmark.as_ref(), &cfg.strength)?;
        let ad = strength::accumulation_distribution(bars, series.timeframe());

        let zones = levels::zone_states(bars, &swings, &cfg.levels);
        let signals = levels::signals(bars, &labels, &zones)?;
        let markers = stage::markers(&labels, &zones, &rs, &ad, &cfg.strength);
        debug!(
            "{} swing points, {} buy signals",
            swings.points.len(),
            signals.iter().filter(|s| s.buy).count()
        );

        let patterns = self.scanner.scan(&series, &swings.points)?;

        let rows = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| {
                EnrichedRow::assemble(
                    i,
                    bar,
                    &osc,
                    atr[i],
                    labels[i],
                    &markers[i],
                    rs[i],
                    ad[i],
                    &swings,
                    &zones[i],
                    &signals[i],
                )
            })
            .collect();

        Ok(AnalysisReport {
            symbol: series.symbol().map(str::to_string),
            timeframe: series.timeframe(),
            splits: split_events,
            rows,
            patterns,
        })
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating Analyzer instances
pub struct AnalyzerBuilder {
    config: AnalysisConfig,
    scanner: PatternScannerBuilder,
}

impl Default for AnalyzerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyzerBuilder {
    /// Default configuration with every builtin pattern detector
    pub fn new() -> Self {
        Self {
            config: AnalysisConfig::default(),
            scanner: PatternScannerBuilder::new().with_all_defaults(),
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    pub fn oscillators(mut self, config: oscillators::OscillatorConfig) -> Self {
        self.config.oscillators = config;
        self
    }

    pub fn swings(mut self, config: swings::SwingConfig) -> Self {
        self.config.swings = config;
        self
    }

    pub fn levels(mut self, config: levels::TradeLevelConfig) -> Self {
        self.config.levels = config;
        self
    }

    pub fn strength(mut self, config: strength::StrengthConfig) -> Self {
        self.config.strength = config;
        self
    }

    /// Enable/disable split detection and back-adjustment
    pub fn split_adjustment(mut self, enable: bool) -> Self {
        self.config.splits.enabled = enable;
        self
    }

    /// Use a custom set of pattern detectors; its scan settings replace
    /// `config.patterns`
    pub fn pattern_scanner(mut self, scanner: PatternScannerBuilder) -> Self {
        self.config.patterns = scanner.scan_config().clone();
        self.scanner = scanner;
        self
    }

    /// Skip chart pattern detection entirely
    pub fn without_patterns(mut self) -> Self {
        self.scanner = PatternScannerBuilder::new();
        self
    }

    /// Build the analyzer
    pub fn build(self) -> Result<Analyzer> {
        self.config.validate()?;
        let scanner = self.scanner.config(self.config.patterns.clone()).build()?;
        Ok(Analyzer {
            config: self.config,
            scanner,
        })
    }
}

// ============================================================
// PARALLEL SCANNING
// ============================================================

use rayon::prelude::*;

/// Result of analyzing a single instrument
#[derive(Debug)]
pub struct ScanResult {
    pub symbol: String,
    pub report: AnalysisReport,
}

/// Error from analyzing a single instrument
#[derive(Debug)]
pub struct ScanError {
    pub symbol: String,
    pub error: AnalysisError,
}

/// Parallel analysis of multiple instruments sharing one benchmark series
pub fn scan_parallel<'a, I>(
    analyzer: &Analyzer,
    instruments: I,
    benchmark: Option<&Series>,
) -> (Vec<ScanResult>, Vec<ScanError>)
where
    I: IntoParallelIterator<Item = (&'a str, &'a Series)>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, series)| {
            analyzer
                .analyze(series, benchmark)
                .map(|report| ScanResult {
                    symbol: symbol.to_string(),
                    report,
                })
                .map_err(|error| ScanError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================
