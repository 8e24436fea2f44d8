//! Chart pattern records, the detector trait and the pattern scanner
//!
//! Builtin detectors are dispatched through the [`BuiltinDetector`] enum;
//! user detectors go through `Box<dyn ChartPatternDetector>`. After detection
//! the scanner filters candidates and resolves overlaps.

use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize, Serializer};

use crate::detectors::*;
use crate::series::{Bar, Series};
use crate::swings::{detect_swings, SwingConfig, SwingPoint};
use crate::{AnalysisError, Direction, Ratio, Result};

// ============================================================
// PATTERN KIND
// ============================================================

/// Chart pattern family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    HeadAndShoulders,
    InverseHeadAndShoulders,
    DoubleTop,
    DoubleBottom,
    AscendingTriangle,
    DescendingTriangle,
    SymmetricalTriangle,
    CupAndHandle,
    FlatBase,
    SaucerBase,
    AscendingBase,
    /// Pattern produced by a user-supplied detector
    Custom(&'static str),
}

impl PatternKind {
    pub const BUILTIN: [PatternKind; 11] = [
        PatternKind::HeadAndShoulders,
        PatternKind::InverseHeadAndShoulders,
        PatternKind::DoubleTop,
        PatternKind::DoubleBottom,
        PatternKind::AscendingTriangle,
        PatternKind::DescendingTriangle,
        PatternKind::SymmetricalTriangle,
        PatternKind::CupAndHandle,
        PatternKind::FlatBase,
        PatternKind::SaucerBase,
        PatternKind::AscendingBase,
    ];

    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            PatternKind::HeadAndShoulders => "Head & Shoulders",
            PatternKind::InverseHeadAndShoulders => "Inverse Head & Shoulders",
            PatternKind::DoubleTop => "Double Top",
            PatternKind::DoubleBottom => "Double Bottom",
            PatternKind::AscendingTriangle => "Ascending Triangle",
            PatternKind::DescendingTriangle => "Descending Triangle",
            PatternKind::SymmetricalTriangle => "Symmetrical Triangle",
            PatternKind::CupAndHandle => "Cup & Handle",
            PatternKind::FlatBase => "Flat Base",
            PatternKind::SaucerBase => "Saucer Base",
            PatternKind::AscendingBase => "Ascending Base",
            PatternKind::Custom(name) => name,
        }
    }

    /// Stable identifier
    pub fn id(self) -> &'static str {
        match self {
            PatternKind::HeadAndShoulders => "HEAD_AND_SHOULDERS",
            PatternKind::InverseHeadAndShoulders => "INVERSE_HEAD_AND_SHOULDERS",
            PatternKind::DoubleTop => "DOUBLE_TOP",
            PatternKind::DoubleBottom => "DOUBLE_BOTTOM",
            PatternKind::AscendingTriangle => "ASCENDING_TRIANGLE",
            PatternKind::DescendingTriangle => "DESCENDING_TRIANGLE",
            PatternKind::SymmetricalTriangle => "SYMMETRICAL_TRIANGLE",
            PatternKind::CupAndHandle => "CUP_AND_HANDLE",
            PatternKind::FlatBase => "FLAT_BASE",
            PatternKind::SaucerBase => "SAUCER_BASE",
            PatternKind::AscendingBase => "ASCENDING_BASE",
            PatternKind::Custom(name) => name,
        }
    }

    /// Triangles always survive overlap resolution
    #[inline]
    pub fn is_triangle(self) -> bool {
        matches!(
            self,
            PatternKind::AscendingTriangle
                | PatternKind::DescendingTriangle
                | PatternKind::SymmetricalTriangle
        )
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for PatternKind {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for PatternKind {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        PatternKind::BUILTIN
            .into_iter()
            .find(|k| k.name() == s || k.id() == s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown pattern kind: {s}")))
    }
}

// ============================================================
// PATTERN RECORD
// ============================================================

/// A labelled point of a pattern (shoulder, head, trough, ...)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KeyPoint {
    pub index: usize,
    pub date: NaiveDate,
    pub price: f64,
}

/// A detected chart pattern
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternRecord {
    pub kind: PatternKind,
    pub direction: Direction,
    /// Heuristic confidence, 0..=100
    pub confidence: f64,
    pub start_idx: usize,
    pub end_idx: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub key_points: Vec<KeyPoint>,
    pub neckline: Option<f64>,
    pub support: Option<f64>,
    pub resistance: Option<f64>,
    pub apex: Option<f64>,
    pub depth_pct: Option<f64>,
    pub target_price: Option<f64>,
}

impl PatternRecord {
    /// Bars spanned, as used by overlap resolution
    #[inline]
    pub fn span(&self) -> usize {
        self.end_idx - self.start_idx
    }

    pub fn with_key_points(mut self, key_points: Vec<KeyPoint>) -> Self {
        self.key_points = key_points;
        self
    }

    pub fn with_neckline(mut self, value: f64) -> Self {
        self.neckline = Some(value);
        self
    }

    pub fn with_support(mut self, value: f64) -> Self {
        self.support = Some(value);
        self
    }

    pub fn with_resistance(mut self, value: f64) -> Self {
        self.resistance = Some(value);
        self
    }

    pub fn with_apex(mut self, value: f64) -> Self {
        self.apex = Some(value);
        self
    }

    pub fn with_depth_pct(mut self, value: f64) -> Self {
        self.depth_pct = Some(value);
        self
    }

    pub fn with_target(mut self, value: f64) -> Self {
        self.target_price = Some(value);
        self
    }
}

// ============================================================
// DETECTOR INPUT
// ============================================================

/// Split-adjusted bars plus their swing points, shared by every detector
#[derive(Debug, Clone)]
pub struct PatternInput<'a> {
    bars: &'a [Bar],
    closes: Vec<f64>,
    swings: &'a [SwingPoint],
}

impl<'a> PatternInput<'a> {
    /// Swing points must be in index order and refer to bars of `bars`
    pub fn new(bars: &'a [Bar], swings: &'a [SwingPoint]) -> Result<Self> {
        if let Some(last) = swings.iter().map(|s| s.index).max() {
            if last >= bars.len() {
                return Err(AnalysisError::LengthMismatch {
                    left: last + 1,
                    right: bars.len(),
                });
            }
        }
        if swings.windows(2).any(|w| w[0].index >= w[1].index) {
            return Err(AnalysisError::InvalidValue(
                "swing points must be in strictly increasing index order",
            ));
        }
        Ok(Self {
            bars,
            closes: bars.iter().map(|b| b.close).collect(),
            swings,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    #[inline]
    pub fn bars(&self) -> &[Bar] {
        self.bars
    }

    #[inline]
    pub fn closes(&self) -> &[f64] {
        &self.closes
    }

    #[inline]
    pub fn date(&self, index: usize) -> NaiveDate {
        self.bars[index].date
    }

    #[inline]
    pub fn swings(&self) -> &[SwingPoint] {
        self.swings
    }

    pub fn peaks(&self) -> Vec<&SwingPoint> {
        self.swings.iter().filter(|s| s.is_peak()).collect()
    }

    pub fn valleys(&self) -> Vec<&SwingPoint> {
        self.swings.iter().filter(|s| s.is_valley()).collect()
    }

    /// Swing points with `start <= index < end`
    pub fn swings_in(&self, start: usize, end: usize) -> &[SwingPoint] {
        let lo = self.swings.partition_point(|s| s.index < start);
        let hi = self.swings.partition_point(|s| s.index < end);
        &self.swings[lo..hi.max(lo)]
    }

    #[inline]
    pub fn key_point(&self, index: usize, price: f64) -> KeyPoint {
        KeyPoint {
            index,
            date: self.date(index),
            price,
        }
    }

    pub fn swing_key_points(&self, points: &[&SwingPoint]) -> Vec<KeyPoint> {
        points
            .iter()
            .map(|p| self.key_point(p.index, p.price))
            .collect()
    }

    /// Bare record spanning `start..=end`; detectors add the shape fields
    pub fn record(
        &self,
        kind: PatternKind,
        direction: Direction,
        confidence: f64,
        start: usize,
        end: usize,
    ) -> PatternRecord {
        PatternRecord {
            kind,
            direction,
            confidence,
            start_idx: start,
            end_idx: end,
            start_date: self.date(start),
            end_date: self.date(end),
            key_points: Vec::new(),
            neckline: None,
            support: None,
            resistance: None,
            apex: None,
            depth_pct: None,
            target_price: None,
        }
    }
}

// ============================================================
// DETECTOR TRAIT
// ============================================================

/// Shared capability of every chart pattern detector
pub trait ChartPatternDetector: Send + Sync {
    fn kind(&self) -> PatternKind;

    /// Fewest bars on which the detector can match anything
    fn min_bars(&self) -> usize;

    fn detect(&self, input: &PatternInput<'_>) -> Vec<PatternRecord>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================
// BUILTIN DETECTOR ENUM (generated)
// ============================================================

macro_rules! define_builtin_detectors {
    (
        $(
            $variant:ident($detector:ty)
        ),* $(,)?
    ) => {
        /// All builtin detectors - fast path via enum dispatch
        #[derive(Debug, Clone)]
        pub enum BuiltinDetector {
            $($variant($detector)),*
        }

        impl BuiltinDetector {
            #[inline]
            pub fn detect(&self, input: &PatternInput<'_>) -> Vec<PatternRecord> {
                match self {
                    $(Self::$variant(d) => ChartPatternDetector::detect(d, input)),*
                }
            }

            #[inline]
            pub fn kind(&self) -> PatternKind {
                match self {
                    $(Self::$variant(d) => ChartPatternDetector::kind(d)),*
                }
            }

            #[inline]
            pub fn min_bars(&self) -> usize {
                match self {
                    $(Self::$variant(d) => ChartPatternDetector::min_bars(d)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(d) => ChartPatternDetector::validate_config(d)),*
                }
            }
        }

        $(
            impl From<$detector> for BuiltinDetector {
                fn from(d: $detector) -> Self {
                    Self::$variant(d)
                }
            }
        )*
    };
}

define_builtin_detectors! {
    // Reversal (4)
    HeadAndShoulders(HeadAndShouldersDetector),
    InverseHeadAndShoulders(InverseHeadAndShouldersDetector),
    DoubleTop(DoubleTopDetector),
    DoubleBottom(DoubleBottomDetector),

    // Triangles (3)
    AscendingTriangle(AscendingTriangleDetector),
    DescendingTriangle(DescendingTriangleDetector),
    SymmetricalTriangle(SymmetricalTriangleDetector),

    // Bases (4)
    CupAndHandle(CupAndHandleDetector),
    FlatBase(FlatBaseDetector),
    SaucerBase(SaucerBaseDetector),
    AscendingBase(AscendingBaseDetector),
}

// ============================================================
// OVERLAP RESOLUTION
// ============================================================

/// True when the shared span exceeds `max_overlap` of either record's span
fn overlaps_too_much(a: &PatternRecord, b: &PatternRecord, max_overlap: f64) -> bool {
    let start = a.start_idx.max(b.start_idx);
    let end = a.end_idx.min(b.end_idx);
    if end <= start {
        return false;
    }
    let shared = (end - start) as f64;
    shared / a.span() as f64 > max_overlap || shared / b.span() as f64 > max_overlap
}

/// Keep every triangle, then greedily accept the remaining records by
/// (end index, confidence) descending when they do not overlap an accepted
/// record by more than `max_overlap` of either span. Output is sorted by start.
pub fn resolve_overlaps(records: Vec<PatternRecord>, max_overlap: f64) -> Vec<PatternRecord> {
    let (mut selected, mut others): (Vec<_>, Vec<_>) =
        records.into_iter().partition(|r| r.kind.is_triangle());
    debug!(
        "resolving overlaps: {} triangles kept, {} candidates",
        selected.len(),
        others.len()
    );

    others.sort_by(|a, b| {
        b.end_idx
            .cmp(&a.end_idx)
            .then(b.confidence.total_cmp(&a.confidence))
    });

    for candidate in others {
        match selected
            .iter()
            .find(|s| overlaps_too_much(&candidate, s, max_overlap))
        {
            Some(blocker) => debug!(
                "dropped {} [{}..{}]: overlaps {} [{}..{}]",
                candidate.kind,
                candidate.start_idx,
                candidate.end_idx,
                blocker.kind,
                blocker.start_idx,
                blocker.end_idx
            ),
            None => selected.push(candidate),
        }
    }

    selected.sort_by_key(|r| r.start_idx);
    selected
}

// ============================================================
// SCANNER
// ============================================================

/// Candidate filtering and overlap resolution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Drop records below this confidence
    pub min_confidence: Option<f64>,
    /// Keep only these pattern kinds
    pub pattern_filter: Option<HashSet<PatternKind>>,
    pub resolve_overlaps: bool,
    /// Largest tolerated overlap, as a fraction of either span
    pub max_overlap: Ratio,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            min_confidence: None,
            pattern_filter: None,
            resolve_overlaps: true,
            max_overlap: Ratio::new_const(0.4),
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(min) = self.min_confidence {
            if !(0.0..=100.0).contains(&min) {
                return Err(AnalysisError::OutOfRange {
                    field: "min_confidence",
                    value: min,
                    min: 0.0,
                    max: 100.0,
                });
            }
        }
        Ok(())
    }
}

/// Runs a set of detectors over one series
pub struct PatternScanner {
    builtin: Vec<BuiltinDetector>,
    custom: Vec<Box<dyn ChartPatternDetector>>,
    config: ScanConfig,
}

impl PatternScanner {
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn detector_count(&self) -> usize {
        self.builtin.len() + self.custom.len()
    }

    /// Detect patterns on `series` using its precomputed swing points
    pub fn scan(&self, series: &Series, swings: &[SwingPoint]) -> Result<Vec<PatternRecord>> {
        let input = PatternInput::new(series.bars(), swings)?;
        let n = input.len();

        let mut records = Vec::new();
        for detector in &self.builtin {
            if n >= detector.min_bars() {
                records.extend(detector.detect(&input));
            }
        }
        for detector in &self.custom {
            if n >= detector.min_bars() {
                records.extend(detector.detect(&input));
            }
        }
        records.retain(|r| self.should_include(r));
        debug!("{} pattern candidates on {} bars", records.len(), n);

        if self.config.resolve_overlaps {
            Ok(resolve_overlaps(records, self.config.max_overlap.get()))
        } else {
            records.sort_by_key(|r| r.start_idx);
            Ok(records)
        }
    }

    /// Detect swings with `swing_cfg`, then scan
    pub fn scan_series(&self, series: &Series, swing_cfg: &SwingConfig) -> Result<Vec<PatternRecord>> {
        let swings = detect_swings(series.bars(), swing_cfg);
        self.scan(series, &swings.points)
    }

    fn should_include(&self, r: &PatternRecord) -> bool {
        if let Some(min) = self.config.min_confidence {
            if r.confidence < min {
                return false;
            }
        }
        if let Some(ref filter) = self.config.pattern_filter {
            if !filter.contains(&r.kind) {
                return false;
            }
        }
        true
    }

    fn validate(&self) -> Result<()> {
        self.config.validate()?;
        for d in &self.builtin {
            d.validate_config()?;
        }
        for d in &self.custom {
            d.validate_config()?;
        }
        Ok(())
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating PatternScanner instances
#[derive(Default)]
pub struct PatternScannerBuilder {
    builtin: Vec<BuiltinDetector>,
    custom: Vec<Box<dyn ChartPatternDetector>>,
    config: ScanConfig,
}

/// Generate an array of `BuiltinDetector` variants using `Default::default()` for each inner type.
macro_rules! builtin_defaults {
  ($($variant:ident),* $(,)?) => {
    [$(BuiltinDetector::$variant(Default::default())),*]
  };
}

impl PatternScannerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add all builtin detectors with default configurations
    pub fn with_all_defaults(self) -> Self {
        self.with_reversal_defaults()
            .with_triangle_defaults()
            .with_base_defaults()
    }

    /// Head & shoulders (both) and double top/bottom (4)
    pub fn with_reversal_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![
            HeadAndShoulders,
            InverseHeadAndShoulders,
            DoubleTop,
            DoubleBottom,
        ]);
        self
    }

    /// Ascending, descending and symmetrical triangles (3)
    pub fn with_triangle_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![
            AscendingTriangle,
            DescendingTriangle,
            SymmetricalTriangle,
        ]);
        self
    }

    /// Cup & handle and the flat, saucer and ascending bases (4)
    pub fn with_base_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![
            CupAndHandle,
            FlatBase,
            SaucerBase,
            AscendingBase,
        ]);
        self
    }

    /// Add a builtin detector
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, detector: impl Into<BuiltinDetector>) -> Self {
        self.builtin.push(detector.into());
        self
    }

    /// Add with config validation
    pub fn add_checked(mut self, detector: impl Into<BuiltinDetector>) -> Result<Self> {
        let detector = detector.into();
        detector.validate_config()?;
        self.builtin.push(detector);
        Ok(self)
    }

    /// Add a custom detector (slow path)
    pub fn add_custom<D: ChartPatternDetector + 'static>(mut self, detector: D) -> Self {
        self.custom.push(Box::new(detector));
        self
    }

    /// Set minimum confidence filter
    pub fn min_confidence(mut self, confidence: f64) -> Self {
        self.config.min_confidence = Some(confidence);
        self
    }

    /// Filter to specific patterns only
    pub fn only_patterns(mut self, kinds: impl IntoIterator<Item = PatternKind>) -> Self {
        self.config.pattern_filter = Some(kinds.into_iter().collect());
        self
    }

    /// Enable/disable overlap resolution
    pub fn resolve_overlaps(mut self, enable: bool) -> Self {
        self.config.resolve_overlaps = enable;
        self
    }

    pub fn max_overlap(mut self, fraction: Ratio) -> Self {
        self.config.max_overlap = fraction;
        self
    }

    /// Replace the whole scan configuration
    pub fn config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    pub fn scan_config(&self) -> &ScanConfig {
        &self.config
    }

    /// Build the scanner
    pub fn build(self) -> Result<PatternScanner> {
        let scanner = PatternScanner {
            builtin: self.builtin,
            custom: self.custom,
            config: self.config,
        };
        scanner.validate()?;
        Ok(scanner)
    }
}

// ============================================================
// TESTS
// ============================================================
