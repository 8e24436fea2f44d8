//! Bar series model: validated, date-ascending OHLCV bars plus weekly
//! aggregation.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{AnalysisError, OHLCVExt, Result, OHLCV};

// ============================================================
// BAR
// ============================================================

/// One OHLCV bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Copy any OHLCV value into a plain bar
    pub fn from_ohlcv<T: OHLCV>(bar: &T) -> Self {
        Self::new(
            bar.date(),
            bar.open(),
            bar.high(),
            bar.low(),
            bar.close(),
            bar.volume(),
        )
    }
}

impl OHLCV for Bar {
    fn date(&self) -> NaiveDate {
        self.date
    }
    fn open(&self) -> f64 {
        self.open
    }
    fn high(&self) -> f64 {
        self.high
    }
    fn low(&self) -> f64 {
        self.low
    }
    fn close(&self) -> f64 {
        self.close
    }
    fn volume(&self) -> f64 {
        self.volume
    }
}

// ============================================================
// TIME FRAME
// ============================================================

/// Bar spacing. Selects the relative-strength horizons and the
/// accumulation/distribution ranking window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFrame {
    #[default]
    Daily,
    Weekly,
}

impl TimeFrame {
    /// Bars per (1 month, 3 months, 6 months, 12 months)
    pub fn rs_horizons(self) -> [usize; 4] {
        match self {
            TimeFrame::Daily => [21, 63, 126, 252],
            TimeFrame::Weekly => [4, 13, 26, 52],
        }
    }

    /// Rolling window used to rank the accumulation/distribution line
    pub fn ad_window(self) -> usize {
        match self {
            TimeFrame::Daily => 252,
            TimeFrame::Weekly => 52,
        }
    }

    /// Provider interval code
    pub fn interval(self) -> &'static str {
        match self {
            TimeFrame::Daily => "1d",
            TimeFrame::Weekly => "1wk",
        }
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TimeFrame::Daily => "daily",
            TimeFrame::Weekly => "weekly",
        })
    }
}

impl FromStr for TimeFrame {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "daily" | "1d" | "d" => Ok(TimeFrame::Daily),
            "weekly" | "1wk" | "w" => Ok(TimeFrame::Weekly),
            _ => Err(AnalysisError::InvalidConfig(format!(
                "unknown time frame: {s}"
            ))),
        }
    }
}

// ============================================================
// SERIES
// ============================================================

/// Date-ascending bar series for one instrument.
///
/// Construction validates every bar, so downstream passes can assume finite
/// prices, `high >= low` and strictly increasing dates. Gaps are allowed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    symbol: Option<String>,
    timeframe: TimeFrame,
    bars: Vec<Bar>,
}

impl Series {
    pub fn new(bars: Vec<Bar>, timeframe: TimeFrame) -> Result<Self> {
        validate_bars(&bars)?;
        Ok(Self {
            symbol: None,
            timeframe,
            bars,
        })
    }

    /// Build from any OHLCV slice
    pub fn from_ohlcv<T: OHLCV>(bars: &[T], timeframe: TimeFrame) -> Result<Self> {
        Self::new(bars.iter().map(Bar::from_ohlcv).collect(), timeframe)
    }

    /// Bars already known to be valid (split adjustment, weekly aggregation)
    pub(crate) fn from_validated(
        symbol: Option<String>,
        timeframe: TimeFrame,
        bars: Vec<Bar>,
    ) -> Self {
        Self {
            symbol,
            timeframe,
            bars,
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn symbol(&self) -> Option<&str> {
        self.symbol.as_deref()
    }

    pub fn timeframe(&self) -> TimeFrame {
        self.timeframe
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|b| b.date).collect()
    }

    /// Aggregate into ISO weeks (Monday..Sunday). Each weekly bar takes the
    /// first open, max high, min low, last close and summed volume, and is
    /// dated on the Sunday closing its week. A weekly series is returned as is.
    pub fn to_weekly(&self) -> Series {
        if self.timeframe == TimeFrame::Weekly {
            return self.clone();
        }

        let mut weekly: Vec<Bar> = Vec::new();
        let mut current_week = None;

        for bar in &self.bars {
            let week = bar.date.iso_week();
            let key = (week.year(), week.week());
            if current_week == Some(key) {
                if let Some(w) = weekly.last_mut() {
                    w.high = w.high.max(bar.high);
                    w.low = w.low.min(bar.low);
                    w.close = bar.close;
                    w.volume += bar.volume;
                }
            } else {
                current_week = Some(key);
                weekly.push(Bar {
                    date: week_ending(bar.date),
                    ..*bar
                });
            }
        }

        Series::from_validated(self.symbol.clone(), TimeFrame::Weekly, weekly)
    }
}

/// Sunday of the ISO week containing `date`
fn week_ending(date: NaiveDate) -> NaiveDate {
    let offset = 6 - date.weekday().num_days_from_monday();
    date.checked_add_days(chrono::Days::new(u64::from(offset)))
        .unwrap_or(date)
}

impl<'de> Deserialize<'de> for Series {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            #[serde(default)]
            symbol: Option<String>,
            #[serde(default)]
            timeframe: TimeFrame,
            bars: Vec<Bar>,
        }

        let raw = Raw::deserialize(d)?;
        let series = Series::new(raw.bars, raw.timeframe).map_err(serde::de::Error::custom)?;
        Ok(match raw.symbol {
            Some(s) => series.with_symbol(s),
            None => series,
        })
    }
}

/// Validate bar consistency and strictly ascending dates
pub fn validate_bars(bars: &[Bar]) -> Result<()> {
    for (i, bar) in bars.iter().enumerate() {
        bar.validate().map_err(|e| match e {
            AnalysisError::InvalidBar { reason, .. } => AnalysisError::InvalidBar { index: i, reason },
            other => other,
        })?;
        if i > 0 && bars[i - 1].date >= bar.date {
            return Err(AnalysisError::NonAscendingDates { index: i });
        }
    }
    Ok(())
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn bar(date: NaiveDate, c: f64) -> Bar {
        Bar::new(date, c, c + 1.0, c - 1.0, c, 100.0)
    }

    #[test]
    fn test_rejects_descending_dates() {
        let bars = vec![bar(d(2024, 1, 3), 10.0), bar(d(2024, 1, 2), 10.0)];
        match Series::new(bars, TimeFrame::Daily) {
            Err(AnalysisError::NonAscendingDates { index }) => assert_eq!(index, 1),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_duplicate_dates() {
        let bars = vec![bar(d(2024, 1, 2), 10.0), bar(d(2024, 1, 2), 11.0)];
        assert!(Series::new(bars, TimeFrame::Daily).is_err());
    }

    #[test]
    fn test_rejects_bad_bar_with_index() {
        let mut bad = bar(d(2024, 1, 3), 10.0);
        bad.high = 5.0;
        let bars = vec![bar(d(2024, 1, 2), 10.0), bad];
        match Series::new(bars, TimeFrame::Daily) {
            Err(AnalysisError::InvalidBar { index, reason }) => {
                assert_eq!(index, 1);
                assert_eq!(reason, "high < low");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_nan() {
        let mut bad = bar(d(2024, 1, 2), 10.0);
        bad.close = f64::NAN;
        assert!(Series::new(vec![bad], TimeFrame::Daily).is_err());
    }

    #[test]
    fn test_gaps_allowed() {
        let bars = vec![bar(d(2024, 1, 2), 10.0), bar(d(2024, 3, 1), 11.0)];
        assert!(Series::new(bars, TimeFrame::Daily).is_ok());
    }

    #[test]
    fn test_to_weekly() {
        // Mon 2024-01-01 .. Mon 2024-01-08
        let bars: Vec<Bar> = (0..8)
            .map(|i| {
                let date = d(2024, 1, 1) + chrono::Duration::days(i);
                let c = 10.0 + i as f64;
                Bar::new(date, c - 0.5, c + 1.0, c - 1.0, c, 100.0)
            })
            .collect();
        let weekly = Series::new(bars, TimeFrame::Daily)
            .unwrap()
            .with_symbol("ABC")
            .to_weekly();

        assert_eq!(weekly.timeframe(), TimeFrame::Weekly);
        assert_eq!(weekly.symbol(), Some("ABC"));
        assert_eq!(weekly.len(), 2);

        let w0 = weekly.bars()[0];
        assert_eq!(w0.date, d(2024, 1, 7));
        assert_eq!(w0.open, 9.5);
        assert_eq!(w0.high, 17.0);
        assert_eq!(w0.low, 9.0);
        assert_eq!(w0.close, 16.0);
        assert_eq!(w0.volume, 700.0);

        let w1 = weekly.bars()[1];
        assert_eq!(w1.date, d(2024, 1, 14));
        assert_eq!(w1.close, 17.0);
        assert_eq!(w1.volume, 100.0);
    }

    #[test]
    fn test_timeframe_parse() {
        assert_eq!("1wk".parse::<TimeFrame>().unwrap(), TimeFrame::Weekly);
        assert_eq!("Daily".parse::<TimeFrame>().unwrap(), TimeFrame::Daily);
        assert!("hourly".parse::<TimeFrame>().is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let json = r#"{"symbol":"X","bars":[
            {"date":"2024-01-03","open":1.0,"high":2.0,"low":0.5,"close":1.5,"volume":10.0},
            {"date":"2024-01-02","open":1.0,"high":2.0,"low":0.5,"close":1.5,"volume":10.0}
        ]}"#;
        assert!(serde_json::from_str::<Series>(json).is_err());
    }
}
