//! Buy point, buy zone, stop loss and buy/exit signals
//!
//! The buy point is the high of the most recent confirmed peak inside the
//! lookback window. The zone and stop are fixed fractions around it. Note that
//! a peak is only known `swing lookback` bars after it prints, so historical
//! rows see buy points a live feed could not have seen yet.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};

use crate::stage::TrendLabel;
use crate::swings::{SwingPoint, Swings};
use crate::{AnalysisError, Period, Ratio, Result, OHLCV};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeLevelConfig {
    /// Bars searched backwards for the most recent peak
    pub lookback: Period,
    /// Half-width of the buy zone around the buy point
    pub buy_zone: Ratio,
    /// Stop distance below the buy point
    pub stop_loss: Ratio,
}

impl Default for TradeLevelConfig {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(50),
            buy_zone: Ratio::new_const(0.05),
            stop_loss: Ratio::new_const(0.08),
        }
    }
}

impl TradeLevelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.buy_zone.get() <= 0.0 || self.buy_zone.get() >= 1.0 {
            return Err(AnalysisError::InvalidConfig(
                "buy_zone must be strictly between 0 and 1".into(),
            ));
        }
        if self.stop_loss.get() <= 0.0 || self.stop_loss.get() >= 1.0 {
            return Err(AnalysisError::InvalidConfig(
                "stop_loss must be strictly between 0 and 1".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// TRADE LEVEL
// ============================================================

/// Levels derived from one peak
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeLevel {
    pub buy_point: f64,
    pub buy_zone_lower: f64,
    pub buy_zone_upper: f64,
    pub stop_loss: f64,
    pub risk_per_share: f64,
    pub peak_index: usize,
    pub peak_date: NaiveDate,
}

impl TradeLevel {
    pub fn from_peak(peak: &SwingPoint, cfg: &TradeLevelConfig) -> Self {
        let bp = peak.price;
        let stop = bp * (1.0 - cfg.stop_loss.get());
        Self {
            buy_point: bp,
            buy_zone_lower: bp * (1.0 - cfg.buy_zone.get()),
            buy_zone_upper: bp * (1.0 + cfg.buy_zone.get()),
            stop_loss: stop,
            risk_per_share: bp - stop,
            peak_index: peak.index,
            peak_date: peak.date,
        }
    }

    /// Signed distance of `price` from the buy point, in percent
    #[inline]
    pub fn distance_pct(&self, price: f64) -> f64 {
        (price - self.buy_point) / self.buy_point * 100.0
    }
}

/// Trade level and zone membership of one row
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ZoneState {
    pub level: Option<TradeLevel>,
    pub bars_since_peak: Option<usize>,
    pub distance_pct: Option<f64>,
    pub in_zone: bool,
}

/// Resolve the trade level of every row
pub fn zone_states<T: OHLCV>(bars: &[T], swings: &Swings, cfg: &TradeLevelConfig) -> Vec<ZoneState> {
    let lookback = cfg.lookback.get();
    let zone_pct = cfg.buy_zone.as_percent();
    let mut cached: Option<TradeLevel> = None;

    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let Some(peak) = swings.last_peak_in(i.saturating_sub(lookback), i) else {
                return ZoneState::default();
            };
            let level = match cached {
                Some(l) if l.peak_index == peak.index => l,
                _ => {
                    let l = TradeLevel::from_peak(peak, cfg);
                    cached = Some(l);
                    l
                }
            };
            let distance = level.distance_pct(bar.close());
            ZoneState {
                level: Some(level),
                bars_since_peak: Some(i - peak.index),
                distance_pct: Some(distance),
                in_zone: (-zone_pct..=zone_pct).contains(&distance),
            }
        })
        .collect()
}

// ============================================================
// SIGNALS
// ============================================================

/// Why a position should be closed
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitReason {
    /// Close at or below the stop
    StopLoss { stop: f64 },
    /// Label entered Sell or Strong Sell
    TrendSell(TrendLabel),
    /// Label dropped to Neutral Sell from the up side
    DowntrendStarting,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss { stop } => write!(f, "Stop Loss Hit (${stop:.2})"),
            ExitReason::TrendSell(label) => write!(f, "Trend Sell Signal ({label})"),
            ExitReason::DowntrendStarting => f.write_str("Downtrend Starting (Neutral Sell)"),
        }
    }
}

impl Serialize for ExitReason {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

/// Buy/exit signal of one row
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Signal {
    pub buy: bool,
    pub exit: Option<ExitReason>,
}

fn buy_signal(i: usize, labels: &[TrendLabel], zones: &[ZoneState]) -> bool {
    let label = labels[i];
    if !(zones[i].in_zone && label.is_confirmed_up()) {
        return false;
    }
    if i == 0 {
        return true;
    }
    let prev = labels[i - 1];
    let entered_uptrend = !prev.is_confirmed_up();
    let entered_zone = !zones[i - 1].in_zone;
    let upgraded = label == TrendLabel::StrongBuy && prev == TrendLabel::Buy;
    entered_uptrend || entered_zone || upgraded
}

fn exit_signal<T: OHLCV>(
    i: usize,
    bars: &[T],
    labels: &[TrendLabel],
    zones: &[ZoneState],
) -> Option<ExitReason> {
    if i == 0 {
        return None;
    }
    let (label, prev) = (labels[i], labels[i - 1]);

    if let Some(level) = zones[i].level {
        if bars[i].close() <= level.stop_loss {
            return Some(ExitReason::StopLoss {
                stop: level.stop_loss,
            });
        }
    }
    if label.is_confirmed_down() && !prev.is_confirmed_down() {
        return Some(ExitReason::TrendSell(label));
    }
    if label == TrendLabel::NeutralSell && prev.is_up_group() {
        return Some(ExitReason::DowntrendStarting);
    }
    None
}

/// Buy and exit signals for every row. The three slices must be row-aligned.
pub fn signals<T: OHLCV>(
    bars: &[T],
    labels: &[TrendLabel],
    zones: &[ZoneState],
) -> Result<Vec<Signal>> {
    for len in [labels.len(), zones.len()] {
        if len != bars.len() {
            return Err(AnalysisError::LengthMismatch {
                left: bars.len(),
                right: len,
            });
        }
    }
    Ok((0..bars.len())
        .map(|i| Signal {
            buy: buy_signal(i, labels, zones),
            exit: exit_signal(i, bars, labels, zones),
        })
        .collect())
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Bar;
    use crate::swings::SwingKind;

    fn date(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64)
    }

    fn peak(index: usize, price: f64) -> SwingPoint {
        SwingPoint {
            index,
            date: date(index),
            price,
            kind: SwingKind::Peak,
        }
    }

    fn swings_with(points: Vec<SwingPoint>, n: usize) -> Swings {
        let mut is_peak = vec![false; n];
        for p in &points {
            is_peak[p.index] = true;
        }
        Swings {
            points,
            is_peak,
            is_valley: vec![false; n],
        }
    }

    fn flat_bars(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new(date(i), c, c, c, c, 1.0))
            .collect()
    }

    #[test]
    fn test_levels_from_peak() {
        let level = TradeLevel::from_peak(&peak(3, 100.0), &TradeLevelConfig::default());
        assert_eq!(level.buy_point, 100.0);
        assert_eq!(level.buy_zone_lower, 100.0 * 0.95);
        assert_eq!(level.buy_zone_upper, 100.0 * 1.05);
        assert_eq!(level.stop_loss, 100.0 * 0.92);
        assert_eq!(level.risk_per_share, 100.0 - 100.0 * 0.92);
        assert!(level.buy_zone_lower < level.buy_point && level.buy_point < level.buy_zone_upper);
        assert!(level.stop_loss < level.buy_zone_lower);
    }

    #[test]
    fn test_zone_uses_strictly_earlier_peak() {
        let bars = flat_bars(&[100.0; 10]);
        let swings = swings_with(vec![peak(4, 100.0)], 10);
        let zones = zone_states(&bars, &swings, &TradeLevelConfig::default());

        assert!(zones[4].level.is_none());
        let z = zones[5];
        assert_eq!(z.level.unwrap().buy_point, 100.0);
        assert_eq!(z.bars_since_peak, Some(1));
        assert_eq!(z.distance_pct, Some(0.0));
        assert!(z.in_zone);
    }

    #[test]
    fn test_zone_expires_after_lookback() {
        let bars = flat_bars(&[100.0; 70]);
        let swings = swings_with(vec![peak(2, 100.0)], 70);
        let zones = zone_states(&bars, &swings, &TradeLevelConfig::default());
        assert!(zones[52].level.is_some());
        assert!(zones[53].level.is_none());
        assert!(!zones[53].in_zone);
    }

    #[test]
    fn test_zone_boundaries_inclusive() {
        let bars = flat_bars(&[100.0, 105.0, 95.0, 105.5, 94.0]);
        let swings = swings_with(vec![peak(0, 100.0)], 5);
        let zones = zone_states(&bars, &swings, &TradeLevelConfig::default());
        assert!(zones[1].in_zone);
        assert!(zones[2].in_zone);
        assert!(!zones[3].in_zone);
        assert!(!zones[4].in_zone);
    }

    #[test]
    fn test_buy_signal_on_entering_uptrend_in_zone() {
        let bars = flat_bars(&[100.0; 4]);
        let swings = swings_with(vec![peak(0, 100.0)], 4);
        let zones = zone_states(&bars, &swings, &TradeLevelConfig::default());
        let labels = [
            TrendLabel::Neutral,
            TrendLabel::Neutral,
            TrendLabel::Buy,
            TrendLabel::Buy,
        ];
        let s = signals(&bars, &labels, &zones).unwrap();
        assert!(!s[1].buy);
        assert!(s[2].buy);
        assert!(!s[3].buy);
    }

    #[test]
    fn test_buy_signal_on_upgrade() {
        let bars = flat_bars(&[100.0; 4]);
        let swings = swings_with(vec![peak(0, 100.0)], 4);
        let zones = zone_states(&bars, &swings, &TradeLevelConfig::default());
        let labels = [
            TrendLabel::Buy,
            TrendLabel::Buy,
            TrendLabel::StrongBuy,
            TrendLabel::Buy,
        ];
        let s = signals(&bars, &labels, &zones).unwrap();
        assert!(s[2].buy);
        assert!(!s[3].buy);
    }

    #[test]
    fn test_buy_signal_first_row() {
        let bars = flat_bars(&[100.0]);
        let zones = vec![ZoneState {
            in_zone: true,
            ..Default::default()
        }];
        let s = signals(&bars, &[TrendLabel::StrongBuy], &zones).unwrap();
        assert!(s[0].buy);
        assert!(s[0].exit.is_none());
    }

    #[test]
    fn test_exit_priority_stop_loss_first() {
        let bars = flat_bars(&[100.0, 100.0, 90.0]);
        let swings = swings_with(vec![peak(0, 100.0)], 3);
        let zones = zone_states(&bars, &swings, &TradeLevelConfig::default());
        let labels = [TrendLabel::Buy, TrendLabel::Buy, TrendLabel::Sell];
        let s = signals(&bars, &labels, &zones).unwrap();
        let reason = s[2].exit.unwrap();
        assert_eq!(reason, ExitReason::StopLoss { stop: 100.0 * 0.92 });
        assert_eq!(reason.to_string(), "Stop Loss Hit ($92.00)");
    }

    #[test]
    fn test_exit_on_trend_sell_and_neutral_sell() {
        let bars = flat_bars(&[100.0; 5]);
        let zones = vec![ZoneState::default(); 5];
        let labels = [
            TrendLabel::NeutralBuy,
            TrendLabel::NeutralSell,
            TrendLabel::Sell,
            TrendLabel::StrongSell,
            TrendLabel::NeutralSell,
        ];
        let s = signals(&bars, &labels, &zones).unwrap();
        assert_eq!(s[1].exit, Some(ExitReason::DowntrendStarting));
        assert_eq!(s[2].exit, Some(ExitReason::TrendSell(TrendLabel::Sell)));
        assert_eq!(s[3].exit, None);
        assert_eq!(s[4].exit, None);
        assert_eq!(
            s[2].exit.unwrap().to_string(),
            "Trend Sell Signal (Sell)"
        );
    }

    #[test]
    fn test_signals_reject_misaligned_input() {
        let bars = flat_bars(&[100.0; 3]);
        let zones = vec![ZoneState::default(); 2];
        let labels = [TrendLabel::Neutral; 3];
        assert!(matches!(
            signals(&bars, &labels, &zones),
            Err(AnalysisError::LengthMismatch { left: 3, right: 2 })
        ));
    }

    #[test]
    fn test_exit_reason_serializes_as_text() {
        let json = serde_json::to_string(&ExitReason::DowntrendStarting).unwrap();
        assert_eq!(json, "\"Downtrend Starting (Neutral Sell)\"");
    }

    #[test]
    fn test_config_validation() {
        assert!(TradeLevelConfig::default().validate().is_ok());
        let cfg = TradeLevelConfig {
            stop_loss: Ratio::new_const(0.0),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
