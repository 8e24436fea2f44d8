//! Trend-stage classification
//!
//! Every row gets one of seven ordered labels from a fixed-priority cascade:
//! confirmed (stage 2/3) trends first, then bare EMA crossovers (stage 1),
//! then Neutral. The classifier is memoryless; any history it needs is
//! already encoded in the oscillator slopes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::levels::{Signal, ZoneState};
use crate::oscillators::{cross_above, cross_below, Oscillators};
use crate::strength::StrengthConfig;
use crate::{AnalysisError, Direction, Result};

// ============================================================
// TREND LABEL
// ============================================================

/// Trend label, ordered from most bearish to most bullish
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TrendLabel {
    #[serde(rename = "Strong Sell")]
    StrongSell,
    #[serde(rename = "Sell")]
    Sell,
    #[serde(rename = "Neutral Sell")]
    NeutralSell,
    #[serde(rename = "Neutral")]
    Neutral,
    #[serde(rename = "Neutral Buy")]
    NeutralBuy,
    #[serde(rename = "Buy")]
    Buy,
    #[serde(rename = "Strong Buy")]
    StrongBuy,
}

impl TrendLabel {
    pub const ALL: [TrendLabel; 7] = [
        TrendLabel::StrongSell,
        TrendLabel::Sell,
        TrendLabel::NeutralSell,
        TrendLabel::Neutral,
        TrendLabel::NeutralBuy,
        TrendLabel::Buy,
        TrendLabel::StrongBuy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TrendLabel::StrongSell => "Strong Sell",
            TrendLabel::Sell => "Sell",
            TrendLabel::NeutralSell => "Neutral Sell",
            TrendLabel::Neutral => "Neutral",
            TrendLabel::NeutralBuy => "Neutral Buy",
            TrendLabel::Buy => "Buy",
            TrendLabel::StrongBuy => "Strong Buy",
        }
    }

    pub fn direction(self) -> Direction {
        if self.is_up_group() {
            Direction::Bullish
        } else if self.is_down_group() {
            Direction::Bearish
        } else {
            Direction::Neutral
        }
    }

    /// Strong Buy, Buy or Neutral Buy
    #[inline]
    pub fn is_up_group(self) -> bool {
        self > TrendLabel::Neutral
    }

    /// Strong Sell, Sell or Neutral Sell
    #[inline]
    pub fn is_down_group(self) -> bool {
        self < TrendLabel::Neutral
    }

    /// Buy or Strong Buy
    #[inline]
    pub fn is_confirmed_up(self) -> bool {
        matches!(self, TrendLabel::Buy | TrendLabel::StrongBuy)
    }

    /// Sell or Strong Sell
    #[inline]
    pub fn is_confirmed_down(self) -> bool {
        matches!(self, TrendLabel::Sell | TrendLabel::StrongSell)
    }

    /// Display badge used by screeners
    pub fn badge(self) -> &'static str {
        match self {
            TrendLabel::StrongBuy => "🟢🟢",
            TrendLabel::Buy => "🟢",
            TrendLabel::NeutralBuy => "🟡↗",
            TrendLabel::Neutral => "⚪",
            TrendLabel::NeutralSell => "🟡↘",
            TrendLabel::Sell => "🔴",
            TrendLabel::StrongSell => "🔴🔴",
        }
    }
}

impl fmt::Display for TrendLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrendLabel {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        TrendLabel::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or(AnalysisError::InvalidValue("unknown trend label"))
    }
}

// ============================================================
// CLASSIFIER
// ============================================================

#[inline]
fn gt(a: Option<f64>, b: Option<f64>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a > b)
}

#[inline]
fn lt(a: Option<f64>, b: Option<f64>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a < b)
}

/// Confirmed uptrend conditions (Buy)
pub fn is_stage2_up(osc: &Oscillators, i: usize) -> bool {
    osc.stage_ready(i)
        && gt(osc.ppo[i], Some(0.0))
        && osc.rising(&osc.ppo, i)
        && osc.rising(&osc.ema_long, i)
        && gt(osc.ppo[i], osc.ppo_signal[i])
        && gt(osc.ema_short[i], osc.ema_mid[i])
}

/// Extra conditions upgrading Buy to Strong Buy
pub fn is_stage3_up(osc: &Oscillators, i: usize) -> bool {
    osc.stage_ready(i)
        && osc.rising(&osc.ema_short, i) && gt(osc.pmo[i], Some(0.0))
}

/// Confirmed downtrend conditions (Sell)
pub fn is_stage2_down(osc: &Oscillators, i: usize) -> bool {
    osc.stage_ready(i)
        && lt(osc.ppo[i], Some(0.0))
        && osc.declining(&osc.ppo, i)
        && lt(osc.ppo[i], osc.ppo_signal[i])
        && osc.declining(&osc.ema_short, i)
        && osc.declining(&osc.ema_long, i)
        && lt(osc.ema_short[i], osc.ema_mid[i])
}

/// Extra conditions upgrading Sell to Strong Sell.
/// PPO is tested with `<=` here while the uptrend uses `> 0`; kept as is.
pub fn is_stage3_down(osc: &Oscillators, i: usize) -> bool {
    osc.stage_ready(i)
        && !gt(osc.ppo[i], Some(0.0))
        && osc.ppo[i].is_some()
        && osc.declining(&osc.pmo, i)
        && lt(osc.pmo[i], osc.pmo_signal[i])
        && lt(osc.ema_short[i], osc.ema_long[i])
}

/// Label row `i`. Stage 2 is tested before its stage 3 upgrade so Buy and
/// Sell stay reachable.
pub fn classify(osc: &Oscillators, i: usize) -> TrendLabel {
    if is_stage2_up(osc, i) {
        if is_stage3_up(osc, i) {
            TrendLabel::StrongBuy
        } else {
            TrendLabel::Buy
        }
    } else if is_stage2_down(osc, i) {
        if is_stage3_down(osc, i) {
            TrendLabel::StrongSell
        } else {
            TrendLabel::Sell
        }
    } else if cross_above(&osc.ema_fast, &osc.ema_short, i) {
        TrendLabel::NeutralBuy
    } else if cross_below(&osc.ema_fast, &osc.ema_short, i) {
        TrendLabel::NeutralSell
    } else {
        TrendLabel::Neutral
    }
}

pub fn classify_all(osc: &Oscillators) -> Vec<TrendLabel> {
    (0..osc.len()).map(|i| classify(osc, i)).collect()
}

// ============================================================
// MARKERS
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Arrow {
    #[serde(rename = "↑")]
    Up,
    #[serde(rename = "↓")]
    Down,
}

impl Arrow {
    pub fn symbol(self) -> &'static str {
        match self {
            Arrow::Up => "↑",
            Arrow::Down => "↓",
        }
    }
}

/// Per-row enhancement markers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageMarkers {
    /// Label entered the up or down group on this row
    pub arrow: Option<Arrow>,
    /// Buy/Strong Buy while inside the buy zone
    pub in_zone_uptrend: bool,
    /// RS and AD both at or above the leader thresholds
    pub leader: bool,
}

impl StageMarkers {
    /// "Buy ↑ ✓ * 🔵BUY" style status text
    pub fn status_text(&self, label: TrendLabel, signal: &Signal) -> String {
        let mut status = label.as_str().to_string();
        if let Some(arrow) = self.arrow {
            status.push(' ');
            status.push_str(arrow.symbol());
        }
        if self.in_zone_uptrend {
            status.push_str(" ✓");
        }
        if self.leader {
            status.push_str(" *");
        }
        if signal.buy {
            status.push_str(" 🔵BUY");
        }
        if signal.exit.is_some() {
            status.push_str(" 🔴EXIT");
        }
        status
    }
}

/// Arrow when the label enters the up group (or down group) from outside it
pub fn arrow(prev: TrendLabel, curr: TrendLabel) -> Option<Arrow> {
    if curr.is_up_group() && !prev.is_up_group() {
        Some(Arrow::Up)
    } else if curr.is_down_group() && !prev.is_down_group() {
        Some(Arrow::Down)
    } else {
        None
    }
}

pub fn markers(
    labels: &[TrendLabel],
    zones: &[ZoneState],
    rs: &[f64],
    ad: &[f64],
    cfg: &StrengthConfig,
) -> Vec<StageMarkers> {
    labels
        .iter()
        .enumerate()
        .map(|(i, &label)| StageMarkers {
            arrow: if i > 0 { arrow(labels[i - 1], label) } else { None },
            in_zone_uptrend: label.is_confirmed_up() && zones.get(i).is_some_and(|z| z.in_zone),
            leader: rs.get(i).is_some_and(|&r| r >= cfg.leader_rs)
                && ad.get(i).is_some_and(|&a| a >= cfg.leader_ad),
        })
        .collect()
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oscillators::OscillatorConfig;

    fn compounding(n: usize, rate: f64) -> Vec<f64> {
        (0..n).map(|i| 100.0 * (1.0 + rate).powi(i as i32)).collect()
    }

    #[test]
    fn test_label_ordering() {
        assert!(TrendLabel::StrongBuy > TrendLabel::Buy);
        assert!(TrendLabel::Buy > TrendLabel::NeutralBuy);
        assert!(TrendLabel::Neutral > TrendLabel::NeutralSell);
        assert!(TrendLabel::Sell > TrendLabel::StrongSell);
        let mut sorted = TrendLabel::ALL;
        sorted.sort();
        assert_eq!(sorted, TrendLabel::ALL);
    }

    #[test]
    fn test_label_groups() {
        assert!(TrendLabel::NeutralBuy.is_up_group());
        assert!(!TrendLabel::NeutralBuy.is_confirmed_up());
        assert!(TrendLabel::NeutralSell.is_down_group());
        assert!(!TrendLabel::Neutral.is_up_group() && !TrendLabel::Neutral.is_down_group());
        assert_eq!(TrendLabel::Sell.direction(), Direction::Bearish);
    }

    #[test]
    fn test_label_text_roundtrip() {
        for label in TrendLabel::ALL {
            assert_eq!(label.as_str().parse::<TrendLabel>().unwrap(), label);
        }
        assert_eq!(
            serde_json::to_string(&TrendLabel::StrongBuy).unwrap(),
            "\"Strong Buy\""
        );
    }

    #[test]
    fn test_rising_series_is_strong_buy() {
        let closes = compounding(150, 0.01);
        let osc = Oscillators::compute(&closes, &OscillatorConfig::default());
        let labels = classify_all(&osc);

        for (i, label) in labels.iter().enumerate() {
            assert!(!label.is_down_group(), "row {i} labelled {label}");
            if i >= 34 {
                assert_eq!(*label, TrendLabel::StrongBuy, "row {i}");
            }
        }
    }

    fn linear(n: usize, slope: f64) -> Vec<f64> {
        (0..n).map(|i| 100.0 + slope * i as f64).collect()
    }

    #[test]
    fn test_linear_series_strong_buy_after_warmup() {
        let osc = Oscillators::compute(&linear(300, 0.1), &OscillatorConfig::default());
        let labels = classify_all(&osc);

        assert!(labels.iter().all(|l| !l.is_down_group()));
        assert!(labels[..34].iter().all(|l| !l.is_confirmed_up()));
        assert!(labels[34..=66].iter().all(|l| *l == TrendLabel::StrongBuy));
        // PPO of a constant slope peaks and then decays, so "PPO rising" fails
        assert!(labels[67..].iter().all(|l| *l == TrendLabel::Neutral));
    }

    #[test]
    fn test_steeper_linear_series_leaves_strong_buy_sooner() {
        let osc = Oscillators::compute(&linear(300, 0.5), &OscillatorConfig::default());
        let labels = classify_all(&osc);
        assert!(labels[34..=47].iter().all(|l| *l == TrendLabel::StrongBuy));
        assert_eq!(labels[48], TrendLabel::Neutral);

        let osc = Oscillators::compute(&linear(300, 2.0), &OscillatorConfig::default());
        let labels = classify_all(&osc);
        assert!(labels.iter().all(|l| !l.is_down_group() && !l.is_confirmed_up()));
    }

    #[test]
    fn test_falling_series_never_buys() {
        let closes = compounding(150, -0.01);
        let osc = Oscillators::compute(&closes, &OscillatorConfig::default());
        let labels = classify_all(&osc);

        assert!(labels.iter().all(|l| !l.is_up_group()));
        assert!(labels[40..].iter().all(|l| l.is_confirmed_down()));
    }

    #[test]
    fn test_flat_series_is_neutral() {
        let closes = vec![42.0; 120];
        let osc = Oscillators::compute(&closes, &OscillatorConfig::default());
        assert!(classify_all(&osc).iter().all(|l| *l == TrendLabel::Neutral));
    }

    #[test]
    fn test_warmup_rows_are_neutral_or_crossover() {
        let closes = compounding(40, 0.01);
        let osc = Oscillators::compute(&closes, &OscillatorConfig::default());
        for i in 0..34 {
            assert!(!classify(&osc, i).is_confirmed_up());
            assert!(!classify(&osc, i).is_confirmed_down());
        }
        assert_eq!(classify(&osc, 1), TrendLabel::NeutralBuy);
        assert_eq!(classify(&osc, 34), TrendLabel::StrongBuy);
    }

    #[test]
    fn test_strong_labels_imply_stage2() {
        let closes: Vec<f64> = (0..300)
            .map(|i| 100.0 + 20.0 * ((i as f64) / 15.0).sin() + i as f64 * 0.1)
            .collect();
        let osc = Oscillators::compute(&closes, &OscillatorConfig::default());
        for i in 0..closes.len() {
            match classify(&osc, i) {
                TrendLabel::StrongBuy => assert!(is_stage2_up(&osc, i)),
                TrendLabel::StrongSell => assert!(is_stage2_down(&osc, i)),
                _ => {}
            }
        }
    }

    #[test]
    fn test_arrow() {
        assert_eq!(arrow(TrendLabel::Neutral, TrendLabel::NeutralBuy), Some(Arrow::Up));
        assert_eq!(arrow(TrendLabel::NeutralBuy, TrendLabel::Buy), None);
        assert_eq!(arrow(TrendLabel::Buy, TrendLabel::Sell), Some(Arrow::Down));
        assert_eq!(arrow(TrendLabel::Sell, TrendLabel::Neutral), None);
    }

    #[test]
    fn test_markers_and_status_text() {
        let labels = [TrendLabel::Neutral, TrendLabel::Buy];
        let zones = [
            ZoneState::default(),
            ZoneState {
                in_zone: true,
                ..Default::default()
            },
        ];
        let m = markers(&labels, &zones, &[50.0, 97.0], &[50.0, 96.0], &StrengthConfig::default());

        assert_eq!(m[0], StageMarkers::default());
        assert_eq!(m[1].arrow, Some(Arrow::Up));
        assert!(m[1].in_zone_uptrend);
        assert!(m[1].leader);

        let signal = Signal {
            buy: true,
            exit: None,
        };
        assert_eq!(m[1].status_text(labels[1], &signal), "Buy ↑ ✓ * 🔵BUY");
    }
}
