//! Enriched per-row output and the analysis report

use chrono::NaiveDate;
use serde::Serialize;

use crate::levels::{ExitReason, Signal, ZoneState};
use crate::oscillators::Oscillators;
use crate::patterns::PatternRecord;
use crate::series::{Bar, TimeFrame};
use crate::splits::SplitEvent;
use crate::stage::{Arrow, StageMarkers, TrendLabel};
use crate::swings::Swings;

/// One input bar with every derived column.
///
/// Undefined values (warm-up rows, no recent peak) are `None` and serialize
/// as `null`; everything else is a plain JSON number or bool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedRow {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,

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
    pub ppo_rising: bool,
    pub ema_short_rising: bool,
    pub ema_long_rising: bool,
    pub atr: Option<f64>,

    pub label: TrendLabel,
    pub arrow: Option<Arrow>,
    pub in_zone_uptrend: bool,
    pub leader: bool,
    pub status: String,
    pub rs: f64,
    pub ad: f64,

    pub is_peak: bool,
    pub is_valley: bool,

    pub buy_point: Option<f64>,
    pub buy_zone_lower: Option<f64>,
    pub buy_zone_upper: Option<f64>,
    pub stop_loss: Option<f64>,
    pub risk_per_share: Option<f64>,
    pub distance_from_buy_point_pct: Option<f64>,
    pub in_buy_zone: bool,
    pub bars_since_peak: Option<f64>,
    pub peak_date: Option<NaiveDate>,

    pub buy_signal: bool,
    pub exit_signal: bool,
    pub exit_reason: Option<ExitReason>,
}

impl EnrichedRow {
    /// Gather row `i` from the per-pass outputs
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        i: usize,
        bar: &Bar,
        osc: &Oscillators,
        atr: Option<f64>,
        label: TrendLabel,
        markers: &StageMarkers,
        rs: f64,
        ad: f64,
        swings: &Swings,
        zone: &ZoneState,
        signal: &Signal,
    ) -> Self {
        let level = zone.level.as_ref();
        let shown = osc.row(i);
        Self {
            date: bar.date,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,

            ema_fast: shown.ema_fast,
            ema_short: shown.ema_short,
            ema_mid: shown.ema_mid,
            ema_long: shown.ema_long,
            ema_chart_fast: shown.ema_chart_fast,
            ema_chart_slow: shown.ema_chart_slow,
            ppo: shown.ppo,
            ppo_signal: shown.ppo_signal,
            ppo_histogram: shown.ppo_histogram,
            pmo: shown.pmo,
            pmo_signal: shown.pmo_signal,
            ppo_rising: osc.rising(&osc.ppo, i),
            ema_short_rising: osc.rising(&osc.ema_short, i),
            ema_long_rising: osc.rising(&osc.ema_long, i),
            atr,

            label,
            arrow: markers.arrow,
            in_zone_uptrend: markers.in_zone_uptrend,
            leader: markers.leader,
            status: markers.status_text(label, signal),
            rs,
            ad,

            is_peak: swings.is_peak[i],
            is_valley: swings.is_valley[i],

            buy_point: level.map(|l| l.buy_point),
            buy_zone_lower: level.map(|l| l.buy_zone_lower),
            buy_zone_upper: level.map(|l| l.buy_zone_upper),
            stop_loss: level.map(|l| l.stop_loss),
            risk_per_share: level.map(|l| l.risk_per_share),
            distance_from_buy_point_pct: zone.distance_pct,
            in_buy_zone: zone.in_zone,
            bars_since_peak: zone.bars_since_peak.map(|b| b as f64),
            peak_date: level.map(|l| l.peak_date),

            buy_signal: signal.buy,
            exit_signal: signal.exit.is_some(),
            exit_reason: signal.exit,
        }
    }
}

/// Snapshot of the latest row, as shown in a watch list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSummary {
    pub symbol: Option<String>,
    pub date: NaiveDate,
    pub close: f64,
    pub label: TrendLabel,
    pub status: String,
    pub rs: f64,
    pub ad: f64,
    pub buy_point: Option<f64>,
    pub distance_from_buy_point_pct: Option<f64>,
    pub buy_signal: bool,
    pub exit_reason: Option<ExitReason>,
    pub patterns: usize,
}

/// Everything computed for one instrument
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub symbol: Option<String>,
    pub timeframe: TimeFrame,
    /// Splits that were back-adjusted before any computation
    pub splits: Vec<SplitEvent>,
    pub rows: Vec<EnrichedRow>,
    /// Chart patterns, sorted by start index
    pub patterns: Vec<PatternRecord>,
}

impl AnalysisReport {
    pub fn latest(&self) -> Option<&EnrichedRow> {
        self.rows.last()
    }

    /// Status of the most recent row; `None` for an empty report
    pub fn summary(&self) -> Option<StatusSummary> {
        let row = self.latest()?;
        Some(StatusSummary {
            symbol: self.symbol.clone(),
            date: row.date,
            close: row.close,
            label: row.label,
            status: row.status.clone(),
            rs: row.rs,
            ad: row.ad,
            buy_point: row.buy_point,
            distance_from_buy_point_pct: row.distance_from_buy_point_pct,
            buy_signal: row.buy_signal,
            exit_reason: row.exit_reason,
            patterns: self.patterns.len(),
        })
    }

    pub fn buy_signals(&self) -> impl Iterator<Item = &EnrichedRow> {
        self.rows.iter().filter(|r| r.buy_signal)
    }

    pub fn exit_signals(&self) -> impl Iterator<Item = &EnrichedRow> {
        self.rows.iter().filter(|r| r.exit_signal)
    }
}
