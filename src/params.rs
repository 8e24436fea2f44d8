//! Tunable thresholds of the builtin chart pattern detectors
//!
//! Every builtin detector publishes a table of [`ParamMeta`] rows naming the
//! knobs it reads, their defaults and a sweep range. A detector can then be
//! rebuilt from a plain name/value map, which is what the grid helpers at the
//! bottom of this module feed it.
//!
//! ```rust
//! use std::collections::HashMap;
//! use trendstage::params::ParameterizedDetector;
//! use trendstage::prelude::*;
//!
//! let names: Vec<&str> = FlatBaseDetector::param_meta().iter().map(|m| m.name).collect();
//! assert!(names.contains(&"max_depth"));
//!
//! let overrides = HashMap::from([("max_depth", 0.12)]);
//! let detector = FlatBaseDetector::with_params(&overrides).unwrap();
//! assert_eq!(detector.max_depth.get(), 0.12);
//! ```

use std::collections::HashMap;

use crate::detectors::*;
use crate::patterns::{BuiltinDetector, PatternKind};
use crate::{AnalysisError, Period, Ratio, Result};

/// Name/value overrides handed to [`ParameterizedDetector::with_params`]
pub type ParamMap<'a> = HashMap<&'a str, f64>;

// ============================================================
// PARAMETER TABLES
// ============================================================

/// Whether a knob is a fraction or a bar count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  Ratio,
  Period,
}

/// One row of a detector's parameter table
#[derive(Debug, Clone, Copy)]
pub struct ParamMeta {
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Lowest value a sweep visits
  pub min: f64,
  /// Highest value a sweep visits
  pub max: f64,
  /// Sweep increment
  pub step: f64,
  pub description: &'static str,
}

impl ParamMeta {
  /// Fractional knob swept over `(min, max, step)`
  pub const fn ratio(
    name: &'static str,
    default: f64,
    (min, max, step): (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, min, max, step, description }
  }

  /// Bar-count knob swept over `(min, max, step)`
  pub const fn period(
    name: &'static str,
    default: f64,
    (min, max, step): (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, min, max, step, description }
  }

  /// Sweep values `min, min + step, ...` up to `max`. Each value is derived
  /// from its index so long sweeps do not accumulate rounding.
  pub fn sweep(&self) -> Vec<f64> {
    if self.step <= 0.0 || self.max < self.min {
      return vec![self.min];
    }
    let count = ((self.max - self.min) / self.step + 1e-9).floor() as usize + 1;
    (0..count).map(|k| self.min + k as f64 * self.step).collect()
  }

  /// Rejects values outside the sweep bounds or not representable as this
  /// knob's type
  pub fn check(&self, value: f64) -> Result<()> {
    if !(self.min..=self.max).contains(&value) {
      return Err(AnalysisError::OutOfRange {
        field: self.name,
        value,
        min: self.min,
        max: self.max,
      });
    }
    match self.param_type {
      ParamType::Ratio => Ratio::new(value).map(drop),
      ParamType::Period => as_period(value).map(drop),
    }
  }
}

// ============================================================
// DETECTOR CONSTRUCTION
// ============================================================

/// Detector that can be listed and rebuilt from a [`ParamMap`]
pub trait ParameterizedDetector: Sized {
  fn param_meta() -> &'static [ParamMeta];

  /// Keys absent from `params` keep the detector's default value
  fn with_params(params: &ParamMap<'_>) -> Result<Self>;
}

fn as_period(value: f64) -> Result<Period> {
  if !value.is_finite() || value < 1.0 || value.fract() != 0.0 {
    return Err(AnalysisError::InvalidValue("Period must be a positive integer"));
  }
  Period::new(value as usize)
}

/// `params[key]` as a [`Ratio`], or `default` when the key is absent
pub fn ratio_param(params: &ParamMap<'_>, key: &str, default: f64) -> Result<Ratio> {
  Ratio::new(params.get(key).copied().unwrap_or(default))
}

/// `params[key]` as a [`Period`], or `default` when the key is absent
pub fn period_param(params: &ParamMap<'_>, key: &str, default: usize) -> Result<Period> {
  match params.get(key) {
    Some(&value) => as_period(value),
    None => Period::new(default),
  }
}

// ============================================================
// BUILTIN LOOKUP / GRID SEARCH
// ============================================================

/// Parameter table of a builtin pattern; empty for custom kinds
pub fn param_meta_for(kind: PatternKind) -> &'static [ParamMeta] {
  match kind {
    PatternKind::HeadAndShoulders => HeadAndShouldersDetector::param_meta(),
    PatternKind::InverseHeadAndShoulders => InverseHeadAndShouldersDetector::param_meta(),
    PatternKind::DoubleTop => DoubleTopDetector::param_meta(),
    PatternKind::DoubleBottom => DoubleBottomDetector::param_meta(),
    PatternKind::AscendingTriangle => AscendingTriangleDetector::param_meta(),
    PatternKind::DescendingTriangle => DescendingTriangleDetector::param_meta(),
    PatternKind::SymmetricalTriangle => SymmetricalTriangleDetector::param_meta(),
    PatternKind::CupAndHandle => CupAndHandleDetector::param_meta(),
    PatternKind::FlatBase => FlatBaseDetector::param_meta(),
    PatternKind::SaucerBase => SaucerBaseDetector::param_meta(),
    PatternKind::AscendingBase => AscendingBaseDetector::param_meta(),
    PatternKind::Custom(_) => &[],
  }
}

/// Build a builtin detector for `kind` from a parameter map
pub fn builtin_with_params(kind: PatternKind, params: &ParamMap<'_>) -> Result<BuiltinDetector> {
  let detector: BuiltinDetector = match kind {
    PatternKind::HeadAndShoulders => HeadAndShouldersDetector::with_params(params)?.into(),
    PatternKind::InverseHeadAndShoulders => InverseHeadAndShouldersDetector::with_params(params)?.into(),
    PatternKind::DoubleTop => DoubleTopDetector::with_params(params)?.into(),
    PatternKind::DoubleBottom => DoubleBottomDetector::with_params(params)?.into(),
    PatternKind::AscendingTriangle => AscendingTriangleDetector::with_params(params)?.into(),
    PatternKind::DescendingTriangle => DescendingTriangleDetector::with_params(params)?.into(),
    PatternKind::SymmetricalTriangle => SymmetricalTriangleDetector::with_params(params)?.into(),
    PatternKind::CupAndHandle => CupAndHandleDetector::with_params(params)?.into(),
    PatternKind::FlatBase => FlatBaseDetector::with_params(params)?.into(),
    PatternKind::SaucerBase => SaucerBaseDetector::with_params(params)?.into(),
    PatternKind::AscendingBase => AscendingBaseDetector::with_params(params)?.into(),
    PatternKind::Custom(name) => {
      return Err(AnalysisError::InvalidConfig(format!("{name} is not a builtin pattern")));
    },
  };
  detector.validate_config()?;
  Ok(detector)
}

/// Cartesian product of every parameter's sweep
pub fn param_grid(metas: &'static [ParamMeta]) -> Vec<ParamMap<'static>> {
  metas.iter().fold(vec![HashMap::new()], |combos, meta| {
    let values = meta.sweep();
    combos
      .iter()
      .flat_map(|combo| {
        values.iter().map(move |&v| {
          let mut next = combo.clone();
          next.insert(meta.name, v);
          next
        })
      })
      .collect()
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn meta(kind: PatternKind, name: &str) -> ParamMeta {
    *param_meta_for(kind).iter().find(|m| m.name == name).unwrap()
  }

  #[test]
  fn test_sweep_is_index_based() {
    let depth = meta(PatternKind::FlatBase, "max_depth");
    let values = depth.sweep();
    assert_eq!(values.len(), 11);
    assert_eq!(values[0], 0.10);
    assert!((values[10] - 0.20).abs() < 1e-12);
    assert!(values.windows(2).all(|w| (w[1] - w[0] - 0.01).abs() < 1e-12));

    let window = meta(PatternKind::FlatBase, "window");
    assert_eq!(window.sweep(), vec![15.0, 20.0, 25.0, 30.0, 35.0, 40.0]);

    let degenerate = ParamMeta::ratio("x", 0.5, (0.4, 0.3, 0.1), "");
    assert_eq!(degenerate.sweep(), vec![0.4]);
  }

  #[test]
  fn test_check_bounds_and_type() {
    let tolerance = meta(PatternKind::DoubleTop, "peak_tolerance");
    assert!(tolerance.check(0.01).is_ok());
    assert!(tolerance.check(0.05).is_ok());
    assert!(matches!(
      tolerance.check(0.06),
      Err(AnalysisError::OutOfRange { field: "peak_tolerance", .. })
    ));
    assert!(tolerance.check(f64::NAN).is_err());

    let troughs = meta(PatternKind::AscendingBase, "min_troughs");
    assert_eq!(troughs.param_type, ParamType::Period);
    assert!(troughs.check(4.0).is_ok());
    assert!(matches!(troughs.check(2.5), Err(AnalysisError::InvalidValue(_))));
  }

  #[test]
  fn test_param_readers_fall_back_to_default() {
    let params = ParamMap::from([("depth", 0.08), ("window", 40.0), ("half", 12.5), ("neg", -0.1)]);

    assert_eq!(ratio_param(&params, "depth", 0.2).unwrap().get(), 0.08);
    assert_eq!(ratio_param(&params, "missing", 0.2).unwrap().get(), 0.2);
    assert!(ratio_param(&params, "neg", 0.2).is_err());

    assert_eq!(period_param(&params, "window", 25).unwrap().get(), 40);
    assert_eq!(period_param(&params, "missing", 25).unwrap().get(), 25);
    assert!(period_param(&params, "half", 25).is_err());
  }

  #[test]
  fn test_every_builtin_has_params() {
    for kind in PatternKind::BUILTIN {
      let metas = param_meta_for(kind);
      assert!(!metas.is_empty(), "{kind} has no parameters");
      for meta in metas {
        assert!(meta.check(meta.default).is_ok(), "{kind}.{} default out of range", meta.name);
      }
      let detector = builtin_with_params(kind, &ParamMap::new()).unwrap();
      assert_eq!(detector.kind(), kind);
    }
  }

  #[test]
  fn test_builtin_with_params_validates() {
    let inverted = ParamMap::from([("min_depth", 0.2), ("max_depth", 0.1)]);
    assert!(builtin_with_params(PatternKind::FlatBase, &inverted).is_err());
    assert!(builtin_with_params(PatternKind::Custom("X"), &ParamMap::new()).is_err());
  }

  #[test]
  fn test_param_grid_size() {
    assert_eq!(param_grid(DoubleTopDetector::param_meta()).len(), 5);

    let combos = param_grid(HeadAndShouldersDetector::param_meta());
    assert_eq!(combos.len(), 5 * 9);
    assert!(combos.iter().all(|c| c.len() == 2));
  }
}
