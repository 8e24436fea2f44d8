//! Chart pattern detectors
//!
//! Reversal patterns work on swing points; triangles scan windows of swing
//! points; bases scan windows of closing prices.
//!
//! # Pattern Categories
//!
//! - **Reversal (4)**: Head & Shoulders, Inverse Head & Shoulders, Double Top/Bottom
//! - **Triangles (3)**: Ascending, Descending, Symmetrical
//! - **Bases (4)**: Cup & Handle, Flat Base, Saucer Base, Ascending Base

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod bases;
pub mod reversal;
pub mod triangles;

// Re-export all detectors for convenience
pub use bases::*;
pub use helpers::*;
pub use reversal::*;
pub use triangles::*;
