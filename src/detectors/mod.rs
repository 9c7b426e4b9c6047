//! Merged-candle pattern detection
//!
//! The per-instrument pipeline, leaves first:
//!
//! - **merge**: raw candles -> (MC1, MC2), with calendar-gap fallback
//! - **engulfing**: tolerant body containment gated on candle colors
//! - **classify**: ordered rule table assigning one of nine pattern labels

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod classify;
pub mod engulfing;
pub mod merge;

pub use classify::*;
pub use engulfing::*;
pub use merge::*;
