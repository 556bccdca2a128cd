//! Pure progression rules: rank/level derivation and arcade tier math.
//!
//! # Invariants
//! - Nothing in this module performs I/O or reads the clock.

pub mod arcade;
pub mod rank;
