//! Passes for the Tidal compiler.
pub mod pass;
pub mod passes;
