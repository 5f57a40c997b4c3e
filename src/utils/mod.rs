//! Utils Module - Helper Functions & Shared Utilities
//!
//! Constants, unit helpers and process-wide telemetry.

pub mod constants;
pub mod telemetry;

pub use constants::*;
pub use telemetry::*;
