//! Models Module - Data Structures & Configuration
//!
//! Shared types, configuration, error codes and the plan table.

pub mod config;
pub mod errors;
pub mod plans;
pub mod types;

pub use config::*;
pub use errors::*;
pub use plans::{resolve_plan, Plan, Remaining, RequestLimit};
pub use types::*;
