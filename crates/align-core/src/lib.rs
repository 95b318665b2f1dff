//! Shared foundation of the neural-align workspace.
//!
//! Holds the trial-table data model, time windows, the error type, CLI
//! settings, process parameters (seeded generator), figure styling constants
//! and small numeric helpers used by the loader and the array builders.

pub mod epoch;
pub mod error;
pub mod models;
pub mod params;
pub mod serial;
pub mod settings;
pub mod stats;
pub mod style;

pub use error::{AlignError, Result};
