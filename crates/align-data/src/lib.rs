//! Data ingestion layer for neural-align.
//!
//! Responsible for parsing raw MAT session files into trial tables, caching
//! parsed tables next to the raw files, and loading the session collections
//! named in a catalog.

pub mod catalog;
pub mod mat;
mod mat5;
pub mod reader;

pub use align_core as core;
