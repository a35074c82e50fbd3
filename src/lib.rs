//! # Raster Scan Core Library
//!
//! This crate plans rectangular raster scans for a steerable-mirror scanning
//! microscope, generates the per-sample mirror waveform that realizes them, and
//! corrects the row misalignment that bidirectional scanning introduces into the
//! acquired images.
//!
//! ## Crate Structure
//!
//! - **`solver`**: A generic lazy constraint solver. Named variables are derived
//!   on demand by ordered fallback formulas, memoized, and invalidated precisely
//!   when an input changes.
//! - **`geometry`**: The rectangular scan graph built on the solver, plus
//!   `RectScan` (the configurable scan) and `ScanGeometry` (the resolved result).
//! - **`trajectory`**: Turns a `ScanGeometry` into x/y sample arrays, including
//!   overscan and serpentine row reversal, through a caller-supplied device mapper.
//! - **`image`**: Rebuilds images from the acquired sample stream and handles the
//!   overscan region.
//! - **`decomb`**: Finds and removes the column shift between the two fields of a
//!   bidirectional image.
//! - **`config`**: Figment-based loading of TOML configuration with environment
//!   overrides.
//! - **`logging`**: `tracing-subscriber` setup for the command-line tool.
//! - **`error`**: The crate-wide `ScanError` enum.
//! - **`validation`**: Small range and format checks shared by config and inputs.

pub mod config;
pub mod decomb;
pub mod error;
pub mod geometry;
pub mod image;
pub mod logging;
pub mod solver;
pub mod trajectory;
pub mod validation;

pub use error::{ScanError, ScanResult};
