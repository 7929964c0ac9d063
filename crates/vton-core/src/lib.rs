//! # vton-core
//!
//! Core types and utilities for the virtual try-on inference pipeline:
//! session identifiers, the keypoint and parse-label taxonomies shared by
//! the preprocessing and model crates, the pair-manifest format, and the
//! error taxonomy.

pub mod error;
pub mod pairs;
pub mod types;

pub use error::{Error, Result};
pub use pairs::*;
pub use types::*;
