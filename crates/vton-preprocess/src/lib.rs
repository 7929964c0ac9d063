//! # vton-preprocess
//!
//! Deterministic, pure pixel transforms feeding the try-on model:
//!
//! 1. **Agnostic image**: person photo with garment-covered label classes
//!    replaced by a flat fill, so the model does not condition on the
//!    original garment.
//! 2. **Cloth mask**: fixed-threshold binarization of the garment photo.
//! 3. **Coarse parse**: pose-derived label map for person images that
//!    arrive without an offline human-parse map.
//! 4. **Pose annotation**: skeleton overlay on the person photo.
//!
//! None of these carry learned parameters; given the same input bytes
//! they produce the same output bytes on every platform.

pub mod agnostic;
pub mod annotate;
pub mod cloth_mask;
pub mod parse;

mod raster;

pub use agnostic::agnostic_image;
pub use annotate::annotate_pose;
pub use cloth_mask::{cloth_mask, BACKGROUND_THRESHOLD};
pub use parse::parse_from_pose;
