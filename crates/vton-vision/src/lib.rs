//! # vton-vision
//!
//! Visualization and export helpers for the try-on pipeline:
//! image↔tensor conversion, display normalization, batch montage tiling,
//! per-sample PNG export, and the directory-based visualization board an
//! external dashboard tails.

pub mod board;
pub mod export;
pub mod montage;
pub mod tensor;

pub use board::Board;
pub use export::save_images;
pub use montage::tile_rows;
pub use tensor::{display_normalize, image_to_tensor, mask_to_tensor, tensor_to_image};
