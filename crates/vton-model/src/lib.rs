//! # vton-model
//!
//! The try-on model stack: geometric matching network (GMM), U-net
//! try-on generator (TOM), landmark network for pose estimation,
//! thin-plate-spline grid generation, bilinear grid sampling, dataset
//! assembly, and the two-stage inference driver behind the `vton-driver`
//! binary.
//!
//! Network modules speak `candle_core::Result`; the dataset and driver
//! layers convert into the shared error taxonomy at their boundaries.

pub mod checkpoint;
pub mod dataset;
pub mod driver;
pub mod gmm;
pub mod loader;
pub mod pose;
pub mod sampler;
pub mod tps;
pub mod unet;

pub use checkpoint::{load_weights, DeviceKind};
pub use dataset::{collate, Batch, DatasetOptions, SampleBundle, TryonDataset};
pub use driver::{run, DriverOptions, RunSummary};
pub use gmm::{Gmm, GmmConfig};
pub use pose::{LandmarkConfig, LandmarkNet, PoseEstimator};
pub use sampler::{grid_sample, PaddingMode};
pub use tps::TpsGridGen;
pub use unet::{UnetConfig, UnetGenerator};

/// Map a tensor-layer failure into the shared taxonomy.
pub(crate) fn inference_err(e: impl std::fmt::Display) -> vton_core::Error {
    vton_core::Error::Inference(e.to_string())
}
