//! Pose estimation: pretrained landmark network and its facade.
//!
//! The landmark network is a small convolutional encoder producing one
//! heatmap per COCO-18 keypoint at 1/8 resolution; decoding takes each
//! heatmap's argmax cell and squashes its activation into a confidence.
//! The facade caches skeletons as JSON next to the person images so a
//! dataset pass only runs the network once per image.

use std::fs;
use std::path::Path;

use candle_core::{Device, IndexOp, Module, ModuleT, Result, Tensor};
use candle_nn::{batch_norm, conv2d, BatchNorm, Conv2d, Conv2dConfig, VarBuilder};
use image::RgbImage;
use vton_core::{Keypoint, PosePoint, PoseRecord, PoseSkeleton};

use crate::checkpoint::{load_weights, DeviceKind};
use crate::inference_err;

#[derive(Debug, Clone)]
pub struct LandmarkConfig {
    /// Input resolution the network was trained at (width, height).
    pub input_width: usize,
    pub input_height: usize,
    /// Base feature width.
    pub channels: usize,
    pub n_keypoints: usize,
}

impl Default for LandmarkConfig {
    fn default() -> Self {
        Self {
            input_width: 192,
            input_height: 256,
            channels: 32,
            n_keypoints: Keypoint::COUNT,
        }
    }
}

struct ConvBlock {
    conv: Conv2d,
    bn: BatchNorm,
}

impl ConvBlock {
    fn new(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let config = Conv2dConfig {
            padding: 1,
            stride,
            ..Default::default()
        };
        let conv = conv2d(in_channels, out_channels, 3, config, vb.pp("conv"))?;
        let bn = batch_norm(out_channels, 1e-5, vb.pp("bn"))?;
        Ok(Self { conv, bn })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let x = self.conv.forward(x)?;
        let x = self.bn.forward_t(&x, false)?;
        x.relu()
    }
}

/// Heatmap landmark network: three stride-2 stages then a 1x1 head.
pub struct LandmarkNet {
    stem: ConvBlock,
    stage1: ConvBlock,
    stage2: ConvBlock,
    refine: ConvBlock,
    head: Conv2d,
    config: LandmarkConfig,
}

impl LandmarkNet {
    pub fn new(config: LandmarkConfig, vb: VarBuilder) -> Result<Self> {
        let c = config.channels;
        let stem = ConvBlock::new(3, c, 2, vb.pp("stem"))?;
        let stage1 = ConvBlock::new(c, c * 2, 2, vb.pp("stage1"))?;
        let stage2 = ConvBlock::new(c * 2, c * 4, 2, vb.pp("stage2"))?;
        let refine = ConvBlock::new(c * 4, c * 4, 1, vb.pp("refine"))?;
        let head = conv2d(
            c * 4,
            config.n_keypoints,
            1,
            Conv2dConfig::default(),
            vb.pp("head"),
        )?;

        Ok(Self {
            stem,
            stage1,
            stage2,
            refine,
            head,
            config,
        })
    }

    /// Heatmaps `[b, n_keypoints, h/8, w/8]`.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let x = self.stem.forward(x)?;
        let x = self.stage1.forward(&x)?;
        let x = self.stage2.forward(&x)?;
        let x = self.refine.forward(&x)?;
        self.head.forward(&x)
    }

    /// Decode one sample's heatmaps into image-space keypoints.
    ///
    /// `(out_width, out_height)` is the coordinate space of the returned
    /// points (usually the original photo's dimensions).
    pub fn decode(
        &self,
        heatmaps: &Tensor,
        out_width: f32,
        out_height: f32,
    ) -> Result<PoseSkeleton> {
        let (n, h, w) = heatmaps.dims3()?;
        let mut points = [PosePoint::default(); Keypoint::COUNT];

        for (k, slot) in points.iter_mut().enumerate().take(n) {
            let map: Vec<f32> = heatmaps.i(k)?.flatten_all()?.to_vec1()?;
            let (mut best_idx, mut best) = (0usize, f32::NEG_INFINITY);
            for (idx, &v) in map.iter().enumerate() {
                if v > best {
                    best = v;
                    best_idx = idx;
                }
            }

            // Cell center, mapped back to the output coordinate space.
            let cx = (best_idx % w) as f32 + 0.5;
            let cy = (best_idx / w) as f32 + 0.5;
            let confidence = 1.0 / (1.0 + (-best).exp());
            *slot = PosePoint::new(
                cx / w as f32 * out_width,
                cy / h as f32 * out_height,
                confidence,
            );
        }

        Ok(PoseSkeleton::new(points))
    }

    pub fn config(&self) -> &LandmarkConfig {
        &self.config
    }
}

/// Checkpointed estimator with JSON caching and annotation support.
pub struct PoseEstimator {
    net: LandmarkNet,
    device: Device,
}

impl PoseEstimator {
    /// Load the landmark checkpoint onto the selected device.
    pub fn load(
        checkpoint: &Path,
        config: LandmarkConfig,
        device_kind: DeviceKind,
    ) -> vton_core::Result<Self> {
        let device = device_kind.select()?;
        let vb = load_weights(checkpoint, &device)?;
        let net = LandmarkNet::new(config, vb)
            .map_err(|e| vton_core::Error::CheckpointLoad(e.to_string()))?;
        Ok(Self { net, device })
    }

    /// Estimate a skeleton for a person photo, in the photo's pixel space.
    pub fn estimate(&self, person: &RgbImage) -> vton_core::Result<PoseSkeleton> {
        let cfg = self.net.config();
        let resized = image::imageops::resize(
            person,
            cfg.input_width as u32,
            cfg.input_height as u32,
            image::imageops::FilterType::Triangle,
        );
        let input = vton_vision::image_to_tensor(&resized, &self.device)
            .map_err(inference_err)?
            .unsqueeze(0)
            .map_err(inference_err)?;

        let heatmaps = self.net.forward(&input).map_err(inference_err)?;
        let heatmaps = heatmaps.i(0).map_err(inference_err)?;
        self.net
            .decode(
                &heatmaps,
                person.width() as f32,
                person.height() as f32,
            )
            .map_err(|e| vton_core::Error::Pose(e.to_string()))
    }

    /// Return the cached skeleton for `stem`, estimating and caching it
    /// when absent. A fresh estimate also writes an annotated preview
    /// (`<stem>_vis.png`) next to the cache.
    pub fn estimate_cached(
        &self,
        person: &RgbImage,
        pose_dir: &Path,
        stem: &str,
    ) -> vton_core::Result<PoseSkeleton> {
        let path = pose_dir.join(format!("{stem}_keypoints.json"));
        if path.exists() {
            return read_skeleton(&path);
        }

        let skeleton = self.estimate(person)?;
        write_skeleton(&path, &skeleton)?;

        let preview = vton_preprocess::annotate_pose(person, &skeleton);
        let preview_path = pose_dir.join(format!("{stem}_vis.png"));
        preview
            .save(&preview_path)
            .map_err(|e| vton_core::Error::Image(format!("{}: {e}", preview_path.display())))?;
        Ok(skeleton)
    }
}

/// Read a cached skeleton JSON.
pub fn read_skeleton(path: &Path) -> vton_core::Result<PoseSkeleton> {
    let text = fs::read_to_string(path).map_err(|e| vton_core::Error::io(path, e))?;
    let record: PoseRecord = serde_json::from_str(&text)?;
    record.into_skeleton()
}

/// Write a skeleton JSON, creating the pose directory as needed.
pub fn write_skeleton(path: &Path, skeleton: &PoseSkeleton) -> vton_core::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| vton_core::Error::io(parent, e))?;
    }
    let record = PoseRecord::from(skeleton);
    let text = serde_json::to_string_pretty(&record)?;
    fs::write(path, text).map_err(|e| vton_core::Error::io(path, e))
}
