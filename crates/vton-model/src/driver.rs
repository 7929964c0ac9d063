//! Two-stage inference driver.
//!
//! Loads a checkpoint, iterates the dataset exactly once, and writes one
//! output image per sample under
//! `<result_dir>/<checkpoint_stem>/<datamode>/<stage_subdir>/`, logging
//! montages to the visualization board along the way. The HTTP layer
//! computes the same path from the same inputs; the contract lives in
//! [`stage_output_dir`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use candle_core::{Device, Tensor};
use tracing::info;
use vton_core::{Result, Stage};
use vton_vision::{save_images, Board};

use crate::checkpoint::{checkpoint_stem, load_weights, DeviceKind};
use crate::dataset::{DatasetOptions, TryonDataset};
use crate::gmm::{Gmm, GmmConfig};
use crate::inference_err;
use crate::loader::Loader;
use crate::pose::{LandmarkConfig, PoseEstimator};
use crate::sampler::{grid_sample, PaddingMode};
use crate::unet::{UnetConfig, UnetGenerator};

#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Run name, used for the board subdirectory.
    pub name: String,
    pub stage: Stage,
    pub dataroot: PathBuf,
    pub datamode: String,
    pub data_list: PathBuf,
    pub checkpoint: PathBuf,
    /// Landmark checkpoint enabling on-the-fly pose derivation.
    pub pose_checkpoint: Option<PathBuf>,
    pub result_dir: PathBuf,
    pub board_dir: PathBuf,
    pub batch_size: usize,
    pub workers: usize,
    /// Log a board montage every N steps.
    pub display_count: usize,
    pub device: DeviceKind,
}

/// Outcome of a driver run.
#[derive(Debug)]
pub struct RunSummary {
    pub samples: usize,
    pub steps: usize,
    /// Directory holding the stage's primary outputs.
    pub output_dir: PathBuf,
}

/// The result-path contract shared with the HTTP layer:
/// `<result_dir>/<checkpoint_stem>/<datamode>/<stage_subdir>`.
pub fn stage_output_dir(
    result_dir: &Path,
    checkpoint: &Path,
    datamode: &str,
    stage: Stage,
) -> PathBuf {
    result_dir
        .join(checkpoint_stem(checkpoint))
        .join(datamode)
        .join(stage.output_subdir())
}

/// Run one stage over the whole dataset.
pub fn run(opts: DriverOptions) -> Result<RunSummary> {
    info!(stage = %opts.stage, name = %opts.name, "starting test run");
    let device = opts.device.select()?;

    let pose = match &opts.pose_checkpoint {
        Some(path) => Some(PoseEstimator::load(
            path,
            LandmarkConfig::default(),
            opts.device,
        )?),
        None => None,
    };

    let dataset_opts = DatasetOptions::new(
        opts.dataroot.clone(),
        opts.datamode.clone(),
        opts.data_list.clone(),
    );
    let dataset = Arc::new(TryonDataset::open(dataset_opts, pose)?);
    info!(samples = dataset.len(), "dataset ready");

    let loader = Loader::new(Arc::clone(&dataset), opts.batch_size, opts.workers);
    let mut board = Board::create(opts.board_dir.join(&opts.name))?;
    let weights = load_weights(&opts.checkpoint, &device)?;

    let summary = match opts.stage {
        Stage::Gmm => {
            let model = Gmm::new(GmmConfig::default(), weights)
                .map_err(|e| vton_core::Error::CheckpointLoad(e.to_string()))?;
            run_gmm(&opts, &device, loader, &model, &mut board)?
        }
        Stage::Tom => {
            let model = UnetGenerator::new(UnetConfig::default(), weights)
                .map_err(|e| vton_core::Error::CheckpointLoad(e.to_string()))?;
            run_tom(&opts, &device, loader, &model, &mut board)?
        }
    };

    info!(
        stage = %opts.stage,
        samples = summary.samples,
        "finished test run"
    );
    Ok(summary)
}

fn run_gmm(
    opts: &DriverOptions,
    device: &Device,
    loader: Loader,
    model: &Gmm,
    board: &mut Board,
) -> Result<RunSummary> {
    let warp_cloth_dir =
        stage_output_dir(&opts.result_dir, &opts.checkpoint, &opts.datamode, Stage::Gmm);
    let warp_mask_dir = warp_cloth_dir.with_file_name("warp-mask");

    let mut samples = 0;
    let mut steps = 0;

    for batch in loader {
        let step_start = Instant::now();
        let batch = batch?.to_device(device)?;

        let (grid, _theta) = model
            .forward(&batch.agnostic, &batch.cloth)
            .map_err(inference_err)?;

        let warped_cloth =
            grid_sample(&batch.cloth, &grid, PaddingMode::Border).map_err(inference_err)?;
        let warped_mask =
            grid_sample(&batch.cloth_mask, &grid, PaddingMode::Zeros).map_err(inference_err)?;
        let warped_grid =
            grid_sample(&batch.grid_image, &grid, PaddingMode::Zeros).map_err(inference_err)?;

        save_images(&warped_cloth, &batch.c_names, &warp_cloth_dir)?;
        let mask_signed = warped_mask.affine(2.0, -1.0).map_err(inference_err)?;
        save_images(&mask_signed, &batch.c_names, &warp_mask_dir)?;

        steps += 1;
        samples += batch.len();

        if steps % opts.display_count.max(1) == 0 {
            let overlay = ((&warped_cloth + &batch.image).map_err(inference_err)?)
                .affine(0.5, 0.0)
                .map_err(inference_err)?;
            let visuals = vec![
                vec![batch.head.clone(), batch.shape.clone(), batch.pose_vis.clone()],
                vec![batch.cloth.clone(), warped_cloth, batch.parse_cloth.clone()],
                vec![warped_grid, overlay, batch.image.clone()],
            ];
            board.add_images("combine", &visuals, steps)?;
        }
        info!(
            step = steps,
            elapsed_ms = step_start.elapsed().as_millis() as u64,
            "gmm step"
        );
    }

    Ok(RunSummary {
        samples,
        steps,
        output_dir: warp_cloth_dir,
    })
}

fn run_tom(
    opts: &DriverOptions,
    device: &Device,
    loader: Loader,
    model: &UnetGenerator,
    board: &mut Board,
) -> Result<RunSummary> {
    let try_on_dir =
        stage_output_dir(&opts.result_dir, &opts.checkpoint, &opts.datamode, Stage::Tom);

    let mut samples = 0;
    let mut steps = 0;

    for batch in loader {
        let step_start = Instant::now();
        let batch = batch?.to_device(device)?;

        let input =
            Tensor::cat(&[&batch.agnostic, &batch.cloth], 1).map_err(inference_err)?;
        let outputs = model.forward(&input).map_err(inference_err)?;

        let p_rendered = outputs
            .narrow(1, 0, 3)
            .and_then(|t| t.tanh())
            .map_err(inference_err)?;
        let blend = outputs.narrow(1, 3, 1).map_err(inference_err)?;
        let m_composite = candle_nn::ops::sigmoid(&blend).map_err(inference_err)?;

        let p_tryon = composite(&batch.cloth, &p_rendered, &m_composite)?;

        save_images(&p_tryon, &batch.im_names, &try_on_dir)?;

        steps += 1;
        samples += batch.len();

        if steps % opts.display_count.max(1) == 0 {
            let mask_signed = batch.cloth_mask.affine(2.0, -1.0).map_err(inference_err)?;
            let visuals = vec![
                vec![batch.head.clone(), batch.shape.clone(), batch.pose_vis.clone()],
                vec![batch.cloth.clone(), mask_signed, m_composite],
                vec![p_rendered, p_tryon, batch.image.clone()],
            ];
            board.add_images("combine", &visuals, steps)?;
        }
        info!(
            step = steps,
            elapsed_ms = step_start.elapsed().as_millis() as u64,
            "tom step"
        );
    }

    Ok(RunSummary {
        samples,
        steps,
        output_dir: try_on_dir,
    })
}

/// `cloth * mask + rendered * (1 - mask)`.
fn composite(cloth: &Tensor, rendered: &Tensor, mask: &Tensor) -> Result<Tensor> {
    let keep = cloth.broadcast_mul(mask).map_err(inference_err)?;
    let inv = mask.affine(-1.0, 1.0).map_err(inference_err)?;
    let fill = rendered.broadcast_mul(&inv).map_err(inference_err)?;
    (keep + fill).map_err(inference_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn output_dir_contract() {
        let dir = stage_output_dir(
            Path::new("runs/abc"),
            Path::new("checkpoints/tom_final.safetensors"),
            "test",
            Stage::Tom,
        );
        assert_eq!(dir, PathBuf::from("runs/abc/tom_final/test/try-on"));

        let dir = stage_output_dir(
            Path::new("runs/abc"),
            Path::new("gmm_final.safetensors"),
            "test",
            Stage::Gmm,
        );
        assert_eq!(dir, PathBuf::from("runs/abc/gmm_final/test/warp-cloth"));
    }

    #[test]
    fn composite_blends_by_mask() -> Result<()> {
        let device = Device::Cpu;
        let cloth = Tensor::full(1f32, (1, 3, 2, 2), &device).map_err(inference_err)?;
        let rendered = Tensor::full(-1f32, (1, 3, 2, 2), &device).map_err(inference_err)?;

        // Mask 1 keeps the cloth; mask 0 keeps the rendered person.
        let mask = Tensor::from_vec(vec![1f32, 0.0, 0.5, 0.25], (1, 1, 2, 2), &device)
            .map_err(inference_err)?;
        let out = composite(&cloth, &rendered, &mask)?;
        let values = out.flatten_all().and_then(|t| t.to_vec1::<f32>()).map_err(inference_err)?;
        assert_eq!(values[0], 1.0);
        assert_eq!(values[1], -1.0);
        assert_eq!(values[2], 0.0);
        assert_eq!(values[3], -0.5);
        Ok(())
    }
}
