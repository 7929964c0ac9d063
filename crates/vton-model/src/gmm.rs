//! Geometric matching network.
//!
//! Predicts a TPS warp aligning the garment to the body pose: twin
//! feature pyramids over the person-agnostic input and the garment,
//! channel-wise L2 normalization, dense correlation, and a regression
//! head producing target control-point coordinates for the TPS lattice.

use candle_core::{Module, ModuleT, Result, Tensor};
use candle_nn::{batch_norm, conv2d, linear, BatchNorm, Conv2d, Conv2dConfig, Linear, VarBuilder};

use crate::tps::TpsGridGen;

#[derive(Debug, Clone)]
pub struct GmmConfig {
    /// Output height of the sampling grid.
    pub fine_height: usize,
    /// Output width of the sampling grid.
    pub fine_width: usize,
    /// Control lattice side length (lattice has grid_size^2 points).
    pub grid_size: usize,
    /// Channels of the person-agnostic input (shape + head + pose map).
    pub agnostic_channels: usize,
    /// Channels of the garment input.
    pub cloth_channels: usize,
    /// Base feature width.
    pub ngf: usize,
}

impl Default for GmmConfig {
    fn default() -> Self {
        Self {
            fine_height: 256,
            fine_width: 192,
            grid_size: 5,
            agnostic_channels: 22,
            cloth_channels: 3,
            ngf: 64,
        }
    }
}

/// Strided conv + batch-norm block.
struct DownBlock {
    conv: Conv2d,
    bn: BatchNorm,
}

impl DownBlock {
    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        // Both the 4x4 stride-2 and 3x3 stride-1 blocks use padding 1,
        // so stride-2 halves even inputs exactly.
        let config = Conv2dConfig {
            padding: 1,
            stride,
            ..Default::default()
        };
        let conv = conv2d(in_channels, out_channels, kernel, config, vb.pp("conv"))?;
        let bn = batch_norm(out_channels, 1e-5, vb.pp("bn"))?;
        Ok(Self { conv, bn })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let x = self.conv.forward(x)?;
        let x = self.bn.forward_t(&x, false)?;
        x.relu()
    }
}

/// Four stride-2 blocks then two 3x3 refinement blocks: 16x spatial
/// reduction at 512 channels.
pub struct FeatureExtraction {
    blocks: Vec<DownBlock>,
}

impl FeatureExtraction {
    pub fn new(input_nc: usize, ngf: usize, vb: VarBuilder) -> Result<Self> {
        let mut blocks = Vec::new();
        let widths = [ngf, ngf * 2, ngf * 4, 512];

        let mut in_c = input_nc;
        for (i, &out_c) in widths.iter().enumerate() {
            let out_c = out_c.min(512);
            blocks.push(DownBlock::new(in_c, out_c, 4, 2, vb.pp(format!("down_{i}")))?);
            in_c = out_c;
        }
        blocks.push(DownBlock::new(512, 512, 3, 1, vb.pp("refine_0"))?);
        blocks.push(DownBlock::new(512, 512, 3, 1, vb.pp("refine_1"))?);

        Ok(Self { blocks })
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let mut x = x.clone();
        for block in &self.blocks {
            x = block.forward(&x)?;
        }
        Ok(x)
    }
}

/// Channel-wise L2 normalization.
pub fn feature_l2norm(x: &Tensor) -> Result<Tensor> {
    let norm = x.sqr()?.sum_keepdim(1)?.sqrt()?;
    let norm = (norm + 1e-6)?;
    x.broadcast_div(&norm)
}

/// Dense correlation between two feature maps: `[b, h*w, h, w]`.
pub fn feature_correlation(feat_a: &Tensor, feat_b: &Tensor) -> Result<Tensor> {
    let (b, c, h, w) = feat_a.dims4()?;
    let a = feat_a.reshape((b, c, h * w))?;
    let bt = feat_b.reshape((b, c, h * w))?.transpose(1, 2)?;
    // [b, hw_b, c] x [b, c, hw_a] -> [b, hw_b, hw_a]
    let corr = bt.matmul(&a)?;
    corr.transpose(1, 2)?.reshape((b, h * w, h, w))
}

/// Regression from the correlation volume to TPS control offsets.
pub struct FeatureRegression {
    conv_blocks: Vec<DownBlock>,
    fc: Linear,
}

impl FeatureRegression {
    pub fn new(input_nc: usize, spatial: (usize, usize), output_dim: usize, vb: VarBuilder) -> Result<Self> {
        let conv_blocks = vec![
            DownBlock::new(input_nc, 512, 4, 2, vb.pp("conv_0"))?,
            DownBlock::new(512, 256, 4, 2, vb.pp("conv_1"))?,
            DownBlock::new(256, 128, 3, 1, vb.pp("conv_2"))?,
            DownBlock::new(128, 64, 3, 1, vb.pp("conv_3"))?,
        ];
        let (h, w) = spatial;
        let fc = linear(64 * (h / 4) * (w / 4), output_dim, vb.pp("fc"))?;
        Ok(Self { conv_blocks, fc })
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let mut x = x.clone();
        for block in &self.conv_blocks {
            x = block.forward(&x)?;
        }
        let b = x.dim(0)?;
        let x = x.reshape((b, ()))?;
        let x = self.fc.forward(&x)?;
        x.tanh()
    }
}

/// The full geometric matcher.
pub struct Gmm {
    extraction_a: FeatureExtraction,
    extraction_b: FeatureExtraction,
    regression: FeatureRegression,
    tps: TpsGridGen,
    config: GmmConfig,
}

impl Gmm {
    pub fn new(config: GmmConfig, vb: VarBuilder) -> Result<Self> {
        let extraction_a =
            FeatureExtraction::new(config.agnostic_channels, config.ngf, vb.pp("extraction_a"))?;
        let extraction_b =
            FeatureExtraction::new(config.cloth_channels, config.ngf, vb.pp("extraction_b"))?;

        // Feature maps are 16x smaller than the input.
        let (fh, fw) = (config.fine_height / 16, config.fine_width / 16);
        let tps = TpsGridGen::new(config.fine_height, config.fine_width, config.grid_size)?;
        let regression =
            FeatureRegression::new(fh * fw, (fh, fw), tps.theta_dim(), vb.pp("regression"))?;

        Ok(Self {
            extraction_a,
            extraction_b,
            regression,
            tps,
            config,
        })
    }

    /// Predict the sampling grid warping the garment onto the person.
    ///
    /// Returns `(grid [b, h, w, 2], theta [b, 2*grid_size^2])`.
    pub fn forward(&self, agnostic: &Tensor, cloth: &Tensor) -> Result<(Tensor, Tensor)> {
        let feat_a = feature_l2norm(&self.extraction_a.forward(agnostic)?)?;
        let feat_b = feature_l2norm(&self.extraction_b.forward(cloth)?)?;

        let correlation = feature_correlation(&feat_a, &feat_b)?;
        let theta = self.regression.forward(&correlation)?;
        let grid = self.tps.forward(&theta)?.to_device(agnostic.device())?;

        Ok((grid, theta))
    }

    pub fn config(&self) -> &GmmConfig {
        &self.config
    }
}
