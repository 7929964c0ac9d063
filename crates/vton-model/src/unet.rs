//! U-net try-on generator.
//!
//! Recursive skip-connection blocks: each level downsamples with a 4x4
//! stride-2 conv (LeakyReLU going down, ReLU coming up), recurses, then
//! upsamples with a transposed conv and concatenates its own input onto
//! the result. Instance normalization is expressed as group-norm with
//! one group per channel. The outermost block returns raw values; the
//! driver splits the 4 output channels into a rendered person (tanh)
//! and a blend mask (sigmoid).

use candle_core::{Module, Result, Tensor};
use candle_nn::{
    conv2d, conv_transpose2d, group_norm, Conv2d, Conv2dConfig, ConvTranspose2d,
    ConvTranspose2dConfig, GroupNorm, VarBuilder,
};

#[derive(Debug, Clone)]
pub struct UnetConfig {
    /// Input channels (agnostic 22 + cloth 3).
    pub input_channels: usize,
    /// Output channels (rendered RGB + blend mask).
    pub output_channels: usize,
    /// Number of downsampling levels.
    pub num_downs: usize,
    /// Base feature width.
    pub ngf: usize,
}

impl Default for UnetConfig {
    fn default() -> Self {
        Self {
            input_channels: 25,
            output_channels: 4,
            num_downs: 6,
            ngf: 64,
        }
    }
}

enum BlockKind {
    Outermost,
    Middle,
    Innermost,
}

/// One level of the U-net.
struct UnetSkipBlock {
    kind: BlockKind,
    down_conv: Conv2d,
    down_norm: Option<GroupNorm>,
    up_conv: ConvTranspose2d,
    up_norm: Option<GroupNorm>,
    submodule: Option<Box<UnetSkipBlock>>,
}

impl UnetSkipBlock {
    fn new(
        outer_channels: usize,
        inner_channels: usize,
        input_channels: Option<usize>,
        submodule: Option<Box<UnetSkipBlock>>,
        kind: BlockKind,
        vb: VarBuilder,
    ) -> Result<Self> {
        let input_channels = input_channels.unwrap_or(outer_channels);

        let down_config = Conv2dConfig {
            padding: 1,
            stride: 2,
            ..Default::default()
        };
        let down_conv = conv2d(
            input_channels,
            inner_channels,
            4,
            down_config,
            vb.pp("down_conv"),
        )?;

        let up_config = ConvTranspose2dConfig {
            padding: 1,
            stride: 2,
            ..Default::default()
        };

        let (up_in, down_norm, up_norm) = match kind {
            BlockKind::Outermost => (inner_channels * 2, None, None),
            BlockKind::Innermost => (
                inner_channels,
                None,
                Some(instance_norm(outer_channels, vb.pp("up_norm"))?),
            ),
            BlockKind::Middle => (
                inner_channels * 2,
                Some(instance_norm(inner_channels, vb.pp("down_norm"))?),
                Some(instance_norm(outer_channels, vb.pp("up_norm"))?),
            ),
        };
        let up_conv = conv_transpose2d(up_in, outer_channels, 4, up_config, vb.pp("up_conv"))?;

        Ok(Self {
            kind,
            down_conv,
            down_norm,
            up_conv,
            up_norm,
            submodule,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        match self.kind {
            BlockKind::Outermost => {
                let mut y = self.down_conv.forward(x)?;
                if let Some(sub) = &self.submodule {
                    y = sub.forward(&y)?;
                }
                self.up_conv.forward(&y.relu()?)
            }
            BlockKind::Innermost => {
                let y = self.down_conv.forward(&leaky_relu(x)?)?;
                let y = self.up_conv.forward(&y.relu()?)?;
                let y = self.up_norm.as_ref().unwrap().forward(&y)?;
                Tensor::cat(&[x, &y], 1)
            }
            BlockKind::Middle => {
                let mut y = self.down_conv.forward(&leaky_relu(x)?)?;
                y = self.down_norm.as_ref().unwrap().forward(&y)?;
                if let Some(sub) = &self.submodule {
                    y = sub.forward(&y)?;
                }
                let y = self.up_conv.forward(&y.relu()?)?;
                let y = self.up_norm.as_ref().unwrap().forward(&y)?;
                Tensor::cat(&[x, &y], 1)
            }
        }
    }
}

fn leaky_relu(x: &Tensor) -> Result<Tensor> {
    candle_nn::ops::leaky_relu(x, 0.2)
}

fn instance_norm(channels: usize, vb: VarBuilder) -> Result<GroupNorm> {
    group_norm(channels, channels, 1e-5, vb)
}

/// The full generator: `num_downs` nested skip blocks.
pub struct UnetGenerator {
    outer: UnetSkipBlock,
    config: UnetConfig,
}

impl UnetGenerator {
    pub fn new(config: UnetConfig, vb: VarBuilder) -> Result<Self> {
        let ngf = config.ngf;

        // Innermost level at ngf*8.
        let mut block = UnetSkipBlock::new(
            ngf * 8,
            ngf * 8,
            None,
            None,
            BlockKind::Innermost,
            vb.pp("inner"),
        )?;

        // ngf*8 <-> ngf*8 middles (num_downs - 5 of them).
        for i in 0..config.num_downs.saturating_sub(5) {
            block = UnetSkipBlock::new(
                ngf * 8,
                ngf * 8,
                None,
                Some(Box::new(block)),
                BlockKind::Middle,
                vb.pp(format!("mid8_{i}")),
            )?;
        }

        // Widening levels: ngf*4, ngf*2, ngf.
        for (i, factor) in [4usize, 2, 1].into_iter().enumerate() {
            block = UnetSkipBlock::new(
                ngf * factor,
                ngf * factor * 2,
                None,
                Some(Box::new(block)),
                BlockKind::Middle,
                vb.pp(format!("mid_{i}")),
            )?;
        }

        let outer = UnetSkipBlock::new(
            config.output_channels,
            ngf,
            Some(config.input_channels),
            Some(Box::new(block)),
            BlockKind::Outermost,
            vb.pp("outer"),
        )?;

        Ok(Self { outer, config })
    }

    /// Raw `[b, output_channels, h, w]` prediction.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        self.outer.forward(x)
    }

    pub fn config(&self) -> &UnetConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::{VarBuilder, VarMap};

    #[test]
    fn output_matches_input_resolution() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let config = UnetConfig {
            input_channels: 25,
            output_channels: 4,
            num_downs: 6,
            ngf: 4,
        };
        let unet = UnetGenerator::new(config, vb)?;

        // 256x192 divides cleanly by 2^6.
        let x = Tensor::zeros((1, 25, 256, 192), DType::F32, &device)?;
        let y = unet.forward(&x)?;
        assert_eq!(y.dims(), &[1, 4, 256, 192]);
        Ok(())
    }

    #[test]
    fn batch_dimension_is_preserved() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let config = UnetConfig {
            input_channels: 25,
            output_channels: 4,
            num_downs: 5,
            ngf: 2,
        };
        let unet = UnetGenerator::new(config, vb)?;

        let x = Tensor::zeros((3, 25, 64, 64), DType::F32, &device)?;
        let y = unet.forward(&x)?;
        assert_eq!(y.dims(), &[3, 4, 64, 64]);
        Ok(())
    }
}
