//! Bilinear grid sampling.
//!
//! Resamples a `[b, c, h, w]` tensor through a flow field `[b, h', w', 2]`
//! whose last dimension holds (x, y) sampling coordinates in [-1, 1],
//! -1 mapping to the first pixel center and +1 to the last. Inference
//! only; no gradients flow anywhere in this stack.

use candle_core::{bail, Result, Tensor};

/// Out-of-range sampling behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddingMode {
    /// Clamp coordinates to the edge pixel (used for the warped cloth, so
    /// the garment color bleeds instead of going black).
    Border,
    /// Treat everything outside the input as zero (used for masks and
    /// the reference grid).
    Zeros,
}

/// Sample `input` at the locations given by `grid`.
pub fn grid_sample(input: &Tensor, grid: &Tensor, padding: PaddingMode) -> Result<Tensor> {
    let (batch, channels, in_h, in_w) = input.dims4()?;
    let (grid_b, out_h, out_w, two) = grid.dims4()?;
    if grid_b != batch {
        bail!("grid batch {grid_b} does not match input batch {batch}");
    }
    if two != 2 {
        bail!("grid last dimension must be 2, got {two}");
    }

    let src = input.flatten_all()?.to_vec1::<f32>()?;
    let flow = grid.flatten_all()?.to_vec1::<f32>()?;
    let mut out = vec![0f32; batch * channels * out_h * out_w];

    let sample = |data: &[f32], x: i64, y: i64| -> f32 {
        match padding {
            PaddingMode::Border => {
                let x = x.clamp(0, in_w as i64 - 1) as usize;
                let y = y.clamp(0, in_h as i64 - 1) as usize;
                data[y * in_w + x]
            }
            PaddingMode::Zeros => {
                if x < 0 || y < 0 || x >= in_w as i64 || y >= in_h as i64 {
                    0.0
                } else {
                    data[y as usize * in_w + x as usize]
                }
            }
        }
    };

    for b in 0..batch {
        for oy in 0..out_h {
            for ox in 0..out_w {
                let g = ((b * out_h + oy) * out_w + ox) * 2;
                // [-1, 1] -> pixel coordinates with corner alignment.
                let px = (flow[g] + 1.0) * 0.5 * (in_w as f32 - 1.0);
                let py = (flow[g + 1] + 1.0) * 0.5 * (in_h as f32 - 1.0);

                let x0 = px.floor() as i64;
                let y0 = py.floor() as i64;
                let fx = px - x0 as f32;
                let fy = py - y0 as f32;

                for c in 0..channels {
                    let plane = &src[(b * channels + c) * in_h * in_w..][..in_h * in_w];
                    let v00 = sample(plane, x0, y0);
                    let v01 = sample(plane, x0 + 1, y0);
                    let v10 = sample(plane, x0, y0 + 1);
                    let v11 = sample(plane, x0 + 1, y0 + 1);

                    let top = v00 * (1.0 - fx) + v01 * fx;
                    let bottom = v10 * (1.0 - fx) + v11 * fx;
                    out[((b * channels + c) * out_h + oy) * out_w + ox] =
                        top * (1.0 - fy) + bottom * fy;
                }
            }
        }
    }

    Tensor::from_vec(out, (batch, channels, out_h, out_w), input.device())
}

/// Identity flow field for the given output size, `[1, h, w, 2]`.
pub fn identity_grid(h: usize, w: usize, device: &candle_core::Device) -> Result<Tensor> {
    let mut data = Vec::with_capacity(h * w * 2);
    for y in 0..h {
        for x in 0..w {
            data.push(if w > 1 { 2.0 * x as f32 / (w as f32 - 1.0) - 1.0 } else { 0.0 });
            data.push(if h > 1 { 2.0 * y as f32 / (h as f32 - 1.0) - 1.0 } else { 0.0 });
        }
    }
    Tensor::from_vec(data, (1, h, w, 2), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn identity_grid_reproduces_input() -> Result<()> {
        let device = Device::Cpu;
        let data: Vec<f32> = (0..2 * 4 * 6).map(|v| v as f32).collect();
        let input = Tensor::from_vec(data.clone(), (1, 2, 4, 6), &device)?;
        let grid = identity_grid(4, 6, &device)?;

        let out = grid_sample(&input, &grid, PaddingMode::Zeros)?;
        let got = out.flatten_all()?.to_vec1::<f32>()?;
        for (a, b) in got.iter().zip(&data) {
            assert!((a - b).abs() < 1e-5);
        }
        Ok(())
    }

    #[test]
    fn border_padding_clamps_to_edge() -> Result<()> {
        let device = Device::Cpu;
        let input = Tensor::from_vec(vec![1f32, 2.0, 3.0, 4.0], (1, 1, 2, 2), &device)?;
        // Sample far outside the top-left corner.
        let grid = Tensor::from_vec(vec![-5f32, -5.0], (1, 1, 1, 2), &device)?;

        let border = grid_sample(&input, &grid, PaddingMode::Border)?;
        assert_eq!(border.flatten_all()?.to_vec1::<f32>()?, vec![1.0]);

        let zeros = grid_sample(&input, &grid, PaddingMode::Zeros)?;
        assert_eq!(zeros.flatten_all()?.to_vec1::<f32>()?, vec![0.0]);
        Ok(())
    }

    #[test]
    fn midpoint_interpolates() -> Result<()> {
        let device = Device::Cpu;
        let input = Tensor::from_vec(vec![0f32, 1.0], (1, 1, 1, 2), &device)?;
        // x = 0 lands halfway between the two pixels.
        let grid = Tensor::from_vec(vec![0f32, 0.0], (1, 1, 1, 2), &device)?;

        let out = grid_sample(&input, &grid, PaddingMode::Border)?;
        assert!((out.flatten_all()?.to_vec1::<f32>()?[0] - 0.5).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn batch_mismatch_is_rejected() -> Result<()> {
        let device = Device::Cpu;
        let input = Tensor::zeros((2, 1, 2, 2), candle_core::DType::F32, &device)?;
        let grid = identity_grid(2, 2, &device)?;
        assert!(grid_sample(&input, &grid, PaddingMode::Zeros).is_err());
        Ok(())
    }
}
