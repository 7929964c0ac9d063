//! Image↔tensor conversion and display normalization.
//!
//! Model tensors live in [-1, 1] for RGB content and [0, 1] for masks;
//! everything leaving the model goes back through [0, 1] before being
//! quantized to bytes.

use candle_core::{bail, Device, Result, Tensor};
use image::{GrayImage, RgbImage};

/// Convert an RGB image to a `[3, h, w]` tensor in [-1, 1].
pub fn image_to_tensor(img: &RgbImage, device: &Device) -> Result<Tensor> {
    let (w, h) = img.dimensions();
    let (w, h) = (w as usize, h as usize);
    let mut data = vec![0f32; 3 * h * w];
    for (x, y, pixel) in img.enumerate_pixels() {
        let idx = y as usize * w + x as usize;
        for ch in 0..3 {
            data[ch * h * w + idx] = pixel[ch] as f32 / 127.5 - 1.0;
        }
    }
    Tensor::from_vec(data, (3, h, w), device)
}

/// Convert a grayscale mask to a `[1, h, w]` tensor in [0, 1].
pub fn mask_to_tensor(mask: &GrayImage, device: &Device) -> Result<Tensor> {
    let (w, h) = mask.dimensions();
    let (w, h) = (w as usize, h as usize);
    let mut data = vec![0f32; h * w];
    for (x, y, pixel) in mask.enumerate_pixels() {
        data[y as usize * w + x as usize] = pixel[0] as f32 / 255.0;
    }
    Tensor::from_vec(data, (1, h, w), device)
}

/// Normalize a `[b, c, h, w]` batch for display.
///
/// Tensors whose minimum is negative are assumed to be in [-1, 1] and are
/// rescaled to [0, 1]; everything is clamped to [0, 1] and single-channel
/// batches are replicated to three channels. Applying this twice is the
/// same as applying it once.
pub fn display_normalize(t: &Tensor) -> Result<Tensor> {
    let min = t.flatten_all()?.min(0)?.to_scalar::<f32>()?;
    let t = if min < 0.0 { t.affine(0.5, 0.5)? } else { t.clone() };
    let t = t.clamp(0f32, 1f32)?;

    if t.dim(1)? == 1 {
        t.repeat((1, 3, 1, 1))
    } else {
        Ok(t)
    }
}

/// Convert a `[c, h, w]` tensor (c = 1 or 3, any of the model ranges)
/// back to an RGB image.
pub fn tensor_to_image(t: &Tensor) -> Result<RgbImage> {
    let t = display_normalize(&t.unsqueeze(0)?)?.squeeze(0)?;
    let (c, h, w) = t.dims3()?;
    if c != 3 {
        bail!("expected 1 or 3 channels, got {c}");
    }

    let data = t.flatten_all()?.to_vec1::<f32>()?;
    let img = RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let idx = y as usize * w + x as usize;
        let quantize = |v: f32| (v * 255.0).round().clamp(0.0, 255.0) as u8;
        image::Rgb([
            quantize(data[idx]),
            quantize(data[h * w + idx]),
            quantize(data[2 * h * w + idx]),
        ])
    });
    Ok(img)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_round_trip() -> Result<()> {
        let img = RgbImage::from_fn(4, 6, |x, y| image::Rgb([x as u8 * 60, y as u8 * 40, 128]));
        let t = image_to_tensor(&img, &Device::Cpu)?;
        assert_eq!(t.dims(), &[3, 6, 4]);

        let back = tensor_to_image(&t)?;
        for (a, b) in back.pixels().zip(img.pixels()) {
            for ch in 0..3 {
                assert!((a[ch] as i16 - b[ch] as i16).abs() <= 1);
            }
        }
        Ok(())
    }

    #[test]
    fn negative_min_lands_in_unit_range() -> Result<()> {
        let t = Tensor::from_vec(vec![-1f32, -0.5, 0.0, 1.0], (1, 1, 2, 2), &Device::Cpu)?;
        let n = display_normalize(&t)?;
        let values = n.flatten_all()?.to_vec1::<f32>()?;
        assert!(values.iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert_eq!(values[0], 0.0);
        assert_eq!(values[3], 1.0);
        Ok(())
    }

    #[test]
    fn normalize_is_idempotent() -> Result<()> {
        let t = Tensor::from_vec(vec![-0.8f32, 0.2, 0.6, 1.0], (1, 1, 2, 2), &Device::Cpu)?;
        let once = display_normalize(&t)?;
        let twice = display_normalize(&once)?;
        let a = once.flatten_all()?.to_vec1::<f32>()?;
        let b = twice.flatten_all()?.to_vec1::<f32>()?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn single_channel_is_replicated() -> Result<()> {
        let t = Tensor::zeros((2, 1, 4, 4), candle_core::DType::F32, &Device::Cpu)?;
        let n = display_normalize(&t)?;
        assert_eq!(n.dims(), &[2, 3, 4, 4]);
        Ok(())
    }
}
