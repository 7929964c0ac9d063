//! Per-sample PNG export.

use std::fs;
use std::path::{Path, PathBuf};

use candle_core::{IndexOp, Tensor};
use vton_core::{Error, Result};

use crate::tensor::tensor_to_image;

/// Write each element of a `[b, c, h, w]` batch as a PNG under `dir`.
///
/// `names` supplies one file name per batch element; any existing
/// extension is stripped and replaced with `.png`. Returns the written
/// paths in batch order.
pub fn save_images(batch: &Tensor, names: &[String], dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

    let b = batch
        .dim(0)
        .map_err(|e| Error::Image(e.to_string()))?;
    if names.len() != b {
        return Err(Error::InvalidInput(format!(
            "{} names for a batch of {b}",
            names.len()
        )));
    }

    let mut paths = Vec::with_capacity(b);
    for (i, name) in names.iter().enumerate() {
        let sample = batch.i(i).map_err(|e| Error::Image(e.to_string()))?;
        let img = tensor_to_image(&sample).map_err(|e| Error::Image(e.to_string()))?;

        let stem = Path::new(name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.clone());
        let path = dir.join(format!("{stem}.png"));
        img.save(&path)
            .map_err(|e| Error::Image(format!("{}: {e}", path.display())))?;
        paths.push(path);
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn writes_png_per_sample_and_strips_extension() {
        let dir = tempfile::tempdir().unwrap();
        let batch = Tensor::zeros((2, 3, 4, 4), DType::F32, &Device::Cpu).unwrap();
        let names = vec!["person_a.jpg".to_string(), "person_b".to_string()];

        let paths = save_images(&batch, &names, dir.path()).unwrap();
        assert_eq!(paths[0], dir.path().join("person_a.png"));
        assert_eq!(paths[1], dir.path().join("person_b.png"));
        assert!(paths.iter().all(|p| p.exists()));
    }

    #[test]
    fn rejects_name_count_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let batch = Tensor::zeros((2, 3, 4, 4), DType::F32, &Device::Cpu).unwrap();
        assert!(save_images(&batch, &["only_one.jpg".to_string()], dir.path()).is_err());
    }
}
