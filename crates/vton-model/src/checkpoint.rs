//! Checkpoint loading and device selection.
//!
//! Checkpoints are safetensors files loaded read-only via a memory map;
//! a missing tensor surfaces at model construction with the variable
//! path in the error.

use std::path::Path;

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use vton_core::{Error, Result};

/// Compute device selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// CUDA if available, otherwise CPU.
    Auto,
    Cpu,
    Cuda(usize),
    Metal,
}

impl DeviceKind {
    pub fn select(self) -> Result<Device> {
        let device = match self {
            DeviceKind::Auto => Device::cuda_if_available(0),
            DeviceKind::Cpu => Ok(Device::Cpu),
            DeviceKind::Cuda(ordinal) => Device::new_cuda(ordinal),
            DeviceKind::Metal => Device::new_metal(0),
        };
        device.map_err(|e| Error::Config(format!("device selection failed: {e}")))
    }
}

impl std::str::FromStr for DeviceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(DeviceKind::Auto),
            "cpu" => Ok(DeviceKind::Cpu),
            "metal" => Ok(DeviceKind::Metal),
            other => {
                if let Some(rest) = other.strip_prefix("cuda") {
                    let ordinal = match rest.strip_prefix(':') {
                        Some(n) => n.parse::<usize>().map_err(|_| {
                            Error::Config(format!("bad cuda ordinal in {other:?}"))
                        })?,
                        None if rest.is_empty() => 0,
                        None => {
                            return Err(Error::Config(format!("unknown device {other:?}")))
                        }
                    };
                    Ok(DeviceKind::Cuda(ordinal))
                } else {
                    Err(Error::Config(format!("unknown device {other:?}")))
                }
            }
        }
    }
}

/// Memory-map a safetensors checkpoint as a variable store.
pub fn load_weights(path: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    if !path.exists() {
        return Err(Error::CheckpointLoad(format!(
            "checkpoint not found: {}",
            path.display()
        )));
    }
    let vb = unsafe {
        VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device)
            .map_err(|e| Error::CheckpointLoad(format!("{}: {e}", path.display())))?
    };
    Ok(vb)
}

/// File stem of a checkpoint, used as the result-directory component.
pub fn checkpoint_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "checkpoint".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_kind_parsing() {
        assert_eq!("auto".parse::<DeviceKind>().unwrap(), DeviceKind::Auto);
        assert_eq!("cpu".parse::<DeviceKind>().unwrap(), DeviceKind::Cpu);
        assert_eq!("cuda".parse::<DeviceKind>().unwrap(), DeviceKind::Cuda(0));
        assert_eq!("cuda:1".parse::<DeviceKind>().unwrap(), DeviceKind::Cuda(1));
        assert!("tpu".parse::<DeviceKind>().is_err());
    }

    #[test]
    fn missing_checkpoint_is_a_load_error() {
        let err = match load_weights(Path::new("/nonexistent/tom.safetensors"), &Device::Cpu) {
            Ok(_) => panic!("expected a load error"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::CheckpointLoad(_)));
    }

    #[test]
    fn stem_drops_extension() {
        assert_eq!(
            checkpoint_stem(Path::new("checkpoints/tom_final.safetensors")),
            "tom_final"
        );
    }
}
