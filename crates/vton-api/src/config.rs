//! API server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Complete server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// HTTP server configuration
    pub http: HttpConfig,

    /// Upload staging layout
    pub staging: StagingConfig,

    /// Driver subprocess configuration
    pub driver: DriverConfig,

    /// Job queue bounds
    pub jobs: JobConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Bind address
    pub bind_addr: SocketAddr,

    /// Maximum request body size (bytes)
    pub max_body_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Dataset root the driver reads from
    pub dataroot: PathBuf,

    /// Data mode subdirectory under the dataroot
    pub datamode: String,

    /// Root for per-session result directories
    pub result_root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Driver executable
    pub program: String,

    /// Arguments placed before the generated flags
    pub base_args: Vec<String>,

    /// Composition-stage checkpoint (safetensors)
    pub checkpoint: PathBuf,

    /// Landmark checkpoint for pose derivation
    pub pose_checkpoint: Option<PathBuf>,

    /// Board root for driver visualization output
    pub board_dir: PathBuf,

    /// Dataset prefetch workers per run
    pub workers: usize,

    /// Device selector passed through (auto, cpu, cuda[:N], metal)
    pub device: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Maximum driver subprocesses running at once
    pub max_concurrent: usize,

    /// Per-run wall-clock limit (seconds); the child is killed on expiry
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig {
                bind_addr: "0.0.0.0:8080".parse().unwrap(),
                max_body_size: 16 * 1024 * 1024, // 16MB of photos
            },
            staging: StagingConfig {
                dataroot: PathBuf::from("data"),
                datamode: "test".to_string(),
                result_root: PathBuf::from("runs"),
            },
            driver: DriverConfig {
                program: "vton-driver".to_string(),
                base_args: Vec::new(),
                checkpoint: PathBuf::from("checkpoints/tom_final.safetensors"),
                pose_checkpoint: Some(PathBuf::from("checkpoints/landmark.safetensors")),
                board_dir: PathBuf::from("board"),
                workers: 1,
                device: "auto".to_string(),
            },
            jobs: JobConfig {
                max_concurrent: 1,
                timeout_secs: 300,
            },
        }
    }
}

impl ApiConfig {
    /// Load configuration from file, overlaid with `VTON_`-prefixed
    /// environment variables.
    pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("VTON").separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    /// Load from environment variables only.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("VTON").separator("__"))
            .build()?;

        settings.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let config = ApiConfig::default();
        assert_eq!(config.http.bind_addr.port(), 8080);
        assert_eq!(config.jobs.max_concurrent, 1);
        assert_eq!(config.staging.datamode, "test");
    }
}
