//! Session staging: where a request's files live and where its result
//! will appear.
//!
//! Everything is derived from the session id, so concurrent requests
//! never touch each other's files, and the expected result path is the
//! same path the driver computes from the same inputs.

use std::path::PathBuf;

use vton_core::{PairEntry, SessionId, Stage};
use vton_model::driver::stage_output_dir;

use crate::config::{DriverConfig, StagingConfig};

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub person_filename: String,
    pub cloth_filename: String,
}

impl Session {
    pub fn create() -> Self {
        let id = SessionId::new();
        Self {
            person_filename: format!("person_{id}.jpg"),
            cloth_filename: format!("cloth_{id}.jpg"),
            id,
        }
    }

    fn mode_dir(&self, staging: &StagingConfig) -> PathBuf {
        staging.dataroot.join(&staging.datamode)
    }

    pub fn person_path(&self, staging: &StagingConfig) -> PathBuf {
        self.mode_dir(staging).join("image").join(&self.person_filename)
    }

    pub fn cloth_path(&self, staging: &StagingConfig) -> PathBuf {
        self.mode_dir(staging).join("cloth").join(&self.cloth_filename)
    }

    /// Request-scoped pair manifest path.
    pub fn manifest_path(&self, staging: &StagingConfig) -> PathBuf {
        staging.dataroot.join("pairs").join(format!("{}.txt", self.id))
    }

    pub fn pair(&self) -> PairEntry {
        PairEntry::new(self.person_filename.clone(), self.cloth_filename.clone())
    }

    /// Isolated result directory for this session.
    pub fn result_dir(&self, staging: &StagingConfig) -> PathBuf {
        staging.result_root.join(self.id.to_string())
    }

    /// Exactly where the driver will write this session's try-on image.
    pub fn expected_result(&self, staging: &StagingConfig, driver: &DriverConfig) -> PathBuf {
        let stem = self.pair().person_stem().to_string();
        stage_output_dir(
            &self.result_dir(staging),
            &driver.checkpoint,
            &staging.datamode,
            Stage::Tom,
        )
        .join(format!("{stem}.png"))
    }
}
