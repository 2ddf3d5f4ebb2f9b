//! JSON configuration for a calibration run.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{PipelineConfig, TransportParams};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn default_peer() -> String {
    "127.0.0.1:999".to_string()
}

/// Everything needed to connect to the peer and run the frame loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepthCalibConfig {
    /// `host:port` of the peer owning the target frame.
    #[serde(default = "default_peer")]
    pub peer: String,
    #[serde(default)]
    pub transport: TransportParams,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl Default for DepthCalibConfig {
    fn default() -> Self {
        Self {
            peer: default_peer(),
            transport: TransportParams::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl DepthCalibConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
