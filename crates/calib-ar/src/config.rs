//! JSON run configuration. Every section is optional.

use crate::error::ConfigError;
use crate::overlay::{ArObject, PlaybackConfig};
use crate::selector::SelectionConfig;
use calib_ar_chessboard::ChessboardParams;
use calib_ar_core::{BoardPattern, CellSize};
use calib_ar_solver::{CalibrationSeeds, PlanarSolver};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

fn default_log_level() -> String {
    "info".to_owned()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Video file, image directory or single image.
    pub source: Option<PathBuf>,
    pub pattern: BoardPattern,
    pub cell_size: CellSize,
    pub selection: SelectionConfig,
    pub chessboard: ChessboardParams,
    pub solver: PlanarSolver,
    pub seeds: CalibrationSeeds,
    pub ar: ArObject,
    pub playback: PlaybackConfig,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source: None,
            pattern: BoardPattern::default(),
            cell_size: CellSize::default(),
            selection: SelectionConfig::default(),
            chessboard: ChessboardParams::default(),
            solver: PlanarSolver::default(),
            seeds: CalibrationSeeds::default(),
            ar: ArObject::default(),
            playback: PlaybackConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        calib_ar_core::parse_level(&self.log_level)
            .ok_or_else(|| ConfigError::LogLevel(self.log_level.clone()))
    }
}
