//! Fit configuration shared by the session and the command line front end.
//!
//! Every field is defaulted, so a JSON file only needs to name the values it
//! overrides:
//!
//! ```json
//! { "method": "least_squares", "maxIterations": 500, "pointsPerNm": 2000 }
//! ```

use super::constants::{DEFAULT_MAX_ITERATIONS, DEFAULT_POINTS_PER_NM, DEFAULT_WAV_RESERVE};
use crate::domain::{SpectrumOutput, WavelengthMedium};
use crate::optimize::MinimizerMethod;
use crate::spectrum::ResidualWeighting;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_X_TOLERANCE: f64 = 1.0e-6;
pub const DEFAULT_F_TOLERANCE: f64 = 1.0e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FitConfig {
    pub method: MinimizerMethod,
    pub max_iterations: usize,
    pub points_per_nm: f64,
    pub wav_reserve: f64,
    pub medium: WavelengthMedium,
    pub output: SpectrumOutput,
    pub weighting: ResidualWeighting,
    pub x_tolerance: f64,
    pub f_tolerance: f64,
    /// Directory searched for `<species>.db` line-list files.
    pub data_dir: PathBuf,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            method: MinimizerMethod::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            points_per_nm: DEFAULT_POINTS_PER_NM,
            wav_reserve: DEFAULT_WAV_RESERVE,
            medium: WavelengthMedium::default(),
            output: SpectrumOutput::default(),
            weighting: ResidualWeighting::default(),
            x_tolerance: DEFAULT_X_TOLERANCE,
            f_tolerance: DEFAULT_F_TOLERANCE,
            data_dir: PathBuf::from("data"),
        }
    }
}

impl FitConfig {
    pub fn line_list_path(&self, species: &str) -> PathBuf {
        self.data_dir.join(format!("{species}.db"))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FitConfigError {
    #[error("failed to read fit configuration '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse fit configuration '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("fit configuration '{}' is invalid: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
}

pub fn load_fit_config(config_path: impl AsRef<Path>) -> Result<FitConfig, FitConfigError> {
    let config_path = config_path.as_ref();
    let source = fs::read_to_string(config_path).map_err(|source| FitConfigError::Read {
        path: config_path.to_path_buf(),
        source,
    })?;
    let config: FitConfig =
        serde_json::from_str(&source).map_err(|source| FitConfigError::Parse {
            path: config_path.to_path_buf(),
            source,
        })?;

    if !(config.points_per_nm.is_finite() && config.points_per_nm > 0.0) {
        return Err(FitConfigError::Invalid {
            path: config_path.to_path_buf(),
            reason: format!("pointsPerNm must be > 0, got {}", config.points_per_nm),
        });
    }
    if !(config.wav_reserve.is_finite() && config.wav_reserve >= 0.0) {
        return Err(FitConfigError::Invalid {
            path: config_path.to_path_buf(),
            reason: format!("wavReserve must be >= 0, got {}", config.wav_reserve),
        });
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::{FitConfig, FitConfigError, load_fit_config};
    use crate::optimize::MinimizerMethod;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn partial_config_keeps_defaults_for_missing_fields() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("fit.json");
        fs::write(
            &path,
            r#"{ "method": "least_squares", "maxIterations": 50, "dataDir": "lines" }"#,
        )
        .expect("config should be written");

        let config = load_fit_config(&path).expect("config should load");
        assert_eq!(config.method, MinimizerMethod::LeastSquares);
        assert_eq!(config.max_iterations, 50);
        assert_eq!(config.points_per_nm, FitConfig::default().points_per_nm);
        assert_eq!(config.line_list_path("OH"), PathBuf::from("lines/OH.db"));
    }

    #[test]
    fn invalid_mesh_density_is_rejected() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("fit.json");
        fs::write(&path, r#"{ "pointsPerNm": 0 }"#).expect("config should be written");

        let error = load_fit_config(&path).expect_err("zero density should fail");
        assert!(matches!(error, FitConfigError::Invalid { .. }));
    }

    #[test]
    fn missing_config_reports_read_error() {
        let error = load_fit_config("/nonexistent/fit.json").expect_err("missing file");
        assert!(matches!(error, FitConfigError::Read { .. }));
    }
}
