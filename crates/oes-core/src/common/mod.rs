pub mod config;
pub mod constants;

pub use config::{FitConfig, FitConfigError, load_fit_config};
