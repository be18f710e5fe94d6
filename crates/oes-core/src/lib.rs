//! Fitting of measured optical-emission spectra against simulated molecular
//! emission: line-list databases, spectrum synthesis, grid matching and a
//! bounded nonlinear least-squares fit loop.

pub mod common;
pub mod domain;
pub mod linedb;
pub mod numerics;
pub mod optimize;
pub mod params;
pub mod session;
pub mod spectrum;
pub mod synth;

pub use common::config::{FitConfig, load_fit_config};
pub use domain::{OesError, OesErrorCategory, OesResult, SpectrumOutput, WavelengthMedium};
pub use linedb::LineDatabase;
pub use optimize::MinimizerMethod;
pub use params::SpeciesParameterSet;
pub use session::{FitOutcome, FitRequest, FitSession, ResultsTable};
pub use spectrum::SpectrumBuffer;
