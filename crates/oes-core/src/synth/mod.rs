//! Composite simulated spectrum of every species attached to a parameter set.

use crate::common::constants::{DEFAULT_POINTS_PER_NM, DEFAULT_WAV_RESERVE};
use crate::domain::{OesError, OesResult, SpectrumOutput, WavelengthMedium};
use crate::linedb::{LineDatabase, SpectrumQuery};
use crate::numerics::deterministic_argsort;
use crate::params::{GlobalParameter, SpeciesParameterSet};
use crate::spectrum::SpectrumBuffer;
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthesisRequest {
    pub wmin: f64,
    pub wmax: f64,
    /// Detector pixel width; `None` convolves with the slit function only.
    pub step: Option<f64>,
    pub points_per_nm: f64,
    pub medium: WavelengthMedium,
    pub output: SpectrumOutput,
    pub wav_reserve: f64,
}

impl SynthesisRequest {
    pub fn new(wmin: f64, wmax: f64) -> Self {
        Self {
            wmin,
            wmax,
            step: None,
            points_per_nm: DEFAULT_POINTS_PER_NM,
            medium: WavelengthMedium::default(),
            output: SpectrumOutput::default(),
            wav_reserve: DEFAULT_WAV_RESERVE,
        }
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_points_per_nm(mut self, points_per_nm: f64) -> Self {
        self.points_per_nm = points_per_nm;
        self
    }

    pub fn with_medium(mut self, medium: WavelengthMedium) -> Self {
        self.medium = medium;
        self
    }

    pub fn with_output(mut self, output: SpectrumOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_reserve(mut self, wav_reserve: f64) -> Self {
        self.wav_reserve = wav_reserve;
        self
    }
}

/// Builds the simulated spectrum for `parameters` over `[wmin, wmax]`.
///
/// Each attached species contributes its line scatter scaled by its
/// intensity; the merged scatter is put on a uniform mesh, broadened with the
/// slit function and finally offset by the linear baseline. With no species
/// attached, or no lines in the window, the result is empty.
pub fn synthesize(
    parameters: &SpeciesParameterSet,
    databases: &mut HashMap<String, LineDatabase>,
    request: &SynthesisRequest,
) -> OesResult<SpectrumBuffer> {
    if let Some(signal) = empty_model_error(parameters) {
        warn!(placeholder = signal.placeholder(), "{}", signal.message());
        return Ok(SpectrumBuffer::empty());
    }

    let mut wavelengths = Vec::new();
    let mut signal = Vec::new();

    for block in parameters.species_blocks() {
        let database = databases.get_mut(&block.name).ok_or_else(|| {
            OesError::invalid_species(
                "SYNTH.SPECIES_DATABASE",
                format!("no line-list database attached for species '{}'", block.name),
            )
        })?;
        let query = SpectrumQuery::new(
            block.trot.value,
            block.tvib.value,
            request.wmin,
            request.wmax,
        )
        .with_medium(request.medium)
        .with_output(request.output)
        .with_reserve(request.wav_reserve);

        let (x, y) = database.get_spectrum_with(&query)?.into_parts();
        let intensity = block.intensity.value;
        wavelengths.extend(x);
        signal.extend(y.into_iter().map(|value| value * intensity));
    }

    if wavelengths.is_empty() {
        warn!(
            wmin = request.wmin,
            wmax = request.wmax,
            "no lines in the requested window, returning empty spectrum"
        );
        return Ok(SpectrumBuffer::empty());
    }

    let order = deterministic_argsort(&wavelengths);
    let sorted_x = order.iter().map(|index| wavelengths[*index]).collect();
    let sorted_y = order.iter().map(|index| signal[*index]).collect();
    let mut spectrum = SpectrumBuffer::new(sorted_x, sorted_y)?;

    spectrum.refine_mesh(request.points_per_nm)?;
    spectrum.convolve_with_slit_function(
        parameters.value(GlobalParameter::SlitGauss),
        parameters.value(GlobalParameter::SlitLorentz),
        request.step,
    );

    if !spectrum.is_empty() {
        spectrum.add_linear_baseline(
            parameters.value(GlobalParameter::Baseline),
            parameters.value(GlobalParameter::BaselineSlope),
            request.wmin,
        );
    }
    Ok(spectrum)
}

/// The empty-model signal raised when no species is attached.
pub fn empty_model_error(parameters: &SpeciesParameterSet) -> Option<OesError> {
    parameters.species_blocks().is_empty().then(|| {
        OesError::empty_model(
            "SYNTH.NO_SPECIES",
            "no simulation species attached, the simulated spectrum is empty",
        )
    })
}
