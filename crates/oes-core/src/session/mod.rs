//! Measured spectra paired with their parameter sets, the shared line-list
//! databases, and the fit loop that ties them together.

mod ingest;
mod results;
mod snapshot;

pub use ingest::{DEFAULT_DELIMITER, read_delimited, read_delimited_path};
pub use results::{Estimate, ResultRow, ResultsTable, SpeciesResult};
pub use snapshot::{SessionSnapshot, SpectrumRecord};

use crate::common::config::FitConfig;
use crate::domain::{OesError, OesResult};
use crate::linedb::LineDatabase;
use crate::numerics::{finite_sum_of_squares, mean, stable_sum};
use crate::optimize::{FreeParameter, MinimizerMethod, MinimizerOptions};
use crate::params::{GlobalParameter, ParameterKey, SpeciesParameterSet, is_valid_identifier};
use crate::spectrum::{SpectrumBuffer, compare_spectra};
use crate::synth::{SynthesisRequest, empty_model_error, synthesize};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitRequest {
    pub method: MinimizerMethod,
    pub max_iterations: usize,
    pub x_tolerance: f64,
    pub f_tolerance: f64,
}

impl Default for FitRequest {
    fn default() -> Self {
        Self::from_config(&FitConfig::default())
    }
}

impl FitRequest {
    pub fn from_config(config: &FitConfig) -> Self {
        Self {
            method: config.method,
            max_iterations: config.max_iterations,
            x_tolerance: config.x_tolerance,
            f_tolerance: config.f_tolerance,
        }
    }

    pub fn with_method(mut self, method: MinimizerMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    fn options(&self) -> MinimizerOptions {
        MinimizerOptions {
            max_iterations: self.max_iterations,
            x_tolerance: self.x_tolerance,
            f_tolerance: self.f_tolerance,
        }
    }
}

/// Result of one fit. Failing to converge is reported here, never raised.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitOutcome {
    pub spectrum: String,
    pub method: MinimizerMethod,
    pub success: bool,
    pub message: String,
    pub residual_norm: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub cost_history: Vec<f64>,
}

#[derive(Debug, Clone)]
struct SpectrumEntry {
    id: String,
    measured: SpectrumBuffer,
    parameters: SpeciesParameterSet,
}

/// Owns the measured spectra (in insertion order), one parameter set per
/// spectrum and the line-list database of every session species.
#[derive(Debug, Default)]
pub struct FitSession {
    config: FitConfig,
    spectra: Vec<SpectrumEntry>,
    species: Vec<String>,
    databases: HashMap<String, LineDatabase>,
    last_outcome: Option<FitOutcome>,
}

impl FitSession {
    pub fn new(config: FitConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut FitConfig {
        &mut self.config
    }

    /// Adds a measured spectrum under `id`. Its parameter set starts with the
    /// pixel count and mean wavelength step of the data, and with every
    /// session species at default start values.
    pub fn add_spectrum(&mut self, id: impl Into<String>, measured: SpectrumBuffer) -> OesResult<()> {
        let id = id.into();
        if self.entry(&id).is_ok() {
            return Err(OesError::input_validation(
                "SESSION.DUPLICATE_SPECTRUM",
                format!("spectrum '{id}' is already part of the session"),
            ));
        }
        let steps: Vec<f64> = measured.x().windows(2).map(|pair| pair[1] - pair[0]).collect();
        let wav_step = mean(&steps).unwrap_or(0.0);
        if !(wav_step > 0.0) {
            return Err(OesError::input_validation(
                "SESSION.WAVELENGTH_STEP",
                format!("spectrum '{id}' needs an ascending axis with at least two samples"),
            ));
        }

        let mut parameters = SpeciesParameterSet::new(measured.len());
        parameters.global_mut().wav_step.value = wav_step;
        for species in &self.species {
            parameters.add_species(species)?;
        }
        self.spectra.push(SpectrumEntry {
            id,
            measured,
            parameters,
        });
        Ok(())
    }

    /// Ingests delimited text and adds one spectrum per intensity column,
    /// numbered after the spectra already present. Returns the new ids.
    pub fn load_delimited(&mut self, path: impl AsRef<Path>, delimiter: u8) -> OesResult<Vec<String>> {
        let spectra = read_delimited_path(path, delimiter)?;
        let mut ids = Vec::with_capacity(spectra.len());
        for measured in spectra {
            let id = (self.spectra.len() + 1).to_string();
            self.add_spectrum(id.clone(), measured)?;
            ids.push(id);
        }
        Ok(ids)
    }

    pub fn spectrum_ids(&self) -> impl Iterator<Item = &str> {
        self.spectra.iter().map(|entry| entry.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    pub fn species(&self) -> &[String] {
        &self.species
    }

    pub fn database(&self, species: &str) -> Option<&LineDatabase> {
        self.databases.get(species)
    }

    pub fn measured(&self, id: &str) -> OesResult<&SpectrumBuffer> {
        Ok(&self.entry(id)?.measured)
    }

    pub fn parameters(&self, id: &str) -> OesResult<&SpeciesParameterSet> {
        Ok(&self.entry(id)?.parameters)
    }

    pub fn parameters_mut(&mut self, id: &str) -> OesResult<&mut SpeciesParameterSet> {
        Ok(&mut self.entry_mut(id)?.parameters)
    }

    pub fn last_outcome(&self) -> Option<&FitOutcome> {
        self.last_outcome.as_ref()
    }

    /// Registers a species database and attaches the species, at default
    /// start values, to every spectrum that does not carry it yet.
    pub fn add_species_database(&mut self, database: LineDatabase) -> OesResult<()> {
        let name = database.species().to_string();
        if self.databases.contains_key(&name) || !is_valid_identifier(&name) {
            let error = OesError::invalid_species(
                "SESSION.SPECIES_REJECTED",
                format!("species '{name}' not added: invalid name or already part of the session"),
            );
            warn!(species = %name, "{}", error.message());
            return Err(error);
        }
        for entry in &mut self.spectra {
            if !entry.parameters.has_species(&name) {
                entry.parameters.add_species(&name)?;
            }
        }
        if !self.species.contains(&name) {
            self.species.push(name.clone());
        }
        self.databases.insert(name, database);
        Ok(())
    }

    /// Opens `<species>.db` from the configured data directory.
    pub fn open_species(&mut self, species: &str) -> OesResult<()> {
        let database = LineDatabase::open(self.config.line_list_path(species));
        if !database.is_usable() {
            warn!(species, "species attached with an unusable line list");
        }
        self.add_species_database(database)
    }

    /// Sets the start values of `species` on one spectrum, attaching it there
    /// if needed. The species must already have a database.
    pub fn attach_species(
        &mut self,
        id: &str,
        species: &str,
        trot: f64,
        tvib: f64,
        intensity: f64,
    ) -> OesResult<()> {
        if !self.databases.contains_key(species) {
            let error = OesError::invalid_species(
                "SESSION.SPECIES_DATABASE",
                format!("species '{species}' has no line-list database in this session"),
            );
            warn!(species, "{}", error.message());
            return Err(error);
        }
        let parameters = self.parameters_mut(id)?;
        if parameters.has_species(species) {
            parameters.remove_species(species)?;
        }
        parameters.add_species_with(species, trot, tvib, intensity)
    }

    /// Drops a species from the session, its database and every parameter set.
    pub fn remove_species(&mut self, species: &str) -> OesResult<()> {
        let Some(position) = self.species.iter().position(|name| name == species) else {
            return Err(OesError::invalid_species(
                "SESSION.SPECIES_ABSENT",
                format!("species '{species}' is not part of the session"),
            ));
        };
        self.species.remove(position);
        self.databases.remove(species);
        for entry in &mut self.spectra {
            if entry.parameters.has_species(species) {
                entry.parameters.remove_species(species)?;
            }
        }
        Ok(())
    }

    /// Measured spectrum with the calibration shift applied to its axis.
    pub fn get_measured_spectrum(&self, id: &str) -> OesResult<SpectrumBuffer> {
        let entry = self.entry(id)?;
        Ok(entry
            .measured
            .shifted(entry.parameters.value(GlobalParameter::WavShift)))
    }

    /// Simulated spectrum for the current parameters of `id` over its
    /// measured window.
    pub fn simulate(&mut self, id: &str) -> OesResult<SpectrumBuffer> {
        let index = self.index_of(id)?;
        let entry = &self.spectra[index];
        let (_, simulated) = simulate_entry(
            &entry.measured,
            &entry.parameters,
            &mut self.databases,
            &self.config,
        )?;
        Ok(simulated)
    }

    /// Residual vector under the configured weighting.
    pub fn residuals(&mut self, id: &str) -> OesResult<Vec<f64>> {
        let index = self.index_of(id)?;
        let entry = &self.spectra[index];
        residuals_for(
            &entry.measured,
            &entry.parameters,
            &mut self.databases,
            &self.config,
        )
    }

    /// Fits the varying parameters of one spectrum and writes the fitted
    /// values, and their standard errors when available, back into its
    /// parameter set.
    pub fn fit(&mut self, id: &str, request: &FitRequest) -> OesResult<FitOutcome> {
        let index = self.index_of(id)?;
        let template = self.spectra[index].parameters.clone();
        if let Some(signal) = empty_model_error(&template) {
            warn!(spectrum = id, placeholder = signal.placeholder(), "{}, fit skipped", signal.message());
            let outcome = FitOutcome {
                spectrum: id.to_string(),
                method: request.method,
                success: false,
                message: signal.diagnostic_line(),
                residual_norm: f64::NAN,
                iterations: 0,
                evaluations: 0,
                cost_history: Vec::new(),
            };
            self.last_outcome = Some(outcome.clone());
            return Ok(outcome);
        }
        let non_finite = self.spectra[index]
            .measured
            .y()
            .iter()
            .filter(|value| !value.is_finite())
            .count();
        if non_finite > 0 {
            warn!(
                spectrum = id,
                non_finite,
                "measured spectrum has non-finite samples, every trial cost will be infinite"
            );
        }

        let keys: Vec<ParameterKey> = template
            .keys()
            .into_iter()
            .filter(|key| template.get(key).is_some_and(|parameter| parameter.vary))
            .collect();
        let free: Vec<FreeParameter> = keys
            .iter()
            .filter_map(|key| {
                let parameter = template.get(key)?;
                Some(FreeParameter::bounded(
                    key.flat_name(),
                    parameter.clamped_value(),
                    parameter.min,
                    parameter.max,
                ))
            })
            .collect();

        let report = {
            let measured = &self.spectra[index].measured;
            let mut problem = |values: &[f64]| -> OesResult<Vec<f64>> {
                let trial = with_values(&template, &keys, values);
                residuals_for(measured, &trial, &mut self.databases, &self.config)
            };
            request
                .method
                .minimizer()
                .minimize(&mut problem, &free, &request.options())?
        };

        let parameters = &mut self.spectra[index].parameters;
        for (position, key) in keys.iter().enumerate() {
            if let Some(parameter) = parameters.get_mut(key) {
                parameter.value = report.values[position];
                parameter.stderr = report.stderr.as_ref().map(|errors| errors[position]);
            }
        }

        let outcome = FitOutcome {
            spectrum: id.to_string(),
            method: request.method,
            success: report.success,
            message: report.message.clone(),
            residual_norm: report.residual_norm(),
            iterations: report.iterations,
            evaluations: report.evaluations,
            cost_history: report.cost_history,
        };
        info!(
            spectrum = id,
            method = %request.method,
            success = outcome.success,
            iterations = outcome.iterations,
            residual_norm = outcome.residual_norm,
            "fit finished: {}",
            outcome.message
        );
        self.last_outcome = Some(outcome.clone());
        Ok(outcome)
    }

    /// Fits every spectrum in insertion order.
    pub fn fit_all(&mut self, request: &FitRequest) -> OesResult<Vec<FitOutcome>> {
        let ids: Vec<String> = self.spectrum_ids().map(str::to_string).collect();
        ids.iter().map(|id| self.fit(id, request)).collect()
    }

    /// Per-spectrum reduced sum of squares and the fitted species values.
    pub fn export_results(&mut self) -> OesResult<ResultsTable> {
        let mut rows = Vec::with_capacity(self.spectra.len());
        for entry in &self.spectra {
            let reduced_sumsq = if entry.parameters.species_blocks().is_empty() {
                f64::NAN
            } else {
                let (measured, simulated) = simulate_entry(
                    &entry.measured,
                    &entry.parameters,
                    &mut self.databases,
                    &self.config,
                )?;
                let residuals = compare_spectra(&measured, &simulated);
                reduced_sum_of_squares(&entry.id, &entry.measured, &entry.parameters, &residuals)
            };

            let species = self
                .species
                .iter()
                .map(|name| {
                    entry
                        .parameters
                        .species_block(name)
                        .map(SpeciesResult::from_block)
                })
                .collect();
            rows.push(ResultRow {
                spectrum: entry.id.clone(),
                reduced_sumsq,
                species,
            });
        }
        Ok(ResultsTable {
            species: self.species.clone(),
            rows,
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            spectra: self
                .spectra
                .iter()
                .map(|entry| SpectrumRecord {
                    id: entry.id.clone(),
                    x: entry.measured.x().to_vec(),
                    y: entry.measured.y().to_vec(),
                    parameters: entry.parameters.clone(),
                })
                .collect(),
            species: self.species.clone(),
        }
    }

    /// Rebuilds a session from a snapshot, reopening every species' line
    /// list from the configured data directory. Parameter sets are restored
    /// as saved.
    pub fn from_snapshot(snapshot: SessionSnapshot, config: FitConfig) -> OesResult<Self> {
        let mut session = Self::new(config);
        for record in snapshot.spectra {
            record.parameters.validate()?;
            if session.entry(&record.id).is_ok() {
                return Err(OesError::input_validation(
                    "SESSION.DUPLICATE_SPECTRUM",
                    format!("spectrum '{}' appears twice in the snapshot", record.id),
                ));
            }
            session.spectra.push(SpectrumEntry {
                measured: SpectrumBuffer::new(record.x, record.y)?,
                id: record.id,
                parameters: record.parameters,
            });
        }
        for species in snapshot.species {
            let database = LineDatabase::open(session.config.line_list_path(&species));
            session.databases.insert(species.clone(), database);
            session.species.push(species);
        }
        Ok(session)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> OesResult<()> {
        self.snapshot().save(path)
    }

    pub fn load(path: impl AsRef<Path>, config: FitConfig) -> OesResult<Self> {
        Self::from_snapshot(SessionSnapshot::load(path)?, config)
    }

    fn index_of(&self, id: &str) -> OesResult<usize> {
        self.spectra
            .iter()
            .position(|entry| entry.id == id)
            .ok_or_else(|| {
                OesError::input_validation(
                    "SESSION.UNKNOWN_SPECTRUM",
                    format!("no spectrum '{id}' in the session"),
                )
            })
    }

    fn entry(&self, id: &str) -> OesResult<&SpectrumEntry> {
        Ok(&self.spectra[self.index_of(id)?])
    }

    fn entry_mut(&mut self, id: &str) -> OesResult<&mut SpectrumEntry> {
        let index = self.index_of(id)?;
        Ok(&mut self.spectra[index])
    }
}

fn with_values(
    template: &SpeciesParameterSet,
    keys: &[ParameterKey],
    values: &[f64],
) -> SpeciesParameterSet {
    let mut trial = template.clone();
    for (key, value) in keys.iter().zip(values) {
        if let Some(parameter) = trial.get_mut(key) {
            parameter.value = *value;
        }
    }
    trial
}

/// Shifted measured spectrum and the simulation over its window.
fn simulate_entry(
    measured: &SpectrumBuffer,
    parameters: &SpeciesParameterSet,
    databases: &mut HashMap<String, LineDatabase>,
    config: &FitConfig,
) -> OesResult<(SpectrumBuffer, SpectrumBuffer)> {
    let shifted = measured.shifted(parameters.value(GlobalParameter::WavShift));
    let (Some(wmin), Some(wmax)) = (shifted.min_x(), shifted.max_x()) else {
        return Err(OesError::input_validation(
            "SESSION.EMPTY_SPECTRUM",
            "measured spectrum has no samples",
        ));
    };
    let request = SynthesisRequest::new(wmin, wmax)
        .with_step(parameters.value(GlobalParameter::WavStep))
        .with_points_per_nm(config.points_per_nm)
        .with_medium(config.medium)
        .with_output(config.output)
        .with_reserve(config.wav_reserve);
    let simulated = synthesize(parameters, databases, &request)?;
    Ok((shifted, simulated))
}

fn residuals_for(
    measured: &SpectrumBuffer,
    parameters: &SpeciesParameterSet,
    databases: &mut HashMap<String, LineDatabase>,
    config: &FitConfig,
) -> OesResult<Vec<f64>> {
    let (shifted, simulated) = simulate_entry(measured, parameters, databases, config)?;
    Ok(config.weighting.residuals(&shifted, &simulated))
}

/// `Σr² / Σ(y − baseline − slope·i)` over the finite residuals, NaN when the
/// background-corrected signal does not sum to a positive value.
fn reduced_sum_of_squares(
    id: &str,
    measured: &SpectrumBuffer,
    parameters: &SpeciesParameterSet,
    residuals: &[f64],
) -> f64 {
    let baseline = parameters.value(GlobalParameter::Baseline);
    let slope = parameters.value(GlobalParameter::BaselineSlope);
    let corrected: Vec<f64> = measured
        .y()
        .iter()
        .enumerate()
        .map(|(index, y)| y - baseline - slope * index as f64)
        .collect();
    let signal = stable_sum(&corrected);
    if !(signal.is_finite() && signal > 0.0) {
        warn!(spectrum = id, signal, "background-corrected signal is not positive, reduced sum of squares is NaN");
        return f64::NAN;
    }
    finite_sum_of_squares(residuals) / signal
}
