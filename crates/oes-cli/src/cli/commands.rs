use super::CliError;
use super::helpers::{apply_parameter_overrides, parse_assignment, write_spectrum_csv};
use oes_core::common::config::FitConfig;
use oes_core::domain::OesError;
use oes_core::linedb::LineDatabase;
use oes_core::numerics::linear_grid;
use oes_core::optimize::MinimizerMethod;
use oes_core::params::SpeciesParameterSet;
use oes_core::session::{FitRequest, FitSession, ResultsTable};
use oes_core::spectrum::{SpectrumBuffer, match_spectra};
use oes_core::synth::{SynthesisRequest, synthesize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;

#[derive(clap::Args)]
pub(super) struct SpeciesArgs {
    /// Species to include; its line list is `<data-dir>/<species>.db`
    #[arg(long = "species", required = true)]
    species: Vec<String>,

    /// Rotational temperature (K) for every species
    #[arg(long, default_value_t = 1000.0)]
    trot: f64,

    /// Vibrational temperature (K) for every species
    #[arg(long, default_value_t = 1000.0)]
    tvib: f64,

    /// Relative intensity for every species
    #[arg(long, default_value_t = 1.0)]
    intensity: f64,

    /// Parameter value, e.g. `--set slitf_gauss=0.05` or `--set OH_Trot=3200`
    #[arg(long = "set", value_name = "NAME=VALUE")]
    assignments: Vec<String>,
}

impl SpeciesArgs {
    fn assignments(&self) -> Result<Vec<(String, f64)>, CliError> {
        self.assignments
            .iter()
            .map(|raw| parse_assignment(raw))
            .collect()
    }
}

#[derive(clap::Args)]
pub(super) struct SimulateArgs {
    #[command(flatten)]
    species: SpeciesArgs,

    /// Lower wavelength bound (nm)
    #[arg(long)]
    wmin: f64,

    /// Upper wavelength bound (nm)
    #[arg(long)]
    wmax: f64,

    /// Detector pixel width (nm) convolved with the slit function
    #[arg(long)]
    step: Option<f64>,

    /// Resample onto this many evenly spaced points over [wmin, wmax]
    #[arg(long)]
    samples: Option<usize>,

    /// Output file
    #[arg(long, short)]
    output: PathBuf,
}

#[derive(clap::Args)]
pub(super) struct FitArgs {
    /// Measured data: wavelength column followed by one column per spectrum
    #[arg(long)]
    input: PathBuf,

    /// Field delimiter of the measured data
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    #[command(flatten)]
    species: SpeciesArgs,

    /// Parameter held constant during the fit (repeatable)
    #[arg(long = "fix", value_name = "NAME")]
    fixed: Vec<String>,

    /// Minimizer (`nelder_mead` or `least_squares`)
    #[arg(long, value_parser = parse_method)]
    method: Option<MinimizerMethod>,

    /// Iteration cap per spectrum
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Results table output (CSV)
    #[arg(long)]
    results: PathBuf,

    /// Save the fitted session as JSON
    #[arg(long)]
    session: Option<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct ExportArgs {
    /// Session JSON written by `fit --session`
    #[arg(long)]
    session: PathBuf,

    /// Results table output; printed to stdout when omitted
    #[arg(long)]
    results: Option<PathBuf>,
}

fn parse_method(raw: &str) -> Result<MinimizerMethod, String> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| format!("unknown method '{raw}', expected nelder_mead or least_squares"))
}

pub(super) fn run_simulate_command(config: &FitConfig, args: SimulateArgs) -> Result<i32, CliError> {
    let mut parameters = SpeciesParameterSet::default();
    let mut databases = HashMap::new();
    for species in &args.species.species {
        let database = LineDatabase::open(config.line_list_path(species));
        if !database.is_usable() {
            return Err(CliError::Compute(OesError::data_source(
                "DATA.NOT_SQLITE",
                format!(
                    "no usable line list for '{species}' at '{}'",
                    config.line_list_path(species).display()
                ),
            )));
        }
        parameters.add_species_with(
            species,
            args.species.trot,
            args.species.tvib,
            args.species.intensity,
        )?;
        databases.insert(species.clone(), database);
    }
    apply_parameter_overrides(&mut parameters, &args.species.assignments()?, &[])?;

    let mut request = SynthesisRequest::new(args.wmin, args.wmax)
        .with_points_per_nm(config.points_per_nm)
        .with_medium(config.medium)
        .with_output(config.output)
        .with_reserve(config.wav_reserve);
    if let Some(step) = args.step {
        request = request.with_step(step);
    }
    let simulated = synthesize(&parameters, &mut databases, &request)?;

    let spectrum = match args.samples {
        Some(samples) => {
            let axis = linear_grid(args.wmin, args.wmax, samples).ok_or_else(|| {
                CliError::Usage(format!("--samples must be at least 2, got {samples}"))
            })?;
            match_spectra(&simulated, &SpectrumBuffer::zeros_like(&axis)).simulated
        }
        None => simulated,
    };

    write_spectrum_csv(&args.output, &spectrum)?;
    println!(
        "Simulated {} points over [{}, {}] nm: {}",
        spectrum.len(),
        args.wmin,
        args.wmax,
        args.output.display()
    );
    Ok(0)
}

pub(super) fn run_fit_command(mut config: FitConfig, args: FitArgs) -> Result<i32, CliError> {
    if let Some(method) = args.method {
        config.method = method;
    }
    if let Some(max_iterations) = args.max_iterations {
        config.max_iterations = max_iterations;
    }
    let delimiter = u8::try_from(args.delimiter)
        .map_err(|_| CliError::Usage(format!("delimiter '{}' is not ASCII", args.delimiter)))?;

    let request = FitRequest::from_config(&config);
    let mut session = FitSession::new(config);
    let ids = session.load_delimited(&args.input, delimiter)?;
    for species in &args.species.species {
        session.open_species(species)?;
    }

    let assignments = args.species.assignments()?;
    for id in &ids {
        for species in &args.species.species {
            session.attach_species(
                id,
                species,
                args.species.trot,
                args.species.tvib,
                args.species.intensity,
            )?;
        }
        apply_parameter_overrides(session.parameters_mut(id)?, &assignments, &args.fixed)?;
    }

    let outcomes = session.fit_all(&request)?;
    for outcome in &outcomes {
        println!(
            "spectrum {}: {} ({}, {} iterations, residual norm {:.6e}) {}",
            outcome.spectrum,
            if outcome.success { "converged" } else { "not converged" },
            outcome.method,
            outcome.iterations,
            outcome.residual_norm,
            outcome.message
        );
    }

    session.export_results()?.save_csv(&args.results)?;
    println!("Results: {}", args.results.display());
    if let Some(path) = &args.session {
        session.save(path)?;
        println!("Session: {}", path.display());
    }
    info!(spectra = outcomes.len(), "fit command finished");
    Ok(0)
}

pub(super) fn run_export_command(config: FitConfig, args: ExportArgs) -> Result<i32, CliError> {
    let mut session = FitSession::load(&args.session, config)?;
    let table: ResultsTable = session.export_results()?;
    match &args.results {
        Some(path) => {
            table.save_csv(path)?;
            println!("Results: {}", path.display());
        }
        None => table.write_csv(std::io::stdout().lock())?,
    }
    Ok(0)
}
