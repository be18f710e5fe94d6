mod commands;
mod helpers;

use clap::Parser;
use oes_core::domain::OesError;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub fn run_from_env() -> i32 {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(args) {
        Ok(code) => code,
        Err(error) => {
            let diagnostic = error.as_oes_error();
            eprintln!("{}", diagnostic.diagnostic_line());
            diagnostic.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args = std::iter::once("oesfit".to_string())
        .chain(args.into_iter().map(Into::into))
        .collect::<Vec<_>>();
    parse_and_dispatch(full_args)
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => {
            init_tracing(cli.global.verbose);
            dispatch_parsed(cli.global, cli.command)
        }
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{err}");
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    // a second initialization within one process keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(name = "oesfit", about = "Optical emission spectrum simulation and fitting")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub(crate) struct GlobalArgs {
    /// Fit configuration JSON; flags below override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding `<species>.db` line-list files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Simulation mesh density in points per nm
    #[arg(long, global = true)]
    points_per_nm: Option<f64>,

    /// Log debug output to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Write a simulated spectrum as delimited text
    Simulate(commands::SimulateArgs),
    /// Fit every spectrum of a measured data file
    Fit(commands::FitArgs),
    /// Recompute the results table of a saved session
    Export(commands::ExportArgs),
}

fn dispatch_parsed(global: GlobalArgs, command: CliCommand) -> Result<i32, CliError> {
    let config = helpers::load_config(&global)?;
    match command {
        CliCommand::Simulate(args) => commands::run_simulate_command(&config, args),
        CliCommand::Fit(args) => commands::run_fit_command(config, args),
        CliCommand::Export(args) => commands::run_export_command(config, args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Compute(OesError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<OesError> for CliError {
    fn from(error: OesError) -> Self {
        Self::Compute(error)
    }
}

impl CliError {
    fn as_oes_error(&self) -> OesError {
        match self {
            Self::Usage(message) => OesError::input_validation("INPUT.CLI_USAGE", message.clone()),
            Self::Compute(error) => error.clone(),
            Self::Internal(error) => OesError::io_system("IO.CLI", format!("{error:#}")),
        }
    }
}
