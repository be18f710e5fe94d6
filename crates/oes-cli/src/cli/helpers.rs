use super::{CliError, GlobalArgs};
use anyhow::Context;
use oes_core::common::config::{FitConfig, load_fit_config};
use oes_core::domain::OesError;
use oes_core::params::SpeciesParameterSet;
use oes_core::spectrum::SpectrumBuffer;
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub(super) fn load_config(global: &GlobalArgs) -> Result<FitConfig, CliError> {
    let mut config = match &global.config {
        Some(path) => load_fit_config(path).map_err(|error| {
            CliError::Compute(OesError::input_validation("INPUT.CONFIG", error.to_string()))
        })?,
        None => FitConfig::default(),
    };
    if let Some(data_dir) = &global.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(points_per_nm) = global.points_per_nm {
        if !(points_per_nm.is_finite() && points_per_nm > 0.0) {
            return Err(CliError::Usage(format!(
                "--points-per-nm must be > 0, got {points_per_nm}"
            )));
        }
        config.points_per_nm = points_per_nm;
    }
    Ok(config)
}

/// Parses `name=value` parameter assignments.
pub(super) fn parse_assignment(raw: &str) -> Result<(String, f64), CliError> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| CliError::Usage(format!("expected NAME=VALUE, got '{raw}'")))?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|_| CliError::Usage(format!("'{value}' in '{raw}' is not a number")))?;
    Ok((name.trim().to_string(), value))
}

/// Applies `--set` assignments and `--fix` names to one parameter set.
pub(super) fn apply_parameter_overrides(
    parameters: &mut SpeciesParameterSet,
    assignments: &[(String, f64)],
    fixed: &[String],
) -> Result<(), CliError> {
    for (name, value) in assignments {
        let parameter = parameters
            .by_name_mut(name)
            .ok_or_else(|| CliError::Usage(format!("unknown parameter '{name}'")))?;
        parameter.value = *value;
    }
    for name in fixed {
        let parameter = parameters
            .by_name_mut(name)
            .ok_or_else(|| CliError::Usage(format!("unknown parameter '{name}'")))?;
        parameter.vary = false;
    }
    Ok(())
}

/// Writes `wavelength,signal` rows under a `#` comment header, readable by
/// the measured-data ingestion.
pub(super) fn write_spectrum_csv(path: &Path, spectrum: &SpectrumBuffer) -> Result<(), CliError> {
    let mut file = File::create(path)
        .with_context(|| format!("failed to create '{}'", path.display()))?;
    writeln!(file, "# wavelength,signal")
        .with_context(|| format!("failed to write '{}'", path.display()))?;

    let mut writer = csv::Writer::from_writer(file);
    for (x, y) in spectrum.x().iter().zip(spectrum.y()) {
        writer
            .write_record([x.to_string(), y.to_string()])
            .with_context(|| format!("failed to write '{}'", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to write '{}'", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{apply_parameter_overrides, parse_assignment};
    use crate::cli::CliError;
    use oes_core::params::SpeciesParameterSet;

    #[test]
    fn assignments_parse_and_apply() {
        let assignment = parse_assignment("slitf_gauss = 0.05").expect("assignment");
        assert_eq!(assignment, ("slitf_gauss".to_string(), 0.05));

        let mut parameters = SpeciesParameterSet::default();
        parameters.add_species("OH").expect("species");
        apply_parameter_overrides(
            &mut parameters,
            &[assignment, ("OH_Trot".to_string(), 2500.0)],
            &["wav_shift".to_string()],
        )
        .expect("apply");

        assert_eq!(parameters.by_name("slitf_gauss").expect("gauss").value, 0.05);
        assert_eq!(parameters.by_name("OH_Trot").expect("trot").value, 2500.0);
        assert!(!parameters.by_name("wav_shift").expect("shift").vary);
    }

    #[test]
    fn malformed_or_unknown_assignments_are_usage_errors() {
        assert!(matches!(parse_assignment("slitf_gauss"), Err(CliError::Usage(_))));
        assert!(matches!(parse_assignment("a=b"), Err(CliError::Usage(_))));

        let mut parameters = SpeciesParameterSet::default();
        let error = apply_parameter_overrides(&mut parameters, &[], &["N2_Tvib".to_string()])
            .expect_err("unknown");
        assert!(matches!(error, CliError::Usage(_)));
    }
}
