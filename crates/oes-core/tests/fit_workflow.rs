mod support;

use oes_core::params::{GlobalParameter, SpeciesParameterSet};
use oes_core::{FitConfig, FitRequest, FitSession, MinimizerMethod, SpectrumBuffer};
use support::{ladder_database, measurement_axis};

const TRUE_TEMPERATURE: f64 = 5000.0;
const TRUE_INTENSITY: f64 = 2.0;

fn test_config() -> FitConfig {
    FitConfig {
        points_per_nm: 200.0,
        ..FitConfig::default()
    }
}

/// Slit fixed at 0.02 nm and every global held constant.
fn freeze_globals(parameters: &mut SpeciesParameterSet) {
    parameters.global_mut().slitf_gauss.value = 0.02;
    for kind in GlobalParameter::ALL {
        parameters.global_mut().get_mut(kind).vary = false;
    }
}

/// Simulated ladder spectrum sampled on the measurement axis.
fn synthetic_measurement() -> SpectrumBuffer {
    let axis = measurement_axis();
    let mut session = FitSession::new(test_config());
    session
        .add_spectrum("truth", SpectrumBuffer::new(axis.clone(), vec![0.0; axis.len()]).expect("zeros"))
        .expect("spectrum");
    session.add_species_database(ladder_database("XY")).expect("species");
    freeze_globals(session.parameters_mut("truth").expect("parameters"));
    session
        .attach_species("truth", "XY", TRUE_TEMPERATURE, TRUE_TEMPERATURE, TRUE_INTENSITY)
        .expect("attach");

    // residuals against a zero measurement are the matched simulation
    let signal = session.residuals("truth").expect("residuals");
    SpectrumBuffer::new(axis, signal).expect("measurement")
}

fn session_from_cold_start(measured: SpectrumBuffer) -> FitSession {
    let mut session = FitSession::new(test_config());
    session.add_spectrum("1", measured).expect("spectrum");
    session.add_species_database(ladder_database("XY")).expect("species");
    freeze_globals(session.parameters_mut("1").expect("parameters"));
    session.attach_species("1", "XY", 3000.0, 3000.0, 1.0).expect("attach");
    session
}

fn assert_recovered(session: &FitSession, method: MinimizerMethod) {
    let parameters = session.parameters("1").expect("parameters");
    for (name, truth) in [
        ("XY_Trot", TRUE_TEMPERATURE),
        ("XY_Tvib", TRUE_TEMPERATURE),
        ("XY_intensity", TRUE_INTENSITY),
    ] {
        let value = parameters.by_name(name).expect("parameter").value;
        assert!(
            (value - truth).abs() <= 0.05 * truth,
            "{method}: {name} = {value}, expected {truth}"
        );
    }
}

#[test]
fn synthetic_measurement_has_signal_in_every_band() {
    let measured = synthetic_measurement();
    assert!(measured.y().iter().all(|value| value.is_finite() && *value >= -1.0e-12));
    for band_start in [300.0, 301.5, 303.0, 304.5] {
        let band_peak = measured
            .x()
            .iter()
            .zip(measured.y())
            .filter(|(x, _)| **x >= band_start && **x <= band_start + 1.4)
            .map(|(_, y)| *y)
            .fold(0.0, f64::max);
        assert!(band_peak > 0.0, "band at {band_start} is empty");
    }
}

#[test]
fn nelder_mead_recovers_temperatures_from_cold_start() {
    let mut session = session_from_cold_start(synthetic_measurement());
    let request = FitRequest::from_config(session.config()).with_method(MinimizerMethod::NelderMead);
    let outcome = session.fit("1", &request).expect("fit");

    assert_recovered(&session, MinimizerMethod::NelderMead);
    assert!(
        outcome.cost_history.windows(2).all(|pair| pair[1] <= pair[0]),
        "cost history must not increase"
    );
    assert_eq!(session.last_outcome(), Some(&outcome));
}

#[test]
fn least_squares_recovers_temperatures_and_reports_errors() {
    let mut session = session_from_cold_start(synthetic_measurement());
    let request = FitRequest::from_config(session.config()).with_method(MinimizerMethod::LeastSquares);
    let outcome = session.fit("1", &request).expect("fit");

    assert!(outcome.success, "{}", outcome.message);
    assert_recovered(&session, MinimizerMethod::LeastSquares);
    assert!(outcome.cost_history.windows(2).all(|pair| pair[1] <= pair[0]));
    assert!(outcome.cost_history.last().expect("history") <= outcome.cost_history.first().expect("history"));

    let table = session.export_results().expect("export");
    let row = table.row("1").expect("row");
    let result = row.species[0].expect("XY attached");
    assert!((result.trot.value - TRUE_TEMPERATURE).abs() <= 0.05 * TRUE_TEMPERATURE);
    assert!(row.reduced_sumsq.is_finite() && row.reduced_sumsq >= 0.0);
}

#[test]
fn fixed_parameters_are_left_untouched() {
    let mut session = session_from_cold_start(synthetic_measurement());
    session
        .parameters_mut("1")
        .expect("parameters")
        .by_name_mut("XY_Tvib")
        .expect("Tvib")
        .vary = false;

    let request = FitRequest::from_config(session.config())
        .with_method(MinimizerMethod::LeastSquares)
        .with_max_iterations(5);
    session.fit("1", &request).expect("fit");

    let parameters = session.parameters("1").expect("parameters");
    assert_eq!(parameters.by_name("XY_Tvib").expect("Tvib").value, 3000.0);
    assert!(parameters.by_name("XY_Tvib").expect("Tvib").stderr.is_none());
    assert_eq!(parameters.value(GlobalParameter::SlitGauss), 0.02);
}
