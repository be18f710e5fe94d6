use super::{SpectrumBuffer, signal_maximum};
use crate::common::constants::{DEGENERATE_SIGNAL_SENTINEL, MATCH_EDGE_OFFSET};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A simulated spectrum resampled onto the axis of the measurement it is
/// compared against.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedSpectra<'a> {
    pub simulated: SpectrumBuffer,
    pub measured: &'a SpectrumBuffer,
}

/// Linearly interpolates `simulated` onto `measured.x`.
///
/// Where the measurement reaches past the simulation, the simulation is
/// padded with zeros just beyond its own edge and at the measurement's edge,
/// so lines ramp down to zero instead of being extrapolated.
pub fn match_spectra<'a>(
    simulated: &SpectrumBuffer,
    measured: &'a SpectrumBuffer,
) -> MatchedSpectra<'a> {
    let (Some(sim_min), Some(sim_max)) = (simulated.min_x(), simulated.max_x()) else {
        return MatchedSpectra {
            simulated: SpectrumBuffer::zeros_like(measured.x()),
            measured,
        };
    };

    let mut knots_x = Vec::with_capacity(simulated.len() + 4);
    let mut knots_y = Vec::with_capacity(simulated.len() + 4);

    if let Some(exp_min) = measured.min_x().filter(|value| *value < sim_min) {
        knots_x.push(exp_min);
        knots_y.push(0.0);
        let pad = sim_min - MATCH_EDGE_OFFSET;
        if exp_min < pad {
            knots_x.push(pad);
            knots_y.push(0.0);
        }
    }

    knots_x.extend_from_slice(simulated.x());
    knots_y.extend_from_slice(simulated.y());

    if let Some(exp_max) = measured.max_x().filter(|value| *value > sim_max) {
        let pad = sim_max + MATCH_EDGE_OFFSET;
        if exp_max > pad {
            knots_x.push(pad);
            knots_y.push(0.0);
        }
        knots_x.push(exp_max);
        knots_y.push(0.0);
    }

    let y: Vec<f64> = measured
        .x()
        .iter()
        .map(|x| interpolate_linear(&knots_x, &knots_y, *x))
        .collect();

    MatchedSpectra {
        simulated: SpectrumBuffer {
            x: measured.x().to_vec(),
            maximum: signal_maximum(&y),
            y,
        },
        measured,
    }
}

fn interpolate_linear(knots_x: &[f64], knots_y: &[f64], x: f64) -> f64 {
    let upper = knots_x.partition_point(|knot| *knot < x);
    if upper < knots_x.len() && knots_x[upper] == x {
        return knots_y[upper];
    }
    if upper == 0 || upper == knots_x.len() {
        return 0.0;
    }

    let (x0, x1) = (knots_x[upper - 1], knots_x[upper]);
    let (y0, y1) = (knots_y[upper - 1], knots_y[upper]);
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

/// Residual vector `simulated - measured` on the measured axis.
pub fn compare_spectra(measured: &SpectrumBuffer, simulated: &SpectrumBuffer) -> Vec<f64> {
    let matched = match_spectra(simulated, measured);
    let residuals: Vec<f64> = matched
        .simulated
        .y()
        .iter()
        .zip(measured.y())
        .map(|(sim, exp)| sim - exp)
        .collect();
    debug!(points = residuals.len(), "compared spectra");
    residuals
}

/// Residuals scaled by the measured signal, emphasizing strong features.
pub fn compare_spectra_weighted(measured: &SpectrumBuffer, simulated: &SpectrumBuffer) -> Vec<f64> {
    let mut residuals = compare_spectra(measured, simulated);
    for (residual, weight) in residuals.iter_mut().zip(measured.y()) {
        *residual *= weight;
    }
    residuals
}

/// `Σr² / n²`, usable when the number of compared points changes between
/// evaluations. A NaN result becomes the degenerate-signal sentinel.
pub fn compare_spectra_reduced_sumsq(measured: &SpectrumBuffer, simulated: &SpectrumBuffer) -> f64 {
    let residuals = compare_spectra(measured, simulated);
    let count = residuals.len() as f64;
    let sumsq = residuals.iter().map(|value| value * value).sum::<f64>() / (count * count);
    debug!(sumsq, "reduced sum of squares");
    if sumsq.is_nan() {
        DEGENERATE_SIGNAL_SENTINEL
    } else {
        sumsq
    }
}

/// How a fit turns a simulated/measured pair into a residual vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidualWeighting {
    /// `simulated - measured`.
    #[default]
    Plain,
    /// Plain residuals multiplied by the measured signal.
    Intensity,
    /// One residual whose square is the reduced sum of squares.
    ReducedSumsq,
}

impl ResidualWeighting {
    pub fn residuals(self, measured: &SpectrumBuffer, simulated: &SpectrumBuffer) -> Vec<f64> {
        match self {
            Self::Plain => compare_spectra(measured, simulated),
            Self::Intensity => compare_spectra_weighted(measured, simulated),
            Self::ReducedSumsq => vec![compare_spectra_reduced_sumsq(measured, simulated).sqrt()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ResidualWeighting, compare_spectra, compare_spectra_reduced_sumsq,
        compare_spectra_weighted, match_spectra,
    };
    use crate::common::constants::DEGENERATE_SIGNAL_SENTINEL;
    use crate::spectrum::SpectrumBuffer;

    fn buffer(x: &[f64], y: &[f64]) -> SpectrumBuffer {
        SpectrumBuffer::new(x.to_vec(), y.to_vec()).expect("buffer")
    }

    #[test]
    fn matching_a_spectrum_with_itself_returns_its_signal() {
        let spectrum = buffer(&[1.0, 1.5, 2.25, 3.0], &[0.5, 4.0, -1.0, 2.0]);
        let matched = match_spectra(&spectrum, &spectrum);
        assert_eq!(matched.simulated.x(), spectrum.x());
        assert_eq!(matched.simulated.y(), spectrum.y());
    }

    #[test]
    fn matching_interpolates_linearly_between_knots() {
        let simulated = buffer(&[0.0, 1.0, 2.0], &[0.0, 10.0, 20.0]);
        let measured = buffer(&[0.25, 1.5], &[0.0, 0.0]);
        let matched = match_spectra(&simulated, &measured);
        assert_eq!(matched.simulated.y(), &[2.5, 15.0]);
    }

    #[test]
    fn matching_pads_with_zeros_beyond_simulated_range() {
        let simulated = buffer(&[10.0, 11.0], &[4.0, 4.0]);
        let measured = buffer(&[8.0, 9.9995, 10.5, 11.0005, 13.0], &[0.0; 5]);

        let matched = match_spectra(&simulated, &measured);
        let y = matched.simulated.y();
        assert_eq!(y[0], 0.0);
        // halfway between the 1e-3 pad and the first line
        assert!((y[1] - 2.0).abs() < 1.0e-9);
        assert_eq!(y[2], 4.0);
        assert!((y[3] - 2.0).abs() < 1.0e-9);
        assert_eq!(y[4], 0.0);
    }

    #[test]
    fn matching_skips_inner_pad_when_measurement_barely_extends() {
        let simulated = buffer(&[10.0, 11.0], &[4.0, 4.0]);
        let measured = buffer(&[9.9995, 10.0], &[0.0, 0.0]);

        let matched = match_spectra(&simulated, &measured);
        assert_eq!(matched.simulated.y(), &[0.0, 4.0]);
    }

    #[test]
    fn empty_simulation_matches_to_zeros() {
        let measured = buffer(&[1.0, 2.0, 3.0], &[1.0, 1.0, 1.0]);
        let matched = match_spectra(&SpectrumBuffer::empty(), &measured);
        assert_eq!(matched.simulated.y(), &[0.0, 0.0, 0.0]);
        assert_eq!(
            compare_spectra(&measured, &SpectrumBuffer::empty()),
            vec![-1.0, -1.0, -1.0]
        );
    }

    #[test]
    fn comparison_metrics_follow_their_definitions() {
        let measured = buffer(&[1.0, 2.0], &[2.0, 3.0]);
        let simulated = buffer(&[1.0, 2.0], &[3.0, 1.0]);

        assert_eq!(compare_spectra(&measured, &simulated), vec![1.0, -2.0]);
        assert_eq!(compare_spectra_weighted(&measured, &simulated), vec![2.0, -6.0]);
        assert_eq!(compare_spectra_reduced_sumsq(&measured, &simulated), 5.0 / 4.0);
        assert_eq!(
            ResidualWeighting::ReducedSumsq.residuals(&measured, &simulated),
            vec![(5.0_f64 / 4.0).sqrt()]
        );
    }

    #[test]
    fn nan_reduced_sumsq_becomes_sentinel() {
        let measured = buffer(&[1.0, 2.0], &[f64::NAN, 3.0]);
        let simulated = buffer(&[1.0, 2.0], &[3.0, 1.0]);
        assert_eq!(
            compare_spectra_reduced_sumsq(&measured, &simulated),
            DEGENERATE_SIGNAL_SENTINEL
        );
    }

    #[test]
    fn weighting_serializes_as_snake_case() {
        let encoded = serde_json::to_string(&ResidualWeighting::ReducedSumsq).expect("encode");
        assert_eq!(encoded, "\"reduced_sumsq\"");
        assert_eq!(ResidualWeighting::default(), ResidualWeighting::Plain);
    }
}
