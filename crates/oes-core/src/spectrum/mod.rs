//! Paired wavelength/signal arrays and the transformations applied to them
//! between line synthesis and comparison with a measurement.

mod matching;
mod slit;

pub use matching::{
    MatchedSpectra, ResidualWeighting, compare_spectra, compare_spectra_reduced_sumsq,
    compare_spectra_weighted, match_spectra,
};
pub use slit::{SlitConvolution, VoigtProfile, voigt_profile};

use crate::common::constants::MESH_EDGE_PADDING;
use crate::domain::{OesError, OesResult};
use crate::numerics::linear_grid;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpectrumBuffer {
    x: Vec<f64>,
    y: Vec<f64>,
    maximum: Option<f64>,
}

impl SpectrumBuffer {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> OesResult<Self> {
        if x.len() != y.len() {
            return Err(OesError::axis_mismatch(
                "SPECTRUM.AXIS_LENGTH",
                format!(
                    "wavelength axis has {} samples but signal has {}",
                    x.len(),
                    y.len()
                ),
            ));
        }

        let maximum = signal_maximum(&y);
        Ok(Self { x, y, maximum })
    }

    /// Builds a buffer whose signal is divided by its own maximum. A zero or
    /// missing maximum leaves the signal untouched.
    pub fn normalized(x: Vec<f64>, y: Vec<f64>) -> OesResult<Self> {
        let mut buffer = Self::new(x, y)?;
        if let Some(maximum) = buffer.maximum.filter(|value| *value != 0.0) {
            for value in &mut buffer.y {
                *value /= maximum;
            }
        }
        Ok(buffer)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Zero signal sampled on `x`.
    pub fn zeros_like(x: &[f64]) -> Self {
        Self {
            x: x.to_vec(),
            y: vec![0.0; x.len()],
            maximum: if x.is_empty() { None } else { Some(0.0) },
        }
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    /// Maximum of the signal when the buffer was built or last reshaped.
    pub fn maximum(&self) -> Option<f64> {
        self.maximum
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn into_parts(self) -> (Vec<f64>, Vec<f64>) {
        (self.x, self.y)
    }

    pub fn min_x(&self) -> Option<f64> {
        self.x.iter().copied().reduce(f64::min)
    }

    pub fn max_x(&self) -> Option<f64> {
        self.x.iter().copied().reduce(f64::max)
    }

    /// Copy of the buffer with every wavelength moved by `offset`.
    pub fn shifted(&self, offset: f64) -> Self {
        Self {
            x: self.x.iter().map(|value| value + offset).collect(),
            y: self.y.clone(),
            maximum: self.maximum,
        }
    }

    /// Adds `offset + slope * (x - origin)` to every sample.
    pub fn add_linear_baseline(&mut self, offset: f64, slope: f64, origin: f64) {
        for (x, y) in self.x.iter().zip(self.y.iter_mut()) {
            *y += offset + slope * (x - origin);
        }
        self.maximum = signal_maximum(&self.y);
    }

    pub(crate) fn fill_signal(&mut self, value: f64) {
        self.y.fill(value);
        self.maximum = signal_maximum(&self.y);
    }

    pub(crate) fn replace_signal(&mut self, y: Vec<f64>) {
        debug_assert_eq!(y.len(), self.x.len());
        self.y = y;
        self.maximum = signal_maximum(&self.y);
    }

    /// Resamples a line scatter onto a uniform mesh spanning two nanometres
    /// beyond the outermost lines, summing every line into its nearest bin.
    ///
    /// The buffer is replaced by the mesh and the two-column table is
    /// returned as `[wavelength, signal]` rows.
    pub fn refine_mesh(&mut self, points_per_nm: f64) -> OesResult<Vec<[f64; 2]>> {
        if !points_per_nm.is_finite() || points_per_nm <= 0.0 {
            return Err(OesError::input_validation(
                "SPECTRUM.MESH_DENSITY",
                format!("points per nm must be finite and > 0, got {points_per_nm}"),
            ));
        }

        let (Some(lowest), Some(highest)) = (self.min_x(), self.max_x()) else {
            return Err(OesError::input_validation(
                "SPECTRUM.EMPTY_MESH",
                "cannot refine the mesh of an empty spectrum",
            ));
        };

        let start = lowest - MESH_EDGE_PADDING;
        let end = highest + MESH_EDGE_PADDING;
        let point_count = ((end - start).abs() * points_per_nm) as usize;
        let grid = linear_grid(start, end, point_count).ok_or_else(|| {
            OesError::input_validation(
                "SPECTRUM.MESH_DENSITY",
                format!(
                    "{points_per_nm} points per nm yields fewer than two mesh points over [{start}, {end}]"
                ),
            )
        })?;

        let mut signal = vec![0.0; point_count];
        for (&wavelength, &value) in self.x.iter().zip(&self.y) {
            let position = (wavelength - start) * points_per_nm + 0.5;
            if !position.is_finite() || position < 0.0 || position as usize >= point_count {
                debug!(wavelength, "line falls outside the refined mesh, skipped");
                continue;
            }
            signal[position as usize] += value;
        }

        let table = grid
            .iter()
            .zip(&signal)
            .map(|(&wavelength, &value)| [wavelength, value])
            .collect();

        self.x = grid;
        self.replace_signal(signal);
        Ok(table)
    }
}

/// Linear combination of spectra sharing the first spectrum's axis.
pub fn add_spectra(spectra: &[SpectrumBuffer], amplitudes: &[f64]) -> OesResult<SpectrumBuffer> {
    let Some(first) = spectra.first() else {
        return Ok(SpectrumBuffer::empty());
    };

    if amplitudes.len() != spectra.len() {
        return Err(OesError::input_validation(
            "SPECTRUM.AMPLITUDE_COUNT",
            format!(
                "{} spectra need {} amplitudes, got {}",
                spectra.len(),
                spectra.len(),
                amplitudes.len()
            ),
        ));
    }

    let mut combined = vec![0.0; first.len()];
    for (index, (spectrum, amplitude)) in spectra.iter().zip(amplitudes).enumerate() {
        if spectrum.len() != first.len() {
            return Err(OesError::axis_mismatch(
                "SPECTRUM.AXIS_LENGTH",
                format!(
                    "spectrum {index} has {} samples, expected {}",
                    spectrum.len(),
                    first.len()
                ),
            ));
        }
        for (total, value) in combined.iter_mut().zip(&spectrum.y) {
            *total += amplitude * value;
        }
    }

    SpectrumBuffer::new(first.x.clone(), combined)
}

fn signal_maximum(y: &[f64]) -> Option<f64> {
    y.iter().copied().reduce(f64::max)
}

#[cfg(test)]
mod tests {
    use super::{SpectrumBuffer, add_spectra};
    use crate::domain::OesErrorCategory;

    #[test]
    fn mismatched_axes_are_reported_not_truncated() {
        let error = SpectrumBuffer::new(vec![1.0, 2.0], vec![1.0]).expect_err("mismatch");
        assert_eq!(error.category(), OesErrorCategory::AxisMismatch);
        assert_eq!(error.placeholder(), "SPECTRUM.AXIS_LENGTH");
    }

    #[test]
    fn maximum_is_tracked_and_normalization_divides_by_it() {
        let buffer = SpectrumBuffer::new(vec![1.0, 2.0, 3.0], vec![2.0, 8.0, 4.0]).expect("buffer");
        assert_eq!(buffer.maximum(), Some(8.0));
        assert_eq!(SpectrumBuffer::empty().maximum(), None);

        let normalized =
            SpectrumBuffer::normalized(vec![1.0, 2.0, 3.0], vec![2.0, 8.0, 4.0]).expect("buffer");
        assert_eq!(normalized.y(), &[0.25, 1.0, 0.5]);
    }

    #[test]
    fn refine_mesh_conserves_total_signal() {
        let mut buffer =
            SpectrumBuffer::new(vec![500.0, 500.013, 501.2, 503.5], vec![1.0, 2.5, 0.25, 4.0])
                .expect("buffer");
        let before: f64 = buffer.y().iter().sum();

        let table = buffer.refine_mesh(100.0).expect("refine");
        let after: f64 = buffer.y().iter().sum();

        assert!((before - after).abs() < 1.0e-12);
        assert_eq!(table.len(), buffer.len());
        assert_eq!(buffer.len(), 750);
        assert!((buffer.x()[0] - 498.0).abs() < 1.0e-12);
        assert!((buffer.x()[buffer.len() - 1] - 505.5).abs() < 1.0e-12);
        assert_eq!(table[10], [buffer.x()[10], buffer.y()[10]]);
    }

    #[test]
    fn refine_mesh_puts_lines_into_nearest_bins() {
        let mut buffer = SpectrumBuffer::new(vec![300.0], vec![3.0]).expect("buffer");
        buffer.refine_mesh(10.0).expect("refine");

        // start = 298, line at offset 2 nm → bin 20
        let peak = buffer
            .y()
            .iter()
            .position(|value| *value == 3.0)
            .expect("line is binned");
        assert_eq!(peak, 20);
    }

    #[test]
    fn refine_mesh_rejects_empty_input_and_bad_density() {
        let mut empty = SpectrumBuffer::empty();
        assert_eq!(
            empty.refine_mesh(100.0).expect_err("empty").placeholder(),
            "SPECTRUM.EMPTY_MESH"
        );

        let mut buffer = SpectrumBuffer::new(vec![1.0], vec![1.0]).expect("buffer");
        assert_eq!(
            buffer.refine_mesh(0.0).expect_err("zero").category(),
            OesErrorCategory::InputValidation
        );
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn shifted_and_baseline_helpers_only_touch_their_axis() {
        let buffer = SpectrumBuffer::new(vec![10.0, 11.0], vec![1.0, 2.0]).expect("buffer");
        let shifted = buffer.shifted(0.5);
        assert_eq!(shifted.x(), &[10.5, 11.5]);
        assert_eq!(shifted.y(), buffer.y());

        let mut with_baseline = buffer.clone();
        with_baseline.add_linear_baseline(1.0, 2.0, 10.0);
        assert_eq!(with_baseline.y(), &[2.0, 5.0]);
        assert_eq!(with_baseline.maximum(), Some(5.0));
    }

    #[test]
    fn add_spectra_builds_linear_combination_on_first_axis() {
        let first = SpectrumBuffer::new(vec![1.0, 2.0], vec![1.0, 0.0]).expect("first");
        let second = SpectrumBuffer::new(vec![1.0, 2.0], vec![0.0, 2.0]).expect("second");

        let combined = add_spectra(&[first, second], &[3.0, 0.5]).expect("combined");
        assert_eq!(combined.x(), &[1.0, 2.0]);
        assert_eq!(combined.y(), &[3.0, 1.0]);
        assert!(add_spectra(&[], &[]).expect("empty").is_empty());
    }

    #[test]
    fn add_spectra_rejects_inconsistent_inputs() {
        let first = SpectrumBuffer::new(vec![1.0, 2.0], vec![1.0, 0.0]).expect("first");
        let short = SpectrumBuffer::new(vec![1.0], vec![1.0]).expect("short");

        assert_eq!(
            add_spectra(&[first.clone(), short], &[1.0, 1.0])
                .expect_err("length")
                .category(),
            OesErrorCategory::AxisMismatch
        );
        assert_eq!(
            add_spectra(&[first], &[1.0, 2.0])
                .expect_err("amplitudes")
                .category(),
            OesErrorCategory::InputValidation
        );
    }
}
