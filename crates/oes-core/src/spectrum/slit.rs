use super::SpectrumBuffer;
use crate::common::constants::{
    DEGENERATE_SIGNAL_SENTINEL, MIN_PROFILE_WIDTH, SLIT_TRUNCATION_RATIO,
};
use crate::domain::OesError;
use crate::numerics::{convolve_same, mean, stable_sum, trim_kernel_tails, voigt_function};
use std::f64::consts::{LN_2, PI};
use tracing::{debug, warn};

/// Voigt line shape in terms of its Doppler and Lorentzian half widths, with
/// an optional linear background `offset + slope * nu`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoigtProfile {
    pub doppler_hwhm: f64,
    pub lorentz_hwhm: f64,
    pub center: f64,
    pub area: f64,
    pub offset: f64,
    pub slope: f64,
}

impl VoigtProfile {
    pub fn new(doppler_hwhm: f64, lorentz_hwhm: f64, center: f64, area: f64) -> Self {
        Self {
            doppler_hwhm,
            lorentz_hwhm,
            center,
            area,
            offset: 0.0,
            slope: 0.0,
        }
    }

    pub fn with_background(mut self, offset: f64, slope: f64) -> Self {
        self.offset = offset;
        self.slope = slope;
        self
    }

    pub fn value_at(&self, nu: f64) -> f64 {
        let doppler = clamp_width(self.doppler_hwhm);
        let lorentz = clamp_width(self.lorentz_hwhm);
        let f = LN_2.sqrt();
        let x = (nu - self.center) / doppler * f;
        let y = lorentz / doppler * f;

        self.area * f / (doppler * PI.sqrt()) * voigt_function(x, y)
            + self.offset
            + self.slope * nu
    }

    pub fn sample(&self, nu: &[f64]) -> Vec<f64> {
        nu.iter().map(|value| self.value_at(*value)).collect()
    }
}

/// Samples a background-free Voigt profile integrating to `area` on `nu`.
pub fn voigt_profile(
    nu: &[f64],
    doppler_hwhm: f64,
    lorentz_hwhm: f64,
    center: f64,
    area: f64,
) -> Vec<f64> {
    VoigtProfile::new(doppler_hwhm, lorentz_hwhm, center, area).sample(nu)
}

fn clamp_width(width: f64) -> f64 {
    if width == 0.0 { MIN_PROFILE_WIDTH } else { width }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SlitConvolution {
    Applied,
    /// Nothing to convolve.
    Skipped,
    /// The signal was replaced by the degenerate-signal sentinel.
    Degenerate(OesError),
}

impl SlitConvolution {
    pub fn is_degenerate(&self) -> bool {
        matches!(self, Self::Degenerate(_))
    }
}

impl SpectrumBuffer {
    /// Broadens the signal with a Voigt slit function and, when `step` is at
    /// least one mesh step wide, a rectangle the width of one detector pixel.
    ///
    /// The kernel is sampled on the buffer's own axis around its mean and
    /// normalized to unit sum, and its tails below a thousandth of the peak
    /// are dropped before the same-length convolution.
    pub fn convolve_with_slit_function(
        &mut self,
        gauss: f64,
        lorentz: f64,
        step: Option<f64>,
    ) -> SlitConvolution {
        let Some(center) = mean(&self.x) else {
            return SlitConvolution::Skipped;
        };
        debug!(gauss, lorentz, ?step, "convolving with slit function");

        let mut slit = voigt_profile(&self.x, gauss, lorentz, center, 1.0);
        let total = stable_sum(&slit);
        if !total.is_finite() || total <= 0.0 {
            return self.degenerate(format!(
                "slit function with gauss={gauss}, lorentz={lorentz} has no usable area"
            ));
        }
        for value in &mut slit {
            *value /= total;
        }

        let profile = match step.zip(self.mesh_step()) {
            Some((instrument_step, simulated_step)) => {
                let ratio = instrument_step / simulated_step;
                if ratio >= 1.0 {
                    let rectangle = vec![1.0; ratio as usize + 1];
                    if slit.len() >= rectangle.len() {
                        convolve_same(&slit, &rectangle)
                    } else {
                        convolve_same(&rectangle, &slit)
                    }
                } else {
                    warn!(
                        instrument_step,
                        simulated_step,
                        "simulated spectrum is coarser than the measured data, pixel width ignored"
                    );
                    slit
                }
            }
            None => slit,
        };

        let kernel = match trim_kernel_tails(&profile, SLIT_TRUNCATION_RATIO) {
            Ok(kernel) => kernel,
            Err(error) => return self.degenerate(error.to_string()),
        };

        let convolved = convolve_same(&self.y, kernel);
        if convolved.iter().any(|value| value.is_nan()) {
            return self.degenerate("slit convolution produced NaN samples".to_string());
        }
        self.replace_signal(convolved);
        SlitConvolution::Applied
    }

    fn mesh_step(&self) -> Option<f64> {
        match self.x.as_slice() {
            [first, second, ..] => Some(second - first),
            _ => None,
        }
    }

    fn degenerate(&mut self, message: String) -> SlitConvolution {
        warn!(%message, "slit convolution degenerate, signal replaced by sentinel");
        self.fill_signal(DEGENERATE_SIGNAL_SENTINEL);
        SlitConvolution::Degenerate(OesError::numeric_degeneracy(
            "SPECTRUM.SLIT_DEGENERATE",
            message,
        ))
    }
}
