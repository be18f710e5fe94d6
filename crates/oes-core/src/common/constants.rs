//! Physical constants (CODATA 2018 exact SI values) and the numeric guards
//! shared by the spectrum and fitting layers.

pub const BOLTZMANN_J_PER_K: f64 = 1.380_649e-23;
pub const PLANCK_J_S: f64 = 6.626_070_15e-34;
pub const SPEED_OF_LIGHT_M_PER_S: f64 = 299_792_458.0;

/// Boltzmann constant in wavenumber units, cm⁻¹ K⁻¹.
pub const BOLTZMANN_WAVENUMBER: f64 =
    BOLTZMANN_J_PER_K / (PLANCK_J_S * SPEED_OF_LIGHT_M_PER_S) / 100.0;

/// Extra wavelength (nm) fetched on each side of a requested window.
pub const DEFAULT_WAV_RESERVE: f64 = 2.0;
/// Padding (nm) added on each side of the line positions by mesh refinement.
pub const MESH_EDGE_PADDING: f64 = 2.0;
/// Offset (nm) of the zero-valued guard point placed beyond a simulated edge.
pub const MATCH_EDGE_OFFSET: f64 = 1.0e-3;
/// Kernel samples below `peak * SLIT_TRUNCATION_RATIO` are dropped.
pub const SLIT_TRUNCATION_RATIO: f64 = 1.0e-3;
/// Value written into a spectrum whose convolution degenerated.
pub const DEGENERATE_SIGNAL_SENTINEL: f64 = 1.0e100;
/// Smallest slit half-width accepted by the Voigt profile.
pub const MIN_PROFILE_WIDTH: f64 = 1.0e-10;

pub const DEFAULT_POINTS_PER_NM: f64 = 1000.0;
pub const DEFAULT_MAX_ITERATIONS: usize = 2000;

pub const TEMPERATURE_MIN: f64 = 300.0;
pub const TEMPERATURE_MAX: f64 = 10_000.0;

#[cfg(test)]
mod tests {
    use super::{
        BOLTZMANN_WAVENUMBER, DEGENERATE_SIGNAL_SENTINEL, MIN_PROFILE_WIDTH, TEMPERATURE_MAX,
        TEMPERATURE_MIN,
    };

    #[test]
    fn boltzmann_constant_in_wavenumbers_matches_codata() {
        assert!((BOLTZMANN_WAVENUMBER - 0.695_034_800).abs() < 1.0e-9);
    }

    #[test]
    fn guards_are_finite_and_ordered() {
        assert!(DEGENERATE_SIGNAL_SENTINEL.is_finite());
        assert!(MIN_PROFILE_WIDTH > 0.0);
        assert!(TEMPERATURE_MIN < TEMPERATURE_MAX);
    }
}
