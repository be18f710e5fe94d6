pub mod errors;

pub use errors::{OesError, OesErrorCategory, OesResult};

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Column of the line list used as the wavelength axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WavelengthMedium {
    #[default]
    Air,
    Vacuum,
}

impl WavelengthMedium {
    pub const fn column(self) -> &'static str {
        match self {
            Self::Air => "air_wavelength",
            Self::Vacuum => "vacuum_wavelength",
        }
    }
}

impl Display for WavelengthMedium {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).column())
    }
}

/// Quantity carried on the y-axis of a simulated line list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpectrumOutput {
    /// population × emission coefficient
    #[default]
    PhotonFlux,
    /// population × emission coefficient × wavenumber
    Intensity,
}

#[cfg(test)]
mod tests {
    use super::{SpectrumOutput, WavelengthMedium};

    #[test]
    fn medium_maps_to_line_list_columns() {
        assert_eq!(WavelengthMedium::Air.column(), "air_wavelength");
        assert_eq!(WavelengthMedium::Vacuum.to_string(), "vacuum_wavelength");
        assert_eq!(WavelengthMedium::default(), WavelengthMedium::Air);
    }

    #[test]
    fn output_mode_defaults_to_photon_flux() {
        assert_eq!(SpectrumOutput::default(), SpectrumOutput::PhotonFlux);
        let encoded = serde_json::to_string(&SpectrumOutput::Intensity).expect("encode");
        assert_eq!(encoded, "\"intensity\"");
    }
}
