//! Per-species line lists and the temperature-weighted emission spectra
//! computed from them.

mod sqlite;
mod states;
mod store;

pub use sqlite::{SQLITE_HEADER, SqliteLineStore, is_sqlite3};
pub use states::{StateDescriptor, StateGrouping, StateLine, StateLines};
pub use store::{LineRecord, LineStore, MemoryLineStore, Transition, UpperState, WavelengthWindow};

use crate::common::constants::{BOLTZMANN_WAVENUMBER, DEFAULT_WAV_RESERVE};
use crate::domain::{OesError, OesResult, SpectrumOutput, WavelengthMedium};
use crate::numerics::stable_sum;
use crate::spectrum::SpectrumBuffer;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One emission-spectrum request against a [`LineDatabase`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectrumQuery {
    pub trot: f64,
    pub tvib: f64,
    pub wmin: f64,
    pub wmax: f64,
    pub medium: WavelengthMedium,
    pub output: SpectrumOutput,
    /// Margin in nm fetched on either side of the window when the cache grows.
    pub reserve: f64,
}

impl SpectrumQuery {
    pub fn new(trot: f64, tvib: f64, wmin: f64, wmax: f64) -> Self {
        Self {
            trot,
            tvib,
            wmin,
            wmax,
            medium: WavelengthMedium::default(),
            output: SpectrumOutput::default(),
            reserve: DEFAULT_WAV_RESERVE,
        }
    }

    pub fn with_medium(mut self, medium: WavelengthMedium) -> Self {
        self.medium = medium;
        self
    }

    pub fn with_output(mut self, output: SpectrumOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_reserve(mut self, reserve: f64) -> Self {
        self.reserve = reserve;
        self
    }

    fn validate(&self) -> OesResult<WavelengthWindow> {
        for (name, value) in [("Trot", self.trot), ("Tvib", self.tvib)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(OesError::input_validation(
                    "LINEDB.TEMPERATURE",
                    format!("{name} must be finite and > 0 K, got {value}"),
                ));
            }
        }
        if !self.reserve.is_finite() || self.reserve < 0.0 {
            return Err(OesError::input_validation(
                "LINEDB.RESERVE",
                format!("wavelength reserve must be finite and >= 0, got {}", self.reserve),
            ));
        }
        WavelengthWindow::new(self.wmin, self.wmax)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheValidity {
    Valid,
    /// Same line table, different temperatures.
    Repopulate,
    /// Window grew or medium changed.
    Refetch,
}

/// Line table fetched for the last window together with the populations and
/// partition function of the last temperature pair.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumCache {
    window: WavelengthWindow,
    medium: WavelengthMedium,
    temperatures: Option<(f64, f64)>,
    norm: f64,
    lines: Vec<LineRecord>,
    populations: Vec<f64>,
}

impl SpectrumCache {
    fn new(window: WavelengthWindow, medium: WavelengthMedium, lines: Vec<LineRecord>) -> Self {
        Self {
            window,
            medium,
            temperatures: None,
            norm: f64::NAN,
            populations: vec![0.0; lines.len()],
            lines,
        }
    }

    pub fn validity(
        &self,
        window: &WavelengthWindow,
        medium: WavelengthMedium,
        trot: f64,
        tvib: f64,
    ) -> CacheValidity {
        if self.medium != medium || !self.window.covers(window) {
            CacheValidity::Refetch
        } else if self.temperatures != Some((trot, tvib)) {
            CacheValidity::Repopulate
        } else {
            CacheValidity::Valid
        }
    }

    pub fn cache_valid(&self, wmin: f64, wmax: f64, trot: f64, tvib: f64) -> bool {
        let window = WavelengthWindow { min: wmin, max: wmax };
        self.validity(&window, self.medium, trot, tvib) == CacheValidity::Valid
    }

    pub fn window(&self) -> WavelengthWindow {
        self.window
    }

    pub fn medium(&self) -> WavelengthMedium {
        self.medium
    }

    pub fn temperatures(&self) -> Option<(f64, f64)> {
        self.temperatures
    }

    /// Partition function of the cached temperatures.
    pub fn norm(&self) -> f64 {
        self.norm
    }

    pub fn lines(&self) -> &[LineRecord] {
        &self.lines
    }

    pub fn populations(&self) -> &[f64] {
        &self.populations
    }
}

#[derive(Debug)]
struct Backend {
    store: Box<dyn LineStore>,
    states: Vec<UpperState>,
}

/// Tabulated transitions of one species plus the cache of the last computed
/// spectrum.
#[derive(Debug)]
pub struct LineDatabase {
    species: String,
    source: Option<PathBuf>,
    backend: Result<Backend, OesError>,
    cache: Option<SpectrumCache>,
}

impl LineDatabase {
    /// Opens an SQLite line list. The species is the file name up to its
    /// first `.`. A file that fails the header check or the state query
    /// yields an unusable database whose requests all fail.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let species = species_from_path(path);

        let backend = SqliteLineStore::open(path).and_then(|store| {
            let states = store.states()?;
            Ok(Backend {
                store: Box::new(store),
                states,
            })
        });
        if let Err(error) = &backend {
            warn!(species = %species, path = %path.display(), %error, "line-list database unusable");
        }

        Self {
            species,
            source: Some(path.to_path_buf()),
            backend,
            cache: None,
        }
    }

    pub fn from_store(species: impl Into<String>, store: Box<dyn LineStore>) -> OesResult<Self> {
        let states = store.states()?;
        Ok(Self {
            species: species.into(),
            source: None,
            backend: Ok(Backend { store, states }),
            cache: None,
        })
    }

    pub fn species(&self) -> &str {
        &self.species
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn is_usable(&self) -> bool {
        self.backend.is_ok()
    }

    pub fn cache(&self) -> Option<&SpectrumCache> {
        self.cache.as_ref()
    }

    fn backend(&self) -> OesResult<&Backend> {
        self.backend.as_ref().map_err(Clone::clone)
    }

    /// `Z = Σ (2J+1)·exp(−E_J/(k·Trot) − E_v/(k·Tvib))` over every upper state.
    pub fn partition_function(&self, trot: f64, tvib: f64) -> OesResult<f64> {
        let backend = self.backend()?;
        let terms: Vec<f64> = backend
            .states
            .iter()
            .map(|state| boltzmann_factor(state, trot, tvib))
            .collect();
        let norm = stable_sum(&terms);
        if !norm.is_finite() || norm <= 0.0 {
            return Err(OesError::numeric_degeneracy(
                "LINEDB.PARTITION",
                format!(
                    "partition function of {} at Trot={trot}, Tvib={tvib} is {norm}",
                    self.species
                ),
            ));
        }
        Ok(norm)
    }

    /// Emission scatter over `[wmin, wmax]` in air wavelengths, as photon
    /// flux, with the default reserve.
    pub fn get_spectrum(
        &mut self,
        trot: f64,
        tvib: f64,
        wmin: f64,
        wmax: f64,
    ) -> OesResult<SpectrumBuffer> {
        self.get_spectrum_with(&SpectrumQuery::new(trot, tvib, wmin, wmax))
    }

    /// Returns one `(wavelength, population × A)` sample per cached line,
    /// multiplied by the wavenumber in intensity mode. The line table is only
    /// fetched again when the window leaves the cached one, and populations
    /// only recomputed when a temperature changes.
    pub fn get_spectrum_with(&mut self, query: &SpectrumQuery) -> OesResult<SpectrumBuffer> {
        let window = query.validate()?;
        let validity = self
            .cache
            .as_ref()
            .map_or(CacheValidity::Refetch, |cache| {
                cache.validity(&window, query.medium, query.trot, query.tvib)
            });

        if validity == CacheValidity::Refetch {
            let fetch_window = window.widened(query.reserve);
            let lines = self.backend()?.store.lines(fetch_window, query.medium)?;
            debug!(
                species = %self.species,
                min = fetch_window.min,
                max = fetch_window.max,
                lines = lines.len(),
                "line table refetched"
            );
            self.cache = Some(SpectrumCache::new(fetch_window, query.medium, lines));
        }

        if validity != CacheValidity::Valid {
            let norm = self.partition_function(query.trot, query.tvib)?;
            if let Some(cache) = self.cache.as_mut() {
                for (population, line) in cache.populations.iter_mut().zip(&cache.lines) {
                    *population = boltzmann_factor(&line.state, query.trot, query.tvib) / norm;
                }
                cache.norm = norm;
                cache.temperatures = Some((query.trot, query.tvib));
            }
        }

        let Some(cache) = self.cache.as_ref() else {
            return Err(OesError::internal(
                "LINEDB.CACHE",
                "spectrum cache missing after refresh",
            ));
        };

        let x = cache
            .lines
            .iter()
            .map(|line| line.wavelength(query.medium))
            .collect();
        let y = cache
            .lines
            .iter()
            .zip(&cache.populations)
            .map(|(line, population)| {
                let flux = population * line.transition.a;
                match query.output {
                    SpectrumOutput::PhotonFlux => flux,
                    SpectrumOutput::Intensity => flux * line.transition.wavenumber,
                }
            })
            .collect();
        SpectrumBuffer::new(x, y)
    }

    /// Transitions of `[wmin, wmax]` grouped by emitting state, for
    /// Boltzmann-plot style analysis.
    pub fn lines_by_state(
        &self,
        wmin: f64,
        wmax: f64,
        grouping: &StateGrouping,
    ) -> OesResult<Vec<StateLines>> {
        let window = WavelengthWindow::new(wmin, wmax)?;
        let lines = self.backend()?.store.lines(window, grouping.medium)?;
        Ok(states::group_lines(&lines, grouping))
    }
}

fn boltzmann_factor(state: &UpperState, trot: f64, tvib: f64) -> f64 {
    (2.0 * state.j + 1.0)
        * (-state.e_j / (BOLTZMANN_WAVENUMBER * trot) - state.e_v / (BOLTZMANN_WAVENUMBER * tvib))
            .exp()
}

fn species_from_path(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.find('.') {
        Some(stop) => name[..stop].to_string(),
        None => name,
    }
}
