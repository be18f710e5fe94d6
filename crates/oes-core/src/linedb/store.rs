use crate::domain::{OesError, OesResult, WavelengthMedium};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UpperState {
    pub id: i64,
    pub j: f64,
    /// Rotational term energy in cm⁻¹.
    pub e_j: f64,
    /// Vibrational term energy in cm⁻¹.
    pub e_v: f64,
    pub v: i64,
    pub component: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub id: i64,
    pub upper_state: i64,
    pub lower_state: i64,
    /// Einstein emission coefficient.
    pub a: f64,
    pub air_wavelength: f64,
    pub vacuum_wavelength: f64,
    pub wavenumber: f64,
    pub branch: Option<String>,
}

impl Transition {
    pub fn wavelength(&self, medium: WavelengthMedium) -> f64 {
        match medium {
            WavelengthMedium::Air => self.air_wavelength,
            WavelengthMedium::Vacuum => self.vacuum_wavelength,
        }
    }
}

/// A transition joined with its upper state.
#[derive(Debug, Clone, PartialEq)]
pub struct LineRecord {
    pub transition: Transition,
    pub state: UpperState,
}

impl LineRecord {
    pub fn wavelength(&self, medium: WavelengthMedium) -> f64 {
        self.transition.wavelength(medium)
    }
}

/// Closed wavelength interval in nm. A window with an infinite bound selects
/// the whole line list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WavelengthWindow {
    pub min: f64,
    pub max: f64,
}

impl WavelengthWindow {
    pub fn new(min: f64, max: f64) -> OesResult<Self> {
        if min.is_nan() || max.is_nan() || min > max {
            return Err(OesError::input_validation(
                "LINEDB.WINDOW",
                format!("invalid wavelength window [{min}, {max}]"),
            ));
        }
        Ok(Self { min, max })
    }

    pub const fn unbounded() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    pub fn contains(&self, wavelength: f64) -> bool {
        wavelength >= self.min && wavelength <= self.max
    }

    pub fn covers(&self, other: &Self) -> bool {
        other.min >= self.min && other.max <= self.max
    }

    pub fn widened(&self, reserve: f64) -> Self {
        Self {
            min: self.min - reserve,
            max: self.max + reserve,
        }
    }
}

/// Read access to one species' tabulated upper states and transitions.
pub trait LineStore: Debug {
    /// Every upper state, used for the partition function.
    fn states(&self) -> OesResult<Vec<UpperState>>;

    /// Transitions inside `window` joined with their upper states, ordered by
    /// the `medium` wavelength.
    fn lines(&self, window: WavelengthWindow, medium: WavelengthMedium) -> OesResult<Vec<LineRecord>>;
}

/// Line list held in memory, for synthetic species and tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryLineStore {
    states: Vec<UpperState>,
    transitions: Vec<Transition>,
}

impl MemoryLineStore {
    pub fn new(states: Vec<UpperState>, transitions: Vec<Transition>) -> OesResult<Self> {
        let mut seen = HashSet::with_capacity(states.len());
        for state in &states {
            if !seen.insert(state.id) {
                return Err(OesError::data_source(
                    "LINEDB.DUPLICATE_STATE",
                    format!("upper state id {} appears more than once", state.id),
                ));
            }
        }
        Ok(Self {
            states,
            transitions,
        })
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }
}

impl LineStore for MemoryLineStore {
    fn states(&self) -> OesResult<Vec<UpperState>> {
        Ok(self.states.clone())
    }

    fn lines(&self, window: WavelengthWindow, medium: WavelengthMedium) -> OesResult<Vec<LineRecord>> {
        let by_id: HashMap<i64, &UpperState> =
            self.states.iter().map(|state| (state.id, state)).collect();

        let mut records: Vec<LineRecord> = self
            .transitions
            .iter()
            .filter(|transition| !window.is_bounded() || window.contains(transition.wavelength(medium)))
            .filter_map(|transition| {
                by_id.get(&transition.upper_state).map(|state| LineRecord {
                    transition: transition.clone(),
                    state: **state,
                })
            })
            .collect();
        records.sort_by(|lhs, rhs| lhs.wavelength(medium).total_cmp(&rhs.wavelength(medium)));
        Ok(records)
    }
}
