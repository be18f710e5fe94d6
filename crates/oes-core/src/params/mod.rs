//! Fit parameters of one measured spectrum: a global block (calibration,
//! slit shape, baseline) and one block per attached species.
//!
//! Parameters are addressed structurally through [`ParameterKey`]; the flat
//! names (`wav_shift`, `OH_Trot`, ...) exist only for the optimizer boundary,
//! persistence and reporting.

mod bounded;

pub use bounded::BoundedParameter;

use crate::common::constants::{TEMPERATURE_MAX, TEMPERATURE_MIN};
use crate::domain::{OesError, OesResult};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use tracing::warn;

pub const DEFAULT_NUMBER_OF_PIXELS: usize = 1024;
pub const DEFAULT_TROT: f64 = 1000.0;
pub const DEFAULT_TVIB: f64 = 1000.0;
pub const DEFAULT_INTENSITY: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalParameter {
    WavShift,
    WavStep,
    SlitGauss,
    SlitLorentz,
    Baseline,
    BaselineSlope,
}

impl GlobalParameter {
    pub const ALL: [Self; 6] = [
        Self::WavShift,
        Self::WavStep,
        Self::SlitGauss,
        Self::SlitLorentz,
        Self::Baseline,
        Self::BaselineSlope,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::WavShift => "wav_shift",
            Self::WavStep => "wav_step",
            Self::SlitGauss => "slitf_gauss",
            Self::SlitLorentz => "slitf_lorentz",
            Self::Baseline => "baseline",
            Self::BaselineSlope => "baseline_slope",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpeciesParameter {
    Trot,
    Tvib,
    Intensity,
}

impl SpeciesParameter {
    pub const ALL: [Self; 3] = [Self::Trot, Self::Tvib, Self::Intensity];

    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Trot => "_Trot",
            Self::Tvib => "_Tvib",
            Self::Intensity => "_intensity",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParameterKey {
    Global(GlobalParameter),
    Species {
        species: String,
        kind: SpeciesParameter,
    },
}

impl ParameterKey {
    pub fn species(species: impl Into<String>, kind: SpeciesParameter) -> Self {
        Self::Species {
            species: species.into(),
            kind,
        }
    }

    pub fn flat_name(&self) -> String {
        match self {
            Self::Global(kind) => kind.name().to_string(),
            Self::Species { species, kind } => format!("{species}{}", kind.suffix()),
        }
    }
}

impl Display for ParameterKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.flat_name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalBlock {
    pub wav_shift: BoundedParameter,
    pub wav_step: BoundedParameter,
    pub slitf_gauss: BoundedParameter,
    pub slitf_lorentz: BoundedParameter,
    pub baseline: BoundedParameter,
    pub baseline_slope: BoundedParameter,
}

impl Default for GlobalBlock {
    fn default() -> Self {
        Self {
            wav_shift: BoundedParameter::new(0.0),
            wav_step: BoundedParameter::new(1.0e-2),
            slitf_gauss: BoundedParameter::new(1.0e-9),
            slitf_lorentz: BoundedParameter::new(1.0e-9),
            baseline: BoundedParameter::new(0.0),
            baseline_slope: BoundedParameter::new(0.0),
        }
    }
}

impl GlobalBlock {
    pub fn get(&self, kind: GlobalParameter) -> &BoundedParameter {
        match kind {
            GlobalParameter::WavShift => &self.wav_shift,
            GlobalParameter::WavStep => &self.wav_step,
            GlobalParameter::SlitGauss => &self.slitf_gauss,
            GlobalParameter::SlitLorentz => &self.slitf_lorentz,
            GlobalParameter::Baseline => &self.baseline,
            GlobalParameter::BaselineSlope => &self.baseline_slope,
        }
    }

    pub fn get_mut(&mut self, kind: GlobalParameter) -> &mut BoundedParameter {
        match kind {
            GlobalParameter::WavShift => &mut self.wav_shift,
            GlobalParameter::WavStep => &mut self.wav_step,
            GlobalParameter::SlitGauss => &mut self.slitf_gauss,
            GlobalParameter::SlitLorentz => &mut self.slitf_lorentz,
            GlobalParameter::Baseline => &mut self.baseline,
            GlobalParameter::BaselineSlope => &mut self.baseline_slope,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesBlock {
    pub name: String,
    pub trot: BoundedParameter,
    pub tvib: BoundedParameter,
    pub intensity: BoundedParameter,
}

impl SpeciesBlock {
    fn new(name: String, trot: f64, tvib: f64, intensity: f64) -> Self {
        Self {
            name,
            trot: BoundedParameter::new(trot)
                .with_min(TEMPERATURE_MIN)
                .with_max(TEMPERATURE_MAX),
            tvib: BoundedParameter::new(tvib)
                .with_min(TEMPERATURE_MIN)
                .with_max(TEMPERATURE_MAX),
            intensity: BoundedParameter::new(intensity).with_min(0.0),
        }
    }

    pub fn get(&self, kind: SpeciesParameter) -> &BoundedParameter {
        match kind {
            SpeciesParameter::Trot => &self.trot,
            SpeciesParameter::Tvib => &self.tvib,
            SpeciesParameter::Intensity => &self.intensity,
        }
    }

    pub fn get_mut(&mut self, kind: SpeciesParameter) -> &mut BoundedParameter {
        match kind {
            SpeciesParameter::Trot => &mut self.trot,
            SpeciesParameter::Tvib => &mut self.tvib,
            SpeciesParameter::Intensity => &mut self.intensity,
        }
    }
}

/// Bounded parameters of one measured spectrum. The species order is the
/// order in which blocks were added and is preserved by serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesParameterSet {
    number_of_pixels: usize,
    #[serde(default)]
    global: GlobalBlock,
    #[serde(default)]
    species: Vec<SpeciesBlock>,
}

impl Default for SpeciesParameterSet {
    fn default() -> Self {
        Self::new(DEFAULT_NUMBER_OF_PIXELS)
    }
}

impl SpeciesParameterSet {
    pub fn new(number_of_pixels: usize) -> Self {
        Self {
            number_of_pixels,
            global: GlobalBlock::default(),
            species: Vec::new(),
        }
    }

    pub fn number_of_pixels(&self) -> usize {
        self.number_of_pixels
    }

    pub fn set_number_of_pixels(&mut self, number_of_pixels: usize) {
        self.number_of_pixels = number_of_pixels;
    }

    pub fn global(&self) -> &GlobalBlock {
        &self.global
    }

    pub fn global_mut(&mut self) -> &mut GlobalBlock {
        &mut self.global
    }

    /// Current value of a global parameter.
    pub fn value(&self, kind: GlobalParameter) -> f64 {
        self.global.get(kind).value
    }

    pub fn species(&self) -> impl Iterator<Item = &str> {
        self.species.iter().map(|block| block.name.as_str())
    }

    pub fn species_blocks(&self) -> &[SpeciesBlock] {
        &self.species
    }

    pub fn species_block(&self, name: &str) -> Option<&SpeciesBlock> {
        self.species.iter().find(|block| block.name == name)
    }

    pub fn has_species(&self, name: &str) -> bool {
        self.species_block(name).is_some()
    }

    pub fn add_species(&mut self, name: &str) -> OesResult<()> {
        self.add_species_with(name, DEFAULT_TROT, DEFAULT_TVIB, DEFAULT_INTENSITY)
    }

    /// Appends a species block with Trot/Tvib bounded to [300, 10000] K and a
    /// non-negative intensity.
    pub fn add_species_with(
        &mut self,
        name: &str,
        trot: f64,
        tvib: f64,
        intensity: f64,
    ) -> OesResult<()> {
        if !is_valid_identifier(name) || self.has_species(name) {
            let error = OesError::invalid_species(
                "PARAMS.SPECIES_REJECTED",
                format!("species '{name}' not added: invalid name or already added"),
            );
            warn!(species = name, "{}", error.message());
            return Err(error);
        }

        self.species
            .push(SpeciesBlock::new(name.to_string(), trot, tvib, intensity));
        Ok(())
    }

    pub fn remove_species(&mut self, name: &str) -> OesResult<SpeciesBlock> {
        let position = self
            .species
            .iter()
            .position(|block| block.name == name)
            .ok_or_else(|| {
                OesError::invalid_species(
                    "PARAMS.SPECIES_ABSENT",
                    format!("species '{name}' is not part of this parameter set"),
                )
            })?;
        Ok(self.species.remove(position))
    }

    pub fn get(&self, key: &ParameterKey) -> Option<&BoundedParameter> {
        match key {
            ParameterKey::Global(kind) => Some(self.global.get(*kind)),
            ParameterKey::Species { species, kind } => {
                self.species_block(species).map(|block| block.get(*kind))
            }
        }
    }

    pub fn get_mut(&mut self, key: &ParameterKey) -> Option<&mut BoundedParameter> {
        match key {
            ParameterKey::Global(kind) => Some(self.global.get_mut(*kind)),
            ParameterKey::Species { species, kind } => self
                .species
                .iter_mut()
                .find(|block| &block.name == species)
                .map(|block| block.get_mut(*kind)),
        }
    }

    /// Resolves a flat optimizer name against the current species list.
    pub fn key_for(&self, flat_name: &str) -> Option<ParameterKey> {
        if let Some(kind) = GlobalParameter::from_name(flat_name) {
            return Some(ParameterKey::Global(kind));
        }
        self.species.iter().find_map(|block| {
            let kind = SpeciesParameter::ALL.into_iter().find(|kind| {
                flat_name
                    .strip_prefix(block.name.as_str())
                    .is_some_and(|rest| rest == kind.suffix())
            })?;
            Some(ParameterKey::species(block.name.clone(), kind))
        })
    }

    pub fn by_name(&self, flat_name: &str) -> Option<&BoundedParameter> {
        self.key_for(flat_name).and_then(|key| self.get(&key))
    }

    pub fn by_name_mut(&mut self, flat_name: &str) -> Option<&mut BoundedParameter> {
        let key = self.key_for(flat_name)?;
        self.get_mut(&key)
    }

    /// Globals in declaration order, then each species' Trot, Tvib and
    /// intensity in species order.
    pub fn keys(&self) -> Vec<ParameterKey> {
        let mut keys: Vec<ParameterKey> = GlobalParameter::ALL
            .into_iter()
            .map(ParameterKey::Global)
            .collect();
        for block in &self.species {
            keys.extend(
                SpeciesParameter::ALL
                    .into_iter()
                    .map(|kind| ParameterKey::species(block.name.clone(), kind)),
            );
        }
        keys
    }

    pub fn flat_names(&self) -> Vec<String> {
        self.keys().iter().map(ParameterKey::flat_name).collect()
    }

    /// Checks invariants that deserialized data may violate.
    pub fn validate(&self) -> OesResult<()> {
        let mut seen: Vec<&str> = Vec::with_capacity(self.species.len());
        for block in &self.species {
            if !is_valid_identifier(&block.name) || seen.contains(&block.name.as_str()) {
                return Err(OesError::invalid_species(
                    "PARAMS.SPECIES_REJECTED",
                    format!("species '{}' is invalid or duplicated", block.name),
                ));
            }
            seen.push(&block.name);
        }

        for key in self.keys() {
            let Some(parameter) = self.get(&key) else {
                continue;
            };
            if !parameter.bounds_are_consistent() {
                return Err(OesError::input_validation(
                    "PARAMS.BOUNDS",
                    format!("parameter {key} has inconsistent bounds"),
                ));
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> OesResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(source: &str) -> OesResult<Self> {
        let parameters: Self = serde_json::from_str(source)?;
        parameters.validate()?;
        Ok(parameters)
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|rest| rest.is_ascii_alphanumeric() || rest == '_')
}

#[cfg(test)]
mod tests {
    use super::{
        GlobalParameter, ParameterKey, SpeciesParameter, SpeciesParameterSet, is_valid_identifier,
    };
    use crate::domain::OesErrorCategory;

    #[test]
    fn new_sets_have_default_global_block_and_no_species() {
        let parameters = SpeciesParameterSet::new(512);
        assert_eq!(parameters.number_of_pixels(), 512);
        assert_eq!(parameters.species().count(), 0);
        assert_eq!(parameters.value(GlobalParameter::WavStep), 1.0e-2);
        assert_eq!(
            parameters.flat_names(),
            vec![
                "wav_shift",
                "wav_step",
                "slitf_gauss",
                "slitf_lorentz",
                "baseline",
                "baseline_slope"
            ]
        );
    }

    #[test]
    fn adding_species_creates_three_bounded_parameters() {
        let mut parameters = SpeciesParameterSet::default();
        parameters.add_species("OH").expect("add");

        let trot = parameters.by_name("OH_Trot").expect("trot");
        assert_eq!(trot.value, 1000.0);
        assert_eq!((trot.min, trot.max), (Some(300.0), Some(10_000.0)));
        let intensity = parameters.by_name("OH_intensity").expect("intensity");
        assert_eq!((intensity.min, intensity.max), (Some(0.0), None));
        assert_eq!(parameters.flat_names().len(), 9);
    }

    #[test]
    fn invalid_or_duplicate_species_are_rejected_without_changes() {
        let mut parameters = SpeciesParameterSet::default();
        parameters.add_species("N2").expect("add");
        let before = parameters.clone();

        for name in ["N2", "2N", "N-2", ""] {
            let error = parameters.add_species(name).expect_err("rejected");
            assert_eq!(error.category(), OesErrorCategory::InvalidSpecies);
            assert!(error.category().is_recoverable());
        }
        assert_eq!(parameters, before);
    }

    #[test]
    fn add_then_remove_restores_previous_state() {
        let mut parameters = SpeciesParameterSet::default();
        parameters.add_species("OH").expect("add");
        let before = parameters.clone();

        parameters
            .add_species_with("N2_C_B", 2500.0, 4000.0, 0.5)
            .expect("add");
        let removed = parameters.remove_species("N2_C_B").expect("remove");
        assert_eq!(removed.tvib.value, 4000.0);
        assert_eq!(parameters, before);

        let error = parameters.remove_species("NO").expect_err("absent");
        assert_eq!(error.category(), OesErrorCategory::InvalidSpecies);
    }

    #[test]
    fn flat_names_resolve_to_structured_keys() {
        let mut parameters = SpeciesParameterSet::default();
        parameters.add_species("N2").expect("add");
        parameters.add_species("N2_plus").expect("add");

        assert_eq!(
            parameters.key_for("N2_plus_Tvib"),
            Some(ParameterKey::species("N2_plus", SpeciesParameter::Tvib))
        );
        assert_eq!(
            parameters.key_for("N2_intensity"),
            Some(ParameterKey::species("N2", SpeciesParameter::Intensity))
        );
        assert_eq!(
            parameters.key_for("slitf_gauss"),
            Some(ParameterKey::Global(GlobalParameter::SlitGauss))
        );
        assert_eq!(parameters.key_for("OH_Trot"), None);

        parameters.by_name_mut("N2_Trot").expect("trot").value = 4200.0;
        assert_eq!(parameters.species_block("N2").expect("N2").trot.value, 4200.0);
    }

    #[test]
    fn json_round_trip_preserves_values_bounds_and_order() {
        let mut parameters = SpeciesParameterSet::new(1340);
        parameters.add_species("OH").expect("add");
        parameters.add_species("N2").expect("add");
        parameters.global_mut().wav_shift.value = -0.125;
        parameters.global_mut().baseline_slope.vary = false;
        parameters.by_name_mut("N2_Tvib").expect("tvib").stderr = Some(12.5);

        let encoded = parameters.to_json().expect("encode");
        let decoded = SpeciesParameterSet::from_json(&encoded).expect("decode");
        assert_eq!(decoded, parameters);
        assert_eq!(decoded.species().collect::<Vec<_>>(), vec!["OH", "N2"]);
    }

    #[test]
    fn from_json_rejects_duplicated_species() {
        let mut parameters = SpeciesParameterSet::default();
        parameters.add_species("OH").expect("add");
        let encoded = parameters.to_json().expect("encode");
        let mut value: serde_json::Value = serde_json::from_str(&encoded).expect("value");
        let block = value["species"][0].clone();
        value["species"]
            .as_array_mut()
            .expect("species array")
            .push(block);

        let error = SpeciesParameterSet::from_json(&value.to_string()).expect_err("duplicate");
        assert_eq!(error.category(), OesErrorCategory::InvalidSpecies);
    }

    #[test]
    fn identifier_grammar() {
        assert!(is_valid_identifier("OH"));
        assert!(is_valid_identifier("_N2plus"));
        assert!(!is_valid_identifier("N2+"));
        assert!(!is_valid_identifier("1N2"));
    }
}
