use crate::domain::{OesError, OesResult};
use crate::params::SpeciesParameterSet;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumRecord {
    pub id: String,
    #[serde(with = "sample_values")]
    pub x: Vec<f64>,
    #[serde(with = "sample_values")]
    pub y: Vec<f64>,
    pub parameters: SpeciesParameterSet,
}

/// Persisted fit state: measured spectra with their parameter sets and the
/// session species list. Line lists are not embedded; they are reopened by
/// species name on load.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub spectra: Vec<SpectrumRecord>,
    #[serde(default)]
    pub species: Vec<String>,
}

impl SessionSnapshot {
    pub fn to_json(&self) -> OesResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(source: &str) -> OesResult<Self> {
        let snapshot: Self = serde_json::from_str(source)?;
        for record in &snapshot.spectra {
            record.parameters.validate()?;
        }
        Ok(snapshot)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> OesResult<()> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?).map_err(|source| {
            OesError::io_system(
                "IO.WRITE",
                format!("failed to write session '{}': {source}", path.display()),
            )
        })
    }

    pub fn load(path: impl AsRef<Path>) -> OesResult<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| {
            OesError::io_system(
                "IO.READ",
                format!("failed to read session '{}': {source}", path.display()),
            )
        })?;
        Self::from_json(&source)
    }
}

/// JSON has no literal for NaN or infinity; such samples are written as the
/// strings `"NaN"`, `"inf"` and `"-inf"`. A `null` sample reads back as NaN.
mod sample_values {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Sample {
        Number(f64),
        Text(String),
        Missing,
    }

    impl Sample {
        fn from_value(value: f64) -> Self {
            if value.is_nan() {
                Self::Text("NaN".to_string())
            } else if value.is_infinite() {
                let text = if value > 0.0 { "inf" } else { "-inf" };
                Self::Text(text.to_string())
            } else {
                Self::Number(value)
            }
        }

        fn into_value<E: serde::de::Error>(self) -> Result<f64, E> {
            match self {
                Self::Number(value) => Ok(value),
                Self::Missing => Ok(f64::NAN),
                Self::Text(text) => match text.as_str() {
                    "NaN" | "nan" => Ok(f64::NAN),
                    "inf" | "Infinity" => Ok(f64::INFINITY),
                    "-inf" | "-Infinity" => Ok(f64::NEG_INFINITY),
                    other => Err(E::custom(format!("unrecognized sample value '{other}'"))),
                },
            }
        }
    }

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|value| Sample::from_value(*value)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        Vec::<Sample>::deserialize(deserializer)?
            .into_iter()
            .map(Sample::into_value::<D::Error>)
            .collect()
    }
}
