/// One varying parameter as seen by a minimizer: its flat name, start value
/// and optional bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct FreeParameter {
    pub name: String,
    pub value: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl FreeParameter {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            min: None,
            max: None,
        }
    }

    pub fn bounded(name: impl Into<String>, value: f64, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            name: name.into(),
            value,
            min,
            max,
        }
    }

    pub(crate) fn transform(&self) -> BoundsTransform {
        match (self.min, self.max) {
            (Some(min), Some(max)) => BoundsTransform::Both { min, max },
            (Some(min), None) => BoundsTransform::Lower { min },
            (None, Some(max)) => BoundsTransform::Upper { max },
            (None, None) => BoundsTransform::Free,
        }
    }
}

/// Maps an unbounded internal coordinate onto a bounded parameter, so
/// unconstrained minimizers can never step outside the bounds.
///
/// Two-sided bounds use `min + (sin(u) + 1)(max - min)/2`; a single bound
/// uses `min - 1 + sqrt(u² + 1)` (or its mirror for an upper bound).
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum BoundsTransform {
    Free,
    Lower { min: f64 },
    Upper { max: f64 },
    Both { min: f64, max: f64 },
}

impl BoundsTransform {
    pub(crate) fn to_internal(self, value: f64) -> f64 {
        match self {
            Self::Free => value,
            Self::Lower { min } => {
                let shifted = value.max(min) - min + 1.0;
                (shifted * shifted - 1.0).sqrt()
            }
            Self::Upper { max } => {
                let shifted = max - value.min(max) + 1.0;
                (shifted * shifted - 1.0).sqrt()
            }
            Self::Both { min, max } => {
                let scaled = 2.0 * (value - min) / (max - min) - 1.0;
                scaled.clamp(-1.0, 1.0).asin()
            }
        }
    }

    pub(crate) fn to_external(self, internal: f64) -> f64 {
        match self {
            Self::Free => internal,
            Self::Lower { min } => min - 1.0 + (internal * internal + 1.0).sqrt(),
            Self::Upper { max } => max + 1.0 - (internal * internal + 1.0).sqrt(),
            Self::Both { min, max } => min + (internal.sin() + 1.0) * (max - min) / 2.0,
        }
    }
}

pub(crate) fn to_internal(parameters: &[FreeParameter]) -> Vec<f64> {
    parameters
        .iter()
        .map(|parameter| parameter.transform().to_internal(parameter.value))
        .collect()
}

pub(crate) fn to_external(parameters: &[FreeParameter], internal: &[f64]) -> Vec<f64> {
    parameters
        .iter()
        .zip(internal)
        .map(|(parameter, value)| parameter.transform().to_external(*value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{BoundsTransform, FreeParameter, to_external, to_internal};

    #[test]
    fn transforms_invert_inside_bounds() {
        let cases = [
            (BoundsTransform::Free, -3.5),
            (BoundsTransform::Lower { min: 0.0 }, 2.25),
            (BoundsTransform::Upper { max: 10.0 }, 4.0),
            (
                BoundsTransform::Both {
                    min: 300.0,
                    max: 10_000.0,
                },
                5000.0,
            ),
        ];
        for (transform, value) in cases {
            let restored = transform.to_external(transform.to_internal(value));
            assert!((restored - value).abs() < 1.0e-9, "{transform:?}: {restored}");
        }
    }

    #[test]
    fn any_internal_value_maps_inside_bounds() {
        let both = BoundsTransform::Both { min: 300.0, max: 10_000.0 };
        let lower = BoundsTransform::Lower { min: 0.0 };
        for internal in [-1.0e6, -7.3, 0.0, 2.1, 1.0e6] {
            let value = both.to_external(internal);
            assert!((300.0..=10_000.0).contains(&value));
            assert!(lower.to_external(internal) >= 0.0);
        }
    }

    #[test]
    fn out_of_bounds_start_values_are_clamped() {
        let parameters = vec![FreeParameter::bounded("OH_Trot", 20_000.0, Some(300.0), Some(10_000.0))];
        let internal = to_internal(&parameters);
        let external = to_external(&parameters, &internal);
        assert!((external[0] - 10_000.0).abs() < 1.0e-6);
    }
}
