use serde::{Deserialize, Serialize};

/// A named fit quantity: current value, optional bounds, whether the
/// optimizer may change it, and the standard error of the last fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundedParameter {
    pub value: f64,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default = "default_vary")]
    pub vary: bool,
    #[serde(default)]
    pub stderr: Option<f64>,
}

fn default_vary() -> bool {
    true
}

impl BoundedParameter {
    pub const fn new(value: f64) -> Self {
        Self {
            value,
            min: None,
            max: None,
            vary: true,
            stderr: None,
        }
    }

    pub const fn with_min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub const fn with_max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub const fn fixed(mut self) -> Self {
        self.vary = false;
        self
    }

    pub fn lower(&self) -> f64 {
        self.min.unwrap_or(f64::NEG_INFINITY)
    }

    pub fn upper(&self) -> f64 {
        self.max.unwrap_or(f64::INFINITY)
    }

    /// Value moved inside the bounds.
    pub fn clamped_value(&self) -> f64 {
        self.value.max(self.lower()).min(self.upper())
    }

    pub fn is_within_bounds(&self) -> bool {
        self.value >= self.lower() && self.value <= self.upper()
    }

    pub(crate) fn bounds_are_consistent(&self) -> bool {
        !(self.lower().is_nan() || self.upper().is_nan()) && self.lower() <= self.upper()
    }
}
