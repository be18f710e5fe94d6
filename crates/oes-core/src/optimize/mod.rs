//! Local minimization of a vector-valued residual over named, bounded
//! parameters.

mod bounds;
mod levenberg_marquardt;
mod nelder_mead;

pub use bounds::FreeParameter;
pub use levenberg_marquardt::LevenbergMarquardt;
pub use nelder_mead::NelderMead;

use crate::common::config::{DEFAULT_F_TOLERANCE, DEFAULT_X_TOLERANCE};
use crate::common::constants::DEFAULT_MAX_ITERATIONS;
use crate::domain::OesResult;
use crate::numerics::finite_sum_of_squares;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinimizerMethod {
    /// Derivative-free downhill simplex.
    #[default]
    NelderMead,
    /// Levenberg–Marquardt on the residual vector, with standard errors.
    #[serde(alias = "leastsq")]
    LeastSquares,
}

impl MinimizerMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NelderMead => "nelder_mead",
            Self::LeastSquares => "least_squares",
        }
    }

    pub fn minimizer(self) -> Box<dyn Minimizer> {
        match self {
            Self::NelderMead => Box::new(NelderMead),
            Self::LeastSquares => Box::new(LevenbergMarquardt),
        }
    }
}

impl Display for MinimizerMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinimizerOptions {
    pub max_iterations: usize,
    pub x_tolerance: f64,
    pub f_tolerance: f64,
}

impl Default for MinimizerOptions {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            x_tolerance: DEFAULT_X_TOLERANCE,
            f_tolerance: DEFAULT_F_TOLERANCE,
        }
    }
}

/// The function being minimized: external parameter values in, residual
/// vector out. Evaluation may mutate caches, hence `&mut self`.
pub trait ResidualProblem {
    fn residuals(&mut self, values: &[f64]) -> OesResult<Vec<f64>>;
}

impl<F> ResidualProblem for F
where
    F: FnMut(&[f64]) -> OesResult<Vec<f64>>,
{
    fn residuals(&mut self, values: &[f64]) -> OesResult<Vec<f64>> {
        self(values)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MinimizerReport {
    pub success: bool,
    pub message: String,
    pub iterations: usize,
    pub evaluations: usize,
    /// Final values in the order of the parameters handed to the minimizer.
    pub values: Vec<f64>,
    pub stderr: Option<Vec<f64>>,
    /// Sum of squared residuals at `values`.
    pub cost: f64,
    /// Best cost after each iteration.
    pub cost_history: Vec<f64>,
}

impl MinimizerReport {
    pub fn residual_norm(&self) -> f64 {
        self.cost.sqrt()
    }
}

pub trait Minimizer {
    /// Minimizes `Σr²`. Failing to converge is reported through
    /// [`MinimizerReport::success`]; errors are reserved for failures of the
    /// residual function itself.
    fn minimize(
        &self,
        problem: &mut dyn ResidualProblem,
        parameters: &[FreeParameter],
        options: &MinimizerOptions,
    ) -> OesResult<MinimizerReport>;
}

/// `Σr²`, or infinity when any residual is not finite.
pub(crate) fn cost_of(residuals: &[f64]) -> f64 {
    if residuals.iter().any(|value| !value.is_finite()) {
        return f64::INFINITY;
    }
    finite_sum_of_squares(residuals)
}

pub(crate) fn non_finite_count(residuals: &[f64]) -> usize {
    residuals.iter().filter(|value| !value.is_finite()).count()
}

/// Report for a start point whose cost is not finite; no step can improve on
/// an infinite cost, so the search does not begin.
pub(crate) fn non_finite_start(evaluator: &Evaluator<'_>, values: Vec<f64>) -> MinimizerReport {
    MinimizerReport {
        success: false,
        message: "residuals are not finite at the starting point".to_string(),
        iterations: 0,
        evaluations: evaluator.evaluations,
        values,
        stderr: None,
        cost: f64::INFINITY,
        cost_history: vec![f64::INFINITY],
    }
}

/// Evaluates the problem at internal coordinates.
pub(crate) struct Evaluator<'a> {
    problem: &'a mut dyn ResidualProblem,
    parameters: &'a [FreeParameter],
    pub(crate) evaluations: usize,
    non_finite_reported: bool,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(problem: &'a mut dyn ResidualProblem, parameters: &'a [FreeParameter]) -> Self {
        Self {
            problem,
            parameters,
            evaluations: 0,
            non_finite_reported: false,
        }
    }

    pub(crate) fn residuals(&mut self, internal: &[f64]) -> OesResult<Vec<f64>> {
        let external = bounds::to_external(self.parameters, internal);
        self.external_residuals(&external)
    }

    pub(crate) fn external_residuals(&mut self, external: &[f64]) -> OesResult<Vec<f64>> {
        self.evaluations += 1;
        let residuals = self.problem.residuals(external)?;
        let non_finite = non_finite_count(&residuals);
        if non_finite > 0 && !self.non_finite_reported {
            self.non_finite_reported = true;
            warn!(
                evaluation = self.evaluations,
                non_finite,
                total = residuals.len(),
                "residual vector has non-finite entries, cost treated as infinite"
            );
        }
        Ok(residuals)
    }

    pub(crate) fn cost(&mut self, internal: &[f64]) -> OesResult<f64> {
        Ok(cost_of(&self.residuals(internal)?))
    }

    pub(crate) fn external(&self, internal: &[f64]) -> Vec<f64> {
        bounds::to_external(self.parameters, internal)
    }
}

#[cfg(test)]
mod tests {
    use super::{FreeParameter, MinimizerMethod, MinimizerOptions, cost_of, non_finite_count};
    use crate::domain::OesResult;

    /// Exponential decay `a·exp(-k·t)` sampled without noise.
    fn decay_problem() -> impl FnMut(&[f64]) -> OesResult<Vec<f64>> {
        let times: Vec<f64> = (0..20).map(|index| index as f64 * 0.25).collect();
        move |values: &[f64]| {
            Ok(times
                .iter()
                .map(|t| values[0] * (-values[1] * t).exp() - 3.0 * (-0.7 * t).exp())
                .collect())
        }
    }

    #[test]
    fn both_methods_recover_decay_parameters() {
        for method in [MinimizerMethod::NelderMead, MinimizerMethod::LeastSquares] {
            let mut problem = decay_problem();
            let parameters = vec![
                FreeParameter::bounded("amplitude", 1.0, Some(0.0), None),
                FreeParameter::bounded("rate", 0.2, Some(0.01), Some(5.0)),
            ];
            let report = method
                .minimizer()
                .minimize(&mut problem, &parameters, &MinimizerOptions::default())
                .expect("minimize");

            assert!(report.success, "{method}: {}", report.message);
            assert!((report.values[0] - 3.0).abs() < 1.0e-3, "{method}: {:?}", report.values);
            assert!((report.values[1] - 0.7).abs() < 1.0e-3, "{method}: {:?}", report.values);
            assert!(
                report.cost_history.windows(2).all(|pair| pair[1] <= pair[0]),
                "{method}: history must not increase"
            );
        }
    }

    #[test]
    fn method_names_accept_leastsq_alias() {
        let method: MinimizerMethod = serde_json::from_str("\"leastsq\"").expect("alias");
        assert_eq!(method, MinimizerMethod::LeastSquares);
        assert_eq!(MinimizerMethod::default().to_string(), "nelder_mead");
    }

    #[test]
    fn non_finite_residuals_cost_infinity() {
        assert_eq!(cost_of(&[1.0, 2.0]), 5.0);
        assert_eq!(cost_of(&[1.0, f64::NAN]), f64::INFINITY);
        assert_eq!(cost_of(&[f64::INFINITY]), f64::INFINITY);
        assert_eq!(non_finite_count(&[1.0, f64::NAN, f64::NEG_INFINITY]), 2);
    }

    #[test]
    fn non_finite_start_stops_both_methods_early() {
        for method in [MinimizerMethod::NelderMead, MinimizerMethod::LeastSquares] {
            let mut calls = 0;
            let mut problem = |values: &[f64]| -> OesResult<Vec<f64>> {
                calls += 1;
                Ok(vec![values[0] - 1.0, f64::NAN])
            };
            let parameters = vec![FreeParameter::bounded("offset", 0.5, None, None)];
            let options = MinimizerOptions {
                max_iterations: 500,
                ..MinimizerOptions::default()
            };
            let report = method
                .minimizer()
                .minimize(&mut problem, &parameters, &options)
                .expect("minimize");

            assert!(!report.success, "{method}");
            assert_eq!(report.iterations, 0, "{method}");
            assert!(report.message.contains("not finite"), "{method}: {}", report.message);
            assert!((report.values[0] - 0.5).abs() < 1.0e-12, "{method}: {:?}", report.values);
            assert!(calls <= 2, "{method}: {calls} evaluations");
        }
    }
}
