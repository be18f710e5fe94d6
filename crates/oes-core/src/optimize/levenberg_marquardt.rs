use super::{
    Evaluator, FreeParameter, Minimizer, MinimizerOptions, MinimizerReport, ResidualProblem,
    bounds, cost_of, non_finite_start,
};
use crate::domain::{OesError, OesResult};
use crate::numerics::{DenseMatrix, lu_invert, lu_solve};
use tracing::debug;

const INITIAL_DAMPING: f64 = 1.0e-3;
const MIN_DAMPING: f64 = 1.0e-12;
const MAX_DAMPING: f64 = 1.0e16;
const DAMPING_FACTOR: f64 = 10.0;
const MIN_DIAGONAL: f64 = 1.0e-12;

/// Damped Gauss–Newton on the residual vector.
///
/// Steps solve `(JᵀJ + λ·diag(JᵀJ)) δ = -Jᵀr` in internal coordinates with
/// a forward-difference Jacobian. Standard errors come from `(JᵀJ)⁻¹`
/// scaled by the reduced chi-square, evaluated in external coordinates at
/// the solution.
#[derive(Debug, Clone, Copy, Default)]
pub struct LevenbergMarquardt;

impl Minimizer for LevenbergMarquardt {
    fn minimize(
        &self,
        problem: &mut dyn ResidualProblem,
        parameters: &[FreeParameter],
        options: &MinimizerOptions,
    ) -> OesResult<MinimizerReport> {
        let mut evaluator = Evaluator::new(problem, parameters);
        let mut internal = bounds::to_internal(parameters);
        let dimension = internal.len();

        let mut residuals = evaluator.residuals(&internal)?;
        let mut cost = cost_of(&residuals);
        if dimension == 0 {
            return Ok(MinimizerReport {
                success: true,
                message: "no varying parameters".to_string(),
                iterations: 0,
                evaluations: evaluator.evaluations,
                values: Vec::new(),
                stderr: None,
                cost,
                cost_history: vec![cost],
            });
        }
        if !cost.is_finite() {
            return Ok(non_finite_start(&evaluator, evaluator.external(&internal)));
        }
        if residuals.len() < dimension {
            return Ok(MinimizerReport {
                success: false,
                message: format!(
                    "{} residuals cannot determine {dimension} varying parameters",
                    residuals.len()
                ),
                iterations: 0,
                evaluations: evaluator.evaluations,
                values: evaluator.external(&internal),
                stderr: None,
                cost,
                cost_history: vec![cost],
            });
        }
        if !cost.is_finite() {
            return Ok(MinimizerReport {
                success: false,
                message: "residuals at the start values are not finite".to_string(),
                iterations: 0,
                evaluations: evaluator.evaluations,
                values: evaluator.external(&internal),
                stderr: None,
                cost,
                cost_history: vec![cost],
            });
        }

        let mut cost_history = vec![cost];
        let mut damping = INITIAL_DAMPING;
        let mut iterations = 0;
        let mut message = None;

        while iterations < options.max_iterations {
            iterations += 1;
            let jacobian = forward_jacobian(&mut evaluator, &internal, &residuals, Space::Internal)?;
            let (normal, gradient) = normal_equations(&jacobian, &residuals);
            if gradient.iter().all(|value| *value == 0.0) {
                message = Some("gradient vanished");
                break;
            }

            let previous_cost = cost;
            let mut accepted = None;
            while damping <= MAX_DAMPING {
                if let Some(step) = damped_step(&normal, &gradient, damping) {
                    let trial: Vec<f64> = internal.iter().zip(&step).map(|(p, s)| p + s).collect();
                    let trial_residuals = evaluator.residuals(&trial)?;
                    let trial_cost = cost_of(&trial_residuals);
                    if trial_cost < cost {
                        accepted = Some(step);
                        internal = trial;
                        residuals = trial_residuals;
                        cost = trial_cost;
                        damping = (damping / DAMPING_FACTOR).max(MIN_DAMPING);
                        break;
                    }
                }
                damping *= DAMPING_FACTOR;
            }

            let Some(step) = accepted else {
                message = Some("cost cannot be reduced further");
                break;
            };
            cost_history.push(cost);
            debug!(iteration = iterations, cost, damping, "levenberg-marquardt iteration");

            let small_step = step
                .iter()
                .zip(&internal)
                .all(|(s, p)| s.abs() <= options.x_tolerance * (p.abs() + options.x_tolerance));
            if cost == 0.0 || previous_cost - cost <= options.f_tolerance * previous_cost || small_step {
                message = Some("optimization terminated successfully");
                break;
            }
        }

        let success = message.is_some();
        let message = message.map_or_else(
            || format!("maximum number of iterations ({}) exceeded", options.max_iterations),
            str::to_string,
        );

        let values = evaluator.external(&internal);
        let stderr = standard_errors(&mut evaluator, &values, &residuals, cost)?;

        Ok(MinimizerReport {
            success,
            message,
            iterations,
            evaluations: evaluator.evaluations,
            values,
            stderr,
            cost,
            cost_history,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Space {
    Internal,
    External,
}

/// `m × n` Jacobian of the residuals by forward differences.
fn forward_jacobian(
    evaluator: &mut Evaluator<'_>,
    point: &[f64],
    residuals: &[f64],
    space: Space,
) -> OesResult<DenseMatrix> {
    let mut jacobian = DenseMatrix::zeros(residuals.len(), point.len());
    let mut shifted = point.to_vec();
    for col in 0..point.len() {
        let step = f64::EPSILON.sqrt() * point[col].abs().max(1.0);
        shifted[col] = point[col] + step;
        let perturbed = match space {
            Space::Internal => evaluator.residuals(&shifted)?,
            Space::External => evaluator.external_residuals(&shifted)?,
        };
        shifted[col] = point[col];

        if perturbed.len() != residuals.len() {
            return Err(OesError::internal(
                "OPTIMIZE.RESIDUAL_LENGTH",
                format!(
                    "residual length changed from {} to {} between evaluations",
                    residuals.len(),
                    perturbed.len()
                ),
            ));
        }
        for (row, (after, before)) in perturbed.iter().zip(residuals).enumerate() {
            jacobian[(row, col)] = (after - before) / step;
        }
    }
    Ok(jacobian)
}

/// `(JᵀJ, Jᵀr)`.
fn normal_equations(jacobian: &DenseMatrix, residuals: &[f64]) -> (DenseMatrix, Vec<f64>) {
    let columns = jacobian.ncols();
    let mut normal = DenseMatrix::zeros(columns, columns);
    let mut gradient = vec![0.0; columns];
    for lhs in 0..columns {
        for rhs in lhs..columns {
            let mut value = 0.0;
            for row in 0..jacobian.nrows() {
                value += jacobian[(row, lhs)] * jacobian[(row, rhs)];
            }
            normal[(lhs, rhs)] = value;
            normal[(rhs, lhs)] = value;
        }
        gradient[lhs] = (0..jacobian.nrows())
            .map(|row| jacobian[(row, lhs)] * residuals[row])
            .sum();
    }
    (normal, gradient)
}

fn damped_step(normal: &DenseMatrix, gradient: &[f64], damping: f64) -> Option<Vec<f64>> {
    let mut damped = normal.clone();
    for index in 0..normal.nrows() {
        damped[(index, index)] += damping * normal[(index, index)].max(MIN_DIAGONAL);
    }
    let rhs: Vec<f64> = gradient.iter().map(|value| -value).collect();
    lu_solve(&damped, &rhs)
        .ok()
        .filter(|step| step.iter().all(|value| value.is_finite()))
}

/// `sqrt(diag((JᵀJ)⁻¹) · cost / (m - n))`, or `None` when the problem has
/// no degrees of freedom left or the curvature matrix is singular.
fn standard_errors(
    evaluator: &mut Evaluator<'_>,
    values: &[f64],
    residuals: &[f64],
    cost: f64,
) -> OesResult<Option<Vec<f64>>> {
    let (observations, dimension) = (residuals.len(), values.len());
    if observations <= dimension || !cost.is_finite() {
        return Ok(None);
    }

    let external_residuals = evaluator.external_residuals(values)?;
    let jacobian = forward_jacobian(evaluator, values, &external_residuals, Space::External)?;
    let (normal, _) = normal_equations(&jacobian, &external_residuals);
    let Ok(covariance) = lu_invert(&normal) else {
        debug!("curvature matrix is singular, standard errors unavailable");
        return Ok(None);
    };

    let reduced_chi_square = cost / (observations - dimension) as f64;
    let errors: Vec<f64> = (0..dimension)
        .map(|index| (covariance[(index, index)] * reduced_chi_square).sqrt())
        .collect();
    Ok(errors.iter().all(|value| value.is_finite()).then_some(errors))
}
