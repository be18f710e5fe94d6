use super::{
    Evaluator, FreeParameter, Minimizer, MinimizerOptions, MinimizerReport, ResidualProblem,
    bounds, non_finite_start,
};
use crate::domain::OesResult;
use tracing::debug;

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;
const NONZERO_PERTURBATION: f64 = 0.05;
const ZERO_PERTURBATION: f64 = 0.000_25;

/// Downhill simplex on the internal (unbounded) coordinates.
///
/// Stops when both the simplex diameter and the spread of its costs fall
/// below the tolerances, or after `max_iterations` iterations.
#[derive(Debug, Clone, Copy, Default)]
pub struct NelderMead;

impl Minimizer for NelderMead {
    fn minimize(
        &self,
        problem: &mut dyn ResidualProblem,
        parameters: &[FreeParameter],
        options: &MinimizerOptions,
    ) -> OesResult<MinimizerReport> {
        let mut evaluator = Evaluator::new(problem, parameters);
        let start = bounds::to_internal(parameters);
        let dimension = start.len();

        if dimension == 0 {
            let cost = evaluator.cost(&start)?;
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

        let mut simplex = initial_simplex(&start);
        let mut costs = Vec::with_capacity(dimension + 1);
        for vertex in &simplex {
            costs.push(evaluator.cost(vertex)?);
        }
        if costs.iter().all(|cost| !cost.is_finite()) {
            return Ok(non_finite_start(&evaluator, evaluator.external(&start)));
        }
        sort_simplex(&mut simplex, &mut costs);

        let mut cost_history = Vec::new();
        let mut iterations = 0;
        let mut converged = false;

        while iterations < options.max_iterations {
            if has_converged(&simplex, &costs, options) {
                converged = true;
                break;
            }

            let worst = dimension;
            let centroid = centroid(&simplex[..worst]);
            let reflected = along(&centroid, &simplex[worst], -REFLECTION);
            let reflected_cost = evaluator.cost(&reflected)?;

            let mut shrink = false;
            if reflected_cost < costs[0] {
                let expanded = along(&centroid, &simplex[worst], -REFLECTION * EXPANSION);
                let expanded_cost = evaluator.cost(&expanded)?;
                if expanded_cost < reflected_cost {
                    simplex[worst] = expanded;
                    costs[worst] = expanded_cost;
                } else {
                    simplex[worst] = reflected;
                    costs[worst] = reflected_cost;
                }
            } else if reflected_cost < costs[worst - 1] {
                simplex[worst] = reflected;
                costs[worst] = reflected_cost;
            } else if reflected_cost < costs[worst] {
                let contracted = along(&centroid, &simplex[worst], -REFLECTION * CONTRACTION);
                let contracted_cost = evaluator.cost(&contracted)?;
                if contracted_cost <= reflected_cost {
                    simplex[worst] = contracted;
                    costs[worst] = contracted_cost;
                } else {
                    shrink = true;
                }
            } else {
                let contracted = along(&centroid, &simplex[worst], CONTRACTION);
                let contracted_cost = evaluator.cost(&contracted)?;
                if contracted_cost < costs[worst] {
                    simplex[worst] = contracted;
                    costs[worst] = contracted_cost;
                } else {
                    shrink = true;
                }
            }

            if shrink {
                let best = simplex[0].clone();
                for index in 1..=dimension {
                    for (coordinate, anchor) in simplex[index].iter_mut().zip(&best) {
                        *coordinate = anchor + SHRINK * (*coordinate - anchor);
                    }
                    costs[index] = evaluator.cost(&simplex[index])?;
                }
            }

            sort_simplex(&mut simplex, &mut costs);
            iterations += 1;
            cost_history.push(costs[0]);
            debug!(iteration = iterations, cost = costs[0], "nelder-mead iteration");
        }

        if !converged {
            converged = has_converged(&simplex, &costs, options);
        }
        let message = if converged {
            "optimization terminated successfully".to_string()
        } else {
            format!("maximum number of iterations ({}) exceeded", options.max_iterations)
        };
        if cost_history.is_empty() {
            cost_history.push(costs[0]);
        }

        Ok(MinimizerReport {
            success: converged,
            message,
            iterations,
            evaluations: evaluator.evaluations,
            values: evaluator.external(&simplex[0]),
            stderr: None,
            cost: costs[0],
            cost_history,
        })
    }
}

fn initial_simplex(start: &[f64]) -> Vec<Vec<f64>> {
    let mut simplex = Vec::with_capacity(start.len() + 1);
    simplex.push(start.to_vec());
    for index in 0..start.len() {
        let mut vertex = start.to_vec();
        vertex[index] = if vertex[index] == 0.0 {
            ZERO_PERTURBATION
        } else {
            (1.0 + NONZERO_PERTURBATION) * vertex[index]
        };
        simplex.push(vertex);
    }
    simplex
}

fn sort_simplex(simplex: &mut Vec<Vec<f64>>, costs: &mut Vec<f64>) {
    let mut order: Vec<usize> = (0..costs.len()).collect();
    order.sort_by(|lhs, rhs| costs[*lhs].total_cmp(&costs[*rhs]));
    *simplex = order.iter().map(|index| simplex[*index].clone()).collect();
    *costs = order.iter().map(|index| costs[*index]).collect();
}

fn has_converged(simplex: &[Vec<f64>], costs: &[f64], options: &MinimizerOptions) -> bool {
    let best = &simplex[0];
    let diameter = simplex[1..]
        .iter()
        .flat_map(|vertex| vertex.iter().zip(best).map(|(lhs, rhs)| (lhs - rhs).abs()))
        .fold(0.0, f64::max);
    let spread = costs[1..]
        .iter()
        .map(|cost| (cost - costs[0]).abs())
        .fold(0.0, f64::max);
    diameter <= options.x_tolerance && spread <= options.f_tolerance
}

fn centroid(vertices: &[Vec<f64>]) -> Vec<f64> {
    let count = vertices.len() as f64;
    let mut centre = vec![0.0; vertices[0].len()];
    for vertex in vertices {
        for (sum, value) in centre.iter_mut().zip(vertex) {
            *sum += value;
        }
    }
    for value in &mut centre {
        *value /= count;
    }
    centre
}

/// `centroid + factor · (worst - centroid)`.
fn along(centroid: &[f64], worst: &[f64], factor: f64) -> Vec<f64> {
    centroid
        .iter()
        .zip(worst)
        .map(|(centre, vertex)| centre + factor * (vertex - centre))
        .collect()
}
