pub mod convolution;
pub mod faddeeva;
pub mod linalg;

pub use convolution::{ConvolutionError, convolve_same, trim_kernel_tails};
pub use faddeeva::{faddeeva, voigt_function};
pub use linalg::{DenseMatrix, LuDecomposition, LuError, lu_factorize, lu_invert, lu_solve};

/// Neumaier-compensated running sum.
#[derive(Debug, Clone, Copy, Default)]
struct CompensatedSum {
    sum: f64,
    compensation: f64,
}

impl CompensatedSum {
    fn add(&mut self, value: f64) {
        let total = self.sum + value;
        self.compensation += if self.sum.abs() >= value.abs() {
            (self.sum - total) + value
        } else {
            (value - total) + self.sum
        };
        self.sum = total;
    }

    fn value(self) -> f64 {
        self.sum + self.compensation
    }
}

pub fn stable_sum(values: &[f64]) -> f64 {
    let mut acc = CompensatedSum::default();
    values.iter().for_each(|value| acc.add(*value));
    acc.value()
}

/// Compensated sum of squares, skipping non-finite entries.
pub fn finite_sum_of_squares(values: &[f64]) -> f64 {
    let mut acc = CompensatedSum::default();
    values
        .iter()
        .filter(|value| value.is_finite())
        .for_each(|value| acc.add(value * value));
    acc.value()
}

pub fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| stable_sum(values) / values.len() as f64)
}

/// Indices that sort `values` ascending (NaN last); equal values keep their
/// input order, so merged line lists sort the same way every time.
pub fn deterministic_argsort(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    order
}

/// `count` evenly spaced points from `start` to exactly `end`.
pub fn linear_grid(start: f64, end: f64, count: usize) -> Option<Vec<f64>> {
    if count < 2 {
        return None;
    }
    let last = count - 1;
    let spacing = (end - start) / last as f64;
    Some(
        (0..count)
            .map(|index| {
                if index == last {
                    end
                } else {
                    start + spacing * index as f64
                }
            })
            .collect(),
    )
}

pub fn is_strictly_increasing(values: &[f64]) -> bool {
    values.windows(2).all(|pair| pair[0] < pair[1])
}

#[cfg(test)]
mod tests {
    use super::{
        deterministic_argsort, finite_sum_of_squares, is_strictly_increasing, linear_grid, mean,
        stable_sum,
    };

    #[test]
    fn compensated_sum_keeps_weak_lines_next_to_strong_ones() {
        assert_eq!(stable_sum(&[1.0e16, 1.0, -1.0e16]), 1.0);
        assert_eq!(stable_sum(&[]), 0.0);
    }

    #[test]
    fn sum_of_squares_skips_sentinels_that_overflow() {
        assert_eq!(finite_sum_of_squares(&[3.0, f64::NAN, 4.0, f64::INFINITY]), 25.0);
    }

    #[test]
    fn mean_of_axis() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[300.0, 301.0, 305.0]), Some(302.0));
    }

    #[test]
    fn argsort_of_merged_wavelengths_is_stable() {
        let wavelengths = [306.0, 305.0, f64::NAN, 305.0, 300.5];
        assert_eq!(deterministic_argsort(&wavelengths), vec![4, 1, 3, 0, 2]);
    }

    #[test]
    fn grid_ends_exactly_on_upper_bound() {
        assert!(linear_grid(300.0, 301.0, 1).is_none());
        let grid = linear_grid(300.0, 301.0, 5).expect("grid");
        assert_eq!(grid, vec![300.0, 300.25, 300.5, 300.75, 301.0]);
    }

    #[test]
    fn ingestion_axis_must_strictly_increase() {
        assert!(is_strictly_increasing(&[300.0, 300.1, 300.2]));
        assert!(!is_strictly_increasing(&[300.0, 300.0, 300.2]));
        assert!(!is_strictly_increasing(&[300.0, f64::NAN, 300.2]));
        assert!(is_strictly_increasing(&[]));
    }
}
