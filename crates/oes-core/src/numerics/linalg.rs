//! Dense real LU with row pivoting, sized for the `n × n` normal equations of
//! a least-squares step (`n` = number of varying parameters).

use faer::Mat;

pub type DenseMatrix = Mat<f64>;

/// Pivots at or below this magnitude are treated as exact zeros.
const ZERO_PIVOT: f64 = 1.0e-300;
/// Pivots smaller than this fraction of the largest row sum make the
/// inverse meaningless.
const RELATIVE_PIVOT_FLOOR: f64 = 1.0e-14;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LuError {
    #[error("expected a square matrix, got {rows}x{cols}")]
    NonSquareMatrix { rows: usize, cols: usize },
    #[error("cannot factorize an empty matrix")]
    EmptyMatrix,
    #[error("matrix is singular at pivot {pivot_index}")]
    SingularMatrix { pivot_index: usize },
    #[error("matrix is ill-conditioned at pivot {pivot_index}")]
    IllConditionedMatrix { pivot_index: usize },
    #[error("right-hand side has {actual} entries, matrix has {expected} rows")]
    RhsLengthMismatch { expected: usize, actual: usize },
}

/// `P·A = L·U` with unit-diagonal `L` stored below the diagonal of `factors`.
#[derive(Debug, Clone, PartialEq)]
pub struct LuDecomposition {
    factors: DenseMatrix,
    /// `row_order[i]` is the row of `A` that ended up in row `i`.
    row_order: Vec<usize>,
    scale: f64,
}

impl LuDecomposition {
    pub fn dimension(&self) -> usize {
        self.factors.nrows()
    }

    pub fn pivots(&self) -> &[usize] {
        &self.row_order
    }

    pub fn solve(&self, rhs: &[f64]) -> Result<Vec<f64>, LuError> {
        let n = self.dimension();
        if rhs.len() != n {
            return Err(LuError::RhsLengthMismatch {
                expected: n,
                actual: rhs.len(),
            });
        }

        let mut x: Vec<f64> = self.row_order.iter().map(|&row| rhs[row]).collect();
        for i in 1..n {
            let dot: f64 = (0..i).map(|k| self.factors[(i, k)] * x[k]).sum();
            x[i] -= dot;
        }
        for i in (0..n).rev() {
            let dot: f64 = (i + 1..n).map(|k| self.factors[(i, k)] * x[k]).sum();
            let pivot = self.factors[(i, i)];
            if pivot.abs() <= ZERO_PIVOT {
                return Err(LuError::SingularMatrix { pivot_index: i });
            }
            x[i] = (x[i] - dot) / pivot;
        }
        Ok(x)
    }

    /// Full inverse, refused when any pivot is negligible next to the input
    /// scale.
    pub fn invert(&self) -> Result<DenseMatrix, LuError> {
        let n = self.dimension();
        if let Some(pivot_index) =
            (0..n).find(|&i| self.factors[(i, i)].abs() <= self.scale * RELATIVE_PIVOT_FLOOR)
        {
            return Err(LuError::IllConditionedMatrix { pivot_index });
        }

        let columns = (0..n)
            .map(|col| {
                let unit: Vec<f64> = (0..n).map(|row| if row == col { 1.0 } else { 0.0 }).collect();
                self.solve(&unit)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DenseMatrix::from_fn(n, n, |row, col| columns[col][row]))
    }
}

pub fn lu_factorize(matrix: &DenseMatrix) -> Result<LuDecomposition, LuError> {
    let (rows, cols) = (matrix.nrows(), matrix.ncols());
    if rows == 0 || cols == 0 {
        return Err(LuError::EmptyMatrix);
    }
    if rows != cols {
        return Err(LuError::NonSquareMatrix { rows, cols });
    }
    let n = rows;

    let scale = (0..n)
        .map(|row| (0..n).map(|col| matrix[(row, col)].abs()).sum::<f64>())
        .fold(0.0, f64::max);
    let mut factors = matrix.clone();
    let mut row_order: Vec<usize> = (0..n).collect();

    for k in 0..n {
        let (pivot_row, magnitude) = (k..n)
            .map(|row| (row, factors[(row, k)].abs()))
            .fold((k, -1.0), |best, candidate| {
                if candidate.1 > best.1 { candidate } else { best }
            });
        if !magnitude.is_finite() || magnitude <= ZERO_PIVOT {
            return Err(LuError::SingularMatrix { pivot_index: k });
        }
        if pivot_row != k {
            for col in 0..n {
                let held = factors[(k, col)];
                factors[(k, col)] = factors[(pivot_row, col)];
                factors[(pivot_row, col)] = held;
            }
            row_order.swap(k, pivot_row);
        }

        let pivot = factors[(k, k)];
        for row in k + 1..n {
            let multiplier = factors[(row, k)] / pivot;
            factors[(row, k)] = multiplier;
            for col in k + 1..n {
                factors[(row, col)] -= multiplier * factors[(k, col)];
            }
        }
    }

    Ok(LuDecomposition {
        factors,
        row_order,
        scale,
    })
}

pub fn lu_solve(matrix: &DenseMatrix, rhs: &[f64]) -> Result<Vec<f64>, LuError> {
    lu_factorize(matrix)?.solve(rhs)
}

pub fn lu_invert(matrix: &DenseMatrix) -> Result<DenseMatrix, LuError> {
    lu_factorize(matrix)?.invert()
}
