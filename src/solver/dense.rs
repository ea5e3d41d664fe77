//! Small dense linear systems for the damped normal equations.

use crate::error::{Result, TubeError};

/// Smallest pivot accepted during elimination.
const PIVOT_EPSILON: f64 = 1e-15;

/// Square system `A·x = b`, solved in place by Gaussian elimination with
/// partial pivoting. Solving consumes the assembled matrix; call
/// [`DenseSystem::clear`] before assembling the next one.
#[derive(Debug, Clone)]
pub struct DenseSystem {
    size: usize,
    /// Row-major matrix.
    matrix: Vec<f64>,
    /// Right-hand side, overwritten with the solution.
    rhs: Vec<f64>,
}

impl DenseSystem {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            matrix: vec![0.0; size * size],
            rhs: vec![0.0; size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn clear(&mut self) {
        self.matrix.fill(0.0);
        self.rhs.fill(0.0);
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.matrix[row * self.size + col] = value;
    }

    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        self.matrix[row * self.size + col] += value;
    }

    pub fn set_rhs(&mut self, row: usize, value: f64) {
        self.rhs[row] = value;
    }

    /// Eliminate and back-substitute. Returns the solution vector, or
    /// [`TubeError::SingularMatrix`] on a zero or NaN pivot.
    pub fn solve(&mut self) -> Result<&[f64]> {
        let n = self.size;
        let a = &mut self.matrix;
        let b = &mut self.rhs;

        for col in 0..n {
            let (pivot_row, pivot) = (col..n)
                .map(|row| (row, a[row * n + col].abs()))
                .fold((col, -1.0), |best, cand| if cand.1 > best.1 { cand } else { best });
            if pivot.is_nan() || pivot < PIVOT_EPSILON {
                return Err(TubeError::SingularMatrix);
            }
            if pivot_row != col {
                for k in 0..n {
                    a.swap(col * n + k, pivot_row * n + k);
                }
                b.swap(col, pivot_row);
            }

            let diag = a[col * n + col];
            for row in (col + 1)..n {
                let factor = a[row * n + col] / diag;
                if factor == 0.0 {
                    continue;
                }
                for k in col..n {
                    a[row * n + k] -= factor * a[col * n + k];
                }
                b[row] -= factor * b[col];
            }
        }

        for row in (0..n).rev() {
            let tail: f64 = ((row + 1)..n).map(|k| a[row * n + k] * b[k]).sum();
            b[row] = (b[row] - tail) / a[row * n + row];
        }
        Ok(&self.rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assemble(rows: &[&[f64]], rhs: &[f64]) -> DenseSystem {
        let mut sys = DenseSystem::new(rhs.len());
        for (i, row) in rows.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                sys.set(i, j, *v);
            }
            sys.set_rhs(i, rhs[i]);
        }
        sys
    }

    #[test]
    fn test_solve_3x3() {
        // 2x + y - z = 8, -3x - y + 2z = -11, -2x + y + 2z = -3
        let mut sys = assemble(
            &[&[2.0, 1.0, -1.0], &[-3.0, -1.0, 2.0], &[-2.0, 1.0, 2.0]],
            &[8.0, -11.0, -3.0],
        );
        let x = sys.solve().unwrap();
        assert_relative_eq!(x[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 3.0, epsilon = 1e-12);
        assert_relative_eq!(x[2], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_matrix() {
        let mut sys = assemble(&[&[1.0, 2.0], &[2.0, 4.0]], &[1.0, 2.0]);
        assert!(matches!(sys.solve(), Err(TubeError::SingularMatrix)));

        let mut nan = assemble(&[&[f64::NAN, 0.0], &[0.0, 1.0]], &[1.0, 1.0]);
        assert!(nan.solve().is_err());
    }

    #[test]
    fn test_pivoting_required() {
        let mut sys = assemble(&[&[0.0, 1.0], &[1.0, 0.0]], &[3.0, 5.0]);
        let x = sys.solve().unwrap();
        assert_relative_eq!(x[0], 5.0);
        assert_relative_eq!(x[1], 3.0);
    }

    #[test]
    fn test_clear_and_diagonal_add() {
        let mut sys = assemble(&[&[9.0, 9.0], &[9.0, 9.0]], &[9.0, 9.0]);
        sys.clear();
        sys.add(0, 0, 2.0);
        sys.add(1, 1, 4.0);
        sys.set_rhs(0, 6.0);
        sys.set_rhs(1, 8.0);
        let x = sys.solve().unwrap();
        assert_eq!(x, &[3.0, 2.0]);
        assert_eq!(sys.size(), 2);
    }
}
