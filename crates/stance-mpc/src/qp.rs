//! Horizon condensation and QP assembly.
//!
//! The predicted trajectory `X = [x_1, ..., x_H]` is eliminated in favor of
//! the stacked forces `U = [u_0, ..., u_{H-1}]`:
//!
//! ```text
//! X = A_qp x_0 + B_qp U
//! A_qp[k]    = A_d^{k+1}
//! B_qp[k][j] = A_d^{k-j} B_d      (j <= k, zero otherwise)
//! ```
//!
//! With diagonal tracking weight `L` and regularization `K` the cost
//! `(X - X_ref)ᵀ L (X - X_ref) + Uᵀ K U` becomes `0.5 Uᵀ H U + gᵀ U` with
//!
//! ```text
//! H = 2 (B_qpᵀ L B_qp + K)
//! g = 2 B_qpᵀ L (A_qp x_0 - X_ref)
//! ```
//!
//! Both [`Prediction`] and [`BalanceQp`] are sized once for a horizon and
//! refilled in place every cycle.

use nalgebra::{DMatrix, DVector};

use stance_core::N_LEGS;

use crate::types::{CONTROL_DIM, InputMatrix, STATE_DIM, StateMatrix, StateVector};

/// Rows of the per-leg constraint block.
const ROWS_PER_LEG: usize = 5;

// ---------------------------------------------------------------------------
// Prediction
// ---------------------------------------------------------------------------

/// Horizon-wide affine map from (x_0, U) to the predicted trajectory.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// `STATE_DIM * H` × `STATE_DIM`.
    pub a_qp: DMatrix<f64>,
    /// `STATE_DIM * H` × `CONTROL_DIM * H`, block lower triangular.
    pub b_qp: DMatrix<f64>,
}

impl Prediction {
    pub fn new(a_d: &StateMatrix, b_d: &InputMatrix, horizon: usize) -> Self {
        let mut prediction = Self::zeros(horizon);
        prediction.update(a_d, b_d);
        prediction
    }

    /// Buffers for `horizon` steps, all zero.
    pub fn zeros(horizon: usize) -> Self {
        Self {
            a_qp: DMatrix::zeros(STATE_DIM * horizon, STATE_DIM),
            b_qp: DMatrix::zeros(STATE_DIM * horizon, CONTROL_DIM * horizon),
        }
    }

    /// Refill both maps from a new discretization.
    ///
    /// Only the blocks on and below the diagonal of `b_qp` are written.
    pub fn update(&mut self, a_d: &StateMatrix, b_d: &InputMatrix) {
        let horizon = self.horizon();
        let mut a_pow = StateMatrix::identity();
        for i in 0..horizon {
            // Band i of B_qp holds A_d^i B_d.
            let band = a_pow * b_d;
            for k in i..horizon {
                self.b_qp
                    .fixed_view_mut::<STATE_DIM, CONTROL_DIM>(k * STATE_DIM, (k - i) * CONTROL_DIM)
                    .copy_from(&band);
            }
            a_pow = a_d * a_pow;
            self.a_qp
                .fixed_view_mut::<STATE_DIM, STATE_DIM>(i * STATE_DIM, 0)
                .copy_from(&a_pow);
        }
    }

    pub fn horizon(&self) -> usize {
        self.a_qp.nrows() / STATE_DIM
    }

    /// Stacked trajectory `[x_1, ..., x_H]` produced by `forces`.
    pub fn trajectory(&self, x0: &StateVector, forces: &DVector<f64>) -> DVector<f64> {
        let mut x = &self.b_qp * forces;
        x.gemv(1.0, &self.a_qp, x0, 1.0);
        x
    }
}

// ---------------------------------------------------------------------------
// BalanceQp
// ---------------------------------------------------------------------------

/// Condensed quadratic cost over the stacked forces.
#[derive(Debug, Clone)]
pub struct BalanceQp {
    /// Symmetric Hessian `H`, divided by `scale`.
    pub hessian: DMatrix<f64>,
    /// Linear term `g`, divided by `scale`.
    pub gradient: DVector<f64>,
    /// Largest diagonal of the unnormalized Hessian. The minimizer does not
    /// depend on it.
    pub scale: f64,
    /// `L B_qp`.
    weighted: DMatrix<f64>,
    /// `A_qp x_0 - X_ref`.
    error: DVector<f64>,
}

impl BalanceQp {
    /// Assemble the condensed cost.
    ///
    /// `x_ref` is the one-step reference, repeated over the horizon.
    pub fn assemble(
        prediction: &Prediction,
        x0: &StateVector,
        x_ref: &StateVector,
        state_weights: &[f64; STATE_DIM],
        regularization: &[f64; 3],
    ) -> Self {
        let mut qp = Self::zeros(prediction.horizon());
        qp.fill(prediction, x0, x_ref, state_weights, regularization);
        qp
    }

    /// Buffers for `horizon` steps, all zero.
    pub fn zeros(horizon: usize) -> Self {
        let n_x = STATE_DIM * horizon;
        let n_u = CONTROL_DIM * horizon;
        Self {
            hessian: DMatrix::zeros(n_u, n_u),
            gradient: DVector::zeros(n_u),
            scale: 1.0,
            weighted: DMatrix::zeros(n_x, n_u),
            error: DVector::zeros(n_x),
        }
    }

    /// Overwrite the cost in place. `prediction` must have the horizon this
    /// QP was sized for.
    pub fn fill(
        &mut self,
        prediction: &Prediction,
        x0: &StateVector,
        x_ref: &StateVector,
        state_weights: &[f64; STATE_DIM],
        regularization: &[f64; 3],
    ) {
        let horizon = prediction.horizon();
        debug_assert_eq!(self.gradient.len(), CONTROL_DIM * horizon);

        // L B_qp: row r scaled by the weight of its state component.
        self.weighted.copy_from(&prediction.b_qp);
        for r in 0..self.weighted.nrows() {
            self.weighted
                .row_mut(r)
                .scale_mut(state_weights[r % STATE_DIM]);
        }

        // gemm_tr works through gemv and needs no scratch memory.
        self.hessian
            .gemm_tr(2.0, &prediction.b_qp, &self.weighted, 0.0);
        for i in 0..self.hessian.nrows() {
            self.hessian[(i, i)] += 2.0 * regularization[i % 3];
        }

        self.error.gemv(1.0, &prediction.a_qp, x0, 0.0);
        for k in 0..horizon {
            let mut block = self.error.fixed_rows_mut::<STATE_DIM>(k * STATE_DIM);
            block -= x_ref;
        }
        self.gradient
            .gemv_tr(2.0, &self.weighted, &self.error, 0.0);

        let scale = (0..self.hessian.nrows())
            .map(|i| self.hessian[(i, i)])
            .fold(f64::NEG_INFINITY, f64::max);
        self.scale = scale;
        if scale.is_finite() && scale > 0.0 {
            self.hessian /= scale;
            self.gradient /= scale;
        }
    }

    /// `0.5 Uᵀ H U + gᵀ U` in normalized units.
    pub fn objective(&self, forces: &DVector<f64>) -> f64 {
        0.5 * forces.dot(&(&self.hessian * forces)) + self.gradient.dot(forces)
    }
}

// ---------------------------------------------------------------------------
// ConstraintSet
// ---------------------------------------------------------------------------

/// Stacked linear constraints `lower <= C U <= upper`, one-sided rows use
/// infinite bounds.
#[derive(Debug, Clone)]
pub struct ConstraintSet {
    pub matrix: DMatrix<f64>,
    pub lower: DVector<f64>,
    pub upper: DVector<f64>,
}

impl ConstraintSet {
    /// Friction pyramid and normal-force bounds for every leg of every step.
    ///
    /// Per leg the rows are `fx + μ fz >= 0`, `fx − μ fz <= 0`, the same
    /// pair for `fy`, and `f_min <= fz <= f_max`.
    pub fn friction_pyramid(mu: f64, f_min: f64, f_max: f64, horizon: usize) -> Self {
        let n_legs = N_LEGS * horizon;
        let n_rows = ROWS_PER_LEG * n_legs;
        let mut matrix = DMatrix::zeros(n_rows, CONTROL_DIM * horizon);
        let mut lower = DVector::zeros(n_rows);
        let mut upper = DVector::zeros(n_rows);

        let inf = f64::INFINITY;
        for leg in 0..n_legs {
            let row = ROWS_PER_LEG * leg;
            let (fx, fy, fz) = (3 * leg, 3 * leg + 1, 3 * leg + 2);

            let rows: [([(usize, f64); 2], f64, f64); ROWS_PER_LEG] = [
                ([(fx, 1.0), (fz, mu)], 0.0, inf),
                ([(fx, 1.0), (fz, -mu)], -inf, 0.0),
                ([(fy, 1.0), (fz, mu)], 0.0, inf),
                ([(fy, 1.0), (fz, -mu)], -inf, 0.0),
                ([(fz, 1.0), (fz, 0.0)], f_min, f_max),
            ];
            for (i, (coeffs, lo, hi)) in rows.into_iter().enumerate() {
                for (col, value) in coeffs {
                    matrix[(row + i, col)] += value;
                }
                lower[row + i] = lo;
                upper[row + i] = hi;
            }
        }

        Self {
            matrix,
            lower,
            upper,
        }
    }

    pub fn rows(&self) -> usize {
        self.matrix.nrows()
    }

    /// Rewrite as `A U <= b`, dropping infinite bounds.
    pub fn to_upper_bounded(&self) -> (DMatrix<f64>, DVector<f64>) {
        let ncols = self.matrix.ncols();
        let mut rows = Vec::with_capacity(2 * self.rows());
        let mut bounds = Vec::with_capacity(2 * self.rows());

        for r in 0..self.rows() {
            let row = self.matrix.row(r);
            if self.upper[r].is_finite() {
                rows.push(row.clone_owned());
                bounds.push(self.upper[r]);
            }
            if self.lower[r].is_finite() {
                rows.push(-row);
                bounds.push(-self.lower[r]);
            }
        }

        let a = if rows.is_empty() {
            DMatrix::zeros(0, ncols)
        } else {
            DMatrix::from_rows(&rows)
        };
        (a, DVector::from_vec(bounds))
    }

    /// Largest bound violation of `forces` (zero when feasible).
    pub fn violation(&self, forces: &DVector<f64>) -> f64 {
        let values = &self.matrix * forces;
        values
            .iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
            .map(|(v, (lo, hi))| (lo - v).max(v - hi).max(0.0))
            .fold(0.0, f64::max)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
