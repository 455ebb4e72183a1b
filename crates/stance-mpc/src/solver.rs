//! Receding-horizon balance controller backed by Clarabel.
//!
//! Each [`BalanceMpc::solve`] replans from scratch at the latest state:
//! the model is relinearized, the horizon condensed, the QP solved and only
//! the first step of the optimal force sequence is returned.
//!
//! All buffers and the Clarabel solver are created in [`BalanceMpc::new`].
//! A solve refills them in place and hands the new `P` and `q` to the
//! solver through its data-update interface.

use std::time::Instant;

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus, SupportedConeT::NonnegativeConeT,
};
use nalgebra::{DMatrix, Matrix3, Vector3};

use stance_core::{BodyState, ConfigError, LegForces, N_LEGS};

use crate::centroidal::{build_continuous_dynamics, discretize};
use crate::qp::{BalanceQp, ConstraintSet, Prediction};
use crate::types::{CONTROL_DIM, MpcConfig, MpcError, MpcSolution, RigidBody, STATE_DIM, StateVector};

/// Body state plus body-frame foot positions (relative to the body origin).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Pose {
    body: BodyState,
    feet: [Vector3<f64>; N_LEGS],
}

/// Centroidal convex MPC.
pub struct BalanceMpc {
    config: MpcConfig,
    dt: f64,
    mass: f64,
    com_offset: Vector3<f64>,
    inertia: Matrix3<f64>,
    state_weights: [f64; STATE_DIM],
    constraints: ConstraintSet,
    reference: Pose,
    state: Pose,
    contacts: [bool; N_LEGS],
    prediction: Prediction,
    qp: BalanceQp,
    /// Upper triangle of the Hessian, column-major, every entry kept.
    p_values: Vec<f64>,
    q_values: Vec<f64>,
    solver: DefaultSolver<f64>,
}

impl BalanceMpc {
    /// Create a controller running at period `dt`.
    ///
    /// The constraint set depends only on the configuration and is built
    /// once here, together with the solver and every per-cycle buffer.
    pub fn new(config: MpcConfig, body: &RigidBody, dt: f64) -> Result<Self, ConfigError> {
        config.validate()?;
        body.validate()?;
        if dt.is_nan() || dt <= 0.0 {
            return Err(ConfigError::invalid(
                "control.period",
                format!("must be positive, got {dt}"),
            ));
        }

        let horizon = config.horizon;
        let constraints = ConstraintSet::friction_pyramid(
            config.friction_coeff,
            config.f_min,
            config.f_max,
            horizon,
        );
        let (a, b) = constraints.to_upper_bounded();
        let a_ineq = dmatrix_to_csc(&a);
        let b_ineq: Vec<f64> = b.iter().copied().collect();

        // The Hessian is normalized to a unit diagonal peak each cycle; the
        // solver starts from the identity with the full dense pattern.
        let p = dense_upper_tri(&DMatrix::identity(CONTROL_DIM * horizon, CONTROL_DIM * horizon));
        let q_values = vec![0.0; CONTROL_DIM * horizon];
        let cones = [NonnegativeConeT(b_ineq.len())];

        let settings = DefaultSettingsBuilder::default()
            .max_iter(config.max_solver_iters)
            .verbose(false)
            .tol_gap_abs(1e-7)
            .tol_gap_rel(1e-7)
            .tol_feas(1e-8)
            .presolve_enable(false)
            .input_sparse_dropzeros(false)
            .equilibrate_enable(false)
            .build()
            .map_err(|e| ConfigError::invalid("mpc", format!("solver settings: {e:?}")))?;

        let solver = DefaultSolver::new(&p, &q_values, &a_ineq, &b_ineq, &cones, settings)
            .map_err(|e| ConfigError::invalid("mpc", format!("solver setup: {e:?}")))?;

        Ok(Self {
            state_weights: config.tracking.diagonal(),
            dt,
            mass: body.mass,
            com_offset: body.com_offset(),
            inertia: body.inertia(),
            constraints,
            reference: Pose::default(),
            state: Pose::default(),
            contacts: [true; N_LEGS],
            prediction: Prediction::zeros(horizon),
            qp: BalanceQp::zeros(horizon),
            p_values: p.nzval,
            q_values,
            solver,
            config,
        })
    }

    pub const fn config(&self) -> &MpcConfig {
        &self.config
    }

    pub const fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// Desired body state and foot positions.
    ///
    /// Only the body state enters the QP. The feet are stored so the caller
    /// can read back the stance the reference was latched at.
    pub fn set_reference(&mut self, body: &BodyState, feet: &[Vector3<f64>; N_LEGS]) {
        self.reference = Pose { body: *body, feet: *feet };
    }

    /// Measured body state and foot positions for the next solve.
    pub fn set_state(&mut self, body: &BodyState, feet: &[Vector3<f64>; N_LEGS]) {
        self.state = Pose { body: *body, feet: *feet };
    }

    /// Per-leg contact flags. Recorded for the caller; every leg is
    /// constrained as a stance leg regardless.
    pub fn set_contacts(&mut self, contacts: [bool; N_LEGS]) {
        self.contacts = contacts;
    }

    pub const fn contacts(&self) -> [bool; N_LEGS] {
        self.contacts
    }

    pub const fn reference(&self) -> &BodyState {
        &self.reference.body
    }

    /// Foot positions passed to [`set_reference`](Self::set_reference).
    /// Not used by the optimization.
    pub const fn reference_feet(&self) -> &[Vector3<f64>; N_LEGS] {
        &self.reference.feet
    }

    /// Center of mass of `pose` in the world frame.
    fn com(&self, body: &BodyState) -> Vector3<f64> {
        body.position + body.orientation * self.com_offset
    }

    /// Current centroidal state `x_0`.
    pub fn state_vector(&self) -> StateVector {
        let body = &self.state.body;
        let error = body.orientation * self.reference.body.orientation.inverse();

        let mut x = StateVector::zeros();
        x.fixed_rows_mut::<3>(0).copy_from(&error.scaled_axis());
        x.fixed_rows_mut::<3>(3).copy_from(&self.com(body));
        x.fixed_rows_mut::<3>(6).copy_from(&body.angular_velocity);
        x.fixed_rows_mut::<3>(9).copy_from(&body.linear_velocity);
        x[12] = self.config.gravity;
        x
    }

    /// One-step reference state. The orientation error of the reference is zero.
    pub fn reference_vector(&self) -> StateVector {
        let body = &self.reference.body;
        let mut x = StateVector::zeros();
        x.fixed_rows_mut::<3>(3).copy_from(&self.com(body));
        x.fixed_rows_mut::<3>(6).copy_from(&body.angular_velocity);
        x.fixed_rows_mut::<3>(9).copy_from(&body.linear_velocity);
        x[12] = self.config.gravity;
        x
    }

    /// Condensed QP of the last solve (or of the last [`assemble`](Self::assemble)).
    pub const fn qp(&self) -> &BalanceQp {
        &self.qp
    }

    /// Linearize at the current state and refill the condensed QP.
    pub fn assemble(&mut self) -> Result<&BalanceQp, MpcError> {
        let rotation = self.state.body.rotation();
        let feet_from_com = self
            .state
            .feet
            .map(|foot| rotation * (foot - self.com_offset));

        let (a_c, b_c) =
            build_continuous_dynamics(rotation.matrix(), &feet_from_com, &self.inertia, self.mass)?;
        let (a_d, b_d) = discretize(self.config.discretization, &a_c, &b_c, self.dt);

        self.prediction.update(&a_d, &b_d);
        let x0 = self.state_vector();
        let x_ref = self.reference_vector();
        self.qp.fill(
            &self.prediction,
            &x0,
            &x_ref,
            &self.state_weights,
            &self.config.regularization,
        );
        Ok(&self.qp)
    }

    /// Solve for the current-step ground-reaction forces.
    ///
    /// Forces are world-frame forces exerted by the ground on the body.
    /// Once warmed up, a successful solve does not allocate on our side.
    pub fn solve(&mut self) -> Result<MpcSolution, MpcError> {
        let start = Instant::now();

        let x0 = self.state_vector();
        if x0.iter().chain(self.state.feet.iter().flatten()).any(|v| !v.is_finite()) {
            return Err(MpcError::SolveFailed {
                status: "non-finite state".into(),
            });
        }

        self.assemble()?;
        let n = self.qp.hessian.ncols();
        let mut k = 0;
        for j in 0..n {
            for i in 0..=j {
                self.p_values[k] = self.qp.hessian[(i, j)];
                k += 1;
            }
        }
        self.q_values.copy_from_slice(self.qp.gradient.as_slice());

        self.solver
            .update_P(&self.p_values)
            .map_err(|e| MpcError::Setup(format!("{e:?}")))?;
        self.solver
            .update_q(&self.q_values)
            .map_err(|e| MpcError::Setup(format!("{e:?}")))?;
        self.solver.solve();
        let sol = &self.solver.solution;

        if !matches!(sol.status, SolverStatus::Solved | SolverStatus::AlmostSolved) {
            return Err(MpcError::SolveFailed {
                status: format!("{:?}", sol.status),
            });
        }
        if sol.x.iter().any(|v| !v.is_finite()) {
            return Err(MpcError::SolveFailed {
                status: "non-finite solution".into(),
            });
        }

        let mut forces = LegForces::zeros();
        for (leg, force) in forces.0.iter_mut().enumerate() {
            *force = Vector3::new(sol.x[3 * leg], sol.x[3 * leg + 1], sol.x[3 * leg + 2]);
        }
        debug_assert_eq!(sol.x.len(), CONTROL_DIM * self.config.horizon);

        Ok(MpcSolution {
            forces,
            iterations: sol.iterations,
            solve_time_us: u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX),
        })
    }

    /// All `CONTROL_DIM * horizon` forces of the last solve, step-major.
    pub fn force_trajectory(&self) -> &[f64] {
        &self.solver.solution.x
    }
}

impl std::fmt::Debug for BalanceMpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceMpc")
            .field("config", &self.config)
            .field("dt", &self.dt)
            .field("mass", &self.mass)
            .field("contacts", &self.contacts)
            .finish_non_exhaustive()
    }
}

/// Dense to compressed-sparse-column, dropping exact zeros.
fn dmatrix_to_csc(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = Vec::with_capacity(ncols + 1);
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    colptr.push(0);
    for j in 0..ncols {
        for i in 0..nrows {
            let v = m[(i, j)];
            if v != 0.0 {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr.push(rowval.len());
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

/// Upper triangle of a square matrix with every entry stored, zeros
/// included, so later value updates keep the same pattern.
fn dense_upper_tri(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let n = m.ncols();
    let mut colptr = Vec::with_capacity(n + 1);
    let mut rowval = Vec::with_capacity(n * (n + 1) / 2);
    let mut nzval = Vec::with_capacity(n * (n + 1) / 2);

    colptr.push(0);
    for j in 0..n {
        for i in 0..=j {
            rowval.push(i);
            nzval.push(m[(i, j)]);
        }
        colptr.push(rowval.len());
    }

    CscMatrix::new(n, n, colptr, rowval, nzval)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
