//! # Damped least-squares inversion solver
//!
//! Minimizes the goal function
//!
//! ```text
//! Φ(p) = ‖d − J·p‖²
//!      + damping·‖p‖²                      (Tikhonov order 0)
//!      + smoothness·‖D·p‖²                 (Tikhonov order 1)
//!      + curvature·‖DᵀD·p‖²                (Tikhonov order 2)
//!      + sharpness·pᵀDᵀW_tv D·p            (total variation)
//!      + compactness·pᵀW_c·p               (compactness)
//! ```
//!
//! with a Levenberg–Marquardt iteration: at each outer iteration the
//! normal-equations system `(H + λI)·Δp = −g` is solved for a parameter
//! increment, where `H` and `g` are the (half) Hessian and gradient of `Φ` with
//! the estimate-dependent weights frozen at the current estimate. An improving
//! trial estimate is accepted and `λ` is divided by `lm_step`; a failed trial
//! multiplies `λ` by `lm_step` and retries, up to `max_steps` attempts per
//! iteration.
//!
//! The regularization terms are additive; no normalization across terms is
//! performed. The data misfit is unweighted (identity data covariance).
//!
//! ## Termination
//! -----------------
//! * [`Termination::Converged`] – relative goal improvement below
//!   [`CONVERGENCE_TOL`], or the goal hit the absolute zero floor.
//! * [`Termination::MaxIterations`] – the outer iteration budget ran out.
//! * [`Termination::StepExhausted`] – no improving step within `max_steps`
//!   retries; the best estimate found so far is returned. This is a terminal
//!   state, not an error: callers should surface it alongside the estimate to
//!   distinguish a successful fit from an exhausted search.

use nalgebra::{Cholesky, DMatrix, DVector};
use tracing::{debug, info};

use crate::constants::{GoalTrace, CONVERGENCE_TOL, DEFAULT_INITIAL_DENSITY, ZERO_GOAL_FLOOR};
use crate::gravinv_errors::GravinvError;
use crate::regularization::{compactness_weights, total_variation_weights};

/// Regularization weights, stabilization constants, and iteration controls for
/// one [`solve`] run.
///
/// All regularization weights default to zero (pure data misfit); the
/// stabilization constants and iteration controls default to the conventional
/// values of the method.
#[derive(Debug, Clone)]
pub struct SolveParams {
    /// Tikhonov order-0 weight, ≥ 0.
    pub damping: f64,
    /// Tikhonov order-1 weight, ≥ 0.
    pub smoothness: f64,
    /// Tikhonov order-2 weight, ≥ 0.
    pub curvature: f64,
    /// Total-variation weight, ≥ 0.
    pub sharpness: f64,
    /// Total-variation smoothing constant, > 0. Smaller is sharper but less stable.
    pub beta: f64,
    /// Compactness weight, ≥ 0.
    pub compactness: f64,
    /// Compactness stabilization constant, > 0. Smaller is more compact.
    pub epsilon: f64,
    /// Initial estimate; a uniform small positive vector when `None` so the
    /// estimate-dependent weights are well defined at step 0.
    pub initial: Option<DVector<f64>>,
    /// Outer iteration budget.
    pub max_iterations: usize,
    /// Initial Marquardt parameter.
    pub lm_start: f64,
    /// Factor applied to the Marquardt parameter on accepted (÷) and rejected (×) steps.
    pub lm_step: f64,
    /// Step-retry budget per outer iteration.
    pub max_steps: usize,
}

impl Default for SolveParams {
    fn default() -> Self {
        SolveParams {
            damping: 0.0,
            smoothness: 0.0,
            curvature: 0.0,
            sharpness: 0.0,
            beta: 1e-5,
            compactness: 0.0,
            epsilon: 1e-5,
            initial: None,
            max_iterations: 100,
            lm_start: 1.0,
            lm_step: 10.0,
            max_steps: 20,
        }
    }
}

impl SolveParams {
    /// Construct parameters with the default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fluent [`SolveParamsBuilder`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use gravinv::solver::SolveParams;
    ///
    /// let params = SolveParams::builder()
    ///     .damping(1e-10)
    ///     .smoothness(1e-8)
    ///     .max_iterations(50)
    ///     .build();
    /// ```
    pub fn builder() -> SolveParamsBuilder {
        SolveParamsBuilder::new()
    }

    /// Check the preconditions on weights and constants.
    ///
    /// Return
    /// ----------
    /// * `Ok(())`, or [`GravinvError::NegativeWeight`] /
    ///   [`GravinvError::NonPositiveConstant`] for the first offending value.
    pub fn validate(&self) -> Result<(), GravinvError> {
        for (name, value) in [
            ("damping", self.damping),
            ("smoothness", self.smoothness),
            ("curvature", self.curvature),
            ("sharpness", self.sharpness),
            ("compactness", self.compactness),
        ] {
            if value < 0.0 {
                return Err(GravinvError::NegativeWeight { name, value });
            }
        }
        for (name, value) in [("beta", self.beta), ("epsilon", self.epsilon)] {
            if value <= 0.0 {
                return Err(GravinvError::NonPositiveConstant { name, value });
            }
        }
        Ok(())
    }
}

/// Fluent builder for [`SolveParams`].
#[derive(Debug, Clone, Default)]
pub struct SolveParamsBuilder {
    params: SolveParams,
}

impl SolveParamsBuilder {
    pub fn new() -> Self {
        SolveParamsBuilder {
            params: SolveParams::default(),
        }
    }

    pub fn damping(mut self, v: f64) -> Self {
        self.params.damping = v;
        self
    }
    pub fn smoothness(mut self, v: f64) -> Self {
        self.params.smoothness = v;
        self
    }
    pub fn curvature(mut self, v: f64) -> Self {
        self.params.curvature = v;
        self
    }
    pub fn sharpness(mut self, v: f64) -> Self {
        self.params.sharpness = v;
        self
    }
    pub fn beta(mut self, v: f64) -> Self {
        self.params.beta = v;
        self
    }
    pub fn compactness(mut self, v: f64) -> Self {
        self.params.compactness = v;
        self
    }
    pub fn epsilon(mut self, v: f64) -> Self {
        self.params.epsilon = v;
        self
    }
    pub fn initial(mut self, v: DVector<f64>) -> Self {
        self.params.initial = Some(v);
        self
    }
    pub fn max_iterations(mut self, v: usize) -> Self {
        self.params.max_iterations = v;
        self
    }
    pub fn lm_start(mut self, v: f64) -> Self {
        self.params.lm_start = v;
        self
    }
    pub fn lm_step(mut self, v: f64) -> Self {
        self.params.lm_step = v;
        self
    }
    pub fn max_steps(mut self, v: usize) -> Self {
        self.params.max_steps = v;
        self
    }

    pub fn build(self) -> SolveParams {
        self.params
    }
}

/// Why the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Relative goal improvement fell below the tolerance (or the goal is an
    /// exact fit).
    Converged,
    /// The outer iteration budget was exhausted.
    MaxIterations,
    /// No improving step could be found within the retry budget.
    StepExhausted,
}

/// Result of one inversion run.
#[derive(Debug, Clone)]
pub struct Solution {
    /// Final parameter estimate (density per mesh cell, flattened order).
    pub estimate: DVector<f64>,
    /// Goal-function value at the start and after each accepted iteration.
    /// Non-increasing by construction of the accept/reject logic.
    pub goals: GoalTrace,
    pub termination: Termination,
}

/// Evaluate the goal function for an estimate.
///
/// Arguments
/// -----------------
/// * `data`: observed data vector.
/// * `jacobian`: the sensitivity matrix.
/// * `first_deriv`: the first-derivative operator for the mesh shape.
/// * `estimate`: the parameter vector to evaluate.
/// * `params`: regularization weights and constants.
///
/// Return
/// ----------
/// * Data misfit plus the weighted regularization penalties. With all weights
///   zero this is the pure data misfit `‖d − J·p‖²`.
pub fn goal_function(
    data: &DVector<f64>,
    jacobian: &DMatrix<f64>,
    first_deriv: &DMatrix<f64>,
    estimate: &DVector<f64>,
    params: &SolveParams,
) -> f64 {
    let dtd = if params.curvature > 0.0 {
        Some(first_deriv.tr_mul(first_deriv))
    } else {
        None
    };
    goal_with_cached(data, jacobian, first_deriv, dtd.as_ref(), estimate, params)
}

/// Goal evaluation with an optionally precomputed `DᵀD` (avoids rebuilding it
/// for every trial step inside the solve loop).
fn goal_with_cached(
    data: &DVector<f64>,
    jacobian: &DMatrix<f64>,
    first_deriv: &DMatrix<f64>,
    dtd: Option<&DMatrix<f64>>,
    estimate: &DVector<f64>,
    params: &SolveParams,
) -> f64 {
    let residual = data - jacobian * estimate;
    let mut goal = residual.dot(&residual);

    if params.damping > 0.0 {
        goal += params.damping * estimate.dot(estimate);
    }
    if params.smoothness > 0.0 || params.sharpness > 0.0 {
        let differences = first_deriv * estimate;
        if params.smoothness > 0.0 {
            goal += params.smoothness * differences.dot(&differences);
        }
        if params.sharpness > 0.0 {
            let weights = total_variation_weights(first_deriv, estimate, params.beta);
            goal += params.sharpness * differences.zip_fold(&weights, 0.0, |acc, d, w| acc + w * d * d);
        }
    }
    if params.curvature > 0.0 {
        let second = match dtd {
            Some(dtd) => dtd * estimate,
            None => first_deriv.tr_mul(&(first_deriv * estimate)),
        };
        goal += params.curvature * second.dot(&second);
    }
    if params.compactness > 0.0 {
        let weights = compactness_weights(estimate, params.epsilon);
        goal += params.compactness * estimate.zip_fold(&weights, 0.0, |acc, p, w| acc + w * p * p);
    }

    goal
}

/// Run the damped least-squares iteration.
///
/// Arguments
/// -----------------
/// * `data`: observed data vector, length = `jacobian.nrows()`.
/// * `jacobian`: the cached sensitivity matrix.
/// * `first_deriv`: the first-derivative operator for the mesh shape,
///   `jacobian.ncols()` columns.
/// * `params`: weights, constants, and iteration controls.
///
/// Return
/// ----------
/// * A [`Solution`] with the final estimate, the goal trace, and the
///   termination state, or a validation error. [`Termination::StepExhausted`]
///   is reported in the solution, not as an error.
///
/// See also
/// ------------
/// * [`InversionSession::solve`](crate::session::InversionSession::solve) – Session-level entry point.
pub fn solve(
    data: &DVector<f64>,
    jacobian: &DMatrix<f64>,
    first_deriv: &DMatrix<f64>,
    params: &SolveParams,
) -> Result<Solution, GravinvError> {
    params.validate()?;

    let ncells = jacobian.ncols();
    if data.len() != jacobian.nrows() {
        return Err(GravinvError::DimensionMismatch {
            expected: jacobian.nrows(),
            found: data.len(),
        });
    }
    if first_deriv.ncols() != ncells {
        return Err(GravinvError::DimensionMismatch {
            expected: ncells,
            found: first_deriv.ncols(),
        });
    }

    let mut estimate = match &params.initial {
        Some(initial) => {
            if initial.len() != ncells {
                return Err(GravinvError::DimensionMismatch {
                    expected: ncells,
                    found: initial.len(),
                });
            }
            initial.clone()
        }
        None => DVector::from_element(ncells, DEFAULT_INITIAL_DENSITY),
    };

    info!(
        damping = params.damping,
        smoothness = params.smoothness,
        curvature = params.curvature,
        sharpness = params.sharpness,
        beta = params.beta,
        compactness = params.compactness,
        epsilon = params.epsilon,
        parameters = ncells,
        data = data.len(),
        "starting damped least-squares inversion"
    );

    // Estimate-independent pieces, computed once.
    let dtd = if params.smoothness > 0.0 || params.curvature > 0.0 {
        Some(first_deriv.tr_mul(first_deriv))
    } else {
        None
    };
    let mut hessian_base = jacobian.tr_mul(jacobian);
    if params.damping > 0.0 {
        for d in 0..ncells {
            hessian_base[(d, d)] += params.damping;
        }
    }
    if let Some(dtd) = &dtd {
        if params.smoothness > 0.0 {
            hessian_base += dtd * params.smoothness;
        }
        if params.curvature > 0.0 {
            hessian_base += dtd * dtd * params.curvature;
        }
    }
    // The curvature-only case still needs DᵀD for goal evaluation.
    let goal_dtd = if params.curvature > 0.0 { dtd.as_ref() } else { None };

    let mut goals: GoalTrace =
        vec![goal_with_cached(data, jacobian, first_deriv, goal_dtd, &estimate, params)];
    if goals[0] <= ZERO_GOAL_FLOOR {
        return Ok(Solution {
            estimate,
            goals,
            termination: Termination::Converged,
        });
    }

    let mut lm_param = params.lm_start;
    for iteration in 0..params.max_iterations {
        let current_goal = goals[goals.len() - 1];

        // Gradient and Hessian of the goal at the current estimate, with the
        // estimate-dependent weights recomputed fresh for this iteration.
        let residual = data - jacobian * &estimate;
        let mut gradient = -jacobian.tr_mul(&residual);
        let mut hessian = hessian_base.clone();

        if params.damping > 0.0 {
            gradient += &estimate * params.damping;
        }
        if let Some(dtd) = &dtd {
            if params.smoothness > 0.0 {
                gradient += dtd * &estimate * params.smoothness;
            }
            if params.curvature > 0.0 {
                gradient += dtd * (dtd * &estimate) * params.curvature;
            }
        }
        if params.sharpness > 0.0 {
            let weights = total_variation_weights(first_deriv, &estimate, params.beta);
            let differences = first_deriv * &estimate;
            gradient += first_deriv.tr_mul(&differences.component_mul(&weights)) * params.sharpness;

            let mut weighted_deriv = first_deriv.clone();
            for (l, mut row) in weighted_deriv.row_iter_mut().enumerate() {
                row *= weights[l];
            }
            hessian += first_deriv.tr_mul(&weighted_deriv) * params.sharpness;
        }
        if params.compactness > 0.0 {
            let weights = compactness_weights(&estimate, params.epsilon);
            gradient += estimate.component_mul(&weights) * params.compactness;
            for j in 0..ncells {
                hessian[(j, j)] += params.compactness * weights[j];
            }
        }
        let neg_gradient = -gradient;

        let mut improved = false;
        for attempt in 0..params.max_steps {
            let mut system = hessian.clone();
            for d in 0..ncells {
                system[(d, d)] += lm_param;
            }

            if let Some(cholesky) = Cholesky::new(system) {
                let delta = cholesky.solve(&neg_gradient);
                let trial = &estimate + &delta;
                let trial_goal =
                    goal_with_cached(data, jacobian, first_deriv, goal_dtd, &trial, params);

                if trial_goal < current_goal {
                    debug!(
                        iteration,
                        attempt,
                        goal = trial_goal,
                        marquardt = lm_param,
                        "step accepted"
                    );
                    estimate = trial;
                    goals.push(trial_goal);
                    lm_param /= params.lm_step;
                    improved = true;
                    break;
                }
            }
            // Failed factorization or non-improving trial: damp harder.
            lm_param *= params.lm_step;
        }

        if !improved {
            debug!(iteration, "step retries exhausted");
            return Ok(Solution {
                estimate,
                goals,
                termination: Termination::StepExhausted,
            });
        }

        let accepted_goal = goals[goals.len() - 1];
        if accepted_goal <= ZERO_GOAL_FLOOR
            || (current_goal - accepted_goal).abs() <= CONVERGENCE_TOL * current_goal
        {
            return Ok(Solution {
                estimate,
                goals,
                termination: Termination::Converged,
            });
        }
    }

    Ok(Solution {
        estimate,
        goals,
        termination: Termination::MaxIterations,
    })
}

#[cfg(test)]
mod solver_test {
    use super::*;
    use crate::regularization::first_derivative_operator;
    use approx::assert_relative_eq;

    fn identity_problem() -> (DVector<f64>, DMatrix<f64>, DMatrix<f64>) {
        let data = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let jacobian = DMatrix::identity(3, 3);
        let first_deriv = first_derivative_operator(3, 1, 1);
        (data, jacobian, first_deriv)
    }

    #[test]
    fn test_identity_problem_converges_to_data() {
        let (data, jacobian, first_deriv) = identity_problem();
        let params = SolveParams::builder()
            .initial(DVector::zeros(3))
            .build();
        let solution = solve(&data, &jacobian, &first_deriv, &params).unwrap();

        assert_eq!(solution.termination, Termination::Converged);
        for (est, d) in solution.estimate.iter().zip(data.iter()) {
            assert_relative_eq!(est, d, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_goals_are_non_increasing() {
        let (data, jacobian, first_deriv) = identity_problem();
        let params = SolveParams::builder()
            .damping(0.1)
            .initial(DVector::zeros(3))
            .build();
        let solution = solve(&data, &jacobian, &first_deriv, &params).unwrap();

        for pair in solution.goals.windows(2) {
            assert!(pair[1] <= pair[0], "goal increased: {:?}", pair);
        }
    }

    #[test]
    fn test_zero_data_zero_estimate_converges_immediately() {
        let (_, jacobian, first_deriv) = identity_problem();
        let data = DVector::zeros(3);
        let params = SolveParams::builder()
            .initial(DVector::zeros(3))
            .build();
        let solution = solve(&data, &jacobian, &first_deriv, &params).unwrap();

        assert_eq!(solution.termination, Termination::Converged);
        assert_eq!(solution.goals, vec![0.0]);
        assert_relative_eq!(solution.estimate.norm(), 0.0);
    }

    #[test]
    fn test_exhausted_step_budget_is_terminal_not_an_error() {
        let (data, jacobian, first_deriv) = identity_problem();
        let params = SolveParams::builder()
            .initial(DVector::zeros(3))
            .max_steps(0)
            .build();
        let solution = solve(&data, &jacobian, &first_deriv, &params).unwrap();

        assert_eq!(solution.termination, Termination::StepExhausted);
        assert_eq!(solution.goals.len(), 1);
        assert_relative_eq!(solution.estimate.norm(), 0.0);
    }

    #[test]
    fn test_iteration_budget() {
        let (data, jacobian, first_deriv) = identity_problem();
        let params = SolveParams::builder()
            .initial(DVector::zeros(3))
            .max_iterations(1)
            .build();
        let solution = solve(&data, &jacobian, &first_deriv, &params).unwrap();

        assert_eq!(solution.termination, Termination::MaxIterations);
        assert_eq!(solution.goals.len(), 2);
        assert!(solution.goals[1] < solution.goals[0]);
    }

    #[test]
    fn test_negative_weight_is_rejected() {
        let (data, jacobian, first_deriv) = identity_problem();
        let params = SolveParams::builder().smoothness(-1.0).build();
        let err = solve(&data, &jacobian, &first_deriv, &params).unwrap_err();
        assert_eq!(
            err,
            GravinvError::NegativeWeight {
                name: "smoothness",
                value: -1.0
            }
        );
    }

    #[test]
    fn test_non_positive_constant_is_rejected() {
        let (data, jacobian, first_deriv) = identity_problem();
        let params = SolveParams::builder().beta(0.0).build();
        let err = solve(&data, &jacobian, &first_deriv, &params).unwrap_err();
        assert_eq!(
            err,
            GravinvError::NonPositiveConstant {
                name: "beta",
                value: 0.0
            }
        );
    }

    #[test]
    fn test_initial_estimate_length_is_checked() {
        let (data, jacobian, first_deriv) = identity_problem();
        let params = SolveParams::builder()
            .initial(DVector::zeros(5))
            .build();
        let err = solve(&data, &jacobian, &first_deriv, &params).unwrap_err();
        assert_eq!(err, GravinvError::DimensionMismatch { expected: 3, found: 5 });
    }

    #[test]
    fn test_goal_reduces_to_pure_misfit_with_zero_weights() {
        let (data, jacobian, first_deriv) = identity_problem();
        let estimate = DVector::from_vec(vec![0.5, 0.5, 0.5]);
        let params = SolveParams::default();
        let goal = goal_function(&data, &jacobian, &first_deriv, &estimate, &params);

        let residual = &data - &jacobian * &estimate;
        assert_relative_eq!(goal, residual.dot(&residual));
    }

    #[test]
    fn test_each_regularization_term_contribution_is_monotone_in_its_weight() {
        let (data, jacobian, first_deriv) = identity_problem();
        let estimate = DVector::from_vec(vec![1.0, -2.0, 0.5]);

        let with = |f: fn(SolveParamsBuilder, f64) -> SolveParamsBuilder, w: f64| {
            goal_function(&data, &jacobian, &first_deriv, &estimate, &f(SolveParams::builder(), w).build())
        };

        let setters: [fn(SolveParamsBuilder, f64) -> SolveParamsBuilder; 5] = [
            |b, w| b.damping(w),
            |b, w| b.smoothness(w),
            |b, w| b.curvature(w),
            |b, w| b.sharpness(w),
            |b, w| b.compactness(w),
        ];
        for setter in setters {
            let low = with(setter, 0.1);
            let high = with(setter, 10.0);
            assert!(high >= low, "term contribution decreased with its weight");
        }
    }
}
