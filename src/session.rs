//! # Inversion session: bound state and cached Jacobian
//!
//! [`InversionSession`] is the central façade of the crate. It owns, for the
//! lifetime of one inversion, the bound mesh, the observation set, the
//! flattened data vector, and the cached Jacobian. Older designs kept these as
//! module-level globals; the session makes the coupling explicit and lets
//! independent inversions run side by side on independent instances.
//!
//! The design emphasizes *idempotent caching*: the Jacobian is assembled on
//! first use via [`OnceCell`](once_cell::sync::OnceCell), then reused for
//! every iteration and every prediction. It depends only on geometry, never on
//! the estimate, so one assembly per session is both safe and mandatory for
//! performance.
//!
//! Rebinding a live session is an error, not a silent cache refresh: call
//! [`clear`](InversionSession::clear) before reusing the engine with a
//! different mesh or data set.
//!
//! ## Typical usage
//!
//! ```rust
//! use gravinv::field::FieldComponent;
//! use gravinv::mesh::PrismMesh;
//! use gravinv::observations::{ObservationGrid, ObservationSet};
//! use gravinv::session::InversionSession;
//! use gravinv::solver::SolveParams;
//!
//! # fn run() -> Result<(), gravinv::gravinv_errors::GravinvError> {
//! let mesh = PrismMesh::regular((0.0, 400.0), (0.0, 400.0), (0.0, 200.0), (4, 4, 2));
//! let mut observations = ObservationSet::new();
//! observations.insert(
//!     FieldComponent::Gz,
//!     ObservationGrid::new(vec![200.0], vec![200.0], vec![-10.0], Some(vec![0.35]))?,
//! );
//!
//! let mut session = InversionSession::new();
//! session.bind(mesh, observations)?;
//! let params = SolveParams::builder().damping(1e-10).build();
//! let solution = session.solve(&params)?;
//! session.fill_mesh(&solution.estimate)?;
//! # Ok(())
//! # }
//! ```

use nalgebra::{DMatrix, DVector};
use once_cell::sync::OnceCell;
use tracing::info;

use crate::gravinv_errors::GravinvError;
use crate::jacobian::build_jacobian;
use crate::mesh::PrismMesh;
use crate::observations::ObservationSet;
use crate::prism::{ClosedFormKernel, PrismKernel};
use crate::regularization::first_derivative_operator;
use crate::solver::{solve, Solution, SolveParams};

/// Session-level solve state: bound inputs plus the memoized Jacobian.
///
/// Generic over the forward kernel so tests and callers can substitute their
/// own; defaults to the analytic [`ClosedFormKernel`].
#[derive(Debug)]
pub struct InversionSession<K: PrismKernel = ClosedFormKernel> {
    kernel: K,
    mesh: Option<PrismMesh>,
    observations: Option<ObservationSet>,
    data_vector: Option<DVector<f64>>,
    jacobian: OnceCell<DMatrix<f64>>,
}

impl InversionSession<ClosedFormKernel> {
    /// A session using the analytic prism kernel.
    pub fn new() -> Self {
        Self::with_kernel(ClosedFormKernel)
    }
}

impl Default for InversionSession<ClosedFormKernel> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: PrismKernel> InversionSession<K> {
    /// A session using a caller-supplied forward kernel.
    pub fn with_kernel(kernel: K) -> Self {
        InversionSession {
            kernel,
            mesh: None,
            observations: None,
            data_vector: None,
            jacobian: OnceCell::new(),
        }
    }

    /// Bind a mesh and observation set to the session.
    ///
    /// Extracts and caches the observed data vector when every present grid
    /// carries values; a prediction-only set (no values anywhere) binds
    /// without one.
    ///
    /// Arguments
    /// -----------------
    /// * `mesh`: the model-space discretization, consumed read-only in
    ///   geometry for the rest of the session.
    /// * `observations`: at least one component must be present.
    ///
    /// Return
    /// ----------
    /// * `Ok(())`, [`GravinvError::SessionAlreadyBound`] if the session still
    ///   holds a previous mesh/data pair, or [`GravinvError::MissingData`] for
    ///   an empty observation set.
    pub fn bind(&mut self, mesh: PrismMesh, observations: ObservationSet) -> Result<(), GravinvError> {
        if self.mesh.is_some() || self.observations.is_some() {
            return Err(GravinvError::SessionAlreadyBound);
        }
        if observations.is_empty() {
            return Err(GravinvError::MissingData);
        }

        let data_vector = match observations.flatten() {
            Ok(vector) => Some(vector),
            Err(GravinvError::MissingObservedValues) => None,
            Err(other) => return Err(other),
        };

        info!(
            cells = mesh.cell_count(),
            components = observations.component_count(),
            observations = observations.total_observations(),
            "session bound"
        );

        self.mesh = Some(mesh);
        self.observations = Some(observations);
        self.data_vector = data_vector;
        Ok(())
    }

    /// Discard the cached mesh, data, and Jacobian.
    ///
    /// Must be called before reusing the engine for a different mesh or data
    /// set; stale cached state combined with new inputs is an error condition,
    /// never silently tolerated.
    pub fn clear(&mut self) {
        self.mesh = None;
        self.observations = None;
        self.data_vector = None;
        self.jacobian = OnceCell::new();
    }

    /// The bound mesh.
    pub fn mesh(&self) -> Result<&PrismMesh, GravinvError> {
        self.mesh.as_ref().ok_or(GravinvError::MissingMesh)
    }

    /// The bound observation set.
    pub fn observations(&self) -> Result<&ObservationSet, GravinvError> {
        self.observations.as_ref().ok_or(GravinvError::MissingData)
    }

    /// The cached observed data vector.
    pub fn data_vector(&self) -> Result<&DVector<f64>, GravinvError> {
        // Distinguish "nothing bound" from "bound but prediction-only".
        self.observations()?;
        self.data_vector.as_ref().ok_or(GravinvError::MissingObservedValues)
    }

    /// The sensitivity matrix for the bound mesh/data pair.
    ///
    /// Assembled on first call, memoized afterwards: a second call returns the
    /// identical cached matrix without recomputation.
    ///
    /// Return
    /// ----------
    /// * The `(total_observations × cell_count)` Jacobian, or
    ///   [`GravinvError::MissingMesh`] / [`GravinvError::MissingData`] when
    ///   invoked before binding.
    pub fn jacobian(&self) -> Result<&DMatrix<f64>, GravinvError> {
        let mesh = self.mesh()?;
        let observations = self.observations()?;
        Ok(self
            .jacobian
            .get_or_init(|| build_jacobian(&self.kernel, mesh, observations)))
    }

    /// Run the inversion for the bound data.
    ///
    /// Builds (or reuses) the Jacobian and the first-derivative operator, then
    /// drives the damped least-squares loop of [`crate::solver::solve`].
    ///
    /// Arguments
    /// -----------------
    /// * `params`: regularization weights, stabilization constants, and
    ///   iteration controls.
    ///
    /// Return
    /// ----------
    /// * The [`Solution`] (estimate, goal trace, termination state), or an
    ///   error if the session is unbound, the bound set carries no observed
    ///   values, or a parameter precondition fails.
    pub fn solve(&self, params: &SolveParams) -> Result<Solution, GravinvError> {
        let jacobian = self.jacobian()?;
        let data = self.data_vector()?;
        let (nx, ny, nz) = self.mesh()?.shape();
        let first_deriv = first_derivative_operator(nx, ny, nz);
        solve(data, jacobian, &first_deriv, params)
    }

    /// Predicted data produced by an estimate, as a flat vector.
    ///
    /// Applies the cached Jacobian; the forward model is linear in the
    /// property for a fixed Jacobian.
    ///
    /// Arguments
    /// -----------------
    /// * `estimate`: parameter vector, length = cell count.
    pub fn predicted(&self, estimate: &DVector<f64>) -> Result<DVector<f64>, GravinvError> {
        let jacobian = self.jacobian()?;
        if estimate.len() != jacobian.ncols() {
            return Err(GravinvError::DimensionMismatch {
                expected: jacobian.ncols(),
                found: estimate.len(),
            });
        }
        Ok(jacobian * estimate)
    }

    /// Predicted data reshaped into per-component grids, the exact inverse of
    /// the data-vector flattening.
    pub fn predicted_grids(&self, estimate: &DVector<f64>) -> Result<ObservationSet, GravinvError> {
        let predicted = self.predicted(estimate)?;
        self.observations()?.unflatten(&predicted)
    }

    /// Observed-minus-predicted residuals for an estimate.
    ///
    /// If `observations` still carries observed values they are re-extracted;
    /// otherwise the data vector cached at bind time is used.
    ///
    /// Arguments
    /// -----------------
    /// * `observations`: the observation set to take observed values from.
    /// * `estimate`: parameter vector, length = cell count.
    ///
    /// Return
    /// ----------
    /// * The residual vector, or [`GravinvError::MissingObservedValues`] when
    ///   the set has no values and nothing is cached for this session.
    pub fn residuals(
        &self,
        observations: &ObservationSet,
        estimate: &DVector<f64>,
    ) -> Result<DVector<f64>, GravinvError> {
        let predicted = self.predicted(estimate)?;
        let observed = match observations.flatten() {
            Ok(vector) => vector,
            Err(GravinvError::MissingObservedValues) => self
                .data_vector
                .clone()
                .ok_or(GravinvError::MissingObservedValues)?,
            Err(other) => return Err(other),
        };
        if observed.len() != predicted.len() {
            return Err(GravinvError::DimensionMismatch {
                expected: predicted.len(),
                found: observed.len(),
            });
        }
        Ok(observed - predicted)
    }

    /// Write an estimate into the bound mesh's cell value slots.
    ///
    /// See also
    /// ------------
    /// * [`PrismMesh::fill`] – The same operation on a caller-owned mesh.
    pub fn fill_mesh(&mut self, estimate: &DVector<f64>) -> Result<(), GravinvError> {
        match self.mesh.as_mut() {
            Some(mesh) => mesh.fill(estimate),
            None => Err(GravinvError::MissingMesh),
        }
    }
}
