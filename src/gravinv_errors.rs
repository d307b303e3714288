use thiserror::Error;

/// Error taxonomy for the inversion engine.
///
/// All input-validation errors are raised immediately and are never retried
/// internally. The only automatic recovery mechanism is the solver's own step
/// damping, which is bounded by `max_steps` and surfaces as the
/// [`StepExhausted`](crate::solver::Termination::StepExhausted) terminal state
/// rather than an error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GravinvError {
    #[error("Invalid gravity component (data key): {0}")]
    InvalidComponent(String),

    #[error("No mesh is bound to the session; call bind before this operation")]
    MissingMesh,

    #[error("No observation set is bound to the session; call bind before this operation")]
    MissingData,

    #[error("Dimension mismatch: expected {expected} elements, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Observed values are absent and no data vector is cached for this session")]
    MissingObservedValues,

    #[error("Session already holds a bound mesh/data pair; call clear before rebinding")]
    SessionAlreadyBound,

    #[error("Observation grid arrays have inconsistent lengths: x={x}, y={y}, z={z}")]
    RaggedObservationGrid { x: usize, y: usize, z: usize },

    #[error("Regularization weight `{name}` must be non-negative, got {value}")]
    NegativeWeight { name: &'static str, value: f64 },

    #[error("Stabilization constant `{name}` must be strictly positive, got {value}")]
    NonPositiveConstant { name: &'static str, value: f64 },
}
