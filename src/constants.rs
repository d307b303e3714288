//! # Constants and type definitions for Gravinv
//!
//! This module centralizes the **physical constants**, **unit conversions**, and **common type
//! definitions** used throughout the `gravinv` library.
//!
//! ## Overview
//!
//! - Gravitational constant and SI → geophysical unit conversions
//! - Solver tolerances and default parameter values
//! - Core type aliases used across the crate
//!
//! These definitions are used by the prism kernel, the Jacobian builder, and the
//! damped least-squares solver.

// -------------------------------------------------------------------------------------------------
// Physical constants and unit conversions
// -------------------------------------------------------------------------------------------------

/// Newtonian gravitational constant in SI units (m³ kg⁻¹ s⁻²)
pub const G: f64 = 6.673e-11;

/// Conversion factor from SI acceleration (m/s²) to mGal
pub const SI2MGAL: f64 = 1e5;

/// Conversion factor from SI gravity gradient (1/s²) to Eötvös
pub const SI2EOTVOS: f64 = 1e9;

// -------------------------------------------------------------------------------------------------
// Solver tolerances and defaults
// -------------------------------------------------------------------------------------------------

/// Relative goal-function improvement below which the solver declares convergence
pub const CONVERGENCE_TOL: f64 = 1e-4;

/// Absolute goal-function floor: a goal at or below this value is an exact fit
/// and terminates the solver immediately
pub const ZERO_GOAL_FLOOR: f64 = 1e-15;

/// Default uniform initial density estimate. Small but nonzero so that the
/// total-variation and compactness weights are well defined at step 0.
pub const DEFAULT_INITIAL_DENSITY: f64 = 1e-7;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Density in kg/m³
pub type Density = f64;
/// Distance in meters
pub type Meter = f64;
/// Goal-function values recorded per accepted iteration
pub type GoalTrace = Vec<f64>;
