//! # Gravinv: 3-D gravity inversion on rectangular prism meshes
//!
//! Inversion of surface gravity-field measurements (vertical gravity and the
//! gradient-tensor components) for a density distribution discretized on a
//! prism mesh. The engine assembles a dense sensitivity matrix once per
//! session, builds finite-difference regularization operators, and minimizes
//! a composite goal function with a damped least-squares iteration.
//!
//! Entry point: [`session::InversionSession`].

pub mod constants;
pub mod field;
pub mod gravinv_errors;
pub mod jacobian;
pub mod mesh;
pub mod observations;
pub mod prism;
pub mod regularization;
pub mod session;
pub mod solver;
