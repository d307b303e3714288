//! # Closed-form gravity field of a right rectangular prism
//!
//! The forward problem is linear in density: the field of a prism with density
//! `ρ` is `ρ` times its field at unit density. The inversion engine only relies
//! on the [`PrismKernel`] seam, so the analytic implementation here can be
//! swapped for a tabulated or mocked kernel (the test suite does exactly that
//! to count kernel invocations).
//!
//! [`ClosedFormKernel`] evaluates the classical corner-summation solution:
//! each field component is a sum over the eight prism corners with alternating
//! signs, built from `ln` and `atan2` primitives. Coordinates follow the
//! geophysical convention of z positive downward; `gz` is returned in mGal and
//! the tensor components in Eötvös.

use crate::constants::{Density, G, SI2EOTVOS, SI2MGAL};
use crate::field::FieldComponent;
use crate::mesh::CellBounds;

/// Forward-model kernel: contribution of one prism to one field component at
/// one observation point.
///
/// Implementations must be pure and stateless with respect to the inversion:
/// the engine calls them once per (cell, observation, component) triple while
/// assembling the Jacobian and never afterwards.
pub trait PrismKernel {
    /// Field contribution of a prism with the given density at `point`.
    fn field(&self, component: FieldComponent, bounds: &CellBounds, density: Density, point: (f64, f64, f64)) -> f64;

    /// Derivative of the field with respect to density.
    ///
    /// The field is linear in density, so this is the field at unit density.
    /// This is what the Jacobian builder evaluates.
    fn density_derivative(&self, component: FieldComponent, bounds: &CellBounds, point: (f64, f64, f64)) -> f64 {
        self.field(component, bounds, 1.0, point)
    }
}

/// Analytic corner-summation kernel for right rectangular prisms.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClosedFormKernel;

impl PrismKernel for ClosedFormKernel {
    fn field(&self, component: FieldComponent, bounds: &CellBounds, density: Density, point: (f64, f64, f64)) -> f64 {
        let (xp, yp, zp) = point;

        // Corner offsets, upper bound first so that the (0, 0, 0) corner
        // carries a positive sign.
        let dx = [bounds.x2 - xp, bounds.x1 - xp];
        let dy = [bounds.y2 - yp, bounds.y1 - yp];
        let dz = [bounds.z2 - zp, bounds.z1 - zp];

        let mut sum = 0.0;
        for k in 0..2 {
            for j in 0..2 {
                for i in 0..2 {
                    let r = (dx[i] * dx[i] + dy[j] * dy[j] + dz[k] * dz[k]).sqrt();
                    let kernel = match component {
                        FieldComponent::Gz => {
                            -(dx[i] * (dy[j] + r).ln() + dy[j] * (dx[i] + r).ln()
                                - dz[k] * f64::atan2(dx[i] * dy[j], dz[k] * r))
                        }
                        FieldComponent::Gxx => -f64::atan2(dz[k] * dy[j], dx[i] * r),
                        FieldComponent::Gxy => (dz[k] + r).ln(),
                        FieldComponent::Gxz => (dy[j] + r).ln(),
                        FieldComponent::Gyy => -f64::atan2(dz[k] * dx[i], dy[j] * r),
                        FieldComponent::Gyz => (dx[i] + r).ln(),
                        FieldComponent::Gzz => -f64::atan2(dy[j] * dx[i], dz[k] * r),
                    };
                    let sign = if (i + j + k) % 2 == 0 { 1.0 } else { -1.0 };
                    sum += sign * kernel;
                }
            }
        }

        let to_unit = match component {
            FieldComponent::Gz => SI2MGAL,
            _ => SI2EOTVOS,
        };
        G * to_unit * density * sum
    }
}

#[cfg(test)]
mod prism_test {
    use super::*;
    use approx::assert_relative_eq;

    fn buried_cube() -> CellBounds {
        CellBounds {
            x1: -100.0,
            x2: 100.0,
            y1: -100.0,
            y2: 100.0,
            z1: 100.0,
            z2: 300.0,
        }
    }

    #[test]
    fn test_field_is_linear_in_density() {
        let kernel = ClosedFormKernel;
        let bounds = buried_cube();
        let point = (50.0, -30.0, 0.0);
        for component in FieldComponent::ALL {
            let unit = kernel.field(component, &bounds, 1.0, point);
            let scaled = kernel.field(component, &bounds, 1234.5, point);
            assert_relative_eq!(scaled, 1234.5 * unit, max_relative = 1e-12);
            assert_relative_eq!(
                kernel.density_derivative(component, &bounds, point),
                unit,
                max_relative = 1e-12
            );
        }
    }

    #[test]
    fn test_gz_positive_above_dense_prism() {
        // z positive down: a dense prism below the observer pulls downward.
        let kernel = ClosedFormKernel;
        let gz = kernel.field(FieldComponent::Gz, &buried_cube(), 1000.0, (0.0, 0.0, 0.0));
        assert!(gz > 0.0, "gz = {gz}");
    }

    #[test]
    fn test_tensor_trace_vanishes_outside_the_prism() {
        // The potential is harmonic outside the source, so gxx + gyy + gzz = 0.
        let kernel = ClosedFormKernel;
        let bounds = buried_cube();
        let point = (250.0, -80.0, -10.0);
        let trace = kernel.field(FieldComponent::Gxx, &bounds, 800.0, point)
            + kernel.field(FieldComponent::Gyy, &bounds, 800.0, point)
            + kernel.field(FieldComponent::Gzz, &bounds, 800.0, point);
        let gzz = kernel.field(FieldComponent::Gzz, &bounds, 800.0, point);
        assert!(trace.abs() < 1e-9 * gzz.abs().max(1.0), "trace = {trace}");
    }

    #[test]
    fn test_gz_symmetry_under_horizontal_mirror() {
        // A symmetric prism produces a symmetric gz profile.
        let kernel = ClosedFormKernel;
        let bounds = buried_cube();
        let left = kernel.field(FieldComponent::Gz, &bounds, 500.0, (-80.0, 40.0, 0.0));
        let right = kernel.field(FieldComponent::Gz, &bounds, 500.0, (80.0, 40.0, 0.0));
        assert_relative_eq!(left, right, max_relative = 1e-10);
    }

    #[test]
    fn test_gz_decays_with_distance() {
        let kernel = ClosedFormKernel;
        let bounds = buried_cube();
        let near = kernel.field(FieldComponent::Gz, &bounds, 1000.0, (0.0, 0.0, 0.0));
        let far = kernel.field(FieldComponent::Gz, &bounds, 1000.0, (2000.0, 0.0, 0.0));
        assert!(near > far.abs() * 10.0);
    }
}
