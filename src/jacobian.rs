//! # Sensitivity-matrix assembly
//!
//! The Jacobian maps per-cell density to predicted field values:
//! `J[(i, j)]` is the forward-kernel contribution of mesh cell `j` (at unit
//! density) to observation `i`. Row blocks follow the canonical component
//! order, rows within a block follow the observation array order, and columns
//! follow the flattened mesh parameter order.
//!
//! Assembly is `O(observations × cells)` kernel evaluations and dominates the
//! cost of the whole engine. It depends only on geometry, never on the
//! estimate, so the session caches the result and reuses it for every
//! iteration (see [`InversionSession::jacobian`](crate::session::InversionSession::jacobian)).

use nalgebra::DMatrix;
use tracing::debug;

use crate::mesh::PrismMesh;
use crate::observations::ObservationSet;
use crate::prism::PrismKernel;

/// Assemble the dense sensitivity matrix for a mesh/observation pair.
///
/// Arguments
/// -----------------
/// * `kernel`: the forward-model kernel, evaluated at unit density.
/// * `mesh`: the model-space discretization.
/// * `observations`: the observation set; only present components contribute
///   row blocks.
///
/// Return
/// ----------
/// * A `(total_observations × cell_count)` dense matrix.
pub fn build_jacobian<K: PrismKernel>(kernel: &K, mesh: &PrismMesh, observations: &ObservationSet) -> DMatrix<f64> {
    let nrows = observations.total_observations();
    let ncols = mesh.cell_count();
    debug!(rows = nrows, cols = ncols, "assembling Jacobian");

    let mut jacobian = DMatrix::zeros(nrows, ncols);
    let mut row = 0;
    for (component, grid) in observations.iter() {
        for point in grid.positions() {
            for (col, cell) in mesh.cells().iter().enumerate() {
                jacobian[(row, col)] = kernel.density_derivative(component, &cell.bounds, point);
            }
            row += 1;
        }
    }
    jacobian
}

#[cfg(test)]
mod jacobian_test {
    use super::*;
    use crate::field::FieldComponent;
    use crate::observations::ObservationGrid;
    use crate::prism::ClosedFormKernel;
    use approx::assert_relative_eq;

    #[test]
    fn test_single_observation_row_matches_kernel() {
        let mesh = PrismMesh::regular((0.0, 200.0), (0.0, 200.0), (100.0, 200.0), (2, 2, 1));
        let mut observations = ObservationSet::new();
        observations.insert(
            FieldComponent::Gz,
            ObservationGrid::new(vec![50.0], vec![50.0], vec![0.0], None).unwrap(),
        );

        let kernel = ClosedFormKernel;
        let jacobian = build_jacobian(&kernel, &mesh, &observations);
        assert_eq!(jacobian.shape(), (1, 4));

        for (col, cell) in mesh.cells().iter().enumerate() {
            let expected = kernel.density_derivative(FieldComponent::Gz, &cell.bounds, (50.0, 50.0, 0.0));
            assert_relative_eq!(jacobian[(0, col)], expected);
        }
    }

    #[test]
    fn test_row_blocks_follow_canonical_order() {
        let mesh = PrismMesh::regular((0.0, 100.0), (0.0, 100.0), (100.0, 200.0), (1, 1, 1));
        let mut observations = ObservationSet::new();
        observations.insert(
            FieldComponent::Gzz,
            ObservationGrid::new(vec![0.0], vec![0.0], vec![0.0], None).unwrap(),
        );
        observations.insert(
            FieldComponent::Gz,
            ObservationGrid::new(vec![0.0], vec![0.0], vec![0.0], None).unwrap(),
        );

        let kernel = ClosedFormKernel;
        let jacobian = build_jacobian(&kernel, &mesh, &observations);
        assert_eq!(jacobian.shape(), (2, 1));

        let bounds = mesh.cells()[0].bounds;
        // gz block first, gzz block second, regardless of insertion order
        assert_relative_eq!(
            jacobian[(0, 0)],
            kernel.density_derivative(FieldComponent::Gz, &bounds, (0.0, 0.0, 0.0))
        );
        assert_relative_eq!(
            jacobian[(1, 0)],
            kernel.density_derivative(FieldComponent::Gzz, &bounds, (0.0, 0.0, 0.0))
        );
    }
}
