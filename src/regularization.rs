//! # Regularization operators
//!
//! Three ingredients feed the goal function's penalty terms:
//!
//! 1. The **first-derivative finite-difference operator** over the mesh, one
//!    row per adjacent-cell pair along each axis. Pure function of the grid
//!    dimensions, cacheable per mesh shape.
//! 2. **Total-variation weights**, which shrink as inter-cell differences
//!    grow, making the order-1 penalty edge preserving.
//! 3. **Compactness weights**, which grow as an estimate component shrinks,
//!    penalizing spread-out mass.
//!
//! The two weightings depend on the current estimate and must be recomputed at
//! every outer iteration. Stale weights are a correctness bug.

use nalgebra::{DMatrix, DVector};

/// Build the first-derivative finite-difference matrix for an
/// `nx × ny × nz` mesh.
///
/// Rows come in x-pairs-then-y-pairs-then-z-pairs order, one row per pair of
/// adjacent cells, `(nx−1)·ny·nz + nx·(ny−1)·nz + nx·ny·(nz−1)` rows in
/// total. Each row has exactly one `+1` and one `−1`, at the flattened
/// parameter indices of the two neighbors.
///
/// Arguments
/// -----------------
/// * `nx`, `ny`, `nz`: grid dimensions, all ≥ 1.
///
/// Return
/// ----------
/// * The `(pair_count × nx·ny·nz)` operator matrix.
pub fn first_derivative_operator(nx: usize, ny: usize, nz: usize) -> DMatrix<f64> {
    assert!(nx >= 1 && ny >= 1 && nz >= 1, "mesh shape must be positive");

    let nrows = (nx - 1) * ny * nz + nx * (ny - 1) * nz + nx * ny * (nz - 1);
    let mut deriv = DMatrix::zeros(nrows, nx * ny * nz);
    let mut row = 0;

    // Pairs along x: neighbor is one parameter over.
    let mut param = 0;
    for _k in 0..nz {
        for _j in 0..ny {
            for _i in 0..nx - 1 {
                deriv[(row, param)] = 1.0;
                deriv[(row, param + 1)] = -1.0;
                row += 1;
                param += 1;
            }
            param += 1;
        }
    }

    // Pairs along y: neighbor is nx parameters over.
    let mut param = 0;
    for _k in 0..nz {
        for _j in 0..ny - 1 {
            for _i in 0..nx {
                deriv[(row, param)] = 1.0;
                deriv[(row, param + nx)] = -1.0;
                row += 1;
                param += 1;
            }
        }
        param += nx;
    }

    // Pairs along z: neighbor is nx·ny parameters over.
    let mut param = 0;
    for _k in 0..nz - 1 {
        for _j in 0..ny {
            for _i in 0..nx {
                deriv[(row, param)] = 1.0;
                deriv[(row, param + nx * ny)] = -1.0;
                row += 1;
                param += 1;
            }
        }
    }

    deriv
}

/// Diagonal of the total-variation weighting matrix for the current estimate.
///
/// Entry `l` is `1 / sqrt((D·p)_l² + beta)`: large jumps between neighbors are
/// penalized less severely than under plain Tikhonov order 1, preserving
/// edges. `beta > 0` keeps the weight finite where neighbors agree.
///
/// Arguments
/// -----------------
/// * `first_deriv`: the operator from [`first_derivative_operator`].
/// * `estimate`: the current parameter vector.
/// * `beta`: smoothing constant, strictly positive.
pub fn total_variation_weights(first_deriv: &DMatrix<f64>, estimate: &DVector<f64>, beta: f64) -> DVector<f64> {
    debug_assert!(beta > 0.0);
    let differences = first_deriv * estimate;
    differences.map(|d| 1.0 / (d * d + beta).sqrt())
}

/// Diagonal of the compactness weighting matrix for the current estimate.
///
/// Entry `j` is `1 / (p_j² + epsilon)`: cells holding little mass are
/// penalized hardest, concentrating the solution into few cells.
/// `epsilon > 0` avoids the singularity as a component approaches zero.
///
/// Arguments
/// -----------------
/// * `estimate`: the current parameter vector.
/// * `epsilon`: stabilization constant, strictly positive.
pub fn compactness_weights(estimate: &DVector<f64>, epsilon: f64) -> DVector<f64> {
    debug_assert!(epsilon > 0.0);
    estimate.map(|p| 1.0 / (p * p + epsilon))
}
