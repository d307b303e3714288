//! # Rectangular prism mesh
//!
//! The model space is an ordered 3-D grid of axis-aligned rectangular cells,
//! each carrying six bounding coordinates and a mutable scalar value (the
//! density estimate once an inversion has run).
//!
//! ## Flattening convention
//! -----------------
//! Cell `(i, j, k)` maps to the 1-D parameter index `p = i + j·nx + k·nx·ny`
//! (x fastest, then y, then z). The Jacobian columns, the regularization
//! operators, and [`PrismMesh::fill`] all rely on this single convention.
//!
//! Mesh geometry is immutable during an inversion; only cell values are
//! written back after solving.

use nalgebra::DVector;

use crate::constants::Meter;
use crate::gravinv_errors::GravinvError;

/// Six bounding coordinates of an axis-aligned rectangular prism (meters,
/// z positive downward).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellBounds {
    pub x1: Meter,
    pub x2: Meter,
    pub y1: Meter,
    pub y2: Meter,
    pub z1: Meter,
    pub z2: Meter,
}

/// One mesh cell: bounds plus the mutable property value slot.
#[derive(Debug, Clone, PartialEq)]
pub struct PrismCell {
    pub bounds: CellBounds,
    /// Density estimate written by [`PrismMesh::fill`] (kg/m³).
    pub value: f64,
}

/// Ordered 3-D grid of prism cells, flattened x fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct PrismMesh {
    nx: usize,
    ny: usize,
    nz: usize,
    cells: Vec<PrismCell>,
}

impl PrismMesh {
    /// Build a regular mesh by slicing a box into `nx × ny × nz` equal cells.
    ///
    /// Arguments
    /// -----------------
    /// * `x`, `y`, `z`: the `(min, max)` bounds of the model box in meters
    ///   (z positive downward).
    /// * `shape`: the `(nx, ny, nz)` cell counts along each axis, all ≥ 1.
    ///
    /// Return
    /// ----------
    /// * A [`PrismMesh`] with all cell values initialized to zero.
    ///
    /// See also
    /// ------------
    /// * [`PrismMesh::from_cells`] – Wrap externally built cells.
    pub fn regular(x: (Meter, Meter), y: (Meter, Meter), z: (Meter, Meter), shape: (usize, usize, usize)) -> Self {
        let (nx, ny, nz) = shape;
        assert!(nx >= 1 && ny >= 1 && nz >= 1, "mesh shape must be positive");

        let dx = (x.1 - x.0) / nx as f64;
        let dy = (y.1 - y.0) / ny as f64;
        let dz = (z.1 - z.0) / nz as f64;

        let mut cells = Vec::with_capacity(nx * ny * nz);
        for k in 0..nz {
            let z1 = z.0 + k as f64 * dz;
            for j in 0..ny {
                let y1 = y.0 + j as f64 * dy;
                for i in 0..nx {
                    let x1 = x.0 + i as f64 * dx;
                    cells.push(PrismCell {
                        bounds: CellBounds {
                            x1,
                            x2: x1 + dx,
                            y1,
                            y2: y1 + dy,
                            z1,
                            z2: z1 + dz,
                        },
                        value: 0.0,
                    });
                }
            }
        }

        PrismMesh { nx, ny, nz, cells }
    }

    /// Wrap an externally built cell layout.
    ///
    /// Arguments
    /// -----------------
    /// * `shape`: the `(nx, ny, nz)` grid dimensions.
    /// * `cells`: the cells in flattened order (x fastest).
    ///
    /// Return
    /// ----------
    /// * The mesh, or [`GravinvError::DimensionMismatch`] if `cells.len()`
    ///   disagrees with `nx·ny·nz`.
    pub fn from_cells(shape: (usize, usize, usize), cells: Vec<PrismCell>) -> Result<Self, GravinvError> {
        let (nx, ny, nz) = shape;
        let expected = nx * ny * nz;
        if cells.len() != expected {
            return Err(GravinvError::DimensionMismatch {
                expected,
                found: cells.len(),
            });
        }
        Ok(PrismMesh { nx, ny, nz, cells })
    }

    /// Grid dimensions `(nx, ny, nz)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nz)
    }

    /// Total number of cells, i.e. the inversion parameter count.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// All cells in flattened parameter order.
    pub fn cells(&self) -> &[PrismCell] {
        &self.cells
    }

    /// Flattened parameter index of cell `(i, j, k)`.
    pub fn flat_index(&self, i: usize, j: usize, k: usize) -> usize {
        debug_assert!(i < self.nx && j < self.ny && k < self.nz);
        i + j * self.nx + k * self.nx * self.ny
    }

    /// The cell at grid position `(i, j, k)`.
    pub fn cell(&self, i: usize, j: usize, k: usize) -> &PrismCell {
        &self.cells[self.flat_index(i, j, k)]
    }

    /// Write an inversion estimate into the cell value slots.
    ///
    /// Arguments
    /// -----------------
    /// * `estimate`: parameter vector in flattened order.
    ///
    /// Return
    /// ----------
    /// * `Ok(())`, or [`GravinvError::DimensionMismatch`] when the estimate
    ///   length disagrees with the cell count.
    pub fn fill(&mut self, estimate: &DVector<f64>) -> Result<(), GravinvError> {
        if estimate.len() != self.cells.len() {
            return Err(GravinvError::DimensionMismatch {
                expected: self.cells.len(),
                found: estimate.len(),
            });
        }
        for (cell, value) in self.cells.iter_mut().zip(estimate.iter()) {
            cell.value = *value;
        }
        Ok(())
    }
}
