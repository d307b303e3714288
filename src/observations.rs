//! # Observation grids and the flattened data vector
//!
//! An [`ObservationSet`] maps each present [`FieldComponent`] to a grid of
//! observation coordinates and (optionally) observed field values. Components
//! may be absent; at least one must be present before an inversion can run.
//!
//! ## Canonical order
//! -----------------
//! The observed data vector concatenates the present components in the fixed
//! order `gz, gxx, gxy, gxz, gyy, gyz, gzz`. The same order is used when
//! slicing a predicted vector back into per-component grids, so
//! `unflatten(flatten(x)) == x` for any well-formed set. Iteration over an
//! [`ObservationSet`] always follows this order regardless of insertion order.

use ahash::RandomState;
use itertools::izip;
use nalgebra::DVector;
use std::collections::HashMap;
use std::str::FromStr;

use crate::field::FieldComponent;
use crate::gravinv_errors::GravinvError;

/// Parallel arrays of observation coordinates and optional observed values for
/// one field component.
///
/// Coordinates are in meters (z positive downward); values are in the
/// component's conventional unit (mGal for `gz`, Eötvös for tensor entries).
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationGrid {
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
    values: Option<Vec<f64>>,
}

impl ObservationGrid {
    /// Build a grid from parallel coordinate arrays and optional values.
    ///
    /// Arguments
    /// -----------------
    /// * `x`, `y`, `z`: observation coordinates, all of equal length.
    /// * `values`: observed field values, `None` when only predicting.
    ///
    /// Return
    /// ----------
    /// * The grid, or [`GravinvError::RaggedObservationGrid`] /
    ///   [`GravinvError::DimensionMismatch`] when lengths disagree.
    pub fn new(x: Vec<f64>, y: Vec<f64>, z: Vec<f64>, values: Option<Vec<f64>>) -> Result<Self, GravinvError> {
        if x.len() != y.len() || x.len() != z.len() {
            return Err(GravinvError::RaggedObservationGrid {
                x: x.len(),
                y: y.len(),
                z: z.len(),
            });
        }
        if let Some(v) = &values {
            if v.len() != x.len() {
                return Err(GravinvError::DimensionMismatch {
                    expected: x.len(),
                    found: v.len(),
                });
            }
        }
        Ok(ObservationGrid { x, y, z, values })
    }

    /// Number of observation points in this grid.
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Observation points as `(x, y, z)` triples, in array order.
    pub fn positions(&self) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        izip!(&self.x, &self.y, &self.z).map(|(&x, &y, &z)| (x, y, z))
    }

    /// Observed values, if this grid carries any.
    pub fn values(&self) -> Option<&[f64]> {
        self.values.as_deref()
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn z(&self) -> &[f64] {
        &self.z
    }

    /// Replace the observed values (used when slicing a predicted vector back
    /// into grids).
    pub(crate) fn set_values(&mut self, values: Vec<f64>) {
        debug_assert_eq!(values.len(), self.x.len());
        self.values = Some(values);
    }

    /// Destructively take the observed values out of the grid.
    pub(crate) fn take_values(&mut self) -> Option<Vec<f64>> {
        self.values.take()
    }
}

/// Mapping from field component to observation grid.
#[derive(Debug, Clone, Default)]
pub struct ObservationSet {
    grids: HashMap<FieldComponent, ObservationGrid, RandomState>,
}

impl ObservationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a grid for a component, replacing any previous one.
    pub fn insert(&mut self, component: FieldComponent, grid: ObservationGrid) {
        self.grids.insert(component, grid);
    }

    /// Insert a grid keyed by a component *name* as found in data files.
    ///
    /// Arguments
    /// -----------------
    /// * `name`: one of `gz, gxx, gxy, gxz, gyy, gyz, gzz`.
    /// * `grid`: the observation grid.
    ///
    /// Return
    /// ----------
    /// * `Ok(())`, or [`GravinvError::InvalidComponent`] for any other name.
    ///   This is the validation gate the solve entry point relies on: an
    ///   unknown key is rejected before any matrix is assembled.
    pub fn insert_named(&mut self, name: &str, grid: ObservationGrid) -> Result<(), GravinvError> {
        let component = FieldComponent::from_str(name)?;
        self.insert(component, grid);
        Ok(())
    }

    /// The grid for one component, if present.
    pub fn get(&self, component: FieldComponent) -> Option<&ObservationGrid> {
        self.grids.get(&component)
    }

    /// Number of components present.
    pub fn component_count(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }

    /// Total observation count summed over present components.
    pub fn total_observations(&self) -> usize {
        self.iter().map(|(_, grid)| grid.len()).sum()
    }

    /// Present components with their grids, in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (FieldComponent, &ObservationGrid)> {
        FieldComponent::ALL
            .iter()
            .filter_map(|&component| self.grids.get(&component).map(|grid| (component, grid)))
    }

    /// Concatenate the observed values of present components into one vector,
    /// in canonical order.
    ///
    /// Return
    /// ----------
    /// * The flattened data vector, or
    ///   [`GravinvError::MissingObservedValues`] if any present grid has no
    ///   values.
    ///
    /// See also
    /// ------------
    /// * [`ObservationSet::flatten_in_place`] – Destructive variant bounding peak memory.
    /// * [`ObservationSet::unflatten`] – The exact inverse mapping.
    pub fn flatten(&self) -> Result<DVector<f64>, GravinvError> {
        let mut data = Vec::with_capacity(self.total_observations());
        for (_, grid) in self.iter() {
            let values = grid.values().ok_or(GravinvError::MissingObservedValues)?;
            data.extend_from_slice(values);
        }
        Ok(DVector::from_vec(data))
    }

    /// Like [`flatten`](ObservationSet::flatten), but clears each grid's
    /// observed values as they are copied out.
    ///
    /// This is an optional memory optimization for large data sets, not a
    /// correctness requirement. Grids keep their coordinates, so prediction
    /// and unflattening still work afterwards.
    pub fn flatten_in_place(&mut self) -> Result<DVector<f64>, GravinvError> {
        let mut data = Vec::with_capacity(self.total_observations());
        for &component in FieldComponent::ALL.iter() {
            if let Some(grid) = self.grids.get_mut(&component) {
                let values = grid.take_values().ok_or(GravinvError::MissingObservedValues)?;
                data.extend_from_slice(&values);
            }
        }
        Ok(DVector::from_vec(data))
    }

    /// Slice a flat vector back into per-component grids, the exact inverse of
    /// [`flatten`](ObservationSet::flatten).
    ///
    /// Arguments
    /// -----------------
    /// * `vector`: flat values in canonical component order, with the same
    ///   per-component lengths as this set.
    ///
    /// Return
    /// ----------
    /// * A new [`ObservationSet`] with the same coordinates and the sliced
    ///   values, or [`GravinvError::DimensionMismatch`] when the vector length
    ///   disagrees with the total observation count.
    pub fn unflatten(&self, vector: &DVector<f64>) -> Result<ObservationSet, GravinvError> {
        let expected = self.total_observations();
        if vector.len() != expected {
            return Err(GravinvError::DimensionMismatch {
                expected,
                found: vector.len(),
            });
        }

        let mut out = ObservationSet::new();
        let mut offset = 0;
        for (component, grid) in self.iter() {
            let n = grid.len();
            let mut sliced = grid.clone();
            sliced.set_values(vector.as_slice()[offset..offset + n].to_vec());
            out.insert(component, sliced);
            offset += n;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod observations_test {
    use super::*;
    use approx::assert_relative_eq;

    fn grid(values: Vec<f64>) -> ObservationGrid {
        let n = values.len();
        ObservationGrid::new(vec![0.0; n], vec![0.0; n], vec![0.0; n], Some(values)).unwrap()
    }

    #[test]
    fn test_flatten_follows_canonical_order() {
        let mut set = ObservationSet::new();
        // inserted out of order on purpose
        set.insert(FieldComponent::Gzz, grid(vec![7.0, 8.0]));
        set.insert(FieldComponent::Gz, grid(vec![1.0, 2.0]));
        set.insert(FieldComponent::Gxy, grid(vec![3.0]));

        let data = set.flatten().unwrap();
        assert_eq!(data.as_slice(), &[1.0, 2.0, 3.0, 7.0, 8.0]);
    }

    #[test]
    fn test_unflatten_round_trip() {
        let mut set = ObservationSet::new();
        set.insert(FieldComponent::Gz, grid(vec![1.0, 2.0, 3.0]));
        set.insert(FieldComponent::Gyz, grid(vec![-4.0, 5.0]));

        let data = set.flatten().unwrap();
        let back = set.unflatten(&data).unwrap();
        for (component, original) in set.iter() {
            let restored = back.get(component).unwrap();
            for (a, b) in original.values().unwrap().iter().zip(restored.values().unwrap()) {
                assert_relative_eq!(a, b);
            }
        }
    }

    #[test]
    fn test_flatten_in_place_clears_sources() {
        let mut set = ObservationSet::new();
        set.insert(FieldComponent::Gz, grid(vec![1.0, 2.0]));
        let data = set.flatten_in_place().unwrap();
        assert_eq!(data.len(), 2);
        assert!(set.get(FieldComponent::Gz).unwrap().values().is_none());
        // coordinates survive
        assert_eq!(set.get(FieldComponent::Gz).unwrap().len(), 2);
    }

    #[test]
    fn test_flatten_without_values_fails() {
        let mut set = ObservationSet::new();
        let no_values = ObservationGrid::new(vec![0.0], vec![0.0], vec![0.0], None).unwrap();
        set.insert(FieldComponent::Gz, no_values);
        assert_eq!(set.flatten().unwrap_err(), GravinvError::MissingObservedValues);
    }

    #[test]
    fn test_insert_named_rejects_unknown_key() {
        let mut set = ObservationSet::new();
        let err = set.insert_named("foo", grid(vec![1.0])).unwrap_err();
        assert_eq!(err, GravinvError::InvalidComponent("foo".to_string()));
    }

    #[test]
    fn test_ragged_grid_is_rejected() {
        let err = ObservationGrid::new(vec![0.0, 1.0], vec![0.0], vec![0.0, 1.0], None).unwrap_err();
        assert_eq!(err, GravinvError::RaggedObservationGrid { x: 2, y: 1, z: 2 });
    }

    #[test]
    fn test_unflatten_length_check() {
        let mut set = ObservationSet::new();
        set.insert(FieldComponent::Gz, grid(vec![1.0, 2.0]));
        let err = set.unflatten(&DVector::from_vec(vec![1.0])).unwrap_err();
        assert_eq!(err, GravinvError::DimensionMismatch { expected: 2, found: 1 });
    }
}
