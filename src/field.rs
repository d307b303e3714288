//! # Measurable gravity-field components
//!
//! The component set is closed and fixed: the vertical gravity `gz` and the six
//! independent entries of the gravity gradient tensor. Dispatching on
//! [`FieldComponent`] replaces the runtime name → kernel dictionary of older
//! designs with a compile-time table.
//!
//! The **canonical order** `gz, gxx, gxy, gxz, gyy, gyz, gzz` is load-bearing:
//! the observed data vector, the Jacobian row blocks, and the predicted-data
//! slicing all follow it. Reordering breaks the row correspondence.

use std::fmt;
use std::str::FromStr;

use crate::gravinv_errors::GravinvError;

/// One of the seven measurable gravity-field components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldComponent {
    /// Vertical gravity (mGal)
    Gz,
    /// Gradient tensor xx entry (Eötvös)
    Gxx,
    /// Gradient tensor xy entry (Eötvös)
    Gxy,
    /// Gradient tensor xz entry (Eötvös)
    Gxz,
    /// Gradient tensor yy entry (Eötvös)
    Gyy,
    /// Gradient tensor yz entry (Eötvös)
    Gyz,
    /// Gradient tensor zz entry (Eötvös)
    Gzz,
}

impl FieldComponent {
    /// All components in canonical order.
    pub const ALL: [FieldComponent; 7] = [
        FieldComponent::Gz,
        FieldComponent::Gxx,
        FieldComponent::Gxy,
        FieldComponent::Gxz,
        FieldComponent::Gyy,
        FieldComponent::Gyz,
        FieldComponent::Gzz,
    ];

    /// The component's conventional lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldComponent::Gz => "gz",
            FieldComponent::Gxx => "gxx",
            FieldComponent::Gxy => "gxy",
            FieldComponent::Gxz => "gxz",
            FieldComponent::Gyy => "gyy",
            FieldComponent::Gyz => "gyz",
            FieldComponent::Gzz => "gzz",
        }
    }
}

impl fmt::Display for FieldComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FieldComponent {
    type Err = GravinvError;

    /// Parse a component from its conventional name.
    ///
    /// Unrecognized names fail with [`GravinvError::InvalidComponent`], the
    /// first validation gate for externally supplied observation keys.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gz" => Ok(FieldComponent::Gz),
            "gxx" => Ok(FieldComponent::Gxx),
            "gxy" => Ok(FieldComponent::Gxy),
            "gxz" => Ok(FieldComponent::Gxz),
            "gyy" => Ok(FieldComponent::Gyy),
            "gyz" => Ok(FieldComponent::Gyz),
            "gzz" => Ok(FieldComponent::Gzz),
            other => Err(GravinvError::InvalidComponent(other.to_string())),
        }
    }
}

#[cfg(test)]
mod field_test {
    use super::*;

    #[test]
    fn test_canonical_order_round_trip() {
        for component in FieldComponent::ALL {
            assert_eq!(component.as_str().parse::<FieldComponent>(), Ok(component));
        }
    }

    #[test]
    fn test_unknown_component_is_rejected() {
        let err = "foo".parse::<FieldComponent>().unwrap_err();
        assert_eq!(err, GravinvError::InvalidComponent("foo".to_string()));
    }

    #[test]
    fn test_canonical_order_is_sorted() {
        let mut sorted = FieldComponent::ALL;
        sorted.sort();
        assert_eq!(sorted, FieldComponent::ALL);
    }
}
