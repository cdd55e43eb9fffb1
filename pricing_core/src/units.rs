//! # Unit Types
//!
//! Type-safe wrappers for the length units that meet in a treatment
//! calculation, plus the unit normalizer that reconciles them.
//!
//! ## Working Unit
//!
//! Measurements arrive from the UI and storage in millimeters; templates,
//! fabrics and pricing grids are authored in centimeters. Every calculation
//! converts to **centimeters** first and never mixes units inside a formula.
//! Meters and feet only appear at the edges (display, hardware bundles).
//!
//! The field-name suffix is the unit contract: `rail_width_mm` is millimeters,
//! `header_hem_cm` is centimeters. A length without either suffix is rejected.
//!
//! ## Example
//!
//! ```rust
//! use pricing_core::units::{normalize_length, Centimeters, Millimeters};
//!
//! let width: Centimeters = Millimeters(2000.0).into();
//! assert_eq!(width.0, 200.0);
//!
//! let drop = normalize_length("drop_mm", 2500.0).unwrap();
//! assert_eq!(drop.0, 250.0);
//! assert!(normalize_length("drop", 2500.0).is_err());
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Sub};

use crate::errors::{PricingError, PricingResult};

// ============================================================================
// Length Units
// ============================================================================

/// Length in millimeters
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Millimeters(pub f64);

/// Length in centimeters (the working unit)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Centimeters(pub f64);

/// Length in meters (display and per-meter pricing)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Meters(pub f64);

/// Length in feet (hardware bundle rules are authored in feet)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Feet(pub f64);

/// Area in square meters
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SquareMeters(pub f64);

const CM_PER_FOOT: f64 = 30.48;

impl From<Millimeters> for Centimeters {
    fn from(mm: Millimeters) -> Self {
        Centimeters(mm.0 / 10.0)
    }
}

impl From<Centimeters> for Millimeters {
    fn from(cm: Centimeters) -> Self {
        Millimeters(cm.0 * 10.0)
    }
}

impl From<Centimeters> for Meters {
    fn from(cm: Centimeters) -> Self {
        Meters(cm.0 / 100.0)
    }
}

impl From<Meters> for Centimeters {
    fn from(m: Meters) -> Self {
        Centimeters(m.0 * 100.0)
    }
}

impl From<Centimeters> for Feet {
    fn from(cm: Centimeters) -> Self {
        Feet(cm.0 / CM_PER_FOOT)
    }
}

impl From<Feet> for Centimeters {
    fn from(ft: Feet) -> Self {
        Centimeters(ft.0 * CM_PER_FOOT)
    }
}

impl Centimeters {
    /// Area of a width x drop rectangle, both in centimeters
    pub fn area_with(self, other: Centimeters) -> SquareMeters {
        SquareMeters(self.0 * other.0 / 10_000.0)
    }
}

/// Centimeters as meters, for display
pub fn display_meters(cm: Centimeters) -> Meters {
    cm.into()
}

/// Centimeters as feet, for hardware bundle contexts
pub fn feet_from_cm(cm: Centimeters) -> Feet {
    cm.into()
}

// ============================================================================
// Arithmetic Implementations (macro to reduce boilerplate)
// ============================================================================

macro_rules! impl_arithmetic {
    ($type:ty) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Div<f64> for $type {
            type Output = Self;
            fn div(self, rhs: f64) -> Self::Output {
                Self(self.0 / rhs)
            }
        }

        impl $type {
            /// Get the raw f64 value
            pub fn value(self) -> f64 {
                self.0
            }
        }
    };
}

impl_arithmetic!(Millimeters);
impl_arithmetic!(Centimeters);
impl_arithmetic!(Meters);
impl_arithmetic!(Feet);
impl_arithmetic!(SquareMeters);

// ============================================================================
// Unit Normalizer
// ============================================================================

/// Unit declared by a field-name suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LengthUnit {
    Millimeters,
    Centimeters,
}

impl LengthUnit {
    /// Read the unit from a field name's suffix.
    pub fn from_field_name(field: &str) -> PricingResult<Self> {
        if field.ends_with("_mm") {
            Ok(LengthUnit::Millimeters)
        } else if field.ends_with("_cm") {
            Ok(LengthUnit::Centimeters)
        } else {
            Err(PricingError::unit_mismatch(
                field,
                "length fields must be named with a _mm or _cm suffix",
            ))
        }
    }
}

/// Normalize a named length to centimeters.
///
/// Fails with `UnitMismatch` if the name carries no unit suffix, and with
/// `SchemaViolation` if the value is not a finite number.
pub fn normalize_length(field: &str, value: f64) -> PricingResult<Centimeters> {
    let unit = LengthUnit::from_field_name(field)?;
    if !value.is_finite() {
        return Err(PricingError::schema_violation(field, "length must be a finite number"));
    }
    Ok(match unit {
        LengthUnit::Millimeters => Millimeters(value).into(),
        LengthUnit::Centimeters => Centimeters(value),
    })
}

/// Normalize an optional named length; absent means zero length.
pub fn normalize_optional_length(field: &str, value: Option<f64>) -> PricingResult<Centimeters> {
    match value {
        Some(v) => normalize_length(field, v),
        None => {
            LengthUnit::from_field_name(field)?;
            Ok(Centimeters(0.0))
        }
    }
}

// ============================================================================
// Rounding
// ============================================================================

/// Round a monetary amount to 2 decimals (applied at emission only)
pub fn round_money(amount: f64) -> f64 {
    round_to(amount, 2)
}

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mm_to_cm() {
        let cm: Centimeters = Millimeters(2000.0).into();
        assert_eq!(cm.0, 200.0);
    }

    #[test]
    fn test_mm_cm_mm_roundtrip() {
        for value in [0.0, 1.0, 12.5, 999.9, 2000.0, 3333.3333, 123_456.789] {
            let cm: Centimeters = Millimeters(value).into();
            let back: Millimeters = cm.into();
            assert!((back.0 - value).abs() < 1e-9, "roundtrip drifted for {}", value);
        }
    }

    #[test]
    fn test_feet_conversion() {
        let ft: Feet = Centimeters(304.8).into();
        assert!((ft.0 - 10.0).abs() < 1e-9);
        assert!((feet_from_cm(Centimeters(304.8)).0 - 10.0).abs() < 1e-9);
        assert_eq!(display_meters(Centimeters(273.0)), Meters(2.73));
    }

    #[test]
    fn test_normalize_respects_suffix() {
        assert_eq!(normalize_length("drop_mm", 2500.0).unwrap(), Centimeters(250.0));
        assert_eq!(normalize_length("header_hem_cm", 8.0).unwrap(), Centimeters(8.0));
    }

    #[test]
    fn test_normalize_rejects_missing_suffix() {
        let err = normalize_length("rail_width", 1000.0).unwrap_err();
        assert_eq!(err.error_code(), "UNIT_MISMATCH");
        assert!(normalize_optional_length("pooling", None).is_err());
    }

    #[test]
    fn test_normalize_rejects_nan() {
        let err = normalize_length("drop_mm", f64::NAN).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_VIOLATION");
    }

    #[test]
    fn test_round_money() {
        assert_eq!(round_money(10.005_1), 10.01);
        assert_eq!(round_money(2.2000000000000002), 2.2);
    }

    #[test]
    fn test_area() {
        let area = Centimeters(200.0).area_with(Centimeters(150.0));
        assert!((area.0 - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_serialization() {
        let cm = Centimeters(137.0);
        let json = serde_json::to_string(&cm).unwrap();
        assert_eq!(json, "137.0");
    }
}
