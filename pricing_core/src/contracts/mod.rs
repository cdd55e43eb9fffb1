//! # Input Contracts
//!
//! Wire types supplied by the data layer and the UI, and the validated forms
//! the calculators consume.
//!
//! Wire contracts keep manufacturing fields as `Option` so that an absent
//! value is reported as a named `SchemaViolation` rather than a generic
//! deserialization failure. Validation is always `StrictContract`: nothing in
//! this module substitutes a default for a missing manufacturing value.
//!
//! - [`measurements`] - rail width, drop, returns, rotation (mm on the wire)
//! - [`template`] - hems, waste, pricing type, heading overrides (cm)
//! - [`fabric`] - fabric and material width, pricing, repeat, railroading
//! - [`options`] - selected add-on options

pub mod fabric;
pub mod measurements;
pub mod options;
pub mod template;

pub use fabric::{Fabric, FabricContract, MaterialContract};
pub use measurements::{MeasurementsContract, MountType, NormalizedMeasurements, PanelConfiguration, Side};
pub use options::{OptionPricingMethod, SelectedOption, SelectedOptionContract};
pub use template::{Hems, Template, TemplateContract};

use serde::{Deserialize, Serialize};

use crate::errors::{PricingError, PricingResult};

/// How a fabric, material or manufacturing charge is priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingMethod {
    /// Price per running (linear) meter
    #[serde(alias = "per_metre", alias = "per_linear_meter")]
    PerRunningMeter,
    /// Price per square meter
    #[serde(alias = "per_sqm", alias = "per_square_metre")]
    PerSquareMeter,
    /// Width x drop grid lookup
    #[serde(alias = "grid")]
    PricingGrid,
    /// One fixed price regardless of size
    Fixed,
}

impl PricingMethod {
    pub fn display_name(&self) -> &'static str {
        match self {
            PricingMethod::PerRunningMeter => "per running meter",
            PricingMethod::PerSquareMeter => "per square meter",
            PricingMethod::PricingGrid => "pricing grid",
            PricingMethod::Fixed => "fixed price",
        }
    }
}

/// Unwrap a required contract field or report it as a schema violation.
pub fn require<T>(field: &str, value: Option<T>) -> PricingResult<T> {
    value.ok_or_else(|| PricingError::schema_violation(field, "required field is missing"))
}

/// Unwrap a required non-negative finite number.
pub fn require_non_negative(field: &str, value: Option<f64>) -> PricingResult<f64> {
    let v = require(field, value)?;
    if !v.is_finite() || v < 0.0 {
        return Err(PricingError::schema_violation(
            field,
            format!("must be a non-negative number, got {}", v),
        ));
    }
    Ok(v)
}

/// Unwrap a required strictly positive finite number.
pub fn require_positive(field: &str, value: Option<f64>) -> PricingResult<f64> {
    let v = require(field, value)?;
    if !v.is_finite() || v <= 0.0 {
        return Err(PricingError::schema_violation(
            field,
            format!("must be a positive number, got {}", v),
        ));
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pricing_method_aliases() {
        let m: PricingMethod = serde_json::from_str("\"per_metre\"").unwrap();
        assert_eq!(m, PricingMethod::PerRunningMeter);
        let m: PricingMethod = serde_json::from_str("\"grid\"").unwrap();
        assert_eq!(m, PricingMethod::PricingGrid);
    }

    #[test]
    fn test_require_helpers() {
        assert_eq!(require_positive("width_cm", Some(137.0)).unwrap(), 137.0);
        assert_eq!(
            require_positive("width_cm", None).unwrap_err().error_code(),
            "SCHEMA_VIOLATION"
        );
        assert!(require_positive("width_cm", Some(0.0)).is_err());
        assert_eq!(require_non_negative("seam_hem_cm", Some(0.0)).unwrap(), 0.0);
        assert!(require_non_negative("seam_hem_cm", Some(-1.0)).is_err());
    }
}
