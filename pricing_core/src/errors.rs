//! # Error Types
//!
//! Structured error types for pricing_core. Every error aborts the whole
//! calculation; there is no partial price. Errors serialize to JSON so the
//! caller (UI, RPC host, CLI) can show the failing field and reason.
//!
//! ## Example
//!
//! ```rust
//! use pricing_core::errors::{PricingError, PricingResult};
//!
//! fn require_width(width_cm: Option<f64>) -> PricingResult<f64> {
//!     width_cm.ok_or_else(|| PricingError::schema_violation("fabric.width_cm", "Fabric width is required"))
//! }
//!
//! assert!(require_width(None).is_err());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for pricing_core operations
pub type PricingResult<T> = Result<T, PricingError>;

/// Structured error type for pricing and BOM operations.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "details")]
pub enum PricingError {
    /// A required contract field is absent or unusable. Never defaulted.
    #[error("Schema violation on '{field}': {reason}")]
    SchemaViolation { field: String, reason: String },

    /// A length field does not carry its `_mm`/`_cm` unit suffix
    #[error("Unit mismatch on '{field}': {reason}")]
    UnitMismatch { field: String, reason: String },

    /// Treatment category has no calculation path
    #[error("Unsupported treatment category: {category}")]
    UnsupportedTreatment { category: String },

    /// Requested size falls outside every tier of the grid
    #[error("Pricing grid '{grid_id}' has no price for width {width} x drop {drop}")]
    GridLookupMiss { grid_id: String, width: f64, drop: f64 },

    /// Fabric was rotated but does not allow railroading
    #[error("Fabric '{fabric}' cannot be railroaded")]
    RailroadingNotSupported { fabric: String },

    /// Stored formula was rejected or failed to evaluate
    #[error("Formula error in '{formula}': {reason}")]
    FormulaEvaluation { formula: String, reason: String },

    /// Pricing rule payload is malformed
    #[error("Invalid pricing rule '{rule_id}': {reason}")]
    InvalidPricingRule { rule_id: String, reason: String },

    /// The data layer failed to supply a contract
    #[error("Catalog error during {operation}: {reason}")]
    CatalogError { operation: String, reason: String },

    /// File I/O error
    #[error("File error: {operation} on '{path}' - {reason}")]
    FileError {
        operation: String,
        path: String,
        reason: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {reason}")]
    SerializationError { reason: String },

    /// Catalog schema version mismatch
    #[error("Version mismatch: file version {file_version}, expected {expected_version}")]
    VersionMismatch {
        file_version: String,
        expected_version: String,
    },
}

impl PricingError {
    /// Create a SchemaViolation error
    pub fn schema_violation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        PricingError::SchemaViolation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a UnitMismatch error
    pub fn unit_mismatch(field: impl Into<String>, reason: impl Into<String>) -> Self {
        PricingError::UnitMismatch {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an UnsupportedTreatment error
    pub fn unsupported_treatment(category: impl Into<String>) -> Self {
        PricingError::UnsupportedTreatment {
            category: category.into(),
        }
    }

    /// Create a GridLookupMiss error
    pub fn grid_lookup_miss(grid_id: impl Into<String>, width: f64, drop: f64) -> Self {
        PricingError::GridLookupMiss {
            grid_id: grid_id.into(),
            width,
            drop,
        }
    }

    /// Create a FormulaEvaluation error
    pub fn formula(formula: impl Into<String>, reason: impl Into<String>) -> Self {
        PricingError::FormulaEvaluation {
            formula: formula.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidPricingRule error
    pub fn invalid_rule(rule_id: impl Into<String>, reason: impl Into<String>) -> Self {
        PricingError::InvalidPricingRule {
            rule_id: rule_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a CatalogError
    pub fn catalog(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        PricingError::CatalogError {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a FileError
    pub fn file_error(operation: impl Into<String>, path: impl Into<String>, reason: impl Into<String>) -> Self {
        PricingError::FileError {
            operation: operation.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Check if this is a recoverable error (e.g., can retry)
    ///
    /// Contract errors need corrected input; only a failed catalog read
    /// may succeed on resubmission.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PricingError::CatalogError { .. })
    }

    /// Get a short error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            PricingError::SchemaViolation { .. } => "SCHEMA_VIOLATION",
            PricingError::UnitMismatch { .. } => "UNIT_MISMATCH",
            PricingError::UnsupportedTreatment { .. } => "UNSUPPORTED_TREATMENT",
            PricingError::GridLookupMiss { .. } => "GRID_LOOKUP_MISS",
            PricingError::RailroadingNotSupported { .. } => "RAILROADING_NOT_SUPPORTED",
            PricingError::FormulaEvaluation { .. } => "FORMULA_EVALUATION",
            PricingError::InvalidPricingRule { .. } => "INVALID_PRICING_RULE",
            PricingError::CatalogError { .. } => "CATALOG_ERROR",
            PricingError::FileError { .. } => "FILE_ERROR",
            PricingError::SerializationError { .. } => "SERIALIZATION_ERROR",
            PricingError::VersionMismatch { .. } => "VERSION_MISMATCH",
        }
    }
}

impl From<serde_json::Error> for PricingError {
    fn from(err: serde_json::Error) -> Self {
        PricingError::SerializationError {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let error = PricingError::grid_lookup_miss("grid-7", 500.0, 500.0);
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("GridLookupMiss"));
        let roundtrip: PricingError = serde_json::from_str(&json).unwrap();
        assert_eq!(error, roundtrip);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(PricingError::schema_violation("x", "y").error_code(), "SCHEMA_VIOLATION");
        assert_eq!(PricingError::unsupported_treatment("igloo").error_code(), "UNSUPPORTED_TREATMENT");
        assert_eq!(
            PricingError::RailroadingNotSupported { fabric: "Linen".into() }.error_code(),
            "RAILROADING_NOT_SUPPORTED"
        );
    }

    #[test]
    fn test_only_catalog_errors_are_recoverable() {
        assert!(PricingError::catalog("fetch_grids", "timeout").is_recoverable());
        assert!(!PricingError::formula("a +", "unexpected end").is_recoverable());
    }

    #[test]
    fn test_display_message() {
        let err = PricingError::unit_mismatch("rail_width", "missing _mm or _cm suffix");
        assert_eq!(
            err.to_string(),
            "Unit mismatch on 'rail_width': missing _mm or _cm suffix"
        );
    }
}
