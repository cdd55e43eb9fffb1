//! # Engine Settings
//!
//! Configuration that is fixed per deployment rather than per request:
//! the measurement defaults allowed at the `calc_bom_and_price` boundary and
//! the bounds placed on stored formulas.
//!
//! Settings serialize to JSON and can be overlaid from environment variables:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `PRICING_DEFAULT_RAIL_WIDTH_MM` | `boundary_defaults.rail_width_mm` |
//! | `PRICING_DEFAULT_DROP_MM` | `boundary_defaults.drop_mm` |
//! | `PRICING_FORMULA_MAX_LEN` | `formula_limits.max_length` |
//! | `PRICING_FORMULA_MAX_DEPTH` | `formula_limits.max_depth` |

use serde::{Deserialize, Serialize};

use crate::errors::{PricingError, PricingResult};

/// How strictly an input is validated.
///
/// Contracts from the data layer (templates, fabrics, materials) are always
/// `StrictContract`: a missing field is a `SchemaViolation`. Only raw user
/// state at the BOM boundary is read `UserInputWithDefaults`, where a fixed
/// set of measurement fields may be filled from [`BoundaryDefaults`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationMode {
    StrictContract,
    UserInputWithDefaults,
}

/// Defaults for measurement fields the user has not entered yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryDefaults {
    pub rail_width_mm: f64,
    pub drop_mm: f64,
    pub panel_count: f64,
}

impl Default for BoundaryDefaults {
    fn default() -> Self {
        BoundaryDefaults {
            rail_width_mm: 1000.0,
            drop_mm: 2000.0,
            panel_count: 1.0,
        }
    }
}

impl BoundaryDefaults {
    /// Default for a state key, if the key is one of the documented set.
    pub fn for_key(&self, key: &str) -> Option<f64> {
        match key {
            "rail_width_mm" => Some(self.rail_width_mm),
            "drop_mm" => Some(self.drop_mm),
            "panel_count" => Some(self.panel_count),
            _ => None,
        }
    }

    /// Keys that may be defaulted
    pub fn keys() -> &'static [&'static str] {
        &["rail_width_mm", "drop_mm", "panel_count"]
    }
}

/// Bounds on stored formulas
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormulaLimits {
    /// Maximum formula length in characters
    pub max_length: usize,
    /// Maximum expression nesting depth
    pub max_depth: usize,
}

impl Default for FormulaLimits {
    fn default() -> Self {
        FormulaLimits {
            max_length: 512,
            max_depth: 32,
        }
    }
}

/// Engine-wide settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default)]
    pub boundary_defaults: BoundaryDefaults,
    #[serde(default)]
    pub formula_limits: FormulaLimits,
}

impl EngineSettings {
    /// Build settings from defaults overlaid with `PRICING_*` environment variables.
    pub fn from_env() -> PricingResult<Self> {
        let mut settings = EngineSettings::default();
        if let Some(v) = env_number("PRICING_DEFAULT_RAIL_WIDTH_MM")? {
            settings.boundary_defaults.rail_width_mm = v;
        }
        if let Some(v) = env_number("PRICING_DEFAULT_DROP_MM")? {
            settings.boundary_defaults.drop_mm = v;
        }
        if let Some(v) = env_count("PRICING_FORMULA_MAX_LEN")? {
            settings.formula_limits.max_length = v;
        }
        if let Some(v) = env_count("PRICING_FORMULA_MAX_DEPTH")? {
            settings.formula_limits.max_depth = v;
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings that would make every calculation fail.
    pub fn validate(&self) -> PricingResult<()> {
        let d = &self.boundary_defaults;
        if d.rail_width_mm <= 0.0 || d.drop_mm <= 0.0 || d.panel_count < 1.0 {
            return Err(PricingError::schema_violation(
                "boundary_defaults",
                "default measurements must be positive",
            ));
        }
        if self.formula_limits.max_length == 0 || self.formula_limits.max_depth == 0 {
            return Err(PricingError::schema_violation(
                "formula_limits",
                "formula limits must be non-zero",
            ));
        }
        Ok(())
    }
}

fn env_number(key: &str) -> PricingResult<Option<f64>> {
    std::env::var(key).ok().map(|raw| parse_number(key, &raw)).transpose()
}

fn env_count(key: &str) -> PricingResult<Option<usize>> {
    std::env::var(key).ok().map(|raw| parse_count(key, &raw)).transpose()
}

fn parse_number(key: &str, raw: &str) -> PricingResult<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| PricingError::schema_violation(key, format!("'{}' is not a non-negative number", raw)))
}

/// Limits are whole counts; `40.9` is an error, not 40.
fn parse_count(key: &str, raw: &str) -> PricingResult<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| PricingError::schema_violation(key, format!("'{}' is not a whole number", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_boundary_values() {
        let defaults = BoundaryDefaults::default();
        assert_eq!(defaults.for_key("rail_width_mm"), Some(1000.0));
        assert_eq!(defaults.for_key("drop_mm"), Some(2000.0));
        assert_eq!(defaults.for_key("fullness"), None);
    }

    #[test]
    fn test_settings_deserialize_partial() {
        let settings: EngineSettings =
            serde_json::from_str(r#"{ "formula_limits": { "max_length": 64, "max_depth": 4 } }"#).unwrap();
        assert_eq!(settings.formula_limits.max_length, 64);
        assert_eq!(settings.boundary_defaults, BoundaryDefaults::default());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut settings = EngineSettings::default();
        settings.formula_limits.max_depth = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_limit_variables_must_be_whole_numbers() {
        assert_eq!(parse_count("PRICING_FORMULA_MAX_LEN", " 256 ").unwrap(), 256);
        for raw in ["40.9", "1e3", "-4", "lots"] {
            let err = parse_count("PRICING_FORMULA_MAX_DEPTH", raw).unwrap_err();
            assert_eq!(err.error_code(), "SCHEMA_VIOLATION", "{}", raw);
            assert!(err.to_string().contains("PRICING_FORMULA_MAX_DEPTH"));
        }
        assert_eq!(parse_number("PRICING_DEFAULT_DROP_MM", "2100.5").unwrap(), 2100.5);
        assert!(parse_number("PRICING_DEFAULT_DROP_MM", "-1").is_err());
    }
}
