//! Measurement snapshot for one treatment.

use serde::{Deserialize, Serialize};

use super::require_positive;
use crate::errors::{PricingError, PricingResult};
use crate::units::{normalize_length, normalize_optional_length, Centimeters};

/// Single panel or a pair of panels (split draw)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelConfiguration {
    #[default]
    Single,
    Pair,
}

impl PanelConfiguration {
    pub fn panel_count(self) -> u32 {
        match self {
            PanelConfiguration::Single => 1,
            PanelConfiguration::Pair => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
    Center,
}

/// How the hardware is fixed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountType {
    #[default]
    Wall,
    Ceiling,
}

/// Measurements as entered in the UI (millimeters).
///
/// ```json
/// {
///   "rail_width_mm": 2000,
///   "drop_mm": 2500,
///   "fullness": 2.5,
///   "return_left_mm": 0,
///   "return_right_mm": 0,
///   "fabric_rotated": false,
///   "panel_configuration": "pair"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementsContract {
    pub rail_width_mm: Option<f64>,
    pub drop_mm: Option<f64>,
    /// Overrides the template's default fullness
    #[serde(default)]
    pub fullness: Option<f64>,
    #[serde(default)]
    pub return_left_mm: Option<f64>,
    #[serde(default)]
    pub return_right_mm: Option<f64>,
    /// Extra drop that puddles on the floor
    #[serde(default)]
    pub pooling_mm: Option<f64>,
    #[serde(default)]
    pub fabric_rotated: bool,
    #[serde(default)]
    pub panel_configuration: PanelConfiguration,
    #[serde(default)]
    pub stack_side: Option<Side>,
    #[serde(default)]
    pub control_side: Option<Side>,
    #[serde(default)]
    pub mount_type: MountType,
    #[serde(default)]
    pub heading_id: Option<String>,
}

/// Measurements converted to centimeters and checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMeasurements {
    pub width: Centimeters,
    /// Finished drop including pooling
    pub drop: Centimeters,
    pub returns: Centimeters,
    pub fullness: Option<f64>,
    pub fabric_rotated: bool,
    pub panel_configuration: PanelConfiguration,
    pub mount_type: MountType,
    pub heading_id: Option<String>,
}

impl MeasurementsContract {
    /// Convenience constructor for the two required lengths
    pub fn new(rail_width_mm: f64, drop_mm: f64) -> Self {
        MeasurementsContract {
            rail_width_mm: Some(rail_width_mm),
            drop_mm: Some(drop_mm),
            ..Default::default()
        }
    }

    /// Convert every length to centimeters and validate.
    pub fn normalize(&self) -> PricingResult<NormalizedMeasurements> {
        let width = normalize_length("rail_width_mm", require_positive("rail_width_mm", self.rail_width_mm)?)?;
        let drop = normalize_length("drop_mm", require_positive("drop_mm", self.drop_mm)?)?;
        let returns = normalize_optional_length("return_left_mm", self.return_left_mm)?
            + normalize_optional_length("return_right_mm", self.return_right_mm)?;
        let pooling = normalize_optional_length("pooling_mm", self.pooling_mm)?;

        if returns.0 < 0.0 || pooling.0 < 0.0 {
            return Err(PricingError::schema_violation(
                "returns/pooling",
                "returns and pooling cannot be negative",
            ));
        }
        if let Some(f) = self.fullness {
            if !f.is_finite() || f < 1.0 {
                return Err(PricingError::schema_violation(
                    "fullness",
                    format!("fullness ratio must be at least 1.0, got {}", f),
                ));
            }
        }

        Ok(NormalizedMeasurements {
            width,
            drop: drop + pooling,
            returns,
            fullness: self.fullness,
            fabric_rotated: self.fabric_rotated,
            panel_configuration: self.panel_configuration,
            mount_type: self.mount_type,
            heading_id: self.heading_id.clone(),
        })
    }
}
