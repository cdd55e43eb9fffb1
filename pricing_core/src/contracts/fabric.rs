//! Fabric and material contracts.

use serde::{Deserialize, Serialize};

use super::{require, require_non_negative, require_positive, PricingMethod};
use crate::errors::PricingResult;
use crate::units::Centimeters;

/// Fabric (or material) as stored by the data layer.
///
/// ```json
/// {
///   "id": "fab-linen-natural",
///   "name": "Natural Linen",
///   "width_cm": 137,
///   "pricing_method": "per_running_meter",
///   "price": 42.5,
///   "pattern_repeat_cm": 0,
///   "railroading_allowed": false
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FabricContract {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub width_cm: Option<f64>,
    pub pricing_method: Option<PricingMethod>,
    #[serde(default)]
    pub price: Option<f64>,
    /// Direct grid reference, wins over `price_group`
    #[serde(default)]
    pub pricing_grid_id: Option<String>,
    #[serde(default)]
    pub price_group: Option<String>,
    #[serde(default)]
    pub pattern_repeat_cm: Option<f64>,
    #[serde(default)]
    pub railroading_allowed: bool,
}

/// Materials (slats, vanes, shutter panels) share the fabric wire shape.
pub type MaterialContract = FabricContract;

/// Validated fabric or material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fabric {
    pub id: String,
    pub name: String,
    pub width: Centimeters,
    pub pricing_method: PricingMethod,
    pub price: Option<f64>,
    pub pricing_grid_id: Option<String>,
    pub price_group: Option<String>,
    pub pattern_repeat: Centimeters,
    pub railroading_allowed: bool,
}

impl FabricContract {
    /// Validate under `label` ("fabric" or "material") for error paths.
    pub fn validate(&self, label: &str) -> PricingResult<Fabric> {
        let width = require_positive(&format!("{}.width_cm", label), self.width_cm)?;
        let pricing_method = require(&format!("{}.pricing_method", label), self.pricing_method)?;
        let price = match pricing_method {
            PricingMethod::PricingGrid => {
                if self.pricing_grid_id.is_none() {
                    require(&format!("{}.price_group", label), self.price_group.as_ref())?;
                }
                None
            }
            _ => Some(require_non_negative(&format!("{}.price", label), self.price)?),
        };
        let pattern_repeat = match self.pattern_repeat_cm {
            Some(v) => require_non_negative(&format!("{}.pattern_repeat_cm", label), Some(v))?,
            None => 0.0,
        };

        Ok(Fabric {
            id: self.id.clone().unwrap_or_default(),
            name: self.name.clone().unwrap_or_else(|| label.to_string()),
            width: Centimeters(width),
            pricing_method,
            price,
            pricing_grid_id: self.pricing_grid_id.clone(),
            price_group: self.price_group.clone(),
            pattern_repeat: Centimeters(pattern_repeat),
            railroading_allowed: self.railroading_allowed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linen() -> FabricContract {
        FabricContract {
            id: Some("fab-1".into()),
            name: Some("Linen".into()),
            width_cm: Some(137.0),
            pricing_method: Some(PricingMethod::PerRunningMeter),
            price: Some(42.5),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_fabric() {
        let f = linen().validate("fabric").unwrap();
        assert_eq!(f.width, Centimeters(137.0));
        assert_eq!(f.pattern_repeat, Centimeters(0.0));
        assert_eq!(f.price, Some(42.5));
    }

    #[test]
    fn test_missing_width_names_field() {
        let mut f = linen();
        f.width_cm = None;
        let err = f.validate("material").unwrap_err();
        assert!(err.to_string().contains("material.width_cm"));
    }

    #[test]
    fn test_grid_fabric_needs_grid_or_group() {
        let mut f = linen();
        f.pricing_method = Some(PricingMethod::PricingGrid);
        f.price = None;
        assert!(f.validate("fabric").is_err());
        f.price_group = Some("B".into());
        assert!(f.validate("fabric").is_ok());
    }
}
