//! Manufacturing template: hems, waste and how make-up is charged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{require, require_non_negative, require_positive, PricingMethod};
use crate::errors::{PricingError, PricingResult};
use crate::units::Centimeters;

/// Template as stored by the data layer.
///
/// ```json
/// {
///   "id": "tpl-pencil-pleat",
///   "name": "Pencil pleat curtain",
///   "header_hem_cm": 8,
///   "bottom_hem_cm": 15,
///   "side_hem_cm": 4,
///   "seam_hem_cm": 1.5,
///   "waste_percent": 5,
///   "pricing_type": "per_running_meter",
///   "default_fullness": 2.5,
///   "manufacturing_price": 18.0,
///   "heading_prices": { "wave": 24.0 }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateContract {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub header_hem_cm: Option<f64>,
    pub bottom_hem_cm: Option<f64>,
    pub side_hem_cm: Option<f64>,
    pub seam_hem_cm: Option<f64>,
    pub waste_percent: Option<f64>,
    pub pricing_type: Option<PricingMethod>,
    pub default_fullness: Option<f64>,
    /// Make-up rate in the unit of `pricing_type`
    #[serde(default)]
    pub manufacturing_price: Option<f64>,
    #[serde(default)]
    pub pricing_grid_id: Option<String>,
    /// Heading id -> make-up rate replacing `manufacturing_price`
    #[serde(default)]
    pub heading_prices: BTreeMap<String, f64>,
}

/// Hem allowances in centimeters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hems {
    pub header: Centimeters,
    pub bottom: Centimeters,
    pub side: Centimeters,
    pub seam: Centimeters,
}

/// Validated template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub hems: Hems,
    pub waste_percent: f64,
    pub pricing_type: PricingMethod,
    pub default_fullness: f64,
    pub manufacturing_price: Option<f64>,
    pub pricing_grid_id: Option<String>,
    pub heading_prices: BTreeMap<String, f64>,
}

impl TemplateContract {
    /// Validate every manufacturing value. Nothing is defaulted.
    pub fn validate(&self) -> PricingResult<Template> {
        let hems = Hems {
            header: Centimeters(require_non_negative("template.header_hem_cm", self.header_hem_cm)?),
            bottom: Centimeters(require_non_negative("template.bottom_hem_cm", self.bottom_hem_cm)?),
            side: Centimeters(require_non_negative("template.side_hem_cm", self.side_hem_cm)?),
            seam: Centimeters(require_non_negative("template.seam_hem_cm", self.seam_hem_cm)?),
        };
        let waste_percent = require_non_negative("template.waste_percent", self.waste_percent)?;
        let pricing_type = require("template.pricing_type", self.pricing_type)?;
        let default_fullness = require_positive("template.default_fullness", self.default_fullness)?;
        if default_fullness < 1.0 {
            return Err(PricingError::schema_violation(
                "template.default_fullness",
                "fullness ratio must be at least 1.0",
            ));
        }

        match pricing_type {
            PricingMethod::PricingGrid => {
                require("template.pricing_grid_id", self.pricing_grid_id.as_ref())?;
            }
            _ => {
                require_non_negative("template.manufacturing_price", self.manufacturing_price)?;
            }
        }
        for (heading, price) in &self.heading_prices {
            if !price.is_finite() || *price < 0.0 {
                return Err(PricingError::schema_violation(
                    format!("template.heading_prices.{}", heading),
                    "heading price must be a non-negative number",
                ));
            }
        }

        Ok(Template {
            id: self.id.clone().unwrap_or_default(),
            name: self.name.clone().unwrap_or_default(),
            hems,
            waste_percent,
            pricing_type,
            default_fullness,
            manufacturing_price: self.manufacturing_price,
            pricing_grid_id: self.pricing_grid_id.clone(),
            heading_prices: self.heading_prices.clone(),
        })
    }
}

impl Template {
    /// Make-up rate, honouring a heading-specific override.
    ///
    /// Returns the rate and the heading id that supplied it, if any.
    pub fn manufacturing_rate(&self, heading_id: Option<&str>) -> (Option<f64>, Option<String>) {
        if let Some(heading) = heading_id {
            if let Some(price) = self.heading_prices.get(heading) {
                return (Some(*price), Some(heading.to_string()));
            }
        }
        (self.manufacturing_price, None)
    }

    /// Multiplier applied to quantities for waste
    pub fn waste_factor(&self) -> f64 {
        1.0 + self.waste_percent / 100.0
    }
}
