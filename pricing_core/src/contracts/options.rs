//! Selected add-on options (linings, motorisation, tie-backs, ...).

use serde::{Deserialize, Serialize};

use super::{require, require_non_negative};
use crate::errors::PricingResult;

/// How an option's price applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionPricingMethod {
    /// One flat amount
    #[serde(alias = "fixed")]
    Flat,
    /// Amount per meter of rail width
    #[serde(alias = "per_metre")]
    PerMeter,
    /// Amount per square meter of finished size
    #[serde(alias = "per_sqm")]
    PerSquareMeter,
    /// Percent of fabric + material + manufacturing
    PercentageOfBase,
    /// Percent of fabric cost only
    PercentageOfFabric,
    /// Percent of base plus all flat-priced options
    PercentageOfTotal,
}

impl OptionPricingMethod {
    /// Percentage options depend on first-pass totals
    pub fn is_percentage(self) -> bool {
        matches!(
            self,
            OptionPricingMethod::PercentageOfBase
                | OptionPricingMethod::PercentageOfFabric
                | OptionPricingMethod::PercentageOfTotal
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectedOptionContract {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub price: Option<f64>,
    pub pricing_method: Option<OptionPricingMethod>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedOption {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub pricing_method: OptionPricingMethod,
}

impl SelectedOptionContract {
    pub fn validate(&self, index: usize) -> PricingResult<SelectedOption> {
        let prefix = format!("options[{}]", index);
        Ok(SelectedOption {
            id: self.id.clone().unwrap_or_else(|| prefix.clone()),
            name: self.name.clone().unwrap_or_else(|| prefix.clone()),
            price: require_non_negative(&format!("{}.price", prefix), self.price)?,
            pricing_method: require(&format!("{}.pricing_method", prefix), self.pricing_method)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_validation() {
        let opt: SelectedOptionContract =
            serde_json::from_str(r#"{ "name": "Blackout lining", "price": 10, "pricing_method": "percentage_of_fabric" }"#)
                .unwrap();
        let valid = opt.validate(0).unwrap();
        assert!(valid.pricing_method.is_percentage());
        assert_eq!(valid.id, "options[0]");
    }

    #[test]
    fn test_option_missing_price() {
        let opt = SelectedOptionContract {
            name: Some("Tie-back".into()),
            pricing_method: Some(OptionPricingMethod::Flat),
            ..Default::default()
        };
        let err = opt.validate(3).unwrap_err();
        assert!(err.to_string().contains("options[3].price"));
    }
}
