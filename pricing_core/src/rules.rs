//! # Pricing Rule Applicator
//!
//! Layers organisation pricing rules over a BOM's materials and labor:
//!
//! | `rule_type` | Effect |
//! |-------------|--------|
//! | `markup_percentage` | adds `percentage`% of materials + labor |
//! | `fixed_fee` | adds `amount` |
//! | `per_panel` | adds `amount` x panel count |
//! | `ladder` | adds the `price` of the first tier whose inclusive width/drop range contains the size |
//!
//! `total = materials + labor + fees + markup`. Markup is computed on
//! materials + labor only; fees are never marked up.
//!
//! Rules arrive as loosely-typed JSON. [`parse_rules`] rejects the first
//! malformed rule; [`parse_rules_lenient`] (used only at the BOM boundary)
//! logs and skips it, returning what was skipped so the caller can see it.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{PricingError, PricingResult};
use crate::units::round_money;

/// Pricing rule as stored
///
/// ```json
/// { "id": "r1", "rule_type": "ladder", "tiers": [
///     { "min_width_mm": 0, "max_width_mm": 1000, "price": 10 },
///     { "min_width_mm": 1001, "max_width_mm": 2000, "price": 20 }
/// ] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingRuleContract {
    pub id: String,
    pub rule_type: String,
    /// Restrict to one window type
    #[serde(default)]
    pub window_type_id: Option<String>,
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// One ladder step. Bounds are inclusive; an absent drop range matches any drop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadderTier {
    pub min_width_mm: f64,
    pub max_width_mm: f64,
    #[serde(default)]
    pub min_drop_mm: Option<f64>,
    #[serde(default)]
    pub max_drop_mm: Option<f64>,
    pub price: f64,
}

impl LadderTier {
    pub fn contains(&self, width_mm: f64, drop_mm: f64) -> bool {
        let width_ok = width_mm >= self.min_width_mm && width_mm <= self.max_width_mm;
        let drop_ok = self.min_drop_mm.map_or(true, |min| drop_mm >= min)
            && self.max_drop_mm.map_or(true, |max| drop_mm <= max);
        width_ok && drop_ok
    }
}

/// Parsed pricing rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule_type", rename_all = "snake_case")]
pub enum PricingRule {
    MarkupPercentage { id: String, percentage: f64 },
    FixedFee { id: String, amount: f64 },
    PerPanel { id: String, amount: f64 },
    Ladder { id: String, tiers: Vec<LadderTier> },
}

impl PricingRule {
    pub fn id(&self) -> &str {
        match self {
            PricingRule::MarkupPercentage { id, .. }
            | PricingRule::FixedFee { id, .. }
            | PricingRule::PerPanel { id, .. }
            | PricingRule::Ladder { id, .. } => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PricingRule::MarkupPercentage { .. } => "markup_percentage",
            PricingRule::FixedFee { .. } => "fixed_fee",
            PricingRule::PerPanel { .. } => "per_panel",
            PricingRule::Ladder { .. } => "ladder",
        }
    }
}

impl TryFrom<&PricingRuleContract> for PricingRule {
    type Error = PricingError;

    fn try_from(contract: &PricingRuleContract) -> PricingResult<Self> {
        let id = contract.id.clone();
        let number = |key: &str| -> PricingResult<f64> {
            contract
                .params
                .get(key)
                .and_then(serde_json::Value::as_f64)
                .filter(|v| v.is_finite() && *v >= 0.0)
                .ok_or_else(|| PricingError::invalid_rule(&contract.id, format!("'{}' must be a non-negative number", key)))
        };

        match contract.rule_type.as_str() {
            "markup_percentage" => Ok(PricingRule::MarkupPercentage {
                percentage: number("percentage")?,
                id,
            }),
            "fixed_fee" => Ok(PricingRule::FixedFee {
                amount: number("amount")?,
                id,
            }),
            "per_panel" => Ok(PricingRule::PerPanel {
                amount: number("amount")?,
                id,
            }),
            "ladder" => {
                let raw = contract
                    .params
                    .get("tiers")
                    .cloned()
                    .ok_or_else(|| PricingError::invalid_rule(&contract.id, "ladder rule has no 'tiers'"))?;
                let tiers: Vec<LadderTier> = serde_json::from_value(raw)
                    .map_err(|e| PricingError::invalid_rule(&contract.id, format!("malformed tiers: {}", e)))?;
                if tiers.is_empty() {
                    return Err(PricingError::invalid_rule(&contract.id, "ladder rule has no tiers"));
                }
                if let Some(bad) = tiers
                    .iter()
                    .find(|t| t.min_width_mm > t.max_width_mm || t.price < 0.0 || !t.price.is_finite())
                {
                    return Err(PricingError::invalid_rule(
                        &contract.id,
                        format!("tier {}-{} is inverted or negatively priced", bad.min_width_mm, bad.max_width_mm),
                    ));
                }
                Ok(PricingRule::Ladder { id, tiers })
            }
            other => Err(PricingError::invalid_rule(
                &contract.id,
                format!("unknown rule_type '{}'", other),
            )),
        }
    }
}

/// A rule left out of the calculation, reported to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRule {
    pub rule_id: String,
    pub reason: String,
}

/// Parse every rule; the first malformed one aborts.
pub fn parse_rules(contracts: &[PricingRuleContract]) -> PricingResult<Vec<PricingRule>> {
    contracts.iter().map(PricingRule::try_from).collect()
}

/// Parse every rule, logging and skipping malformed ones.
///
/// Only the `calc_bom_and_price` boundary uses this.
pub fn parse_rules_lenient(contracts: &[PricingRuleContract]) -> (Vec<PricingRule>, Vec<SkippedRule>) {
    let mut rules = Vec::with_capacity(contracts.len());
    let mut skipped = Vec::new();
    for contract in contracts {
        match PricingRule::try_from(contract) {
            Ok(rule) => rules.push(rule),
            Err(err) => {
                warn!(rule_id = %contract.id, error = %err, "skipping malformed pricing rule");
                skipped.push(SkippedRule {
                    rule_id: contract.id.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }
    (rules, skipped)
}

/// Size the rules are evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuleDimensions {
    pub width_mm: f64,
    pub drop_mm: f64,
    pub panel_count: f64,
}

/// One fee contributed by a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeLine {
    pub rule_id: String,
    pub rule_type: String,
    pub amount: f64,
    pub description: String,
}

/// Priced result of a BOM plus rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub materials: f64,
    pub labor: f64,
    pub markup: f64,
    pub fees: f64,
    pub fee_lines: Vec<FeeLine>,
    pub total: f64,
    pub skipped_rules: Vec<SkippedRule>,
}

/// Apply rules in sequence over materials + labor.
pub fn apply_rules(materials: f64, labor: f64, rules: &[PricingRule], dims: RuleDimensions) -> PriceBreakdown {
    let base = materials + labor;
    let mut markup = 0.0;
    let mut fee_lines = Vec::new();

    for rule in rules {
        match rule {
            PricingRule::MarkupPercentage { percentage, .. } => {
                let amount = base * percentage / 100.0;
                markup += amount;
                fee_lines.push(FeeLine {
                    rule_id: rule.id().to_string(),
                    rule_type: rule.kind().to_string(),
                    amount: round_money(amount),
                    description: format!("{}% of {:.2}", percentage, base),
                });
            }
            PricingRule::FixedFee { amount, .. } => fee_lines.push(FeeLine {
                rule_id: rule.id().to_string(),
                rule_type: rule.kind().to_string(),
                amount: round_money(*amount),
                description: "fixed fee".to_string(),
            }),
            PricingRule::PerPanel { amount, .. } => fee_lines.push(FeeLine {
                rule_id: rule.id().to_string(),
                rule_type: rule.kind().to_string(),
                amount: round_money(amount * dims.panel_count),
                description: format!("{:.2} x {} panel(s)", amount, dims.panel_count),
            }),
            PricingRule::Ladder { tiers, .. } => {
                // first matching tier wins
                if let Some(tier) = tiers.iter().find(|t| t.contains(dims.width_mm, dims.drop_mm)) {
                    fee_lines.push(FeeLine {
                        rule_id: rule.id().to_string(),
                        rule_type: rule.kind().to_string(),
                        amount: round_money(tier.price),
                        description: format!("width {}-{} mm tier", tier.min_width_mm, tier.max_width_mm),
                    });
                }
            }
        }
    }

    let fees: f64 = fee_lines
        .iter()
        .filter(|f| f.rule_type != "markup_percentage")
        .map(|f| f.amount)
        .sum();

    PriceBreakdown {
        materials: round_money(materials),
        labor: round_money(labor),
        markup: round_money(markup),
        fees: round_money(fees),
        fee_lines,
        total: round_money(materials + labor + fees + markup),
        skipped_rules: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contract(value: serde_json::Value) -> PricingRuleContract {
        serde_json::from_value(value).unwrap()
    }

    fn dims(width_mm: f64) -> RuleDimensions {
        RuleDimensions {
            width_mm,
            drop_mm: 2000.0,
            panel_count: 2.0,
        }
    }

    fn ladder() -> PricingRule {
        PricingRule::try_from(&contract(json!({
            "id": "ladder-1",
            "rule_type": "ladder",
            "tiers": [
                { "min_width_mm": 0, "max_width_mm": 1000, "price": 10 },
                { "min_width_mm": 1001, "max_width_mm": 2000, "price": 20 }
            ]
        })))
        .unwrap()
    }

    #[test]
    fn test_ladder_boundaries() {
        let rules = vec![ladder()];
        assert_eq!(apply_rules(0.0, 0.0, &rules, dims(1000.0)).fees, 10.0);
        assert_eq!(apply_rules(0.0, 0.0, &rules, dims(1001.0)).fees, 20.0);
        assert_eq!(apply_rules(0.0, 0.0, &rules, dims(2500.0)).fees, 0.0);
    }

    #[test]
    fn test_ladder_first_match_wins() {
        let rule = PricingRule::Ladder {
            id: "overlap".into(),
            tiers: vec![
                LadderTier {
                    min_width_mm: 0.0,
                    max_width_mm: 3000.0,
                    min_drop_mm: None,
                    max_drop_mm: None,
                    price: 5.0,
                },
                LadderTier {
                    min_width_mm: 1000.0,
                    max_width_mm: 2000.0,
                    min_drop_mm: None,
                    max_drop_mm: None,
                    price: 50.0,
                },
            ],
        };
        assert_eq!(apply_rules(0.0, 0.0, &[rule], dims(1500.0)).fees, 5.0);
    }

    #[test]
    fn test_markup_excludes_fees() {
        let rules = parse_rules(&[
            contract(json!({ "id": "fee", "rule_type": "fixed_fee", "amount": 50 })),
            contract(json!({ "id": "markup", "rule_type": "markup_percentage", "percentage": 10 })),
            contract(json!({ "id": "panel", "rule_type": "per_panel", "amount": 7.5 })),
        ])
        .unwrap();
        let breakdown = apply_rules(300.0, 100.0, &rules, dims(1200.0));
        assert_eq!(breakdown.markup, 40.0);
        assert_eq!(breakdown.fees, 65.0);
        assert_eq!(breakdown.total, 505.0);
        assert_eq!(breakdown.fee_lines.len(), 3);
    }

    #[test]
    fn test_strict_parse_aborts() {
        let err = parse_rules(&[contract(json!({ "id": "m", "rule_type": "markup_percentage", "percentage": "ten" }))])
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PRICING_RULE");
    }

    #[test]
    fn test_lenient_parse_skips_and_reports() {
        let (rules, skipped) = parse_rules_lenient(&[
            contract(json!({ "id": "ok", "rule_type": "fixed_fee", "amount": 5 })),
            contract(json!({ "id": "bad-type", "rule_type": "surcharge", "amount": 5 })),
            contract(json!({ "id": "bad-ladder", "rule_type": "ladder", "tiers": [] })),
        ]);
        assert_eq!(rules.len(), 1);
        assert_eq!(skipped.len(), 2);
        assert_eq!(skipped[0].rule_id, "bad-type");
        assert!(skipped[1].reason.contains("no tiers"));
    }

    #[test]
    fn test_drop_range_in_ladder() {
        let tier = LadderTier {
            min_width_mm: 0.0,
            max_width_mm: 2000.0,
            min_drop_mm: Some(0.0),
            max_drop_mm: Some(1500.0),
            price: 12.0,
        };
        assert!(tier.contains(1000.0, 1500.0));
        assert!(!tier.contains(1000.0, 1501.0));
    }
}
