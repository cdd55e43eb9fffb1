//! # Price Aggregator
//!
//! Turns one [`TreatmentRequest`] into a [`CalculationResult`]:
//!
//! 1. classify the category and check the fabric/material it carries
//! 2. normalize measurements to centimeters, validate every contract
//! 3. fabric and material usage and cost
//! 4. manufacturing (make-up) cost, honouring heading overrides
//! 5. hardware accessories, when the request carries a parent track/rod
//! 6. options in two passes: flat, per-meter and per-m² first, then the
//!    percentage options that depend on the first pass
//! 7. `subtotal = fabric + material + manufacturing + hardware + options`,
//!    `total = subtotal + waste_amount`
//!
//! Every step lands in the result's [`FormulaBreakdown`].
//!
//! All grids a request needs are resolved and fetched in one batched read
//! before the calculation runs; [`price_treatments`] extends that batch
//! across many requests.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::breakdown::{FormulaBreakdown, StepCategory};
use crate::bundle::{calculate_bundle_with_limits, BundleInput, BundleResult};
use crate::catalog::CatalogSource;
use crate::classifier::{classify, Classification};
use crate::contracts::{
    Fabric, FabricContract, MaterialContract, MeasurementsContract, NormalizedMeasurements, OptionPricingMethod,
    PricingMethod, SelectedOption, SelectedOptionContract, Template, TemplateContract,
};
use crate::errors::{PricingError, PricingResult};
use crate::formula::format_number;
use crate::grid::{load_grids, GridReference, GridRule, GridSet};
use crate::settings::{EngineSettings, FormulaLimits};
use crate::units::{display_meters, feet_from_cm, round_money, round_to};
use crate::usage::{calculate_usage, usage_cost, Usage, UsageCost, UsageInput};

/// One treatment to price
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreatmentRequest {
    /// Organisation whose grid rules apply to price-group lookups
    #[serde(default)]
    pub org_id: String,
    pub category: String,
    pub measurements: MeasurementsContract,
    pub template: TemplateContract,
    #[serde(default)]
    pub fabric: Option<FabricContract>,
    #[serde(default)]
    pub material: Option<MaterialContract>,
    #[serde(default)]
    pub options: Vec<SelectedOptionContract>,
    /// Parent track/rod whose accessories are priced with the treatment
    #[serde(default)]
    pub hardware: Option<BundleInput>,
}

/// Sizes the calculation used, in centimeters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width_cm: f64,
    pub drop_cm: f64,
    pub returns_cm: f64,
    pub fullness: f64,
}

/// Make-up charge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManufacturingCost {
    pub method: PricingMethod,
    pub quantity: f64,
    pub unit: String,
    pub rate: f64,
    /// Heading whose price replaced the template rate
    pub heading_override: Option<String>,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionCost {
    pub id: String,
    pub name: String,
    pub pricing_method: OptionPricingMethod,
    pub price: f64,
    pub cost: f64,
}

/// Itemized cost streams
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub fabric: Option<UsageCost>,
    pub material: Option<UsageCost>,
    pub manufacturing: ManufacturingCost,
    pub hardware: Option<BundleResult>,
    pub options: Vec<OptionCost>,
    pub options_total: f64,
}

/// Priced treatment. Built once per request and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub calculation_id: Uuid,
    pub calculated_at: DateTime<Utc>,
    pub treatment: Classification,
    pub dimensions: Dimensions,
    pub fabric_usage: Option<Usage>,
    pub material_usage: Option<Usage>,
    pub costs: CostBreakdown,
    pub subtotal: f64,
    pub waste_amount: f64,
    pub total: f64,
    pub breakdown: FormulaBreakdown,
}

/// Request with every contract validated
struct Validated {
    classification: Classification,
    measurements: NormalizedMeasurements,
    template: Template,
    fabric: Option<Fabric>,
    material: Option<Fabric>,
    options: Vec<SelectedOption>,
}

impl TreatmentRequest {
    fn validate(&self) -> PricingResult<Validated> {
        let classification = classify(&self.category)?;
        classification.check_inputs(self.fabric.is_some(), self.material.is_some())?;
        let measurements = self.measurements.normalize()?;
        let template = self.template.validate()?;
        let fabric = self.fabric.as_ref().map(|f| f.validate("fabric")).transpose()?;
        let material = self.material.as_ref().map(|m| m.validate("material")).transpose()?;
        let options = self
            .options
            .iter()
            .enumerate()
            .map(|(i, o)| o.validate(i))
            .collect::<PricingResult<Vec<_>>>()?;

        classification.check_pricing(
            template.pricing_type,
            fabric.as_ref().map(|f| f.pricing_method),
            material.as_ref().map(|m| m.pricing_method),
        )?;

        Ok(Validated {
            classification,
            measurements,
            template,
            fabric,
            material,
            options,
        })
    }
}

impl Validated {
    /// Grid references in a fixed order: template, fabric, material
    fn grid_references(&self) -> Vec<(&'static str, GridReference)> {
        let treatment = self.classification.category.key().to_string();
        let mut refs = Vec::new();
        if self.template.pricing_type == PricingMethod::PricingGrid {
            refs.push((
                "template",
                GridReference {
                    direct_grid_id: self.template.pricing_grid_id.clone(),
                    price_group: None,
                    treatment: treatment.clone(),
                },
            ));
        }
        for (label, item) in [("fabric", &self.fabric), ("material", &self.material)] {
            if let Some(item) = item {
                if item.pricing_method == PricingMethod::PricingGrid {
                    refs.push((
                        label,
                        GridReference {
                            direct_grid_id: item.pricing_grid_id.clone(),
                            price_group: item.price_group.clone(),
                            treatment: treatment.clone(),
                        },
                    ));
                }
            }
        }
        refs
    }
}

/// Grids resolved for one request
#[derive(Debug, Clone, Default)]
struct ResolvedGrids {
    template: Option<String>,
    fabric: Option<String>,
    material: Option<String>,
}

/// Price one treatment, reading any grids it needs from `source`.
#[instrument(skip_all, fields(category = %request.category))]
pub fn price_treatment<S: CatalogSource + ?Sized>(
    request: &TreatmentRequest,
    source: &S,
    settings: &EngineSettings,
) -> PricingResult<CalculationResult> {
    price_treatments(std::slice::from_ref(request), source, settings)?
        .pop()
        .ok_or_else(|| PricingError::catalog("price_treatment", "no result produced"))
}

/// Price many treatments with one batched grid read for all of them.
///
/// Any failing request aborts the whole batch.
pub fn price_treatments<S: CatalogSource + ?Sized>(
    requests: &[TreatmentRequest],
    source: &S,
    settings: &EngineSettings,
) -> PricingResult<Vec<CalculationResult>> {
    let validated = requests
        .iter()
        .map(TreatmentRequest::validate)
        .collect::<PricingResult<Vec<_>>>()?;

    // grid rules are read once per organisation, and only when a price group needs them
    let mut rule_cache: BTreeMap<String, Vec<GridRule>> = BTreeMap::new();
    let mut resolved = Vec::with_capacity(validated.len());
    let mut wanted = BTreeSet::new();
    for (request, v) in requests.iter().zip(&validated) {
        let mut grids = ResolvedGrids::default();
        for (label, reference) in v.grid_references() {
            let id = if reference.direct_grid_id.is_some() {
                reference.resolve(&[])?
            } else {
                let rules = match rule_cache.entry(request.org_id.clone()) {
                    Entry::Occupied(cached) => cached.into_mut(),
                    Entry::Vacant(slot) => slot.insert(source.fetch_grid_rules(&request.org_id)?),
                };
                reference.resolve(rules)?
            };
            wanted.insert(id.clone());
            match label {
                "template" => grids.template = Some(id),
                "fabric" => grids.fabric = Some(id),
                _ => grids.material = Some(id),
            }
        }
        resolved.push(grids);
    }

    let grid_set = load_grids(source, &wanted)?;
    validated
        .iter()
        .zip(requests)
        .zip(&resolved)
        .map(|((v, request), grids)| {
            calculate(v, request.hardware.as_ref(), &grid_set, grids, &settings.formula_limits)
        })
        .collect()
}

fn calculate(
    v: &Validated,
    hardware: Option<&BundleInput>,
    grid_set: &GridSet,
    grids: &ResolvedGrids,
    limits: &FormulaLimits,
) -> PricingResult<CalculationResult> {
    let m = &v.measurements;
    let template = &v.template;
    let fullness = m.fullness.unwrap_or(template.default_fullness);
    let mut breakdown = FormulaBreakdown::new();

    breakdown.record_value(StepCategory::Dimensions, "Width", m.width.0, "cm");
    breakdown.record_value(StepCategory::Dimensions, "Drop", m.drop.0, "cm");
    if m.returns.0 > 0.0 {
        breakdown.record_value(StepCategory::Dimensions, "Returns", m.returns.0, "cm");
    }
    breakdown.record_value(StepCategory::Dimensions, "Fullness", fullness, "x");

    // Fabric and material
    let mut fabric_usage = None;
    let mut fabric_cost = None;
    if let Some(fabric) = &v.fabric {
        let (usage, cost) = price_usage(
            StepCategory::Fabric,
            fabric,
            m,
            template,
            fullness,
            grid_set,
            grids.fabric.as_deref(),
            &mut breakdown,
        )?;
        fabric_usage = Some(usage);
        fabric_cost = Some(cost);
    }
    let mut material_usage = None;
    let mut material_cost = None;
    if let Some(material) = &v.material {
        // materials hang flat
        let (usage, cost) = price_usage(
            StepCategory::Material,
            material,
            m,
            template,
            1.0,
            grid_set,
            grids.material.as_deref(),
            &mut breakdown,
        )?;
        material_usage = Some(usage);
        material_cost = Some(cost);
    }

    let manufacturing = manufacturing_cost(m, template, grid_set, grids.template.as_deref(), &mut breakdown)?;

    let hardware = match hardware {
        Some(input) => {
            // accessories follow the rail being priced
            let input = BundleInput {
                width: feet_from_cm(m.width),
                mount_type: m.mount_type,
                ..input.clone()
            };
            breakdown.record(
                StepCategory::Manufacturing,
                "Hardware width",
                "width_cm / 30.48",
                format!("{} / 30.48", format_number(m.width.0)),
                input.width.0,
                "ft",
            );
            let result = calculate_bundle_with_limits(&input, limits)?;
            for line in &result.lines {
                breakdown.record(
                    StepCategory::Manufacturing,
                    format!("Hardware: {}", line.child_key),
                    "quantity x unit_price",
                    format!("{} x {}", format_number(line.quantity), format_number(line.unit_price)),
                    line.total,
                    "",
                );
            }
            Some(result)
        }
        None => None,
    };

    // Options: pass one needs nothing but the size, pass two needs pass one
    let fabric_base = fabric_cost.as_ref().map_or(0.0, |c| c.base_cost);
    let material_base = material_cost.as_ref().map_or(0.0, |c| c.base_cost);
    let hardware_total = hardware.as_ref().map_or(0.0, |h| h.subtotal);
    let base = fabric_base + material_base + manufacturing.cost;
    let width_m = display_meters(m.width).0;
    let area = m.width.area_with(m.drop).0;

    let mut option_costs: Vec<Option<OptionCost>> = vec![None; v.options.len()];
    let mut first_pass_total = 0.0;
    for (i, option) in v.options.iter().enumerate() {
        let (cost, formula, substituted) = match option.pricing_method {
            OptionPricingMethod::Flat => (option.price, "price".to_string(), format_number(option.price)),
            OptionPricingMethod::PerMeter => (
                option.price * width_m,
                "price x width_m".to_string(),
                format!("{} x {}", format_number(option.price), format_number(width_m)),
            ),
            OptionPricingMethod::PerSquareMeter => (
                option.price * area,
                "price x area_m2".to_string(),
                format!("{} x {}", format_number(option.price), format_number(area)),
            ),
            _ => continue,
        };
        first_pass_total += cost;
        breakdown.record(StepCategory::Options, option.name.clone(), formula, substituted, cost, "");
        option_costs[i] = Some(option_cost(option, cost));
    }
    for (i, option) in v.options.iter().enumerate() {
        let (basis_name, basis) = match option.pricing_method {
            OptionPricingMethod::PercentageOfBase => ("base", base),
            OptionPricingMethod::PercentageOfFabric => ("fabric", fabric_base),
            OptionPricingMethod::PercentageOfTotal => ("total", base + hardware_total + first_pass_total),
            _ => continue,
        };
        let cost = basis * option.price / 100.0;
        breakdown.record(
            StepCategory::Options,
            option.name.clone(),
            format!("{}% x {}", format_number(option.price), basis_name),
            format!("{} / 100 x {}", format_number(option.price), format_number(round_money(basis))),
            cost,
            "",
        );
        option_costs[i] = Some(option_cost(option, cost));
    }
    let options: Vec<OptionCost> = option_costs.into_iter().flatten().collect();
    let options_total: f64 = options.iter().map(|o| o.cost).sum();

    let waste_amount = fabric_cost.as_ref().map_or(0.0, |c| c.waste_cost)
        + material_cost.as_ref().map_or(0.0, |c| c.waste_cost);
    let subtotal = base + hardware_total + options_total;
    let total = subtotal + waste_amount;

    breakdown.record(
        StepCategory::Waste,
        "Waste amount",
        "(quantity_with_waste - quantity) x rate",
        format!("{}% of usage", format_number(template.waste_percent)),
        round_money(waste_amount),
        "",
    );
    breakdown.record(
        StepCategory::Totals,
        "Subtotal",
        "fabric + material + manufacturing + hardware + options",
        format!(
            "{} + {} + {} + {} + {}",
            format_number(round_money(fabric_base)),
            format_number(round_money(material_base)),
            format_number(round_money(manufacturing.cost)),
            format_number(round_money(hardware_total)),
            format_number(round_money(options_total))
        ),
        round_money(subtotal),
        "",
    );
    breakdown.record(
        StepCategory::Totals,
        "Total",
        "subtotal + waste_amount",
        format!("{} + {}", format_number(round_money(subtotal)), format_number(round_money(waste_amount))),
        round_money(total),
        "",
    );

    let result = CalculationResult {
        calculation_id: Uuid::new_v4(),
        calculated_at: Utc::now(),
        treatment: v.classification,
        dimensions: Dimensions {
            width_cm: m.width.0,
            drop_cm: m.drop.0,
            returns_cm: m.returns.0,
            fullness,
        },
        fabric_usage,
        material_usage,
        costs: CostBreakdown {
            fabric: fabric_cost.map(round_usage_cost),
            material: material_cost.map(round_usage_cost),
            manufacturing: ManufacturingCost {
                cost: round_money(manufacturing.cost),
                ..manufacturing
            },
            hardware,
            options,
            options_total: round_money(options_total),
        },
        subtotal: round_money(subtotal),
        waste_amount: round_money(waste_amount),
        total: round_money(total),
        breakdown,
    };
    info!(
        calculation_id = %result.calculation_id,
        category = %result.treatment.category,
        total = result.total,
        "treatment priced"
    );
    Ok(result)
}

#[allow(clippy::too_many_arguments)]
fn price_usage(
    category: StepCategory,
    item: &Fabric,
    m: &NormalizedMeasurements,
    template: &Template,
    fullness: f64,
    grid_set: &GridSet,
    grid_id: Option<&str>,
    breakdown: &mut FormulaBreakdown,
) -> PricingResult<(Usage, UsageCost)> {
    let input = UsageInput {
        measurements: m,
        hems: &template.hems,
        fullness,
        waste_percent: template.waste_percent,
        fabric: item,
    };
    let usage = calculate_usage(&input)?;
    usage.record_steps(&input, breakdown);

    let grid_price = match grid_id {
        Some(id) => {
            let cell = grid_set.lookup(id, m.width.0, m.drop.0)?;
            breakdown.record(
                category,
                format!("{} grid price", item.name),
                format!("grid {} at width {} x drop {}", id, format_number(m.width.0), format_number(m.drop.0)),
                format!(
                    "cell {} x {}",
                    format_number(cell.width_label),
                    format_number(cell.drop_label)
                ),
                cell.price,
                "",
            );
            Some(cell.price)
        }
        None => None,
    };
    let cost = usage_cost(&usage, item, grid_price)?;
    breakdown.record(
        category,
        format!("{} cost", item.name),
        format!("quantity x rate ({})", item.pricing_method.display_name()),
        format!("{} {} x {}", format_number(cost.quantity), cost.unit, format_number(cost.rate)),
        cost.total(),
        "",
    );
    Ok((usage, cost))
}

fn manufacturing_cost(
    m: &NormalizedMeasurements,
    template: &Template,
    grid_set: &GridSet,
    grid_id: Option<&str>,
    breakdown: &mut FormulaBreakdown,
) -> PricingResult<ManufacturingCost> {
    let (rate, heading_override) = template.manufacturing_rate(m.heading_id.as_deref());
    let method = template.pricing_type;
    let (quantity, unit, rate) = match method {
        PricingMethod::PricingGrid => {
            let id = grid_id.ok_or_else(|| {
                PricingError::schema_violation("template.pricing_grid_id", "grid was not resolved")
            })?;
            let price = match &heading_override {
                Some(_) => rate.unwrap_or_default(),
                None => grid_set.lookup(id, m.width.0, m.drop.0)?.price,
            };
            (1.0, "each", price)
        }
        PricingMethod::PerRunningMeter => (display_meters(m.width).0, "m", manufacturing_rate(rate)?),
        PricingMethod::PerSquareMeter => (m.width.area_with(m.drop).0, "m2", manufacturing_rate(rate)?),
        PricingMethod::Fixed => (1.0, "each", manufacturing_rate(rate)?),
    };
    let cost = quantity * rate;
    let label = match &heading_override {
        Some(heading) => format!("Manufacturing ({} heading)", heading),
        None => "Manufacturing".to_string(),
    };
    breakdown.record(
        StepCategory::Manufacturing,
        label,
        format!("quantity x rate ({})", method.display_name()),
        format!("{} {} x {}", format_number(round_to(quantity, 3)), unit, format_number(rate)),
        cost,
        "",
    );
    Ok(ManufacturingCost {
        method,
        quantity: round_to(quantity, 3),
        unit: unit.to_string(),
        rate,
        heading_override,
        cost,
    })
}

fn manufacturing_rate(rate: Option<f64>) -> PricingResult<f64> {
    rate.ok_or_else(|| PricingError::schema_violation("template.manufacturing_price", "required field is missing"))
}

fn option_cost(option: &SelectedOption, cost: f64) -> OptionCost {
    OptionCost {
        id: option.id.clone(),
        name: option.name.clone(),
        pricing_method: option.pricing_method,
        price: option.price,
        cost: round_money(cost),
    }
}

fn round_usage_cost(cost: UsageCost) -> UsageCost {
    UsageCost {
        base_cost: round_money(cost.base_cost),
        waste_cost: round_money(cost.waste_cost),
        ..cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::contracts::MountType;
    use crate::grid::{GridRow, PricingGridContract, PricingGridEncoding};
    use crate::units::Feet;

    fn template() -> TemplateContract {
        TemplateContract {
            id: Some("tpl".into()),
            name: Some("Pencil pleat".into()),
            header_hem_cm: Some(8.0),
            bottom_hem_cm: Some(15.0),
            side_hem_cm: Some(4.0),
            seam_hem_cm: Some(1.5),
            waste_percent: Some(5.0),
            pricing_type: Some(PricingMethod::PerRunningMeter),
            default_fullness: Some(2.5),
            manufacturing_price: Some(20.0),
            ..Default::default()
        }
    }

    fn curtain_request() -> TreatmentRequest {
        TreatmentRequest {
            category: "curtains".into(),
            measurements: MeasurementsContract::new(2000.0, 2500.0),
            template: template(),
            fabric: Some(FabricContract {
                id: Some("fab".into()),
                name: Some("Linen".into()),
                width_cm: Some(137.0),
                pricing_method: Some(PricingMethod::PerRunningMeter),
                price: Some(40.0),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn option(name: &str, price: f64, method: OptionPricingMethod) -> SelectedOptionContract {
        SelectedOptionContract {
            id: Some(name.to_lowercase()),
            name: Some(name.into()),
            price: Some(price),
            pricing_method: Some(method),
        }
    }

    #[test]
    fn test_curtain_totals() {
        let result = price_treatment(&curtain_request(), &InMemoryCatalog::new(), &EngineSettings::default()).unwrap();
        let usage = result.fabric_usage.as_ref().unwrap();
        assert_eq!(usage.widths_required, 4);
        // fabric 10.92 m x 40 = 436.80, make-up 2 m x 20 = 40
        assert_eq!(result.costs.fabric.as_ref().unwrap().base_cost, 436.8);
        assert_eq!(result.costs.manufacturing.cost, 40.0);
        assert_eq!(result.subtotal, 476.8);
        assert_eq!(result.waste_amount, 21.84);
        assert_eq!(result.total, 498.64);
        assert_eq!(result.breakdown.find("Total").unwrap().result, 498.64);
    }

    #[test]
    fn test_two_pass_options() {
        let mut request = curtain_request();
        request.options = vec![
            option("Lining", 10.0, OptionPricingMethod::PercentageOfFabric),
            option("Tie-backs", 24.0, OptionPricingMethod::Flat),
            option("Rush", 10.0, OptionPricingMethod::PercentageOfTotal),
            option("Weights", 2.0, OptionPricingMethod::PerMeter),
        ];
        let result = price_treatment(&request, &InMemoryCatalog::new(), &EngineSettings::default()).unwrap();
        let costs: Vec<f64> = result.costs.options.iter().map(|o| o.cost).collect();
        // lining 43.68; tie-backs 24; rush 10% of (476.8 + 24 + 4); weights 2 x 2 m
        assert_eq!(costs, vec![43.68, 24.0, 50.48, 4.0]);
        assert_eq!(result.costs.options_total, 122.16);
        assert_eq!(result.subtotal, 598.96);
    }

    #[test]
    fn test_heading_override() {
        let mut request = curtain_request();
        request.template.heading_prices.insert("wave".into(), 35.0);
        request.measurements.heading_id = Some("wave".into());
        let result = price_treatment(&request, &InMemoryCatalog::new(), &EngineSettings::default()).unwrap();
        assert_eq!(result.costs.manufacturing.rate, 35.0);
        assert_eq!(result.costs.manufacturing.heading_override.as_deref(), Some("wave"));
        assert!(result.breakdown.find("Manufacturing (wave heading)").is_some());
    }

    #[test]
    fn test_missing_template_value_aborts() {
        let mut request = curtain_request();
        request.template.bottom_hem_cm = None;
        let err = price_treatment(&request, &InMemoryCatalog::new(), &EngineSettings::default()).unwrap_err();
        assert_eq!(err, PricingError::schema_violation("template.bottom_hem_cm", "required field is missing"));
    }

    #[test]
    fn test_unsupported_category() {
        let mut request = curtain_request();
        request.category = "igloo".into();
        let err = price_treatment(&request, &InMemoryCatalog::new(), &EngineSettings::default()).unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_TREATMENT");
    }

    fn roller_catalog() -> InMemoryCatalog {
        let mut catalog = InMemoryCatalog::new();
        catalog.grids.push(PricingGridContract {
            id: "roller-b".into(),
            name: Some("Roller group B".into()),
            encoding: PricingGridEncoding::Rows {
                widths: vec![100.0, 150.0, 200.0],
                rows: vec![
                    GridRow {
                        drop: 200.0,
                        prices: vec![Some(90.0), Some(110.0), Some(130.0)],
                    },
                    GridRow {
                        drop: 250.0,
                        prices: vec![Some(100.0), Some(120.0), Some(140.0)],
                    },
                ],
            },
        });
        catalog.grid_rules.push(GridRule {
            price_group: "B".into(),
            grid_id: "roller-b".into(),
            treatment: Some("roller_blinds".into()),
            priority: 0,
        });
        catalog
    }

    fn roller_request(width_mm: f64) -> TreatmentRequest {
        TreatmentRequest {
            category: "roller_blinds".into(),
            measurements: MeasurementsContract::new(width_mm, 2200.0),
            template: TemplateContract {
                pricing_type: Some(PricingMethod::Fixed),
                default_fullness: Some(1.0),
                waste_percent: Some(0.0),
                manufacturing_price: Some(15.0),
                ..template()
            },
            fabric: Some(FabricContract {
                name: Some("Blockout".into()),
                width_cm: Some(300.0),
                pricing_method: Some(PricingMethod::PricingGrid),
                price_group: Some("B".into()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_grid_priced_fabric_via_price_group() {
        let catalog = roller_catalog();
        let result = price_treatment(&roller_request(1600.0), &catalog, &EngineSettings::default()).unwrap();
        assert_eq!(result.costs.fabric.as_ref().unwrap().rate, 120.0);
        assert_eq!(result.total, 135.0);
        assert_eq!(catalog.grid_fetch_count(), 1);
    }

    #[test]
    fn test_grid_miss_aborts() {
        let err = price_treatment(&roller_request(5000.0), &roller_catalog(), &EngineSettings::default()).unwrap_err();
        assert_eq!(err.error_code(), "GRID_LOOKUP_MISS");
    }

    #[test]
    fn test_batch_reads_grids_once() {
        let catalog = roller_catalog();
        let requests: Vec<_> = [1000.0, 1600.0, 2000.0].iter().map(|w| roller_request(*w)).collect();
        let results = price_treatments(&requests, &catalog, &EngineSettings::default()).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(catalog.grid_fetch_count(), 1);
        assert_eq!(results[2].costs.fabric.as_ref().unwrap().rate, 140.0);
    }

    #[test]
    fn test_curtains_reject_grid_fabric() {
        let mut request = curtain_request();
        if let Some(f) = request.fabric.as_mut() {
            f.pricing_method = Some(PricingMethod::PricingGrid);
            f.pricing_grid_id = Some("roller-b".into());
        }
        assert!(price_treatment(&request, &roller_catalog(), &EngineSettings::default()).is_err());
    }

    #[test]
    fn test_pricing_must_fit_family() {
        let mut request = curtain_request();
        if let Some(f) = request.fabric.as_mut() {
            f.pricing_method = Some(PricingMethod::PerSquareMeter);
        }
        let err = price_treatment(&request, &InMemoryCatalog::new(), &EngineSettings::default()).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_VIOLATION");
        assert!(err.to_string().contains("fabric.pricing_method"));

        let mut request = roller_request(1600.0);
        if let Some(f) = request.fabric.as_mut() {
            f.pricing_method = Some(PricingMethod::PerRunningMeter);
            f.price = Some(10.0);
            f.price_group = None;
        }
        let err = price_treatment(&request, &roller_catalog(), &EngineSettings::default()).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_VIOLATION");
        assert!(err.to_string().contains("fabric.pricing_method"));
    }

    #[test]
    fn test_grid_priced_category_without_grid_rejected() {
        let mut request = roller_request(1600.0);
        if let Some(f) = request.fabric.as_mut() {
            f.pricing_method = Some(PricingMethod::PerSquareMeter);
            f.price = Some(10.0);
            f.price_group = None;
        }
        let err = price_treatment(&request, &roller_catalog(), &EngineSettings::default()).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_VIOLATION");
        assert!(err.to_string().contains("pricing_grid"));
    }

    fn track_hardware() -> BundleInput {
        let prices: BTreeMap<String, f64> = [
            ("runner", 0.5),
            ("endCap", 2.0),
            ("ceilingBracket", 3.0),
            ("wallSingleBracket", 4.0),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect();
        BundleInput {
            accessory_prices: prices.into(),
            ..BundleInput::new("track", Feet(40.0), MountType::Ceiling, false)
        }
    }

    #[test]
    fn test_hardware_follows_measurements() {
        // 1 m wall-mounted rail; the bundle's own 40 ft ceiling values are ignored
        let mut request = curtain_request();
        request.measurements = MeasurementsContract::new(1000.0, 2500.0);
        request.hardware = Some(track_hardware());

        let result = price_treatment(&request, &InMemoryCatalog::new(), &EngineSettings::default()).unwrap();
        let hardware = result.costs.hardware.as_ref().unwrap();
        assert_eq!(hardware.quantity_of("runners"), 20.0);
        assert_eq!(hardware.quantity_of("brackets"), 2.0);
        let brackets = hardware.lines.iter().find(|l| l.child_key == "brackets").unwrap();
        assert_eq!(brackets.unit_price, 4.0);
        assert_eq!(hardware.subtotal, 22.0);
        assert!(result.breakdown.find("Hardware width").is_some());
    }

    #[test]
    fn test_hardware_uses_engine_formula_limits() {
        let mut request = curtain_request();
        request.hardware = Some(track_hardware());
        assert!(price_treatment(&request, &InMemoryCatalog::new(), &EngineSettings::default()).is_ok());

        let tight = EngineSettings {
            formula_limits: FormulaLimits {
                max_length: 16,
                max_depth: 32,
            },
            ..Default::default()
        };
        let err = price_treatment(&request, &InMemoryCatalog::new(), &tight).unwrap_err();
        assert_eq!(err.error_code(), "FORMULA_EVALUATION");
        assert!(err.to_string().contains("longer than 16"));
    }
}
