//! # BOM and Price Service
//!
//! `calc_bom_and_price`: the server-side entry point that expands a
//! template's assembly into a priced BOM and layers the organisation's
//! pricing rules on top.
//!
//! ```text
//! phase 1 (parallel)   fetch_assembly            fetch_pricing_rules
//! phase 2 (parallel)   fetch_inventory (batched) fetch_grids (batched)
//! compute              context -> assemble BOM -> apply rules
//! ```
//!
//! No read happens once computation starts.
//!
//! This is the only place in the engine where input is read in
//! [`ValidationMode::UserInputWithDefaults`]: the measurement keys listed in
//! [`BoundaryDefaults`] are filled when the user has not entered them yet
//! (absent or `null`). A value that is present but unusable is still an
//! error. It is also the only place a malformed pricing rule is skipped
//! instead of failing the request; skipped rules are returned to the caller.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::bom::{assemble, BomInputs, BomLine, InventoryItem, TemplateAssembly};
use crate::catalog::CatalogSource;
use crate::errors::{PricingError, PricingResult};
use crate::formula::FormulaContext;
use crate::grid::{load_grids, GridSet};
use crate::rules::{apply_rules, parse_rules_lenient, PriceBreakdown, PricingRuleContract, RuleDimensions};
use crate::settings::{BoundaryDefaults, EngineSettings, ValidationMode};
use crate::units::{feet_from_cm, normalize_length};

/// State keys naming the selected fabric's inventory item
const FABRIC_KEYS: [&str; 2] = ["fabric_id", "selected_fabric_id"];

/// Prefix for selected-fabric attributes in the formula context
const FABRIC_ATTRIBUTE_PREFIX: &str = "fabric_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalcBomRequest {
    pub org_id: String,
    pub template_id: String,
    #[serde(default)]
    pub window_type_id: Option<String>,
    /// Free-form user state (`rail_width_mm`, `drop_mm`, `fabric_id`, ...)
    #[serde(default)]
    pub state: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalcBomResponse {
    pub bom: Vec<BomLine>,
    pub price_breakdown: PriceBreakdown,
    pub price_total: f64,
    /// Number of malformed pricing rules left out; details in `price_breakdown`
    pub skipped_rules: usize,
    /// State keys filled from boundary defaults
    pub defaulted_fields: Vec<String>,
    /// Assembly lines whose quantity evaluated to zero
    pub omitted_lines: usize,
}

/// Formula context built from user state
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryContext {
    pub context: FormulaContext,
    pub defaulted: Vec<String>,
    pub width_mm: f64,
    pub drop_mm: f64,
    pub panel_count: f64,
}

/// Read user state into a formula context.
///
/// In `StrictContract` mode a missing measurement is a `SchemaViolation`;
/// in `UserInputWithDefaults` mode it is filled from `defaults`.
pub fn read_state(
    state: &serde_json::Map<String, serde_json::Value>,
    defaults: &BoundaryDefaults,
    mode: ValidationMode,
) -> PricingResult<BoundaryContext> {
    let mut context = FormulaContext::new();
    context.merge_json(state);

    let mut defaulted = Vec::new();
    for key in BoundaryDefaults::keys() {
        let value = match state.get(*key) {
            None | Some(serde_json::Value::Null) => match mode {
                ValidationMode::UserInputWithDefaults => {
                    defaulted.push(key.to_string());
                    defaults.for_key(key)
                }
                ValidationMode::StrictContract => None,
            },
            Some(v) => Some(
                v.as_f64()
                    .filter(|n| n.is_finite() && *n > 0.0)
                    .ok_or_else(|| PricingError::schema_violation(*key, format!("must be a positive number, got {}", v)))?,
            ),
        };
        let value = value.ok_or_else(|| PricingError::schema_violation(*key, "required field is missing"))?;
        context.set(*key, value);
    }

    let width_mm = context.get("rail_width_mm").unwrap_or(defaults.rail_width_mm);
    let drop_mm = context.get("drop_mm").unwrap_or(defaults.drop_mm);
    let panel_count = context.get("panel_count").unwrap_or(defaults.panel_count);
    let width = normalize_length("rail_width_mm", width_mm)?;
    let drop = normalize_length("drop_mm", drop_mm)?;
    context.set("rail_width_cm", width.0);
    context.set("drop_cm", drop.0);
    context.set("rail_width_m", width.0 / 100.0);
    context.set("drop_m", drop.0 / 100.0);
    context.set("widthFt", feet_from_cm(width).0);

    Ok(BoundaryContext {
        context,
        defaulted,
        width_mm,
        drop_mm,
        panel_count,
    })
}

fn selected_fabric_id(state: &serde_json::Map<String, serde_json::Value>) -> Option<String> {
    FABRIC_KEYS
        .iter()
        .find_map(|k| state.get(*k).and_then(serde_json::Value::as_str))
        .map(str::to_string)
}

/// Run two independent reads on scoped threads.
fn read_pair<A, B, FA, FB>(first: FA, second: FB) -> PricingResult<(A, B)>
where
    A: Send,
    B: Send,
    FA: FnOnce() -> PricingResult<A> + Send,
    FB: FnOnce() -> PricingResult<B> + Send,
{
    std::thread::scope(|scope| {
        let handle = scope.spawn(second);
        let a = first();
        let b = handle
            .join()
            .map_err(|_| PricingError::catalog("parallel read", "reader thread panicked"))?;
        Ok((a?, b?))
    })
}

/// Expand a template into a priced BOM and apply pricing rules.
#[instrument(skip_all, fields(org_id = %request.org_id, template_id = %request.template_id))]
pub fn calc_bom_and_price<S: CatalogSource + ?Sized>(
    request: &CalcBomRequest,
    source: &S,
    settings: &EngineSettings,
) -> PricingResult<CalcBomResponse> {
    let boundary = read_state(
        &request.state,
        &settings.boundary_defaults,
        ValidationMode::UserInputWithDefaults,
    )?;
    if !boundary.defaulted.is_empty() {
        info!(fields = ?boundary.defaulted, "measurements not entered yet, using boundary defaults");
    }

    // phase 1
    let (assembly, rule_contracts): (TemplateAssembly, Vec<PricingRuleContract>) = read_pair(
        || source.fetch_assembly(&request.org_id, &request.template_id),
        || source.fetch_pricing_rules(&request.org_id, request.window_type_id.as_deref()),
    )?;

    // phase 2
    let fabric_id = selected_fabric_id(&request.state);
    let item_ids: Vec<String> = assembly
        .lines
        .iter()
        .map(|l| l.inventory_item_id.clone())
        .chain(fabric_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let grid_ids: BTreeSet<String> = assembly.lines.iter().filter_map(|l| l.pricing_grid_id.clone()).collect();
    let (inventory, grids): (Vec<InventoryItem>, GridSet) = read_pair(
        || source.fetch_inventory(&request.org_id, &item_ids),
        || load_grids(source, &grid_ids),
    )?;
    let items: HashMap<String, InventoryItem> = inventory.into_iter().map(|i| (i.id.clone(), i)).collect();

    // compute
    let mut context = boundary.context;
    if let Some(id) = &fabric_id {
        let fabric = items.get(id).ok_or_else(|| {
            PricingError::schema_violation(format!("inventory.{}", id), "selected fabric not found")
        })?;
        for (key, value) in &fabric.attributes {
            context.set(format!("{}{}", FABRIC_ATTRIBUTE_PREFIX, key), *value);
        }
    }

    let width_cm = boundary.width_mm / 10.0;
    let drop_cm = boundary.drop_mm / 10.0;
    let inputs = BomInputs {
        limits: settings.formula_limits,
        ..BomInputs::new(&context, &items, &grids, width_cm, drop_cm)
    };
    let bom = assemble(&assembly.lines, &inputs)?;

    let (rules, skipped) = parse_rules_lenient(&rule_contracts);
    if !skipped.is_empty() {
        warn!(count = skipped.len(), "pricing rules skipped");
    }
    let mut price_breakdown = apply_rules(
        bom.materials_cost,
        bom.labor_cost,
        &rules,
        RuleDimensions {
            width_mm: boundary.width_mm,
            drop_mm: boundary.drop_mm,
            panel_count: boundary.panel_count,
        },
    );
    price_breakdown.skipped_rules = skipped;

    let response = CalcBomResponse {
        price_total: price_breakdown.total,
        skipped_rules: price_breakdown.skipped_rules.len(),
        defaulted_fields: boundary.defaulted,
        omitted_lines: bom.omitted_lines,
        bom: bom.lines,
        price_breakdown,
    };
    info!(
        lines = response.bom.len(),
        total = response.price_total,
        skipped_rules = response.skipped_rules,
        "BOM priced"
    );
    Ok(response)
}
