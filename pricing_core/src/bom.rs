//! # BOM Assembler
//!
//! Expands a template's assembly lines into priced bill-of-materials rows.
//!
//! For each line, in `order_index` order:
//!
//! 1. evaluate `qty_formula` against the merged context (request state plus
//!    the selected fabric's attributes)
//! 2. omit the line entirely if the quantity is zero or negative
//! 3. `quantity *= 1 + wastage_pct / 100`, emitted to 2 decimals
//! 4. unit price from the inventory item's cost or sell price (per
//!    `price_mode`), or from a pricing grid at (width, drop)
//! 5. route the total to labor (`labour`/`labor`/`install`) or materials
//!
//! ## Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use pricing_core::bom::{assemble, AssemblyLine, BomInputs, InventoryItem, LineRole, PriceMode};
//! use pricing_core::formula::FormulaContext;
//! use pricing_core::grid::GridSet;
//!
//! let lines = vec![AssemblyLine::new("track-std", "rail_width_mm/1000", 10.0, LineRole::Hardware, PriceMode::Sell)];
//! let items = HashMap::from([(
//!     "track-std".to_string(),
//!     InventoryItem::new("track-std", "Standard track", "m", 8.0, 12.0),
//! )]);
//! let ctx = FormulaContext::new().with("rail_width_mm", 2000.0);
//! let grids = GridSet::default();
//! let inputs = BomInputs::new(&ctx, &items, &grids, 200.0, 200.0);
//!
//! let bom = assemble(&lines, &inputs).unwrap();
//! assert_eq!(bom.lines[0].quantity, 2.2);
//! ```

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{PricingError, PricingResult};
use crate::formula::{Formula, FormulaContext};
use crate::grid::GridSet;
use crate::settings::FormulaLimits;
use crate::units::{round_money, round_to};

/// What a BOM line contributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineRole {
    Fabric,
    Material,
    Hardware,
    Component,
    #[serde(alias = "labor")]
    Labour,
    Install,
    #[serde(other)]
    Other,
}

impl LineRole {
    /// Labour and install lines are labor cost; everything else is materials.
    pub fn is_labor(self) -> bool {
        matches!(self, LineRole::Labour | LineRole::Install)
    }
}

/// Which inventory price a line uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceMode {
    Cost,
    Sell,
}

/// One line of a template's assembly definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyLine {
    pub inventory_item_id: String,
    pub qty_formula: String,
    #[serde(default)]
    pub wastage_pct: f64,
    pub role: LineRole,
    pub price_mode: PriceMode,
    /// Price the line from a grid at (width, drop) instead of the item price
    #[serde(default)]
    pub pricing_grid_id: Option<String>,
    #[serde(default)]
    pub order_index: i32,
}

impl AssemblyLine {
    pub fn new(
        inventory_item_id: impl Into<String>,
        qty_formula: impl Into<String>,
        wastage_pct: f64,
        role: LineRole,
        price_mode: PriceMode,
    ) -> Self {
        AssemblyLine {
            inventory_item_id: inventory_item_id.into(),
            qty_formula: qty_formula.into(),
            wastage_pct,
            role,
            price_mode,
            pricing_grid_id: None,
            order_index: 0,
        }
    }
}

/// A template's full assembly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateAssembly {
    pub template_id: String,
    #[serde(default)]
    pub name: String,
    pub lines: Vec<AssemblyLine>,
}

/// Inventory item referenced by assembly lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: String,
    pub name: String,
    /// Unit of measure ("m", "each", "hr", ...)
    pub unit: String,
    #[serde(default)]
    pub cost_price: Option<f64>,
    #[serde(default)]
    pub sell_price: Option<f64>,
    /// Numeric attributes exposed to formulas when this item is the selected fabric
    #[serde(default)]
    pub attributes: BTreeMap<String, f64>,
}

impl InventoryItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>, unit: impl Into<String>, cost: f64, sell: f64) -> Self {
        InventoryItem {
            id: id.into(),
            name: name.into(),
            unit: unit.into(),
            cost_price: Some(cost),
            sell_price: Some(sell),
            attributes: BTreeMap::new(),
        }
    }

    fn price_for(&self, mode: PriceMode) -> PricingResult<f64> {
        let (field, price) = match mode {
            PriceMode::Cost => ("cost_price", self.cost_price),
            PriceMode::Sell => ("sell_price", self.sell_price),
        };
        match price {
            Some(p) if p.is_finite() && p >= 0.0 => Ok(p),
            Some(p) => Err(PricingError::schema_violation(
                format!("inventory.{}.{}", self.id, field),
                format!("price must be non-negative, got {}", p),
            )),
            None => Err(PricingError::schema_violation(
                format!("inventory.{}.{}", self.id, field),
                "required field is missing",
            )),
        }
    }
}

/// Resolved BOM row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomLine {
    pub item_id: String,
    pub item_name: String,
    pub role: LineRole,
    pub quantity: f64,
    pub unit_price: f64,
    pub total: f64,
    pub unit: String,
}

/// Assembled BOM with cost split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomAssembly {
    pub lines: Vec<BomLine>,
    pub materials_cost: f64,
    pub labor_cost: f64,
    /// Lines whose quantity evaluated to zero or less
    pub omitted_lines: usize,
}

/// Everything the assembler reads, fetched before it runs
pub struct BomInputs<'a> {
    pub context: &'a FormulaContext,
    pub items: &'a HashMap<String, InventoryItem>,
    pub grids: &'a GridSet,
    pub width_cm: f64,
    pub drop_cm: f64,
    pub limits: FormulaLimits,
}

impl<'a> BomInputs<'a> {
    pub fn new(
        context: &'a FormulaContext,
        items: &'a HashMap<String, InventoryItem>,
        grids: &'a GridSet,
        width_cm: f64,
        drop_cm: f64,
    ) -> Self {
        BomInputs {
            context,
            items,
            grids,
            width_cm,
            drop_cm,
            limits: FormulaLimits::default(),
        }
    }
}

/// Expand assembly lines into priced rows. Pure: no I/O.
pub fn assemble(lines: &[AssemblyLine], inputs: &BomInputs<'_>) -> PricingResult<BomAssembly> {
    let mut ordered: Vec<&AssemblyLine> = lines.iter().collect();
    ordered.sort_by_key(|l| l.order_index);

    let mut rows = Vec::new();
    let mut materials_cost = 0.0;
    let mut labor_cost = 0.0;
    let mut omitted = 0;

    for line in ordered {
        if !line.wastage_pct.is_finite() || line.wastage_pct < 0.0 {
            return Err(PricingError::schema_violation(
                format!("assembly.{}.wastage_pct", line.inventory_item_id),
                "wastage must be a non-negative percentage",
            ));
        }
        let formula = Formula::parse_with_limits(&line.qty_formula, &inputs.limits)?;
        let base_qty = formula.evaluate_quantity(inputs.context)?;
        if base_qty <= 0.0 {
            debug!(item = %line.inventory_item_id, formula = %line.qty_formula, "BOM line omitted: zero quantity");
            omitted += 1;
            continue;
        }

        let item = inputs.items.get(&line.inventory_item_id).ok_or_else(|| {
            PricingError::schema_violation(
                format!("inventory.{}", line.inventory_item_id),
                "assembly line references an unknown inventory item",
            )
        })?;

        let quantity = round_to(base_qty * (1.0 + line.wastage_pct / 100.0), 2);
        let unit_price = match &line.pricing_grid_id {
            Some(grid_id) => inputs.grids.lookup(grid_id, inputs.width_cm, inputs.drop_cm)?.price,
            None => item.price_for(line.price_mode)?,
        };
        let total = round_money(quantity * unit_price);

        if line.role.is_labor() {
            labor_cost += total;
        } else {
            materials_cost += total;
        }

        rows.push(BomLine {
            item_id: item.id.clone(),
            item_name: item.name.clone(),
            role: line.role,
            quantity,
            unit_price: round_money(unit_price),
            total,
            unit: item.unit.clone(),
        });
    }

    Ok(BomAssembly {
        lines: rows,
        materials_cost: round_money(materials_cost),
        labor_cost: round_money(labor_cost),
        omitted_lines: omitted,
    })
}
