//! # Fabric/Material Usage Calculator
//!
//! How much fabric (or material) a treatment consumes. All inputs are in
//! centimeters.
//!
//! ## Linear usage
//!
//! ```text
//! widths_required = ceil((width x fullness + returns) / fabric_width)
//! cut_length      = drop + header_hem + bottom_hem, rounded up to the pattern repeat
//! linear_meters   = widths_required x cut_length / 100
//! with_waste      = linear_meters x (1 + waste% / 100)
//! ```
//!
//! When the fabric is rotated (railroaded) the fabric's width covers the drop
//! instead, so the roles swap:
//!
//! ```text
//! widths_required = ceil((drop + header_hem + bottom_hem) / fabric_width)
//! cut_length      = width x fullness + returns, rounded up to the pattern repeat
//! ```
//!
//! Rotation is only allowed when the fabric declares `railroading_allowed`.
//!
//! ## Area usage
//!
//! `square_meters = width x drop / 10_000`, times the same waste factor.
//!
//! Waste multiplies quantities, never only prices, so downstream costs and
//! procurement see the same figure.

use serde::{Deserialize, Serialize};

use crate::breakdown::{FormulaBreakdown, StepCategory};
use crate::contracts::{Fabric, Hems, NormalizedMeasurements, PricingMethod};
use crate::errors::{PricingError, PricingResult};
use crate::formula::format_number;
use crate::units::{display_meters, round_to, Centimeters, SquareMeters};

/// Absorbs float noise so an exact fit does not round up to an extra width
const CEIL_TOLERANCE: f64 = 1e-9;

fn ceil_tolerant(value: f64) -> f64 {
    (value - CEIL_TOLERANCE).ceil().max(0.0)
}

/// Everything the usage calculator reads
#[derive(Debug, Clone, Copy)]
pub struct UsageInput<'a> {
    pub measurements: &'a NormalizedMeasurements,
    pub hems: &'a Hems,
    pub fullness: f64,
    pub waste_percent: f64,
    pub fabric: &'a Fabric,
}

/// Computed consumption for one fabric or material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub rotated: bool,
    pub widths_required: u32,
    pub cut_length: Centimeters,
    /// Joins between widths
    pub seams: u32,
    pub linear_meters: f64,
    pub linear_meters_with_waste: f64,
    pub square_meters: SquareMeters,
    pub square_meters_with_waste: SquareMeters,
    pub waste_factor: f64,
}

/// Compute linear and area usage. Pure and deterministic.
pub fn calculate_usage(input: &UsageInput<'_>) -> PricingResult<Usage> {
    let m = input.measurements;
    let fabric = input.fabric;
    if !input.fullness.is_finite() || input.fullness < 1.0 {
        return Err(PricingError::schema_violation(
            "fullness",
            format!("fullness ratio must be at least 1.0, got {}", input.fullness),
        ));
    }
    if m.fabric_rotated && !fabric.railroading_allowed {
        return Err(PricingError::RailroadingNotSupported {
            fabric: fabric.name.clone(),
        });
    }

    let gathered = m.width * input.fullness + m.returns;
    let finished_drop = m.drop + input.hems.header + input.hems.bottom;
    let (across, along) = if m.fabric_rotated {
        (finished_drop, gathered)
    } else {
        (gathered, finished_drop)
    };

    let widths_required = ceil_tolerant(across.0 / fabric.width.0);
    let cut_length = round_up_to_repeat(along, fabric.pattern_repeat);
    let linear_meters = widths_required * display_meters(cut_length).0;
    let waste_factor = 1.0 + input.waste_percent / 100.0;
    let square_meters = m.width.area_with(m.drop);

    Ok(Usage {
        rotated: m.fabric_rotated,
        widths_required: widths_required as u32,
        cut_length,
        seams: (widths_required as u32).saturating_sub(1),
        linear_meters,
        linear_meters_with_waste: linear_meters * waste_factor,
        square_meters,
        square_meters_with_waste: square_meters * waste_factor,
        waste_factor,
    })
}

/// Round a cut length up to the next whole pattern repeat.
pub fn round_up_to_repeat(length: Centimeters, repeat: Centimeters) -> Centimeters {
    if repeat.0 > 0.0 {
        Centimeters(ceil_tolerant(length.0 / repeat.0) * repeat.0)
    } else {
        length
    }
}

impl Usage {
    /// Append the usage steps to an audit breakdown
    pub fn record_steps(&self, input: &UsageInput<'_>, breakdown: &mut FormulaBreakdown) {
        let m = input.measurements;
        let h = input.hems;
        let fabric_width = format_number(input.fabric.width.0);
        let gathered = format!(
            "{} x {} + {}",
            format_number(m.width.0),
            format_number(input.fullness),
            format_number(m.returns.0)
        );
        let drop = format!(
            "{} + {} + {}",
            format_number(m.drop.0),
            format_number(h.header.0),
            format_number(h.bottom.0)
        );

        if self.rotated {
            breakdown.record(
                StepCategory::Usage,
                "Widths required (railroaded)",
                "ceil((drop + header_hem + bottom_hem) / fabric_width)",
                format!("ceil(({}) / {})", drop, fabric_width),
                self.widths_required as f64,
                "widths",
            );
            breakdown.record(
                StepCategory::Usage,
                "Cut length (railroaded)",
                "width x fullness + returns",
                gathered,
                self.cut_length.0,
                "cm",
            );
        } else {
            breakdown.record(
                StepCategory::Usage,
                "Widths required",
                "ceil((width x fullness + returns) / fabric_width)",
                format!("ceil(({}) / {})", gathered, fabric_width),
                self.widths_required as f64,
                "widths",
            );
            breakdown.record(
                StepCategory::Usage,
                "Cut length",
                "drop + header_hem + bottom_hem",
                drop,
                self.cut_length.0,
                "cm",
            );
        }
        if input.fabric.pattern_repeat.0 > 0.0 {
            breakdown.record_value(StepCategory::Usage, "Pattern repeat", input.fabric.pattern_repeat.0, "cm");
        }
        breakdown.record(
            StepCategory::Usage,
            "Linear meters",
            "widths_required x cut_length / 100",
            format!("{} x {} / 100", self.widths_required, format_number(self.cut_length.0)),
            self.linear_meters,
            "m",
        );
        breakdown.record(
            StepCategory::Usage,
            "Linear meters with waste",
            "linear_meters x (1 + waste% / 100)",
            format!(
                "{} x (1 + {} / 100)",
                format_number(self.linear_meters),
                format_number(input.waste_percent)
            ),
            self.linear_meters_with_waste,
            "m",
        );
        breakdown.record(
            StepCategory::Usage,
            "Area",
            "width x drop / 10000",
            format!("{} x {} / 10000", format_number(m.width.0), format_number(m.drop.0)),
            self.square_meters.0,
            "m2",
        );
    }
}

/// Cost of the usage under the fabric's pricing method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageCost {
    pub method: PricingMethod,
    /// Quantity before waste
    pub base_quantity: f64,
    /// Quantity charged, waste included
    pub quantity: f64,
    pub unit: String,
    pub rate: f64,
    /// Cost of the base quantity
    pub base_cost: f64,
    /// Cost of the waste portion
    pub waste_cost: f64,
}

impl UsageCost {
    pub fn total(&self) -> f64 {
        self.base_cost + self.waste_cost
    }
}

/// Price a usage.
///
/// `grid_price` must be supplied for grid-priced fabrics; it is the resolved
/// cell for the finished size and carries no waste.
pub fn usage_cost(usage: &Usage, fabric: &Fabric, grid_price: Option<f64>) -> PricingResult<UsageCost> {
    let label = if fabric.id.is_empty() { fabric.name.as_str() } else { fabric.id.as_str() };
    let (base_quantity, quantity, unit, rate) = match fabric.pricing_method {
        PricingMethod::PerRunningMeter => (
            usage.linear_meters,
            usage.linear_meters_with_waste,
            "m",
            required_price(label, fabric.price)?,
        ),
        PricingMethod::PerSquareMeter => (
            usage.square_meters.0,
            usage.square_meters_with_waste.0,
            "m2",
            required_price(label, fabric.price)?,
        ),
        PricingMethod::Fixed => (1.0, 1.0, "each", required_price(label, fabric.price)?),
        PricingMethod::PricingGrid => {
            let price = grid_price.ok_or_else(|| {
                PricingError::schema_violation(format!("{}.pricing_grid_id", label), "grid price was not resolved")
            })?;
            (1.0, 1.0, "each", price)
        }
    };
    let base_cost = base_quantity * rate;
    Ok(UsageCost {
        method: fabric.pricing_method,
        base_quantity: round_to(base_quantity, 3),
        quantity: round_to(quantity, 3),
        unit: unit.to_string(),
        rate,
        base_cost,
        waste_cost: quantity * rate - base_cost,
    })
}

fn required_price(label: &str, price: Option<f64>) -> PricingResult<f64> {
    price.ok_or_else(|| PricingError::schema_violation(format!("{}.price", label), "required field is missing"))
}
