//! # Bundle Calculator
//!
//! Derives the hardware accessories that come with a track or rod:
//! runners, end caps, brackets, jointers and so on. Each [`BundleRule`]
//! names a child item and a quantity formula evaluated against the parent's
//! context:
//!
//! | Identifier | Meaning |
//! |------------|---------|
//! | `widthFt` | parent width in feet |
//! | `heightFt` | drop in feet (0 when unknown) |
//! | `isDouble` | double track/rod |
//! | `isCeiling`, `isWall` | mount type |
//! | `centerOpening` | pair of panels meeting in the middle |
//!
//! plus every numeric entry of the parent's accessory metadata.
//!
//! Rules run in `order_index` order. A rule is skipped when its condition
//! does not match, when its quantity is zero or less, or when no positive
//! price can be found for the child. A missing price never becomes a free
//! line; it is reported in [`BundleResult::skipped`].
//!
//! Unit price comes from, in order: a per-request override, the rule's own
//! `unit_price`, or the parent's [`AccessoryPriceTable`].

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::contracts::MountType;
use crate::errors::{PricingError, PricingResult};
use crate::formula::{Formula, FormulaContext};
use crate::settings::FormulaLimits;
use crate::units::{round_money, Feet};

/// Accessory kinds with a known price key in parent metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessoryKind {
    Runners,
    EndCaps,
    Brackets,
    Jointers,
    Overlap,
    Rings,
    Finials,
}

impl AccessoryKind {
    pub const ALL: [AccessoryKind; 7] = [
        AccessoryKind::Runners,
        AccessoryKind::EndCaps,
        AccessoryKind::Brackets,
        AccessoryKind::Jointers,
        AccessoryKind::Overlap,
        AccessoryKind::Rings,
        AccessoryKind::Finials,
    ];

    /// Kind for a rule's child key, if it is one of the known accessories
    pub fn from_child_key(key: &str) -> Option<Self> {
        match key {
            "runners" | "runner" | "gliders" => Some(AccessoryKind::Runners),
            "end_caps" | "end_cap" | "endCaps" | "stops" => Some(AccessoryKind::EndCaps),
            "brackets" | "bracket" => Some(AccessoryKind::Brackets),
            "jointers" | "jointer" | "joiners" => Some(AccessoryKind::Jointers),
            "overlap" | "overlap_arms" | "overlapArms" => Some(AccessoryKind::Overlap),
            "rings" | "ring" => Some(AccessoryKind::Rings),
            "finials" | "finial" => Some(AccessoryKind::Finials),
            _ => None,
        }
    }

    /// Metadata key holding this accessory's price for a mount and doubling.
    ///
    /// Only brackets differ by mount: a ceiling bracket carries either
    /// track, while wall brackets come in single and double projections.
    pub fn metadata_key(self, mount: MountType, doubled: bool) -> &'static str {
        match self {
            AccessoryKind::Brackets => match (mount, doubled) {
                (MountType::Ceiling, _) => "ceilingBracket",
                (MountType::Wall, false) => "wallSingleBracket",
                (MountType::Wall, true) => "wallDoubleBracket",
            },
            AccessoryKind::Runners => "runner",
            AccessoryKind::EndCaps => "endCap",
            AccessoryKind::Jointers => "jointer",
            AccessoryKind::Overlap => "overlapArm",
            AccessoryKind::Rings => "ring",
            AccessoryKind::Finials => "finial",
        }
    }
}

/// Accessory prices keyed by {kind x mount x doubling}.
///
/// Built once from the parent item's string-keyed metadata; lookups after
/// that never touch strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct AccessoryPriceTable {
    prices: HashMap<(AccessoryKind, MountType, bool), f64>,
    metadata: BTreeMap<String, f64>,
}

impl From<BTreeMap<String, f64>> for AccessoryPriceTable {
    fn from(metadata: BTreeMap<String, f64>) -> Self {
        let mut prices = HashMap::new();
        for kind in AccessoryKind::ALL {
            for mount in [MountType::Wall, MountType::Ceiling] {
                for doubled in [false, true] {
                    if let Some(price) = metadata.get(kind.metadata_key(mount, doubled)) {
                        prices.insert((kind, mount, doubled), *price);
                    }
                }
            }
        }
        AccessoryPriceTable { prices, metadata }
    }
}

impl From<AccessoryPriceTable> for BTreeMap<String, f64> {
    fn from(table: AccessoryPriceTable) -> Self {
        table.metadata
    }
}

impl AccessoryPriceTable {
    pub fn price(&self, kind: AccessoryKind, mount: MountType, doubled: bool) -> Option<f64> {
        self.prices.get(&(kind, mount, doubled)).copied()
    }

    /// Raw metadata, exposed to quantity formulas
    pub fn metadata(&self) -> &BTreeMap<String, f64> {
        &self.metadata
    }
}

/// When a rule applies. Absent fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleCondition {
    #[serde(default)]
    pub mount_type: Option<MountType>,
    #[serde(default)]
    pub is_double: Option<bool>,
    #[serde(default)]
    pub center_opening: Option<bool>,
}

impl BundleCondition {
    pub fn matches(&self, input: &BundleInput) -> bool {
        self.mount_type.map_or(true, |m| m == input.mount_type)
            && self.is_double.map_or(true, |d| d == input.is_double)
            && self.center_opening.map_or(true, |c| c == input.center_opening)
    }
}

/// Derives one child accessory from a parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleRule {
    pub parent_key: String,
    pub child_key: String,
    pub quantity_formula: String,
    #[serde(default)]
    pub condition: Option<BundleCondition>,
    #[serde(default)]
    pub order_index: i32,
    #[serde(default)]
    pub unit_price: Option<f64>,
}

impl BundleRule {
    pub fn new(parent_key: &str, child_key: &str, quantity_formula: &str, order_index: i32) -> Self {
        BundleRule {
            parent_key: parent_key.to_string(),
            child_key: child_key.to_string(),
            quantity_formula: quantity_formula.to_string(),
            condition: None,
            order_index,
            unit_price: None,
        }
    }
}

/// Built-in rules for curtain tracks
pub static DEFAULT_TRACK_RULES: Lazy<Vec<BundleRule>> = Lazy::new(|| {
    vec![
        BundleRule::new("track", "runners", "ceil(widthFt * 6) * (isDouble ? 2 : 1)", 1),
        BundleRule::new("track", "end_caps", "isDouble ? 4 : 2", 2),
        BundleRule::new("track", "brackets", "ceil(widthFt / 2)", 3),
        BundleRule::new("track", "jointers", "widthFt > 8 ? ceil(widthFt / 8) : 0", 4),
        BundleRule::new("track", "overlap", "centerOpening ? (isDouble ? 2 : 1) : 0", 5),
    ]
});

/// Built-in rules for curtain rods (poles)
pub static DEFAULT_ROD_RULES: Lazy<Vec<BundleRule>> = Lazy::new(|| {
    vec![
        BundleRule::new("rod", "rings", "ceil(widthFt * 4) * (isDouble ? 2 : 1)", 1),
        BundleRule::new("rod", "finials", "isDouble ? 4 : 2", 2),
        BundleRule::new("rod", "brackets", "widthFt > 8 ? ceil(widthFt / 4) + 1 : 2", 3),
    ]
});

/// Default rule set for a parent key ("track"/"rod" and their plurals)
pub fn default_rules(parent_key: &str) -> Option<&'static [BundleRule]> {
    match canonical_parent(parent_key) {
        "track" => Some(DEFAULT_TRACK_RULES.as_slice()),
        "rod" => Some(DEFAULT_ROD_RULES.as_slice()),
        _ => None,
    }
}

/// Parent hardware context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleInput {
    pub parent_key: String,
    /// Filled from the measurements when priced as part of a treatment
    #[serde(default)]
    pub width: Feet,
    #[serde(default)]
    pub height: Option<Feet>,
    #[serde(default)]
    pub is_double: bool,
    #[serde(default)]
    pub mount_type: MountType,
    #[serde(default)]
    pub center_opening: bool,
    /// Parent item's accessory metadata (`ceilingBracket`, `runner`, ...)
    #[serde(default, rename = "metadata")]
    pub accessory_prices: AccessoryPriceTable,
    /// Child key -> unit price, wins over everything else
    #[serde(default)]
    pub price_overrides: BTreeMap<String, f64>,
    /// Custom rules; the built-in set for the parent is used when absent
    #[serde(default)]
    pub rules: Option<Vec<BundleRule>>,
}

impl BundleInput {
    pub fn new(parent_key: &str, width: Feet, mount_type: MountType, is_double: bool) -> Self {
        BundleInput {
            parent_key: parent_key.to_string(),
            width,
            height: None,
            is_double,
            mount_type,
            center_opening: false,
            accessory_prices: AccessoryPriceTable::default(),
            price_overrides: BTreeMap::new(),
            rules: None,
        }
    }

    /// Formula context for quantity rules
    pub fn context(&self) -> FormulaContext {
        let mut ctx = FormulaContext::new();
        for (key, value) in self.accessory_prices.metadata() {
            ctx.set(key.clone(), *value);
        }
        ctx.set("widthFt", self.width.0);
        ctx.set("heightFt", self.height.map_or(0.0, |h| h.0));
        ctx.set_flag("isDouble", self.is_double);
        ctx.set_flag("isCeiling", self.mount_type == MountType::Ceiling);
        ctx.set_flag("isWall", self.mount_type == MountType::Wall);
        ctx.set_flag("centerOpening", self.center_opening);
        ctx
    }
}

/// Where a line's unit price came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Override,
    Rule,
    Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleLine {
    pub child_key: String,
    pub kind: Option<AccessoryKind>,
    pub quantity: f64,
    pub unit_price: f64,
    pub total: f64,
    pub price_source: PriceSource,
}

/// A rule that produced a quantity but no usable price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedAccessory {
    pub child_key: String,
    pub quantity: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleResult {
    pub parent_key: String,
    pub lines: Vec<BundleLine>,
    pub subtotal: f64,
    pub skipped: Vec<SkippedAccessory>,
}

impl BundleResult {
    /// Emitted quantity for a child; 0 when the line was not emitted
    pub fn quantity_of(&self, child_key: &str) -> f64 {
        self.lines
            .iter()
            .filter(|l| l.child_key == child_key)
            .map(|l| l.quantity)
            .sum()
    }
}

/// Evaluate the bundle rules for one parent.
pub fn calculate_bundle(input: &BundleInput) -> PricingResult<BundleResult> {
    calculate_bundle_with_limits(input, &FormulaLimits::default())
}

pub fn calculate_bundle_with_limits(input: &BundleInput, limits: &FormulaLimits) -> PricingResult<BundleResult> {
    if !input.width.0.is_finite() || input.width.0 <= 0.0 {
        return Err(PricingError::schema_violation("width", "parent width must be positive"));
    }
    let rules: &[BundleRule] = match &input.rules {
        Some(custom) => custom,
        None => default_rules(&input.parent_key).ok_or_else(|| {
            PricingError::schema_violation(
                "rules",
                format!("no bundle rules given and no built-in set for '{}'", input.parent_key),
            )
        })?,
    };

    let parent = canonical_parent(&input.parent_key);
    let mut ordered: Vec<&BundleRule> = rules
        .iter()
        .filter(|r| canonical_parent(&r.parent_key) == parent)
        .collect();
    ordered.sort_by_key(|r| r.order_index);

    let ctx = input.context();
    let mut lines = Vec::new();
    let mut skipped = Vec::new();

    for rule in ordered {
        if let Some(condition) = &rule.condition {
            if !condition.matches(input) {
                debug!(child = %rule.child_key, "bundle rule condition not met");
                continue;
            }
        }
        let quantity = Formula::parse_with_limits(&rule.quantity_formula, limits)?.evaluate_units(&ctx)?;
        if quantity <= 0.0 {
            debug!(child = %rule.child_key, formula = %rule.quantity_formula, "bundle rule yields no quantity");
            continue;
        }

        let kind = AccessoryKind::from_child_key(&rule.child_key);
        let price = input
            .price_overrides
            .get(&rule.child_key)
            .map(|p| (*p, PriceSource::Override))
            .or_else(|| rule.unit_price.map(|p| (p, PriceSource::Rule)))
            .or_else(|| {
                kind.and_then(|k| input.accessory_prices.price(k, input.mount_type, input.is_double))
                    .map(|p| (p, PriceSource::Metadata))
            });

        match price {
            Some((unit_price, source)) if unit_price.is_finite() && unit_price > 0.0 => lines.push(BundleLine {
                child_key: rule.child_key.clone(),
                kind,
                quantity,
                unit_price,
                total: round_money(quantity * unit_price),
                price_source: source,
            }),
            other => {
                let reason = match other {
                    Some((p, _)) => format!("price {} is not positive", p),
                    None => match kind {
                        Some(k) => format!("no price for '{}'", k.metadata_key(input.mount_type, input.is_double)),
                        None => "no price for custom accessory".to_string(),
                    },
                };
                debug!(child = %rule.child_key, %reason, "bundle line skipped");
                skipped.push(SkippedAccessory {
                    child_key: rule.child_key.clone(),
                    quantity,
                    reason,
                });
            }
        }
    }

    let subtotal = round_money(lines.iter().map(|l| l.quantity * l.unit_price).sum());
    Ok(BundleResult {
        parent_key: input.parent_key.clone(),
        lines,
        subtotal,
        skipped,
    })
}

fn canonical_parent(key: &str) -> &str {
    match key {
        "tracks" => "track",
        "rods" | "pole" => "rod",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn priced_track(is_double: bool) -> BundleInput {
        let metadata = BTreeMap::from([
            ("runner".to_string(), 0.5),
            ("endCap".to_string(), 2.0),
            ("ceilingBracket".to_string(), 3.0),
            ("wallSingleBracket".to_string(), 4.0),
            ("wallDoubleBracket".to_string(), 6.0),
            ("jointer".to_string(), 5.0),
            ("overlapArm".to_string(), 7.5),
        ]);
        BundleInput {
            accessory_prices: metadata.into(),
            ..BundleInput::new("track", Feet(10.0), MountType::Ceiling, is_double)
        }
    }

    #[test]
    fn test_default_track_bundle() {
        let result = calculate_bundle(&priced_track(false)).unwrap();
        assert_eq!(result.quantity_of("runners"), 60.0);
        assert_eq!(result.quantity_of("end_caps"), 2.0);
        assert_eq!(result.quantity_of("brackets"), 5.0);
        assert_eq!(result.quantity_of("jointers"), 2.0);
        assert_eq!(result.quantity_of("overlap"), 0.0);
        assert_eq!(result.lines.len(), 4);
        // 60 x 0.5 + 2 x 2 + 5 x 3 + 2 x 5
        assert_eq!(result.subtotal, 59.0);
    }

    #[test]
    fn test_doubling_doubles_runners() {
        let single = calculate_bundle(&priced_track(false)).unwrap();
        let double = calculate_bundle(&priced_track(true)).unwrap();
        assert_eq!(single.quantity_of("runners"), 60.0);
        assert_eq!(double.quantity_of("runners"), 120.0);
        assert_eq!(double.quantity_of("end_caps"), 4.0);
    }

    #[test]
    fn test_bracket_price_by_mount_and_doubling() {
        let mut input = priced_track(true);
        input.mount_type = MountType::Wall;
        let result = calculate_bundle(&input).unwrap();
        let brackets = result.lines.iter().find(|l| l.child_key == "brackets").unwrap();
        assert_eq!(brackets.unit_price, 6.0);

        input.is_double = false;
        let result = calculate_bundle(&input).unwrap();
        let brackets = result.lines.iter().find(|l| l.child_key == "brackets").unwrap();
        assert_eq!(brackets.unit_price, 4.0);
    }

    #[test]
    fn test_missing_price_is_skipped_not_free() {
        let input = BundleInput::new("track", Feet(10.0), MountType::Ceiling, false);
        let result = calculate_bundle(&input).unwrap();
        assert!(result.lines.is_empty());
        assert_eq!(result.subtotal, 0.0);
        assert_eq!(result.skipped.len(), 4);
        assert!(result.skipped[0].reason.contains("runner"));
    }

    #[test]
    fn test_override_beats_rule_and_metadata() {
        let mut input = priced_track(false);
        input.price_overrides.insert("runners".into(), 0.25);
        let result = calculate_bundle(&input).unwrap();
        let runners = &result.lines[0];
        assert_eq!(runners.unit_price, 0.25);
        assert_eq!(runners.price_source, PriceSource::Override);
    }

    #[test]
    fn test_custom_rules_and_conditions() {
        let mut wall_only = BundleRule::new("track", "wall_plugs", "ceil(widthFt / 2) * 2", 1);
        wall_only.unit_price = Some(0.1);
        wall_only.condition = Some(BundleCondition {
            mount_type: Some(MountType::Wall),
            ..Default::default()
        });
        let mut cord = BundleRule::new("track", "cord_weight", "1", 2);
        cord.unit_price = Some(3.0);

        let mut input = BundleInput::new("track", Feet(7.0), MountType::Ceiling, false);
        input.rules = Some(vec![cord.clone(), wall_only.clone()]);
        let result = calculate_bundle(&input).unwrap();
        assert_eq!(result.lines.len(), 1);
        assert_eq!(result.lines[0].child_key, "cord_weight");

        input.mount_type = MountType::Wall;
        let result = calculate_bundle(&input).unwrap();
        assert_eq!(result.lines[0].child_key, "wall_plugs");
        assert_eq!(result.lines[0].quantity, 8.0);
    }

    #[test]
    fn test_rod_defaults() {
        let metadata = BTreeMap::from([("ring".to_string(), 1.0), ("finial".to_string(), 12.0)]);
        let input = BundleInput {
            accessory_prices: metadata.into(),
            ..BundleInput::new("rod", Feet(5.0), MountType::Wall, false)
        };
        let result = calculate_bundle(&input).unwrap();
        assert_eq!(result.quantity_of("rings"), 20.0);
        assert_eq!(result.quantity_of("finials"), 2.0);
        assert_eq!(result.skipped[0].child_key, "brackets");
    }

    #[test]
    fn test_unknown_parent_without_rules() {
        let input = BundleInput::new("pelmet", Feet(5.0), MountType::Wall, false);
        assert!(calculate_bundle(&input).is_err());
    }

    #[test]
    fn test_bad_formula_aborts() {
        let mut input = BundleInput::new("track", Feet(5.0), MountType::Wall, false);
        input.rules = Some(vec![BundleRule::new("track", "x", "widthInches * 2", 1)]);
        let err = calculate_bundle(&input).unwrap_err();
        assert_eq!(err.error_code(), "FORMULA_EVALUATION");
    }

    #[test]
    fn test_metadata_deserializes_into_table() {
        let input: BundleInput = serde_json::from_str(
            r#"{ "parent_key": "track", "width": 10, "mount_type": "ceiling",
                 "metadata": { "ceilingBracket": 3.5 } }"#,
        )
        .unwrap();
        assert_eq!(
            input.accessory_prices.price(AccessoryKind::Brackets, MountType::Ceiling, true),
            Some(3.5)
        );
        assert_eq!(input.accessory_prices.price(AccessoryKind::Brackets, MountType::Wall, false), None);
    }
}
