//! # Pricing Grid Resolver
//!
//! Blinds, shutters and awnings are priced by size tier: a 2-D table mapping
//! (width, drop) to one price. Grids have been stored in three encodings over
//! time; all of them are normalized once, at load, into [`PricingGrid`].
//!
//! ## Wire Encodings
//!
//! ```json
//! // 1. matrix: prices[drop_index][width_index]
//! { "id": "g1", "width_columns": [100, 150, 200], "drop_rows": [200, 250],
//!   "prices": [[40, 50, 60], [45, 55, 65]] }
//!
//! // 2. ranges: flat map keyed "{width_max}_{drop_max}"
//! { "id": "g2", "width_ranges": [{"min": 0, "max": 100}, {"min": 101, "max": 200}],
//!   "drop_ranges": [{"min": 0, "max": 150}],
//!   "prices": {"100_150": 30, "200_150": 45} }
//!
//! // 3. rows: one object per drop row
//! { "id": "g3", "widths": [100, 150], "rows": [{"drop": 200, "prices": [40, 50]}] }
//! ```
//!
//! ## Tier Semantics
//!
//! In the column encodings (matrix, rows) a width column is the *start* of its
//! tier, which runs up to the next column; the last column is the widest size
//! made. A drop row is the *maximum* drop of its tier, starting just above the
//! previous row. Range encodings carry explicit inclusive bounds. A lookup
//! picks, on each axis, the narrowest tier containing the value. A size inside
//! no tier, or landing on an empty/zero cell, is a `GridLookupMiss`.
//!
//! ## Example
//!
//! ```rust
//! use pricing_core::grid::{PricingGrid, PricingGridContract};
//!
//! let contract: PricingGridContract = serde_json::from_str(r#"{
//!     "id": "roller-a",
//!     "width_columns": [100, 150, 200],
//!     "drop_rows": [200, 250],
//!     "prices": [[40, 50, 60], [45, 55, 65]]
//! }"#).unwrap();
//!
//! let grid = PricingGrid::from_contract(&contract).unwrap();
//! assert_eq!(grid.price(160.0, 220.0).unwrap(), 55.0);
//! assert!(grid.price(500.0, 500.0).is_err());
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::CatalogSource;
use crate::errors::{PricingError, PricingResult};
use crate::formula::format_number;

// ============================================================================
// Wire Contract
// ============================================================================

/// Inclusive range bound used by the `ranges` encoding
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeBound {
    pub min: f64,
    pub max: f64,
}

/// One drop row of the `rows` encoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRow {
    pub drop: f64,
    pub prices: Vec<Option<f64>>,
}

/// The three historical grid encodings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PricingGridEncoding {
    Matrix {
        #[serde(alias = "widthColumns")]
        width_columns: Vec<f64>,
        #[serde(alias = "dropRows")]
        drop_rows: Vec<f64>,
        prices: Vec<Vec<Option<f64>>>,
    },
    Ranges {
        #[serde(alias = "widthRanges")]
        width_ranges: Vec<RangeBound>,
        #[serde(alias = "dropRanges")]
        drop_ranges: Vec<RangeBound>,
        prices: BTreeMap<String, f64>,
    },
    Rows { widths: Vec<f64>, rows: Vec<GridRow> },
}

/// Grid as stored by the data layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingGridContract {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub encoding: PricingGridEncoding,
}

// ============================================================================
// Canonical Grid
// ============================================================================

/// One tier along an axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub min: f64,
    pub max: f64,
    pub min_inclusive: bool,
    pub max_inclusive: bool,
    /// Value the tier is labelled by in the source grid
    pub label: f64,
}

impl Tier {
    fn inclusive(min: f64, max: f64, label: f64) -> Self {
        Tier {
            min,
            max,
            min_inclusive: true,
            max_inclusive: true,
            label,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        let above = if self.min_inclusive { value >= self.min } else { value > self.min };
        let below = if self.max_inclusive { value <= self.max } else { value < self.max };
        above && below
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Result of a grid lookup
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub width_label: f64,
    pub drop_label: f64,
    pub price: f64,
}

/// Canonical lookup table: `prices[drop_tier][width_tier]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingGrid {
    pub id: String,
    pub name: String,
    pub width_tiers: Vec<Tier>,
    pub drop_tiers: Vec<Tier>,
    pub prices: Vec<Vec<Option<f64>>>,
}

impl PricingGrid {
    /// Normalize any wire encoding into the canonical table.
    pub fn from_contract(contract: &PricingGridContract) -> PricingResult<Self> {
        let field = format!("pricing_grid.{}", contract.id);
        let (width_tiers, drop_tiers, prices) = match &contract.encoding {
            PricingGridEncoding::Matrix {
                width_columns,
                drop_rows,
                prices,
            } => {
                if prices.len() != drop_rows.len() || prices.iter().any(|row| row.len() != width_columns.len()) {
                    return Err(PricingError::schema_violation(
                        field,
                        format!(
                            "price matrix must be {} rows x {} columns",
                            drop_rows.len(),
                            width_columns.len()
                        ),
                    ));
                }
                (
                    width_tiers_from_columns(&field, width_columns)?,
                    drop_tiers_from_rows(&field, drop_rows)?,
                    prices.clone(),
                )
            }
            PricingGridEncoding::Rows { widths, rows } => {
                if rows.iter().any(|row| row.prices.len() != widths.len()) {
                    return Err(PricingError::schema_violation(
                        field,
                        format!("every row must carry {} prices", widths.len()),
                    ));
                }
                let drops: Vec<f64> = rows.iter().map(|r| r.drop).collect();
                (
                    width_tiers_from_columns(&field, widths)?,
                    drop_tiers_from_rows(&field, &drops)?,
                    rows.iter().map(|r| r.prices.clone()).collect(),
                )
            }
            PricingGridEncoding::Ranges {
                width_ranges,
                drop_ranges,
                prices,
            } => {
                let width_tiers = tiers_from_ranges(&field, "width_ranges", width_ranges)?;
                let drop_tiers = tiers_from_ranges(&field, "drop_ranges", drop_ranges)?;
                let matrix = drop_ranges
                    .iter()
                    .map(|d| {
                        width_ranges
                            .iter()
                            .map(|w| prices.get(&composite_key(w.max, d.max)).copied())
                            .collect()
                    })
                    .collect();
                (width_tiers, drop_tiers, matrix)
            }
        };

        if width_tiers.is_empty() || drop_tiers.is_empty() {
            return Err(PricingError::schema_violation(field, "grid has no tiers"));
        }

        Ok(PricingGrid {
            id: contract.id.clone(),
            name: contract.name.clone().unwrap_or_else(|| contract.id.clone()),
            width_tiers,
            drop_tiers,
            prices,
        })
    }

    /// Look up the cell for a (width, drop) pair, both in centimeters.
    pub fn lookup(&self, width: f64, drop: f64) -> PricingResult<GridCell> {
        let miss = || PricingError::grid_lookup_miss(&self.id, width, drop);
        let wi = narrowest_containing(&self.width_tiers, width).ok_or_else(miss)?;
        let di = narrowest_containing(&self.drop_tiers, drop).ok_or_else(miss)?;
        let price = self
            .prices
            .get(di)
            .and_then(|row| row.get(wi))
            .copied()
            .flatten()
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(miss)?;
        Ok(GridCell {
            width_label: self.width_tiers[wi].label,
            drop_label: self.drop_tiers[di].label,
            price,
        })
    }

    /// Price for a (width, drop) pair, both in centimeters.
    pub fn price(&self, width: f64, drop: f64) -> PricingResult<f64> {
        Ok(self.lookup(width, drop)?.price)
    }
}

fn composite_key(width: f64, drop: f64) -> String {
    format!("{}_{}", format_number(width), format_number(drop))
}

fn check_ascending(field: &str, axis: &str, values: &[f64]) -> PricingResult<()> {
    if values.iter().any(|v| !v.is_finite() || *v < 0.0) || values.windows(2).any(|w| w[0] >= w[1]) {
        return Err(PricingError::schema_violation(
            field,
            format!("{} must be non-negative and strictly ascending", axis),
        ));
    }
    Ok(())
}

fn width_tiers_from_columns(field: &str, columns: &[f64]) -> PricingResult<Vec<Tier>> {
    check_ascending(field, "width columns", columns)?;
    Ok(columns
        .iter()
        .enumerate()
        .map(|(i, &start)| match columns.get(i + 1) {
            Some(&next) => Tier {
                min: start,
                max: next,
                min_inclusive: true,
                max_inclusive: false,
                label: start,
            },
            None => Tier::inclusive(start, start, start),
        })
        .collect())
}

fn drop_tiers_from_rows(field: &str, rows: &[f64]) -> PricingResult<Vec<Tier>> {
    check_ascending(field, "drop rows", rows)?;
    Ok(rows
        .iter()
        .enumerate()
        .map(|(i, &end)| {
            if i == 0 {
                Tier::inclusive(0.0, end, end)
            } else {
                Tier {
                    min: rows[i - 1],
                    max: end,
                    min_inclusive: false,
                    max_inclusive: true,
                    label: end,
                }
            }
        })
        .collect())
}

fn tiers_from_ranges(field: &str, axis: &str, ranges: &[RangeBound]) -> PricingResult<Vec<Tier>> {
    ranges
        .iter()
        .map(|r| {
            if !r.min.is_finite() || !r.max.is_finite() || r.min > r.max {
                Err(PricingError::schema_violation(
                    field,
                    format!("{} contains an inverted range {}-{}", axis, r.min, r.max),
                ))
            } else {
                Ok(Tier::inclusive(r.min, r.max, r.max))
            }
        })
        .collect()
}

fn narrowest_containing(tiers: &[Tier], value: f64) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, tier) in tiers.iter().enumerate() {
        if tier.contains(value) && best.map_or(true, |b| tier.span() < tiers[b].span()) {
            best = Some(i);
        }
    }
    best
}

// ============================================================================
// Grid Reference Resolution
// ============================================================================

/// Maps a fabric price group to a grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRule {
    pub price_group: String,
    pub grid_id: String,
    /// Restrict the rule to one treatment category
    #[serde(default)]
    pub treatment: Option<String>,
    #[serde(default)]
    pub priority: i32,
}

/// What an item knows about its grid before resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridReference {
    pub direct_grid_id: Option<String>,
    pub price_group: Option<String>,
    pub treatment: String,
}

impl GridReference {
    /// Resolve to one grid id. A direct reference always wins.
    pub fn resolve(&self, rules: &[GridRule]) -> PricingResult<String> {
        if let Some(id) = &self.direct_grid_id {
            return Ok(id.clone());
        }
        let group = self.price_group.as_deref().ok_or_else(|| {
            PricingError::schema_violation("pricing_grid", "item has neither a grid id nor a price group")
        })?;
        rules
            .iter()
            .filter(|r| r.price_group == group)
            .filter(|r| r.treatment.as_deref().map_or(true, |t| t == self.treatment))
            // highest priority wins, earlier rule wins a tie
            .fold(None::<&GridRule>, |best, r| match best {
                Some(b) if b.priority >= r.priority => Some(b),
                _ => Some(r),
            })
            .map(|r| r.grid_id.clone())
            .ok_or_else(|| {
                PricingError::schema_violation(
                    "pricing_grid",
                    format!("no grid rule for price group '{}' on {}", group, self.treatment),
                )
            })
    }
}

/// Normalized grids for one calculation, keyed by id
#[derive(Debug, Clone, Default)]
pub struct GridSet {
    grids: HashMap<String, PricingGrid>,
}

impl GridSet {
    pub fn from_grids(grids: impl IntoIterator<Item = PricingGrid>) -> Self {
        GridSet {
            grids: grids.into_iter().map(|g| (g.id.clone(), g)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> PricingResult<&PricingGrid> {
        self.grids
            .get(id)
            .ok_or_else(|| PricingError::schema_violation(format!("pricing_grid.{}", id), "grid not found"))
    }

    pub fn lookup(&self, id: &str, width: f64, drop: f64) -> PricingResult<GridCell> {
        self.get(id)?.lookup(width, drop)
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }
}

/// Fetch and normalize every grid in `ids` with a single batched read.
pub fn load_grids<S: CatalogSource + ?Sized>(source: &S, ids: &BTreeSet<String>) -> PricingResult<GridSet> {
    if ids.is_empty() {
        return Ok(GridSet::default());
    }
    let wanted: Vec<String> = ids.iter().cloned().collect();
    debug!(count = wanted.len(), "fetching pricing grids");
    let contracts = source.fetch_grids(&wanted)?;
    let mut grids = Vec::with_capacity(wanted.len());
    for id in &wanted {
        let contract = contracts
            .iter()
            .find(|c| &c.id == id)
            .ok_or_else(|| PricingError::schema_violation(format!("pricing_grid.{}", id), "grid not found"))?;
        grids.push(PricingGrid::from_contract(contract)?);
    }
    Ok(GridSet::from_grids(grids))
}

/// Resolve many references, then load all distinct grids in one read.
///
/// Returns the resolved grid id for each reference (same order) and the set.
pub fn resolve_many<S: CatalogSource + ?Sized>(
    references: &[GridReference],
    rules: &[GridRule],
    source: &S,
) -> PricingResult<(Vec<String>, GridSet)> {
    let ids = references
        .iter()
        .map(|r| r.resolve(rules))
        .collect::<PricingResult<Vec<_>>>()?;
    let distinct: BTreeSet<String> = ids.iter().cloned().collect();
    let set = load_grids(source, &distinct)?;
    Ok((ids, set))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;

    fn matrix_grid() -> PricingGrid {
        let contract = PricingGridContract {
            id: "roller-a".into(),
            name: None,
            encoding: PricingGridEncoding::Matrix {
                width_columns: vec![100.0, 150.0, 200.0],
                drop_rows: vec![200.0, 250.0],
                prices: vec![
                    vec![Some(40.0), Some(50.0), Some(60.0)],
                    vec![Some(45.0), Some(55.0), Some(65.0)],
                ],
            },
        };
        PricingGrid::from_contract(&contract).unwrap()
    }

    #[test]
    fn test_lookup_resolves_containing_cell() {
        let cell = matrix_grid().lookup(160.0, 220.0).unwrap();
        assert_eq!(cell.width_label, 150.0);
        assert_eq!(cell.drop_label, 250.0);
        assert_eq!(cell.price, 55.0);
    }

    #[test]
    fn test_lookup_outside_every_tier_misses() {
        let err = matrix_grid().lookup(500.0, 500.0).unwrap_err();
        assert_eq!(err, PricingError::grid_lookup_miss("roller-a", 500.0, 500.0));
        assert!(matrix_grid().lookup(90.0, 150.0).is_err());
    }

    #[test]
    fn test_tier_boundaries() {
        let grid = matrix_grid();
        assert_eq!(grid.lookup(150.0, 200.0).unwrap().width_label, 150.0);
        assert_eq!(grid.lookup(149.9, 200.0).unwrap().width_label, 100.0);
        assert_eq!(grid.lookup(200.0, 200.0).unwrap().drop_label, 200.0);
        assert_eq!(grid.lookup(200.0, 200.1).unwrap().drop_label, 250.0);
    }

    #[test]
    fn test_ranges_encoding() {
        let contract: PricingGridContract = serde_json::from_str(
            r#"{
                "id": "venetian",
                "widthRanges": [{"min": 0, "max": 100}, {"min": 101, "max": 200}],
                "dropRanges": [{"min": 0, "max": 150}, {"min": 151, "max": 300}],
                "prices": {"100_150": 30, "200_150": 45, "100_300": 38}
            }"#,
        )
        .unwrap();
        assert!(matches!(contract.encoding, PricingGridEncoding::Ranges { .. }));
        let grid = PricingGrid::from_contract(&contract).unwrap();
        assert_eq!(grid.price(150.0, 120.0).unwrap(), 45.0);
        assert_eq!(grid.price(80.0, 250.0).unwrap(), 38.0);
        // no "200_300" key: hole in the grid
        assert!(grid.price(150.0, 250.0).is_err());
    }

    #[test]
    fn test_rows_encoding_matches_matrix() {
        let contract: PricingGridContract = serde_json::from_str(
            r#"{
                "id": "roller-a",
                "widths": [100, 150, 200],
                "rows": [
                    {"drop": 200, "prices": [40, 50, 60]},
                    {"drop": 250, "prices": [45, 55, 65]}
                ]
            }"#,
        )
        .unwrap();
        let grid = PricingGrid::from_contract(&contract).unwrap();
        assert_eq!(grid.width_tiers, matrix_grid().width_tiers);
        assert_eq!(grid.price(160.0, 220.0).unwrap(), 55.0);
    }

    #[test]
    fn test_zero_cell_is_a_miss() {
        let contract = PricingGridContract {
            id: "g".into(),
            name: None,
            encoding: PricingGridEncoding::Matrix {
                width_columns: vec![100.0, 200.0],
                drop_rows: vec![100.0],
                prices: vec![vec![Some(0.0), None]],
            },
        };
        let grid = PricingGrid::from_contract(&contract).unwrap();
        assert!(grid.price(100.0, 50.0).is_err());
        assert!(grid.price(200.0, 50.0).is_err());
    }

    #[test]
    fn test_malformed_matrix_rejected() {
        let contract = PricingGridContract {
            id: "bad".into(),
            name: None,
            encoding: PricingGridEncoding::Matrix {
                width_columns: vec![200.0, 100.0],
                drop_rows: vec![100.0],
                prices: vec![vec![Some(1.0), Some(2.0)]],
            },
        };
        assert_eq!(
            PricingGrid::from_contract(&contract).unwrap_err().error_code(),
            "SCHEMA_VIOLATION"
        );
    }

    #[test]
    fn test_direct_reference_wins() {
        let rules = vec![GridRule {
            price_group: "B".into(),
            grid_id: "group-b".into(),
            treatment: None,
            priority: 0,
        }];
        let reference = GridReference {
            direct_grid_id: Some("direct".into()),
            price_group: Some("B".into()),
            treatment: "roller_blinds".into(),
        };
        assert_eq!(reference.resolve(&rules).unwrap(), "direct");
    }

    #[test]
    fn test_price_group_resolution_by_priority_and_treatment() {
        let rules = vec![
            GridRule {
                price_group: "B".into(),
                grid_id: "generic".into(),
                treatment: None,
                priority: 0,
            },
            GridRule {
                price_group: "B".into(),
                grid_id: "roller-b".into(),
                treatment: Some("roller_blinds".into()),
                priority: 10,
            },
            GridRule {
                price_group: "B".into(),
                grid_id: "vertical-b".into(),
                treatment: Some("vertical_blinds".into()),
                priority: 20,
            },
        ];
        let reference = GridReference {
            direct_grid_id: None,
            price_group: Some("B".into()),
            treatment: "roller_blinds".into(),
        };
        assert_eq!(reference.resolve(&rules).unwrap(), "roller-b");

        let unknown = GridReference {
            price_group: Some("Z".into()),
            ..reference
        };
        assert!(unknown.resolve(&rules).is_err());
    }

    #[test]
    fn test_resolve_many_fetches_once() {
        let mut catalog = InMemoryCatalog::default();
        for id in ["a", "b"] {
            catalog.grids.push(PricingGridContract {
                id: id.into(),
                name: None,
                encoding: PricingGridEncoding::Rows {
                    widths: vec![0.0, 500.0],
                    rows: vec![GridRow {
                        drop: 500.0,
                        prices: vec![Some(10.0), Some(20.0)],
                    }],
                },
            });
        }
        let refs: Vec<GridReference> = ["a", "b", "a", "a", "b"]
            .iter()
            .map(|id| GridReference {
                direct_grid_id: Some(id.to_string()),
                price_group: None,
                treatment: "shutters".into(),
            })
            .collect();

        let (ids, set) = resolve_many(&refs, &[], &catalog).unwrap();
        assert_eq!(ids.len(), 5);
        assert_eq!(set.len(), 2);
        assert_eq!(catalog.grid_fetch_count(), 1);
    }

    #[test]
    fn test_missing_grid_in_catalog() {
        let catalog = InMemoryCatalog::default();
        let ids = BTreeSet::from(["ghost".to_string()]);
        let err = load_grids(&catalog, &ids).unwrap_err();
        assert!(err.to_string().contains("pricing_grid.ghost"));
    }
}
