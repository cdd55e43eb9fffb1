//! # Catalog Source
//!
//! The engine never talks to a database. Every read goes through
//! [`CatalogSource`], whose methods are batched: one call per kind of
//! record, never one per item. All reads happen before any calculation
//! starts.
//!
//! [`InMemoryCatalog`] implements the trait over plain vectors and is the
//! shape of the catalog JSON file read by [`crate::file_io::load_catalog`].

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::bom::{InventoryItem, TemplateAssembly};
use crate::errors::{PricingError, PricingResult};
use crate::grid::{GridRule, PricingGridContract};
use crate::rules::PricingRuleContract;

/// Read-only access to catalog data.
///
/// Implementations must be safe to call from several threads at once; the
/// BOM entry point issues independent reads in parallel.
pub trait CatalogSource: Sync {
    /// Assembly lines of one template
    fn fetch_assembly(&self, org_id: &str, template_id: &str) -> PricingResult<TemplateAssembly>;

    /// Inventory items by id. Unknown ids are simply absent from the result.
    fn fetch_inventory(&self, org_id: &str, ids: &[String]) -> PricingResult<Vec<InventoryItem>>;

    /// Pricing grids by id. Unknown ids are simply absent from the result.
    fn fetch_grids(&self, ids: &[String]) -> PricingResult<Vec<PricingGridContract>>;

    /// Raw pricing rules for an organisation, optionally narrowed to a window type
    fn fetch_pricing_rules(&self, org_id: &str, window_type_id: Option<&str>) -> PricingResult<Vec<PricingRuleContract>>;

    /// Price-group to grid mappings for an organisation
    fn fetch_grid_rules(&self, org_id: &str) -> PricingResult<Vec<GridRule>>;
}

/// Catalog held in memory, loadable from JSON.
///
/// Read counters are kept per method so callers (and tests) can confirm
/// that lookups were batched.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct InMemoryCatalog {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// When set, only requests for this organisation are served
    #[serde(default)]
    pub org_id: Option<String>,
    #[serde(default)]
    pub templates: Vec<TemplateAssembly>,
    #[serde(default)]
    pub inventory: Vec<InventoryItem>,
    #[serde(default)]
    pub grids: Vec<PricingGridContract>,
    #[serde(default)]
    pub pricing_rules: Vec<PricingRuleContract>,
    #[serde(default)]
    pub grid_rules: Vec<GridRule>,
    #[serde(skip)]
    grid_fetches: AtomicUsize,
    #[serde(skip)]
    inventory_fetches: AtomicUsize,
}

fn default_schema_version() -> String {
    crate::file_io::CATALOG_SCHEMA_VERSION.to_string()
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        InMemoryCatalog {
            schema_version: default_schema_version(),
            ..Default::default()
        }
    }

    /// Number of `fetch_grids` calls served
    pub fn grid_fetch_count(&self) -> usize {
        self.grid_fetches.load(Ordering::Relaxed)
    }

    /// Number of `fetch_inventory` calls served
    pub fn inventory_fetch_count(&self) -> usize {
        self.inventory_fetches.load(Ordering::Relaxed)
    }

    fn check_org(&self, operation: &str, org_id: &str) -> PricingResult<()> {
        match &self.org_id {
            Some(owner) if owner != org_id => Err(PricingError::catalog(
                operation,
                format!("organisation '{}' is not served by this catalog", org_id),
            )),
            _ => Ok(()),
        }
    }

    /// Ids referenced anywhere in the catalog that do not resolve.
    ///
    /// Returns `(kind, id)` pairs; empty means the catalog is self-consistent.
    pub fn dangling_references(&self) -> Vec<(&'static str, String)> {
        let item_ids: BTreeSet<&str> = self.inventory.iter().map(|i| i.id.as_str()).collect();
        let grid_ids: BTreeSet<&str> = self.grids.iter().map(|g| g.id.as_str()).collect();
        let mut missing = Vec::new();

        for line in self.templates.iter().flat_map(|t| &t.lines) {
            if !item_ids.contains(line.inventory_item_id.as_str()) {
                missing.push(("inventory", line.inventory_item_id.clone()));
            }
            if let Some(grid) = &line.pricing_grid_id {
                if !grid_ids.contains(grid.as_str()) {
                    missing.push(("grid", grid.clone()));
                }
            }
        }
        for rule in &self.grid_rules {
            if !grid_ids.contains(rule.grid_id.as_str()) {
                missing.push(("grid", rule.grid_id.clone()));
            }
        }
        missing.sort();
        missing.dedup();
        missing
    }
}

impl CatalogSource for InMemoryCatalog {
    fn fetch_assembly(&self, org_id: &str, template_id: &str) -> PricingResult<TemplateAssembly> {
        self.check_org("fetch_assembly", org_id)?;
        self.templates
            .iter()
            .find(|t| t.template_id == template_id)
            .cloned()
            .ok_or_else(|| PricingError::schema_violation(format!("template.{}", template_id), "template not found"))
    }

    fn fetch_inventory(&self, org_id: &str, ids: &[String]) -> PricingResult<Vec<InventoryItem>> {
        self.check_org("fetch_inventory", org_id)?;
        self.inventory_fetches.fetch_add(1, Ordering::Relaxed);
        Ok(self.inventory.iter().filter(|i| ids.contains(&i.id)).cloned().collect())
    }

    fn fetch_grids(&self, ids: &[String]) -> PricingResult<Vec<PricingGridContract>> {
        self.grid_fetches.fetch_add(1, Ordering::Relaxed);
        Ok(self.grids.iter().filter(|g| ids.contains(&g.id)).cloned().collect())
    }

    fn fetch_pricing_rules(&self, org_id: &str, window_type_id: Option<&str>) -> PricingResult<Vec<PricingRuleContract>> {
        self.check_org("fetch_pricing_rules", org_id)?;
        Ok(self
            .pricing_rules
            .iter()
            .filter(|r| match (&r.window_type_id, window_type_id) {
                (Some(rule_wt), Some(wanted)) => rule_wt == wanted,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .cloned()
            .collect())
    }

    fn fetch_grid_rules(&self, org_id: &str) -> PricingResult<Vec<GridRule>> {
        self.check_org("fetch_grid_rules", org_id)?;
        Ok(self.grid_rules.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bom::{AssemblyLine, LineRole, PriceMode};

    fn catalog() -> InMemoryCatalog {
        let mut catalog: InMemoryCatalog = serde_json::from_str(
            r#"{
                "org_id": "org-1",
                "pricing_rules": [
                    { "id": "all", "rule_type": "fixed_fee", "amount": 10 },
                    { "id": "roller-only", "rule_type": "fixed_fee", "amount": 5, "window_type_id": "roller" }
                ]
            }"#,
        )
        .unwrap();
        catalog.inventory.push(InventoryItem::new("track", "Track", "m", 8.0, 12.0));
        catalog.templates.push(TemplateAssembly {
            template_id: "tpl".into(),
            name: "Track only".into(),
            lines: vec![
                AssemblyLine::new("track", "rail_width_mm/1000", 0.0, LineRole::Hardware, PriceMode::Sell),
                AssemblyLine::new("finial", "2", 0.0, LineRole::Hardware, PriceMode::Sell),
            ],
        });
        catalog
    }

    #[test]
    fn test_schema_version_defaults() {
        let c = catalog();
        assert_eq!(c.schema_version, crate::file_io::CATALOG_SCHEMA_VERSION);
    }

    #[test]
    fn test_rules_filtered_by_window_type() {
        let c = catalog();
        assert_eq!(c.fetch_pricing_rules("org-1", Some("roller")).unwrap().len(), 2);
        assert_eq!(c.fetch_pricing_rules("org-1", Some("roman")).unwrap().len(), 1);
        assert_eq!(c.fetch_pricing_rules("org-1", None).unwrap().len(), 1);
    }

    #[test]
    fn test_foreign_org_is_catalog_error() {
        let err = catalog().fetch_assembly("org-2", "tpl").unwrap_err();
        assert_eq!(err.error_code(), "CATALOG_ERROR");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_inventory_batch_and_counter() {
        let c = catalog();
        let items = c
            .fetch_inventory("org-1", &["track".to_string(), "ghost".to_string()])
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(c.inventory_fetch_count(), 1);
    }

    #[test]
    fn test_dangling_references() {
        let missing = catalog().dangling_references();
        assert_eq!(missing, vec![("inventory", "finial".to_string())]);
    }
}
