//! # pricing_core - Window-Treatment Pricing & BOM Engine
//!
//! `pricing_core` turns a window-treatment request (measurements, a
//! manufacturing template, a fabric or material, selected options) into an
//! itemized, auditable price, and expands templates into priced bills of
//! materials. All inputs and outputs are JSON-serializable.
//!
//! ## Design Philosophy
//!
//! - **Stateless**: every calculation is a pure function of its inputs
//! - **JSON-First**: all contracts and results implement Serialize/Deserialize
//! - **No silent defaults**: a missing contract field is an error; only the
//!   `calc_bom_and_price` boundary fills "not yet entered" measurements
//! - **Safe formulas**: stored quantity formulas are parsed over a fixed
//!   grammar, never executed
//!
//! ## Quick Start
//!
//! ```rust
//! use pricing_core::aggregator::{price_treatment, TreatmentRequest};
//! use pricing_core::catalog::InMemoryCatalog;
//! use pricing_core::EngineSettings;
//!
//! let request: TreatmentRequest = serde_json::from_str(r#"{
//!     "category": "curtains",
//!     "measurements": { "rail_width_mm": 2000, "drop_mm": 2500 },
//!     "template": {
//!         "header_hem_cm": 8, "bottom_hem_cm": 15, "side_hem_cm": 4, "seam_hem_cm": 1.5,
//!         "waste_percent": 5, "pricing_type": "per_running_meter",
//!         "default_fullness": 2.5, "manufacturing_price": 20
//!     },
//!     "fabric": { "name": "Linen", "width_cm": 137, "pricing_method": "per_running_meter", "price": 40 }
//! }"#).unwrap();
//!
//! let result = price_treatment(&request, &InMemoryCatalog::new(), &EngineSettings::default()).unwrap();
//! assert_eq!(result.fabric_usage.unwrap().widths_required, 4);
//! ```
//!
//! ## Modules
//!
//! - [`units`] - Unit newtypes and the mm/cm normalizer
//! - [`formula`] - Safe evaluator for stored quantity formulas
//! - [`grid`] - Pricing grid normalization, resolution and lookup
//! - [`classifier`] - Treatment category to calculation family
//! - [`usage`] - Fabric/material usage
//! - [`bundle`] - Hardware accessories derived from a track or rod
//! - [`bom`] - Assembly lines to priced BOM rows
//! - [`rules`] - Markup, fees and ladder pricing over a BOM
//! - [`aggregator`] - Full treatment price with audit breakdown
//! - [`service`] - The `calc_bom_and_price` entry point
//! - [`catalog`] - Batched read access to catalog data
//! - [`contracts`] - Input contracts and their validation
//! - [`settings`] - Engine configuration
//! - [`errors`] - Structured error types
//! - [`file_io`] - Catalog files with atomic saves

pub mod aggregator;
pub mod bom;
pub mod breakdown;
pub mod bundle;
pub mod catalog;
pub mod classifier;
pub mod contracts;
pub mod errors;
pub mod file_io;
pub mod formula;
pub mod grid;
pub mod rules;
pub mod service;
pub mod settings;
pub mod units;
pub mod usage;

// Re-export commonly used types at crate root for convenience
pub use aggregator::{price_treatment, price_treatments, CalculationResult, TreatmentRequest};
pub use catalog::{CatalogSource, InMemoryCatalog};
pub use errors::{PricingError, PricingResult};
pub use file_io::{load_catalog, save_catalog};
pub use service::{calc_bom_and_price, CalcBomRequest, CalcBomResponse};
pub use settings::EngineSettings;
