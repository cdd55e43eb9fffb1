//! # Pricing CLI
//!
//! Command-line front end for `pricing_core`. Every command reads JSON
//! requests from files and prints either a short human summary or the full
//! JSON result (`--json`).
//!
//! ```text
//! pricing_cli treatment request.json
//! pricing_cli bom --catalog catalog.json request.json
//! pricing_cli bundle hardware.json
//! pricing_cli sample-catalog catalog.json
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `pricing_core=info,pricing_cli=info`).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pricing_core::bom::{AssemblyLine, InventoryItem, LineRole, PriceMode, TemplateAssembly};
use pricing_core::bundle::{calculate_bundle_with_limits, BundleInput, BundleResult};
use pricing_core::file_io::load_json;
use pricing_core::rules::PricingRuleContract;
use pricing_core::{
    calc_bom_and_price, load_catalog, price_treatment, save_catalog, CalcBomRequest, CalcBomResponse,
    CalculationResult, EngineSettings, InMemoryCatalog, TreatmentRequest,
};

#[derive(Debug, Parser)]
#[command(name = "pricing_cli", version, about = "Window-treatment pricing and BOM calculator")]
struct Cli {
    /// Engine settings file (JSON). Without it, settings come from PRICING_* variables.
    #[arg(long, global = true, env = "PRICING_SETTINGS")]
    settings: Option<PathBuf>,

    /// Print the full result as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Price one treatment with a full formula breakdown
    Treatment {
        request: PathBuf,
        /// Catalog used for price-group grid lookups
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Expand a template into a priced bill of materials
    Bom {
        #[arg(long)]
        catalog: PathBuf,
        request: PathBuf,
    },
    /// Price the accessories for a track or rod
    Bundle { input: PathBuf },
    /// Write a small example catalog
    SampleCatalog { path: PathBuf },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let settings = load_settings(cli.settings.as_deref())?;

    match &cli.command {
        Command::Treatment { request, catalog } => {
            let request: TreatmentRequest = read_request(request)?;
            let catalog = match catalog {
                Some(path) => open_catalog(path)?,
                None => InMemoryCatalog::new(),
            };
            let result = price_treatment(&request, &catalog, &settings).context("treatment pricing failed")?;
            emit(cli.json, &result, print_treatment)
        }
        Command::Bom { catalog, request } => {
            let catalog = open_catalog(catalog)?;
            let request: CalcBomRequest = read_request(request)?;
            let response = calc_bom_and_price(&request, &catalog, &settings).context("BOM pricing failed")?;
            emit(cli.json, &response, print_bom)
        }
        Command::Bundle { input } => {
            let input: BundleInput = read_request(input)?;
            let result =
                calculate_bundle_with_limits(&input, &settings.formula_limits).context("bundle pricing failed")?;
            emit(cli.json, &result, print_bundle)
        }
        Command::SampleCatalog { path } => {
            save_catalog(&sample_catalog()?, path)
                .with_context(|| format!("failed to write catalog to {}", path.display()))?;
            info!(path = %path.display(), "sample catalog written");
            println!("Sample catalog written to {}", path.display());
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pricing_core=info,pricing_cli=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_settings(path: Option<&Path>) -> Result<EngineSettings> {
    let settings = match path {
        Some(path) => {
            let settings: EngineSettings =
                load_json(path).with_context(|| format!("failed to load settings from {}", path.display()))?;
            settings.validate().context("invalid settings file")?;
            settings
        }
        None => EngineSettings::from_env().context("invalid PRICING_* environment settings")?,
    };
    Ok(settings)
}

fn read_request<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    load_json(path).with_context(|| format!("failed to read request {}", path.display()))
}

fn open_catalog(path: &Path) -> Result<InMemoryCatalog> {
    let catalog = load_catalog(path).with_context(|| format!("failed to load catalog {}", path.display()))?;
    for (kind, id) in catalog.dangling_references() {
        tracing::warn!(kind, id = %id, "catalog references a missing entry");
    }
    Ok(catalog)
}

fn emit<T: Serialize>(json: bool, value: &T, human: fn(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

fn print_treatment(result: &CalculationResult) {
    println!("Treatment: {} ({:?})", result.treatment.category, result.treatment.family);
    println!(
        "Size:      {:.1} x {:.1} cm, fullness {}",
        result.dimensions.width_cm, result.dimensions.drop_cm, result.dimensions.fullness
    );
    println!();
    println!("{}", result.breakdown.to_text());
    println!();
    println!("Subtotal:  {:>10.2}", result.subtotal);
    println!("Waste:     {:>10.2}", result.waste_amount);
    println!("Total:     {:>10.2}", result.total);
}

fn print_bom(response: &CalcBomResponse) {
    println!("{:<20} {:>10} {:<6} {:>10} {:>10}", "Item", "Qty", "Unit", "Price", "Total");
    for line in &response.bom {
        println!(
            "{:<20} {:>10.2} {:<6} {:>10.2} {:>10.2}",
            line.item_name, line.quantity, line.unit, line.unit_price, line.total
        );
    }
    let pb = &response.price_breakdown;
    println!();
    println!("Materials: {:>10.2}", pb.materials);
    println!("Labor:     {:>10.2}", pb.labor);
    println!("Markup:    {:>10.2}", pb.markup);
    for fee in &pb.fee_lines {
        println!("  {:<24} {:>10.2}", fee.description, fee.amount);
    }
    println!("Total:     {:>10.2}", response.price_total);
    if response.skipped_rules > 0 {
        println!("({} pricing rule(s) skipped)", response.skipped_rules);
    }
    if !response.defaulted_fields.is_empty() {
        println!("(defaults used for: {})", response.defaulted_fields.join(", "));
    }
}

fn print_bundle(result: &BundleResult) {
    println!("Accessories for {}", result.parent_key);
    for line in &result.lines {
        println!(
            "  {:<20} {:>6} x {:>8.2} = {:>8.2}",
            line.child_key, line.quantity, line.unit_price, line.total
        );
    }
    for skipped in &result.skipped {
        println!("  {:<20} {:>6} (not priced: {})", skipped.child_key, skipped.quantity, skipped.reason);
    }
    println!("Subtotal: {:.2}", result.subtotal);
}

/// Track-and-make-up template with a markup and a ladder fee
fn sample_catalog() -> Result<InMemoryCatalog> {
    let mut catalog = InMemoryCatalog::new();

    let mut linen = InventoryItem::new("linen", "Linen 137", "m", 20.0, 40.0);
    linen.attributes.insert("width_cm".into(), 137.0);
    catalog.inventory = vec![
        InventoryItem::new("track", "Aluminium track", "m", 8.0, 12.0),
        InventoryItem::new("sewing", "Make-up", "hr", 30.0, 45.0),
        linen,
    ];

    let mut sewing = AssemblyLine::new("sewing", "ceil(rail_width_m)", 0.0, LineRole::Labour, PriceMode::Cost);
    sewing.order_index = 2;
    let mut fabric = AssemblyLine::new(
        "linen",
        "ceil(rail_width_cm * 2 / fabric_width_cm) * drop_m",
        5.0,
        LineRole::Fabric,
        PriceMode::Sell,
    );
    fabric.order_index = 1;
    catalog.templates.push(TemplateAssembly {
        template_id: "track-curtain".into(),
        name: "Track curtain".into(),
        lines: vec![
            AssemblyLine::new("track", "rail_width_mm / 1000", 10.0, LineRole::Hardware, PriceMode::Sell),
            fabric,
            sewing,
        ],
    });

    let rules = serde_json::json!([
        { "id": "markup", "rule_type": "markup_percentage", "percentage": 10 },
        { "id": "delivery", "rule_type": "fixed_fee", "amount": 25 },
        { "id": "size-fee", "rule_type": "ladder", "tiers": [
            { "min_width_mm": 0, "max_width_mm": 1500, "price": 10 },
            { "min_width_mm": 1501, "max_width_mm": 4000, "price": 20 }
        ] }
    ]);
    catalog.pricing_rules =
        serde_json::from_value::<Vec<PricingRuleContract>>(rules).context("sample pricing rules")?;
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricing_core::catalog::CatalogSource;
    use serde_json::json;

    #[test]
    fn test_sample_catalog_prices() {
        let catalog = sample_catalog().unwrap();
        assert!(catalog.dangling_references().is_empty());
        assert_eq!(catalog.fetch_pricing_rules("org", None).unwrap().len(), 3);

        let request: CalcBomRequest = serde_json::from_value(json!({
            "org_id": "org",
            "template_id": "track-curtain",
            "state": { "rail_width_mm": 2000, "drop_mm": 2500, "fabric_id": "linen" }
        }))
        .unwrap();
        let response = calc_bom_and_price(&request, &catalog, &EngineSettings::default()).unwrap();
        assert_eq!(response.bom.len(), 3);
        assert_eq!(response.skipped_rules, 0);
        assert!(response.price_total > response.price_breakdown.materials);
    }

    #[test]
    fn test_cli_parses_bom_command() {
        let cli = Cli::parse_from(["pricing_cli", "--json", "bom", "--catalog", "c.json", "r.json"]);
        assert!(cli.json);
        match cli.command {
            Command::Bom { catalog, request } => {
                assert_eq!(catalog, PathBuf::from("c.json"));
                assert_eq!(request, PathBuf::from("r.json"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
