//! # Treatment Classifier
//!
//! Maps a treatment category to the calculators that apply to it:
//!
//! | Category | Family | Grid priced | Needs |
//! |----------|--------|-------------|-------|
//! | curtains | linear | no | fabric |
//! | roman_blinds | area | no | fabric |
//! | roller_blinds | area | yes | fabric |
//! | venetian_blinds | area | yes | material |
//! | vertical_blinds | area | yes | both |
//! | cellular_blinds | area | yes | fabric |
//! | panel_glide | area | yes | fabric |
//! | shutters | area | yes | material |
//! | awnings | area | yes | fabric |
//! | wallpaper | area | no | material |
//! | tracks | linear | no | none |
//! | rods | linear | no | none |
//!
//! Unknown categories are an `UnsupportedTreatment` error; nothing falls
//! through to a default path.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::contracts::PricingMethod;
use crate::errors::{PricingError, PricingResult};

/// How usage is measured and charged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationFamily {
    /// Charged per running meter
    Linear,
    /// Charged per square meter
    Area,
}

impl CalculationFamily {
    pub fn name(self) -> &'static str {
        match self {
            CalculationFamily::Linear => "linear",
            CalculationFamily::Area => "area",
        }
    }

    /// Whether a charge basis fits how this family measures usage.
    /// Grid and fixed prices fit both.
    pub fn accepts(self, method: PricingMethod) -> bool {
        !matches!(
            (self, method),
            (CalculationFamily::Linear, PricingMethod::PerSquareMeter)
                | (CalculationFamily::Area, PricingMethod::PerRunningMeter)
        )
    }
}

/// What the treatment is made from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialRequirement {
    Fabric,
    Material,
    /// One fabric and one material (e.g. vertical blinds with fabric vanes)
    Both,
    None,
}

impl MaterialRequirement {
    pub fn accepts_fabric(self) -> bool {
        matches!(self, MaterialRequirement::Fabric | MaterialRequirement::Both)
    }

    pub fn accepts_material(self) -> bool {
        matches!(self, MaterialRequirement::Material | MaterialRequirement::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreatmentCategory {
    Curtains,
    RomanBlinds,
    RollerBlinds,
    VenetianBlinds,
    VerticalBlinds,
    CellularBlinds,
    PanelGlide,
    Shutters,
    Awnings,
    Wallpaper,
    Tracks,
    Rods,
}

impl TreatmentCategory {
    pub const ALL: [TreatmentCategory; 12] = [
        TreatmentCategory::Curtains,
        TreatmentCategory::RomanBlinds,
        TreatmentCategory::RollerBlinds,
        TreatmentCategory::VenetianBlinds,
        TreatmentCategory::VerticalBlinds,
        TreatmentCategory::CellularBlinds,
        TreatmentCategory::PanelGlide,
        TreatmentCategory::Shutters,
        TreatmentCategory::Awnings,
        TreatmentCategory::Wallpaper,
        TreatmentCategory::Tracks,
        TreatmentCategory::Rods,
    ];

    /// Canonical key, as used by grid rules and the data layer
    pub fn key(self) -> &'static str {
        match self {
            TreatmentCategory::Curtains => "curtains",
            TreatmentCategory::RomanBlinds => "roman_blinds",
            TreatmentCategory::RollerBlinds => "roller_blinds",
            TreatmentCategory::VenetianBlinds => "venetian_blinds",
            TreatmentCategory::VerticalBlinds => "vertical_blinds",
            TreatmentCategory::CellularBlinds => "cellular_blinds",
            TreatmentCategory::PanelGlide => "panel_glide",
            TreatmentCategory::Shutters => "shutters",
            TreatmentCategory::Awnings => "awnings",
            TreatmentCategory::Wallpaper => "wallpaper",
            TreatmentCategory::Tracks => "tracks",
            TreatmentCategory::Rods => "rods",
        }
    }

    pub fn classify(self) -> Classification {
        use CalculationFamily::{Area, Linear};
        use MaterialRequirement as Req;

        let (family, grid_priced, requirement) = match self {
            TreatmentCategory::Curtains => (Linear, false, Req::Fabric),
            TreatmentCategory::RomanBlinds => (Area, false, Req::Fabric),
            TreatmentCategory::RollerBlinds => (Area, true, Req::Fabric),
            TreatmentCategory::VenetianBlinds => (Area, true, Req::Material),
            TreatmentCategory::VerticalBlinds => (Area, true, Req::Both),
            TreatmentCategory::CellularBlinds => (Area, true, Req::Fabric),
            TreatmentCategory::PanelGlide => (Area, true, Req::Fabric),
            TreatmentCategory::Shutters => (Area, true, Req::Material),
            TreatmentCategory::Awnings => (Area, true, Req::Fabric),
            TreatmentCategory::Wallpaper => (Area, false, Req::Material),
            TreatmentCategory::Tracks | TreatmentCategory::Rods => (Linear, false, Req::None),
        };
        Classification {
            category: self,
            family,
            grid_priced,
            requirement,
        }
    }
}

impl FromStr for TreatmentCategory {
    type Err = PricingError;

    fn from_str(raw: &str) -> PricingResult<Self> {
        let key = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let category = match key.as_str() {
            "curtains" | "curtain" | "drapes" | "drapery" => TreatmentCategory::Curtains,
            "roman_blinds" | "roman_blind" | "roman" | "romans" => TreatmentCategory::RomanBlinds,
            "roller_blinds" | "roller_blind" | "roller" | "rollers" => TreatmentCategory::RollerBlinds,
            "venetian_blinds" | "venetian_blind" | "venetian" | "venetians" => TreatmentCategory::VenetianBlinds,
            "vertical_blinds" | "vertical_blind" | "vertical" | "verticals" => TreatmentCategory::VerticalBlinds,
            "cellular_blinds" | "cellular_blind" | "cellular" | "honeycomb_blinds" => TreatmentCategory::CellularBlinds,
            "panel_glide" | "panel_glides" | "panel_blinds" => TreatmentCategory::PanelGlide,
            "shutters" | "shutter" | "plantation_shutters" => TreatmentCategory::Shutters,
            "awnings" | "awning" => TreatmentCategory::Awnings,
            "wallpaper" | "wallcovering" => TreatmentCategory::Wallpaper,
            "tracks" | "track" | "curtain_track" => TreatmentCategory::Tracks,
            "rods" | "rod" | "curtain_rod" | "poles" | "pole" => TreatmentCategory::Rods,
            _ => return Err(PricingError::unsupported_treatment(raw)),
        };
        Ok(category)
    }
}

impl fmt::Display for TreatmentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Which calculators run for a category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: TreatmentCategory,
    pub family: CalculationFamily,
    pub grid_priced: bool,
    pub requirement: MaterialRequirement,
}

impl Classification {
    /// Check that the supplied fabric/material fit the requirement.
    pub fn check_inputs(&self, has_fabric: bool, has_material: bool) -> PricingResult<()> {
        let req = self.requirement;
        if has_fabric && !req.accepts_fabric() {
            return Err(PricingError::schema_violation(
                "fabric",
                format!("{} does not take a fabric", self.category),
            ));
        }
        if has_material && !req.accepts_material() {
            return Err(PricingError::schema_violation(
                "material",
                format!("{} does not take a material", self.category),
            ));
        }
        match req {
            MaterialRequirement::Fabric if !has_fabric => {
                Err(PricingError::schema_violation("fabric", "required field is missing"))
            }
            MaterialRequirement::Material if !has_material => {
                Err(PricingError::schema_violation("material", "required field is missing"))
            }
            MaterialRequirement::Both if !has_fabric && !has_material => Err(PricingError::schema_violation(
                "fabric/material",
                format!("{} needs a fabric or a material", self.category),
            )),
            _ => Ok(()),
        }
    }

    /// Check the template, fabric and material charge bases against the
    /// family and the grid flag.
    ///
    /// A fabric or material grid price needs a grid-priced category, and a
    /// grid-priced category needs at least one grid among the three.
    pub fn check_pricing(
        &self,
        template: PricingMethod,
        fabric: Option<PricingMethod>,
        material: Option<PricingMethod>,
    ) -> PricingResult<()> {
        let priced = [
            ("template.pricing_type", Some(template)),
            ("fabric.pricing_method", fabric),
            ("material.pricing_method", material),
        ];
        for (field, method) in priced {
            let Some(method) = method else { continue };
            if !self.family.accepts(method) {
                return Err(PricingError::schema_violation(
                    field,
                    format!(
                        "{} pricing does not fit {} ({} family)",
                        method.display_name(),
                        self.category,
                        self.family.name()
                    ),
                ));
            }
            if method == PricingMethod::PricingGrid && field != "template.pricing_type" && !self.grid_priced {
                return Err(PricingError::schema_violation(
                    field,
                    format!("{} are not priced from a grid", self.category),
                ));
            }
        }
        if self.grid_priced && !priced.iter().any(|(_, m)| *m == Some(PricingMethod::PricingGrid)) {
            return Err(PricingError::schema_violation(
                "pricing_grid",
                format!("{} must be priced from a grid", self.category),
            ));
        }
        Ok(())
    }
}

/// Classify a raw category string.
pub fn classify(category: &str) -> PricingResult<Classification> {
    Ok(category.parse::<TreatmentCategory>()?.classify())
}
