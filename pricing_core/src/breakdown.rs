//! # Formula Breakdown
//!
//! Ordered audit trail of a calculation. Each step records the formula in
//! symbols, the same formula with values substituted, and the result, so a
//! quote can be checked by hand.
//!
//! ```rust
//! use pricing_core::breakdown::{FormulaBreakdown, StepCategory};
//!
//! let mut breakdown = FormulaBreakdown::new();
//! breakdown.record(
//!     StepCategory::Usage,
//!     "Widths required",
//!     "ceil((width x fullness + returns) / fabric_width)",
//!     "ceil((200 x 2.5 + 0) / 137)",
//!     4.0,
//!     "widths",
//! );
//! assert_eq!(breakdown.steps()[0].index, 1);
//! println!("{}", breakdown.to_text());
//! ```

use serde::{Deserialize, Serialize};

use crate::formula::format_number;

/// Groups steps for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepCategory {
    Dimensions,
    Usage,
    Fabric,
    Material,
    Manufacturing,
    Options,
    Waste,
    Totals,
}

impl StepCategory {
    pub fn display_name(&self) -> &'static str {
        match self {
            StepCategory::Dimensions => "Dimensions",
            StepCategory::Usage => "Usage",
            StepCategory::Fabric => "Fabric",
            StepCategory::Material => "Material",
            StepCategory::Manufacturing => "Manufacturing",
            StepCategory::Options => "Options",
            StepCategory::Waste => "Waste",
            StepCategory::Totals => "Totals",
        }
    }
}

/// One recorded step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaStep {
    /// 1-based position in the breakdown
    pub index: usize,
    pub category: StepCategory,
    pub label: String,
    pub formula: String,
    pub substituted: String,
    pub result: f64,
    pub unit: String,
}

impl FormulaStep {
    /// `label: formula = substituted = result unit`
    pub fn describe(&self) -> String {
        let unit = if self.unit.is_empty() {
            String::new()
        } else {
            format!(" {}", self.unit)
        };
        if self.formula == self.substituted {
            format!("{}: {} = {}{}", self.label, self.formula, format_number(self.result), unit)
        } else {
            format!(
                "{}: {} = {} = {}{}",
                self.label,
                self.formula,
                self.substituted,
                format_number(self.result),
                unit
            )
        }
    }
}

/// Ordered list of steps, in the order they were computed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormulaBreakdown {
    steps: Vec<FormulaStep>,
}

impl FormulaBreakdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step
    pub fn record(
        &mut self,
        category: StepCategory,
        label: impl Into<String>,
        formula: impl Into<String>,
        substituted: impl Into<String>,
        result: f64,
        unit: impl Into<String>,
    ) {
        self.steps.push(FormulaStep {
            index: self.steps.len() + 1,
            category,
            label: label.into(),
            formula: formula.into(),
            substituted: substituted.into(),
            result,
            unit: unit.into(),
        });
    }

    /// Append a step that is a plain value (no formula)
    pub fn record_value(&mut self, category: StepCategory, label: impl Into<String>, result: f64, unit: impl Into<String>) {
        let shown = format_number(result);
        self.record(category, label, shown.clone(), shown, result, unit);
    }

    pub fn steps(&self) -> &[FormulaStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps of one category, in recorded order
    pub fn in_category(&self, category: StepCategory) -> impl Iterator<Item = &FormulaStep> {
        self.steps.iter().filter(move |s| s.category == category)
    }

    /// First step with the given label
    pub fn find(&self, label: &str) -> Option<&FormulaStep> {
        self.steps.iter().find(|s| s.label == label)
    }

    /// Append another breakdown, renumbering its steps
    pub fn merge(&mut self, other: FormulaBreakdown) {
        for mut step in other.steps {
            step.index = self.steps.len() + 1;
            self.steps.push(step);
        }
    }

    /// Plain-text rendering grouped under category headings, in recorded order.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let mut current: Option<StepCategory> = None;
        for step in &self.steps {
            if current != Some(step.category) {
                if current.is_some() {
                    out.push('\n');
                }
                out.push_str(step.category.display_name());
                out.push('\n');
                current = Some(step.category);
            }
            out.push_str(&format!("  {:>2}. {}\n", step.index, step.describe()));
        }
        out
    }
}
