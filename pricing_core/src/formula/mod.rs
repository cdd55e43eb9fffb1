//! # Formula Evaluator
//!
//! Quantity formulas (`"ceil(widthFt * 6) * (isDouble ? 2 : 1)"`,
//! `"rail_width_mm / 1000"`) are stored configuration written by workroom
//! staff. They are parsed into an AST over a fixed grammar and evaluated
//! against a [`FormulaContext`]; nothing else is reachable.
//!
//! Accepted:
//! - numbers, `+ - * /`, parentheses, unary minus
//! - comparisons `< <= > >= == !=`, `&&`, `||` and the ternary `c ? a : b`
//! - functions `ceil`, `floor`, `round`, `max`, `min`
//! - identifiers present in the context, plus the literals `true`/`false`
//!
//! Anything else (unknown identifier, unknown function, stray character) is a
//! `FormulaEvaluation` error. A bad formula never evaluates to zero.
//!
//! ## Example
//!
//! ```rust
//! use pricing_core::formula::{Formula, FormulaContext};
//!
//! let ctx = FormulaContext::new().with("widthFt", 10.0).with_flag("isDouble", true);
//! let runners = Formula::parse("ceil(widthFt * 6) * (isDouble ? 2 : 1)").unwrap();
//! assert_eq!(runners.evaluate(&ctx).unwrap(), 120.0);
//!
//! assert!(Formula::parse("require('fs')").is_err());
//! ```

pub mod context;
pub mod lexer;
pub mod parser;

pub use context::FormulaContext;
pub use parser::{BinaryOp, Expr, Function};

use crate::errors::{PricingError, PricingResult};
use crate::settings::FormulaLimits;

/// A parsed, validated formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    ast: Expr,
}

impl Formula {
    /// Parse with default limits
    pub fn parse(source: &str) -> PricingResult<Self> {
        Self::parse_with_limits(source, &FormulaLimits::default())
    }

    /// Parse, rejecting formulas longer or deeper than `limits` allow.
    pub fn parse_with_limits(source: &str, limits: &FormulaLimits) -> PricingResult<Self> {
        if source.chars().count() > limits.max_length {
            return Err(PricingError::formula(
                source,
                format!("formula longer than {} characters", limits.max_length),
            ));
        }
        let tokens = lexer::tokenize(source)?;
        let ast = parser::Parser::new(source, tokens, limits.max_depth).parse()?;
        Ok(Formula {
            source: source.to_string(),
            ast,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    /// Identifiers the formula reads, in first-use order
    pub fn identifiers(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.ast.identifiers(&mut out);
        out
    }

    /// Evaluate to a raw number. Non-finite results are errors.
    pub fn evaluate(&self, ctx: &FormulaContext) -> PricingResult<f64> {
        // every name must resolve, including ones in branches that are not taken
        if let Some(missing) = self.identifiers().into_iter().find(|name| !ctx.contains(name)) {
            return Err(PricingError::formula(
                &self.source,
                format!("unknown identifier '{}'", missing),
            ));
        }
        let value = self
            .ast
            .eval(ctx)
            .map_err(|reason| PricingError::formula(&self.source, reason))?;
        if !value.is_finite() {
            return Err(PricingError::formula(&self.source, "result is not a finite number"));
        }
        Ok(value)
    }

    /// Evaluate as a quantity: negative results clamp to zero.
    pub fn evaluate_quantity(&self, ctx: &FormulaContext) -> PricingResult<f64> {
        Ok(self.evaluate(ctx)?.max(0.0))
    }

    /// Evaluate as a count of whole units.
    ///
    /// Rounds to the nearest unit unless the formula already calls
    /// `ceil`/`floor`, in which case its own rounding stands.
    pub fn evaluate_units(&self, ctx: &FormulaContext) -> PricingResult<f64> {
        let quantity = self.evaluate_quantity(ctx)?;
        if self.ast.calls_explicit_rounding() {
            Ok(quantity)
        } else {
            Ok(quantity.round())
        }
    }

    /// Render the formula with every identifier replaced by its value,
    /// for the audit breakdown.
    pub fn substituted(&self, ctx: &FormulaContext) -> String {
        let mut text = self.source.clone();
        let mut names = self.identifiers();
        // longest first so `width` does not clobber `width_cm`
        names.sort_by_key(|n| std::cmp::Reverse(n.len()));
        for name in names {
            if let Some(v) = ctx.get(&name) {
                text = replace_identifier(&text, &name, &format_number(v));
            }
        }
        text
    }
}

impl std::fmt::Display for Formula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// Evaluate a one-off formula string.
pub fn evaluate(source: &str, ctx: &FormulaContext) -> PricingResult<f64> {
    Formula::parse(source)?.evaluate(ctx)
}

/// Compact number rendering for breakdown text (`2`, `2.5`, `0.333`)
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let text = format!("{:.3}", value);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn replace_identifier(text: &str, name: &str, value: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let is_ident = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    let mut i = 0;
    while i < text.len() {
        if text[i..].starts_with(name)
            && (i == 0 || !is_ident(bytes[i - 1]))
            && bytes.get(i + name.len()).map_or(true, |b| !is_ident(*b))
        {
            out.push_str(value);
            i += name.len();
        } else {
            let ch = text[i..].chars().next().unwrap_or(' ');
            out.push(ch);
            i += ch.len_utf8();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rail_width_quantity() {
        let ctx = FormulaContext::new().with("rail_width_mm", 2000.0);
        assert_eq!(evaluate("rail_width_mm/1000", &ctx).unwrap(), 2.0);
    }

    #[test]
    fn test_unknown_identifier_is_error_not_zero() {
        let ctx = FormulaContext::new().with("widthFt", 10.0);
        let err = evaluate("widthFt * missing", &ctx).unwrap_err();
        assert_eq!(err.error_code(), "FORMULA_EVALUATION");
        assert!(err.to_string().contains("unknown identifier 'missing'"));
    }

    #[test]
    fn test_division_by_zero() {
        let ctx = FormulaContext::new().with("n", 0.0);
        assert!(evaluate("10 / n", &ctx).is_err());
    }

    #[test]
    fn test_quantity_clamps_negative() {
        let f = Formula::parse("widthFt - 20").unwrap();
        let ctx = FormulaContext::new().with("widthFt", 10.0);
        assert_eq!(f.evaluate(&ctx).unwrap(), -10.0);
        assert_eq!(f.evaluate_quantity(&ctx).unwrap(), 0.0);
    }

    #[test]
    fn test_units_round_to_nearest_without_explicit_rounding() {
        let ctx = FormulaContext::new().with("widthFt", 10.0);
        assert_eq!(Formula::parse("widthFt / 4").unwrap().evaluate_units(&ctx).unwrap(), 3.0);
        assert_eq!(Formula::parse("floor(widthFt / 4) + 0.5").unwrap().evaluate_units(&ctx).unwrap(), 2.5);
    }

    #[test]
    fn test_length_limit() {
        let limits = FormulaLimits { max_length: 8, max_depth: 8 };
        assert!(Formula::parse_with_limits("1+2+3+4+5", &limits).is_err());
        assert!(Formula::parse_with_limits("1+2", &limits).is_ok());
    }

    #[test]
    fn test_logical_operators() {
        let ctx = FormulaContext::new().with("widthFt", 12.0).with_flag("isCeiling", true);
        assert_eq!(evaluate("widthFt > 8 && isCeiling ? 1 : 0", &ctx).unwrap(), 1.0);
        assert_eq!(evaluate("widthFt > 20 || isCeiling == 0", &ctx).unwrap(), 0.0);
    }

    #[test]
    fn test_unknown_identifier_in_untaken_branch_is_error() {
        let ctx = FormulaContext::new().with_flag("isDouble", false).with("widthFt", 3.0);
        for source in [
            "isDouble ? typo_runnerz * 2 : 1",
            "isDouble && no_such_key",
            "widthFt > 1 || no_such_key",
        ] {
            let err = evaluate(source, &ctx).unwrap_err();
            assert_eq!(err.error_code(), "FORMULA_EVALUATION", "{}", source);
            assert!(err.to_string().contains("unknown identifier"), "{}", source);
        }
        // operators still short-circuit once every name resolves
        let ctx = ctx.with("runners", 5.0);
        assert_eq!(evaluate("isDouble ? runners * 2 : 1", &ctx).unwrap(), 1.0);
        assert_eq!(evaluate("isDouble && runners / 0", &ctx).unwrap(), 0.0);
    }

    #[test]
    fn test_substituted_rendering() {
        let f = Formula::parse("ceil(width / 2) + width_cm").unwrap();
        let ctx = FormulaContext::new().with("width", 9.0).with("width_cm", 274.32);
        assert_eq!(f.substituted(&ctx), "ceil(9 / 2) + 274.32");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(2.0), "2");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(1.0 / 3.0), "0.333");
    }
}
