//! Recursive-descent parser and AST evaluator.
//!
//! ```text
//! expr     := or ( '?' expr ':' expr )?
//! or       := and ( '||' and )*
//! and      := cmp ( '&&' cmp )*
//! cmp      := sum ( ('<'|'<='|'>'|'>='|'=='|'!=') sum )?
//! sum      := term ( ('+'|'-') term )*
//! term     := unary ( ('*'|'/') unary )*
//! unary    := '-' unary | primary
//! primary  := number | ident | func '(' expr (',' expr)* ')' | '(' expr ')'
//! ```

use serde::{Deserialize, Serialize};

use super::context::FormulaContext;
use super::lexer::Token;
use crate::errors::{PricingError, PricingResult};

/// Whitelisted functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Function {
    Ceil,
    Floor,
    Round,
    Max,
    Min,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "ceil" => Some(Function::Ceil),
            "floor" => Some(Function::Floor),
            "round" => Some(Function::Round),
            "max" => Some(Function::Max),
            "min" => Some(Function::Min),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Function::Ceil => "ceil",
            Function::Floor => "floor",
            Function::Round => "round",
            Function::Max => "max",
            Function::Min => "min",
        }
    }

    fn check_arity(self, count: usize) -> Result<(), String> {
        let ok = match self {
            Function::Ceil | Function::Floor | Function::Round => count == 1,
            Function::Max | Function::Min => count >= 2,
        };
        if ok {
            Ok(())
        } else {
            Err(format!("{}() called with {} argument(s)", self.name(), count))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

/// Parsed formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Number(f64),
    Ident(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Ternary {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call { func: Function, args: Vec<Expr> },
}

impl Expr {
    /// Evaluate against a context. No side effects, no host-language evaluation.
    pub fn eval(&self, ctx: &FormulaContext) -> Result<f64, String> {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Ident(name) => ctx
                .get(name)
                .ok_or_else(|| format!("unknown identifier '{}'", name)),
            Expr::Neg(inner) => Ok(-inner.eval(ctx)?),
            Expr::Binary { op, lhs, rhs } => {
                let l = lhs.eval(ctx)?;
                // short-circuit logical operators
                match op {
                    BinaryOp::And if l == 0.0 => return Ok(0.0),
                    BinaryOp::Or if l != 0.0 => return Ok(1.0),
                    _ => {}
                }
                let r = rhs.eval(ctx)?;
                let flag = |b: bool| if b { 1.0 } else { 0.0 };
                Ok(match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => {
                        if r == 0.0 {
                            return Err("division by zero".to_string());
                        }
                        l / r
                    }
                    BinaryOp::Lt => flag(l < r),
                    BinaryOp::Le => flag(l <= r),
                    BinaryOp::Gt => flag(l > r),
                    BinaryOp::Ge => flag(l >= r),
                    BinaryOp::Eq => flag((l - r).abs() < f64::EPSILON),
                    BinaryOp::Ne => flag((l - r).abs() >= f64::EPSILON),
                    BinaryOp::And | BinaryOp::Or => flag(r != 0.0),
                })
            }
            Expr::Ternary {
                condition,
                then,
                otherwise,
            } => {
                if condition.eval(ctx)? != 0.0 {
                    then.eval(ctx)
                } else {
                    otherwise.eval(ctx)
                }
            }
            Expr::Call { func, args } => {
                // trees can arrive deserialized, not only from the parser
                func.check_arity(args.len())?;
                let values = args
                    .iter()
                    .map(|a| a.eval(ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                match (func, values.as_slice()) {
                    (Function::Ceil, [x]) => Ok(x.ceil()),
                    (Function::Floor, [x]) => Ok(x.floor()),
                    (Function::Round, [x]) => Ok(x.round()),
                    (Function::Max, _) => Ok(values.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
                    (Function::Min, _) => Ok(values.iter().copied().fold(f64::INFINITY, f64::min)),
                    _ => Err(format!("{}() called with {} argument(s)", func.name(), values.len())),
                }
            }
        }
    }

    /// True if the expression calls `ceil` or `floor` anywhere.
    pub fn calls_explicit_rounding(&self) -> bool {
        match self {
            Expr::Number(_) | Expr::Ident(_) => false,
            Expr::Neg(inner) => inner.calls_explicit_rounding(),
            Expr::Binary { lhs, rhs, .. } => lhs.calls_explicit_rounding() || rhs.calls_explicit_rounding(),
            Expr::Ternary {
                condition,
                then,
                otherwise,
            } => {
                condition.calls_explicit_rounding()
                    || then.calls_explicit_rounding()
                    || otherwise.calls_explicit_rounding()
            }
            Expr::Call { func, args } => {
                matches!(func, Function::Ceil | Function::Floor)
                    || args.iter().any(Expr::calls_explicit_rounding)
            }
        }
    }

    /// Collect every identifier the expression reads.
    pub fn identifiers(&self, out: &mut Vec<String>) {
        match self {
            Expr::Number(_) => {}
            Expr::Ident(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Expr::Neg(inner) => inner.identifiers(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.identifiers(out);
                rhs.identifiers(out);
            }
            Expr::Ternary {
                condition,
                then,
                otherwise,
            } => {
                condition.identifiers(out);
                then.identifiers(out);
                otherwise.identifiers(out);
            }
            Expr::Call { args, .. } => args.iter().for_each(|a| a.identifiers(out)),
        }
    }
}

pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, tokens: Vec<Token>, max_depth: usize) -> Self {
        Parser {
            source,
            tokens,
            pos: 0,
            depth: 0,
            max_depth,
        }
    }

    /// Parse the whole token stream into one expression.
    pub fn parse(mut self) -> PricingResult<Expr> {
        if self.tokens.is_empty() {
            return Err(self.error("formula is empty"));
        }
        let expr = self.expr()?;
        if let Some(token) = self.peek() {
            return Err(self.error(format!("unexpected {} after end of expression", token.describe())));
        }
        Ok(expr)
    }

    fn error(&self, reason: impl Into<String>) -> PricingError {
        PricingError::formula(self.source, reason)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> PricingResult<()> {
        match self.advance() {
            Some(ref t) if *t == expected => Ok(()),
            Some(t) => Err(self.error(format!("expected {}, found {}", expected.describe(), t.describe()))),
            None => Err(self.error(format!("expected {}, found end of formula", expected.describe()))),
        }
    }

    fn enter(&mut self) -> PricingResult<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(self.error(format!("nesting deeper than {} levels", self.max_depth)));
        }
        Ok(())
    }

    fn expr(&mut self) -> PricingResult<Expr> {
        self.enter()?;
        let condition = self.or()?;
        let result = if self.eat(&Token::Question) {
            let then = self.expr()?;
            self.expect(Token::Colon)?;
            let otherwise = self.expr()?;
            Expr::Ternary {
                condition: Box::new(condition),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            }
        } else {
            condition
        };
        self.depth -= 1;
        Ok(result)
    }

    fn or(&mut self) -> PricingResult<Expr> {
        let mut lhs = self.and()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and(&mut self) -> PricingResult<Expr> {
        let mut lhs = self.comparison()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.comparison()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> PricingResult<Expr> {
        let lhs = self.sum()?;
        let op = match self.peek() {
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Ge) => BinaryOp::Ge,
            Some(Token::EqEq) => BinaryOp::Eq,
            Some(Token::NotEq) => BinaryOp::Ne,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.sum()?;
        Ok(binary(op, lhs, rhs))
    }

    fn sum(&mut self) -> PricingResult<Expr> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn term(&mut self) -> PricingResult<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn unary(&mut self) -> PricingResult<Expr> {
        if self.eat(&Token::Minus) {
            self.enter()?;
            let inner = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> PricingResult<Expr> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    let func = Function::from_name(&name)
                        .ok_or_else(|| self.error(format!("function '{}' is not allowed", name)))?;
                    self.pos += 1;
                    let mut args = vec![self.expr()?];
                    while self.eat(&Token::Comma) {
                        args.push(self.expr()?);
                    }
                    self.expect(Token::RParen)?;
                    func.check_arity(args.len()).map_err(|reason| self.error(reason))?;
                    Ok(Expr::Call { func, args })
                } else {
                    match name.as_str() {
                        "true" => Ok(Expr::Number(1.0)),
                        "false" => Ok(Expr::Number(0.0)),
                        _ => Ok(Expr::Ident(name)),
                    }
                }
            }
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(token) => Err(self.error(format!("unexpected {}", token.describe()))),
            None => Err(self.error("unexpected end of formula")),
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::lexer::tokenize;

    fn parse(source: &str) -> PricingResult<Expr> {
        Parser::new(source, tokenize(source)?, 32).parse()
    }

    #[test]
    fn test_precedence() {
        let expr = parse("2 + 3 * 4").unwrap();
        assert_eq!(expr.eval(&FormulaContext::new()).unwrap(), 14.0);

        let expr = parse("(2 + 3) * 4").unwrap();
        assert_eq!(expr.eval(&FormulaContext::new()).unwrap(), 20.0);
    }

    #[test]
    fn test_ternary_is_right_associative() {
        let ctx = FormulaContext::new().with("w", 15.0);
        let expr = parse("w > 20 ? 3 : w > 10 ? 2 : 1").unwrap();
        assert_eq!(expr.eval(&ctx).unwrap(), 2.0);
    }

    #[test]
    fn test_unknown_function_rejected() {
        let err = parse("exp(2)").unwrap_err();
        assert!(err.to_string().contains("not allowed"));
    }

    #[test]
    fn test_arity_checked() {
        assert!(parse("ceil(1, 2)").is_err());
        assert!(parse("max(1)").is_err());
        assert!(parse("min(1, 2, 3)").is_ok());
    }

    #[test]
    fn test_deserialized_call_arity_checked() {
        let ctx = FormulaContext::new();
        let empty: Expr = serde_json::from_str(r#"{"Call":{"func":"Ceil","args":[]}}"#).unwrap();
        assert_eq!(empty.eval(&ctx).unwrap_err(), "ceil() called with 0 argument(s)");

        let single_max = Expr::Call {
            func: Function::Max,
            args: vec![Expr::Number(1.0)],
        };
        assert!(single_max.eval(&ctx).is_err());
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!("{}1{}", "(".repeat(40), ")".repeat(40));
        let err = parse(&deep).unwrap_err();
        assert!(err.to_string().contains("nesting"));
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        assert!(parse("1 2").is_err());
        assert!(parse("(1 + 2").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn test_explicit_rounding_detection() {
        assert!(parse("ceil(w / 2)").unwrap().calls_explicit_rounding());
        assert!(parse("1 + floor(w)").unwrap().calls_explicit_rounding());
        assert!(!parse("round(w / 2)").unwrap().calls_explicit_rounding());
    }
}
