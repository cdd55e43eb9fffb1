//! Tokenizer for stored quantity formulas.
//!
//! Only a closed set of characters is accepted. Anything else (quotes,
//! brackets, semicolons, backticks, `$`, ...) is rejected with its position
//! so a broken template can be located and fixed.

use crate::errors::{PricingError, PricingResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
    Question,
    Colon,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {}", n),
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::Plus => "'+'".into(),
            Token::Minus => "'-'".into(),
            Token::Star => "'*'".into(),
            Token::Slash => "'/'".into(),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
            Token::Comma => "','".into(),
            Token::Question => "'?'".into(),
            Token::Colon => "':'".into(),
            Token::Lt => "'<'".into(),
            Token::Le => "'<='".into(),
            Token::Gt => "'>'".into(),
            Token::Ge => "'>='".into(),
            Token::EqEq => "'=='".into(),
            Token::NotEq => "'!='".into(),
            Token::AndAnd => "'&&'".into(),
            Token::OrOr => "'||'".into(),
        }
    }
}

/// Split a formula into tokens.
pub fn tokenize(source: &str) -> PricingResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        let token = match ch {
            c if c.is_ascii_whitespace() => continue,
            c if c.is_ascii_digit() || c == '.' => {
                let mut text = String::new();
                text.push(c);
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_ascii_digit() || next == '.' {
                        text.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = text.parse::<f64>().map_err(|_| {
                    PricingError::formula(source, format!("malformed number '{}' at position {}", text, pos))
                })?;
                Token::Number(value)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                name.push(c);
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        name.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                Token::Ident(name)
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            '?' => Token::Question,
            ':' => Token::Colon,
            '<' => {
                if next_is(&mut chars, '=') {
                    Token::Le
                } else {
                    Token::Lt
                }
            }
            '>' => {
                if next_is(&mut chars, '=') {
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            '=' if next_is(&mut chars, '=') => Token::EqEq,
            '!' if next_is(&mut chars, '=') => Token::NotEq,
            '&' if next_is(&mut chars, '&') => Token::AndAnd,
            '|' if next_is(&mut chars, '|') => Token::OrOr,
            other => {
                return Err(PricingError::formula(
                    source,
                    format!("character '{}' at position {} is not allowed", other, pos),
                ));
            }
        };
        tokens.push(token);
    }

    Ok(tokens)
}

fn next_is(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>, expected: char) -> bool {
    if matches!(chars.peek(), Some(&(_, c)) if c == expected) {
        chars.next();
        true
    } else {
        false
    }
}
