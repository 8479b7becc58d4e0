use super::FormulaError;
use std::{fmt::Display, iter::Peekable, str::CharIndices};

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Token {
    Number(f64),
    Metric(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {n}"),
            Token::Metric(id) => write!(f, "metric '{{{{{id}}}}}'"),
            Token::Plus => f.write_str("'+'"),
            Token::Minus => f.write_str("'-'"),
            Token::Star => f.write_str("'*'"),
            Token::Slash => f.write_str("'/'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct Spanned {
    pub token: Token,
    /// Byte offset in the formula
    pub position: usize,
}

pub(super) fn tokenize(formula: &str) -> Result<Vec<Spanned>, FormulaError> {
    let mut chars = formula.char_indices().peekable();
    let mut tokens = Vec::new();
    while let Some(&(position, c)) = chars.peek() {
        let token = match c {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '+' => single(&mut chars, Token::Plus),
            '-' => single(&mut chars, Token::Minus),
            '*' => single(&mut chars, Token::Star),
            '/' => single(&mut chars, Token::Slash),
            '(' => single(&mut chars, Token::LParen),
            ')' => single(&mut chars, Token::RParen),
            '{' => metric_reference(formula, &mut chars, position)?,
            '0'..='9' | '.' => number(formula, &mut chars, position)?,
            found => return Err(FormulaError::UnexpectedCharacter { position, found }),
        };
        tokens.push(Spanned { token, position });
    }
    Ok(tokens)
}

fn single(chars: &mut Peekable<CharIndices>, token: Token) -> Token {
    chars.next();
    token
}

/// `{{` + identifier without `}` + `}}`
fn metric_reference(
    formula: &str,
    chars: &mut Peekable<CharIndices>,
    start: usize,
) -> Result<Token, FormulaError> {
    let unterminated = FormulaError::UnterminatedReference { position: start };
    chars.next();
    match chars.next() {
        Some((_, '{')) => {}
        Some((position, found)) => {
            return Err(FormulaError::UnexpectedCharacter { position, found })
        }
        None => return Err(unterminated),
    }
    let id_start = start + 2;
    let mut id_end = None;
    for (i, c) in chars.by_ref() {
        if c == '}' {
            id_end = Some(i);
            break;
        }
    }
    let id_end = id_end.ok_or(unterminated.clone())?;
    if chars.next().map(|(_, c)| c) != Some('}') {
        return Err(unterminated);
    }
    let id = &formula[id_start..id_end];
    if id.is_empty() {
        return Err(FormulaError::EmptyReference { position: start });
    }
    Ok(Token::Metric(id.to_string()))
}

fn number(
    formula: &str,
    chars: &mut Peekable<CharIndices>,
    start: usize,
) -> Result<Token, FormulaError> {
    let mut end = start;
    let mut prev = None;
    while let Some(&(i, c)) = chars.peek() {
        let is_part = c.is_ascii_digit()
            || c == '.'
            || c == 'e'
            || c == 'E'
            || ((c == '+' || c == '-') && matches!(prev, Some('e' | 'E')));
        if !is_part {
            break;
        }
        chars.next();
        end = i + c.len_utf8();
        prev = Some(c);
    }
    let literal = &formula[start..end];
    literal
        .parse::<f64>()
        .map(Token::Number)
        .map_err(|_| FormulaError::InvalidNumber {
            position: start,
            literal: literal.to_string(),
        })
}
