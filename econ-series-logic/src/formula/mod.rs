//! Formulas combine `{{metric_id}}` references, numbers and `+ - * / ( )`.
//!
//! A formula is compiled once ([`Formula::parse`]) and then evaluated for
//! every aligned timestamp ([`Formula::evaluate`]). Evaluation never goes
//! through any kind of dynamic code execution.

mod lexer;
mod parser;

pub use parser::MAX_NESTING;

use parser::Instruction;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("formula is empty")]
    Empty,
    #[error("unexpected character '{found}' at position {position}")]
    UnexpectedCharacter { position: usize, found: char },
    #[error("unterminated metric reference at position {position}")]
    UnterminatedReference { position: usize },
    #[error("empty metric reference at position {position}")]
    EmptyReference { position: usize },
    #[error("invalid number '{literal}' at position {position}")]
    InvalidNumber { position: usize, literal: String },
    #[error("unexpected {found} at position {position}")]
    UnexpectedToken { position: usize, found: String },
    #[error("unexpected end of formula")]
    UnexpectedEnd,
    #[error("unbalanced parentheses at position {position}")]
    UnbalancedParentheses { position: usize },
    #[error("formula is nested deeper than {limit} levels")]
    NestingTooDeep { limit: usize },
    #[error("no value for metric '{0}'")]
    UnresolvedIdentifier(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("result is not a finite number")]
    NonFinite,
}

impl FormulaError {
    /// Structural errors make the formula unusable for any input,
    /// the rest depend on the values at a particular timestamp.
    pub fn is_structural(&self) -> bool {
        !matches!(
            self,
            FormulaError::UnresolvedIdentifier(_)
                | FormulaError::DivisionByZero
                | FormulaError::NonFinite
        )
    }
}

/// Ids of all `{{id}}` references in `formula`.
///
/// Works on malformed formulas as well: only the reference syntax
/// (`{{` + at least one char other than `}` + `}}`) is looked at.
pub fn extract_dependencies(formula: &str) -> BTreeSet<String> {
    let mut dependencies = BTreeSet::new();
    let mut rest = formula;
    while let Some(open) = rest.find("{{") {
        let after_open = &rest[open + 2..];
        let id_len = after_open.find('}').unwrap_or(after_open.len());
        let id = &after_open[..id_len];
        if id_len > 0 && after_open[id_len..].starts_with("}}") {
            dependencies.insert(id.to_string());
            rest = &after_open[id_len + 2..];
        } else {
            rest = &rest[open + 1..];
        }
    }
    dependencies
}

/// Parse `formula`, substitute values of referenced metrics and evaluate.
pub fn substitute_and_evaluate(
    formula: &str,
    values: &HashMap<String, f64>,
) -> Result<f64, FormulaError> {
    Formula::parse(formula)?.evaluate(values)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    program: Vec<Instruction>,
    dependencies: BTreeSet<String>,
}

impl Formula {
    pub fn parse(source: &str) -> Result<Self, FormulaError> {
        let tokens = lexer::tokenize(source)?;
        let program = parser::parse(&tokens)?;
        let dependencies = program
            .iter()
            .filter_map(|i| match i {
                Instruction::Load(id) => Some(id.clone()),
                _ => None,
            })
            .collect();
        Ok(Self {
            source: source.to_string(),
            program,
            dependencies,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    pub fn evaluate(&self, values: &HashMap<String, f64>) -> Result<f64, FormulaError> {
        let mut stack: Vec<f64> = Vec::with_capacity(self.program.len());
        for instruction in &self.program {
            let result = match instruction {
                Instruction::Push(n) => *n,
                Instruction::Load(id) => *values
                    .get(id)
                    .ok_or_else(|| FormulaError::UnresolvedIdentifier(id.clone()))?,
                Instruction::Neg => -pop(&mut stack)?,
                Instruction::Add | Instruction::Sub | Instruction::Mul | Instruction::Div => {
                    let rhs = pop(&mut stack)?;
                    let lhs = pop(&mut stack)?;
                    match instruction {
                        Instruction::Add => lhs + rhs,
                        Instruction::Sub => lhs - rhs,
                        Instruction::Mul => lhs * rhs,
                        _ if rhs == 0.0 => return Err(FormulaError::DivisionByZero),
                        _ => lhs / rhs,
                    }
                }
            };
            if !result.is_finite() {
                return Err(FormulaError::NonFinite);
            }
            stack.push(result);
        }
        match (stack.pop(), stack.is_empty()) {
            (Some(result), true) => Ok(result),
            // parser guarantees a well-formed program
            _ => Err(FormulaError::UnexpectedEnd),
        }
    }
}

fn pop(stack: &mut Vec<f64>) -> Result<f64, FormulaError> {
    stack.pop().ok_or(FormulaError::UnexpectedEnd)
}
