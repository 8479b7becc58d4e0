//! Recursive-descent parser emitting postfix code.
//!
//! Grammar:
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('-' | '+') unary | primary
//! primary := number | '{{' id '}}' | '(' expr ')'
//! ```

use super::{
    lexer::{Spanned, Token},
    FormulaError,
};

/// Parentheses and unary signs together.
pub const MAX_NESTING: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Instruction {
    Push(f64),
    Load(String),
    Neg,
    Add,
    Sub,
    Mul,
    Div,
}

pub(super) fn parse(tokens: &[Spanned]) -> Result<Vec<Instruction>, FormulaError> {
    if tokens.is_empty() {
        return Err(FormulaError::Empty);
    }
    let mut parser = Parser {
        tokens,
        cursor: 0,
        depth: 0,
        program: Vec::with_capacity(tokens.len()),
    };
    parser.expr()?;
    if let Some(extra) = parser.peek() {
        return Err(match extra.token {
            Token::RParen => FormulaError::UnbalancedParentheses {
                position: extra.position,
            },
            _ => FormulaError::UnexpectedToken {
                position: extra.position,
                found: extra.token.to_string(),
            },
        });
    }
    Ok(parser.program)
}

struct Parser<'a> {
    tokens: &'a [Spanned],
    cursor: usize,
    depth: usize,
    program: Vec<Instruction>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Spanned> {
        self.tokens.get(self.cursor)
    }

    fn advance(&mut self) -> Option<&'a Spanned> {
        let next = self.tokens.get(self.cursor);
        if next.is_some() {
            self.cursor += 1;
        }
        next
    }

    fn descend(&mut self) -> Result<(), FormulaError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(FormulaError::NestingTooDeep { limit: MAX_NESTING });
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<(), FormulaError> {
        self.term()?;
        while let Some(op) = self.peek() {
            let instruction = match op.token {
                Token::Plus => Instruction::Add,
                Token::Minus => Instruction::Sub,
                _ => break,
            };
            self.advance();
            self.term()?;
            self.program.push(instruction);
        }
        Ok(())
    }

    fn term(&mut self) -> Result<(), FormulaError> {
        self.unary()?;
        while let Some(op) = self.peek() {
            let instruction = match op.token {
                Token::Star => Instruction::Mul,
                Token::Slash => Instruction::Div,
                _ => break,
            };
            self.advance();
            self.unary()?;
            self.program.push(instruction);
        }
        Ok(())
    }

    fn unary(&mut self) -> Result<(), FormulaError> {
        match self.peek().map(|s| &s.token) {
            Some(Token::Minus) => {
                self.advance();
                self.descend()?;
                self.unary()?;
                self.depth -= 1;
                self.program.push(Instruction::Neg);
                Ok(())
            }
            Some(Token::Plus) => {
                self.advance();
                self.descend()?;
                self.unary()?;
                self.depth -= 1;
                Ok(())
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<(), FormulaError> {
        let Some(next) = self.advance() else {
            return Err(FormulaError::UnexpectedEnd);
        };
        match &next.token {
            Token::Number(n) => self.program.push(Instruction::Push(*n)),
            Token::Metric(id) => self.program.push(Instruction::Load(id.clone())),
            Token::LParen => {
                self.descend()?;
                self.expr()?;
                self.depth -= 1;
                match self.advance() {
                    Some(Spanned {
                        token: Token::RParen,
                        ..
                    }) => {}
                    Some(other) => {
                        return Err(FormulaError::UnexpectedToken {
                            position: other.position,
                            found: other.token.to_string(),
                        })
                    }
                    None => {
                        return Err(FormulaError::UnbalancedParentheses {
                            position: next.position,
                        })
                    }
                }
            }
            other => {
                return Err(FormulaError::UnexpectedToken {
                    position: next.position,
                    found: other.to_string(),
                })
            }
        }
        Ok(())
    }
}
