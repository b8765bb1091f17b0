//! Recursive-descent parser producing an expression tree.
//!
//! Precedence, lowest first: sum, product, parallel, power, atom. Powers
//! associate to the right.

use super::lexer::{Spanned, Token};
use super::CalcError;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable { name: String, pos: usize },
    Call { name: String, arg: Box<Expr>, pos: usize },
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Parallel(Vec<Expr>),
}

impl Expr {
    /// Names of every variable referenced, in order of appearance.
    pub fn variables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect(&mut out, false);
        out
    }

    /// Names of every function called, in order of appearance.
    pub fn functions(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect(&mut out, true);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a str>, functions: bool) {
        match self {
            Expr::Number(_) => {}
            Expr::Variable { name, .. } => {
                if !functions {
                    out.push(name);
                }
            }
            Expr::Call { name, arg, .. } => {
                if functions {
                    out.push(name);
                }
                arg.collect(out, functions);
            }
            Expr::Neg(inner) => inner.collect(out, functions),
            Expr::Add(a, b)
            | Expr::Sub(a, b)
            | Expr::Mul(a, b)
            | Expr::Div(a, b)
            | Expr::Pow(a, b) => {
                a.collect(out, functions);
                b.collect(out, functions);
            }
            Expr::Parallel(items) => {
                for item in items {
                    item.collect(out, functions);
                }
            }
        }
    }
}

/// Fail fast on unbalanced parentheses so they get a dedicated error.
pub fn check_parens(tokens: &[Spanned]) -> Result<(), CalcError> {
    let mut depth: i64 = 0;
    for t in tokens {
        match t.token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth < 0 {
                    return Err(CalcError::UnmatchedParenthesis);
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(CalcError::UnmatchedParenthesis);
    }
    Ok(())
}

pub struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    input_len: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Spanned], input_len: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            input_len,
        }
    }

    /// Parse the whole token stream; trailing tokens are a syntax error.
    pub fn parse(mut self) -> Result<Expr, CalcError> {
        let expr = self.sum()?;
        if let Some(t) = self.tokens.get(self.pos) {
            return Err(CalcError::Syntax {
                position: t.pos,
                message: format!("unexpected {}", t.token.describe()),
            });
        }
        Ok(expr)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|t| &t.token)
    }

    fn current_pos(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|t| t.pos)
            .unwrap_or(self.input_len)
    }

    fn advance(&mut self) -> Option<&Spanned> {
        let t = self.tokens.get(self.pos);
        self.pos += 1;
        t
    }

    fn expect(&mut self, expected: Token) -> Result<(), CalcError> {
        match self.peek() {
            Some(t) if *t == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(t) => Err(CalcError::Syntax {
                position: self.current_pos(),
                message: format!("expected {}, found {}", expected.describe(), t.describe()),
            }),
            None => Err(CalcError::Syntax {
                position: self.input_len,
                message: format!("expected {}, found end of input", expected.describe()),
            }),
        }
    }

    fn sum(&mut self) -> Result<Expr, CalcError> {
        let negate = match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                true
            }
            Some(Token::Plus) => {
                self.pos += 1;
                false
            }
            _ => false,
        };

        let mut lhs = self.product()?;
        if negate {
            lhs = Expr::Neg(Box::new(lhs));
        }

        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    let rhs = self.product()?;
                    lhs = Expr::Add(Box::new(lhs), Box::new(rhs));
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    let rhs = self.product()?;
                    lhs = Expr::Sub(Box::new(lhs), Box::new(rhs));
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn product(&mut self) -> Result<Expr, CalcError> {
        let mut lhs = self.parallel()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    let rhs = self.parallel()?;
                    lhs = Expr::Mul(Box::new(lhs), Box::new(rhs));
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let rhs = self.parallel()?;
                    lhs = Expr::Div(Box::new(lhs), Box::new(rhs));
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn parallel(&mut self) -> Result<Expr, CalcError> {
        let first = self.power()?;
        if self.peek() != Some(&Token::Parallel) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.peek() == Some(&Token::Parallel) {
            self.pos += 1;
            items.push(self.power()?);
        }
        Ok(Expr::Parallel(items))
    }

    fn power(&mut self) -> Result<Expr, CalcError> {
        let mut operands = vec![self.atom()?];
        while self.peek() == Some(&Token::Caret) {
            self.pos += 1;
            operands.push(self.atom()?);
        }
        // Fold from the right: a^b^c = a^(b^c).
        let mut acc = operands.pop().ok_or_else(|| CalcError::Syntax {
            position: self.current_pos(),
            message: "empty power".into(),
        })?;
        while let Some(base) = operands.pop() {
            acc = Expr::Pow(Box::new(base), Box::new(acc));
        }
        Ok(acc)
    }

    fn atom(&mut self) -> Result<Expr, CalcError> {
        let pos = self.current_pos();
        match self.peek().cloned() {
            // A sign directly on a literal is part of the number.
            Some(Token::Minus) | Some(Token::Plus)
                if matches!(self.peek_at(1), Some(Token::Number(_))) =>
            {
                let negative = self.peek() == Some(&Token::Minus);
                self.pos += 1;
                match self.advance().map(|t| t.token.clone()) {
                    Some(Token::Number(n)) => Ok(Expr::Number(if negative { -n } else { n })),
                    _ => Err(CalcError::Syntax {
                        position: pos,
                        message: "expected number".into(),
                    }),
                }
            }
            Some(Token::Number(n)) => {
                self.pos += 1;
                Ok(Expr::Number(n))
            }
            Some(Token::Ident(name)) => {
                self.pos += 1;
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let arg = self.sum()?;
                    self.expect(Token::RParen)?;
                    Ok(Expr::Call {
                        name,
                        arg: Box::new(arg),
                        pos,
                    })
                } else {
                    Ok(Expr::Variable { name, pos })
                }
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.sum()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(other) => Err(CalcError::Syntax {
                position: pos,
                message: format!("unexpected {}", other.describe()),
            }),
            None => Err(CalcError::Syntax {
                position: self.input_len,
                message: "unexpected end of input".into(),
            }),
        }
    }
}
