//! Tokenizer for calculator expressions.

use super::CalcError;

/// Multipliers for SI magnitude suffixes on number literals.
pub const SUFFIXES: &[(char, f64)] = &[
    ('%', 0.01),
    ('k', 1e3),
    ('M', 1e6),
    ('G', 1e9),
    ('T', 1e12),
    ('c', 1e-2),
    ('m', 1e-3),
    ('u', 1e-6),
    ('n', 1e-9),
    ('p', 1e-12),
];

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Parallel,
    LParen,
    RParen,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {n}"),
            Token::Ident(name) => format!("'{name}'"),
            Token::Plus => "'+'".into(),
            Token::Minus => "'-'".into(),
            Token::Star => "'*'".into(),
            Token::Slash => "'/'".into(),
            Token::Caret => "'^'".into(),
            Token::Parallel => "'||'".into(),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
        }
    }
}

/// A token with the byte offset it started at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub pos: usize,
}

fn suffix_multiplier(c: char) -> Option<f64> {
    SUFFIXES.iter().find(|(s, _)| *s == c).map(|(_, m)| *m)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub fn tokenize(input: &str) -> Result<Vec<Spanned>, CalcError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        match c {
            c if c.is_whitespace() => {
                i += 1;
            }
            '0'..='9' | '.' => {
                let (value, next) = lex_number(input, &chars, i)?;
                tokens.push(Spanned {
                    token: Token::Number(value),
                    pos,
                });
                i = next;
            }
            c if is_ident_start(c) => {
                // Longest match: the whole identifier is one name, so `e2`
                // never splits into `e` and `2`.
                let start = i;
                while i < chars.len() && is_ident_char(chars[i].1) {
                    i += 1;
                }
                while i < chars.len() && chars[i].1 == '\'' {
                    i += 1;
                }
                let end = chars.get(i).map(|(p, _)| *p).unwrap_or(input.len());
                tokens.push(Spanned {
                    token: Token::Ident(input[chars[start].0..end].to_string()),
                    pos,
                });
            }
            '|' => {
                if chars.get(i + 1).map(|(_, c)| *c) == Some('|') {
                    tokens.push(Spanned {
                        token: Token::Parallel,
                        pos,
                    });
                    i += 2;
                } else {
                    return Err(CalcError::Syntax {
                        position: pos,
                        message: "expected '||'".into(),
                    });
                }
            }
            '+' | '-' | '*' | '/' | '^' | '(' | ')' => {
                let token = match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '^' => Token::Caret,
                    '(' => Token::LParen,
                    _ => Token::RParen,
                };
                tokens.push(Spanned { token, pos });
                i += 1;
            }
            other => {
                return Err(CalcError::Syntax {
                    position: pos,
                    message: format!("unexpected character '{other}'"),
                });
            }
        }
    }

    Ok(tokens)
}

/// Lex `digits[.digits][E[+-]digits][suffix]` starting at `start`.
fn lex_number(
    input: &str,
    chars: &[(usize, char)],
    start: usize,
) -> Result<(f64, usize), CalcError> {
    let mut i = start;
    let mut saw_digit = false;

    while i < chars.len() && chars[i].1.is_ascii_digit() {
        i += 1;
        saw_digit = true;
    }
    if i < chars.len() && chars[i].1 == '.' {
        i += 1;
        while i < chars.len() && chars[i].1.is_ascii_digit() {
            i += 1;
            saw_digit = true;
        }
    }
    if !saw_digit {
        return Err(CalcError::Syntax {
            position: chars[start].0,
            message: "malformed number".into(),
        });
    }

    // Exponent only if digits follow, otherwise `E` is left for the next token.
    if i < chars.len() && (chars[i].1 == 'e' || chars[i].1 == 'E') {
        let mut j = i + 1;
        if j < chars.len() && (chars[j].1 == '+' || chars[j].1 == '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].1.is_ascii_digit() {
            while j < chars.len() && chars[j].1.is_ascii_digit() {
                j += 1;
            }
            i = j;
        }
    }

    let end = chars.get(i).map(|(p, _)| *p).unwrap_or(input.len());
    let literal = &input[chars[start].0..end];
    let mut value: f64 = literal.parse().map_err(|_| CalcError::Syntax {
        position: chars[start].0,
        message: format!("malformed number '{literal}'"),
    })?;

    // A suffix applies only when it is not the start of an identifier.
    if let Some((_, c)) = chars.get(i) {
        if let Some(multiplier) = suffix_multiplier(*c) {
            let followed_by_ident = chars
                .get(i + 1)
                .map(|(_, n)| is_ident_char(*n))
                .unwrap_or(false);
            if !followed_by_ident {
                value *= multiplier;
                i += 1;
            }
        }
    }

    Ok((value, i))
}
