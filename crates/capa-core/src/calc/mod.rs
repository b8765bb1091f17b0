//! Calculator for numeric answers and formula sampling.
//!
//! Parses arithmetic over complex numbers with SI-suffixed literals
//! (`2k`, `10%`, `4.7u`), the parallel-resistor operator `||`, and a
//! namespace of variables and unary functions. Name lookup is layered:
//! caller-supplied entries are consulted first, then the defaults in
//! [`functions`]. Names are case-insensitive unless the namespace says
//! otherwise.

pub mod functions;
mod lexer;
mod parser;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use num_complex::Complex64;
use thiserror::Error;

pub use lexer::SUFFIXES;
pub use parser::Expr;

/// A caller-supplied unary function.
pub type CalcFn = Arc<dyn Fn(Complex64) -> Complex64 + Send + Sync>;

/// Errors from parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    /// The input does not match the grammar.
    #[error("Invalid math syntax at position {position}: {message}")]
    Syntax { position: usize, message: String },

    /// Parentheses do not balance.
    #[error("Invalid math syntax: unmatched parenthesis")]
    UnmatchedParenthesis,

    /// A name was used as a variable but is not defined.
    #[error("Invalid input: {0} not permitted in answer as a variable")]
    UndefinedVariable(String),

    /// A name was used as a function but is not defined.
    #[error("Invalid input: {0} not permitted in answer as a function")]
    UndefinedFunction(String),

    /// A function was applied outside its domain.
    #[error("Math domain error: {0}")]
    Domain(String),
}

impl CalcError {
    /// `true` when the failure is in the shape of the input rather than in a name.
    pub fn is_syntax(&self) -> bool {
        matches!(
            self,
            CalcError::Syntax { .. } | CalcError::UnmatchedParenthesis
        )
    }
}

/// Variables and functions visible to an expression.
#[derive(Clone, Default)]
pub struct Namespace {
    variables: HashMap<String, Complex64>,
    functions: HashMap<String, CalcFn>,
    case_sensitive: bool,
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut functions: Vec<&String> = self.functions.keys().collect();
        functions.sort();
        f.debug_struct("Namespace")
            .field("variables", &self.variables)
            .field("functions", &functions)
            .field("case_sensitive", &self.case_sensitive)
            .finish()
    }
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn case_sensitive(mut self, yes: bool) -> Self {
        self.case_sensitive = yes;
        self
    }

    pub fn with_variable(mut self, name: &str, value: impl Into<Complex64>) -> Self {
        self.set_variable(name, value);
        self
    }

    pub fn with_function<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Complex64) -> Complex64 + Send + Sync + 'static,
    {
        let key = self.key(name);
        self.functions.insert(key, Arc::new(f));
        self
    }

    pub fn set_variable(&mut self, name: &str, value: impl Into<Complex64>) {
        let key = self.key(name);
        self.variables.insert(key, value.into());
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    fn key(&self, name: &str) -> String {
        if self.case_sensitive {
            name.to_string()
        } else {
            name.to_lowercase()
        }
    }

    /// Resolve a variable: caller table first, then defaults.
    pub fn variable(&self, name: &str) -> Option<Complex64> {
        self.variables
            .get(&self.key(name))
            .copied()
            .or_else(|| functions::default_variable(name, self.case_sensitive))
    }

    fn call(&self, name: &str, arg: Complex64) -> Result<Complex64, CalcError> {
        if let Some(f) = self.functions.get(&self.key(name)) {
            return Ok(f(arg));
        }
        match functions::default_function(name, self.case_sensitive) {
            Some(f) => f(arg),
            None => Err(CalcError::UndefinedFunction(name.to_string())),
        }
    }
}

/// Parse `expression` without evaluating it.
pub fn parse(expression: &str) -> Result<Expr, CalcError> {
    let tokens = lexer::tokenize(expression)?;
    parser::check_parens(&tokens)?;
    parser::Parser::new(&tokens, expression.len()).parse()
}

/// Evaluate `expression` against `namespace`.
///
/// Blank input evaluates to NaN. Syntax is checked in full before any name is
/// resolved, so malformed input is always reported as a syntax error.
pub fn evaluate(expression: &str, namespace: &Namespace) -> Result<Complex64, CalcError> {
    if expression.trim().is_empty() {
        return Ok(Complex64::new(f64::NAN, 0.0));
    }
    let expr = parse(expression)?;
    eval(&expr, namespace)
}

/// Evaluate with the default namespace only.
pub fn evaluate_default(expression: &str) -> Result<Complex64, CalcError> {
    evaluate(expression, &Namespace::default())
}

fn is_real(z: Complex64) -> bool {
    z.im == 0.0
}

fn divide(a: Complex64, b: Complex64) -> Complex64 {
    if is_real(a) && is_real(b) {
        Complex64::new(a.re / b.re, 0.0)
    } else {
        a / b
    }
}

fn power(base: Complex64, exponent: Complex64) -> Complex64 {
    if is_real(base) && is_real(exponent) && (base.re >= 0.0 || exponent.re.fract() == 0.0) {
        Complex64::new(base.re.powf(exponent.re), 0.0)
    } else {
        base.powc(exponent)
    }
}

fn parallel(values: &[Complex64]) -> Complex64 {
    if values.len() == 1 {
        return values[0];
    }
    if values.iter().any(|v| v.re == 0.0 && v.im == 0.0) {
        return Complex64::new(f64::NAN, 0.0);
    }
    let one = Complex64::new(1.0, 0.0);
    let sum = values
        .iter()
        .fold(Complex64::new(0.0, 0.0), |acc, v| acc + divide(one, *v));
    divide(one, sum)
}

fn eval(expr: &Expr, ns: &Namespace) -> Result<Complex64, CalcError> {
    Ok(match expr {
        Expr::Number(n) => Complex64::new(*n, 0.0),
        Expr::Variable { name, .. } => ns
            .variable(name)
            .ok_or_else(|| CalcError::UndefinedVariable(name.clone()))?,
        Expr::Call { name, arg, .. } => {
            let value = eval(arg, ns)?;
            ns.call(name, value)?
        }
        Expr::Neg(inner) => -eval(inner, ns)?,
        Expr::Add(a, b) => eval(a, ns)? + eval(b, ns)?,
        Expr::Sub(a, b) => eval(a, ns)? - eval(b, ns)?,
        Expr::Mul(a, b) => eval(a, ns)? * eval(b, ns)?,
        Expr::Div(a, b) => divide(eval(a, ns)?, eval(b, ns)?),
        Expr::Pow(a, b) => power(eval(a, ns)?, eval(b, ns)?),
        Expr::Parallel(items) => {
            let values = items
                .iter()
                .map(|item| eval(item, ns))
                .collect::<Result<Vec<_>, _>>()?;
            parallel(&values)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn real(input: &str) -> f64 {
        let z = evaluate_default(input).unwrap();
        assert_eq!(z.im, 0.0, "expected real result for {input}, got {z}");
        z.re
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * b.abs().max(1.0)
    }

    #[test]
    fn power_tower_is_right_to_left() {
        assert_eq!(real("2^3^2"), 512.0);
    }

    #[test]
    fn parallel_resistors() {
        assert!((real("10000||2000") - 1666.6666666).abs() < 1e-3);
        assert_eq!(real("1||1"), 0.5);
        assert!(real("1||0").is_nan());
    }

    #[test]
    fn parallel_binds_tighter_than_product() {
        assert_eq!(real("2*1||1"), 1.0);
    }

    #[test]
    fn negative_literals() {
        assert_eq!(real("-0.33"), -0.33);
        assert_eq!(real("-2^2"), -4.0);
        assert_eq!(real("3*-2"), -6.0);
    }

    #[test]
    fn suffixes_scale_literals() {
        assert!(close(real("4.7k"), 4700.0));
        assert!(close(real("10%"), 0.1));
        assert!(close(real("3m*2"), 0.006));
    }

    #[test]
    fn empty_input_is_nan() {
        assert!(evaluate_default("").unwrap().re.is_nan());
        assert!(evaluate_default("   ").unwrap().re.is_nan());
    }

    #[test]
    fn garbage_after_expression_is_a_syntax_error() {
        let err = evaluate_default("5+7 QWSEKO").unwrap_err();
        assert!(err.is_syntax(), "got {err:?}");
    }

    #[test]
    fn undefined_variable_is_distinct_from_syntax() {
        let err = evaluate_default("5+QWSEKO").unwrap_err();
        assert_eq!(err, CalcError::UndefinedVariable("QWSEKO".into()));
        assert!(!err.is_syntax());
    }

    #[test]
    fn undefined_function() {
        let err = evaluate_default("frobnicate(2)").unwrap_err();
        assert_eq!(err, CalcError::UndefinedFunction("frobnicate".into()));
    }

    #[test]
    fn default_constants_and_imaginary_unit() {
        assert!(close(real("e"), std::f64::consts::E));
        let z = evaluate_default("j^2").unwrap();
        assert!((z.re + 1.0).abs() < 1e-12 && z.im.abs() < 1e-12);
        let z = evaluate_default("sqrt(-1)").unwrap();
        assert!((z.im - 1.0).abs() < 1e-12);
    }

    #[test]
    fn caller_entries_override_defaults() {
        let ns = Namespace::new()
            .with_variable("e", 2.0)
            .with_function("sin", |z| z * 10.0);
        assert_eq!(evaluate("e + sin(1)", &ns).unwrap().re, 12.0);
        // Defaults are untouched for other namespaces.
        assert!(close(real("e"), std::f64::consts::E));
    }

    #[test]
    fn longer_variable_names_are_not_split() {
        let ns = Namespace::new().with_variable("e2", 5.0);
        assert_eq!(evaluate("e2*2", &ns).unwrap().re, 10.0);
    }

    #[test]
    fn case_sensitivity_is_configurable() {
        let insensitive = Namespace::new().with_variable("R", 3.0);
        assert_eq!(evaluate("r", &insensitive).unwrap().re, 3.0);
        assert_eq!(real("PI"), std::f64::consts::PI);

        let sensitive = Namespace::new().case_sensitive(true).with_variable("R", 3.0);
        assert_eq!(
            evaluate("r", &sensitive).unwrap_err(),
            CalcError::UndefinedVariable("r".into())
        );
    }

    #[test]
    fn functions_compose() {
        assert!(close(real("sqrt(16)+abs(-3)"), 7.0));
        assert!(close(real("log10(1000)"), 3.0));
        assert!(close(real("fact(4)/2"), 12.0));
    }

    #[test]
    fn division_by_zero_is_infinite() {
        assert!(real("1/0").is_infinite());
    }
}
