//! Default constants and functions available to every expression.

use num_complex::Complex64;

use super::CalcError;

pub type BuiltinFn = fn(Complex64) -> Result<Complex64, CalcError>;

/// Constants available unless the caller supplies a variable of the same name.
pub const DEFAULT_VARIABLES: &[(&str, Complex64)] = &[
    ("i", Complex64::new(0.0, 1.0)),
    ("j", Complex64::new(0.0, 1.0)),
    ("e", Complex64::new(std::f64::consts::E, 0.0)),
    ("pi", Complex64::new(std::f64::consts::PI, 0.0)),
    // Boltzmann's constant (J/K)
    ("k", Complex64::new(1.380_648_8e-23, 0.0)),
    // Speed of light (m/s)
    ("c", Complex64::new(2.998e8, 0.0)),
    // Room temperature (K)
    ("T", Complex64::new(298.15, 0.0)),
    // Elementary charge (C)
    ("q", Complex64::new(1.602_176_565e-19, 0.0)),
];

fn ok(z: Complex64) -> Result<Complex64, CalcError> {
    Ok(z)
}

fn one() -> Complex64 {
    Complex64::new(1.0, 0.0)
}

fn real_or_complex(
    z: Complex64,
    in_domain: fn(f64) -> bool,
    real: fn(f64) -> f64,
    complex: fn(Complex64) -> Complex64,
) -> Complex64 {
    if z.im == 0.0 && in_domain(z.re) {
        Complex64::new(real(z.re), 0.0)
    } else {
        complex(z)
    }
}

fn factorial(z: Complex64) -> Result<Complex64, CalcError> {
    if z.im != 0.0 || z.re < 0.0 || z.re.fract() != 0.0 {
        return Err(CalcError::Domain(format!(
            "factorial() is only defined for non-negative integers, got {z}"
        )));
    }
    if z.re > 170.0 {
        return Ok(Complex64::new(f64::INFINITY, 0.0));
    }
    let n = z.re as u32;
    let value = (1..=n).fold(1.0_f64, |acc, k| acc * f64::from(k));
    Ok(Complex64::new(value, 0.0))
}

fn lookup(name: &str) -> Option<BuiltinFn> {
    let f: BuiltinFn = match name {
        "sin" => |z| ok(z.sin()),
        "cos" => |z| ok(z.cos()),
        "tan" => |z| ok(z.tan()),
        "sec" => |z| ok(one() / z.cos()),
        "csc" => |z| ok(one() / z.sin()),
        "cot" => |z| ok(one() / z.tan()),
        "sqrt" => |z| ok(real_or_complex(z, |x| x >= 0.0, f64::sqrt, |z| z.sqrt())),
        "log10" => |z| {
            ok(real_or_complex(z, |x| x > 0.0, f64::log10, |z| {
                z.ln() / std::f64::consts::LN_10
            }))
        },
        "log2" => |z| {
            ok(real_or_complex(z, |x| x > 0.0, f64::log2, |z| {
                z.ln() / std::f64::consts::LN_2
            }))
        },
        "ln" => |z| ok(real_or_complex(z, |x| x > 0.0, f64::ln, |z| z.ln())),
        "exp" => |z| ok(z.exp()),
        "arccos" => |z| {
            ok(real_or_complex(z, |x| (-1.0..=1.0).contains(&x), f64::acos, |z| z.acos()))
        },
        "arcsin" => |z| {
            ok(real_or_complex(z, |x| (-1.0..=1.0).contains(&x), f64::asin, |z| z.asin()))
        },
        "arctan" => |z| ok(real_or_complex(z, |_| true, f64::atan, |z| z.atan())),
        "arcsec" => |z| ok((one() / z).acos()),
        "arccsc" => |z| ok((one() / z).asin()),
        "arccot" => |z| ok((one() / z).atan()),
        "abs" => |z| ok(Complex64::new(z.norm(), 0.0)),
        "fact" | "factorial" => factorial,
        "sinh" => |z| ok(z.sinh()),
        "cosh" => |z| ok(z.cosh()),
        "tanh" => |z| ok(z.tanh()),
        "sech" => |z| ok(one() / z.cosh()),
        "csch" => |z| ok(one() / z.sinh()),
        "coth" => |z| ok(one() / z.tanh()),
        "arcsinh" => |z| ok(z.asinh()),
        "arccosh" => |z| {
            ok(real_or_complex(z, |x| x >= 1.0, f64::acosh, |z| z.acosh()))
        },
        "arctanh" => |z| ok(z.atanh()),
        "arcsech" => |z| ok((one() / z).acosh()),
        "arccsch" => |z| ok((one() / z).asinh()),
        "arccoth" => |z| ok((one() / z).atanh()),
        "re" => |z| ok(Complex64::new(z.re, 0.0)),
        "im" => |z| ok(Complex64::new(z.im, 0.0)),
        "conj" => |z| ok(z.conj()),
        _ => return None,
    };
    Some(f)
}

/// Find a default function, ignoring case unless `case_sensitive`.
pub fn default_function(name: &str, case_sensitive: bool) -> Option<BuiltinFn> {
    if case_sensitive {
        lookup(name)
    } else {
        lookup(&name.to_lowercase())
    }
}

/// Find a default constant, ignoring case unless `case_sensitive`.
pub fn default_variable(name: &str, case_sensitive: bool) -> Option<Complex64> {
    DEFAULT_VARIABLES
        .iter()
        .find(|(n, _)| {
            if case_sensitive {
                *n == name
            } else {
                n.eq_ignore_ascii_case(name)
            }
        })
        .map(|(_, v)| *v)
}

/// Every default function name, for listings and diagnostics.
pub const DEFAULT_FUNCTION_NAMES: &[&str] = &[
    "sin", "cos", "tan", "sec", "csc", "cot", "sqrt", "log10", "log2", "ln", "exp", "arccos",
    "arcsin", "arctan", "arcsec", "arccsc", "arccot", "abs", "fact", "factorial", "sinh", "cosh",
    "tanh", "sech", "csch", "coth", "arcsinh", "arccosh", "arctanh", "arcsech", "arccsch",
    "arccoth", "re", "im", "conj",
];

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, x: f64) -> Complex64 {
        default_function(name, false).unwrap()(Complex64::new(x, 0.0)).unwrap()
    }

    #[test]
    fn every_listed_name_resolves() {
        for name in DEFAULT_FUNCTION_NAMES {
            assert!(default_function(name, true).is_some(), "missing {name}");
        }
    }

    #[test]
    fn sqrt_of_negative_is_imaginary() {
        let z = call("sqrt", -4.0);
        assert!(z.re.abs() < 1e-12);
        assert!((z.im - 2.0).abs() < 1e-12);
    }

    #[test]
    fn factorial_rejects_fractions() {
        assert_eq!(call("fact", 5.0), Complex64::new(120.0, 0.0));
        let f = default_function("factorial", false).unwrap();
        assert!(matches!(
            f(Complex64::new(2.5, 0.0)),
            Err(CalcError::Domain(_))
        ));
    }

    #[test]
    fn lookup_ignores_case_by_default() {
        assert!(default_function("SIN", false).is_some());
        assert!(default_function("SIN", true).is_none());
        assert!(default_variable("PI", false).is_some());
        assert!(default_variable("PI", true).is_none());
    }
}
