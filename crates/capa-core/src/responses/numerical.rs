//! Numerical responses with tolerances, ranges and partial credit.

use std::collections::BTreeMap;

use num_complex::Complex64;
use tracing::debug;

use crate::calc::{self, CalcError};
use crate::context::EvalContext;
use crate::correctmap::{CorrectMap, CorrectMapEntry, Correctness};
use crate::error::CapaError;
use crate::hints::HintText;
use crate::model::StudentAnswers;
use crate::xml::{escape_attr, Document, NodeId};

use super::{incorrect, single, ExpectedAnswer, GradeContext, Grader, ResponseBase, ANSWER_SEPARATOR};

pub(crate) const DEFAULT_TOLERANCE: &str = "0.001%";
const STAFF_ANSWER_PREFIX: &str = "There was a problem with the staff answer to this problem";
const STAFF_ANSWER_ERROR: &str = "There was a problem with the staff answer to this problem.";

// ---------------------------------------------------------------------------
// Tolerance
// ---------------------------------------------------------------------------

/// How far a submission may be from the expected value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tolerance {
    /// Fixed distance.
    Absolute(f64),
    /// Fraction of the expected value's magnitude.
    Percent(f64),
    /// Fraction of the larger magnitude of the two values.
    Relative(f64),
}

impl Tolerance {
    /// Parse an authored tolerance such as `0.1`, `5%` or an expression.
    ///
    /// The default `0.001%` is relative to the larger of the two values.
    pub fn parse(raw: &str) -> Result<Self, CapaError> {
        let raw = raw.trim();
        let invalid = |e: CalcError| CapaError::GraderConfiguration(format!("invalid tolerance '{raw}': {e}"));
        if raw == DEFAULT_TOLERANCE {
            return Ok(Tolerance::Relative(0.001 * 0.01));
        }
        Ok(match raw.strip_suffix('%') {
            Some(body) => Tolerance::Percent(calc::evaluate_default(body).map_err(invalid)?.re * 0.01),
            None => Tolerance::Absolute(calc::evaluate_default(raw).map_err(invalid)?.re),
        })
    }

    /// The same tolerance `factor` times wider.
    ///
    /// A widened relative tolerance becomes a percentage of the expected value.
    pub fn scaled(self, factor: f64) -> Self {
        match self {
            Tolerance::Absolute(t) => Tolerance::Absolute(t * factor),
            Tolerance::Percent(p) | Tolerance::Relative(p) => Tolerance::Percent(p * factor),
        }
    }

    /// Returns `true` if `student` is within tolerance of `expected`.
    pub fn allows(&self, student: Complex64, expected: Complex64) -> bool {
        if is_infinite(student) || is_infinite(expected) {
            return student == expected;
        }
        if student.is_nan() || expected.is_nan() {
            return false;
        }
        let tolerance = match *self {
            Tolerance::Absolute(t) => t,
            Tolerance::Percent(p) => p * expected.norm(),
            Tolerance::Relative(r) => r * student.norm().max(expected.norm()),
        };
        let tolerance = tolerance.abs();
        // Absorbs binary rounding of decimal inputs such as 1.1 - 1.0.
        (student - expected).norm() <= tolerance + tolerance * 1e-12 + f64::EPSILON * expected.norm()
    }
}

fn is_infinite(z: Complex64) -> bool {
    z.re.is_infinite() || z.im.is_infinite()
}

/// Compare two values under an authored tolerance string.
pub fn compare_with_tolerance(student: Complex64, expected: Complex64, tolerance: &str) -> Result<bool, CapaError> {
    Ok(Tolerance::parse(tolerance)?.allows(student, expected))
}

// ---------------------------------------------------------------------------
// Value parsing
// ---------------------------------------------------------------------------

/// Evaluate a learner's submission, mapping failures to learner-facing messages.
pub(crate) fn student_value(given: &str) -> Result<Complex64, CapaError> {
    calc::evaluate_default(given).map_err(|e| {
        let shown = escape_attr(given);
        let message = match &e {
            CalcError::UndefinedVariable(_) | CalcError::UnmatchedParenthesis => e.to_string(),
            CalcError::Domain(m) if m.contains("factorial") => {
                format!("Factorial function evaluated outside its domain:'{shown}'")
            }
            CalcError::Syntax { .. } => format!("Invalid math syntax: '{shown}'"),
            _ => format!("Could not interpret '{shown}' as a number."),
        };
        CapaError::StudentInput(message)
    })
}

/// Evaluate an authored answer: a number, a complex literal, or an expression.
pub(crate) fn staff_value(answer: &str) -> Result<Complex64, CapaError> {
    let answer = answer.trim();
    if let Some(z) = parse_complex_literal(answer) {
        return Ok(z);
    }
    calc::evaluate_default(answer).map_err(|e| {
        debug!("cannot evaluate staff answer {answer:?}: {e}");
        CapaError::StudentInput(STAFF_ANSWER_ERROR.to_string())
    })
}

/// Parse `1.5`, `2j`, `1+2j` or `(1-2j)`.
fn parse_complex_literal(s: &str) -> Option<Complex64> {
    let s = s
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .unwrap_or(s)
        .trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(re) = s.parse::<f64>() {
        return Some(Complex64::new(re, 0.0));
    }
    let body = s.strip_suffix(['j', 'J'])?;
    let imag = |part: &str| -> Option<f64> {
        match part {
            "" | "+" => Some(1.0),
            "-" => Some(-1.0),
            p => p.parse().ok(),
        }
    };
    let bytes = body.as_bytes();
    let split = (1..bytes.len())
        .rev()
        .find(|&i| matches!(bytes[i], b'+' | b'-') && !matches!(bytes[i - 1], b'e' | b'E'));
    match split {
        Some(i) => Some(Complex64::new(body[..i].parse().ok()?, imag(&body[i..])?)),
        None => Some(Complex64::new(0.0, imag(body)?)),
    }
}

// ---------------------------------------------------------------------------
// Grader
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct AnswerRange {
    lower: String,
    upper: String,
    lower_inclusive: bool,
    upper_inclusive: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct AdditionalAnswer {
    answer: String,
    hint: Option<HintText>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Outcome {
    correctness: Correctness,
    partial_score: f64,
    /// Index of the additional answer that matched.
    additional: Option<usize>,
}

/// Numeric answer within a tolerance, or inside an interval.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericalResponse {
    /// Display form of the answer; `[a, b]` for ranges.
    correct_answer: String,
    range: Option<AnswerRange>,
    additional: Vec<AdditionalAnswer>,
    tolerance: String,
    partial_range: f64,
    partial_answers: Vec<String>,
    correct_hint: Option<HintText>,
}

impl NumericalResponse {
    pub(crate) fn build(doc: &Document, node: NodeId, ctx: &EvalContext) -> Result<Self, CapaError> {
        let answer = doc.attr(node, "answer").unwrap_or_default().trim().to_string();
        let (correct_answer, range) = match parse_range(&answer, ctx)? {
            Some(range) => {
                let display = format!(
                    "{}{}, {}{}",
                    if range.lower_inclusive { '[' } else { '(' },
                    range.lower.trim(),
                    range.upper.trim(),
                    if range.upper_inclusive { ']' } else { ')' }
                );
                (display, Some(range))
            }
            None => (ctx.contextualize_text(&answer), None),
        };

        let params = doc.find_children(node, "responseparam");
        let tolerance = params
            .iter()
            .find(|p| doc.attr(**p, "type") == Some("tolerance"))
            .and_then(|p| doc.attr(*p, "default"))
            .map(|t| ctx.contextualize_text(t).trim().to_string())
            .unwrap_or_else(|| DEFAULT_TOLERANCE.to_string());
        let partial_range = match params.iter().find_map(|p| doc.attr(*p, "partial_range")) {
            Some(raw) => raw
                .trim()
                .parse::<f64>()
                .map_err(|_| CapaError::Parse(format!("partial_range should be a number, got {raw:?}")))?,
            None => 2.0,
        };
        let partial_answers = params
            .iter()
            .find_map(|p| doc.attr(*p, "partial_answers"))
            .map(|raw| {
                raw.split(',')
                    .map(|a| ctx.contextualize_text(a.trim()))
                    .filter(|a| !a.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let additional = doc
            .find_children(node, "additional_answer")
            .into_iter()
            .filter_map(|aa| {
                Some(AdditionalAnswer {
                    answer: ctx.contextualize_text(doc.attr(aa, "answer")?),
                    hint: doc.find_child(aa, "correcthint").map(|h| HintText::read(doc, h, ctx)),
                })
            })
            .collect();

        Ok(Self {
            correct_answer,
            range,
            additional,
            tolerance,
            partial_range,
            partial_answers,
            correct_hint: doc
                .find_child(node, "correcthint")
                .map(|h| HintText::read(doc, h, ctx)),
        })
    }

    fn evaluate(&self, base: &ResponseBase, given: &str) -> Result<Outcome, CapaError> {
        for credit in &base.credit_types {
            if credit != "list" && credit != "close" {
                return Err(CapaError::GraderConfiguration(
                    "partial_credit attribute should be one of: list,close".to_string(),
                ));
            }
        }
        let student = student_value(given)?;
        let mut outcome = match &self.range {
            Some(range) => Outcome {
                correctness: self.grade_range(base, range, student)?,
                partial_score: 0.5,
                additional: None,
            },
            None => self.grade_value(base, student)?,
        };

        if outcome.correctness == Correctness::Incorrect && self.range.is_none() {
            for (index, extra) in self.additional.iter().enumerate() {
                if staff_value(&extra.answer)? == student {
                    outcome.correctness = Correctness::Correct;
                    outcome.additional = Some(index);
                    break;
                }
            }
        }
        Ok(outcome)
    }

    fn grade_range(&self, base: &ResponseBase, range: &AnswerRange, student: Complex64) -> Result<Correctness, CapaError> {
        if student.im != 0.0 {
            return Err(CapaError::StudentInput(
                "You may not use complex numbers in range tolerance problems".to_string(),
            ));
        }
        let x = student.re;
        let boundary_tolerance = Tolerance::Relative(f64::EPSILON);

        let mut bounds = [0.0f64; 2];
        let sides = [
            (&range.lower, range.lower_inclusive),
            (&range.upper, range.upper_inclusive),
        ];
        for (i, (raw, inclusive)) in sides.into_iter().enumerate() {
            let value = staff_value(raw)?;
            if value.im != 0.0 {
                return Err(CapaError::StudentInput(format!("{STAFF_ANSWER_PREFIX}: complex boundary.")));
            }
            if value.re.is_nan() {
                return Err(CapaError::StudentInput(format!("{STAFF_ANSWER_PREFIX}: empty boundary.")));
            }
            if boundary_tolerance.allows(student, value) {
                return Ok(if inclusive { Correctness::Correct } else { Correctness::Incorrect });
            }
            bounds[i] = value.re;
        }

        let [lower, upper] = bounds;
        if lower < x && x < upper {
            return Ok(Correctness::Correct);
        }
        if base.has_credit_type("close") {
            let width = upper - lower;
            let reach = width * self.partial_range;
            if lower - reach < x && x < upper + reach {
                return Ok(Correctness::PartiallyCorrect);
            }
        }
        Ok(Correctness::Incorrect)
    }

    fn grade_value(&self, base: &ResponseBase, student: Complex64) -> Result<Outcome, CapaError> {
        let expected = staff_value(&self.correct_answer)?;
        let tolerance = Tolerance::parse(&self.tolerance)?;
        let widened = tolerance.scaled(self.partial_range);
        let mut outcome = Outcome {
            correctness: Correctness::Incorrect,
            partial_score: 0.5,
            additional: None,
        };

        if tolerance.allows(student, expected) {
            outcome.correctness = Correctness::Correct;
        } else if base.has_credit_type("list") {
            let close = base.has_credit_type("close");
            for answer in &self.partial_answers {
                let value = staff_value(answer)?;
                if tolerance.allows(student, value) {
                    outcome.correctness = Correctness::PartiallyCorrect;
                    break;
                }
                if close && widened.allows(student, expected) {
                    outcome.correctness = Correctness::PartiallyCorrect;
                    break;
                }
                if close && widened.allows(student, value) {
                    outcome.correctness = Correctness::PartiallyCorrect;
                    outcome.partial_score = 0.25;
                    break;
                }
            }
        } else if base.has_credit_type("close") && widened.allows(student, expected) {
            outcome.correctness = Correctness::PartiallyCorrect;
        }
        Ok(outcome)
    }
}

/// Split `[a, b]` / `(a, b]` style answers into contextualized bounds.
fn parse_range(answer: &str, ctx: &EvalContext) -> Result<Option<AnswerRange>, CapaError> {
    let (Some(first), Some(last)) = (answer.chars().next(), answer.chars().last()) else {
        return Ok(None);
    };
    if !matches!(first, '[' | '(') || !matches!(last, ']' | ')') || answer.len() < 2 {
        return Ok(None);
    }
    let inner = &answer[1..answer.len() - 1];
    let parts: Vec<String> = inner.split(',').map(|p| ctx.contextualize_text(p)).collect();
    match parts.as_slice() {
        [lower, upper] => Ok(Some(AnswerRange {
            lower: lower.clone(),
            upper: upper.clone(),
            lower_inclusive: first == '[',
            upper_inclusive: last == ']',
        })),
        _ => Err(CapaError::Parse(format!("{STAFF_ANSWER_ERROR} Range answers need two bounds: {answer}"))),
    }
}

impl Grader for NumericalResponse {
    fn get_score(
        &self,
        base: &ResponseBase,
        answers: &StudentAnswers,
        _gctx: &GradeContext<'_>,
    ) -> Result<CorrectMap, CapaError> {
        let aid = base.answer_id();
        let Some(given) = answers.get(aid) else {
            return Ok(incorrect(aid));
        };
        let outcome = self.evaluate(base, &given.as_text())?;
        let mut entry = CorrectMapEntry::graded(outcome.correctness);
        if outcome.correctness == Correctness::PartiallyCorrect {
            entry = entry.with_points(outcome.partial_score);
        }
        Ok(single(aid, entry))
    }

    fn get_answers(&self, base: &ResponseBase) -> BTreeMap<String, ExpectedAnswer> {
        let mut shown = vec![self.correct_answer.clone()];
        shown.extend(self.additional.iter().map(|a| a.answer.clone()));
        BTreeMap::from([(
            base.answer_id().to_string(),
            ExpectedAnswer::Text(shown.join(ANSWER_SEPARATOR)),
        )])
    }

    fn extended_hints(
        &self,
        base: &ResponseBase,
        answers: &StudentAnswers,
        cmap: &mut CorrectMap,
        _gctx: &GradeContext<'_>,
    ) {
        let aid = base.answer_id();
        if cmap.correctness(aid) != Some(Correctness::Correct) {
            return;
        }
        let Some(given) = answers.get(aid) else {
            return;
        };
        let Ok(outcome) = self.evaluate(base, &given.as_text()) else {
            return;
        };
        let hint = match outcome.additional {
            None => self.correct_hint.as_ref(),
            Some(index) => self.additional.get(index).and_then(|a| a.hint.as_ref()),
        };
        if let Some(hint) = hint {
            cmap.append_msg(aid, &hint.to_div(true));
        }
    }
}
