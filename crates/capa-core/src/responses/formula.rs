//! Symbolic formula responses, compared numerically at sampled points.

use std::collections::BTreeMap;

use num_complex::Complex64;
use rand::Rng;

use crate::calc::{self, CalcError, Namespace};
use crate::context::EvalContext;
use crate::correctmap::{CorrectMap, CorrectMapEntry};
use crate::error::CapaError;
use crate::hints::HintGroup;
use crate::model::StudentAnswers;
use crate::shuffle::rng_for_seed;
use crate::xml::{escape_attr, Document, NodeId};

use super::numerical::{Tolerance, DEFAULT_TOLERANCE};
use super::{correctness_of, single, ExpectedAnswer, GradeContext, Grader, ResponseBase};

/// Parsed `vars@lows:highs#count` sample specification.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSpec {
    pub variables: Vec<String>,
    /// `(low, high)` per variable.
    pub ranges: Vec<(f64, f64)>,
    pub count: usize,
}

impl SampleSpec {
    /// Parse e.g. `x,y@1,2:3,4#10`.
    pub fn parse(spec: &str) -> Result<Self, CapaError> {
        let invalid = || CapaError::GraderConfiguration(format!("invalid samples specification '{spec}'"));
        let (vars, rest) = spec.split_once('@').ok_or_else(invalid)?;
        let (bounds, count) = rest.split_once('#').ok_or_else(invalid)?;

        let variables: Vec<String> = vars.split(',').map(|v| v.trim().to_string()).collect();
        let (lows, highs) = bounds.split_once(':').ok_or_else(invalid)?;
        let parse_list = |list: &str| -> Result<Vec<f64>, CapaError> {
            list.split(',')
                .map(|x| x.trim().parse::<f64>().map_err(|_| invalid()))
                .collect()
        };
        let lows = parse_list(lows)?;
        let highs = parse_list(highs)?;
        if lows.len() != variables.len() || highs.len() != variables.len() {
            return Err(invalid());
        }

        let count: usize = count.trim().parse().map_err(|_| invalid())?;
        if count == 0 {
            return Err(invalid());
        }

        Ok(Self {
            variables,
            ranges: lows.into_iter().zip(highs).collect(),
            count,
        })
    }

    /// Draw `count` assignments, each variable uniform over its range.
    pub fn draw<R: Rng>(&self, rng: &mut R) -> Vec<Vec<(String, f64)>> {
        (0..self.count)
            .map(|_| {
                self.variables
                    .iter()
                    .zip(&self.ranges)
                    .map(|(name, (low, high))| (name.clone(), low + (high - low) * rng.gen::<f64>()))
                    .collect()
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormulaResponse {
    answer: String,
    samples: String,
    tolerance: String,
    case_sensitive: bool,
}

impl FormulaResponse {
    pub(crate) fn build(doc: &Document, node: NodeId, ctx: &EvalContext) -> Result<Self, CapaError> {
        let types: Vec<String> = doc
            .attr(node, "type")
            .unwrap_or_default()
            .split(',')
            .map(|t| t.trim().to_lowercase())
            .collect();
        let case_sensitive = types.iter().any(|t| t == "cs") && !types.iter().any(|t| t == "ci");

        let samples = ctx.contextualize_text(doc.attr(node, "samples").unwrap_or_default());
        SampleSpec::parse(&samples).map_err(|e| CapaError::Parse(e.to_string()))?;

        let tolerance = doc
            .find_children(node, "responseparam")
            .into_iter()
            .find(|p| doc.attr(*p, "type") == Some("tolerance"))
            .and_then(|p| doc.attr(p, "default"))
            .map(|t| ctx.contextualize_text(t).trim().to_string())
            .unwrap_or_else(|| DEFAULT_TOLERANCE.to_string());

        Ok(Self {
            answer: ctx.contextualize_text(doc.attr(node, "answer").unwrap_or_default()),
            samples,
            tolerance,
            case_sensitive,
        })
    }

    /// Returns `true` if `given` agrees with `expected` at every sample point.
    fn check_formula(&self, expected: &str, given: &str, samples: &str, seed: u32) -> Result<bool, CapaError> {
        let spec = SampleSpec::parse(samples)?;
        let points = spec.draw(&mut rng_for_seed(u64::from(seed)));
        let tolerance = Tolerance::parse(&self.tolerance)?;

        for point in &points {
            let mut namespace = Namespace::new().case_sensitive(self.case_sensitive);
            for (name, value) in point {
                namespace.set_variable(name, *value);
            }
            let instructor = calc::evaluate(expected, &namespace).map_err(|e| {
                CapaError::GraderConfiguration(format!("cannot evaluate formula answer '{expected}': {e}"))
            })?;
            let student = self.evaluate_student(given, &namespace)?;
            if !tolerance.allows(student, instructor) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn evaluate_student(&self, formula: &str, namespace: &Namespace) -> Result<Complex64, CapaError> {
        calc::evaluate(formula, namespace).map_err(|e| {
            let shown = escape_attr(formula);
            CapaError::StudentInput(match &e {
                CalcError::UndefinedVariable(_) | CalcError::UnmatchedParenthesis => e.to_string(),
                CalcError::Domain(m) if m.contains("factorial") => format!(
                    "Factorial function not permitted in answer for this problem. Provided answer was: {shown}"
                ),
                _ => format!("Invalid input: Could not parse '{shown}' as a formula."),
            })
        })
    }
}

impl Grader for FormulaResponse {
    fn get_score(
        &self,
        base: &ResponseBase,
        answers: &StudentAnswers,
        gctx: &GradeContext<'_>,
    ) -> Result<CorrectMap, CapaError> {
        let aid = base.answer_id();
        let given = answers.get(aid).map(|a| a.as_text()).unwrap_or_default();
        let correct = self.check_formula(&self.answer, &given, &self.samples, gctx.eval.seed)?;
        Ok(single(aid, CorrectMapEntry::graded(correctness_of(correct))))
    }

    fn get_answers(&self, base: &ResponseBase) -> BTreeMap<String, ExpectedAnswer> {
        BTreeMap::from([(base.answer_id().to_string(), ExpectedAnswer::Text(self.answer.clone()))])
    }

    fn hint_conditions(
        &self,
        base: &ResponseBase,
        group: &HintGroup,
        answers: &StudentAnswers,
        gctx: &GradeContext<'_>,
    ) -> Option<Vec<String>> {
        let given = answers
            .get(base.answer_id())
            .map(|a| a.as_text())
            .unwrap_or_default();
        Some(
            group
                .conditions
                .iter()
                .filter(|c| {
                    let hinted = gctx.eval.contextualize_text(&c.answer);
                    let samples = c.samples.as_deref().unwrap_or(&self.samples);
                    self.check_formula(&hinted, &given, samples, gctx.eval.seed)
                        .unwrap_or(false)
                })
                .map(|c| c.name.clone())
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::correctmap::Correctness;
    use crate::model::StudentAnswer;

    const XML: &str = r#"<formularesponse answer="x^2 + 2*x*y" samples="x,y@1,1:3,3#5">
        <responseparam type="tolerance" default="0.0001"/>
        <textline/>
        <hintgroup>
          <formulahint answer="x^2" name="forgot_y"/>
          <hintpart on="forgot_y"><text>Where did y go?</text></hintpart>
        </hintgroup>
      </formularesponse>"#;

    async fn check(given: &str) -> Result<CorrectMap, CapaError> {
        let ctx = EvalContext::new(4, "s");
        let (_, response) = build(XML, &ctx);
        grade_with(&system(), &ctx, &response, &answers(&[("p_2_1", StudentAnswer::from(given))])).await
    }

    #[test]
    fn sample_spec_parsing() {
        let spec = SampleSpec::parse("x,y@1,2:3,4#10").unwrap();
        assert_eq!(spec.variables, vec!["x", "y"]);
        assert_eq!(spec.ranges, vec![(1.0, 3.0), (2.0, 4.0)]);
        assert_eq!(spec.count, 10);
        assert!(SampleSpec::parse("x@1#3").is_err());
        assert!(SampleSpec::parse("x,y@1:3#3").is_err());
    }

    #[test]
    fn zero_samples_are_rejected() {
        assert!(SampleSpec::parse("x@1:2#0").is_err());

        let doc = Document::parse(r#"<formularesponse answer="x" samples="x@1:2#0"><textline/></formularesponse>"#).unwrap();
        let err = FormulaResponse::build(&doc, doc.root(), &EvalContext::new(1, "s")).unwrap_err();
        assert!(matches!(err, CapaError::Parse(_)));
    }

    #[test]
    fn samples_stay_in_range() {
        let spec = SampleSpec::parse("t@-2:5#50").unwrap();
        let points = spec.draw(&mut rng_for_seed(9));
        assert_eq!(points.len(), 50);
        assert!(points.iter().all(|p| (-2.0..=5.0).contains(&p[0].1)));
    }

    #[tokio::test]
    async fn equivalent_formulas_are_correct() {
        let cmap = check("x*(x + 2*y)").await.unwrap();
        assert_eq!(cmap.correctness("p_2_1"), Some(Correctness::Correct));
        let cmap = check("x^2 + y").await.unwrap();
        assert_eq!(cmap.correctness("p_2_1"), Some(Correctness::Incorrect));
    }

    #[tokio::test]
    async fn unknown_variable_is_reported() {
        let err = check("x + z").await.unwrap_err();
        assert!(err.is_student_facing());
        assert!(err.to_string().contains("z"));
    }

    #[tokio::test]
    async fn garbage_is_reported_as_unparsable() {
        let err = check("x +* y").await.unwrap_err();
        assert_eq!(
            err.learner_message(),
            "Invalid input: Could not parse 'x +* y' as a formula."
        );
    }

    #[tokio::test]
    async fn broken_instructor_formula_is_a_configuration_error() {
        let ctx = EvalContext::new(4, "s");
        let (_, response) = build(
            r#"<formularesponse answer="x + secret_y" samples="x@1:3#5"><textline/></formularesponse>"#,
            &ctx,
        );
        let err = grade_with(&system(), &ctx, &response, &answers(&[("p_2_1", StudentAnswer::from("x"))]))
            .await
            .unwrap_err();
        assert!(matches!(err, CapaError::GraderConfiguration(_)));
        assert!(!err.learner_message().contains("secret_y"));
    }

    #[tokio::test]
    async fn formula_hint_condition() {
        let cmap = check("x^2").await.unwrap();
        assert_eq!(cmap.hint("p_2_1"), "Where did y go?");
    }
}
