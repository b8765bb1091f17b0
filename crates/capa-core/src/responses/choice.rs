//! Checkbox, multiple-choice and true/false responses.

use std::collections::{BTreeMap, BTreeSet};

use crate::context::EvalContext;
use crate::correctmap::{CorrectMap, CorrectMapEntry, Correctness};
use crate::error::CapaError;
use crate::hints::{make_hint_div, HintText};
use crate::model::StudentAnswers;
use crate::shuffle::{select_pool_with, shuffle_with, ProblemRng};
use crate::xml::{Document, NodeId};

use super::{correctness_of, incorrect, round_to, single, ExpectedAnswer, GradeContext, Grader, ResponseBase};

const POOL_NEEDS_BOTH: &str = "Choicegroup must include at least 1 correct and 1 incorrect choice";

fn is_true(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

// ---------------------------------------------------------------------------
// Checkbox
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct CheckboxChoice {
    name: String,
    id: String,
    /// `(shown when selected, hint)` pairs from `<choicehint selected="..">`.
    hints: Vec<(bool, HintText)>,
}

/// Select-all-that-apply grading.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckboxResponse {
    choices: Vec<CheckboxChoice>,
    correct: BTreeSet<String>,
    incorrect: BTreeSet<String>,
    /// Uppercased choice-id sets mapped to their compound hint.
    compound_hints: Vec<(BTreeSet<String>, HintText)>,
}

impl CheckboxResponse {
    pub(crate) fn build(doc: &mut Document, node: NodeId, ctx: &EvalContext) -> Self {
        let mut choices = Vec::new();
        let mut correct = BTreeSet::new();
        let mut incorrect = BTreeSet::new();

        for (index, choice) in doc.find_descendants(node, "choice").into_iter().enumerate() {
            let name = format!("choice_{index}");
            doc.set_attr(choice, "name", &name);
            let id = match doc.attr(choice, "id") {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => {
                    let letter = char::from_u32('A' as u32 + index as u32).unwrap_or('?');
                    let id = letter.to_string();
                    doc.set_attr(choice, "id", &id);
                    id
                }
            };

            let flag = ctx
                .contextualize_text(doc.attr(choice, "correct").unwrap_or_default())
                .to_uppercase();
            match flag.trim() {
                "TRUE" => {
                    correct.insert(name.clone());
                }
                "FALSE" => {
                    incorrect.insert(name.clone());
                }
                _ => {}
            }

            let hints = doc
                .find_children(choice, "choicehint")
                .into_iter()
                .filter_map(|h| {
                    let selected = match doc.attr(h, "selected")?.trim().to_lowercase().as_str() {
                        "true" => true,
                        "false" => false,
                        _ => return None,
                    };
                    Some((selected, HintText::read(doc, h, ctx)))
                })
                .collect();
            choices.push(CheckboxChoice { name, id, hints });
        }

        let compound_hints = doc
            .find_descendants(node, "compoundhint")
            .into_iter()
            .map(|h| {
                let ids = doc
                    .attr(h, "value")
                    .unwrap_or_default()
                    .to_uppercase()
                    .split_whitespace()
                    .map(str::to_string)
                    .collect();
                (ids, HintText::read(doc, h, ctx))
            })
            .collect();

        Self {
            choices,
            correct,
            incorrect,
            compound_hints,
        }
    }

    fn grade_edc(&self, selected: &BTreeSet<String>, max: f64) -> CorrectMapEntry {
        let all: BTreeSet<&String> = self.correct.iter().chain(&self.incorrect).collect();
        let good = all
            .iter()
            .filter(|c| selected.contains(c.as_str()) == self.correct.contains(c.as_str()))
            .count();
        if good == all.len() {
            CorrectMapEntry::graded(Correctness::Correct)
        } else if good > 0 {
            CorrectMapEntry::graded(Correctness::PartiallyCorrect)
                .with_points(round_to(max * good as f64 / all.len() as f64, 2))
        } else {
            CorrectMapEntry::graded(Correctness::Incorrect).with_points(0.0)
        }
    }

    fn grade_halves(&self, selected: &BTreeSet<String>, max: f64) -> CorrectMapEntry {
        let total = self.correct.len() + self.incorrect.len();
        let errors = self.correct.symmetric_difference(selected).count();
        match errors {
            0 => CorrectMapEntry::graded(Correctness::Correct).with_points(max),
            1 if total > 2 => {
                CorrectMapEntry::graded(Correctness::PartiallyCorrect).with_points(round_to(max / 2.0, 2))
            }
            2 if total > 4 => {
                CorrectMapEntry::graded(Correctness::PartiallyCorrect).with_points(round_to(max / 4.0, 2))
            }
            _ => CorrectMapEntry::graded(Correctness::Incorrect),
        }
    }
}

impl Grader for CheckboxResponse {
    fn get_score(
        &self,
        base: &ResponseBase,
        answers: &StudentAnswers,
        _gctx: &GradeContext<'_>,
    ) -> Result<CorrectMap, CapaError> {
        let aid = base.answer_id();
        if self.correct.is_empty() {
            return Err(CapaError::GraderConfiguration(format!(
                "checkbox response {} has no correct choice",
                base.id
            )));
        }
        let selected: BTreeSet<String> = answers
            .get(aid)
            .map(|a| a.as_list().into_iter().collect())
            .unwrap_or_default();
        if selected.is_empty() {
            return Ok(incorrect(aid));
        }

        let credit = base.single_credit_type(&["edc", "halves", "false"], "Checkbox")?;
        let entry = match credit {
            Some("edc") => self.grade_edc(&selected, base.max_score()),
            Some("halves") => self.grade_halves(&selected, base.max_score()),
            _ => CorrectMapEntry::graded(correctness_of(selected == self.correct)),
        };
        Ok(single(aid, entry))
    }

    fn get_answers(&self, base: &ResponseBase) -> BTreeMap<String, ExpectedAnswer> {
        BTreeMap::from([(
            base.answer_id().to_string(),
            ExpectedAnswer::List(self.correct.iter().cloned().collect()),
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
        let Some(answer) = answers.get(aid) else {
            return;
        };
        let selected = answer.as_list();
        let correct = cmap.correctness(aid) == Some(Correctness::Correct);

        let selected_ids: BTreeSet<String> = self
            .choices
            .iter()
            .filter(|c| selected.contains(&c.name))
            .map(|c| c.id.to_uppercase())
            .collect();
        if let Some((_, hint)) = self.compound_hints.iter().find(|(ids, _)| *ids == selected_ids) {
            cmap.append_msg(aid, &hint.to_div(correct));
            return;
        }

        let mut texts = Vec::new();
        let mut labels = Vec::new();
        for choice in &self.choices {
            let is_selected = selected.contains(&choice.name);
            for (when_selected, hint) in &choice.hints {
                if *when_selected != is_selected {
                    continue;
                }
                if let Some(label) = &hint.label {
                    labels.push(label.as_str());
                }
                if !hint.text.is_empty() {
                    texts.push(hint.text.clone());
                }
            }
        }
        if texts.is_empty() {
            return;
        }
        let label = match labels.as_slice() {
            [only] => Some(*only),
            _ => None,
        };
        cmap.append_msg(aid, &make_hint_div(correct, label, &texts, true));
    }
}

// ---------------------------------------------------------------------------
// Multiple choice and true/false
// ---------------------------------------------------------------------------

/// Radio-button grading (`MultipleChoice`) or all-selected set grading (`TrueFalse`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceKind {
    MultipleChoice,
    TrueFalse,
}

impl ChoiceKind {
    fn group_type(&self) -> &'static str {
        match self {
            ChoiceKind::MultipleChoice => "MultipleChoice",
            ChoiceKind::TrueFalse => "TrueFalse",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct McChoice {
    name: String,
    correct: bool,
    /// Points for a `correct="partial"` choice.
    partial: Option<f64>,
    hint: Option<HintText>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultipleChoiceResponse {
    kind: ChoiceKind,
    choices: Vec<McChoice>,
}

impl MultipleChoiceResponse {
    pub(crate) fn build(
        doc: &mut Document,
        node: NodeId,
        kind: ChoiceKind,
        ctx: &EvalContext,
    ) -> Result<Self, CapaError> {
        let mut unnamed = 0;
        for group in doc.find_children(node, "choicegroup") {
            doc.set_attr(group, "type", kind.group_type());
            for choice in doc.find_children(group, "choice") {
                let name = match doc.attr(choice, "name") {
                    Some(name) => format!("choice_{name}"),
                    None => {
                        let name = format!("choice_{unnamed}");
                        unnamed += 1;
                        name
                    }
                };
                doc.set_attr(choice, "name", &name);
            }
        }

        let mut choices = Vec::new();
        for choice in doc.find_descendants(node, "choice") {
            let flag = ctx.contextualize_text(doc.attr(choice, "correct").unwrap_or_default());
            let partial = if flag.trim().eq_ignore_ascii_case("partial") {
                let value = match doc.attr(choice, "point_value") {
                    Some(raw) => raw.trim().parse::<f64>().map_err(|_| {
                        CapaError::Parse(format!("point_value should be a number, got {raw:?}"))
                    })?,
                    None => 0.5,
                };
                Some(value)
            } else {
                None
            };
            choices.push(McChoice {
                name: ctx.contextualize_text(doc.attr(choice, "name").unwrap_or_default()),
                correct: is_true(&flag),
                partial,
                hint: doc
                    .find_child(choice, "choicehint")
                    .map(|h| HintText::read(doc, h, ctx)),
            });
        }

        Ok(Self { kind, choices })
    }

    fn correct_choices(&self) -> Vec<String> {
        self.choices
            .iter()
            .filter(|c| c.correct)
            .map(|c| c.name.clone())
            .collect()
    }

    /// Reorder the first `shuffle="true"` group, keeping `fixed="true"` choices in place.
    pub(crate) fn shuffle(&self, doc: &mut Document, node: NodeId, rng: &mut ProblemRng) -> Result<(), CapaError> {
        let Some(group) = doc
            .find_children(node, "choicegroup")
            .into_iter()
            .find(|g| doc.attr(*g, "shuffle") == Some("true"))
        else {
            return Ok(());
        };
        if doc.attr(group, "answer-pool").is_some() {
            return Err(CapaError::Parse(
                "Do not use shuffle and answer-pool at the same time".to_string(),
            ));
        }

        let children: Vec<NodeId> = doc.element_children(group).collect();
        let fixed: Vec<bool> = children
            .iter()
            .map(|c| doc.attr(*c, "fixed") == Some("true"))
            .collect();
        let order = shuffle_with(children.clone(), &fixed, rng).map_err(|e| CapaError::Parse(e.to_string()))?;
        doc.reorder_children(group, &children, &order);
        Ok(())
    }

    /// Keep one correct choice and up to `answer-pool - 1` incorrect ones.
    ///
    /// Solutions following the response that explain other correct choices are
    /// removed.
    pub(crate) fn answer_pool(&self, doc: &mut Document, node: NodeId, rng: &mut ProblemRng) -> Result<(), CapaError> {
        let Some(group) = doc
            .find_children(node, "choicegroup")
            .into_iter()
            .find(|g| doc.attr(*g, "answer-pool").is_some())
        else {
            return Ok(());
        };
        let raw = doc.attr(group, "answer-pool").unwrap_or_default().trim().to_string();
        if raw == "0" {
            return Ok(());
        }
        let size: usize = raw
            .parse()
            .map_err(|_| CapaError::Parse("answer-pool value should be an integer".to_string()))?;

        let children: Vec<NodeId> = doc.element_children(group).collect();
        let candidates: Vec<(NodeId, bool)> = children
            .iter()
            .filter_map(|c| {
                match doc.attr(*c, "correct").map(|v| v.trim().to_uppercase()).as_deref() {
                    Some("TRUE") => Some((*c, true)),
                    Some("FALSE") => Some((*c, false)),
                    _ => None,
                }
            })
            .collect();
        let pool = select_pool_with(&candidates, size, rng)
            .map_err(|_| CapaError::Parse(POOL_NEEDS_BOTH.to_string()))?;
        doc.reorder_children(group, &children, &pool.choices);

        let explanation = doc.attr(pool.correct, "explanation-id").map(str::to_string);
        let solutionset = doc
            .following_element_siblings(node)
            .into_iter()
            .find(|s| doc.has_tag(*s, "solutionset"));
        if let Some(set) = solutionset {
            for solution in doc.find_children(set, "solution") {
                if doc.attr(solution, "explanation-id") != explanation.as_deref() {
                    doc.detach(solution);
                }
            }
        }
        Ok(())
    }
}

impl MultipleChoiceResponse {
    /// Forget choices that an answer pool removed from the document.
    pub(crate) fn retain_present(&mut self, doc: &Document, node: NodeId) {
        let present: Vec<String> = doc
            .find_descendants(node, "choice")
            .into_iter()
            .filter_map(|c| doc.attr(c, "name").map(str::to_string))
            .collect();
        self.choices.retain(|c| present.contains(&c.name));
    }
}

impl Grader for MultipleChoiceResponse {
    fn get_score(
        &self,
        base: &ResponseBase,
        answers: &StudentAnswers,
        _gctx: &GradeContext<'_>,
    ) -> Result<CorrectMap, CapaError> {
        let aid = base.answer_id();
        let correct = self.correct_choices();
        if correct.is_empty() {
            return Err(CapaError::GraderConfiguration(format!(
                "choice response {} has no correct choice",
                base.id
            )));
        }
        let given = answers.get(aid).map(|a| a.as_list()).unwrap_or_default();

        let entry = match self.kind {
            ChoiceKind::TrueFalse => {
                let given: BTreeSet<&String> = given.iter().collect();
                let expected: BTreeSet<&String> = correct.iter().collect();
                CorrectMapEntry::graded(correctness_of(given == expected))
            }
            ChoiceKind::MultipleChoice => {
                let credit = base.single_credit_type(&["points", "false"], "Multiple Choice")?;
                let answer = match given.as_slice() {
                    [one] => Some(one),
                    _ => None,
                };
                let partial = answer
                    .and_then(|a| self.choices.iter().find(|c| &c.name == a))
                    .and_then(|c| c.partial);
                match (answer, partial) {
                    (Some(a), _) if correct.contains(a) => CorrectMapEntry::graded(Correctness::Correct),
                    (Some(_), Some(points)) if credit == Some("points") => {
                        CorrectMapEntry::graded(Correctness::PartiallyCorrect).with_points(points)
                    }
                    _ => CorrectMapEntry::graded(Correctness::Incorrect),
                }
            }
        };
        Ok(single(aid, entry))
    }

    fn get_answers(&self, base: &ResponseBase) -> BTreeMap<String, ExpectedAnswer> {
        BTreeMap::from([(
            base.answer_id().to_string(),
            ExpectedAnswer::List(self.correct_choices()),
        )])
    }

    fn extended_hints(
        &self,
        base: &ResponseBase,
        answers: &StudentAnswers,
        cmap: &mut CorrectMap,
        _gctx: &GradeContext<'_>,
    ) {
        if self.kind != ChoiceKind::MultipleChoice {
            return;
        }
        let aid = base.answer_id();
        let Some(answer) = answers.get(aid).and_then(|a| a.as_list().into_iter().next()) else {
            return;
        };
        let hint = self
            .choices
            .iter()
            .find(|c| c.name == answer)
            .and_then(|c| c.hint.as_ref().map(|h| (c.correct, h)));
        if let Some((correct, hint)) = hint {
            cmap.append_msg(aid, &hint.to_div(correct));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::context::EvalContext;
    use crate::correctmap::Correctness;
    use crate::model::StudentAnswer;
    use crate::shuffle::rng_for_seed;

    const CHECKBOX: &str = r#"<choiceresponse>
        <checkboxgroup>
          <choice correct="true">a<choicehint selected="true">A is right</choicehint></choice>
          <choice correct="false">b<choicehint selected="true">B is wrong</choicehint></choice>
          <choice correct="true">c</choice>
          <choice correct="false">d</choice>
          <compoundhint value="A C">Both right ones</compoundhint>
        </checkboxgroup>
      </choiceresponse>"#;

    fn checkbox(extra: &str) -> crate::responses::Response {
        let xml = CHECKBOX.replacen("<choiceresponse>", &format!("<choiceresponse {extra}>"), 1);
        build(&xml, &EvalContext::new(1, "s")).1
    }

    #[tokio::test]
    async fn checkbox_requires_exact_set() {
        let response = checkbox("");
        let right = answers(&[("p_2_1", StudentAnswer::from(vec!["choice_2", "choice_0"]))]);
        let cmap = grade(&response, &right).await;
        assert_eq!(cmap.correctness("p_2_1"), Some(Correctness::Correct));
        assert!(cmap.msg("p_2_1").contains("Both right ones"));

        let wrong = answers(&[("p_2_1", StudentAnswer::from(vec!["choice_0"]))]);
        let cmap = grade(&response, &wrong).await;
        assert_eq!(cmap.correctness("p_2_1"), Some(Correctness::Incorrect));
        assert!(cmap.msg("p_2_1").contains("A is right"));
    }

    #[tokio::test]
    async fn checkbox_empty_selection_is_incorrect() {
        let response = checkbox("");
        let cmap = grade(&response, &answers(&[("p_2_1", StudentAnswer::List(vec![]))])).await;
        assert_eq!(cmap.correctness("p_2_1"), Some(Correctness::Incorrect));
    }

    #[tokio::test]
    async fn checkbox_edc_partial_credit() {
        let response = checkbox(r#"partial_credit="EDC" points="2""#);
        // choice_0 right, choice_1 wrongly selected, choice_2 missed, choice_3 right to skip
        let cmap = grade(&response, &answers(&[("p_2_1", StudentAnswer::from(vec!["choice_0", "choice_1"]))])).await;
        assert_eq!(cmap.correctness("p_2_1"), Some(Correctness::PartiallyCorrect));
        assert_eq!(cmap.npoints("p_2_1"), 1.0);
    }

    #[tokio::test]
    async fn checkbox_halves_partial_credit() {
        let response = checkbox(r#"partial_credit="halves""#);
        let cmap = grade(&response, &answers(&[("p_2_1", StudentAnswer::from(vec!["choice_0"]))])).await;
        assert_eq!(cmap.correctness("p_2_1"), Some(Correctness::PartiallyCorrect));
        assert_eq!(cmap.npoints("p_2_1"), 0.5);
    }

    #[tokio::test]
    async fn checkbox_without_correct_choice_is_misconfigured() {
        let ctx = EvalContext::new(1, "s");
        let (_, response) = build(
            r#"<choiceresponse><checkboxgroup><choice correct="false">a</choice></checkboxgroup></choiceresponse>"#,
            &ctx,
        );
        let err = grade_with(&system(), &ctx, &response, &answers(&[("p_2_1", StudentAnswer::from(vec!["choice_0"]))]))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::CapaError::GraderConfiguration(_)));
    }

    const MC: &str = r#"<multiplechoiceresponse>
        <choicegroup>
          <choice correct="false">x<choicehint>Not x</choicehint></choice>
          <choice correct="true">y</choice>
          <choice correct="partial" point_value="0.25">z</choice>
        </choicegroup>
      </multiplechoiceresponse>"#;

    #[tokio::test]
    async fn multiple_choice_grades_single_selection() {
        let (_, response) = build(MC, &EvalContext::new(1, "s"));
        let cmap = grade(&response, &answers(&[("p_2_1", StudentAnswer::from("choice_1"))])).await;
        assert_eq!(cmap.correctness("p_2_1"), Some(Correctness::Correct));

        let cmap = grade(&response, &answers(&[("p_2_1", StudentAnswer::from("choice_0"))])).await;
        assert_eq!(cmap.correctness("p_2_1"), Some(Correctness::Incorrect));
        assert!(cmap.msg("p_2_1").contains("Not x"));
    }

    #[tokio::test]
    async fn multiple_choice_points_credit() {
        let xml = MC.replacen("<multiplechoiceresponse>", r#"<multiplechoiceresponse partial_credit="points">"#, 1);
        let (_, response) = build(&xml, &EvalContext::new(1, "s"));
        let cmap = grade(&response, &answers(&[("p_2_1", StudentAnswer::from("choice_2"))])).await;
        assert_eq!(cmap.correctness("p_2_1"), Some(Correctness::PartiallyCorrect));
        assert_eq!(cmap.npoints("p_2_1"), 0.25);
    }

    #[tokio::test]
    async fn true_false_needs_every_true_choice() {
        let xml = r#"<truefalseresponse><choicegroup>
            <choice correct="true">a</choice><choice correct="true">b</choice><choice correct="false">c</choice>
          </choicegroup></truefalseresponse>"#;
        let (doc, response) = build(xml, &EvalContext::new(1, "s"));
        let group = doc.find_descendants(doc.root(), "choicegroup")[0];
        assert_eq!(doc.attr(group, "type"), Some("TrueFalse"));

        let cmap = grade(&response, &answers(&[("p_2_1", StudentAnswer::from(vec!["choice_0"]))])).await;
        assert_eq!(cmap.correctness("p_2_1"), Some(Correctness::Incorrect));
        let cmap = grade(&response, &answers(&[("p_2_1", StudentAnswer::from(vec!["choice_1", "choice_0"]))])).await;
        assert_eq!(cmap.correctness("p_2_1"), Some(Correctness::Correct));
    }

    #[test]
    fn shuffle_keeps_fixed_choices() {
        let xml = r#"<multiplechoiceresponse><choicegroup shuffle="true">
            <choice correct="false" fixed="true">first</choice>
            <choice correct="true">a</choice><choice correct="false">b</choice>
            <choice correct="false">c</choice><choice correct="false">d</choice>
          </choicegroup></multiplechoiceresponse>"#;
        let (mut doc, mut response) = build(xml, &EvalContext::new(1, "s"));
        response.late_transforms(&mut doc, &mut rng_for_seed(3)).unwrap();
        let group = doc.find_descendants(doc.root(), "choicegroup")[0];
        let names: Vec<String> = doc
            .element_children(group)
            .map(|c| doc.attr(c, "name").unwrap().to_string())
            .collect();
        assert_eq!(names[0], "choice_0");
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["choice_0", "choice_1", "choice_2", "choice_3", "choice_4"]);
    }

    #[test]
    fn shuffle_with_pool_is_rejected() {
        let xml = r#"<multiplechoiceresponse><choicegroup shuffle="true" answer-pool="2">
            <choice correct="true">a</choice><choice correct="false">b</choice>
          </choicegroup></multiplechoiceresponse>"#;
        let (mut doc, mut response) = build(xml, &EvalContext::new(1, "s"));
        let err = response.late_transforms(&mut doc, &mut rng_for_seed(3)).unwrap_err();
        assert!(err.to_string().contains("Do not use shuffle and answer-pool at the same time"));
    }

    #[test]
    fn answer_pool_keeps_one_correct_and_matching_solution() {
        let xml = r#"<problem><multiplechoiceresponse id="p_2"><choicegroup answer-pool="3">
            <choice correct="false">w1</choice>
            <choice correct="true" explanation-id="s1">c1</choice>
            <choice correct="false">w2</choice>
            <choice correct="true" explanation-id="s2">c2</choice>
            <choice correct="false">w3</choice>
          </choicegroup></multiplechoiceresponse>
          <solutionset><solution explanation-id="s1">one</solution><solution explanation-id="s2">two</solution></solutionset>
          </problem>"#;
        let mut doc = crate::xml::Document::parse(xml).unwrap();
        let node = doc.find_descendants(doc.root(), "multiplechoiceresponse")[0];
        let group = doc.find_descendants(node, "choicegroup")[0];
        doc.set_attr(group, "id", "p_2_1");
        let mut response = crate::responses::Response::build(&mut doc, node, &EvalContext::new(1, "s")).unwrap();
        response.late_transforms(&mut doc, &mut rng_for_seed(56)).unwrap();

        let kept: Vec<_> = doc.element_children(group).collect();
        assert_eq!(kept.len(), 3);
        let correct: Vec<_> = kept.iter().filter(|c| doc.attr(**c, "correct") == Some("true")).collect();
        assert_eq!(correct.len(), 1);
        let explanation = doc.attr(*correct[0], "explanation-id").unwrap().to_string();
        let solutions = doc.find_descendants(doc.root(), "solution");
        assert_eq!(solutions.len(), 1);
        assert_eq!(doc.attr(solutions[0], "explanation-id"), Some(explanation.as_str()));

        let shown = doc.attr(*correct[0], "name").unwrap().to_string();
        assert_eq!(
            response.get_answers()["p_2_1"],
            crate::responses::ExpectedAnswer::List(vec![shown])
        );
    }

    #[test]
    fn answer_pool_must_be_integer() {
        let xml = r#"<multiplechoiceresponse><choicegroup answer-pool="lots">
            <choice correct="true">a</choice><choice correct="false">b</choice>
          </choicegroup></multiplechoiceresponse>"#;
        let (mut doc, mut response) = build(xml, &EvalContext::new(1, "s"));
        let err = response.late_transforms(&mut doc, &mut rng_for_seed(3)).unwrap_err();
        assert!(err.to_string().contains("answer-pool value should be an integer"));
    }
}
