//! Dropdown (option input) responses.

use std::collections::BTreeMap;

use crate::context::{display_value, EvalContext};
use crate::correctmap::{CorrectMap, CorrectMapEntry};
use crate::error::CapaError;
use crate::hints::HintText;
use crate::inputs::InputKind;
use crate::model::StudentAnswers;
use crate::xml::{Document, NodeId};

use super::{correctness_of, ExpectedAnswer, GradeContext, Grader, ResponseBase};

#[derive(Debug, Clone, PartialEq)]
struct OptionHint {
    option: String,
    correct: bool,
    hint: HintText,
}

#[derive(Debug, Clone, PartialEq)]
struct Dropdown {
    id: String,
    correct: String,
    hints: Vec<OptionHint>,
}

/// One or more dropdowns, each graded by exact match.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionResponse {
    dropdowns: Vec<Dropdown>,
}

impl OptionResponse {
    pub(crate) fn build(doc: &Document, inputs: &[(NodeId, InputKind)], ctx: &EvalContext) -> Self {
        let dropdowns = inputs
            .iter()
            .map(|(input, _)| {
                let hints = doc
                    .find_children(*input, "option")
                    .into_iter()
                    .filter_map(|option| {
                        let hint = doc.find_child(option, "optionhint")?;
                        Some(OptionHint {
                            option: doc.leading_text(option).trim().to_string(),
                            correct: doc
                                .attr(option, "correct")
                                .is_some_and(|c| c.trim().eq_ignore_ascii_case("true")),
                            hint: HintText::read(doc, hint, ctx),
                        })
                    })
                    .collect();
                Dropdown {
                    id: doc.attr(*input, "id").unwrap_or_default().to_string(),
                    correct: ctx.contextualize_text(doc.attr(*input, "correct").unwrap_or_default()),
                    hints,
                }
            })
            .collect();
        Self { dropdowns }
    }
}

/// `$name` of the first script variable whose displayed value equals `answer`.
fn answer_variable(ctx: &EvalContext, answer: &str) -> Option<String> {
    ctx.vars()
        .iter()
        .find(|(_, value)| display_value(value) == answer)
        .map(|(name, _)| format!("${name}"))
}

impl Grader for OptionResponse {
    fn get_score(
        &self,
        _base: &ResponseBase,
        answers: &StudentAnswers,
        gctx: &GradeContext<'_>,
    ) -> Result<CorrectMap, CapaError> {
        let mut cmap = CorrectMap::new();
        for dropdown in &self.dropdowns {
            let given = answers.get(&dropdown.id).map(|a| a.as_text());
            let mut entry = CorrectMapEntry::graded(correctness_of(given.as_deref() == Some(dropdown.correct.as_str())));
            if let Some(given) = given {
                entry.answervariable = answer_variable(gctx.eval, &given);
            }
            cmap.set(&dropdown.id, entry);
        }
        Ok(cmap)
    }

    fn get_answers(&self, _base: &ResponseBase) -> BTreeMap<String, ExpectedAnswer> {
        self.dropdowns
            .iter()
            .map(|d| (d.id.clone(), ExpectedAnswer::Text(d.correct.clone())))
            .collect()
    }

    fn extended_hints(
        &self,
        _base: &ResponseBase,
        answers: &StudentAnswers,
        cmap: &mut CorrectMap,
        _gctx: &GradeContext<'_>,
    ) {
        for dropdown in &self.dropdowns {
            let Some(given) = answers.get(&dropdown.id).map(|a| a.as_text()) else {
                continue;
            };
            if let Some(found) = dropdown.hints.iter().find(|h| h.option == given) {
                cmap.append_msg(&dropdown.id, &found.hint.to_div(found.correct));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::test_support::*;
    use crate::context::EvalContext;
    use crate::correctmap::Correctness;
    use crate::model::StudentAnswer;

    const XML: &str = r#"<optionresponse>
        <optioninput options="('Up','Down')" correct="Up">
          <option correct="True">Up<optionhint>Gravity pulls down, lift pushes up.</optionhint></option>
          <option correct="False">Down<optionhint>Think about lift.</optionhint></option>
        </optioninput>
        <optioninput options="('Red','Blue')" correct="$color"/>
      </optionresponse>"#;

    fn ctx() -> EvalContext {
        let mut ctx = EvalContext::new(1, "s");
        ctx.insert("color", json!("Blue"));
        ctx
    }

    #[tokio::test]
    async fn each_dropdown_is_graded_independently() {
        let ctx = ctx();
        let (_, response) = build(XML, &ctx);
        let given = answers(&[
            ("p_2_1", StudentAnswer::from("Down")),
            ("p_2_2", StudentAnswer::from("Blue")),
        ]);
        let cmap = grade_with(&system(), &ctx, &response, &given).await.unwrap();
        assert_eq!(cmap.correctness("p_2_1"), Some(Correctness::Incorrect));
        assert!(cmap.msg("p_2_1").contains("Think about lift."));
        assert!(cmap.msg("p_2_1").contains("feedback-hint-incorrect"));
        assert_eq!(cmap.correctness("p_2_2"), Some(Correctness::Correct));
        assert_eq!(cmap.get("p_2_2").unwrap().answervariable.as_deref(), Some("$color"));
    }

    #[test]
    fn answers_are_contextualized() {
        let ctx = ctx();
        let (_, response) = build(XML, &ctx);
        let expected = response.get_answers();
        assert_eq!(expected["p_2_2"].to_string(), "Blue");
        assert_eq!(expected["p_2_1"].to_string(), "Up");
    }
}
