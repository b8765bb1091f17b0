//! Text responses matched exactly, case-insensitively, or by regular expression.

use std::collections::BTreeMap;

use regex::RegexBuilder;
use tracing::error;

use crate::context::EvalContext;
use crate::correctmap::{CorrectMap, CorrectMapEntry};
use crate::error::CapaError;
use crate::hints::{HintGroup, HintText};
use crate::model::StudentAnswers;
use crate::xml::{Document, NodeId};

use super::{correctness_of, incorrect, single, ExpectedAnswer, GradeContext, Grader, ResponseBase, ANSWER_SEPARATOR};

/// Hint shown when the submission matches `answer`.
#[derive(Debug, Clone, PartialEq)]
struct MatchHint {
    answer: String,
    hint: HintText,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringResponse {
    /// Accepted answers, contextualized and trimmed.
    answers: Vec<String>,
    regexp: bool,
    case_insensitive: bool,
    /// Old `a_or_b` answers: always plain comparison.
    backward: bool,
    correct_hint: Option<HintText>,
    additional_hints: Vec<MatchHint>,
    equal_hints: Vec<MatchHint>,
    regexp_hints: Vec<MatchHint>,
}

impl StringResponse {
    pub(crate) fn build(doc: &Document, node: NodeId, ctx: &EvalContext) -> Self {
        let answer = doc.attr(node, "answer").unwrap_or_default();
        let types: Vec<String> = doc
            .attr(node, "type")
            .unwrap_or_default()
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let backward = answer.to_lowercase().contains("_or_");

        let additional: Vec<NodeId> = doc.find_children(node, "additional_answer");
        let answers: Vec<String> = if backward {
            answer
                .split("_or_")
                .map(|a| ctx.contextualize_text(a).trim().to_string())
                .collect()
        } else {
            std::iter::once(answer)
                .chain(additional.iter().filter_map(|aa| doc.attr(*aa, "answer")))
                .map(|a| ctx.contextualize_text(a).trim().to_string())
                .collect()
        };

        let match_hints = |tag: &str| -> Vec<MatchHint> {
            doc.find_children(node, tag)
                .into_iter()
                .map(|h| MatchHint {
                    answer: ctx.contextualize_text(doc.attr(h, "answer").unwrap_or_default()),
                    hint: HintText::read(doc, h, ctx),
                })
                .collect()
        };
        let additional_hints = additional
            .iter()
            .filter_map(|aa| {
                Some(MatchHint {
                    answer: ctx.contextualize_text(doc.attr(*aa, "answer")?),
                    hint: HintText::read(doc, doc.find_child(*aa, "correcthint")?, ctx),
                })
            })
            .collect();

        Self {
            answers,
            regexp: types.iter().any(|t| t == "regexp"),
            case_insensitive: types.iter().any(|t| t == "ci"),
            backward,
            correct_hint: doc
                .find_child(node, "correcthint")
                .map(|h| HintText::read(doc, h, ctx)),
            additional_hints,
            equal_hints: match_hints("stringequalhint"),
            regexp_hints: match_hints("regexphint"),
        }
    }

    /// Returns `true` if `given` matches one of `expected`.
    fn check_string(&self, expected: &[String], given: &str) -> Result<bool, CapaError> {
        if given.is_empty() {
            return Ok(false);
        }
        if self.regexp && !self.backward {
            let pattern = format!("^(?:{})$", expected.join("|"));
            let re = RegexBuilder::new(&pattern)
                .case_insensitive(self.case_insensitive)
                .build()
                .map_err(|e| {
                    error!("invalid answer pattern {pattern:?}: {e}");
                    CapaError::Response(format!("error: {e}"))
                })?;
            return Ok(re.is_match(given));
        }
        Ok(if self.case_insensitive {
            let given = given.to_lowercase();
            expected.iter().any(|e| e.to_lowercase() == given)
        } else {
            expected.iter().any(|e| e == given)
        })
    }

    /// Match used by extended hints; malformed patterns never match.
    fn hint_matches(&self, answer: &str, given: &str, regexp: bool) -> bool {
        let answer = answer.trim();
        if answer.is_empty() {
            return false;
        }
        if regexp {
            return RegexBuilder::new(&format!("^(?:{answer})$"))
                .case_insensitive(self.case_insensitive)
                .build()
                .map(|re| re.is_match(given))
                .unwrap_or(false);
        }
        if self.case_insensitive {
            answer.to_lowercase() == given.to_lowercase()
        } else {
            answer == given
        }
    }
}

impl Grader for StringResponse {
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
        let correct = self.check_string(&self.answers, given.as_text().trim())?;
        Ok(single(aid, CorrectMapEntry::graded(correctness_of(correct))))
    }

    fn get_answers(&self, base: &ResponseBase) -> BTreeMap<String, ExpectedAnswer> {
        BTreeMap::from([(
            base.answer_id().to_string(),
            ExpectedAnswer::Text(self.answers.join(ANSWER_SEPARATOR)),
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
        let Some(given) = answers.get(aid).map(|a| a.as_text().trim().to_string()) else {
            return;
        };
        let primary = self.answers.first().map(String::as_str).unwrap_or_default();

        let found = if self.correct_hint.is_some() && self.hint_matches(primary, &given, self.regexp) {
            self.correct_hint.as_ref().map(|h| (true, h))
        } else if let Some(h) = self
            .additional_hints
            .iter()
            .find(|h| self.hint_matches(&h.answer, &given, self.regexp))
        {
            Some((true, &h.hint))
        } else if let Some(h) = self.equal_hints.iter().find(|h| self.hint_matches(&h.answer, &given, false)) {
            Some((false, &h.hint))
        } else {
            self.regexp_hints
                .iter()
                .find(|h| self.hint_matches(&h.answer, &given, true))
                .map(|h| (false, &h.hint))
        };

        if let Some((correct, hint)) = found {
            cmap.append_msg(aid, &hint.to_div(correct));
        }
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
            .map(|a| a.as_text().trim().to_string())
            .unwrap_or_default();
        Some(
            group
                .conditions
                .iter()
                .filter(|c| {
                    let hinted = gctx.eval.contextualize_text(&c.answer).trim().to_string();
                    self.check_string(&[hinted], &given).unwrap_or(false)
                })
                .map(|c| c.name.clone())
                .collect(),
        )
    }
}
