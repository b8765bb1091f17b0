//! Responses graded by author scripts: custom check functions and schematics.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use tracing::{error, warn};

use crate::context::EvalContext;
use crate::correctmap::{CorrectMap, CorrectMapEntry, Correctness};
use crate::error::CapaError;
use crate::model::{StudentAnswer, StudentAnswers};
use crate::xml::{Document, NodeId};

use super::{default_answer_map, incorrect, ExpectedAnswer, GradeContext, Grader, ResponseBase};

const NO_ANSWER_MSG: &str = "<span class=\"inline-error\">No answer entered!</span>";
const INVALID_DICT: &str = "CustomResponse: check function returned an invalid dictionary!";

/// Where the checking logic lives.
#[derive(Debug, Clone, PartialEq)]
enum CheckCode {
    /// `<answer>` script that assigns `correct` and `messages`.
    Inline(String),
    /// Named function from the problem scripts, called as
    /// `check(expect, given, student_answers, extra_args...)`.
    Function(String),
    Missing,
}

/// What a check produced for each input, in `idset` order.
#[derive(Debug, Clone, PartialEq, Default)]
struct CheckOutcome {
    correct: Vec<Correctness>,
    messages: Vec<String>,
    overall_message: String,
    grade_decimals: Option<Vec<f64>>,
}

/// Answer ids ordered by their trailing index.
fn sorted_idset(base: &ResponseBase) -> Vec<String> {
    let mut idset = base.answer_ids.clone();
    idset.sort_by_key(|id| {
        id.rsplit('_')
            .next()
            .and_then(|n| n.parse::<u64>().ok())
            .unwrap_or(0)
    });
    idset
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Interpret a check function's `ok` value.
fn ok_correctness(ok: &Value) -> Correctness {
    if !is_truthy(ok) {
        return Correctness::Incorrect;
    }
    let text = match ok {
        Value::String(s) => s.trim().to_lowercase(),
        other => other.to_string().to_lowercase(),
    };
    if text == "false" {
        Correctness::Incorrect
    } else if text.contains("partial") {
        Correctness::PartiallyCorrect
    } else {
        Correctness::Correct
    }
}

fn default_decimal(correctness: Correctness) -> f64 {
    match correctness {
        Correctness::Correct => 1.0,
        Correctness::PartiallyCorrect => 0.5,
        Correctness::Incorrect => 0.0,
    }
}

fn message_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
    }
}

fn decimal(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn correctness_list(value: Option<&Value>, len: usize) -> Vec<Correctness> {
    let items = value.and_then(Value::as_array).cloned().unwrap_or_default();
    (0..len)
        .map(|i| {
            items
                .get(i)
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .unwrap_or(Correctness::Incorrect)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Custom response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct CustomResponse {
    expect: String,
    check: CheckCode,
    options: Option<String>,
    /// Context names passed as extra arguments to the check function.
    extra_args: Vec<String>,
    empty_answer_err: bool,
}

impl CustomResponse {
    pub(crate) fn build(doc: &Document, node: NodeId, base: &ResponseBase, ctx: &EvalContext) -> Self {
        let expect = doc
            .attr(node, "expect")
            .or_else(|| doc.attr(node, "answer"))
            .map(|e| ctx.contextualize_text(e))
            .unwrap_or_default();

        let check = if let Some(answer) = doc.find_descendants(node, "answer").first() {
            CheckCode::Inline(doc.text_content(*answer))
        } else if let Some(cfn) = doc.attr(node, "cfn") {
            CheckCode::Function(cfn.to_string())
        } else {
            error!(response = %base.id, "customresponse has neither an <answer> script nor a cfn");
            CheckCode::Missing
        };

        Self {
            expect,
            check,
            options: doc.attr(node, "options").map(str::to_string),
            extra_args: doc
                .attr(node, "cfn_extra_args")
                .unwrap_or_default()
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            empty_answer_err: doc.attr(node, "empty_answer_err").is_some_and(|v| !v.is_empty()),
        }
    }

    fn bindings(
        &self,
        base: &ResponseBase,
        idset: &[String],
        submission: &[Value],
        answers: &StudentAnswers,
        gctx: &GradeContext<'_>,
    ) -> Map<String, Value> {
        let mut bindings = gctx.eval.bindings();
        let n = idset.len();
        bindings.insert("response_id".into(), json!(base.id));
        bindings.insert("expect".into(), json!(self.expect));
        bindings.insert("submission".into(), json!(submission));
        bindings.insert("idset".into(), json!(idset));
        bindings.insert(
            "answers".into(),
            serde_json::to_value(answers).unwrap_or(Value::Null),
        );
        bindings.insert("correct".into(), json!(vec!["unknown"; n]));
        bindings.insert("messages".into(), json!(vec![""; n]));
        bindings.insert("overall_message".into(), json!(""));
        bindings.insert("options".into(), json!(self.options));
        bindings
    }

    fn run_inline(&self, code: &str, bindings: &Map<String, Value>, n: usize, gctx: &GradeContext<'_>) -> Result<CheckOutcome, CapaError> {
        let script = match gctx.eval.script_code() {
            "" => code.to_string(),
            prelude => format!("{prelude}\n{code}"),
        };
        let globals = gctx
            .system
            .sandbox
            .run(&script, gctx.eval.seed, bindings)
            .map_err(|e| {
                warn!("error occurred while evaluating customresponse: {e:#}");
                CapaError::Sandbox(e)
            })?;

        let messages = globals
            .get("messages")
            .and_then(Value::as_array)
            .map(|m| m.iter().map(|v| message_text(Some(v))).collect())
            .unwrap_or_else(|| vec![String::new(); n]);
        let grade_decimals = globals
            .get("grade_decimals")
            .and_then(Value::as_array)
            .map(|d| d.iter().map(|v| decimal(Some(v)).unwrap_or(0.0)).collect());

        Ok(CheckOutcome {
            correct: correctness_list(globals.get("correct"), n),
            messages,
            overall_message: message_text(globals.get("overall_message")),
            grade_decimals,
        })
    }

    fn call_function(
        &self,
        cfn: &str,
        bindings: &Map<String, Value>,
        submission: Vec<Value>,
        gctx: &GradeContext<'_>,
    ) -> Result<CheckOutcome, CapaError> {
        let n = submission.len();
        let given = match <[Value; 1]>::try_from(submission) {
            Ok([one]) => one,
            Err(many) => Value::Array(many),
        };
        let student_answers = bindings.get("answers").cloned().unwrap_or(Value::Null);
        let mut args = vec![json!(self.expect), given, student_answers];
        args.extend(
            self.extra_args
                .iter()
                .map(|name| bindings.get(name).cloned().unwrap_or(Value::Null)),
        );

        let ret = gctx
            .system
            .sandbox
            .call(gctx.eval.script_code(), gctx.eval.seed, bindings, cfn, &args)
            .map_err(|e| {
                warn!("error occurred while calling check function {cfn}: {e:#}");
                CapaError::Sandbox(e)
            })?;
        interpret_return(ret, n)
    }
}

/// Normalize the three accepted check-function return shapes.
fn interpret_return(ret: Value, n: usize) -> Result<CheckOutcome, CapaError> {
    match ret {
        Value::Object(map) if map.contains_key("ok") => {
            let correctness = ok_correctness(&map["ok"]);
            let msg = message_text(map.get("msg"));
            let (messages, overall_message) = if n > 1 {
                (vec![String::new(); n], msg)
            } else {
                (vec![msg], String::new())
            };
            let decimal = decimal(map.get("grade_decimal")).unwrap_or_else(|| default_decimal(correctness));
            Ok(CheckOutcome {
                correct: vec![correctness; n],
                messages,
                overall_message,
                grade_decimals: Some(vec![decimal; n]),
            })
        }
        Value::Object(map) if map.contains_key("input_list") => {
            let Some(items) = map["input_list"].as_array() else {
                error!("{INVALID_DICT}");
                return Err(CapaError::Response(INVALID_DICT.to_string()));
            };
            let mut outcome = CheckOutcome {
                overall_message: message_text(map.get("overall_message")),
                grade_decimals: Some(Vec::new()),
                ..Default::default()
            };
            for item in items {
                let correctness = ok_correctness(item.get("ok").unwrap_or(&Value::Null));
                outcome.correct.push(correctness);
                outcome.messages.push(message_text(item.get("msg")));
                if let Some(decimals) = outcome.grade_decimals.as_mut() {
                    decimals.push(decimal(item.get("grade_decimal")).unwrap_or_else(|| default_decimal(correctness)));
                }
            }
            Ok(outcome)
        }
        Value::Object(_) => {
            error!("{INVALID_DICT}");
            Err(CapaError::Response(INVALID_DICT.to_string()))
        }
        other => Ok(CheckOutcome {
            correct: vec![ok_correctness(&other); n],
            messages: vec![String::new(); n],
            ..Default::default()
        }),
    }
}

impl Grader for CustomResponse {
    fn get_score(
        &self,
        base: &ResponseBase,
        answers: &StudentAnswers,
        gctx: &GradeContext<'_>,
    ) -> Result<CorrectMap, CapaError> {
        let idset = sorted_idset(base);
        let submission: Vec<Value> = idset
            .iter()
            .map(|id| {
                answers
                    .get(id)
                    .map(StudentAnswer::to_json)
                    .ok_or_else(|| CapaError::Response(format!("error getting student answer for {id}")))
            })
            .collect::<Result<_, _>>()?;

        if let [only] = idset.as_slice() {
            let empty = match &answers[only] {
                StudentAnswer::Text(s) => s.is_empty(),
                StudentAnswer::List(items) => items.is_empty(),
                StudentAnswer::File(_) => false,
            };
            if empty {
                let mut cmap = incorrect(only);
                if self.empty_answer_err {
                    cmap.append_msg(only, NO_ANSWER_MSG);
                }
                return Ok(cmap);
            }
        }

        let bindings = self.bindings(base, &idset, &submission, answers, gctx);
        let outcome = match &self.check {
            CheckCode::Inline(code) => self.run_inline(code, &bindings, idset.len(), gctx)?,
            CheckCode::Function(cfn) => self.call_function(cfn, &bindings, submission, gctx)?,
            CheckCode::Missing => {
                return Err(CapaError::GraderConfiguration(
                    "customresponse has no check function or answer script".to_string(),
                ))
            }
        };

        let mut cmap = CorrectMap::new();
        cmap.set_overall_message(outcome.overall_message.clone());
        for (k, id) in idset.iter().enumerate() {
            let correctness = outcome.correct.get(k).copied().unwrap_or(Correctness::Incorrect);
            let fraction = match &outcome.grade_decimals {
                Some(decimals) => decimals.get(k).copied().unwrap_or(0.0),
                None => default_decimal(correctness),
            };
            let msg = outcome.messages.get(k).cloned().unwrap_or_default();
            cmap.set(
                id,
                CorrectMapEntry::graded(correctness)
                    .with_msg(msg)
                    .with_points(base.max_points_for(id) * fraction),
            );
        }
        Ok(cmap)
    }

    fn get_answers(&self, base: &ResponseBase) -> BTreeMap<String, ExpectedAnswer> {
        if base.answer_ids.len() > 1 || self.expect.is_empty() {
            return default_answer_map(base);
        }
        BTreeMap::from([(base.answer_id().to_string(), ExpectedAnswer::Text(self.expect.clone()))])
    }
}

// ---------------------------------------------------------------------------
// Schematic response
// ---------------------------------------------------------------------------

/// Circuit schematic graded by an `<answer>` script.
#[derive(Debug, Clone, PartialEq)]
pub struct SchematicResponse {
    code: String,
}

impl SchematicResponse {
    pub(crate) fn build(doc: &Document, node: NodeId) -> Result<Self, CapaError> {
        let answer = doc
            .find_descendants(node, "answer")
            .first()
            .copied()
            .ok_or_else(|| CapaError::Parse("schematicresponse: missing <answer> script".to_string()))?;
        Ok(Self {
            code: doc.text_content(answer),
        })
    }
}

impl Grader for SchematicResponse {
    fn get_score(
        &self,
        base: &ResponseBase,
        answers: &StudentAnswers,
        gctx: &GradeContext<'_>,
    ) -> Result<CorrectMap, CapaError> {
        let schematic_error = |e: String| CapaError::Response(format!("Error in evaluating SchematicResponse. The error was: {e}"));
        let mut ids = base.answer_ids.clone();
        ids.sort();

        let submission: Vec<Value> = ids
            .iter()
            .map(|id| {
                let raw = answers.get(id).map(|a| a.as_text()).unwrap_or_default();
                serde_json::from_str(&raw).map_err(|e| schematic_error(e.to_string()))
            })
            .collect::<Result<_, _>>()?;

        let mut bindings = gctx.eval.bindings();
        bindings.insert("submission".into(), Value::Array(submission));
        let script = match gctx.eval.script_code() {
            "" => self.code.clone(),
            prelude => format!("{prelude}\n{}", self.code),
        };
        let globals = gctx
            .system
            .sandbox
            .run(&script, gctx.eval.seed, &bindings)
            .map_err(|e| schematic_error(e.to_string()))?;

        let correct = correctness_list(globals.get("correct"), ids.len());
        let mut cmap = CorrectMap::new();
        for (id, correctness) in ids.iter().zip(correct) {
            cmap.set(id, CorrectMapEntry::graded(correctness));
        }
        Ok(cmap)
    }

    fn get_answers(&self, base: &ResponseBase) -> BTreeMap<String, ExpectedAnswer> {
        default_answer_map(base)
    }
}
