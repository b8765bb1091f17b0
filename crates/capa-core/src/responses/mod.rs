//! Response graders.
//!
//! A response element groups one or more input fields and grades them
//! together. Tags resolve to a closed [`ResponseTag`] when the problem is
//! built, and each grader reads everything it needs from the document at that
//! point, so grading never walks the tree again.

mod choice;
mod code;
mod custom;
mod formula;
mod image;
mod numerical;
mod option;
mod string;

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::context::EvalContext;
use crate::correctmap::{CorrectMap, CorrectMapEntry, Correctness};
use crate::error::CapaError;
use crate::hints::HintGroup;
use crate::inputs::InputKind;
use crate::model::StudentAnswers;
use crate::shuffle::ProblemRng;
use crate::traits::CapaSystem;
use crate::xml::{escape_attr, Document, NodeId};

pub use choice::{CheckboxResponse, ChoiceKind, MultipleChoiceResponse};
pub use code::CodeResponse;
pub use custom::{CustomResponse, SchematicResponse};
pub use formula::{FormulaResponse, SampleSpec};
pub use image::ImageResponse;
pub use numerical::{compare_with_tolerance, NumericalResponse, Tolerance};
pub use option::OptionResponse;
pub use string::StringResponse;

/// Separator used when several accepted answers are shown together.
pub(crate) const ANSWER_SEPARATOR: &str = " <b>or</b> ";

// ---------------------------------------------------------------------------
// Response tags
// ---------------------------------------------------------------------------

/// The closed set of supported response types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseTag {
    Choice,
    MultipleChoice,
    TrueFalse,
    Option,
    Numerical,
    String,
    Formula,
    Custom,
    Schematic,
    Code,
    Image,
}

impl ResponseTag {
    pub const ALL: &'static [ResponseTag] = &[
        ResponseTag::Choice,
        ResponseTag::MultipleChoice,
        ResponseTag::TrueFalse,
        ResponseTag::Option,
        ResponseTag::Numerical,
        ResponseTag::String,
        ResponseTag::Formula,
        ResponseTag::Custom,
        ResponseTag::Schematic,
        ResponseTag::Code,
        ResponseTag::Image,
    ];

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.tag() == tag)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            ResponseTag::Choice => "choiceresponse",
            ResponseTag::MultipleChoice => "multiplechoiceresponse",
            ResponseTag::TrueFalse => "truefalseresponse",
            ResponseTag::Option => "optionresponse",
            ResponseTag::Numerical => "numericalresponse",
            ResponseTag::String => "stringresponse",
            ResponseTag::Formula => "formularesponse",
            ResponseTag::Custom => "customresponse",
            ResponseTag::Schematic => "schematicresponse",
            ResponseTag::Code => "coderesponse",
            ResponseTag::Image => "imageresponse",
        }
    }

    /// Returns `true` if `tag` names any supported response.
    pub fn is_response_tag(tag: &str) -> bool {
        Self::from_tag(tag).is_some()
    }

    pub fn allowed_inputs(&self) -> &'static [InputKind] {
        use InputKind::*;
        match self {
            ResponseTag::Choice => &[CheckboxGroup, RadioGroup],
            ResponseTag::MultipleChoice | ResponseTag::TrueFalse => &[ChoiceGroup],
            ResponseTag::Option => &[OptionInput],
            ResponseTag::Numerical | ResponseTag::Formula => &[TextLine, FormulaEquation],
            ResponseTag::String => &[TextLine],
            ResponseTag::Custom => &[TextLine, Textbox, JsInput, FormulaEquation],
            ResponseTag::Schematic => &[Schematic],
            ResponseTag::Code => &[Textbox, FileSubmission, MatlabInput],
            ResponseTag::Image => &[ImageInput],
        }
    }

    /// Upper bound on input fields, for single-answer graders.
    pub fn max_inputs(&self) -> Option<usize> {
        match self {
            ResponseTag::Choice
            | ResponseTag::MultipleChoice
            | ResponseTag::TrueFalse
            | ResponseTag::Numerical
            | ResponseTag::String
            | ResponseTag::Formula
            | ResponseTag::Code => Some(1),
            _ => None,
        }
    }

    pub fn required_attributes(&self) -> &'static [&'static str] {
        match self {
            ResponseTag::Numerical | ResponseTag::String => &["answer"],
            ResponseTag::Formula => &["answer", "samples"],
            _ => &[],
        }
    }

    /// Condition-hint element read from this response's `<hintgroup>`.
    pub fn hint_tag(&self) -> Option<&'static str> {
        match self {
            ResponseTag::Option => Some("optionhint"),
            ResponseTag::Numerical => Some("numericalhint"),
            ResponseTag::String => Some("stringhint"),
            ResponseTag::Formula => Some("formulahint"),
            _ => None,
        }
    }

    /// Validate the response element and its input fields.
    fn check(&self, doc: &Document, node: NodeId, inputs: &[(NodeId, InputKind)]) -> Result<(), CapaError> {
        let name = self.tag();
        for (_, kind) in inputs {
            if !self.allowed_inputs().contains(kind) {
                return Err(CapaError::Parse(format!(
                    "{name}: cannot have input field {}",
                    kind.tag()
                )));
            }
        }
        if let Some(max) = self.max_inputs() {
            if inputs.len() > max {
                return Err(CapaError::Parse(format!(
                    "{name}: cannot have more than {max} input fields"
                )));
            }
            if inputs.is_empty() {
                return Err(CapaError::Parse(format!("{name}: must have an input field")));
            }
        }
        for attr in self.required_attributes() {
            if doc.attr(node, attr).is_none() {
                return Err(CapaError::Parse(format!(
                    "Error in problem specification: {name} missing required attribute {attr}"
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for ResponseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// ---------------------------------------------------------------------------
// Shared response data
// ---------------------------------------------------------------------------

/// What a response reports as the correct answer for one answer id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpectedAnswer {
    Text(String),
    List(Vec<String>),
    Region {
        rectangle: Option<String>,
        regions: Option<String>,
    },
}

impl fmt::Display for ExpectedAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedAnswer::Text(s) => f.write_str(s),
            ExpectedAnswer::List(items) => f.write_str(&items.join(", ")),
            ExpectedAnswer::Region { rectangle, regions } => {
                let parts: Vec<&str> = [rectangle, regions].into_iter().flatten().map(String::as_str).collect();
                f.write_str(&parts.join(" "))
            }
        }
    }
}

/// Identity, inputs and scoring parameters common to every response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseBase {
    pub id: String,
    pub tag: ResponseTag,
    /// Input ids in document order.
    pub answer_ids: Vec<String>,
    /// Maximum points per answer id.
    pub max_points: BTreeMap<String, f64>,
    /// Author-provided `answer` attributes of the inputs.
    pub default_answers: BTreeMap<String, String>,
    /// Lowercased partial-credit types; empty when partial credit is off.
    pub credit_types: Vec<String>,
}

impl ResponseBase {
    fn read(
        doc: &Document,
        node: NodeId,
        tag: ResponseTag,
        inputs: &[(NodeId, InputKind)],
        ctx: &EvalContext,
    ) -> Result<Self, CapaError> {
        let id = doc.attr(node, "id").unwrap_or_default().to_string();
        let points = match doc.attr(node, "points") {
            Some(raw) => raw.trim().parse::<f64>().map_err(|_| {
                CapaError::Parse(format!("{tag}: points attribute should be a number, got {raw:?}"))
            })?,
            None => 1.0,
        };

        let mut answer_ids = Vec::with_capacity(inputs.len());
        let mut max_points = BTreeMap::new();
        let mut default_answers = BTreeMap::new();
        for (input, _) in inputs {
            let aid = doc.attr(*input, "id").unwrap_or_default().to_string();
            if let Some(answer) = doc.attr(*input, "answer") {
                default_answers.insert(aid.clone(), ctx.contextualize_text(answer));
            }
            max_points.insert(aid.clone(), points);
            answer_ids.push(aid);
        }

        let credit_types = match doc.attr(node, "partial_credit") {
            None => Vec::new(),
            Some(raw) if raw.trim().eq_ignore_ascii_case("false") => Vec::new(),
            Some(raw) => raw
                .to_lowercase()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        };

        Ok(Self {
            id,
            tag,
            answer_ids,
            max_points,
            default_answers,
            credit_types,
        })
    }

    /// The first answer id, used by single-input graders.
    pub fn answer_id(&self) -> &str {
        self.answer_ids.first().map(String::as_str).unwrap_or_default()
    }

    pub fn has_partial_credit(&self) -> bool {
        !self.credit_types.is_empty()
    }

    pub fn has_credit_type(&self, credit: &str) -> bool {
        self.credit_types.iter().any(|c| c == credit)
    }

    pub fn max_points_for(&self, answer_id: &str) -> f64 {
        self.max_points.get(answer_id).copied().unwrap_or(1.0)
    }

    pub fn max_score(&self) -> f64 {
        self.max_points.values().sum()
    }

    /// The single partial-credit type, validated against `allowed`.
    fn single_credit_type(&self, allowed: &[&str], problem_kind: &str) -> Result<Option<&str>, CapaError> {
        match self.credit_types.as_slice() {
            [] => Ok(None),
            [credit] if allowed.contains(&credit.as_str()) => Ok(Some(credit.as_str())),
            [_] => Err(CapaError::GraderConfiguration(format!(
                "partial_credit attribute should be one of: {}",
                allowed.join(",")
            ))),
            _ => Err(CapaError::GraderConfiguration(format!(
                "Only one type of partial credit is allowed for {problem_kind} problems."
            ))),
        }
    }
}

/// Collaborators and script context available while grading.
#[derive(Clone, Copy)]
pub struct GradeContext<'a> {
    pub system: &'a CapaSystem,
    pub eval: &'a EvalContext,
}

/// Grading behaviour of the synchronous response kinds.
pub trait Grader: Send + Sync {
    /// Grade the submitted answers for this response.
    fn get_score(
        &self,
        base: &ResponseBase,
        answers: &StudentAnswers,
        gctx: &GradeContext<'_>,
    ) -> Result<CorrectMap, CapaError>;

    /// Correct answers keyed by answer id.
    fn get_answers(&self, base: &ResponseBase) -> BTreeMap<String, ExpectedAnswer>;

    /// Append authored feedback for the submitted answers to `cmap`.
    fn extended_hints(
        &self,
        _base: &ResponseBase,
        _answers: &StudentAnswers,
        _cmap: &mut CorrectMap,
        _gctx: &GradeContext<'_>,
    ) {
    }

    /// Names of the hint-group conditions satisfied by the answers.
    ///
    /// `None` means this kind does not evaluate conditions and extended hints
    /// apply instead.
    fn hint_conditions(
        &self,
        _base: &ResponseBase,
        _group: &HintGroup,
        _answers: &StudentAnswers,
        _gctx: &GradeContext<'_>,
    ) -> Option<Vec<String>> {
        None
    }
}

#[derive(Debug, Clone)]
enum ResponseKind {
    Checkbox(CheckboxResponse),
    MultipleChoice(MultipleChoiceResponse),
    Option(OptionResponse),
    Numerical(NumericalResponse),
    String(StringResponse),
    Formula(FormulaResponse),
    Custom(CustomResponse),
    Schematic(SchematicResponse),
    Code(CodeResponse),
    Image(ImageResponse),
}

impl ResponseKind {
    fn grader(&self) -> Option<&dyn Grader> {
        match self {
            ResponseKind::Checkbox(g) => Some(g),
            ResponseKind::MultipleChoice(g) => Some(g),
            ResponseKind::Option(g) => Some(g),
            ResponseKind::Numerical(g) => Some(g),
            ResponseKind::String(g) => Some(g),
            ResponseKind::Formula(g) => Some(g),
            ResponseKind::Custom(g) => Some(g),
            ResponseKind::Schematic(g) => Some(g),
            ResponseKind::Image(g) => Some(g),
            ResponseKind::Code(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// One gradable response of a problem.
#[derive(Debug, Clone)]
pub struct Response {
    pub base: ResponseBase,
    pub node: NodeId,
    pub inputs: Vec<(NodeId, InputKind)>,
    pub hintgroup: Option<HintGroup>,
    /// Rendered inline instead of in a block wrapper.
    pub inline: bool,
    /// Ids labelling a multi-input group.
    pub group_label_id: Option<String>,
    pub group_description_ids: Vec<String>,
    kind: ResponseKind,
}

impl Response {
    /// Build the response rooted at `node`.
    ///
    /// Expects the problem to have assigned `id` attributes to the response
    /// and its inputs.
    pub fn build(doc: &mut Document, node: NodeId, ctx: &EvalContext) -> Result<Self, CapaError> {
        let tag_name = doc.tag(node).unwrap_or_default().to_string();
        let tag = ResponseTag::from_tag(&tag_name)
            .ok_or_else(|| CapaError::Parse(format!("unsupported response type <{tag_name}>")))?;

        let inputs: Vec<(NodeId, InputKind)> = doc
            .descendants(node)
            .into_iter()
            .filter_map(|d| doc.tag(d).and_then(InputKind::from_tag).map(|k| (d, k)))
            .collect();
        tag.check(doc, node, &inputs)?;
        for (input, kind) in &inputs {
            kind.check_required(doc, *input)?;
        }

        let base = ResponseBase::read(doc, node, tag, &inputs, ctx)?;
        let hintgroup = HintGroup::from_response(doc, node, tag.hint_tag());
        let kind = match tag {
            ResponseTag::Choice => ResponseKind::Checkbox(CheckboxResponse::build(doc, node, ctx)),
            ResponseTag::MultipleChoice => ResponseKind::MultipleChoice(
                MultipleChoiceResponse::build(doc, node, ChoiceKind::MultipleChoice, ctx)?,
            ),
            ResponseTag::TrueFalse => ResponseKind::MultipleChoice(MultipleChoiceResponse::build(
                doc,
                node,
                ChoiceKind::TrueFalse,
                ctx,
            )?),
            ResponseTag::Option => ResponseKind::Option(OptionResponse::build(doc, &inputs, ctx)),
            ResponseTag::Numerical => ResponseKind::Numerical(NumericalResponse::build(doc, node, ctx)?),
            ResponseTag::String => ResponseKind::String(StringResponse::build(doc, node, ctx)),
            ResponseTag::Formula => ResponseKind::Formula(FormulaResponse::build(doc, node, ctx)?),
            ResponseTag::Custom => ResponseKind::Custom(CustomResponse::build(doc, node, &base, ctx)),
            ResponseTag::Schematic => ResponseKind::Schematic(SchematicResponse::build(doc, node)?),
            ResponseTag::Code => ResponseKind::Code(CodeResponse::build(doc, node)?),
            ResponseTag::Image => ResponseKind::Image(ImageResponse::build(doc, &inputs)?),
        };

        debug!(
            response = %base.id,
            tag = tag.tag(),
            inputs = base.answer_ids.len(),
            "built response"
        );

        Ok(Self {
            inline: doc.attr(node, "inline").is_some_and(|v| !v.is_empty()),
            base,
            node,
            inputs,
            hintgroup,
            group_label_id: None,
            group_description_ids: Vec::new(),
            kind,
        })
    }

    pub fn id(&self) -> &str {
        &self.base.id
    }

    pub fn tag(&self) -> ResponseTag {
        self.base.tag
    }

    pub fn answer_ids(&self) -> &[String] {
        &self.base.answer_ids
    }

    pub fn max_score(&self) -> f64 {
        self.base.max_score()
    }

    /// Shuffle and answer-pool transforms, drawing from the problem's generator.
    pub fn late_transforms(&mut self, doc: &mut Document, rng: &mut ProblemRng) -> Result<(), CapaError> {
        if let ResponseKind::MultipleChoice(mc) = &mut self.kind {
            mc.shuffle(doc, self.node, rng)?;
            mc.answer_pool(doc, self.node, rng)?;
            mc.retain_present(doc, self.node);
        }
        Ok(())
    }

    /// Grade `answers` and attach hints.
    pub async fn evaluate_answers(
        &self,
        gctx: &GradeContext<'_>,
        answers: &StudentAnswers,
        old_cmap: &CorrectMap,
    ) -> Result<CorrectMap, CapaError> {
        debug!(response = %self.base.id, tag = self.base.tag.tag(), "grading response");
        let mut new_cmap = if let ResponseKind::Code(code) = &self.kind {
            code.submit(&self.base, answers, gctx).await?
        } else if let Some(grader) = self.kind.grader() {
            grader.get_score(&self.base, answers, gctx)?
        } else {
            CorrectMap::new()
        };
        self.get_hints(gctx, answers, &mut new_cmap, old_cmap)?;
        Ok(new_cmap)
    }

    fn get_hints(
        &self,
        gctx: &GradeContext<'_>,
        answers: &StudentAnswers,
        new_cmap: &mut CorrectMap,
        old_cmap: &CorrectMap,
    ) -> Result<(), CapaError> {
        if let Some(group) = &self.hintgroup {
            if let Some(hintfn) = &group.hintfn {
                return self.call_hint_function(hintfn, gctx, answers, new_cmap, old_cmap);
            }
            if !group.conditions.is_empty() {
                let names = self
                    .kind
                    .grader()
                    .and_then(|g| g.hint_conditions(&self.base, group, answers, gctx));
                if let Some(names) = names {
                    let text = group.parts_for(&names).last().map(str::to_string);
                    if let (Some(aid), Some(text)) = (self.base.answer_ids.last(), text) {
                        new_cmap.set_hint_and_mode(aid, &text, Some(group.mode));
                    }
                    return Ok(());
                }
            }
        }
        if let Some(grader) = self.kind.grader() {
            grader.extended_hints(&self.base, answers, new_cmap, gctx);
        }
        Ok(())
    }

    fn call_hint_function(
        &self,
        hintfn: &str,
        gctx: &GradeContext<'_>,
        answers: &StudentAnswers,
        new_cmap: &mut CorrectMap,
        old_cmap: &CorrectMap,
    ) -> Result<(), CapaError> {
        let hint_error = |e: String| CapaError::Response(format!("Error {e} in evaluating hint function {hintfn}."));
        let to_json = |value: serde_json::Result<Value>| value.map_err(|e| hint_error(e.to_string()));

        let args = [
            json!(self.base.answer_ids),
            to_json(serde_json::to_value(answers))?,
            to_json(serde_json::to_value(&*new_cmap))?,
            to_json(serde_json::to_value(old_cmap))?,
        ];
        let updated = gctx
            .system
            .sandbox
            .call(gctx.eval.script_code(), gctx.eval.seed, &gctx.eval.bindings(), hintfn, &args)
            .map_err(|e| hint_error(e.to_string()))?;
        *new_cmap = serde_json::from_value(updated).map_err(|e| hint_error(e.to_string()))?;
        Ok(())
    }

    /// Correct answers keyed by answer id.
    pub fn get_answers(&self) -> BTreeMap<String, ExpectedAnswer> {
        match &self.kind {
            ResponseKind::Code(code) => code.get_answers(&self.base),
            kind => kind.grader().map(|g| g.get_answers(&self.base)).unwrap_or_default(),
        }
    }

    /// Initial editor contents for externally graded inputs.
    pub fn initial_display(&self) -> BTreeMap<String, String> {
        match &self.kind {
            ResponseKind::Code(code) => code.initial_display(&self.base),
            _ => BTreeMap::new(),
        }
    }

    /// Apply an external grader's result; returns `false` for responses that
    /// are not queue-graded.
    pub fn update_score(&self, score_msg: &str, cmap: &mut CorrectMap, queuekey: &str) -> bool {
        match &self.kind {
            ResponseKind::Code(code) => {
                code.update_score(&self.base, score_msg, cmap, queuekey);
                true
            }
            _ => false,
        }
    }

    /// Wrap the rendered inputs of this response.
    pub fn render_wrapper(&self, inner: &str, response_msg: &str) -> String {
        let index = self.base.id.rsplit('_').next().unwrap_or_default();
        let class = if self.inline { "inline" } else { "wrapper-problem-response" };
        let multi = self.inputs.len() > 1;

        let mut out = String::new();
        let _ = write!(
            out,
            "<div class=\"{class}\" tabindex=\"-1\" aria-label=\"Question {index}\" role=\"group\">"
        );
        if multi {
            out.push_str("<div class=\"multi-inputs-group\" role=\"group\"");
            if let Some(label) = &self.group_label_id {
                let _ = write!(out, " aria-labelledby=\"{}\"", escape_attr(label));
            }
            if !self.group_description_ids.is_empty() {
                let _ = write!(
                    out,
                    " aria-describedby=\"{}\"",
                    escape_attr(&self.group_description_ids.join(" "))
                );
            }
            out.push('>');
        }
        out.push_str(inner);
        if multi {
            out.push_str("</div>");
        }
        if !response_msg.is_empty() {
            let _ = write!(out, "<div class=\"response_message\">{response_msg}</div>");
        }
        out.push_str("</div>");
        out
    }
}

// ---------------------------------------------------------------------------
// Helpers shared by graders
// ---------------------------------------------------------------------------

/// A map with one incorrect entry for `answer_id`.
pub(crate) fn incorrect(answer_id: &str) -> CorrectMap {
    single(answer_id, CorrectMapEntry::graded(Correctness::Incorrect))
}

pub(crate) fn single(answer_id: &str, entry: CorrectMapEntry) -> CorrectMap {
    let mut cmap = CorrectMap::new();
    cmap.set(answer_id, entry);
    cmap
}

pub(crate) fn correctness_of(correct: bool) -> Correctness {
    if correct {
        Correctness::Correct
    } else {
        Correctness::Incorrect
    }
}

/// Round half away from zero to `digits` decimals.
pub(crate) fn round_to(x: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (x * factor).round() / factor
}

/// Default answers as expected-answer text.
pub(crate) fn default_answer_map(base: &ResponseBase) -> BTreeMap<String, ExpectedAnswer> {
    base.default_answers
        .iter()
        .map(|(k, v)| (k.clone(), ExpectedAnswer::Text(v.clone())))
        .collect()
}
