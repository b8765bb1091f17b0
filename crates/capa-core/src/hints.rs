//! Feedback hint markup and hint-group configuration.
//!
//! Extended hints (`choicehint`, `correcthint`, ...) are rendered into the
//! answer's message as a `feedback-hint-*` block. Condition hints declared in
//! a `<hintgroup>` are collected here and evaluated by the owning response.

use std::fmt::Write as _;

use crate::context::EvalContext;
use crate::correctmap::HintMode;
use crate::xml::{Document, NodeId};

const DEFAULT_CORRECT_LABEL: &str = "Correct:";
const DEFAULT_INCORRECT_LABEL: &str = "Incorrect:";

/// One authored hint: optional label plus markup.
#[derive(Debug, Clone, PartialEq)]
pub struct HintText {
    /// `None` uses the default "Correct:"/"Incorrect:" label; `Some("")` hides it.
    pub label: Option<String>,
    pub text: String,
}

impl HintText {
    /// Read an extended-hint element such as `<choicehint label="..">text</choicehint>`.
    pub fn from_node(doc: &Document, node: NodeId) -> Self {
        Self {
            label: doc.attr(node, "label").map(str::to_string),
            text: doc.inner_xml(node).trim().to_string(),
        }
    }

    /// Read a hint element and substitute context variables into its text.
    pub fn read(doc: &Document, node: NodeId, ctx: &EvalContext) -> Self {
        let mut hint = Self::from_node(doc, node);
        hint.text = ctx.contextualize_text(&hint.text);
        hint
    }

    /// Feedback block for this hint alone.
    pub fn to_div(&self, correct: bool) -> String {
        make_hint_div(correct, self.label.as_deref(), std::slice::from_ref(&self.text), false)
    }
}

/// Build the feedback block appended to an answer's message.
///
/// With several hints and `multiline` set, each hint gets its own line inside
/// a `feedback-hint-multi` wrapper.
pub fn make_hint_div(correct: bool, label: Option<&str>, hints: &[String], multiline: bool) -> String {
    let (class, default_label) = if correct {
        ("feedback-hint-correct", DEFAULT_CORRECT_LABEL)
    } else {
        ("feedback-hint-incorrect", DEFAULT_INCORRECT_LABEL)
    };
    let label = label.unwrap_or(default_label);

    let mut out = String::new();
    let _ = write!(out, "<div class=\"{class}\"><div class=\"explanation-title\">Answer</div>");
    if !label.is_empty() {
        let _ = write!(out, "<span class=\"hint-label\">{label} </span>");
    }
    if multiline {
        out.push_str("<div class=\"feedback-hint-multi\">");
    }
    for hint in hints {
        let _ = write!(out, "<div class=\"hint-text\">{hint}</div>");
    }
    if multiline {
        out.push_str("</div>");
    }
    out.push_str("</div>");
    out
}

/// A named condition inside a `<hintgroup>` (`<stringhint>`, `<formulahint>`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct HintCondition {
    pub name: String,
    /// The hinted answer, as authored (contextualized at evaluation time).
    pub answer: String,
    /// Sample specification for formula conditions.
    pub samples: Option<String>,
}

/// Parsed `<hintgroup>` of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct HintGroup {
    /// Sandbox function computing hints, overriding everything else.
    pub hintfn: Option<String>,
    pub mode: HintMode,
    /// Conditions matching the response's hint tag, in authored order.
    pub conditions: Vec<HintCondition>,
    /// `(on, text)` pairs from `<hintpart on="..."><text>..</text></hintpart>`.
    pub parts: Vec<(String, String)>,
}

impl HintGroup {
    /// Read the hint group under `response`, keeping conditions tagged `hint_tag`.
    pub fn from_response(doc: &Document, response: NodeId, hint_tag: Option<&str>) -> Option<Self> {
        let group = doc.find_child(response, "hintgroup")?;
        let mode = doc
            .attr(group, "mode")
            .and_then(|m| m.parse().ok())
            .unwrap_or(HintMode::Always);

        let conditions = match hint_tag {
            Some(tag) => doc
                .find_children(group, tag)
                .into_iter()
                .map(|h| HintCondition {
                    name: doc.attr(h, "name").unwrap_or_default().to_string(),
                    answer: doc.attr(h, "answer").unwrap_or_default().to_string(),
                    samples: doc.attr(h, "samples").map(str::to_string),
                })
                .collect(),
            None => Vec::new(),
        };

        let parts = doc
            .find_children(group, "hintpart")
            .into_iter()
            .filter_map(|part| {
                let on = doc.attr(part, "on")?.to_string();
                let text = doc
                    .find_child(part, "text")
                    .map(|t| doc.inner_xml(t))
                    .unwrap_or_default();
                Some((on, text))
            })
            .collect();

        Some(Self {
            hintfn: doc.attr(group, "hintfn").map(str::to_string),
            mode,
            conditions,
            parts,
        })
    }

    /// Text of the hint parts whose `on` name is in `names`.
    pub fn parts_for<'a>(&'a self, names: &'a [String]) -> impl Iterator<Item = &'a str> + 'a {
        self.parts
            .iter()
            .filter(move |(on, _)| names.contains(on))
            .map(|(_, text)| text.as_str())
    }
}
