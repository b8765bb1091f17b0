//! Input widgets: tag registry, attribute checks and template contexts.
//!
//! Every input element renders through [`TemplateRenderer::render_template`]
//! with a JSON context built here. The engine never produces widget markup
//! itself.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::context::EvalContext;
use crate::correctmap::{CorrectMapEntry, HintMode};
use crate::error::CapaError;
use crate::model::StudentAnswer;
use crate::traits::TemplateRenderer;
use crate::xml::{Document, NodeId};

/// Extended-hint elements that never reach rendered output.
pub const HINT_TAGS: &[&str] = &[
    "choicehint",
    "compoundhint",
    "optionhint",
    "correcthint",
    "stringequalhint",
    "regexphint",
];

const CODE_SUBMITTED_MSG: &str = "Your answer has been submitted. As soon as your submission is \
graded, this message will be replaced with the grader's feedback.";
const FILE_SUBMITTED_MSG: &str = "Your files have been submitted. As soon as your submission is \
graded, this message will be replaced with the grader's feedback.";

/// Known input element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKind {
    TextLine,
    FormulaEquation,
    ChoiceGroup,
    RadioGroup,
    CheckboxGroup,
    OptionInput,
    Textbox,
    MatlabInput,
    FileSubmission,
    Schematic,
    ImageInput,
    JsInput,
}

/// An attribute read from the input element; `default: None` means required.
struct AttrSpec {
    name: &'static str,
    default: Option<&'static str>,
}

const fn attr(name: &'static str, default: &'static str) -> AttrSpec {
    AttrSpec {
        name,
        default: Some(default),
    }
}

const fn required(name: &'static str) -> AttrSpec {
    AttrSpec {
        name,
        default: None,
    }
}

impl InputKind {
    pub const ALL: &'static [InputKind] = &[
        InputKind::TextLine,
        InputKind::FormulaEquation,
        InputKind::ChoiceGroup,
        InputKind::RadioGroup,
        InputKind::CheckboxGroup,
        InputKind::OptionInput,
        InputKind::Textbox,
        InputKind::MatlabInput,
        InputKind::FileSubmission,
        InputKind::Schematic,
        InputKind::ImageInput,
        InputKind::JsInput,
    ];

    pub fn from_tag(tag: &str) -> Option<Self> {
        if tag == "codeinput" {
            return Some(InputKind::Textbox);
        }
        Self::ALL.iter().copied().find(|k| k.tag() == tag)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            InputKind::TextLine => "textline",
            InputKind::FormulaEquation => "formulaequationinput",
            InputKind::ChoiceGroup => "choicegroup",
            InputKind::RadioGroup => "radiogroup",
            InputKind::CheckboxGroup => "checkboxgroup",
            InputKind::OptionInput => "optioninput",
            InputKind::Textbox => "textbox",
            InputKind::MatlabInput => "matlabinput",
            InputKind::FileSubmission => "filesubmission",
            InputKind::Schematic => "schematic",
            InputKind::ImageInput => "imageinput",
            InputKind::JsInput => "jsinput",
        }
    }

    /// Template rendering this input.
    pub fn template(&self) -> &'static str {
        match self {
            InputKind::TextLine => "textline.html",
            InputKind::FormulaEquation => "formulaequationinput.html",
            InputKind::ChoiceGroup | InputKind::RadioGroup | InputKind::CheckboxGroup => {
                "choicegroup.html"
            }
            InputKind::OptionInput => "optioninput.html",
            InputKind::Textbox => "codeinput.html",
            InputKind::MatlabInput => "matlabinput.html",
            InputKind::FileSubmission => "filesubmission.html",
            InputKind::Schematic => "schematicinput.html",
            InputKind::ImageInput => "imageinput.html",
            InputKind::JsInput => "jsinput.html",
        }
    }

    /// Inputs whose question label is rendered by the input itself, so the
    /// authored label element can be dropped from the page.
    pub fn is_accessible(&self) -> bool {
        matches!(
            self,
            InputKind::CheckboxGroup
                | InputKind::RadioGroup
                | InputKind::ChoiceGroup
                | InputKind::OptionInput
                | InputKind::TextLine
                | InputKind::FormulaEquation
                | InputKind::Textbox
        )
    }

    fn attributes(&self) -> &'static [AttrSpec] {
        const TEXTLINE: &[AttrSpec] = &[
            attr("size", ""),
            attr("hidden", ""),
            attr("inline", ""),
            attr("trailing_text", ""),
        ];
        const FORMULA: &[AttrSpec] = &[
            attr("size", "20"),
            attr("inline", ""),
            attr("trailing_text", ""),
        ];
        const CHOICE: &[AttrSpec] = &[
            attr("show_correctness", "always"),
            attr("submitted_message", "Answer received."),
        ];
        const OPTION: &[AttrSpec] = &[required("options"), attr("inline", "")];
        const CODE: &[AttrSpec] = &[
            attr("rows", "30"),
            attr("cols", "80"),
            attr("hidden", ""),
            attr("mode", "python"),
            attr("linenumbers", "true"),
            attr("tabsize", "4"),
        ];
        const FILES: &[AttrSpec] = &[attr("allowed_files", ""), attr("required_files", "")];
        const SCHEMATIC: &[AttrSpec] = &[
            attr("height", ""),
            attr("width", ""),
            attr("parts", ""),
            attr("analyses", ""),
            attr("initial_value", ""),
            attr("submit_analyses", ""),
        ];
        const IMAGE: &[AttrSpec] = &[required("src"), required("height"), required("width")];
        const JS: &[AttrSpec] = &[
            attr("params", ""),
            attr("html_file", ""),
            attr("gradefn", "gradefn"),
            attr("get_statefn", ""),
            attr("initial_state", ""),
            attr("set_statefn", ""),
            attr("width", "400"),
            attr("height", "300"),
            attr("title", "Problem Remote Content"),
            attr("sop", ""),
        ];
        match self {
            InputKind::TextLine => TEXTLINE,
            InputKind::FormulaEquation => FORMULA,
            InputKind::ChoiceGroup | InputKind::RadioGroup | InputKind::CheckboxGroup => CHOICE,
            InputKind::OptionInput => OPTION,
            InputKind::Textbox | InputKind::MatlabInput => CODE,
            InputKind::FileSubmission => FILES,
            InputKind::Schematic => SCHEMATIC,
            InputKind::ImageInput => IMAGE,
            InputKind::JsInput => JS,
        }
    }

    /// Fail if the element lacks an attribute this input requires.
    pub fn check_required(&self, doc: &Document, node: NodeId) -> Result<(), CapaError> {
        for spec in self.attributes() {
            if spec.default.is_none() && doc.attr(node, spec.name).is_none() {
                return Err(CapaError::Parse(format!(
                    "Missing required attribute {} on <{}>.",
                    spec.name,
                    self.tag()
                )));
            }
        }
        if matches!(
            self,
            InputKind::ChoiceGroup | InputKind::RadioGroup | InputKind::CheckboxGroup
        ) {
            for child in doc.element_children(node) {
                let tag = doc.tag(child).unwrap_or_default();
                if tag != "choice" && tag != "compoundhint" {
                    return Err(CapaError::Parse(format!(
                        "Expected a <choice> or <compoundhint> tag; got {tag} instead"
                    )));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Render context
// ---------------------------------------------------------------------------

/// Display status of an input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    /// Raw status name (`unsubmitted`, `correct`, `queued`, ...).
    pub value: String,
    pub classname: String,
    pub display_name: String,
    pub display_tooltip: String,
}

impl Status {
    pub fn new(status: &str) -> Self {
        let classname = match status {
            "unsubmitted" => "unanswered",
            "incomplete" => "incorrect",
            "queued" => "processing",
            other => other,
        };
        let display_name = match status {
            "partially-correct" => "partially correct",
            "unsubmitted" => "unanswered",
            "queued" => "processing",
            other => other,
        };
        let display_tooltip = match status {
            "correct" => "This answer is correct.",
            "incorrect" => "This answer is incorrect.",
            "partially-correct" => "This answer is partially correct.",
            "queued" => "This answer is being processed.",
            "incomplete" | "unanswered" | "unsubmitted" => "Not yet answered.",
            _ => "",
        };
        Self {
            value: status.to_string(),
            classname: classname.to_string(),
            display_name: display_name.to_string(),
            display_tooltip: display_tooltip.to_string(),
        }
    }

    /// Status for an answer given its grading record.
    pub fn for_entry(entry: Option<&CorrectMapEntry>) -> Self {
        match entry {
            None => Status::new("unsubmitted"),
            Some(e) if e.queuestate.is_some() => Status::new("queued"),
            Some(e) => match e.correctness {
                Some(c) => Status::new(&c.to_string()),
                None => Status::new("unsubmitted"),
            },
        }
    }
}

/// Accessibility metadata for one input.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResponseData {
    pub label: String,
    /// `(id, html)` pairs in authored order.
    pub descriptions: Vec<(String, String)>,
    /// Shared label when the response has several inputs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_label: Option<String>,
}

/// Per-render state of one input.
#[derive(Debug, Clone, Copy)]
pub struct InputState<'a> {
    pub id: &'a str,
    pub value: Option<&'a StudentAnswer>,
    pub entry: Option<&'a CorrectMapEntry>,
    pub response_data: &'a ResponseData,
}

/// Build the template context for `node`.
pub fn render_context(
    doc: &Document,
    node: NodeId,
    kind: InputKind,
    state: &InputState<'_>,
    ctx: &EvalContext,
) -> Result<Value, CapaError> {
    let status = Status::for_entry(state.entry);
    let mut msg = state.entry.map(|e| e.msg.clone()).unwrap_or_default();
    if let Some(entry) = state.entry {
        if entry.hintmode == Some(HintMode::Always) && !entry.hint.is_empty() {
            msg = if msg.is_empty() {
                entry.hint.clone()
            } else {
                format!("{}<br/>{msg}", entry.hint)
            };
        }
    }

    let mut value = state.value.map(StudentAnswer::to_json).unwrap_or_else(|| json!(""));

    let mut context = Map::new();
    for spec in kind.attributes() {
        let raw = doc.attr(node, spec.name).or(spec.default).unwrap_or_default();
        context.insert(spec.name.to_string(), json!(ctx.contextualize_text(raw)));
    }

    let mut describedby = Vec::new();
    if context
        .get("trailing_text")
        .and_then(Value::as_str)
        .map(|t| !t.is_empty())
        .unwrap_or(false)
    {
        describedby.push(format!("trailing_text_{}", state.id));
    }
    describedby.push(format!("status_{}", state.id));
    describedby.extend(state.response_data.descriptions.iter().map(|(id, _)| id.clone()));

    match kind {
        InputKind::TextLine => {
            let do_math = doc.attr(node, "math").is_some() || doc.attr(node, "dojs").is_some();
            context.insert("do_math".into(), json!(do_math));
        }
        InputKind::ChoiceGroup | InputKind::RadioGroup | InputKind::CheckboxGroup => {
            let (input_type, suffix) = match kind {
                InputKind::ChoiceGroup => ("radio", ""),
                InputKind::RadioGroup => ("radio", "[]"),
                _ => ("checkbox", "[]"),
            };
            context.insert("input_type".into(), json!(input_type));
            context.insert("name_array_suffix".into(), json!(suffix));
            context.insert("choices".into(), json!(extract_choices(doc, node, ctx)));
        }
        InputKind::OptionInput => {
            let options: Vec<(String, String)> = parse_options(
                context.get("options").and_then(Value::as_str).unwrap_or_default(),
            )
            .into_iter()
            .map(|o| (o.clone(), o))
            .collect();
            context.insert("options".into(), json!(options));
            context.insert("default_option_text".into(), json!("Select an option"));
        }
        InputKind::Textbox | InputKind::MatlabInput => {
            if value.as_str().map(str::is_empty).unwrap_or(false) {
                let initial = doc.text_content(node);
                if !initial.trim().is_empty() {
                    value = json!(initial.trim());
                }
            }
            let mut queue_len = String::new();
            if status.value == "queued" {
                queue_len = std::mem::replace(&mut msg, CODE_SUBMITTED_MSG.to_string());
            }
            let mode = context.get("mode").and_then(Value::as_str).unwrap_or("python").to_string();
            let tabsize = context
                .get("tabsize")
                .and_then(Value::as_str)
                .and_then(|t| t.parse::<u32>().ok())
                .unwrap_or(4);
            context.insert("tabsize".into(), json!(tabsize));
            context.insert("queue_len".into(), json!(queue_len));
            context.insert("aria_label".into(), json!(format!("{mode} editor")));
        }
        InputKind::FileSubmission => {
            for key in ["allowed_files", "required_files"] {
                let files: Vec<String> = context
                    .get(key)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .split_whitespace()
                    .map(str::to_string)
                    .collect();
                context.insert(key.into(), json!(files));
            }
            let mut queue_len = String::new();
            if status.value == "queued" {
                queue_len = std::mem::replace(&mut msg, FILE_SUBMITTED_MSG.to_string());
            }
            context.insert("queue_len".into(), json!(queue_len));
        }
        InputKind::ImageInput => {
            let (gx, gy) = image_marker(value.as_str().unwrap_or_default());
            context.insert("gx".into(), json!(gx));
            context.insert("gy".into(), json!(gy));
        }
        InputKind::JsInput => {
            context.insert("saved_state".into(), value.clone());
        }
        InputKind::FormulaEquation | InputKind::Schematic => {}
    }

    context.insert("id".into(), json!(state.id));
    context.insert("value".into(), value);
    context.insert("status".into(), json!(status));
    context.insert("msg".into(), json!(msg));
    context.insert("response_data".into(), json!(state.response_data));
    context.insert("describedby".into(), json!(describedby.join(" ")));
    if let Some(var) = state.entry.and_then(|e| e.answervariable.as_ref()) {
        context.insert("answervariable".into(), json!(var));
    }
    Ok(Value::Object(context))
}

/// Render `node` through its template.
pub fn render_input(
    doc: &Document,
    node: NodeId,
    kind: InputKind,
    state: &InputState<'_>,
    ctx: &EvalContext,
    renderer: &dyn TemplateRenderer,
) -> Result<String, CapaError> {
    let context = render_context(doc, node, kind, state, ctx)?;
    let html = renderer
        .render_template(kind.template(), &context)
        .map_err(|e| CapaError::Template(format!("{}: {e:#}", kind.template())))?;
    Ok(html.trim().to_string())
}

/// `(name, html)` for each `<choice>` of a choice group.
pub fn extract_choices(doc: &Document, group: NodeId, ctx: &EvalContext) -> Vec<(String, String)> {
    doc.find_children(group, "choice")
        .into_iter()
        .map(|choice| {
            let name = doc.attr(choice, "name").unwrap_or_default().to_string();
            let html = ctx.contextualize_text(doc.inner_xml_without(choice, HINT_TAGS).trim());
            (name, html)
        })
        .collect()
}

/// Parse an option list such as `('Up','Down')`.
///
/// Options are single-quoted and separated by commas or spaces. An apostrophe
/// between two letters, or an escaped `\'`, is part of the option text.
pub fn parse_options(options: &str) -> Vec<String> {
    let trimmed = options.trim();
    let body = trimmed
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .or_else(|| trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')))
        .unwrap_or(trimmed);
    let chars: Vec<char> = body.chars().collect();

    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == ',' || c.is_whitespace() {
            i += 1;
            continue;
        }
        let mut token = String::new();
        if c == '\'' {
            i += 1;
            while i < chars.len() {
                let ch = chars[i];
                if ch == '\\' && chars.get(i + 1) == Some(&'\'') {
                    token.push('\'');
                    i += 2;
                    continue;
                }
                if ch == '\'' {
                    let prev_letter = i > 0 && chars[i - 1].is_ascii_alphabetic();
                    let next_letter = chars.get(i + 1).map(|n| n.is_ascii_alphabetic()).unwrap_or(false);
                    if !(prev_letter && next_letter) {
                        i += 1;
                        break;
                    }
                }
                token.push(ch);
                i += 1;
            }
        } else {
            while i < chars.len() && chars[i] != ',' && !chars[i].is_whitespace() {
                token.push(chars[i]);
                i += 1;
            }
        }
        out.push(token);
    }
    out
}

/// Marker position for a previous `[x,y]` click, offset by half the marker size.
fn image_marker(value: &str) -> (i64, i64) {
    let compact: String = value.trim().chars().filter(|c| *c != ' ').collect();
    let parsed = compact
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .and_then(|s| s.split_once(','))
        .and_then(|(x, y)| Some((x.parse::<i64>().ok()?, y.parse::<i64>().ok()?)));
    match parsed {
        Some((x, y)) => (x - 15, y - 15),
        None => (0, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correctmap::Correctness;

    fn data() -> ResponseData {
        ResponseData {
            label: "What is 2+2?".into(),
            descriptions: vec![("description_p_1_1".into(), "Think.".into())],
            group_label: None,
        }
    }

    #[test]
    fn options_parse_quotes_and_apostrophes() {
        assert_eq!(parse_options("('Up','Down')"), vec!["Up", "Down"]);
        assert_eq!(parse_options("('it's', 'no')"), vec!["it's", "no"]);
        assert_eq!(parse_options("('a b' 'c')"), vec!["a b", "c"]);
    }

    #[test]
    fn status_classes() {
        assert_eq!(Status::new("unsubmitted").classname, "unanswered");
        assert_eq!(Status::new("queued").classname, "processing");
        assert_eq!(Status::new("partially-correct").display_name, "partially correct");
        assert_eq!(Status::new("correct").display_tooltip, "This answer is correct.");
    }

    #[test]
    fn textline_context_has_describedby_and_hint() {
        let doc = Document::parse(r#"<textline size="10" trailing_text="m/s"/>"#).unwrap();
        let mut entry = CorrectMapEntry::graded(Correctness::Incorrect).with_msg("No.");
        entry.hint = "Units!".into();
        entry.hintmode = Some(HintMode::Always);
        let value = StudentAnswer::from("3");
        let rd = data();
        let state = InputState {
            id: "p_2_1",
            value: Some(&value),
            entry: Some(&entry),
            response_data: &rd,
        };
        let ctx = render_context(&doc, doc.root(), InputKind::TextLine, &state, &EvalContext::default())
            .unwrap();
        assert_eq!(ctx["msg"], "Units!<br/>No.");
        assert_eq!(ctx["status"]["classname"], "incorrect");
        assert_eq!(ctx["size"], "10");
        assert_eq!(
            ctx["describedby"],
            "trailing_text_p_2_1 status_p_2_1 description_p_1_1"
        );
    }

    #[test]
    fn choice_context_strips_hints() {
        let doc = Document::parse(
            r#"<checkboxgroup><choice name="choice_0">Red<choicehint>no</choicehint></choice><choice name="choice_1">Blue</choice></checkboxgroup>"#,
        )
        .unwrap();
        let rd = data();
        let state = InputState {
            id: "p_2_1",
            value: None,
            entry: None,
            response_data: &rd,
        };
        let ctx = render_context(&doc, doc.root(), InputKind::CheckboxGroup, &state, &EvalContext::default())
            .unwrap();
        assert_eq!(ctx["input_type"], "checkbox");
        assert_eq!(ctx["choices"][0], json!(["choice_0", "Red"]));
        assert_eq!(ctx["status"]["value"], "unsubmitted");
    }

    #[test]
    fn required_attributes_are_checked() {
        let doc = Document::parse(r#"<imageinput src="a.png" width="10"/>"#).unwrap();
        let err = InputKind::ImageInput.check_required(&doc, doc.root()).unwrap_err();
        assert!(err.to_string().contains("height"));
    }

    #[test]
    fn image_marker_offsets_previous_click() {
        assert_eq!(image_marker("[ 40, 50 ]"), (25, 35));
        assert_eq!(image_marker("garbage"), (0, 0));
    }

    #[test]
    fn queued_code_input_shows_submission_notice() {
        let doc = Document::parse("<textbox mode=\"python\">print(1)</textbox>").unwrap();
        let entry = CorrectMapEntry::queued("k".into(), chrono::Utc::now(), "3");
        let rd = data();
        let state = InputState {
            id: "p_2_1",
            value: None,
            entry: Some(&entry),
            response_data: &rd,
        };
        let ctx = render_context(&doc, doc.root(), InputKind::Textbox, &state, &EvalContext::default())
            .unwrap();
        assert_eq!(ctx["queue_len"], "3");
        assert_eq!(ctx["msg"], CODE_SUBMITTED_MSG);
        assert_eq!(ctx["value"], "print(1)");
        assert_eq!(ctx["aria_label"], "python editor");
    }
}
