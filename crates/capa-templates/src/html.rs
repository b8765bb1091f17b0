//! Built-in input widget templates.
//!
//! Produces the markup for every input type from the JSON context the engine
//! builds. Student-supplied values are always escaped; labels, descriptions,
//! choice text and grader messages come from the problem author or the grader
//! and are inserted as HTML.

use anyhow::{bail, Result};
use serde_json::Value;

use capa_core::TemplateRenderer;

/// Escape a string for safe HTML insertion.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Renderer for the template names the engine requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinRenderer;

impl BuiltinRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Template names this renderer understands.
    pub fn templates() -> &'static [&'static str] {
        &[
            "textline.html",
            "formulaequationinput.html",
            "choicegroup.html",
            "optioninput.html",
            "codeinput.html",
            "matlabinput.html",
            "filesubmission.html",
            "schematicinput.html",
            "imageinput.html",
            "jsinput.html",
        ]
    }
}

impl TemplateRenderer for BuiltinRenderer {
    fn render_template(&self, name: &str, context: &Value) -> Result<String> {
        let ctx = Ctx(context);
        if ctx.str("id").is_empty() {
            bail!("template context for {name} has no id");
        }
        let html = match name {
            "textline.html" => textline(&ctx),
            "formulaequationinput.html" => formula_equation(&ctx),
            "choicegroup.html" => choice_group(&ctx),
            "optioninput.html" => option_input(&ctx),
            "codeinput.html" => code_input(&ctx, "codeinput"),
            "matlabinput.html" => code_input(&ctx, "matlabinput"),
            "filesubmission.html" => file_submission(&ctx),
            "schematicinput.html" => schematic(&ctx),
            "imageinput.html" => image_input(&ctx),
            "jsinput.html" => js_input(&ctx),
            other => bail!("unknown template: {other}"),
        };
        Ok(html)
    }
}

// ---------------------------------------------------------------------------
// Context access
// ---------------------------------------------------------------------------

struct Ctx<'a>(&'a Value);

impl<'a> Ctx<'a> {
    fn str(&self, key: &str) -> &'a str {
        self.0.get(key).and_then(Value::as_str).unwrap_or_default()
    }

    fn attr(&self, key: &str) -> String {
        html_escape(self.str(key))
    }

    fn id(&self) -> &'a str {
        self.str("id")
    }

    fn status(&self, key: &str) -> &'a str {
        self.0
            .pointer(&format!("/status/{key}"))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Student value as text; lists and objects are shown as JSON.
    fn value_text(&self) -> String {
        match self.0.get("value") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    fn is_selected(&self, name: &str) -> bool {
        match self.0.get("value") {
            Some(Value::String(s)) => s == name,
            Some(Value::Array(items)) => items.iter().any(|v| v.as_str() == Some(name)),
            _ => false,
        }
    }

    fn flag(&self, key: &str) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => !s.is_empty() && s != "false",
            _ => false,
        }
    }

    fn label(&self) -> &'a str {
        self.0
            .pointer("/response_data/label")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    fn descriptions(&self) -> Vec<(&'a str, &'a str)> {
        self.0
            .pointer("/response_data/descriptions")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|pair| Some((pair.get(0)?.as_str()?, pair.get(1)?.as_str()?)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Shared fragments
// ---------------------------------------------------------------------------

fn label_and_descriptions(ctx: &Ctx<'_>, html: &mut String) {
    let label = ctx.label();
    if !label.is_empty() {
        html.push_str(&format!(
            "<label class=\"problem-group-label\" for=\"input_{}\">{label}</label>\n",
            ctx.id()
        ));
    }
    for (id, text) in ctx.descriptions() {
        html.push_str(&format!(
            "<p class=\"question-description\" id=\"{}\">{text}</p>\n",
            html_escape(id)
        ));
    }
}

fn status_span(ctx: &Ctx<'_>) -> String {
    format!(
        "<span class=\"status {}\" id=\"status_{}\" data-tooltip=\"{}\"><span class=\"sr\">{}</span></span>\n",
        html_escape(ctx.status("classname")),
        ctx.id(),
        html_escape(ctx.status("display_tooltip")),
        html_escape(ctx.status("display_name")),
    )
}

fn message(ctx: &Ctx<'_>) -> String {
    let msg = ctx.str("msg");
    if msg.is_empty() {
        String::new()
    } else {
        format!("<div class=\"message\" id=\"msg_{}\">{msg}</div>\n", ctx.id())
    }
}

fn hidden_style(ctx: &Ctx<'_>) -> &'static str {
    if ctx.flag("hidden") {
        " style=\"display:none;\""
    } else {
        ""
    }
}

fn wrapper_open(ctx: &Ctx<'_>, class: &str) -> String {
    let inline = if ctx.flag("inline") { " inline" } else { "" };
    format!(
        "<div class=\"inputtype {class}{inline}\" id=\"inputtype_{}\"{}>\n",
        ctx.id(),
        hidden_style(ctx)
    )
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

fn textline(ctx: &Ctx<'_>) -> String {
    let id = ctx.id();
    let mut html = wrapper_open(ctx, "textline");
    label_and_descriptions(ctx, &mut html);
    html.push_str(&format!("<div class=\"{}\">\n", html_escape(ctx.status("classname"))));
    let size = match ctx.str("size") {
        "" => String::new(),
        size => format!(" size=\"{}\"", html_escape(size)),
    };
    let math = if ctx.flag("do_math") { " data-math=\"true\"" } else { "" };
    html.push_str(&format!(
        "<input type=\"text\" name=\"input_{id}\" id=\"input_{id}\" aria-describedby=\"{}\" value=\"{}\"{size}{math}/>\n",
        ctx.attr("describedby"),
        html_escape(&ctx.value_text()),
    ));
    let trailing = ctx.str("trailing_text");
    if !trailing.is_empty() {
        html.push_str(&format!(
            "<span class=\"trailing_text\" id=\"trailing_text_{id}\">{}</span>\n",
            html_escape(trailing)
        ));
    }
    html.push_str(&status_span(ctx));
    html.push_str("</div>\n");
    html.push_str(&message(ctx));
    html.push_str("</div>");
    html
}

fn formula_equation(ctx: &Ctx<'_>) -> String {
    let id = ctx.id();
    let mut html = wrapper_open(ctx, "formulaequationinput");
    label_and_descriptions(ctx, &mut html);
    html.push_str(&format!("<div class=\"{}\">\n", html_escape(ctx.status("classname"))));
    html.push_str(&format!(
        "<input type=\"text\" name=\"input_{id}\" id=\"input_{id}\" aria-describedby=\"{}\" data-input-id=\"{id}\" value=\"{}\" size=\"{}\"/>\n",
        ctx.attr("describedby"),
        html_escape(&ctx.value_text()),
        ctx.attr("size"),
    ));
    let trailing = ctx.str("trailing_text");
    if !trailing.is_empty() {
        html.push_str(&format!(
            "<span class=\"trailing_text\" id=\"trailing_text_{id}\">{}</span>\n",
            html_escape(trailing)
        ));
    }
    html.push_str(&status_span(ctx));
    html.push_str(&format!(
        "<div class=\"equation\"><p id=\"input_{id}_preview\" class=\"preview\"></p></div>\n"
    ));
    html.push_str("</div>\n");
    html.push_str(&message(ctx));
    html.push_str("</div>");
    html
}

fn choice_group(ctx: &Ctx<'_>) -> String {
    let id = ctx.id();
    let input_type = match ctx.str("input_type") {
        "checkbox" => "checkbox",
        _ => "radio",
    };
    let suffix = ctx.str("name_array_suffix");
    let status = ctx.status("value");
    let show_correctness = ctx.str("show_correctness");
    let graded = matches!(status, "correct" | "incorrect" | "partially-correct");

    let mut html = format!("<div class=\"choicegroup capa_inputtype\" id=\"inputtype_{id}\">\n");
    html.push_str(&format!("<fieldset aria-describedby=\"{}\">\n", ctx.attr("describedby")));
    let label = ctx.label();
    if !label.is_empty() {
        html.push_str(&format!("<legend id=\"{id}-legend\" class=\"response-fieldset-legend field-group-hd\">{label}</legend>\n"));
    }
    for (desc_id, text) in ctx.descriptions() {
        html.push_str(&format!(
            "<p class=\"question-description\" id=\"{}\">{text}</p>\n",
            html_escape(desc_id)
        ));
    }

    let choices = ctx.0.get("choices").and_then(Value::as_array).cloned().unwrap_or_default();
    for choice in &choices {
        let name = choice.get(0).and_then(Value::as_str).unwrap_or_default();
        let text = choice.get(1).and_then(Value::as_str).unwrap_or_default();
        let selected = ctx.is_selected(name);
        let mut class = String::from("field");
        if selected && graded && show_correctness != "never" && input_type == "radio" {
            class.push_str(&format!(" choicegroup_{status}"));
        }
        let checked = if selected { " checked=\"true\"" } else { "" };
        html.push_str(&format!(
            "<div class=\"{class}\"><input type=\"{input_type}\" name=\"input_{id}{suffix}\" id=\"input_{id}_{name}\" class=\"field-input input-{input_type}\" value=\"{name}\"{checked}/><label id=\"{id}-{name}-label\" for=\"input_{id}_{name}\" class=\"response-label field-label label-inline\">{text}</label></div>\n",
            name = html_escape(name),
        ));
    }
    html.push_str("</fieldset>\n");

    if show_correctness == "never" && graded {
        html.push_str(&format!(
            "<div class=\"capa_alert\">{}</div>\n",
            html_escape(ctx.str("submitted_message"))
        ));
    } else {
        html.push_str(&status_span(ctx));
    }
    html.push_str(&message(ctx));
    html.push_str("</div>");
    html
}

fn option_input(ctx: &Ctx<'_>) -> String {
    let id = ctx.id();
    let value = ctx.value_text();
    let mut html = wrapper_open(ctx, "optioninput");
    label_and_descriptions(ctx, &mut html);
    html.push_str(&format!(
        "<select name=\"input_{id}\" id=\"input_{id}\" aria-describedby=\"{}\">\n",
        ctx.attr("describedby")
    ));
    html.push_str(&format!(
        "<option value=\"option_{id}_dummy_default\">{}</option>\n",
        html_escape(ctx.str("default_option_text"))
    ));
    let options = ctx.0.get("options").and_then(Value::as_array).cloned().unwrap_or_default();
    for option in &options {
        let option_value = option.get(0).and_then(Value::as_str).unwrap_or_default();
        let text = option.get(1).and_then(Value::as_str).unwrap_or(option_value);
        let selected = if option_value == value { " selected=\"true\"" } else { "" };
        html.push_str(&format!(
            "<option value=\"{}\"{selected}>{}</option>\n",
            html_escape(option_value),
            html_escape(text)
        ));
    }
    html.push_str("</select>\n");
    html.push_str(&status_span(ctx));
    html.push_str(&message(ctx));
    html.push_str("</div>");
    html
}

fn code_input(ctx: &Ctx<'_>, class: &str) -> String {
    let id = ctx.id();
    let mut html = wrapper_open(ctx, class);
    label_and_descriptions(ctx, &mut html);
    let linenumbers = if ctx.str("linenumbers") == "false" { "false" } else { "true" };
    let tabsize = ctx.0.get("tabsize").and_then(Value::as_u64).unwrap_or(4);
    html.push_str(&format!(
        "<textarea rows=\"{}\" cols=\"{}\" name=\"input_{id}\" id=\"input_{id}\" aria-describedby=\"{}\" aria-label=\"{}\" data-mode=\"{}\" data-tabsize=\"{tabsize}\" data-linenums=\"{linenumbers}\">{}</textarea>\n",
        ctx.attr("rows"),
        ctx.attr("cols"),
        ctx.attr("describedby"),
        ctx.attr("aria_label"),
        ctx.attr("mode"),
        html_escape(&ctx.value_text()),
    ));
    html.push_str(&status_span(ctx));
    let queue_len = ctx.str("queue_len");
    if !queue_len.is_empty() {
        html.push_str(&format!(
            "<span class=\"queue-status\" id=\"queue_{id}\">{}</span>\n",
            html_escape(queue_len)
        ));
    }
    html.push_str(&message(ctx));
    html.push_str("</div>");
    html
}

fn file_list(ctx: &Ctx<'_>, key: &str) -> String {
    let files = ctx.0.get(key).cloned().unwrap_or(Value::Array(Vec::new()));
    html_escape(&files.to_string())
}

fn file_submission(ctx: &Ctx<'_>) -> String {
    let id = ctx.id();
    let mut html = wrapper_open(ctx, "filesubmission");
    label_and_descriptions(ctx, &mut html);
    html.push_str(&format!(
        "<input type=\"file\" name=\"input_{id}\" id=\"input_{id}\" class=\"input-file\" data-required_files=\"{}\" data-allowed_files=\"{}\" multiple=\"multiple\"/>\n",
        file_list(ctx, "required_files"),
        file_list(ctx, "allowed_files"),
    ));
    html.push_str(&status_span(ctx));
    let queue_len = ctx.str("queue_len");
    if !queue_len.is_empty() {
        html.push_str(&format!(
            "<span class=\"queue-status\" id=\"queue_{id}\">{}</span>\n",
            html_escape(queue_len)
        ));
    }
    html.push_str(&message(ctx));
    html.push_str("</div>");
    html
}

fn schematic(ctx: &Ctx<'_>) -> String {
    let id = ctx.id();
    let mut html = wrapper_open(ctx, "schematicinput");
    html.push_str(&format!(
        "<input type=\"hidden\" class=\"schematic\" height=\"{}\" width=\"{}\" parts=\"{}\" analyses=\"{}\" submit_analyses=\"{}\" initial_value=\"{}\" name=\"input_{id}\" id=\"input_{id}\" value=\"{}\"/>\n",
        ctx.attr("height"),
        ctx.attr("width"),
        ctx.attr("parts"),
        ctx.attr("analyses"),
        ctx.attr("submit_analyses"),
        ctx.attr("initial_value"),
        html_escape(&ctx.value_text()),
    ));
    html.push_str(&status_span(ctx));
    html.push_str(&message(ctx));
    html.push_str("</div>");
    html
}

fn image_input(ctx: &Ctx<'_>) -> String {
    let id = ctx.id();
    let gx = ctx.0.get("gx").and_then(Value::as_i64).unwrap_or(-100);
    let gy = ctx.0.get("gy").and_then(Value::as_i64).unwrap_or(-100);
    let mut html = wrapper_open(ctx, "imageinput");
    label_and_descriptions(ctx, &mut html);
    html.push_str(&format!(
        "<input type=\"hidden\" name=\"input_{id}\" id=\"input_{id}\" value=\"{}\"/>\n",
        html_escape(&ctx.value_text())
    ));
    html.push_str(&format!(
        "<div id=\"imageinput_{id}\" style=\"background-image: url('{}'); width: {}px; height: {}px; position: relative; left: 0; cursor: crosshair;\">\n",
        ctx.attr("src"),
        ctx.attr("width"),
        ctx.attr("height"),
    ));
    html.push_str(&format!(
        "<img src=\"/static/images/green-pointer.png\" id=\"cross_{id}\" style=\"position: absolute; top: {gy}px; left: {gx}px;\" alt=\"\"/>\n"
    ));
    html.push_str("</div>\n");
    html.push_str(&status_span(ctx));
    html.push_str(&message(ctx));
    html.push_str("</div>");
    html
}

fn js_input(ctx: &Ctx<'_>) -> String {
    let id = ctx.id();
    let mut html = format!(
        "<section id=\"inputtype_{id}\" data-width=\"{}\" data-height=\"{}\" data-html_file=\"{}\" data-gradefn=\"{}\" data-get_statefn=\"{}\" data-set_statefn=\"{}\" data-initial-state=\"{}\" data-sop=\"{}\" data-stored=\"{}\" data-params=\"{}\" class=\"jsinput\">\n",
        ctx.attr("width"),
        ctx.attr("height"),
        ctx.attr("html_file"),
        ctx.attr("gradefn"),
        ctx.attr("get_statefn"),
        ctx.attr("set_statefn"),
        ctx.attr("initial_state"),
        ctx.attr("sop"),
        html_escape(&ctx.0.get("saved_state").map(Value::to_string).unwrap_or_default()),
        ctx.attr("params"),
    );
    html.push_str(&format!(
        "<iframe name=\"iframe_{id}\" id=\"iframe_{id}\" sandbox=\"allow-scripts allow-popups allow-same-origin allow-forms allow-pointer-lock\" seamless=\"seamless\" frameborder=\"0\" src=\"{}\" height=\"{}\" width=\"{}\" title=\"{}\"></iframe>\n",
        ctx.attr("html_file"),
        ctx.attr("height"),
        ctx.attr("width"),
        ctx.attr("title"),
    ));
    html.push_str(&format!(
        "<input type=\"hidden\" name=\"input_{id}\" id=\"input_{id}\" waitfor=\"\" value=\"{}\"/>\n",
        html_escape(&ctx.value_text())
    ));
    html.push_str(&status_span(ctx));
    html.push_str(&message(ctx));
    html.push_str("</section>");
    html
}
