//! Evaluation context shared by rendering and grading.
//!
//! Holds the values produced by running the problem's scripts for one seed,
//! plus the script source itself so graders can call author functions later.

use serde_json::{Map, Value};

use crate::calc::Namespace;

/// Variables derived from the problem scripts for one seed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalContext {
    pub seed: u32,
    pub anonymous_student_id: String,
    vars: Map<String, Value>,
    script_code: String,
    /// Names sorted longest first, for `$name` substitution.
    substitution_order: Vec<String>,
}

impl EvalContext {
    pub fn new(seed: u32, anonymous_student_id: impl Into<String>) -> Self {
        Self {
            seed,
            anonymous_student_id: anonymous_student_id.into(),
            ..Default::default()
        }
    }

    /// Bindings passed into a script run.
    pub fn bindings(&self) -> Map<String, Value> {
        let mut map = self.vars.clone();
        map.insert("seed".into(), Value::from(self.seed));
        map.insert(
            "anonymous_student_id".into(),
            Value::from(self.anonymous_student_id.clone()),
        );
        map
    }

    /// Merge the globals produced by a script run.
    pub fn extend(&mut self, vars: Map<String, Value>) {
        for (k, v) in vars {
            self.vars.insert(k, v);
        }
        self.refresh_order();
    }

    pub fn insert(&mut self, name: &str, value: Value) {
        self.vars.insert(name.to_string(), value);
        self.refresh_order();
    }

    fn refresh_order(&mut self) {
        let mut names: Vec<String> = self.vars.keys().cloned().collect();
        names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        self.substitution_order = names;
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn vars(&self) -> &Map<String, Value> {
        &self.vars
    }

    pub fn push_script(&mut self, code: &str) {
        if !self.script_code.is_empty() {
            self.script_code.push('\n');
        }
        self.script_code.push_str(code);
    }

    pub fn script_code(&self) -> &str {
        &self.script_code
    }

    pub fn has_scripts(&self) -> bool {
        !self.script_code.trim().is_empty()
    }

    /// Replace `$name` references with their values, longest names first.
    pub fn contextualize_text(&self, text: &str) -> String {
        if !text.contains('$') {
            return text.to_string();
        }
        let mut out = text.to_string();
        for name in &self.substitution_order {
            let needle = format!("${name}");
            if out.contains(&needle) {
                if let Some(value) = self.vars.get(name) {
                    out = out.replace(&needle, &display_value(value));
                }
            }
        }
        out
    }

    /// Numeric context values as calculator variables.
    pub fn namespace(&self, case_sensitive: bool) -> Namespace {
        let mut ns = Namespace::new().case_sensitive(case_sensitive);
        for (name, value) in &self.vars {
            if let Some(n) = value.as_f64() {
                ns.set_variable(name, n);
            }
        }
        ns
    }
}

/// Render a script value the way authors expect to see it in problem text.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                n.to_string()
            } else {
                format_float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(repr_value).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Object(map) => {
            let inner: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("'{k}': {}", repr_value(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}

fn repr_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{s}'"),
        other => display_value(other),
    }
}

/// Format a float keeping a trailing `.0` on integral values.
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        "nan".to_string()
    } else if x.is_infinite() {
        if x > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}
