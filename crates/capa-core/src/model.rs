//! Submitted answers, persisted problem state, and lifecycle policy.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::correctmap::CorrectMap;

/// A single submitted value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StudentAnswer {
    Text(String),
    List(Vec<String>),
    File(SubmittedFile),
}

/// Reference to an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedFile {
    pub filename: String,
    pub url: String,
}

impl StudentAnswer {
    /// The value as one string; lists are joined with commas.
    pub fn as_text(&self) -> String {
        match self {
            StudentAnswer::Text(s) => s.clone(),
            StudentAnswer::List(items) => items.join(","),
            StudentAnswer::File(f) => f.filename.clone(),
        }
    }

    /// The value as a list; a single string becomes a one-element list.
    pub fn as_list(&self) -> Vec<String> {
        match self {
            StudentAnswer::Text(s) if s.is_empty() => Vec::new(),
            StudentAnswer::Text(s) => vec![s.clone()],
            StudentAnswer::List(items) => items.clone(),
            StudentAnswer::File(f) => vec![f.filename.clone()],
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            StudentAnswer::Text(s) => s.trim().is_empty(),
            StudentAnswer::List(items) => items.is_empty(),
            StudentAnswer::File(_) => false,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl From<&str> for StudentAnswer {
    fn from(s: &str) -> Self {
        StudentAnswer::Text(s.to_string())
    }
}

impl From<String> for StudentAnswer {
    fn from(s: String) -> Self {
        StudentAnswer::Text(s)
    }
}

impl From<Vec<&str>> for StudentAnswer {
    fn from(items: Vec<&str>) -> Self {
        StudentAnswer::List(items.into_iter().map(str::to_string).collect())
    }
}

/// Answers keyed by answer id.
pub type StudentAnswers = BTreeMap<String, StudentAnswer>;

/// Everything persisted between requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProblemState {
    pub seed: u32,
    #[serde(default)]
    pub student_answers: StudentAnswers,
    #[serde(default)]
    pub correct_map: CorrectMap,
    #[serde(default)]
    pub done: bool,
}

/// When a reset draws a fresh seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerandomizePolicy {
    /// Fresh seed on every reset; one submission per seed.
    Always,
    /// Fresh seed on reset.
    #[serde(alias = "onreset", alias = "true")]
    OnReset,
    /// Keep the seed forever.
    #[default]
    #[serde(alias = "false")]
    Never,
    /// Seed derived from the student id.
    PerStudent,
}

impl RerandomizePolicy {
    /// `true` if a reset replaces the seed.
    pub fn rerandomizes_on_reset(&self) -> bool {
        matches!(self, RerandomizePolicy::Always | RerandomizePolicy::OnReset)
    }
}

impl fmt::Display for RerandomizePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RerandomizePolicy::Always => write!(f, "always"),
            RerandomizePolicy::OnReset => write!(f, "onreset"),
            RerandomizePolicy::Never => write!(f, "never"),
            RerandomizePolicy::PerStudent => write!(f, "per_student"),
        }
    }
}

impl FromStr for RerandomizePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "always" => Ok(RerandomizePolicy::Always),
            "onreset" | "on_reset" | "true" => Ok(RerandomizePolicy::OnReset),
            "never" | "false" => Ok(RerandomizePolicy::Never),
            "per_student" | "perstudent" => Ok(RerandomizePolicy::PerStudent),
            other => Err(format!("unknown rerandomize policy: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn answers_deserialize_by_shape() {
        let answers: StudentAnswers = serde_json::from_value(json!({
            "p_2_1": "42",
            "p_3_1": ["choice_0", "choice_2"],
            "p_4_1": {"filename": "a.py", "url": "http://files/a.py"}
        }))
        .unwrap();
        assert_eq!(answers["p_2_1"], StudentAnswer::Text("42".into()));
        assert_eq!(answers["p_3_1"].as_list(), vec!["choice_0", "choice_2"]);
        assert!(matches!(answers["p_4_1"], StudentAnswer::File(_)));
    }

    #[test]
    fn state_persists_only_the_four_fields() {
        let state = ProblemState {
            seed: 7,
            done: true,
            ..Default::default()
        };
        let json = serde_json::to_value(&state).unwrap();
        let mut keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["correct_map", "done", "seed", "student_answers"]);
    }

    #[test]
    fn rerandomize_parses_legacy_booleans() {
        assert_eq!("true".parse::<RerandomizePolicy>().unwrap(), RerandomizePolicy::OnReset);
        assert_eq!("false".parse::<RerandomizePolicy>().unwrap(), RerandomizePolicy::Never);
        assert_eq!(
            "per_student".parse::<RerandomizePolicy>().unwrap(),
            RerandomizePolicy::PerStudent
        );
        assert!("sometimes".parse::<RerandomizePolicy>().is_err());
    }

    #[test]
    fn blank_answers() {
        assert!(StudentAnswer::from("  ").is_blank());
        assert!(StudentAnswer::List(vec![]).is_blank());
        assert!(!StudentAnswer::from("0").is_blank());
    }
}
