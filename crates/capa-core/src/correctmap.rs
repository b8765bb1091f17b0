//! Per-answer grading results.
//!
//! A [`CorrectMap`] records, for each answer id, the correctness, points,
//! feedback and (for externally graded answers) the outstanding queue
//! request. It serializes as a plain map keyed by answer id so it can be
//! persisted as part of the problem state.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of grading one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Correctness {
    Correct,
    Incorrect,
    PartiallyCorrect,
}

impl fmt::Display for Correctness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Correctness::Correct => write!(f, "correct"),
            Correctness::Incorrect => write!(f, "incorrect"),
            Correctness::PartiallyCorrect => write!(f, "partially-correct"),
        }
    }
}

impl FromStr for Correctness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "correct" => Ok(Correctness::Correct),
            "incorrect" => Ok(Correctness::Incorrect),
            "partially-correct" | "partial" => Ok(Correctness::PartiallyCorrect),
            other => Err(format!("unknown correctness: {other}")),
        }
    }
}

/// When hints are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintMode {
    Always,
    OnRequest,
}

impl FromStr for HintMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(HintMode::Always),
            "on_request" => Ok(HintMode::OnRequest),
            other => Err(format!("unknown hint mode: {other}")),
        }
    }
}

/// An outstanding request to the external grader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueState {
    /// Key the grader echoes back with its result.
    pub key: String,
    /// When the request was submitted.
    pub time: DateTime<Utc>,
}

/// Grading record for one answer id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrectMapEntry {
    /// `None` while the answer waits for an external grader.
    #[serde(default)]
    pub correctness: Option<Correctness>,
    /// Points awarded; `None` means "1 if correct, else 0".
    #[serde(default)]
    pub npoints: Option<f64>,
    /// Feedback markup.
    #[serde(default)]
    pub msg: String,
    /// Hint markup.
    #[serde(default)]
    pub hint: String,
    #[serde(default)]
    pub hintmode: Option<HintMode>,
    #[serde(default)]
    pub queuestate: Option<QueueState>,
    /// Author-declared variable name for the answer, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answervariable: Option<String>,
}

impl CorrectMapEntry {
    pub fn graded(correctness: Correctness) -> Self {
        Self {
            correctness: Some(correctness),
            ..Default::default()
        }
    }

    pub fn with_points(mut self, npoints: f64) -> Self {
        self.npoints = Some(npoints);
        self
    }

    pub fn with_msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = msg.into();
        self
    }

    pub fn queued(key: String, time: DateTime<Utc>, msg: impl Into<String>) -> Self {
        Self {
            correctness: None,
            msg: msg.into(),
            queuestate: Some(QueueState { key, time }),
            ..Default::default()
        }
    }
}

/// Grading results for a whole problem.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrectMap {
    #[serde(flatten)]
    entries: BTreeMap<String, CorrectMapEntry>,
    /// Message applying to the whole submission.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    overall_message: String,
}

impl CorrectMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, answer_id: &str, entry: CorrectMapEntry) {
        self.entries.insert(answer_id.to_string(), entry);
    }

    pub fn get(&self, answer_id: &str) -> Option<&CorrectMapEntry> {
        self.entries.get(answer_id)
    }

    pub fn get_mut(&mut self, answer_id: &str) -> Option<&mut CorrectMapEntry> {
        self.entries.get_mut(answer_id)
    }

    pub fn contains(&self, answer_id: &str) -> bool {
        self.entries.contains_key(answer_id)
    }

    pub fn answer_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CorrectMapEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.overall_message.is_empty()
    }

    pub fn correctness(&self, answer_id: &str) -> Option<Correctness> {
        self.get(answer_id).and_then(|e| e.correctness)
    }

    /// Correct or partially correct.
    pub fn is_correct(&self, answer_id: &str) -> bool {
        matches!(
            self.correctness(answer_id),
            Some(Correctness::Correct) | Some(Correctness::PartiallyCorrect)
        )
    }

    pub fn is_partially_correct(&self, answer_id: &str) -> bool {
        self.correctness(answer_id) == Some(Correctness::PartiallyCorrect)
    }

    pub fn is_queued(&self, answer_id: &str) -> bool {
        self.get(answer_id)
            .map(|e| e.queuestate.is_some())
            .unwrap_or(false)
    }

    /// `true` if `key` is the outstanding queue key for `answer_id`.
    pub fn is_right_queuekey(&self, answer_id: &str, key: &str) -> bool {
        self.get(answer_id)
            .and_then(|e| e.queuestate.as_ref())
            .map(|q| q.key == key)
            .unwrap_or(false)
    }

    pub fn queuetime(&self, answer_id: &str) -> Option<DateTime<Utc>> {
        self.get(answer_id)
            .and_then(|e| e.queuestate.as_ref())
            .map(|q| q.time)
    }

    pub fn npoints(&self, answer_id: &str) -> f64 {
        match self.get(answer_id).and_then(|e| e.npoints) {
            Some(points) => points,
            None if self.is_correct(answer_id) => 1.0,
            None => 0.0,
        }
    }

    pub fn msg(&self, answer_id: &str) -> &str {
        self.get(answer_id).map(|e| e.msg.as_str()).unwrap_or("")
    }

    pub fn hint(&self, answer_id: &str) -> &str {
        self.get(answer_id).map(|e| e.hint.as_str()).unwrap_or("")
    }

    pub fn hintmode(&self, answer_id: &str) -> Option<HintMode> {
        self.get(answer_id).and_then(|e| e.hintmode)
    }

    pub fn set_hint_and_mode(&mut self, answer_id: &str, hint: &str, mode: Option<HintMode>) {
        let entry = self.entries.entry(answer_id.to_string()).or_default();
        entry.hint = hint.to_string();
        entry.hintmode = mode;
    }

    /// Append feedback to an existing message.
    pub fn append_msg(&mut self, answer_id: &str, extra: &str) {
        let entry = self.entries.entry(answer_id.to_string()).or_default();
        entry.msg.push_str(extra);
    }

    pub fn overall_message(&self) -> &str {
        &self.overall_message
    }

    pub fn set_overall_message(&mut self, msg: impl Into<String>) {
        self.overall_message = msg.into();
    }

    /// Merge `other` into this map; entries in `other` win.
    pub fn update(&mut self, other: CorrectMap) {
        self.entries.extend(other.entries);
        if !other.overall_message.is_empty() {
            self.overall_message = other.overall_message;
        }
    }

    /// Earliest submission time among outstanding queue requests.
    pub fn earliest_queuetime(&self) -> Option<DateTime<Utc>> {
        self.entries
            .values()
            .filter_map(|e| e.queuestate.as_ref().map(|q| q.time))
            .min()
    }

    pub fn any_queued(&self) -> bool {
        self.entries.values().any(|e| e.queuestate.is_some())
    }
}
