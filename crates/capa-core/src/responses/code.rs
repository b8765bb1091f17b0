//! Code responses graded asynchronously by an external queue.
//!
//! Submitting only enqueues the answer; the entry stays ungraded with a
//! queue key until [`CodeResponse::update_score`] receives the grader's reply.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::correctmap::{CorrectMap, CorrectMapEntry, Correctness};
use crate::error::{CapaError, QueueError};
use crate::model::{StudentAnswer, StudentAnswers};
use crate::traits::QueueHeader;
use crate::xml::{Document, NodeId};

use super::{ExpectedAnswer, GradeContext, ResponseBase};

/// `submission_time` format sent to graders.
pub const QUEUE_DATE_FORMAT: &str = "%Y%m%d%H%M%S";

const NO_GRADER_MSG: &str = "Error: No grader has been set up for this problem.";
const INVALID_REPLY_MSG: &str = "Invalid grader reply. Please contact the course staff.";
const DEFAULT_ANSWER_DISPLAY: &str = "No answer provided.";

#[derive(Debug, Clone, PartialEq)]
pub struct CodeResponse {
    queue_name: Option<String>,
    grader_payload: String,
    initial_display: String,
    answer_display: String,
}

/// Parsed grader reply.
#[derive(Debug, Clone, PartialEq)]
struct ScoreMessage {
    correct: bool,
    score: f64,
    msg: String,
}

impl ScoreMessage {
    /// Parse `{"correct": .., "score": .., "msg": ..}`; all three keys are required.
    fn parse(raw: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(raw).ok()?;
        let map = value.as_object()?;
        let correct = match map.get("correct")? {
            Value::Bool(b) => *b,
            Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
            Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
            _ => false,
        };
        let score = match map.get("score")? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        let msg = match map.get("msg")? {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        Some(Self { correct, score, msg })
    }
}

/// Deterministic key for one queued submission.
fn queue_key(seed: u32, time: &str, student: &str, answer_id: &str) -> String {
    let material = format!("{seed}{time}{student}{answer_id}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, material.as_bytes())
        .simple()
        .to_string()
}

impl CodeResponse {
    pub(crate) fn build(doc: &Document, node: NodeId) -> Result<Self, CapaError> {
        let codeparam = doc.find_child(node, "codeparam").ok_or_else(|| {
            CapaError::Parse("Unsupported old format! <coderesponse> without <codeparam>".to_string())
        })?;
        let child_text = |tag: &str| doc.find_child(codeparam, tag).map(|c| doc.text_content(c));

        Ok(Self {
            queue_name: doc.attr(node, "queuename").map(str::to_string),
            grader_payload: child_text("grader_payload").unwrap_or_default(),
            initial_display: child_text("initial_display").unwrap_or_default(),
            answer_display: child_text("answer_display")
                .unwrap_or_else(|| DEFAULT_ANSWER_DISPLAY.to_string()),
        })
    }

    /// Send the submission to the queue and mark the answer as queued.
    pub(crate) async fn submit(
        &self,
        base: &ResponseBase,
        answers: &StudentAnswers,
        gctx: &GradeContext<'_>,
    ) -> Result<CorrectMap, CapaError> {
        let aid = base.answer_id();
        let submission = answers
            .get(aid)
            .ok_or_else(|| CapaError::Response(format!("cannot get student answer for {aid}")))?;

        let mut cmap = CorrectMap::new();
        let Some(xqueue) = &gctx.system.xqueue else {
            warn!(answer_id = aid, "no external grader configured");
            cmap.set(aid, CorrectMapEntry::default().with_msg(NO_GRADER_MSG));
            return Ok(cmap);
        };

        let now = Utc::now();
        let qtime = now.format(QUEUE_DATE_FORMAT).to_string();
        let student = gctx.system.anonymous_student_id.as_str();
        let key = queue_key(
            gctx.eval.seed,
            &now.format("%Y%m%d%H%M%S%.f").to_string(),
            student,
            aid,
        );

        let header = QueueHeader {
            lms_callback_url: xqueue.callback_url.clone(),
            lms_key: key.clone(),
            queue_name: self
                .queue_name
                .clone()
                .unwrap_or_else(|| xqueue.default_queue.clone()),
        };
        let student_info = json!({
            "anonymous_student_id": student,
            "submission_time": qtime,
            "random_seed": gctx.eval.seed,
        });
        let mut body = json!({
            "grader_payload": self.grader_payload,
            "student_info": student_info.to_string(),
            "student_response": "",
        });
        match submission {
            StudentAnswer::File(file) => {
                let mut files = serde_json::Map::new();
                files.insert(file.filename.clone(), Value::String(file.url.clone()));
                body["files"] = Value::String(Value::Object(files).to_string());
            }
            other => body["student_response"] = json!(other.as_text()),
        }

        let reply = xqueue
            .interface
            .send_to_queue(&header, &body.to_string())
            .await
            .map_err(|e| {
                warn!(answer_id = aid, queue = %header.queue_name, "failed to reach queue: {e:#}");
                CapaError::QueueCommunication(e)
            })?;
        if !reply.is_success() {
            warn!(
                answer_id = aid,
                code = reply.return_code,
                "queue rejected submission: {}",
                reply.content
            );
            return Err(QueueError::Rejected {
                code: reply.return_code,
                message: reply.content,
            }
            .into());
        }

        debug!(answer_id = aid, queue = %header.queue_name, "submission queued");
        cmap.set(aid, CorrectMapEntry::queued(key, now, reply.content));
        Ok(cmap)
    }

    /// Apply a grader reply to `cmap` if `queuekey` matches the outstanding request.
    pub(crate) fn update_score(&self, base: &ResponseBase, score_msg: &str, cmap: &mut CorrectMap, queuekey: &str) {
        let aid = base.answer_id();
        if !cmap.is_right_queuekey(aid, queuekey) {
            warn!(answer_id = aid, "ignoring grader reply with stale queue key {queuekey}");
            return;
        }
        let Some(score) = ScoreMessage::parse(score_msg) else {
            warn!(answer_id = aid, "invalid grader reply: {score_msg}");
            cmap.set(aid, CorrectMapEntry::default().with_msg(INVALID_REPLY_MSG));
            return;
        };
        let correctness = if score.correct {
            Correctness::Correct
        } else {
            Correctness::Incorrect
        };
        cmap.set(
            aid,
            CorrectMapEntry::graded(correctness)
                .with_points(score.score.max(0.0))
                .with_msg(score.msg.replace("&nbsp;", "&#160;")),
        );
    }

    pub(crate) fn get_answers(&self, base: &ResponseBase) -> BTreeMap<String, ExpectedAnswer> {
        BTreeMap::from([(
            base.answer_id().to_string(),
            ExpectedAnswer::Text(format!(
                "<span class=\"code-answer\"><pre><code>{}</code></pre></span>",
                self.answer_display
            )),
        )])
    }

    pub(crate) fn initial_display(&self, base: &ResponseBase) -> BTreeMap<String, String> {
        BTreeMap::from([(base.answer_id().to_string(), self.initial_display.clone())])
    }
}
