//! Collaborator traits the problem engine calls into.
//!
//! Templates, the external grading queue, and the script sandbox are
//! implemented by the `capa-templates`, `capa-xqueue` and `capa-sandbox`
//! crates respectively.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{QueueError, SandboxError};

// ---------------------------------------------------------------------------
// Template renderer
// ---------------------------------------------------------------------------

/// Renders an input widget from a named template and a context object.
pub trait TemplateRenderer: Send + Sync {
    fn render_template(&self, name: &str, context: &Value) -> anyhow::Result<String>;
}

// ---------------------------------------------------------------------------
// External grading queue
// ---------------------------------------------------------------------------

/// Routing header sent with every queued submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueHeader {
    /// URL the grader posts its result back to.
    pub lms_callback_url: String,
    /// Key correlating the result with the outstanding request.
    pub lms_key: String,
    /// Name of the grader queue.
    pub queue_name: String,
}

/// Acknowledgement returned by the queue for a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueReply {
    /// Zero on success.
    pub return_code: i64,
    #[serde(default)]
    pub content: String,
}

impl QueueReply {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            return_code: 0,
            content: content.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.return_code == 0
    }
}

/// Channel to an external grader.
#[async_trait]
pub trait XQueue: Send + Sync {
    /// Human-readable queue backend name (e.g. "http").
    fn name(&self) -> &str;

    /// Submit a grading request. Must not wait for the grading result.
    async fn send_to_queue(&self, header: &QueueHeader, body: &str)
        -> Result<QueueReply, QueueError>;
}

// ---------------------------------------------------------------------------
// Script sandbox
// ---------------------------------------------------------------------------

/// Restricted evaluator for author scripts.
///
/// Implementations must not expose filesystem or network access and must
/// bound execution time.
pub trait ScriptSandbox: Send + Sync {
    /// Run `code` with `bindings` in scope; return the resulting globals.
    fn run(
        &self,
        code: &str,
        seed: u32,
        bindings: &Map<String, Value>,
    ) -> Result<Map<String, Value>, SandboxError>;

    /// Call `function`, defined by `code`, with `args`.
    ///
    /// Arguments beyond the function's declared arity are dropped.
    fn call(
        &self,
        code: &str,
        seed: u32,
        bindings: &Map<String, Value>,
        function: &str,
        args: &[Value],
    ) -> Result<Value, SandboxError>;
}

/// Sandbox used when script execution is not available.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSandbox;

impl ScriptSandbox for DisabledSandbox {
    fn run(
        &self,
        _code: &str,
        _seed: u32,
        _bindings: &Map<String, Value>,
    ) -> Result<Map<String, Value>, SandboxError> {
        Err(SandboxError::Unavailable)
    }

    fn call(
        &self,
        _code: &str,
        _seed: u32,
        _bindings: &Map<String, Value>,
        _function: &str,
        _args: &[Value],
    ) -> Result<Value, SandboxError> {
        Err(SandboxError::Unavailable)
    }
}

// ---------------------------------------------------------------------------
// System bundle
// ---------------------------------------------------------------------------

/// Queue routing settings for code responses.
#[derive(Debug, Clone)]
pub struct XQueueSettings {
    pub interface: Arc<dyn XQueue>,
    /// URL the grader posts results to.
    pub callback_url: String,
    /// Queue used when a response does not name one.
    pub default_queue: String,
    /// Seconds a student should wait before resubmitting.
    pub waittime: u64,
}

impl std::fmt::Debug for dyn XQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "XQueue({})", self.name())
    }
}

/// Everything a problem needs from its host.
#[derive(Clone)]
pub struct CapaSystem {
    pub renderer: Arc<dyn TemplateRenderer>,
    pub sandbox: Arc<dyn ScriptSandbox>,
    pub xqueue: Option<XQueueSettings>,
    pub anonymous_student_id: String,
}

impl CapaSystem {
    pub fn new(renderer: Arc<dyn TemplateRenderer>) -> Self {
        Self {
            renderer,
            sandbox: Arc::new(DisabledSandbox),
            xqueue: None,
            anonymous_student_id: "student".to_string(),
        }
    }

    pub fn with_sandbox(mut self, sandbox: Arc<dyn ScriptSandbox>) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn with_xqueue(mut self, settings: XQueueSettings) -> Self {
        self.xqueue = Some(settings);
        self
    }

    pub fn with_student(mut self, anonymous_student_id: impl Into<String>) -> Self {
        self.anonymous_student_id = anonymous_student_id.into();
        self
    }
}

impl std::fmt::Debug for CapaSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapaSystem")
            .field("xqueue", &self.xqueue)
            .field("anonymous_student_id", &self.anonymous_student_id)
            .finish_non_exhaustive()
    }
}
