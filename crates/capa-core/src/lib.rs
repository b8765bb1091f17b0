//! capa-core: the CAPA problem-grading engine.
//!
//! Parses XML problem documents, randomizes them per student from a seed,
//! renders them through an injected template renderer, and grades submitted
//! answers into a [`CorrectMap`]. Script execution, template rendering and
//! the external grading queue are collaborators described in [`traits`].

pub mod calc;
pub mod context;
pub mod correctmap;
pub mod error;
pub mod hints;
pub mod inputs;
pub mod model;
pub mod problem;
pub mod responses;
pub mod shuffle;
pub mod traits;
pub mod xml;

pub use correctmap::{CorrectMap, CorrectMapEntry, Correctness, HintMode, QueueState};
pub use error::{CapaError, QueueError, SandboxError};
pub use model::{ProblemState, RerandomizePolicy, StudentAnswer, StudentAnswers, SubmittedFile};
pub use problem::{CapaProblem, ProblemBuilder, Score};
pub use responses::{ExpectedAnswer, ResponseTag};
pub use traits::{
    CapaSystem, DisabledSandbox, QueueHeader, QueueReply, ScriptSandbox, TemplateRenderer, XQueue,
    XQueueSettings,
};
