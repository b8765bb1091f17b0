//! capa-sandbox: restricted execution of problem scripts.
//!
//! Problem scripts, custom check functions, hint functions and schematic
//! answer scripts are written in rhai and run here with operation, size and
//! wall-clock bounds. Scripts get no filesystem or network access; they can
//! draw seeded random numbers and call the CAPA expression evaluator.

pub mod convert;
pub mod engine;
pub mod sandbox;

pub use engine::{create_engine, SandboxLimits};
pub use sandbox::RhaiSandbox;
