//! Value and error conversion across the script boundary.

use rhai::{Dynamic, EvalAltResult, ParseError, Scope};
use serde_json::{Map, Value};
use tracing::debug;

use capa_core::SandboxError;

pub fn to_dynamic(value: &Value) -> Result<Dynamic, SandboxError> {
    rhai::serde::to_dynamic(value).map_err(|e| SandboxError::Conversion(e.to_string()))
}

pub fn from_dynamic(value: &Dynamic) -> Result<Value, SandboxError> {
    rhai::serde::from_dynamic::<Value>(value).map_err(|e| SandboxError::Conversion(e.to_string()))
}

/// Seed a scope with the problem bindings.
pub fn scope_from(bindings: &Map<String, Value>) -> Result<Scope<'static>, SandboxError> {
    let mut scope = Scope::new();
    for (name, value) in bindings {
        scope.push_dynamic(name.clone(), to_dynamic(value)?);
    }
    Ok(scope)
}

/// Collect the scope's variables. Later definitions shadow earlier ones;
/// values with no JSON form (function pointers, custom types) are left out.
pub fn globals_from(scope: &Scope<'_>) -> Map<String, Value> {
    let mut globals = Map::new();
    for (name, _constant, value) in scope.iter() {
        match from_dynamic(&value) {
            Ok(json) => {
                globals.insert(name.to_string(), json);
            }
            Err(e) => debug!(variable = name, "skipping script variable: {e}"),
        }
    }
    globals
}

pub fn parse_error(err: ParseError) -> SandboxError {
    SandboxError::Script(format!("syntax error: {err}"))
}

/// Classify a script failure. Limit violations raised inside nested calls
/// are reported as the limit itself.
pub fn script_error(err: EvalAltResult, timeout_ms: u64) -> SandboxError {
    match root_cause(&err) {
        EvalAltResult::ErrorTerminated(..) => SandboxError::Timeout(timeout_ms),
        EvalAltResult::ErrorTooManyOperations(..) => {
            SandboxError::ResourceLimit("too many operations".to_string())
        }
        EvalAltResult::ErrorStackOverflow(..) => {
            SandboxError::ResourceLimit("call stack too deep".to_string())
        }
        EvalAltResult::ErrorDataTooLarge(what, ..) => {
            SandboxError::ResourceLimit(format!("{what} too large"))
        }
        _ => SandboxError::Script(err.to_string()),
    }
}

fn root_cause(err: &EvalAltResult) -> &EvalAltResult {
    match err {
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => root_cause(inner),
        other => other,
    }
}
