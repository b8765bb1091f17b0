//! `ScriptSandbox` implementation backed by the rhai engine.

use std::time::{Duration, Instant};

use rhai::{Dynamic, AST};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use capa_core::{SandboxError, ScriptSandbox};

use crate::convert::{from_dynamic, globals_from, parse_error, scope_from, script_error, to_dynamic};
use crate::engine::{create_engine, SandboxLimits};

/// Runs problem scripts in a fresh, bounded rhai engine per invocation.
///
/// Problem variables are visible to top-level script code. Script functions
/// only see their arguments.
#[derive(Debug, Clone, Default)]
pub struct RhaiSandbox {
    limits: SandboxLimits,
}

impl RhaiSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(mut self, limits: SandboxLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.limits.timeout = timeout;
        self
    }

    pub fn with_max_operations(mut self, max_operations: u64) -> Self {
        self.limits.max_operations = max_operations;
        self
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.limits.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Largest declared arity of `function` not exceeding `given`.
fn arity_for(ast: &AST, function: &str, given: usize) -> Result<usize, SandboxError> {
    let arities: Vec<usize> = ast
        .iter_functions()
        .filter(|f| f.name == function)
        .map(|f| f.params.len())
        .collect();
    if arities.is_empty() {
        return Err(SandboxError::MissingFunction(function.to_string()));
    }
    arities
        .iter()
        .copied()
        .filter(|n| *n <= given)
        .max()
        .ok_or_else(|| {
            SandboxError::Script(format!(
                "{function}() takes {} arguments but {given} were given",
                arities.iter().min().copied().unwrap_or_default()
            ))
        })
}

impl ScriptSandbox for RhaiSandbox {
    fn run(
        &self,
        code: &str,
        seed: u32,
        bindings: &Map<String, Value>,
    ) -> Result<Map<String, Value>, SandboxError> {
        let started = Instant::now();
        let engine = create_engine(&self.limits, seed);
        let ast = engine.compile(code).map_err(parse_error)?;
        let mut scope = scope_from(bindings)?;

        engine.run_ast_with_scope(&mut scope, &ast).map_err(|e| {
            let err = script_error(*e, self.timeout_ms());
            warn!(seed, "problem script failed: {err}");
            err
        })?;

        let globals = globals_from(&scope);
        debug!(seed, variables = globals.len(), elapsed_ms = started.elapsed().as_millis() as u64, "script run");
        Ok(globals)
    }

    fn call(
        &self,
        code: &str,
        seed: u32,
        bindings: &Map<String, Value>,
        function: &str,
        args: &[Value],
    ) -> Result<Value, SandboxError> {
        let engine = create_engine(&self.limits, seed);
        let ast = engine.compile(code).map_err(parse_error)?;
        let arity = arity_for(&ast, function, args.len())?;
        if arity < args.len() {
            debug!(function, arity, given = args.len(), "dropping extra arguments");
        }
        let args: Vec<Dynamic> = args[..arity]
            .iter()
            .map(to_dynamic)
            .collect::<Result<_, _>>()?;

        let mut scope = scope_from(bindings)?;
        let result = engine
            .call_fn::<Dynamic>(&mut scope, &ast, function, args)
            .map_err(|e| {
                let err = script_error(*e, self.timeout_ms());
                warn!(function, seed, "check function failed: {err}");
                err
            })?;
        from_dynamic(&result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bindings() -> Map<String, Value> {
        json!({"seed": 4, "anonymous_student_id": "s1", "scale": 2.5})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn run_returns_globals() {
        let globals = RhaiSandbox::new()
            .run("let doubled = seed * 2; let label = `x${doubled}`; scale = scale * 2.0;", 4, &bindings())
            .unwrap();
        assert_eq!(globals["doubled"], json!(8));
        assert_eq!(globals["label"], json!("x8"));
        assert_eq!(globals["scale"], json!(5.0));
        assert_eq!(globals["anonymous_student_id"], json!("s1"));
    }

    #[test]
    fn same_seed_same_variables() {
        let code = "let a = random_int(1, 1000); let b = random();";
        let sandbox = RhaiSandbox::new();
        let first = sandbox.run(code, 12, &Map::new()).unwrap();
        assert_eq!(first, sandbox.run(code, 12, &Map::new()).unwrap());
        assert_ne!(first, sandbox.run(code, 13, &Map::new()).unwrap());
    }

    #[test]
    fn syntax_and_runtime_errors() {
        let sandbox = RhaiSandbox::new();
        let err = sandbox.run("let x = ;", 1, &Map::new()).unwrap_err();
        assert!(matches!(err, SandboxError::Script(m) if m.starts_with("syntax error")));
        let err = sandbox.run(r#"throw "bad input";"#, 1, &Map::new()).unwrap_err();
        assert!(matches!(err, SandboxError::Script(m) if m.contains("bad input")));
    }

    #[test]
    fn runaway_scripts_are_stopped() {
        let err = RhaiSandbox::new()
            .with_max_operations(10_000)
            .run("loop {}", 1, &Map::new())
            .unwrap_err();
        assert!(matches!(err, SandboxError::ResourceLimit(_)));

        let err = RhaiSandbox::new()
            .with_max_operations(0)
            .with_timeout(Duration::from_millis(50))
            .run("loop {}", 1, &Map::new())
            .unwrap_err();
        assert!(matches!(err, SandboxError::Timeout(50)));
    }

    #[test]
    fn oversized_data_is_rejected() {
        let limits = SandboxLimits {
            max_string_size: 16,
            ..SandboxLimits::default()
        };
        let err = RhaiSandbox::new()
            .with_limits(limits)
            .run(r#"let s = "a"; loop { s += s; }"#, 1, &Map::new())
            .unwrap_err();
        assert!(matches!(err, SandboxError::ResourceLimit(_)));
    }

    #[test]
    fn call_drops_extra_arguments() {
        let code = "fn check(expect, ans) { ans == expect }";
        let value = RhaiSandbox::new()
            .call(code, 1, &Map::new(), "check", &[json!("42"), json!("42"), json!({"extra": 1})])
            .unwrap();
        assert_eq!(value, json!(true));
    }

    #[test]
    fn call_returns_maps() {
        let code = r#"
            fn check(expect, ans) {
                let ok = parse_float(ans) == parse_float(expect);
                #{ ok: ok, msg: if ok { "" } else { "Not quite" } }
            }
        "#;
        let value = RhaiSandbox::new()
            .call(code, 1, &Map::new(), "check", &[json!("2"), json!("3")])
            .unwrap();
        assert_eq!(value, json!({"ok": false, "msg": "Not quite"}));
    }

    #[test]
    fn call_errors() {
        let sandbox = RhaiSandbox::new();
        let err = sandbox.call("let x = 1;", 1, &Map::new(), "check", &[]).unwrap_err();
        assert!(matches!(err, SandboxError::MissingFunction(f) if f == "check"));

        let err = sandbox
            .call("fn check(a, b) { true }", 1, &Map::new(), "check", &[json!(1)])
            .unwrap_err();
        assert!(matches!(err, SandboxError::Script(m) if m.contains("takes 2 arguments")));
    }
}
