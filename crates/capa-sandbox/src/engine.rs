//! Engine construction: limits, the seeded random source and the evaluator
//! bridge exposed to scripts.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::Rng;
use rhai::{Dynamic, Engine, EvalAltResult, Map, Position};
use tracing::debug;

use capa_core::calc::{self, Namespace};
use capa_core::shuffle::{rng_for_seed, ProblemRng};

/// Resource bounds applied to every script run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Wall-clock budget for one run or call.
    pub timeout: Duration,
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(2_000),
            max_operations: 5_000_000,
            max_call_levels: 64,
            max_string_size: 1 << 20,
            max_array_size: 100_000,
            max_map_size: 10_000,
        }
    }
}

/// How often, in operations, the wall clock is consulted.
const CLOCK_CHECK_INTERVAL: u64 = 1024;

type FnResult<T> = Result<T, Box<EvalAltResult>>;

/// Build an engine for one invocation.
///
/// The engine carries no filesystem, network or `eval` access. Random numbers
/// come from a generator seeded with the problem seed, so a script produces
/// the same values every time it runs for that seed.
pub fn create_engine(limits: &SandboxLimits, seed: u32) -> Engine {
    let mut engine = Engine::new();
    engine
        .set_max_operations(limits.max_operations)
        .set_max_call_levels(limits.max_call_levels)
        .set_max_string_size(limits.max_string_size)
        .set_max_array_size(limits.max_array_size)
        .set_max_map_size(limits.max_map_size)
        .set_max_expr_depths(128, 64);
    engine.disable_symbol("eval");

    let started = Instant::now();
    let timeout = limits.timeout;
    engine.on_progress(move |ops| {
        if ops % CLOCK_CHECK_INTERVAL == 0 && started.elapsed() > timeout {
            Some(Dynamic::from("timeout"))
        } else {
            None
        }
    });

    engine.on_print(|text| debug!(target: "capa_sandbox::script", "{text}"));
    engine.on_debug(|text, _source, pos| debug!(target: "capa_sandbox::script", "{pos:?}: {text}"));

    let rng = Arc::new(Mutex::new(rng_for_seed(u64::from(seed))));
    register_random(&mut engine, rng);
    register_calc(&mut engine);
    engine
}

fn with_rng<T>(rng: &Mutex<ProblemRng>, draw: impl FnOnce(&mut ProblemRng) -> T) -> FnResult<T> {
    let mut guard = rng
        .lock()
        .map_err(|_| Box::<EvalAltResult>::from("random source unavailable"))?;
    Ok(draw(&mut guard))
}

fn register_random(engine: &mut Engine, rng: Arc<Mutex<ProblemRng>>) {
    let float_rng = Arc::clone(&rng);
    engine.register_fn("random", move || -> FnResult<f64> {
        with_rng(&float_rng, |r| r.gen::<f64>())
    });

    // Inclusive on both ends.
    let int_rng = Arc::clone(&rng);
    engine.register_fn("random_int", move |low: i64, high: i64| -> FnResult<i64> {
        if low > high {
            return Err(format!("random_int: empty range {low}..={high}").into());
        }
        with_rng(&int_rng, |r| r.gen_range(low..=high))
    });

    engine.register_fn("random_choice", move |items: rhai::Array| -> FnResult<Dynamic> {
        if items.is_empty() {
            return Err("random_choice: empty array".into());
        }
        let index = with_rng(&rng, |r| r.gen_range(0..items.len()))?;
        Ok(items[index].clone())
    });
}

fn register_calc(engine: &mut Engine) {
    engine.register_fn("calc", |expression: &str| -> FnResult<f64> {
        evaluate(expression, &Namespace::new())
    });
    engine.register_fn("calc", |expression: &str, variables: Map| -> FnResult<f64> {
        let mut namespace = Namespace::new();
        for (name, value) in &variables {
            namespace.set_variable(name, number(name, value)?);
        }
        evaluate(expression, &namespace)
    });
}

fn number(name: &str, value: &Dynamic) -> FnResult<f64> {
    if let Ok(f) = value.as_float() {
        return Ok(f);
    }
    value
        .as_int()
        .map(|i| i as f64)
        .map_err(|_| format!("calc: variable {name} is not a number").into())
}

/// Real part of the evaluated expression.
fn evaluate(expression: &str, namespace: &Namespace) -> FnResult<f64> {
    let value = calc::evaluate(expression, namespace).map_err(|e| {
        Box::new(EvalAltResult::ErrorRuntime(
            Dynamic::from(format!("calc: {e}")),
            Position::NONE,
        ))
    })?;
    Ok(value.re)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval<T: rhai::Variant + Clone>(engine: &Engine, script: &str) -> T {
        engine.eval::<T>(script).unwrap()
    }

    #[test]
    fn random_is_seeded() {
        let a: rhai::Array = eval(&create_engine(&SandboxLimits::default(), 7), "[random(), random_int(1, 100)]");
        let b: rhai::Array = eval(&create_engine(&SandboxLimits::default(), 7), "[random(), random_int(1, 100)]");
        let c: rhai::Array = eval(&create_engine(&SandboxLimits::default(), 8), "[random(), random_int(1, 100)]");
        assert_eq!(format!("{a:?}"), format!("{b:?}"));
        assert_ne!(format!("{a:?}"), format!("{c:?}"));
    }

    #[test]
    fn random_int_bounds() {
        let engine = create_engine(&SandboxLimits::default(), 1);
        for _ in 0..50 {
            let n: i64 = eval(&engine, "random_int(3, 5)");
            assert!((3..=5).contains(&n));
        }
        assert!(engine.eval::<i64>("random_int(5, 3)").is_err());
        assert!(engine.eval::<Dynamic>("random_choice([])").is_err());
    }

    #[test]
    fn calc_bridge() {
        let engine = create_engine(&SandboxLimits::default(), 1);
        let v: f64 = eval(&engine, r#"calc("2*pi")"#);
        assert!((v - std::f64::consts::TAU).abs() < 1e-12);
        let v: f64 = eval(&engine, r#"calc("x^2 + y", #{x: 3, y: 0.5})"#);
        assert_eq!(v, 9.5);
        let err = engine.eval::<f64>(r#"calc("1 +")"#).unwrap_err();
        assert!(err.to_string().contains("calc:"));
    }

    #[test]
    fn eval_is_disabled() {
        let engine = create_engine(&SandboxLimits::default(), 1);
        assert!(engine.compile(r#"eval("1")"#).is_err());
    }
}
