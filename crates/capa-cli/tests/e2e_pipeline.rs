//! End-to-end pipeline tests wiring the real renderer, sandbox and queue.
//!
//! These tests load the sample problems, render them with the built-in
//! templates, grade submissions, persist state as JSON and restore it.

use std::path::Path;
use std::sync::Arc;

use capa_core::{CapaProblem, CapaSystem, Correctness, ProblemState, StudentAnswer, StudentAnswers, XQueueSettings};
use capa_sandbox::RhaiSandbox;
use capa_templates::BuiltinRenderer;
use capa_xqueue::{xqueue_settings, MockQueue, XQueueConfig};

fn source(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../problems").join(name);
    std::fs::read_to_string(path).unwrap()
}

fn system() -> CapaSystem {
    CapaSystem::new(Arc::new(BuiltinRenderer::new()))
        .with_sandbox(Arc::new(RhaiSandbox::new()))
        .with_student("e2e-student")
}

fn queue_settings(queue: Arc<MockQueue>) -> XQueueSettings {
    let config = XQueueConfig {
        default_queue: "python".into(),
        ..Default::default()
    };
    xqueue_settings(&config, queue)
}

fn answers(pairs: &[(&str, StudentAnswer)]) -> StudentAnswers {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

// --- Rendering ---

#[test]
fn e2e_render_uses_builtin_templates() {
    let problem = CapaProblem::builder(source("circuits.xml"), "circuits", system())
        .with_seed(2)
        .build()
        .unwrap();
    let html = problem.render().unwrap();

    assert!(html.contains("<input type=\"text\" name=\"input_circuits_2_1\""));
    assert!(html.contains("<span class=\"trailing_text\" id=\"trailing_text_circuits_2_1\">V</span>"));
    assert!(html.contains("type=\"checkbox\" name=\"input_circuits_4_1[]\""));
    assert!(html.contains("class=\"status unanswered\""));
}

#[tokio::test]
async fn e2e_submitted_values_are_escaped() {
    let mut problem = CapaProblem::builder(source("circuits.xml"), "circuits", system())
        .with_seed(2)
        .build()
        .unwrap();
    problem
        .grade_answers(answers(&[("circuits_3_1", StudentAnswer::from("<script>x</script>"))]))
        .await
        .unwrap();

    let html = problem.render().unwrap();
    assert!(html.contains("value=\"&lt;script&gt;x&lt;/script&gt;\""));
    assert!(!html.contains("<script>x</script>"));
    assert!(html.contains("class=\"status incorrect\""));
}

// --- Grading and state ---

#[tokio::test]
async fn e2e_grade_persist_restore() {
    let mut problem = CapaProblem::builder(source("circuits.xml"), "circuits", system())
        .with_seed(4)
        .build()
        .unwrap();
    let cmap = problem
        .grade_answers(answers(&[
            ("circuits_2_1", StudentAnswer::from("99.5")),
            ("circuits_3_1", StudentAnswer::from("Ohm")),
            ("circuits_4_1", StudentAnswer::from(vec!["choice_0", "choice_2"])),
        ]))
        .await
        .unwrap();
    assert_eq!(cmap.correctness("circuits_2_1"), Some(Correctness::Correct));
    assert_eq!(cmap.correctness("circuits_3_1"), Some(Correctness::Correct));
    assert_eq!(cmap.correctness("circuits_4_1"), Some(Correctness::Incorrect));

    let json = serde_json::to_string(&problem.get_state()).unwrap();
    let state: ProblemState = serde_json::from_str(&json).unwrap();
    let restored = CapaProblem::builder(source("circuits.xml"), "circuits", system())
        .with_state(state)
        .build()
        .unwrap();

    assert_eq!(restored.seed(), 4);
    assert!(restored.done());
    assert_eq!(restored.render().unwrap(), problem.render().unwrap());
    assert_eq!(restored.calculate_score(None).score, 2.0);
    assert_eq!(restored.rescore().await.unwrap(), *problem.correct_map());
}

#[tokio::test]
async fn e2e_scripted_problem_in_sandbox() {
    let mut problem = CapaProblem::builder(source("pythagoras.xml"), "pythagoras", system())
        .with_seed(17)
        .build()
        .unwrap();
    let a = problem.context().get("a").and_then(|v| v.as_i64()).unwrap();
    let b = problem.context().get("b").and_then(|v| v.as_i64()).unwrap();
    let hypotenuse = ((a * a + b * b) as f64).sqrt();

    let html = problem.render().unwrap();
    assert!(html.contains(&format!("legs of length {a} and {b}")));

    let cmap = problem
        .grade_answers(answers(&[
            ("pythagoras_2_1", StudentAnswer::from(format!("{:.3}", hypotenuse + 3.0))),
            ("pythagoras_3_1", StudentAnswer::from(format!("{}", a * a + b * b))),
        ]))
        .await
        .unwrap();
    assert_eq!(cmap.correctness("pythagoras_2_1"), Some(Correctness::Incorrect));
    assert_eq!(cmap.msg("pythagoras_2_1"), "Square both legs and add them first.");
    assert_eq!(cmap.correctness("pythagoras_3_1"), Some(Correctness::Correct));
}

// --- External grading ---

#[tokio::test]
async fn e2e_code_problem_through_mock_queue() {
    let queue = Arc::new(MockQueue::new());
    let system = system().with_xqueue(queue_settings(queue.clone()));
    let mut problem = CapaProblem::builder(source("code_grader.xml"), "code_grader", system.clone())
        .with_seed(5)
        .build()
        .unwrap();

    assert_eq!(
        problem.student_answers().get("code_grader_2_1"),
        Some(&StudentAnswer::from("def square(x):"))
    );

    problem
        .grade_answers(answers(&[("code_grader_2_1", StudentAnswer::from("def square(x):\n    return x * x"))]))
        .await
        .unwrap();
    assert!(problem.is_queued());
    assert!(problem.get_recentmost_queuetime().is_some());

    let submission = queue.last_submission().unwrap();
    assert_eq!(submission.header.queue_name, "python");
    let body: serde_json::Value = serde_json::from_str(&submission.body).unwrap();
    assert_eq!(body["grader_payload"], "{\"grader\": \"square.py\"}");

    let saved = problem.get_state();
    let mut reloaded = CapaProblem::builder(source("code_grader.xml"), "code_grader", system)
        .with_state(saved)
        .build()
        .unwrap();
    let cmap = reloaded.update_score(
        r#"{"correct": true, "score": 1, "msg": "<p>ok</p>"}"#,
        &submission.header.lms_key,
    );
    assert_eq!(cmap.correctness("code_grader_2_1"), Some(Correctness::Correct));
    assert!(!reloaded.is_queued());
    assert_eq!(reloaded.calculate_score(None).score, 1.0);
}
