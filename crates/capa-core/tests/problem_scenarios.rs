//! Problem-level scenarios: determinism, persistence, choice semantics and
//! the external grader round trip.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use capa_core::shuffle::shuffle;
use capa_core::{
    CapaError, CapaProblem, CapaSystem, Correctness, ProblemState, QueueError, QueueHeader, QueueReply,
    StudentAnswer, StudentAnswers, TemplateRenderer, XQueue, XQueueSettings,
};

/// Renders every input as a tag carrying its id, value and status.
struct InspectRenderer;

impl TemplateRenderer for InspectRenderer {
    fn render_template(&self, name: &str, context: &Value) -> anyhow::Result<String> {
        Ok(format!(
            "<input data-template=\"{name}\" id=\"{}\" value='{}' status=\"{}\"/>",
            context["id"].as_str().unwrap_or_default(),
            context["value"],
            context["status"]["value"].as_str().unwrap_or_default(),
        ))
    }
}

#[derive(Default)]
struct RecordingQueue {
    keys: Mutex<Vec<String>>,
}

#[async_trait]
impl XQueue for RecordingQueue {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send_to_queue(&self, header: &QueueHeader, _body: &str) -> Result<QueueReply, QueueError> {
        self.keys.lock().unwrap().push(header.lms_key.clone());
        Ok(QueueReply::ok("queued"))
    }
}

fn system() -> CapaSystem {
    CapaSystem::new(Arc::new(InspectRenderer)).with_student("student-42")
}

fn answers(pairs: &[(&str, StudentAnswer)]) -> StudentAnswers {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

const CHOICES: &str = r#"<problem>
<p>Select all primes.</p>
<choiceresponse>
  <checkboxgroup>
    <choice correct="true">2</choice>
    <choice correct="false">4</choice>
    <choice correct="true">7</choice>
  </checkboxgroup>
</choiceresponse>
<p>Pick one component.</p>
<multiplechoiceresponse>
  <choicegroup type="MultipleChoice" shuffle="true">
    <choice correct="false" fixed="true">None of these</choice>
    <choice correct="false">Capacitor</choice>
    <choice correct="true">Resistor</choice>
    <choice correct="false">Inductor</choice>
  </choicegroup>
</multiplechoiceresponse>
</problem>"#;

const POOL: &str = r#"<problem>
<multiplechoiceresponse>
  <choicegroup type="MultipleChoice" answer-pool="4">
    <choice correct="false">wrong-1</choice>
    <choice correct="false">wrong-2</choice>
    <choice correct="true">right-1</choice>
    <choice correct="false">wrong-3</choice>
    <choice correct="true">right-2</choice>
  </choicegroup>
</multiplechoiceresponse>
</problem>"#;

const CODE: &str = r#"<problem>
<coderesponse queuename="python-grader">
  <textbox mode="python"/>
  <codeparam>
    <initial_display>def f(x):</initial_display>
    <answer_display>def f(x): return x</answer_display>
    <grader_payload>{"grader": "f.py"}</grader_payload>
  </codeparam>
</coderesponse>
</problem>"#;

fn build(source: &str, seed: u32) -> CapaProblem {
    CapaProblem::builder(source, "p", system())
        .with_seed(seed)
        .build()
        .unwrap()
}

#[test]
fn rendering_is_deterministic_per_seed() {
    let first = build(CHOICES, 7).render().unwrap();
    let second = build(CHOICES, 7).render().unwrap();
    assert_eq!(first, second);

    let problem = build(CHOICES, 7);
    assert_eq!(problem.render().unwrap(), problem.render().unwrap());
}

#[test]
fn shuffle_keeps_fixed_positions() {
    let items: Vec<u32> = (0..8).collect();
    let fixed = [true, false, false, false, false, false, false, true];
    for seed in 0..50 {
        let out = shuffle(items.clone(), seed, &fixed).unwrap();
        assert_eq!(out[0], 0);
        assert_eq!(out[7], 7);
        let mut sorted = out.clone();
        sorted.sort();
        assert_eq!(sorted, items);
    }
}

#[tokio::test]
async fn checkbox_requires_the_exact_set() {
    let grade = |given: Vec<&'static str>| async move {
        let mut problem = build(CHOICES, 1);
        problem
            .grade_answers(answers(&[("p_2_1", StudentAnswer::from(given))]))
            .await
            .unwrap()
            .correctness("p_2_1")
    };
    assert_eq!(grade(vec!["choice_0", "choice_2"]).await, Some(Correctness::Correct));
    assert_eq!(grade(vec!["choice_2", "choice_0"]).await, Some(Correctness::Correct));
    assert_eq!(grade(vec!["choice_0"]).await, Some(Correctness::Incorrect));
    assert_eq!(
        grade(vec!["choice_0", "choice_1", "choice_2"]).await,
        Some(Correctness::Incorrect)
    );
    assert_eq!(grade(vec!["choice_9"]).await, Some(Correctness::Incorrect));
}

#[tokio::test]
async fn shuffled_choice_keeps_its_name() {
    let mut problem = build(CHOICES, 11);
    let cmap = problem
        .grade_answers(answers(&[("p_3_1", StudentAnswer::from("choice_2"))]))
        .await
        .unwrap();
    assert_eq!(cmap.correctness("p_3_1"), Some(Correctness::Correct));
    assert_eq!(
        problem.find_answer_text("p_3_1", &StudentAnswer::from("choice_2")),
        "Resistor"
    );
}

#[tokio::test]
async fn state_round_trip_renders_and_grades_identically() {
    let mut original = build(CHOICES, 19);
    original
        .grade_answers(answers(&[
            ("p_2_1", StudentAnswer::from(vec!["choice_0"])),
            ("p_3_1", StudentAnswer::from("choice_1")),
        ]))
        .await
        .unwrap();

    let blob = serde_json::to_string(&original.get_state()).unwrap();
    let state: ProblemState = serde_json::from_str(&blob).unwrap();
    let restored = CapaProblem::builder(CHOICES, "p", system())
        .with_state(state)
        .build()
        .unwrap();

    assert_eq!(restored.seed(), 19);
    assert!(restored.done());
    assert_eq!(restored.render().unwrap(), original.render().unwrap());
    assert_eq!(restored.calculate_score(None), original.calculate_score(None));
    assert_eq!(restored.rescore().await.unwrap(), original.rescore().await.unwrap());
}

fn pool_layout(seed: u32) -> Vec<String> {
    let problem = build(POOL, seed);
    let answers = problem.get_question_answers();
    let html = problem.render().unwrap();
    let mut layout = vec![answers["p_2_1"].to_string()];
    layout.push(html);
    layout
}

#[test]
fn answer_pool_is_stable_for_seed_56() {
    let first = pool_layout(56);
    assert_eq!(first, pool_layout(56));

    let problem = build(POOL, 56);
    let Some(capa_core::ExpectedAnswer::List(correct)) = problem.get_question_answers().remove("p_2_1") else {
        panic!("expected a choice list");
    };
    assert_eq!(correct.len(), 1);

    let differs = (0..20).any(|seed| pool_layout(seed) != first);
    assert!(differs);
}

#[tokio::test]
async fn queued_submission_is_finalised_once_by_matching_key() {
    let queue = Arc::new(RecordingQueue::default());
    let system = system().with_xqueue(XQueueSettings {
        interface: queue.clone(),
        callback_url: "http://lms/callback".into(),
        default_queue: "default".into(),
        waittime: 5,
    });
    let mut problem = CapaProblem::builder(CODE, "p", system.clone())
        .with_seed(3)
        .build()
        .unwrap();
    assert_eq!(
        problem.student_answers().get("p_2_1"),
        Some(&StudentAnswer::from("def f(x):"))
    );

    problem
        .grade_answers(answers(&[("p_2_1", StudentAnswer::from("def f(x): return x"))]))
        .await
        .unwrap();
    assert!(problem.is_queued());
    assert!(problem.get_recentmost_queuetime().is_some());
    let key = queue.keys.lock().unwrap()[0].clone();

    let reply = r#"{"correct": true, "score": 1, "msg": "<p>ok</p>"}"#;
    let before = problem.correct_map().clone();
    problem.update_score(reply, "stale-key");
    assert_eq!(problem.correct_map(), &before);

    // The callback may arrive on a reloaded instance.
    let mut reloaded = CapaProblem::builder(CODE, "p", system)
        .with_state(problem.get_state())
        .build()
        .unwrap();
    let cmap = reloaded.update_score(reply, &key);
    assert_eq!(cmap.correctness("p_2_1"), Some(Correctness::Correct));
    assert!(!reloaded.is_queued());

    let again = reloaded.update_score(r#"{"correct": false, "score": 0, "msg": ""}"#, &key);
    assert_eq!(again.correctness("p_2_1"), Some(Correctness::Correct));
}

#[tokio::test]
async fn queue_failure_leaves_state_untouched() {
    struct DownQueue;

    #[async_trait]
    impl XQueue for DownQueue {
        fn name(&self) -> &str {
            "down"
        }

        async fn send_to_queue(&self, _header: &QueueHeader, _body: &str) -> Result<QueueReply, QueueError> {
            Err(QueueError::Network("connection refused".into()))
        }
    }

    let system = system().with_xqueue(XQueueSettings {
        interface: Arc::new(DownQueue),
        callback_url: "http://lms/callback".into(),
        default_queue: "default".into(),
        waittime: 5,
    });
    let mut problem = CapaProblem::builder(CODE, "p", system).with_seed(3).build().unwrap();
    let before = problem.get_state();
    let err = problem
        .grade_answers(answers(&[("p_2_1", StudentAnswer::from("print(1)"))]))
        .await
        .unwrap_err();
    assert!(matches!(err, CapaError::QueueCommunication(_)));
    assert_eq!(problem.get_state(), before);
    assert!(!problem.done());
}

#[tokio::test]
async fn failed_resubmission_keeps_previous_grading() {
    #[derive(Default)]
    struct SwitchableQueue {
        down: std::sync::atomic::AtomicBool,
        keys: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl XQueue for SwitchableQueue {
        fn name(&self) -> &str {
            "switchable"
        }

        async fn send_to_queue(&self, header: &QueueHeader, _body: &str) -> Result<QueueReply, QueueError> {
            if self.down.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(QueueError::Network("connection refused".into()));
            }
            self.keys.lock().unwrap().push(header.lms_key.clone());
            Ok(QueueReply::ok("queued"))
        }
    }

    let source = r#"<problem>
<stringresponse answer="ohm" type="ci"><textline/></stringresponse>
<coderesponse queuename="python-grader">
  <textbox mode="python"/>
  <codeparam><grader_payload>{"grader": "f.py"}</grader_payload></codeparam>
</coderesponse>
</problem>"#;
    let queue = Arc::new(SwitchableQueue::default());
    let system = system().with_xqueue(XQueueSettings {
        interface: queue.clone(),
        callback_url: "http://lms/callback".into(),
        default_queue: "default".into(),
        waittime: 5,
    });
    let mut problem = CapaProblem::builder(source, "p", system).with_seed(3).build().unwrap();

    problem
        .grade_answers(answers(&[
            ("p_2_1", StudentAnswer::from("Ohm")),
            ("p_3_1", StudentAnswer::from("def f(x): return x")),
        ]))
        .await
        .unwrap();
    let key = queue.keys.lock().unwrap()[0].clone();
    problem.update_score(r#"{"correct": true, "score": 1, "msg": "ok"}"#, &key);
    assert_eq!(problem.correct_map().correctness("p_2_1"), Some(Correctness::Correct));
    assert_eq!(problem.correct_map().correctness("p_3_1"), Some(Correctness::Correct));
    assert!(!problem.is_queued());

    queue.down.store(true, std::sync::atomic::Ordering::SeqCst);
    let answers_before = problem.student_answers().clone();
    let cmap_before = problem.correct_map().clone();
    let err = problem
        .grade_answers(answers(&[
            ("p_2_1", StudentAnswer::from("volt")),
            ("p_3_1", StudentAnswer::from("def f(x): return 0")),
        ]))
        .await
        .unwrap_err();

    assert!(matches!(err, CapaError::QueueCommunication(_)));
    assert_eq!(problem.student_answers(), &answers_before);
    assert_eq!(problem.correct_map(), &cmap_before);
    assert!(problem.done());
    assert!(!problem.is_queued());
    assert_eq!(queue.keys.lock().unwrap().len(), 1);
}
