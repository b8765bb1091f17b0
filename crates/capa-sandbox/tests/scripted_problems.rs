//! Problems whose context and grading come from rhai scripts.

use std::sync::Arc;

use serde_json::{json, Value};

use capa_core::{CapaProblem, CapaSystem, Correctness, StudentAnswer, StudentAnswers, TemplateRenderer};
use capa_sandbox::RhaiSandbox;

struct IdRenderer;

impl TemplateRenderer for IdRenderer {
    fn render_template(&self, name: &str, context: &Value) -> anyhow::Result<String> {
        Ok(format!("<{name} id=\"{}\"/>", context["id"].as_str().unwrap_or_default()))
    }
}

fn system() -> CapaSystem {
    CapaSystem::new(Arc::new(IdRenderer)).with_sandbox(Arc::new(RhaiSandbox::new()))
}

fn answers(pairs: &[(&str, &str)]) -> StudentAnswers {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), StudentAnswer::from(*v)))
        .collect()
}

const SUM: &str = r#"<problem>
<script type="loncapa/rhai">
let a = random_int(2, 9);
let b = random_int(2, 9);
let total = a + b;
fn check_sum(expect, ans) {
    ans.trim();
    let given = parse_int(ans);
    if given == parse_int(expect) { #{ ok: true, msg: "Well done" } } else { #{ ok: false, msg: "Add again" } }
}
</script>
<p>What is $a + $b?</p>
<customresponse cfn="check_sum" expect="$total">
  <textline size="5"/>
</customresponse>
<p>And $a times two?</p>
<numericalresponse answer="$a * 2">
  <formulaequationinput/>
</numericalresponse>
</problem>"#;

fn context_int(problem: &CapaProblem, name: &str) -> i64 {
    problem
        .context()
        .get(name)
        .and_then(Value::as_i64)
        .unwrap_or_else(|| panic!("{name} missing from context"))
}

#[test]
fn script_variables_reach_the_text() {
    let problem = CapaProblem::builder(SUM, "sum", system()).with_seed(21).build().unwrap();
    let a = context_int(&problem, "a");
    let b = context_int(&problem, "b");
    assert!((2..=9).contains(&a) && (2..=9).contains(&b));
    assert_eq!(context_int(&problem, "total"), a + b);

    let html = problem.render().unwrap();
    assert!(html.contains(&format!("What is {a} + {b}?")), "{html}");
    assert!(!html.contains("check_sum"));
}

#[test]
fn same_seed_same_numbers() {
    let first = CapaProblem::builder(SUM, "sum", system()).with_seed(21).build().unwrap();
    let second = CapaProblem::builder(SUM, "sum", system()).with_seed(21).build().unwrap();
    assert_eq!(first.context().vars(), second.context().vars());
    assert_eq!(first.render().unwrap(), second.render().unwrap());
}

#[tokio::test]
async fn check_function_and_numerical_answer() {
    let mut problem = CapaProblem::builder(SUM, "sum", system()).with_seed(3).build().unwrap();
    let total = context_int(&problem, "total");
    let a = context_int(&problem, "a");

    let cmap = problem
        .grade_answers(answers(&[
            ("sum_2_1", format!(" {total} ").as_str()),
            ("sum_3_1", (a * 2).to_string().as_str()),
        ]))
        .await
        .unwrap();
    assert_eq!(cmap.correctness("sum_2_1"), Some(Correctness::Correct));
    assert_eq!(cmap.msg("sum_2_1"), "Well done");
    assert_eq!(cmap.correctness("sum_3_1"), Some(Correctness::Correct));
    assert_eq!(problem.calculate_score(None).score, 2.0);

    let mut retry = CapaProblem::builder(SUM, "sum", system()).with_seed(3).build().unwrap();
    let cmap = retry
        .grade_answers(answers(&[("sum_2_1", (total + 1).to_string().as_str()), ("sum_3_1", "0")]))
        .await
        .unwrap();
    assert_eq!(cmap.correctness("sum_2_1"), Some(Correctness::Incorrect));
    assert_eq!(cmap.msg("sum_2_1"), "Add again");
    assert_eq!(cmap.correctness("sum_3_1"), Some(Correctness::Incorrect));
}

#[tokio::test]
async fn check_function_sees_all_student_answers() {
    let source = r#"<problem>
<script type="loncapa/rhai">
fn check(expect, ans, student_answers) {
    ans == expect && student_answers["pair_3_1"] == "yes"
}
</script>
<customresponse cfn="check" expect="42"><textline/></customresponse>
<stringresponse answer="yes"><textline/></stringresponse>
</problem>"#;
    let mut problem = CapaProblem::builder(source, "pair", system()).with_seed(1).build().unwrap();
    let cmap = problem
        .grade_answers(answers(&[("pair_2_1", "42"), ("pair_3_1", "yes")]))
        .await
        .unwrap();
    assert_eq!(cmap.correctness("pair_2_1"), Some(Correctness::Correct));
    assert_eq!(cmap.msg("pair_2_1"), "");

    let cmap = problem
        .grade_answers(answers(&[("pair_2_1", "42"), ("pair_3_1", "no")]))
        .await
        .unwrap();
    assert_eq!(cmap.correctness("pair_2_1"), Some(Correctness::Incorrect));
}

#[tokio::test]
async fn inline_answer_script_sets_correctness() {
    let source = r#"<problem>
<customresponse>
  <textline/>
  <textline/>
  <answer type="loncapa/rhai">
if submission[0] == "left" { correct[0] = "correct"; }
if submission[1] == "right" { correct[1] = "correct"; } else { messages[1] = "Look again"; }
  </answer>
</customresponse>
</problem>"#;
    let mut problem = CapaProblem::builder(source, "lr", system()).with_seed(1).build().unwrap();
    let cmap = problem
        .grade_answers(answers(&[("lr_2_1", "left"), ("lr_2_2", "up")]))
        .await
        .unwrap();
    assert_eq!(cmap.correctness("lr_2_1"), Some(Correctness::Correct));
    assert_eq!(cmap.correctness("lr_2_2"), Some(Correctness::Incorrect));
    assert_eq!(cmap.msg("lr_2_2"), "Look again");
}

#[tokio::test]
async fn runaway_check_function_degrades_to_incorrect() {
    let source = r#"<problem>
<script type="loncapa/rhai">
fn spin(expect, ans) { loop {} }
</script>
<customresponse cfn="spin" expect="1"><textline/></customresponse>
</problem>"#;
    let sandbox = RhaiSandbox::new().with_max_operations(5_000);
    let system = CapaSystem::new(Arc::new(IdRenderer)).with_sandbox(Arc::new(sandbox));
    let mut problem = CapaProblem::builder(source, "spin", system).with_seed(1).build().unwrap();
    let cmap = problem.grade_answers(answers(&[("spin_2_1", "1")])).await.unwrap();
    assert_eq!(cmap.correctness("spin_2_1"), Some(Correctness::Incorrect));
    assert!(!cmap.msg("spin_2_1").is_empty());
}

#[test]
fn failing_problem_script_is_a_parse_error() {
    let source = r#"<problem><script type="loncapa/rhai">let x = undefined_thing();</script><p>x</p></problem>"#;
    let err = CapaProblem::builder(source, "bad", system()).with_seed(1).build().unwrap_err();
    assert!(err.to_string().contains("Error while executing script code"));
}

#[test]
fn hint_function_result_is_plain_json() {
    // Shape the engine hands a hint function and expects back.
    let code = r#"fn hint(ids, answers, new_map, old_map) { new_map[ids[0]].msg = "try units"; new_map }"#;
    let new_map = json!({"p_2_1": {"correctness": "incorrect", "msg": ""}});
    let value = capa_core::ScriptSandbox::call(
        &RhaiSandbox::new(),
        code,
        1,
        &serde_json::Map::new(),
        "hint",
        &[json!(["p_2_1"]), json!({}), new_map, json!({})],
    )
    .unwrap();
    assert_eq!(value["p_2_1"]["msg"], json!("try units"));
}
