//! The `capa check` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use serde_json::json;

use capa_core::{CapaProblem, CorrectMap, StudentAnswer, StudentAnswers};

use crate::session::{read_optional_state, write_state, Session};
use crate::OutputFormat;

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    config_path: Option<PathBuf>,
    problem_path: PathBuf,
    answers_path: Option<PathBuf>,
    answer_args: Vec<String>,
    state_path: Option<PathBuf>,
    seed: Option<u32>,
    id: Option<String>,
    rescore: bool,
    format: OutputFormat,
) -> Result<()> {
    let session = Session::open(config_path.as_deref())?;
    let state = read_optional_state(state_path.as_ref())?;
    let mut problem = session.load_problem(&problem_path, id.as_deref(), state, seed)?;

    let cmap = if rescore {
        anyhow::ensure!(problem.done(), "nothing to rescore: the problem has no submission");
        problem.rescore().await?
    } else {
        let answers = collect_answers(answers_path.as_deref(), &answer_args)?;
        anyhow::ensure!(!answers.is_empty(), "no answers given; use --answers or --answer");
        let cmap = problem.grade_answers(answers).await?;
        if let Some(path) = &state_path {
            write_state(path, &problem)?;
        }
        cmap
    };

    match format {
        OutputFormat::Json => {
            let score = problem.calculate_score(Some(&cmap));
            let out = json!({
                "problem_id": problem.problem_id(),
                "seed": problem.seed(),
                "correct_map": cmap,
                "score": score,
                "queued": cmap.any_queued(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => print_results(&problem, &cmap),
    }
    Ok(())
}

/// Merge answers from a JSON file with `ID=VALUE` arguments; arguments win.
fn collect_answers(path: Option<&Path>, args: &[String]) -> Result<StudentAnswers> {
    let mut answers = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p)
                .with_context(|| format!("failed to read answers: {}", p.display()))?;
            serde_json::from_str::<StudentAnswers>(&content)
                .with_context(|| format!("failed to parse answers: {}", p.display()))?
        }
        None => StudentAnswers::new(),
    };
    for arg in args {
        let (id, value) = arg
            .split_once('=')
            .with_context(|| format!("invalid answer '{arg}', expected ID=VALUE"))?;
        answers.insert(id.trim().to_string(), StudentAnswer::from(value));
    }
    Ok(answers)
}

fn print_results(problem: &CapaProblem, cmap: &CorrectMap) {
    let mut table = Table::new();
    table.set_header(vec!["Answer", "Submitted", "Result", "Points", "Message"]);

    for (answer_id, entry) in cmap.iter() {
        let submitted = problem
            .student_answers()
            .get(answer_id)
            .map(|a| problem.find_answer_text(answer_id, a))
            .unwrap_or_default();
        let result = match (&entry.correctness, &entry.queuestate) {
            (Some(c), _) => c.to_string(),
            (None, Some(_)) => "queued".to_string(),
            (None, None) => "-".to_string(),
        };
        table.add_row(vec![
            Cell::new(answer_id),
            Cell::new(submitted),
            Cell::new(result),
            Cell::new(format!("{}", cmap.npoints(answer_id))),
            Cell::new(strip_markup(&entry.msg)),
        ]);
    }
    println!("{table}");

    let score = problem.calculate_score(Some(cmap));
    println!("Score: {}/{}", score.score, score.total);
    if !cmap.overall_message().is_empty() {
        println!("{}", strip_markup(cmap.overall_message()));
    }
    for (answer_id, entry) in cmap.iter() {
        if let Some(queue) = &entry.queuestate {
            println!("Queued {answer_id} with key {}", queue.key);
        }
    }
}

/// Markup-free text for terminal output.
fn strip_markup(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_from_args_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("answers.json");
        std::fs::write(&file, r#"{"p_2_1": "1", "p_3_1": ["choice_0", "choice_2"]}"#).unwrap();

        let answers = collect_answers(Some(&file), &["p_2_1=5 ohm".to_string()]).unwrap();
        assert_eq!(answers["p_2_1"], StudentAnswer::from("5 ohm"));
        assert_eq!(answers["p_3_1"], StudentAnswer::from(vec!["choice_0", "choice_2"]));
    }

    #[test]
    fn malformed_answer_argument() {
        let err = collect_answers(None, &["p_2_1".to_string()]).unwrap_err();
        assert!(err.to_string().contains("expected ID=VALUE"));
    }

    #[test]
    fn markup_is_stripped() {
        assert_eq!(strip_markup("<p>Use <b>SI</b> units &amp; 3 &lt; 4</p>"), "Use SI units & 3 < 4");
    }
}
