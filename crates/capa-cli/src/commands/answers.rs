//! The `capa answers` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use crate::session::{read_optional_state, Session};
use crate::OutputFormat;

pub fn execute(
    config_path: Option<PathBuf>,
    problem_path: PathBuf,
    state_path: Option<PathBuf>,
    seed: Option<u32>,
    id: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let session = Session::open(config_path.as_deref())?;
    let state = read_optional_state(state_path.as_ref())?;
    let problem = session.load_problem(&problem_path, id.as_deref(), state, seed)?;
    let answers = problem.get_question_answers();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&answers)?),
        OutputFormat::Text => {
            let mut table = Table::new();
            table.set_header(vec!["Answer", "Question", "Correct answer"]);
            for (answer_id, expected) in &answers {
                let question = if answer_id.contains("_solution_") {
                    "Solution".to_string()
                } else {
                    problem.find_question_label(answer_id)
                };
                table.add_row(vec![
                    Cell::new(answer_id),
                    Cell::new(question),
                    Cell::new(expected.to_string()),
                ]);
            }
            println!("{table}");
            println!(
                "Problem {} (seed {}), max score {}",
                problem.problem_id(),
                problem.seed(),
                problem.get_max_score()
            );
        }
    }
    Ok(())
}
