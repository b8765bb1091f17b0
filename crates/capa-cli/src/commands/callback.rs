//! The `capa callback` command.

use std::path::PathBuf;

use anyhow::Result;

use crate::session::{require_state, write_state, Session};

pub fn execute(
    config_path: Option<PathBuf>,
    problem_path: PathBuf,
    state_path: PathBuf,
    key: String,
    reply: String,
    id: Option<String>,
) -> Result<()> {
    let session = Session::open(config_path.as_deref())?;
    let state = require_state(&state_path)?;
    let mut problem = session.load_problem(&problem_path, id.as_deref(), Some(state), None)?;
    anyhow::ensure!(problem.is_queued(), "no submission is waiting for the grader");

    let before = problem.correct_map().clone();
    let cmap = problem.update_score(&reply, &key);
    if cmap == before {
        println!("No queued submission matches key {key}; state unchanged.");
        return Ok(());
    }
    write_state(&state_path, &problem)?;

    for (answer_id, entry) in cmap.iter() {
        if let Some(correctness) = entry.correctness {
            println!("{answer_id}: {correctness} ({} points)", cmap.npoints(answer_id));
        }
    }
    let score = problem.calculate_score(None);
    println!("Score: {}/{}", score.score, score.total);
    Ok(())
}
