//! The `capa reset` command.

use std::path::PathBuf;

use anyhow::Result;

use capa_core::RerandomizePolicy;

use crate::session::{require_state, write_state, Session};

pub fn execute(
    config_path: Option<PathBuf>,
    problem_path: PathBuf,
    state_path: PathBuf,
    id: Option<String>,
    rerandomize: Option<RerandomizePolicy>,
) -> Result<()> {
    let session = Session::open(config_path.as_deref())?;
    let state = require_state(&state_path)?;
    let policy = rerandomize.unwrap_or(session.config.problem.rerandomize);
    let mut problem = session.load_problem_with(&problem_path, id.as_deref(), Some(state), None, policy)?;

    let old_seed = problem.seed();
    problem.reset()?;
    write_state(&state_path, &problem)?;

    println!(
        "Reset {} ({policy}): seed {old_seed} -> {}",
        problem.problem_id(),
        problem.seed()
    );
    Ok(())
}
