//! The `capa render` command.

use std::path::PathBuf;

use anyhow::Result;

use capa_templates::{generate_page, write_page, PageInfo};

use crate::session::{read_optional_state, Session};

pub fn execute(
    config_path: Option<PathBuf>,
    problem_path: PathBuf,
    state_path: Option<PathBuf>,
    seed: Option<u32>,
    id: Option<String>,
    page: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let session = Session::open(config_path.as_deref())?;
    let state = read_optional_state(state_path.as_ref())?;
    let problem = session.load_problem(&problem_path, id.as_deref(), state, seed)?;

    let html = problem.render()?;
    let info = page.then(|| {
        let info = PageInfo::new(problem.problem_id(), u64::from(problem.seed()));
        if problem.done() {
            info.with_score(problem.calculate_score(None))
        } else {
            info
        }
    });

    match (output, info) {
        (Some(path), Some(info)) => {
            write_page(&info, &html, &path)?;
            eprintln!("Rendered {} (seed {}) to {}", problem.problem_id(), problem.seed(), path.display());
        }
        (Some(path), None) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, html)?;
            eprintln!("Rendered {} (seed {}) to {}", problem.problem_id(), problem.seed(), path.display());
        }
        (None, Some(info)) => println!("{}", generate_page(&info, &html)),
        (None, None) => println!("{html}"),
    }
    Ok(())
}
