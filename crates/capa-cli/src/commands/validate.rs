//! The `capa validate` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::session::Session;

/// Seed used for validation renders.
const VALIDATION_SEED: u32 = 1;

pub fn execute(config_path: Option<PathBuf>, path: PathBuf) -> Result<()> {
    let session = Session::open(config_path.as_deref())?;
    let files = problem_files(&path)?;
    anyhow::ensure!(!files.is_empty(), "no problem files found in {}", path.display());

    let mut failures = 0;
    for file in &files {
        match validate_one(&session, file) {
            Ok((responses, max_score)) => {
                println!("{}: {responses} responses, max score {max_score}", file.display());
            }
            Err(e) => {
                println!("{}: ERROR: {e:#}", file.display());
                failures += 1;
            }
        }
    }

    if failures == 0 {
        println!("All problems valid.");
        Ok(())
    } else {
        anyhow::bail!("{failures} of {} problem(s) failed validation", files.len())
    }
}

fn validate_one(session: &Session, file: &Path) -> Result<(usize, f64)> {
    let problem = session.load_problem(file, None, None, Some(VALIDATION_SEED))?;
    problem.render().context("failed to render")?;
    Ok((problem.responses().len(), problem.get_max_score()))
}

fn problem_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.is_dir() {
        anyhow::ensure!(path.exists(), "problem file not found: {}", path.display());
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(path)
        .with_context(|| format!("failed to read directory: {}", path.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "xml"))
        .collect();
    files.sort();
    Ok(files)
}
