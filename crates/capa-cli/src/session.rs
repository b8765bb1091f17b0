//! Loading problems and state files with the configured collaborators.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use capa_core::{CapaProblem, CapaSystem, ProblemState, RerandomizePolicy};
use capa_sandbox::{RhaiSandbox, SandboxLimits};
use capa_templates::BuiltinRenderer;
use capa_xqueue::{create_xqueue, load_config_from, xqueue_settings, CapaConfig, SandboxConfig};

/// Configuration plus what is needed to build problems from files.
pub struct Session {
    pub config: CapaConfig,
    system: CapaSystem,
}

impl Session {
    /// Load the configuration and wire up renderer, sandbox and queue.
    pub fn open(config_path: Option<&Path>) -> Result<Self> {
        let config = load_config_from(config_path)?;
        let sandbox = RhaiSandbox::new().with_limits(sandbox_limits(&config.sandbox));
        let mut system = CapaSystem::new(Arc::new(BuiltinRenderer::new()))
            .with_sandbox(Arc::new(sandbox))
            .with_student(config.problem.anonymous_student_id.clone());
        if let Some(queue) = create_xqueue(&config.xqueue)? {
            debug!(queue = queue.name(), "external grading enabled");
            system = system.with_xqueue(xqueue_settings(&config.xqueue, queue));
        }
        Ok(Self { config, system })
    }

    /// Build the problem in `path`, restoring `state` when given.
    pub fn load_problem(
        &self,
        path: &Path,
        id: Option<&str>,
        state: Option<ProblemState>,
        seed: Option<u32>,
    ) -> Result<CapaProblem> {
        self.load_problem_with(path, id, state, seed, self.config.problem.rerandomize)
    }

    pub fn load_problem_with(
        &self,
        path: &Path,
        id: Option<&str>,
        state: Option<ProblemState>,
        seed: Option<u32>,
        rerandomize: RerandomizePolicy,
    ) -> Result<CapaProblem> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read problem: {}", path.display()))?;
        let problem_id = id.map(str::to_string).unwrap_or_else(|| problem_id_for(path));

        let mut builder = CapaProblem::builder(source, problem_id, self.system.clone()).with_rerandomize(rerandomize);
        if let Some(seed) = seed {
            builder = builder.with_seed(seed);
        }
        if let Some(state) = state {
            builder = builder.with_state(state);
        }
        builder
            .build()
            .with_context(|| format!("failed to load problem: {}", path.display()))
    }
}

/// Sandbox bounds from the `[sandbox]` section.
pub fn sandbox_limits(config: &SandboxConfig) -> SandboxLimits {
    SandboxLimits {
        timeout: Duration::from_millis(config.timeout_ms),
        max_operations: config.max_operations,
        max_call_levels: config.max_call_levels,
        max_string_size: config.max_string_size,
        max_array_size: config.max_array_size,
        ..SandboxLimits::default()
    }
}

/// Problem id derived from the file name, e.g. `ohms_law.xml` -> `ohms_law`.
pub fn problem_id_for(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().replace(|c: char| !c.is_ascii_alphanumeric(), "_"))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "problem".to_string())
}

/// Read a state file; `None` when it does not exist yet.
pub fn read_state(path: &Path) -> Result<Option<ProblemState>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read state: {}", path.display()))?;
    let state = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse state: {}", path.display()))?;
    Ok(Some(state))
}

/// Read a state file that must exist.
pub fn require_state(path: &Path) -> Result<ProblemState> {
    read_state(path)?.with_context(|| format!("state file not found: {}", path.display()))
}

pub fn write_state(path: &Path, problem: &CapaProblem) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&problem.get_state())?;
    std::fs::write(path, json).with_context(|| format!("failed to write state: {}", path.display()))?;
    Ok(())
}

/// Read an optional state path.
pub fn read_optional_state(path: Option<&PathBuf>) -> Result<Option<ProblemState>> {
    match path {
        Some(p) => read_state(p),
        None => Ok(None),
    }
}
