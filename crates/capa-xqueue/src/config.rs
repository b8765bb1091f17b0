//! `capa.toml` configuration and queue factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use capa_core::{RerandomizePolicy, XQueue, XQueueSettings};

use crate::client::XQueueClient;
use crate::mock::MockQueue;

/// Connection settings for the external grading queue.
///
/// Note: Custom Debug impl masks the password to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct XQueueConfig {
    /// Base URL of the queue service. Unset disables external grading.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_queue")]
    pub default_queue: String,
    /// Where the grader posts results.
    #[serde(default = "default_callback_url")]
    pub callback_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Seconds a student should wait before resubmitting.
    #[serde(default = "default_waittime")]
    pub waittime: u64,
    /// Use the in-memory queue instead of HTTP.
    #[serde(default)]
    pub mock: bool,
}

impl std::fmt::Debug for XQueueConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XQueueConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("default_queue", &self.default_queue)
            .field("callback_url", &self.callback_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("waittime", &self.waittime)
            .field("mock", &self.mock)
            .finish()
    }
}

fn default_queue() -> String {
    "default".to_string()
}
fn default_callback_url() -> String {
    "http://localhost:8000/courseware/xqueue/callback".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_waittime() -> u64 {
    5
}

impl Default for XQueueConfig {
    fn default() -> Self {
        Self {
            url: None,
            username: String::new(),
            password: String::new(),
            default_queue: default_queue(),
            callback_url: default_callback_url(),
            timeout_secs: default_timeout_secs(),
            waittime: default_waittime(),
            mock: false,
        }
    }
}

/// Script sandbox bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_sandbox_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,
    #[serde(default = "default_max_call_levels")]
    pub max_call_levels: usize,
    #[serde(default = "default_max_string_size")]
    pub max_string_size: usize,
    #[serde(default = "default_max_array_size")]
    pub max_array_size: usize,
}

fn default_sandbox_timeout_ms() -> u64 {
    2_000
}
fn default_max_operations() -> u64 {
    5_000_000
}
fn default_max_call_levels() -> usize {
    64
}
fn default_max_string_size() -> usize {
    1 << 20
}
fn default_max_array_size() -> usize {
    100_000
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_sandbox_timeout_ms(),
            max_operations: default_max_operations(),
            max_call_levels: default_max_call_levels(),
            max_string_size: default_max_string_size(),
            max_array_size: default_max_array_size(),
        }
    }
}

/// Defaults applied to problems built by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemConfig {
    #[serde(default)]
    pub rerandomize: RerandomizePolicy,
    #[serde(default = "default_student")]
    pub anonymous_student_id: String,
}

fn default_student() -> String {
    "student".to_string()
}

impl Default for ProblemConfig {
    fn default() -> Self {
        Self {
            rerandomize: RerandomizePolicy::default(),
            anonymous_student_id: default_student(),
        }
    }
}

/// Top-level capa configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapaConfig {
    #[serde(default)]
    pub xqueue: XQueueConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub problem: ProblemConfig,
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut from = 0;
    while let Some(offset) = result[from..].find("${") {
        let start = from + offset;
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = std::env::var(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
        from = start + value.len();
    }
    result
}

impl CapaConfig {
    fn resolve_env(&mut self) {
        let q = &mut self.xqueue;
        q.url = q.url.as_deref().map(resolve_env_vars);
        q.username = resolve_env_vars(&q.username);
        q.password = resolve_env_vars(&q.password);
        q.default_queue = resolve_env_vars(&q.default_queue);
        q.callback_url = resolve_env_vars(&q.callback_url);
        self.problem.anonymous_student_id = resolve_env_vars(&self.problem.anonymous_student_id);
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `capa.toml` in the current directory
/// 2. `~/.config/capa/config.toml`
///
/// Environment variable overrides: `CAPA_XQUEUE_URL`, `CAPA_XQUEUE_PASSWORD`.
pub fn load_config() -> Result<CapaConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<CapaConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("capa.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<CapaConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => CapaConfig::default(),
    };

    if let Ok(url) = std::env::var("CAPA_XQUEUE_URL") {
        config.xqueue.url = Some(url);
    }
    if let Ok(password) = std::env::var("CAPA_XQUEUE_PASSWORD") {
        config.xqueue.password = password;
    }
    config.resolve_env();

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("capa"))
}

/// Create the queue described by `config`, or `None` when no queue is set up.
pub fn create_xqueue(config: &XQueueConfig) -> Result<Option<Arc<dyn XQueue>>> {
    if config.mock {
        return Ok(Some(Arc::new(MockQueue::new())));
    }
    let Some(url) = config.url.as_deref().filter(|u| !u.is_empty()) else {
        return Ok(None);
    };
    let client = XQueueClient::new(url, &config.username, &config.password)
        .context("failed to create queue client")?
        .with_timeout(Duration::from_secs(config.timeout_secs));
    Ok(Some(Arc::new(client)))
}

/// Routing settings for problems, wrapping the given queue.
pub fn xqueue_settings(config: &XQueueConfig, interface: Arc<dyn XQueue>) -> XQueueSettings {
    XQueueSettings {
        interface,
        callback_url: config.callback_url.clone(),
        default_queue: config.default_queue.clone(),
        waittime: config.waittime,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_CAPA_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_CAPA_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_CAPA_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env_vars("${_CAPA_UNSET_VAR}x"), "x");
        assert_eq!(resolve_env_vars("${unterminated"), "${unterminated");
        std::env::remove_var("_CAPA_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = CapaConfig::default();
        assert!(config.xqueue.url.is_none());
        assert_eq!(config.xqueue.default_queue, "default");
        assert_eq!(config.sandbox.timeout_ms, 2_000);
        assert_eq!(config.problem.rerandomize, RerandomizePolicy::Never);
        assert_eq!(config.problem.anonymous_student_id, "student");
    }

    #[test]
    fn parse_sections() {
        let toml_str = r#"
[xqueue]
url = "http://xqueue.local"
username = "lms"
password = "hunter2"
default_queue = "python"

[sandbox]
timeout_ms = 500

[problem]
rerandomize = "per_student"
"#;
        let config: CapaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.xqueue.url.as_deref(), Some("http://xqueue.local"));
        assert_eq!(config.xqueue.timeout_secs, 10);
        assert_eq!(config.sandbox.timeout_ms, 500);
        assert_eq!(config.sandbox.max_call_levels, 64);
        assert_eq!(config.problem.rerandomize, RerandomizePolicy::PerStudent);
    }

    #[test]
    fn password_is_masked() {
        let config = XQueueConfig {
            password: "hunter2".into(),
            ..Default::default()
        };
        let shown = format!("{config:?}");
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("***"));
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = load_config_from(Some(Path::new("/nonexistent/capa.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn queue_factory() {
        assert!(create_xqueue(&XQueueConfig::default()).unwrap().is_none());
        let mock = XQueueConfig {
            mock: true,
            ..Default::default()
        };
        assert_eq!(create_xqueue(&mock).unwrap().unwrap().name(), "mock");
        let http = XQueueConfig {
            url: Some("http://localhost:1".into()),
            ..Default::default()
        };
        assert_eq!(create_xqueue(&http).unwrap().unwrap().name(), "http");
    }
}
