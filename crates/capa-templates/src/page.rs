//! Standalone problem page.
//!
//! Wraps rendered problem markup in a self-contained HTML document with the
//! stylesheet inlined, for previewing problems outside a course.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::Path;

use capa_core::Score;

use crate::html::html_escape;

/// What the page header shows besides the problem itself.
#[derive(Debug, Clone)]
pub struct PageInfo {
    pub title: String,
    pub seed: u64,
    pub score: Option<Score>,
    pub rendered_at: DateTime<Utc>,
}

impl PageInfo {
    pub fn new(title: &str, seed: u64) -> Self {
        Self {
            title: title.to_string(),
            seed,
            score: None,
            rendered_at: Utc::now(),
        }
    }

    pub fn with_score(mut self, score: Score) -> Self {
        self.score = Some(score);
        self
    }
}

/// Build the full page around `problem_html`.
pub fn generate_page(info: &PageInfo, problem_html: &str) -> String {
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!("<title>{}</title>\n", html_escape(&info.title)));
    html.push_str("<style>\n");
    html.push_str(CSS);
    html.push_str("</style>\n");
    html.push_str("</head>\n<body>\n");

    html.push_str("<header>\n");
    html.push_str(&format!("<h1>{}</h1>\n", html_escape(&info.title)));
    let score = match &info.score {
        Some(s) => format!(" | score {}/{}", s.score, s.total),
        None => String::new(),
    };
    html.push_str(&format!(
        "<p class=\"meta\">seed {}{score} | {}</p>\n",
        info.seed,
        info.rendered_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    html.push_str("</header>\n");

    html.push_str("<main class=\"problem\">\n");
    html.push_str(problem_html);
    html.push_str("\n</main>\n");

    html.push_str("</body>\n</html>\n");
    html
}

/// Write a standalone page to a file.
pub fn write_page(info: &PageInfo, problem_html: &str, path: &Path) -> Result<()> {
    let html = generate_page(info, problem_html);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, html)?;
    Ok(())
}

const CSS: &str = r#"
:root { --bg: #fff; --fg: #1a1a1a; --border: #e5e7eb; --pass: #dcfce7; --fail: #fde2e2; --queued: #fef3c7; }
@media (prefers-color-scheme: dark) {
  :root { --bg: #111827; --fg: #f9fafb; --border: #374151; --pass: #064e3b; --fail: #7f1d1d; --queued: #78350f; }
}
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; margin: 0; padding: 2rem; background: var(--bg); color: var(--fg); }
.meta { color: #6b7280; }
.problem { max-width: 50rem; }
.inputtype { margin: 1rem 0; }
.inline { display: inline-block; }
.status { display: inline-block; width: 1rem; height: 1rem; margin-left: 0.5rem; border-radius: 50%; vertical-align: middle; }
.status.correct { background: var(--pass); }
.status.incorrect, .status.incomplete { background: var(--fail); }
.status.partially-correct, .status.processing { background: var(--queued); }
.sr { position: absolute; clip: rect(0 0 0 0); width: 1px; height: 1px; overflow: hidden; }
.choicegroup_correct { background: var(--pass); }
.choicegroup_incorrect { background: var(--fail); }
.message { margin-top: 0.5rem; padding: 0.5rem; border-left: 3px solid var(--border); }
.solution-span, .hint { display: block; margin: 1rem 0; }
textarea, pre { font-family: 'JetBrains Mono', 'Fira Code', monospace; font-size: 0.85rem; }
pre { overflow-x: auto; padding: 1rem; background: var(--border); border-radius: 8px; }
table { border-collapse: collapse; margin: 1rem 0; }
th, td { border: 1px solid var(--border); padding: 0.5rem 1rem; text-align: left; }
"#;
