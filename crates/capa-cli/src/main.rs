//! capa CLI: render, grade and inspect CAPA problems from the command line.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

use capa_core::RerandomizePolicy;

mod commands;
mod session;

#[derive(Parser)]
#[command(name = "capa", version, about = "CAPA problem rendering and grading")]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for commands that print results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a problem to HTML
    Render {
        /// Problem XML file
        problem: PathBuf,

        /// Saved state JSON to restore
        #[arg(long)]
        state: Option<PathBuf>,

        /// Seed to use when no state is given
        #[arg(long)]
        seed: Option<u32>,

        /// Problem id (default: file stem)
        #[arg(long)]
        id: Option<String>,

        /// Wrap the markup in a standalone HTML page
        #[arg(long)]
        page: bool,

        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Grade answers and record the result in the state file
    Check {
        /// Problem XML file
        problem: PathBuf,

        /// JSON file mapping answer ids to answers
        #[arg(long)]
        answers: Option<PathBuf>,

        /// Single answer as ID=VALUE (repeatable)
        #[arg(long = "answer", value_name = "ID=VALUE")]
        answer: Vec<String>,

        /// State JSON, read if present and written after grading
        #[arg(long)]
        state: Option<PathBuf>,

        /// Seed to use when no state is given
        #[arg(long)]
        seed: Option<u32>,

        /// Problem id (default: file stem)
        #[arg(long)]
        id: Option<String>,

        /// Regrade the stored answers without saving
        #[arg(long)]
        rescore: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the correct answers
    Answers {
        /// Problem XML file
        problem: PathBuf,

        /// Saved state JSON to restore
        #[arg(long)]
        state: Option<PathBuf>,

        /// Seed to use when no state is given
        #[arg(long)]
        seed: Option<u32>,

        /// Problem id (default: file stem)
        #[arg(long)]
        id: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Check that problem files parse and render
    Validate {
        /// Problem file or directory of .xml files
        path: PathBuf,
    },

    /// Return a saved problem to the unsubmitted state
    Reset {
        /// Problem XML file
        problem: PathBuf,

        /// State JSON to reset in place
        #[arg(long)]
        state: PathBuf,

        /// Problem id (default: file stem)
        #[arg(long)]
        id: Option<String>,

        /// Override the configured rerandomize policy
        #[arg(long)]
        rerandomize: Option<RerandomizePolicy>,
    },

    /// Apply an external grader's reply to a saved state
    Callback {
        /// Problem XML file
        problem: PathBuf,

        /// State JSON holding the queued submission
        #[arg(long)]
        state: PathBuf,

        /// Queue key of the submission
        #[arg(long)]
        key: String,

        /// Grader reply JSON, e.g. {"correct": true, "score": 1, "msg": "..."}
        #[arg(long)]
        reply: String,

        /// Problem id (default: file stem)
        #[arg(long)]
        id: Option<String>,
    },

    /// Create a starter config and example problem
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("capa=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Commands::Render {
            problem,
            state,
            seed,
            id,
            page,
            output,
        } => commands::render::execute(config, problem, state, seed, id, page, output),
        Commands::Check {
            problem,
            answers,
            answer,
            state,
            seed,
            id,
            rescore,
            format,
        } => {
            commands::check::execute(config, problem, answers, answer, state, seed, id, rescore, format)
                .await
        }
        Commands::Answers {
            problem,
            state,
            seed,
            id,
            format,
        } => commands::answers::execute(config, problem, state, seed, id, format),
        Commands::Validate { path } => commands::validate::execute(config, path),
        Commands::Reset {
            problem,
            state,
            id,
            rerandomize,
        } => commands::reset::execute(config, problem, state, id, rerandomize),
        Commands::Callback {
            problem,
            state,
            key,
            reply,
            id,
        } => commands::callback::execute(config, problem, state, key, reply, id),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
