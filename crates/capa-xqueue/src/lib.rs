//! capa-xqueue: external grading queue access.
//!
//! Implements the `XQueue` trait over HTTP for the XQueue service, provides an
//! in-memory queue for tests and offline runs, and loads `capa.toml`.

pub mod client;
pub mod config;
pub mod mock;

pub use client::XQueueClient;
pub use config::{
    create_xqueue, load_config, load_config_from, xqueue_settings, CapaConfig, ProblemConfig, SandboxConfig,
    XQueueConfig,
};
pub use mock::{MockQueue, QueuedSubmission};
