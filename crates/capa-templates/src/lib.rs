//! HTML rendering for capa problems.
//!
//! [`BuiltinRenderer`] supplies the input widget templates the engine asks
//! for; [`page`] wraps a rendered problem into a standalone document.

pub mod html;
pub mod page;

pub use html::{html_escape, BuiltinRenderer};
pub use page::{generate_page, write_page, PageInfo};
