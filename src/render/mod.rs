//! Rendering of the command list into the output document.

pub mod json;

pub use json::{render_commands, write_document};
