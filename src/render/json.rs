use crate::error::ConfgenError;
use crate::schema::RcCommand;

use anyhow::Context;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::fs;
use std::path::Path;

/// Render commands as a JSON array, indented by four spaces.
///
/// Going through `serde_json::Value` sorts the keys of every object; array
/// order (the command sequence, port lists) is kept as built.
pub fn render_commands(commands: &[RcCommand]) -> anyhow::Result<String> {
    let value = serde_json::to_value(commands)?;
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut ser)?;
    Ok(String::from_utf8(buf)?)
}

/// Write the rendered document, refusing to create missing directories.
pub fn write_document(path: &str, text: &str) -> anyhow::Result<()> {
    let parent = Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if !parent.is_dir() {
        return Err(ConfgenError::invalid(
            "json_file",
            format!("directory {} does not exist", parent.display()),
        )
        .into());
    }
    fs::write(path, text).with_context(|| format!("write {}", path))?;
    Ok(())
}
