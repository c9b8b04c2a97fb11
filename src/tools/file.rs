use std::path::{Component, Path, PathBuf};

use serde_json::json;

use super::{Tool, str_arg};
use crate::error::{Error, Result};
use crate::model::ToolSpec;

pub fn read_file(path: &Path) -> Result<String> {
    Ok(std::fs::read_to_string(path)?)
}

pub fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(std::fs::write(path, content)?)
}

/// Resolve a model-supplied relative path under `root`. Absolute paths and
/// `..` are refused.
fn resolve(root: &Path, relative: &str) -> Result<PathBuf> {
    let rel = Path::new(relative);
    let escapes = rel
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if relative.is_empty() || escapes {
        return Err(Error::invalid(format!("path must stay inside the workspace: {relative}")));
    }
    Ok(root.join(rel))
}

pub struct ReadFile {
    root: PathBuf,
}

impl ReadFile {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Tool for ReadFile {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "read_file".into(),
            description: "Read a text file from the working directory.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Relative file path"}
                },
                "required": ["path"]
            }),
        }
    }

    fn call(&self, args: &serde_json::Value) -> Result<String> {
        let path = resolve(&self.root, str_arg(args, "path")?)?;
        read_file(&path)
    }
}

/// Writes a file. This is the tool worth pausing for approval over.
pub struct WriteFile {
    root: PathBuf,
}

impl WriteFile {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Tool for WriteFile {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "write_file".into(),
            description: "Save text (for example a summary in Markdown) to a file in the \
                          working directory, replacing it if it exists."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Relative file path"},
                    "content": {"type": "string", "description": "Full file contents"}
                },
                "required": ["path", "content"]
            }),
        }
    }

    fn call(&self, args: &serde_json::Value) -> Result<String> {
        let rel = str_arg(args, "path")?;
        let content = str_arg(args, "content")?;
        let path = resolve(&self.root, rel)?;
        write_file(&path, content)?;
        tracing::info!(path = %path.display(), bytes = content.len(), "wrote file");
        Ok(format!("saved {rel}"))
    }
}
