//! Plain types for query results.
//!
//! Simplified versions of the lsp-types structures, with file URIs resolved
//! back to paths.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A position in a text document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Line number (0-indexed).
    pub line: u32,
    /// Column (0-indexed, UTF-16 code units in LSP).
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

impl From<lsp_types::Position> for Position {
    fn from(pos: lsp_types::Position) -> Self {
        Self {
            line: pos.line,
            character: pos.character,
        }
    }
}

impl From<Position> for lsp_types::Position {
    fn from(pos: Position) -> Self {
        Self {
            line: pos.line,
            character: pos.character,
        }
    }
}

/// A range in a text document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

impl From<lsp_types::Range> for Range {
    fn from(range: lsp_types::Range) -> Self {
        Self {
            start: range.start.into(),
            end: range.end.into(),
        }
    }
}

/// A location in a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// File path.
    pub path: PathBuf,
    /// Range within the file.
    pub range: Range,
}

impl Location {
    pub fn new(path: PathBuf, range: Range) -> Self {
        Self { path, range }
    }

    /// Renders the location relative to a workspace root, with 1-based
    /// line and column numbers.
    pub fn display_relative(&self, workspace: &Path) -> String {
        let path = self.path.strip_prefix(workspace).unwrap_or(&self.path);
        format!(
            "{}:{}:{}",
            path.display(),
            self.range.start.line + 1,
            self.range.start.character + 1
        )
    }
}

impl From<lsp_types::Location> for Location {
    fn from(location: lsp_types::Location) -> Self {
        Self {
            path: uri_to_path(&location.uri),
            range: location.range.into(),
        }
    }
}

/// Converts a path to an LSP URI.
pub fn path_to_uri(path: &Path) -> lsp_types::Uri {
    let path_str = if cfg!(windows) {
        format!("file:///{}", path.to_string_lossy().replace('\\', "/"))
    } else {
        format!("file://{}", path.to_string_lossy())
    };
    path_str.parse().expect("Invalid URI from path")
}

/// Converts an LSP URI to a path.
pub fn uri_to_path(uri: &lsp_types::Uri) -> PathBuf {
    let uri_str = uri.as_str();
    if let Some(path_str) = uri_str.strip_prefix("file://") {
        // On Windows, paths look like file:///C:/...
        if cfg!(windows) && path_str.starts_with('/') {
            PathBuf::from(&path_str[1..])
        } else {
            PathBuf::from(path_str)
        }
    } else {
        PathBuf::from(uri_str)
    }
}
