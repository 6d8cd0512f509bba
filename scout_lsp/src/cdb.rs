//! Compilation database discovery and parsing.
//!
//! clangd only indexes a project once it has opened a file that appears in
//! `compile_commands.json`. The client reads the database at start and opens
//! the first listed source file to kick indexing off.

use crate::error::ClientError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// File name of the compilation database.
pub const COMPILE_DB_NAME: &str = "compile_commands.json";

/// One compilation database entry. Fields beyond `directory` and `file`
/// (command, arguments, output) are irrelevant to the client and ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct CompileCommand {
    pub directory: PathBuf,
    pub file: PathBuf,
}

/// Locates the compilation database for a workspace.
///
/// Checks the workspace root first, then the conventional `build/`
/// subdirectory.
pub fn find_compile_db(workspace: &Path) -> Result<PathBuf, ClientError> {
    let candidates = [
        workspace.join(COMPILE_DB_NAME),
        workspace.join("build").join(COMPILE_DB_NAME),
    ];
    candidates
        .into_iter()
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| {
            ClientError::compile_db(format!(
                "no {} under {}",
                COMPILE_DB_NAME,
                workspace.display()
            ))
        })
}

/// Reads the database and returns the source file used to trigger indexing.
pub async fn first_source_file(db_path: &Path) -> Result<PathBuf, ClientError> {
    let raw = tokio::fs::read_to_string(db_path).await?;
    let entries: Vec<CompileCommand> = serde_json::from_str(&raw).map_err(|e| {
        ClientError::compile_db(format!("malformed {}: {}", db_path.display(), e))
    })?;

    let entry = entries
        .first()
        .ok_or_else(|| ClientError::compile_db(format!("{} has no entries", db_path.display())))?;

    // an absolute `file` entry overrides `directory`, matching the database
    // format's path resolution
    Ok(entry.directory.join(&entry.file))
}
