//! Write a Coder's `files_to_create` onto disk. Rejects any path that
//! escapes the workspace (absolute paths, `..` segments) rather than
//! silently sandboxing it.

use std::path::{Component, Path};

use aav3_core::{AppError, FileSpec};

pub fn materialize(workspace_dir: &Path, files: &[FileSpec]) -> Result<Vec<String>, AppError> {
    let mut written = Vec::with_capacity(files.len());
    for file in files {
        let rel = validate_relative_path(&file.path)?;
        let target = workspace_dir.join(&rel);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::FilesystemError {
                path: parent.display().to_string(),
                reason: e.to_string(),
            })?;
        }
        std::fs::write(&target, &file.content).map_err(|e| AppError::FilesystemError {
            path: target.display().to_string(),
            reason: e.to_string(),
        })?;
        written.push(file.path.clone());
    }
    Ok(written)
}

fn validate_relative_path(path: &str) -> Result<std::path::PathBuf, AppError> {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        return Err(AppError::FilesystemError {
            path: path.to_string(),
            reason: "absolute paths are not allowed in files_to_create".to_string(),
        });
    }
    for component in candidate.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(AppError::FilesystemError {
                    path: path.to_string(),
                    reason: "'..' segments are not allowed in files_to_create".to_string(),
                });
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(AppError::FilesystemError {
                    path: path.to_string(),
                    reason: "absolute paths are not allowed in files_to_create".to_string(),
                });
            }
        }
    }
    Ok(candidate.to_path_buf())
}
