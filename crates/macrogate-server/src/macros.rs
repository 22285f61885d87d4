//! Macro files: lookup for `run_macro` and `validate_macro_code`, writes for
//! `update_macro`.

use std::path::{Component, Path, PathBuf};

use macrogate_error::DispatchError;
use serde_json::{Map, Value};

/// File extension every macro must carry.
pub const MACRO_EXTENSION: &str = ".FCMacro";

/// Parameter naming the target document; never injected into the script.
pub const DOC_NAME_PARAM: &str = "doc_name";

/// Resolve `raw` to an existing macro file.
///
/// Absolute paths are used as given. Relative paths resolve against
/// `macro_dir`, then against `macro_dir` with [`MACRO_EXTENSION`] appended,
/// and may not contain `..`.
pub fn resolve(macro_dir: Option<&Path>, raw: &str, param: &str) -> Result<PathBuf, DispatchError> {
    if raw.trim().is_empty() {
        return Err(DispatchError::InvalidParam {
            name: param.to_string(),
            reason: "must not be empty".into(),
        });
    }

    let path = Path::new(raw);
    let candidates = if path.is_absolute() {
        vec![path.to_path_buf()]
    } else {
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(DispatchError::InvalidParam {
                name: param.to_string(),
                reason: "must not leave the macro directory".into(),
            });
        }
        let dir = macro_dir.ok_or_else(|| DispatchError::InvalidParam {
            name: param.to_string(),
            reason: "relative macro paths need a configured macro directory".into(),
        })?;
        let mut candidates = vec![dir.join(path)];
        if !raw.ends_with(MACRO_EXTENSION) {
            candidates.push(dir.join(format!("{raw}{MACRO_EXTENSION}")));
        }
        candidates
    };

    let Some(found) = candidates.iter().find(|p| p.is_file()) else {
        let searched: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
        tracing::warn!(macro_path = raw, searched = ?searched, "macro file not found");
        return Err(DispatchError::Handler {
            command: "run_macro".into(),
            message: format!("Macro file does not exist: {raw}"),
        });
    };

    if !found.to_string_lossy().ends_with(MACRO_EXTENSION) {
        return Err(DispatchError::Handler {
            command: "run_macro".into(),
            message: format!("Macro file must end with {MACRO_EXTENSION}"),
        });
    }
    tracing::debug!(path = %found.display(), "found macro file");
    Ok(found.clone())
}

/// Read a resolved macro file.
pub fn read(path: &Path) -> Result<String, DispatchError> {
    std::fs::read_to_string(path).map_err(|e| DispatchError::Handler {
        command: "run_macro".into(),
        message: format!("Failed to read macro file {}: {e}", path.display()),
    })
}

/// Write `code` to `<macro_dir>/<name>.FCMacro`, replacing any existing file.
///
/// `name` is relative to the macro directory and may not contain `..`. The
/// extension is appended unless `name` already carries it.
pub fn write(macro_dir: Option<&Path>, name: &str, code: &str) -> Result<PathBuf, DispatchError> {
    let invalid = |reason: &str| DispatchError::InvalidParam {
        name: "macro_name".into(),
        reason: reason.to_string(),
    };
    if name.trim().is_empty() {
        return Err(invalid("must not be empty"));
    }
    let relative = Path::new(name);
    if relative.is_absolute()
        || relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
    {
        return Err(invalid("must not leave the macro directory"));
    }
    let dir = macro_dir.ok_or_else(|| invalid("updating macros needs a configured macro directory"))?;

    let path = if name.ends_with(MACRO_EXTENSION) {
        dir.join(relative)
    } else {
        dir.join(format!("{name}{MACRO_EXTENSION}"))
    };
    std::fs::write(&path, code).map_err(|e| DispatchError::Handler {
        command: "update_macro".into(),
        message: format!("Failed to write macro file {}: {e}", path.display()),
    })?;
    tracing::info!(path = %path.display(), bytes = code.len(), "macro file updated");
    Ok(path)
}

/// The document a macro run targets.
///
/// Taken from a non-empty `doc_name` parameter, else the macro's file stem.
/// Characters outside `[A-Za-z0-9_-]` become `_`, and an empty or all-digit
/// name gets a `Document_` prefix.
pub fn document_name(path: &Path, params: &Map<String, Value>) -> String {
    let raw = match params.get(DOC_NAME_PARAM) {
        Some(Value::String(name)) if !name.is_empty() => name.clone(),
        _ => path
            .file_name()
            .map(|f| f.to_string_lossy())
            .map(|f| f.strip_suffix(MACRO_EXTENSION).unwrap_or(f.as_ref()).to_string())
            .unwrap_or_default(),
    };

    let name: String = raw
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if name.is_empty() || name.chars().all(|c| c.is_ascii_digit()) {
        format!("Document_{name}")
    } else {
        name
    }
}
