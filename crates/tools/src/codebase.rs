//! Codebase read tools — read-only file access constrained to a
//! configured workspace root.
//!
//! Paths containing `..`, absolute paths, or paths resolving outside
//! the root are rejected before any I/O happens.

use std::path::{Component, Path, PathBuf};

use serde_json::{json, Map, Value};
use tokio::fs;

/// Caps keeping tool output bounded for the model context.
const READ_MAX_CHARS: usize = 40_000;
const LIST_MAX_ENTRIES: usize = 500;
const SEARCH_MAX_MATCHES: usize = 100;
const SEARCH_MAX_FILE_BYTES: u64 = 1_000_000;

type ToolOutput = Result<Map<String, Value>, String>;

fn ok(value: Value) -> ToolOutput {
    match value {
        Value::Object(map) => Ok(map),
        _ => unreachable!("tool outputs are objects"),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Path validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Validate and resolve a requested path within the workspace root.
pub fn validate_path(root: &Path, requested: &str) -> Result<PathBuf, String> {
    let requested_path = Path::new(requested);
    if requested_path.is_absolute() {
        return Err(format!(
            "absolute paths are not allowed; use a path relative to the workspace root (got '{requested}')"
        ));
    }
    for component in requested_path.components() {
        if matches!(component, Component::ParentDir) {
            return Err("path must not contain '..' components".to_owned());
        }
    }

    let canonical_root = root
        .canonicalize()
        .map_err(|e| format!("cannot resolve workspace root '{}': {e}", root.display()))?;
    let candidate = canonical_root.join(requested_path);
    let resolved = candidate
        .canonicalize()
        .map_err(|e| format!("cannot resolve path '{}': {e}", candidate.display()))?;

    if !resolved.starts_with(&canonical_root) {
        return Err(format!(
            "path '{}' resolves outside the workspace root",
            requested
        ));
    }
    Ok(resolved)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `codebase.read_file` — return the text content of one file.
pub async fn read_file(root: &Path, path: &str) -> ToolOutput {
    let resolved = validate_path(root, path)?;
    let content = fs::read_to_string(&resolved)
        .await
        .map_err(|e| format!("cannot read '{path}': {e}"))?;
    let truncated = content.len() > READ_MAX_CHARS;
    let content = if truncated {
        let mut end = READ_MAX_CHARS;
        while !content.is_char_boundary(end) {
            end -= 1;
        }
        content[..end].to_owned()
    } else {
        content
    };
    ok(json!({
        "success": true,
        "path": path,
        "content": content,
        "truncated": truncated,
    }))
}

/// `codebase.list_directory` — entries of one directory, dirs first.
pub async fn list_directory(root: &Path, path: &str) -> ToolOutput {
    let resolved = validate_path(root, path)?;
    let mut read_dir = fs::read_dir(&resolved)
        .await
        .map_err(|e| format!("cannot list '{path}': {e}"))?;

    let mut entries = Vec::new();
    while let Some(entry) = read_dir
        .next_entry()
        .await
        .map_err(|e| format!("cannot list '{path}': {e}"))?
    {
        let meta = entry.metadata().await.ok();
        entries.push(json!({
            "name": entry.file_name().to_string_lossy(),
            "is_dir": meta.as_ref().map(|m| m.is_dir()).unwrap_or(false),
            "size": meta.as_ref().map(|m| m.len()).unwrap_or(0),
        }));
        if entries.len() >= LIST_MAX_ENTRIES {
            break;
        }
    }
    entries.sort_by(|a, b| {
        let dir_order = b["is_dir"]
            .as_bool()
            .unwrap_or(false)
            .cmp(&a["is_dir"].as_bool().unwrap_or(false));
        dir_order.then_with(|| {
            a["name"]
                .as_str()
                .unwrap_or("")
                .cmp(b["name"].as_str().unwrap_or(""))
        })
    });
    ok(json!({
        "success": true,
        "path": path,
        "entries": entries,
    }))
}

/// `codebase.search` — regex search across text files under a subtree.
pub async fn search(root: &Path, pattern: &str, path: &str) -> ToolOutput {
    let re = regex::Regex::new(pattern).map_err(|e| format!("invalid pattern: {e}"))?;
    let start = validate_path(root, path)?;

    let mut matches = Vec::new();
    let mut stack = vec![start];
    while let Some(dir) = stack.pop() {
        let Ok(mut read_dir) = fs::read_dir(&dir).await else {
            continue;
        };
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let entry_path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if meta.is_dir() {
                stack.push(entry_path);
                continue;
            }
            if meta.len() > SEARCH_MAX_FILE_BYTES {
                continue;
            }
            let Ok(content) = fs::read_to_string(&entry_path).await else {
                continue; // binary or unreadable
            };
            let rel = entry_path
                .strip_prefix(root.canonicalize().map_err(|e| e.to_string())?)
                .unwrap_or(&entry_path)
                .to_string_lossy()
                .to_string();
            for (line_no, line) in content.lines().enumerate() {
                if re.is_match(line) {
                    matches.push(json!({
                        "file": rel,
                        "line": line_no + 1,
                        "text": line.chars().take(200).collect::<String>(),
                    }));
                    if matches.len() >= SEARCH_MAX_MATCHES {
                        return ok(json!({
                            "success": true,
                            "pattern": pattern,
                            "matches": matches,
                            "truncated": true,
                        }));
                    }
                }
            }
        }
    }
    ok(json!({
        "success": true,
        "pattern": pattern,
        "matches": matches,
        "truncated": false,
    }))
}
