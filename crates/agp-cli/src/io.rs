//! Artifact files in and out

use agp_artifact::{Artifact, ArtifactKind};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::io::{Read, Write};
use std::path::Path;

/// Read a JSON document; `-` reads stdin
///
/// # Errors
/// Returns error if the source cannot be read or is not JSON
pub fn read_json(path: &Path) -> Result<Value> {
    let text = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?
    };
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

/// Read and verify an artifact of kind `K`
///
/// # Errors
/// Returns error if the file is unreadable or the artifact fails verification
pub fn read_artifact<K: ArtifactKind>(path: &Path) -> Result<Artifact<K>> {
    let value = read_json(path)?;
    Artifact::from_value(value)
        .with_context(|| format!("{} is not a valid {} artifact", path.display(), K::TYPE_ID))
}

/// Read a JSON array of `T`
///
/// # Errors
/// Returns error if the file is unreadable or has the wrong shape
pub fn read_list<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let value = read_json(path)?;
    serde_json::from_value(value)
        .with_context(|| format!("unexpected contents in {}", path.display()))
}

/// Read one JSON object of `T`
///
/// # Errors
/// Returns error if the file is unreadable or has the wrong shape
pub fn read_object<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let value = read_json(path)?;
    serde_json::from_value(value)
        .with_context(|| format!("unexpected contents in {}", path.display()))
}

/// Write an artifact as pretty JSON to `out`, or stdout
///
/// # Errors
/// Returns error if serialization or the write fails
pub fn emit<K: ArtifactKind>(artifact: &Artifact<K>, out: Option<&Path>) -> Result<()> {
    let mut json = artifact.to_json_pretty()?;
    json.push('\n');
    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(json.as_bytes()).context("failed to write stdout")?;
            stdout.flush().context("failed to flush stdout")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agp_core::Edit;

    #[test]
    fn test_read_list_of_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edits.json");
        std::fs::write(
            &path,
            r#"[{"path": "docs/a.md", "operation": "create", "justification": "new page"}]"#,
        )
        .unwrap();

        let edits: Vec<Edit> = read_list(&path).unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].path, "docs/a.md");
    }

    #[test]
    fn test_read_json_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();

        let err = read_json(&path).unwrap_err();
        assert!(err.to_string().contains("is not valid JSON"));
    }
}
