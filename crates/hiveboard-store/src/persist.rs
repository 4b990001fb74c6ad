use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

// Each table is one JSON file holding the serialized list of rows. Writes go
// through a temp file and an atomic rename so a crash mid-write never leaves
// a half-serialized table behind.

fn table_path(data_dir: &Path, name: &str) -> PathBuf {
    data_dir.join(format!("{}.json", name))
}

/// Load a table from disk. A missing file is an empty table, not an error.
pub fn load_table<T: DeserializeOwned>(data_dir: &Path, name: &str) -> Result<Vec<T>> {
    let path = table_path(data_dir, name);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(&path)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&content)?)
}

/// Serialize the whole row list to `<name>.json.tmp`, restrict permissions,
/// then rename over the final path.
pub fn save_table<T: Serialize>(data_dir: &Path, name: &str, rows: &[T]) -> Result<()> {
    fs::create_dir_all(data_dir)?;

    let path = table_path(data_dir, name);
    let tmp = data_dir.join(format!("{}.json.tmp", name));

    let content = serde_json::to_string(rows)?;
    fs::write(&tmp, content)?;
    restrict_permissions(&tmp)?;
    fs::rename(&tmp, &path)?;
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Row {
        id: u32,
        label: String,
    }

    #[test]
    fn test_missing_file_is_empty_table() {
        let dir = TempDir::new().unwrap();
        let rows: Vec<Row> = load_table(dir.path(), "events").unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let rows = vec![
            Row {
                id: 1,
                label: "one".to_string(),
            },
            Row {
                id: 2,
                label: "two".to_string(),
            },
        ];

        save_table(dir.path(), "rows", &rows).unwrap();
        let loaded: Vec<Row> = load_table(dir.path(), "rows").unwrap();
        assert_eq!(loaded, rows);

        // No temp file left behind
        assert!(!dir.path().join("rows.json.tmp").exists());
    }

    #[test]
    fn test_serialize_is_stable() {
        let dir = TempDir::new().unwrap();
        let rows = vec![Row {
            id: 7,
            label: "seven".to_string(),
        }];

        save_table(dir.path(), "rows", &rows).unwrap();
        let first = std::fs::read_to_string(dir.path().join("rows.json")).unwrap();

        let loaded: Vec<Row> = load_table(dir.path(), "rows").unwrap();
        save_table(dir.path(), "rows", &loaded).unwrap();
        let second = std::fs::read_to_string(dir.path().join("rows.json")).unwrap();

        assert_eq!(first, second);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_mode_restricted() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        save_table(dir.path(), "rows", &[Row { id: 1, label: "x".to_string() }]).unwrap();

        let mode = std::fs::metadata(dir.path().join("rows.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
