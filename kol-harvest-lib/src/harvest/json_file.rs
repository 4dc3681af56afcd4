//! Loading and atomically replacing JSON documents on disk.

use crate::Result;
use ohno::IntoAppError;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const LOG_TARGET: &str = " json_file";

/// Load a document from a file.
pub fn load<T>(path: impl AsRef<Path>, context: impl AsRef<str>) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let path = path.as_ref();
    let ctx = context.as_ref();

    let file = File::open(path).into_app_err_with(|| format!("unable to open file '{}'", path.display()))?;

    let data = serde_json::from_reader(BufReader::new(file))
        .into_app_err_with(|| format!("unable to parse {ctx} file '{}'", path.display()))?;

    log::debug!(target: LOG_TARGET, "Loaded {ctx} from '{}'", path.display());
    Ok(data)
}

/// Write a document next to `path` and rename it into place.
///
/// Readers never observe a partially written file.
pub fn save_atomic<T>(data: &T, path: impl AsRef<Path>) -> Result<()>
where
    T: Serialize,
{
    let path = path.as_ref();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).into_app_err_with(|| format!("unable to create directory '{}'", parent.display()))?;
    }

    let temp_path = temp_path_for(path);
    let file = File::create(&temp_path).into_app_err_with(|| format!("unable to create file '{}'", temp_path.display()))?;
    let mut writer = BufWriter::new(file);

    serde_json::to_writer_pretty(&mut writer, data).into_app_err_with(|| format!("unable to write file '{}'", temp_path.display()))?;
    writer
        .flush()
        .into_app_err_with(|| format!("unable to flush file '{}'", temp_path.display()))?;
    drop(writer);

    fs::rename(&temp_path, path)
        .into_app_err_with(|| format!("unable to move '{}' into place at '{}'", temp_path.display(), path.display()))?;

    log::trace!(target: LOG_TARGET, "Saved '{}'", path.display());
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        value: u64,
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("sample.json");

        let original = Sample {
            name: "x".to_string(),
            value: 42,
        };
        save_atomic(&original, &path).unwrap();

        let loaded: Sample = load(&path, "sample").unwrap();
        assert_eq!(loaded, original);
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn test_save_replaces_existing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("sample.json");
        fs::write(&path, "stale").unwrap();

        save_atomic(&Sample { name: "new".into(), value: 1 }, &path).unwrap();
        let loaded: Sample = load(&path, "sample").unwrap();
        assert_eq!(loaded.name, "new");
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result: Result<Sample> = load(temp_dir.path().join("missing.json"), "sample");
        assert!(result.unwrap_err().to_string().contains("unable to open"));
    }

    #[test]
    fn test_load_invalid_json() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("bad.json");
        fs::write(&path, "not json").unwrap();

        let result: Result<Sample> = load(&path, "sample");
        assert!(result.unwrap_err().to_string().contains("unable to parse sample"));
    }

    #[test]
    fn test_temp_path_sits_beside_target() {
        assert_eq!(temp_path_for(Path::new("out/data.json")), Path::new("out/data.json.tmp"));
    }
}
