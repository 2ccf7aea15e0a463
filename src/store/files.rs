use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{AgoraError, Result};

/// Read and parse a whole JSON document.
///
/// A missing file is `Ok(None)`; a file that exists but does not parse is
/// [`AgoraError::Corrupt`], never an empty document.
pub fn read_document<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| AgoraError::Corrupt(path.display().to_string(), e.to_string()))
}

/// Replace a whole JSON document: write a sibling temp file, then rename it
/// over the target so readers never see a half-written document.
pub fn write_document<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(format!(".{}.tmp", std::process::id()));
    let tmp = path.with_file_name(tmp_name);
    fs::write(&tmp, json)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// File size and nanosecond mtime.
pub type Fingerprint = (u64, u128);

/// Cheap change detector for a file (stat only, no read). A missing file
/// fingerprints as `(0, 0)`.
pub fn fingerprint(path: &Path) -> Result<Fingerprint> {
    match fs::metadata(path) {
        Ok(meta) => {
            let mtime = meta
                .modified()?
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos();
            Ok((meta.len(), mtime))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok((0, 0)),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[test]
    fn missing_document_is_none() {
        let dir = tempdir().unwrap();
        let doc: Option<BTreeMap<String, u64>> =
            read_document(&dir.path().join("absent.json")).unwrap();
        assert!(doc.is_none());
    }

    #[test]
    fn write_then_read_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");
        let mut doc = BTreeMap::new();
        doc.insert("a".to_string(), 1u64);

        write_document(&path, &doc).unwrap();
        let back: BTreeMap<String, u64> = read_document(&path).unwrap().unwrap();
        assert_eq!(back, doc);

        let entries: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn unparsable_document_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        fs::write(&path, "{not json").unwrap();

        let err = read_document::<BTreeMap<String, u64>>(&path).unwrap_err();
        assert!(matches!(err, AgoraError::Corrupt(_, _)));
        assert_eq!(err.code(), "corrupt_document");
    }

    #[test]
    fn fingerprint_changes_on_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        assert_eq!(fingerprint(&path).unwrap(), (0, 0));

        fs::write(&path, "one\n").unwrap();
        let first = fingerprint(&path).unwrap();
        fs::write(&path, "one\ntwo\n").unwrap();
        let second = fingerprint(&path).unwrap();
        assert_ne!(first, second);
    }
}
