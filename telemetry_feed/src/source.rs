//! Reading raw logger documents from disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::document::RawDocument;
use crate::error::{FeedError, Result};

/// Extension of logger exports.
pub const DOCUMENT_EXTENSION: &str = "txt";

/// Documents read from a directory, plus the ones that could not be read.
#[derive(Debug, Default)]
pub struct DocumentSet {
    pub documents: Vec<RawDocument>,
    pub failures: Vec<FeedError>,
}

/// Reads every `.txt` file directly inside `dir`, in file-name order.
///
/// Failing to list the directory is fatal. A single unreadable file (for
/// example one that is not UTF-8) is recorded in [`DocumentSet::failures`]
/// and the rest are still read.
pub fn read_directory(dir: impl AsRef<Path>) -> Result<DocumentSet> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|e| FeedError::io(dir, e))?;

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| FeedError::io(dir, e))?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == DOCUMENT_EXTENSION) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut set = DocumentSet::default();
    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        match fs::read_to_string(&path) {
            Ok(text) => set.documents.push(RawDocument::new(name, text)),
            Err(e) => {
                tracing::warn!("skipping unreadable document {}: {}", path.display(), e);
                set.failures.push(FeedError::io(path, e));
            }
        }
    }
    tracing::info!(
        "read {} documents from {} ({} unreadable)",
        set.documents.len(),
        dir.display(),
        set.failures.len()
    );
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_only_text_documents_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "second").unwrap();
        fs::write(dir.path().join("a.txt"), "first").unwrap();
        fs::write(dir.path().join("notes.md"), "ignored").unwrap();
        fs::write(dir.path().join("c.txt"), [0xff, 0xfe, 0x00]).unwrap();

        let set = read_directory(dir.path()).unwrap();
        let names: Vec<&str> = set.documents.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
        assert_eq!(set.documents[0].text, "first");
        assert_eq!(set.failures.len(), 1);
    }

    #[test]
    fn missing_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_directory(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, FeedError::Io { .. }));
    }
}
