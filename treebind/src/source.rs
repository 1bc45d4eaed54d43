//! Byte sources backing registered documents
//!
//! A source supplies an opening stream plus a best-known modification
//! time. Collaborators hand these to the document registry; the engine
//! never persists document content itself.

use std::fs::{self, File};
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

/// Capability supplied by the embedding application for each document.
pub trait ByteSource: Send + Sync {
    /// Open a fresh stream over the current content.
    fn open(&self) -> Result<Box<dyn Read + Send>>;

    /// Best-known modification time of the underlying content.
    fn last_modified(&self) -> Result<DateTime<Utc>>;

    /// Short description used in error messages and logs.
    fn describe(&self) -> String;
}

// Shared sources can be registered while the caller keeps a handle, e.g.
// to mutate a MemorySource after registration.
impl<S: ByteSource + ?Sized> ByteSource for Arc<S> {
    fn open(&self) -> Result<Box<dyn Read + Send>> {
        (**self).open()
    }

    fn last_modified(&self) -> Result<DateTime<Utc>> {
        (**self).last_modified()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Document source backed by a file on disk
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSource { path: path.into() }
    }
}

impl ByteSource for FileSource {
    fn open(&self) -> Result<Box<dyn Read + Send>> {
        let file = File::open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        Ok(Box::new(file))
    }

    fn last_modified(&self) -> Result<DateTime<Utc>> {
        let metadata = fs::metadata(&self.path)
            .with_context(|| format!("reading metadata of {}", self.path.display()))?;
        let modified = metadata
            .modified()
            .with_context(|| format!("reading modification time of {}", self.path.display()))?;
        Ok(DateTime::<Utc>::from(modified))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory document source with a controllable modification time.
///
/// Replacing the content bumps the modification time to now; tests and
/// applications that push content programmatically can also set the time
/// explicitly.
pub struct MemorySource {
    state: Mutex<MemoryState>,
}

struct MemoryState {
    content: String,
    modified: DateTime<Utc>,
}

impl MemorySource {
    pub fn new(content: impl Into<String>) -> Self {
        MemorySource {
            state: Mutex::new(MemoryState {
                content: content.into(),
                modified: Utc::now(),
            }),
        }
    }

    /// Replace the content and bump the modification time
    pub fn set_content(&self, content: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        state.content = content.into();
        state.modified = Utc::now();
    }

    /// Set the modification time without touching the content
    pub fn set_modified(&self, modified: DateTime<Utc>) {
        self.state.lock().unwrap().modified = modified;
    }
}

impl ByteSource for MemorySource {
    fn open(&self) -> Result<Box<dyn Read + Send>> {
        let content = self.state.lock().unwrap().content.clone();
        Ok(Box::new(Cursor::new(content.into_bytes())))
    }

    fn last_modified(&self) -> Result<DateTime<Utc>> {
        Ok(self.state.lock().unwrap().modified)
    }

    fn describe(&self) -> String {
        "in-memory source".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(source: &dyn ByteSource) -> String {
        let mut out = String::new();
        source.open().unwrap().read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_memory_source_set_content_bumps_modified() {
        let source = MemorySource::new("<a/>");
        let before = source.last_modified().unwrap();

        source.set_content("<b/>");

        assert_eq!(read_all(&source), "<b/>");
        assert!(source.last_modified().unwrap() >= before);
    }

    #[test]
    fn test_memory_source_set_modified() {
        let source = MemorySource::new("<a/>");
        let later = Utc::now() + chrono::Duration::seconds(60);

        source.set_modified(later);

        assert_eq!(source.last_modified().unwrap(), later);
        assert_eq!(read_all(&source), "<a/>");
    }

    #[test]
    fn test_file_source() {
        let path = std::env::temp_dir().join(format!("treebind-source-{}.xml", std::process::id()));
        fs::write(&path, "<root><a/></root>").unwrap();

        let source = FileSource::new(path.clone());
        assert_eq!(read_all(&source), "<root><a/></root>");
        assert!(source.last_modified().is_ok());
        assert!(source.describe().contains("treebind-source"));

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_file_source_missing_file_errors() {
        let source = FileSource::new("/nonexistent/treebind.xml");
        assert!(source.open().is_err());
        assert!(source.last_modified().is_err());
    }
}
