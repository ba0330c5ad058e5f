//! Identity records for a session at each stage of conversion.
//!
//! A [`SourceContext`] names a session before anything is opened. Once the
//! source container and the output document both exist it is resolved into a
//! [`SessionContext`], which owns them until [`SessionContext::finish`].
//! [`OutputContext`] names a session's output alone, for reading results back.

use std::path::PathBuf;

use crate::document::{DocumentStore, NwbDocument};
use crate::error::Result;
use crate::paths::PathLayout;
use crate::reader::SourceContainer;
use crate::types::SessionKey;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceContext {
    key: SessionKey,
}

impl SourceContext {
    pub fn new(key: SessionKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn subject(&self) -> u32 {
        self.key.subject
    }

    pub fn session(&self) -> u32 {
        self.key.session
    }

    pub fn project(&self) -> &str {
        &self.key.project
    }

    pub fn source_path(&self, layout: &PathLayout) -> PathBuf {
        layout.source_container_path(&self.key)
    }

    /// Takes ownership of the open container and the document being built.
    pub fn resolve(self, container: SourceContainer, document: NwbDocument) -> SessionContext {
        SessionContext {
            key: self.key,
            container,
            document,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputContext {
    key: SessionKey,
}

impl OutputContext {
    pub fn new(key: SessionKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn output_path(&self, layout: &PathLayout) -> PathBuf {
        layout.output_document_path(&self.key)
    }
}

/// A session with its source container open and its document in memory.
#[derive(Debug)]
pub struct SessionContext {
    key: SessionKey,
    container: SourceContainer,
    document: NwbDocument,
}

impl SessionContext {
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn container(&self) -> &SourceContainer {
        &self.container
    }

    pub fn document(&self) -> &NwbDocument {
        &self.document
    }

    /// Identity view; the container stays open.
    pub fn as_source(&self) -> SourceContext {
        SourceContext::new(self.key.clone())
    }

    /// Identity view; the document stays owned here.
    pub fn as_output(&self) -> OutputContext {
        OutputContext::new(self.key.clone())
    }

    /// Writes the document to its output path and closes the container.
    ///
    /// Both resources are released whether or not the write succeeds.
    pub fn finish(self, layout: &PathLayout, store: &dyn DocumentStore) -> Result<PathBuf> {
        let SessionContext {
            key,
            container,
            document,
        } = self;
        let path = layout.output_document_path(&key);
        let written = store.write(&document, &path);
        container.close();
        written.map(|()| path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConversionError;
    use crate::reader::minimal_container_bytes;
    use chrono::DateTime;
    use std::fs;
    use std::path::Path;

    struct FailingStore;

    impl DocumentStore for FailingStore {
        fn write(&self, _: &NwbDocument, _: &Path) -> Result<()> {
            Err(ConversionError::Document("disk full".to_string()))
        }

        fn read(&self, _: &Path) -> Result<NwbDocument> {
            unreachable!()
        }
    }

    fn session(dir: &Path) -> (PathLayout, SessionContext) {
        let layout = PathLayout::new(dir);
        let source = SourceContext::new(SessionKey::new(1, 1, "demo"));
        let path = source.source_path(&layout);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, minimal_container_bytes()).unwrap();

        let container = SourceContainer::open(&path).unwrap();
        let start = DateTime::parse_from_rfc3339("2020-01-01T09:00:00+01:00").unwrap();
        let document = NwbDocument::new("id", "desc", start);
        (layout, source.resolve(container, document))
    }

    #[test]
    fn test_projections_keep_identity() {
        let dir = tempfile::tempdir().unwrap();
        let (_, ctx) = session(dir.path());

        let source = ctx.as_source();
        let output = ctx.as_output();
        assert_eq!(source.key(), ctx.key());
        assert_eq!(output.key(), ctx.key());
        assert_eq!(source.project(), "demo");
        // Projections do not release anything
        assert_eq!(ctx.container().summary().superblock_version, 2);
        assert_eq!(ctx.document().identifier, "id");
    }

    #[test]
    fn test_finish_writes_to_output_path() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, ctx) = session(dir.path());
        let expected = ctx.as_output().output_path(&layout);

        let written = ctx.finish(&layout, &crate::document::JsonDocumentStore).unwrap();
        assert_eq!(written, expected);
        assert!(written.ends_with("out/converted/demo/subject01_session01.nwb"));
        assert!(written.exists());
    }

    #[test]
    fn test_finish_reports_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, ctx) = session(dir.path());
        let output = ctx.as_output().output_path(&layout);

        assert!(ctx.finish(&layout, &FailingStore).is_err());
        assert!(!output.exists());
    }
}
