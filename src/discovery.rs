//! Scans a project's container directory for per-session source files.

use regex::Regex;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{ConversionError, Result};
use crate::paths::PathLayout;

/// Two or more digits, so every name `source_container_filename` produces
/// (including three-digit subjects) is found again.
const CONTAINER_PATTERN: &str = r"^Data_Subject_(\d{2,})_Session_(\d{2,})\.h5$";

fn container_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(CONTAINER_PATTERN).expect("container pattern is valid"))
}

/// Parses `(subject, session)` out of a container filename.
pub fn parse_container_filename(name: &str) -> Option<(u32, u32)> {
    let caps = container_pattern().captures(name)?;
    let subject = caps[1].parse().ok()?;
    let session = caps[2].parse().ok()?;
    Some((subject, session))
}

/// subject -> session -> container path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryIndex {
    subjects: BTreeMap<u32, BTreeMap<u32, PathBuf>>,
}

impl DiscoveryIndex {
    /// Builds the index from one directory listing.
    ///
    /// Entries are visited in filename order. Names that do not match the
    /// container pattern are skipped. Two names resolving to the same
    /// `(subject, session)` (`..._01_...` and `..._001_...`) are rejected.
    pub fn scan<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            // Follows symlinks; dangling links are skipped
            if path.is_file() {
                entries.push(path);
            }
        }
        entries.sort();

        let mut index = Self::default();
        for path in entries {
            let parsed = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(parse_container_filename);
            match parsed {
                Some((subject, session)) => index.insert(subject, session, path)?,
                None => log::debug!("Skipping {}", path.display()),
            }
        }

        log::info!(
            "Found {} session(s) for {} subject(s) in {}",
            index.len(),
            index.subjects.len(),
            dir.display()
        );
        Ok(index)
    }

    fn insert(&mut self, subject: u32, session: u32, path: PathBuf) -> Result<()> {
        match self.subjects.entry(subject).or_default().entry(session) {
            Entry::Vacant(slot) => {
                slot.insert(path);
                Ok(())
            }
            Entry::Occupied(existing) => Err(ConversionError::DuplicateSession {
                subject,
                session,
                first: existing.get().clone(),
                second: path,
            }),
        }
    }

    pub fn get(&self, subject: u32, session: u32) -> Option<&Path> {
        self.subjects
            .get(&subject)
            .and_then(|sessions| sessions.get(&session))
            .map(PathBuf::as_path)
    }

    pub fn subject(&self, subject: u32) -> Option<&BTreeMap<u32, PathBuf>> {
        self.subjects.get(&subject)
    }

    pub fn subjects(&self) -> &BTreeMap<u32, BTreeMap<u32, PathBuf>> {
        &self.subjects
    }

    /// All `(subject, session, path)` triples in ascending order.
    pub fn sessions(&self) -> impl Iterator<Item = (u32, u32, &Path)> + '_ {
        self.subjects.iter().flat_map(|(subject, sessions)| {
            sessions
                .iter()
                .map(move |(session, path)| (*subject, *session, path.as_path()))
        })
    }

    pub fn len(&self) -> usize {
        self.subjects.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scans the container directory of `project`.
pub fn discover_sessions(layout: &PathLayout, project: &str) -> Result<DiscoveryIndex> {
    DiscoveryIndex::scan(layout.source_container_dir(project))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn touch(dir: &Path, name: &str) {
        File::create(dir.join(name)).unwrap();
    }

    #[test]
    fn test_parse_container_filename() {
        assert_eq!(parse_container_filename("Data_Subject_01_Session_02.h5"), Some((1, 2)));
        assert_eq!(parse_container_filename("Data_Subject_123_Session_02.h5"), Some((123, 2)));
        assert_eq!(parse_container_filename("Data_Subject_1_Session_02.h5"), None);
        assert_eq!(parse_container_filename("Data_Subject_01_Session_02.h5.bak"), None);
        assert_eq!(parse_container_filename("copy_Data_Subject_01_Session_02.h5"), None);
        assert_eq!(parse_container_filename("notes.txt"), None);
    }

    #[test]
    fn test_scan_skips_non_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "Data_Subject_01_Session_02.h5");
        touch(dir.path(), "notes.txt");

        let index = DiscoveryIndex::scan(dir.path()).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.get(1, 2),
            Some(dir.path().join("Data_Subject_01_Session_02.h5").as_path())
        );
        assert_eq!(index.subjects().keys().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_scan_groups_sessions_by_subject() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "Data_Subject_02_Session_01.h5");
        touch(dir.path(), "Data_Subject_01_Session_02.h5");
        touch(dir.path(), "Data_Subject_01_Session_01.h5");
        fs::create_dir(dir.path().join("Data_Subject_09_Session_09.h5")).unwrap();

        let index = DiscoveryIndex::scan(dir.path()).unwrap();
        let keys: Vec<(u32, u32)> = index.sessions().map(|(s, n, _)| (s, n)).collect();
        assert_eq!(keys, vec![(1, 1), (1, 2), (2, 1)]);
        assert_eq!(index.subject(1).map(BTreeMap::len), Some(2));
    }

    // Colliding names fail instead of the later listing entry overwriting the earlier.
    #[test]
    fn test_scan_rejects_duplicate_sessions() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "Data_Subject_01_Session_02.h5");
        touch(dir.path(), "Data_Subject_001_Session_02.h5");

        match DiscoveryIndex::scan(dir.path()) {
            Err(ConversionError::DuplicateSession {
                subject,
                session,
                first,
                second,
            }) => {
                assert_eq!((subject, session), (1, 2));
                assert!(first.ends_with("Data_Subject_001_Session_02.h5"));
                assert!(second.ends_with("Data_Subject_01_Session_02.h5"));
            }
            other => panic!("expected duplicate error, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_follows_symlinked_containers() {
        let store = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        touch(store.path(), "recording.h5");
        std::os::unix::fs::symlink(
            store.path().join("recording.h5"),
            dir.path().join("Data_Subject_01_Session_01.h5"),
        )
        .unwrap();
        std::os::unix::fs::symlink(
            store.path().join("absent.h5"),
            dir.path().join("Data_Subject_02_Session_01.h5"),
        )
        .unwrap();

        let index = DiscoveryIndex::scan(dir.path()).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.get(1, 1),
            Some(dir.path().join("Data_Subject_01_Session_01.h5").as_path())
        );
    }

    #[test]
    fn test_scan_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            DiscoveryIndex::scan(dir.path().join("absent")),
            Err(ConversionError::Io(_))
        ));
    }
}
