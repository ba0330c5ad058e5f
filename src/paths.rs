//! On-disk directory convention for inputs and outputs.
//!
//! ```text
//! <project-dir>/
//!   in/metadata/participants.csv
//!   in/to_convert/<project>/data_nix/Data_Subject_01_Session_01.h5
//!   in/to_convert/<project>/micro_data/
//!   out/converted/<project>/subject01_session01.nwb
//! ```
//!
//! Nothing here touches the filesystem.

use std::path::{Path, PathBuf};

use crate::types::SessionKey;

/// Resolves every input and output location from a project directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathLayout {
    project_dir: PathBuf,
}

impl PathLayout {
    pub fn new<P: Into<PathBuf>>(project_dir: P) -> Self {
        Self {
            project_dir: project_dir.into(),
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn in_dir(&self) -> PathBuf {
        self.project_dir.join("in")
    }

    pub fn out_dir(&self) -> PathBuf {
        self.project_dir.join("out")
    }

    /// Directory holding the project's NIX containers.
    pub fn source_container_dir(&self, project: &str) -> PathBuf {
        self.to_convert_dir(project).join("data_nix")
    }

    pub fn source_container_path(&self, key: &SessionKey) -> PathBuf {
        self.source_container_dir(&key.project)
            .join(source_container_filename(key.subject, key.session))
    }

    /// Directory holding the project's MATLAB-exported micro-electrode recordings.
    pub fn micro_data_dir(&self, project: &str) -> PathBuf {
        self.to_convert_dir(project).join("micro_data")
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.in_dir().join("metadata").join("participants.csv")
    }

    pub fn output_dir(&self, project: &str) -> PathBuf {
        self.out_dir().join("converted").join(project)
    }

    pub fn output_document_path(&self, key: &SessionKey) -> PathBuf {
        self.output_dir(&key.project)
            .join(output_document_filename(key.subject, key.session))
    }

    fn to_convert_dir(&self, project: &str) -> PathBuf {
        self.in_dir().join("to_convert").join(project)
    }
}

pub fn source_container_filename(subject: u32, session: u32) -> String {
    format!("Data_Subject_{:02}_Session_{:02}.h5", subject, session)
}

pub fn output_document_filename(subject: u32, session: u32) -> String {
    format!("subject{:02}_session{:02}.nwb", subject, session)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> PathLayout {
        PathLayout::new("/data/usz")
    }

    #[test]
    fn test_source_container_path() {
        let key = SessionKey::new(3, 1, "demo");
        assert_eq!(
            layout().source_container_path(&key),
            PathBuf::from("/data/usz/in/to_convert/demo/data_nix/Data_Subject_03_Session_01.h5")
        );
    }

    #[test]
    fn test_output_document_path() {
        let key = SessionKey::new(1, 12, "demo");
        assert_eq!(
            layout().output_document_path(&key),
            PathBuf::from("/data/usz/out/converted/demo/subject01_session12.nwb")
        );
    }

    #[test]
    fn test_auxiliary_paths() {
        assert_eq!(
            layout().micro_data_dir("demo"),
            PathBuf::from("/data/usz/in/to_convert/demo/micro_data")
        );
        assert_eq!(
            layout().metadata_path(),
            PathBuf::from("/data/usz/in/metadata/participants.csv")
        );
    }

    #[test]
    fn test_padding_never_truncates() {
        assert_eq!(source_container_filename(123, 7), "Data_Subject_123_Session_07.h5");
        assert_eq!(output_document_filename(3, 100), "subject03_session100.nwb");
    }

    #[test]
    fn test_resolution_is_pure() {
        let key = SessionKey::new(5, 6, "demo");
        assert_eq!(
            layout().output_document_path(&key),
            layout().output_document_path(&key)
        );
        assert!(!layout().output_dir("demo").exists());
    }
}
