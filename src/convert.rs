//! Session conversion and the per-project batch driver.

use chrono::DateTime;
use chrono_tz::Tz;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::ConverterConfig;
use crate::context::{OutputContext, SourceContext};
use crate::discovery::discover_sessions;
use crate::document::{DocumentStore, NwbDocument, SubjectInfo};
use crate::error::{ConversionError, Result};
use crate::metadata::{MetadataRow, MetadataTable};
use crate::reader::SourceContainer;
use crate::types::SessionKey;

/// Outcome of converting every discovered session of a project.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub converted: Vec<(SessionKey, PathBuf)>,
    pub failed: Vec<(SessionKey, ConversionError)>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.converted.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Builds the output document for one session from its metadata row.
pub fn build_document(
    config: &ConverterConfig,
    row: &MetadataRow,
    start: DateTime<Tz>,
    source_file: &Path,
) -> Result<NwbDocument> {
    let key = row.key();
    let mut document = NwbDocument::new(
        format!("{}_sub{:02}_ses{:02}", key.project, key.subject, key.session),
        config.session_description.clone(),
        start.fixed_offset(),
    );
    document.session_id = format!("{:02}", key.session);
    document.experimenter = config.experimenter.clone();
    document.lab = config.lab.clone();
    document.institution = config.institution.clone();
    document.experiment_description = config.experiment_description.clone();
    document.source_file = source_file.display().to_string();
    document.subject = Some(SubjectInfo {
        subject_id: format!("{:02}", key.subject),
        age: format!("P{}Y", row.age),
        sex: row.sex().as_str().to_string(),
        species: config.species.clone(),
        description: row.pathology.clone(),
        handedness: row.handedness.clone(),
        electrodes_analysed: row.electrodes_analysed.clone(),
        seizure_onset_zone: row.soz_electrodes.clone(),
    });

    let device = &config.device;
    document.create_device(&device.name, &device.description, &device.manufacturer)?;
    document.add_electrode_layout(&device.name, &config.electrodes)?;
    Ok(document)
}

/// Converts one session and returns the path of the written document.
///
/// The source container is read from its canonical location in the project
/// layout. Nothing is written unless every step succeeds; the source
/// container is closed on every exit path.
pub fn convert_session(
    config: &ConverterConfig,
    table: &MetadataTable,
    key: &SessionKey,
    store: &dyn DocumentStore,
) -> Result<PathBuf> {
    let source_path = config.layout().source_container_path(key);
    convert_session_at(config, table, key, &source_path, store)
}

/// Converts one session whose source container lives at `source_path`.
///
/// Used by the batch driver, which opens exactly the file discovery found
/// (`Data_Subject_001_Session_02.h5` as well as `Data_Subject_01_Session_02.h5`).
pub fn convert_session_at(
    config: &ConverterConfig,
    table: &MetadataTable,
    key: &SessionKey,
    source_path: &Path,
    store: &dyn DocumentStore,
) -> Result<PathBuf> {
    let layout = config.layout();
    let tz = config.tz()?;
    let source = SourceContext::new(key.clone());

    let row = table.lookup(source.key())?;
    let start = row.session_start_in(tz)?;
    let container = SourceContainer::open(source_path)?;
    let document = build_document(config, row, start, container.path())?;

    let session = source.resolve(container, document);
    let path = session.finish(&layout, store)?;
    log::info!("Converted {} -> {}", key, path.display());
    Ok(path)
}

/// Converts every session found in the project's container directory.
///
/// The metadata table is read once and shared by all sessions. A failing
/// session is recorded in the summary and the rest continue; only a bad
/// table, configuration, or directory scan aborts the run.
pub fn convert_project(
    config: &ConverterConfig,
    project: &str,
    store: &dyn DocumentStore,
) -> Result<BatchSummary> {
    let tic = Instant::now();
    config.validate()?;
    let layout = config.layout();
    let table = MetadataTable::load(layout.metadata_path())?;
    let index = discover_sessions(&layout, project)?;

    let sessions: Vec<(SessionKey, &Path)> = index
        .sessions()
        .map(|(subject, session, path)| (SessionKey::new(subject, session, project), path))
        .collect();

    let results: Vec<(SessionKey, Result<PathBuf>)> = sessions
        .into_par_iter()
        .map(|(key, source_path)| {
            let result = convert_session_at(config, &table, &key, source_path, store);
            (key, result)
        })
        .collect();

    let mut summary = BatchSummary::default();
    for (key, result) in results {
        match result {
            Ok(path) => summary.converted.push((key, path)),
            Err(e) => {
                log::warn!("Failed to convert {}: {}", key, e);
                summary.failed.push((key, e));
            }
        }
    }

    log::info!(
        "Converted {}/{} session(s) of '{}' in {:.1} seconds",
        summary.converted.len(),
        summary.total(),
        project,
        tic.elapsed().as_secs_f64()
    );
    Ok(summary)
}

/// Reads back a document written by [`convert_session`].
pub fn read_back(
    config: &ConverterConfig,
    output: &OutputContext,
    store: &dyn DocumentStore,
) -> Result<NwbDocument> {
    store.read(&output.output_path(&config.layout()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::JsonDocumentStore;
    use crate::error::LookupError;
    use crate::reader::minimal_container_bytes;
    use std::fs;

    const HEADER: &str = "Participant,Session,Age,Sex,Pathology,sEEG electrodes analysed,\
                          Electrodes in seizure onset zone (SOZ),Handedness,Date,\
                          Session Start Time,Dataset";

    fn project(rows: &[&str], containers: &[&str]) -> (tempfile::TempDir, ConverterConfig) {
        let dir = tempfile::tempdir().unwrap();
        let config = ConverterConfig::new(dir.path());
        let layout = config.layout();

        let metadata = layout.metadata_path();
        fs::create_dir_all(metadata.parent().unwrap()).unwrap();
        let mut csv = String::from(HEADER);
        for row in rows {
            csv.push('\n');
            csv.push_str(row);
        }
        fs::write(&metadata, csv).unwrap();

        let nix_dir = layout.source_container_dir("demo");
        fs::create_dir_all(&nix_dir).unwrap();
        for name in containers {
            fs::write(nix_dir.join(name), minimal_container_bytes()).unwrap();
        }
        (dir, config)
    }

    #[test]
    fn test_build_document_maps_metadata() {
        let (_dir, config) = project(
            &["1,1,34,männlich,Epilepsy,AHL1-8,AHL2,R,200101,09:00,demo"],
            &[],
        );
        let table = MetadataTable::load(config.layout().metadata_path()).unwrap();
        let row = table.lookup(&SessionKey::new(1, 1, "demo")).unwrap();
        let start = row.session_start_in(config.tz().unwrap()).unwrap();

        let doc = build_document(&config, row, start, Path::new("x.h5")).unwrap();
        assert_eq!(doc.identifier, "demo_sub01_ses01");
        assert_eq!(doc.session_start_time.to_rfc3339(), "2020-01-01T09:00:00+01:00");
        let subject = doc.subject.as_ref().unwrap();
        assert_eq!(subject.sex, "M");
        assert_eq!(subject.age, "P34Y");
        assert_eq!(subject.seizure_onset_zone, "AHL2");
        assert_eq!(doc.electrode_count(), 19);
        assert_eq!(doc.devices[0].manufacturer, "Natus Medical Incorporated");
    }

    #[test]
    fn test_convert_session_without_container_writes_nothing() {
        let (_dir, config) = project(&["1,1,34,m,,,,R,200101,09:00,demo"], &[]);
        let table = MetadataTable::load(config.layout().metadata_path()).unwrap();
        let key = SessionKey::new(1, 1, "demo");

        let err = convert_session(&config, &table, &key, &JsonDocumentStore).unwrap_err();
        assert!(matches!(
            err,
            ConversionError::Lookup(LookupError::ContainerNotFound(_))
        ));
        assert!(!config.layout().output_document_path(&key).exists());
    }

    #[test]
    fn test_batch_continues_past_failed_sessions() {
        let (_dir, config) = project(
            &["1,1,34,m,,,,R,200101,09:00,demo", "2,1,40,f,,,,L,200102,10:30,demo"],
            &[
                "Data_Subject_01_Session_01.h5",
                "Data_Subject_02_Session_01.h5",
                "Data_Subject_03_Session_01.h5",
                "readme.md",
            ],
        );

        let summary = convert_project(&config, "demo", &JsonDocumentStore).unwrap();
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.converted.len(), 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, SessionKey::new(3, 1, "demo"));
        assert!(summary.failed[0].1.is_session_failure());
        assert!(!summary.is_success());
    }

    // Zero-padded names are converted from the file discovery found, not
    // from the canonical two-digit path.
    #[test]
    fn test_batch_opens_discovered_path() {
        let (_dir, config) = project(
            &["1,2,34,m,,,,R,200101,09:00,demo"],
            &["Data_Subject_001_Session_02.h5"],
        );

        let summary = convert_project(&config, "demo", &JsonDocumentStore).unwrap();
        assert_eq!(summary.converted.len(), 1);
        assert!(summary.is_success());

        let (key, path) = &summary.converted[0];
        assert_eq!(key, &SessionKey::new(1, 2, "demo"));
        let doc = JsonDocumentStore.read(path).unwrap();
        assert!(doc.source_file.ends_with("Data_Subject_001_Session_02.h5"));
    }

    #[test]
    fn test_convert_session_at_explicit_path() {
        let (dir, config) = project(&["1,1,34,m,,,,R,200101,09:00,demo"], &[]);
        let source = dir.path().join("elsewhere.h5");
        fs::write(&source, minimal_container_bytes()).unwrap();
        let table = MetadataTable::load(config.layout().metadata_path()).unwrap();
        let key = SessionKey::new(1, 1, "demo");

        let path = convert_session_at(&config, &table, &key, &source, &JsonDocumentStore).unwrap();
        assert_eq!(path, config.layout().output_document_path(&key));
        assert!(!config.layout().source_container_path(&key).exists());
    }

    #[test]
    fn test_batch_aborts_on_duplicate_discovery() {
        let (_dir, config) = project(
            &["1,1,34,m,,,,R,200101,09:00,demo"],
            &["Data_Subject_01_Session_01.h5", "Data_Subject_001_Session_01.h5"],
        );
        assert!(matches!(
            convert_project(&config, "demo", &JsonDocumentStore),
            Err(ConversionError::DuplicateSession { .. })
        ));
    }

    #[test]
    fn test_read_back_converted_document() {
        let (_dir, config) = project(
            &["1,1,34,m,,,,R,200101,09:00,demo"],
            &["Data_Subject_01_Session_01.h5"],
        );
        let table = MetadataTable::load(config.layout().metadata_path()).unwrap();
        let key = SessionKey::new(1, 1, "demo");
        convert_session(&config, &table, &key, &JsonDocumentStore).unwrap();

        let doc = read_back(&config, &OutputContext::new(key), &JsonDocumentStore).unwrap();
        assert_eq!(doc.identifier, "demo_sub01_ses01");
        assert!(doc.source_file.ends_with("Data_Subject_01_Session_01.h5"));
    }
}
