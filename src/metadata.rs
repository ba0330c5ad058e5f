//! Loader for the manually curated participant table (`participants.csv`).
//!
//! The table is treated as ground truth: where it disagrees with values stored
//! in a source container, the table wins.

use chrono::{DateTime, NaiveDateTime};
use chrono_tz::Tz;
use csv::{ReaderBuilder, StringRecord};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{ConversionError, LookupError, Result};
use crate::normalize::{combine_session_start, localize, normalize_sex};
use crate::types::{SessionKey, Sex};

/// Columns that must be present in the participant table.
pub const REQUIRED_COLUMNS: [&str; 11] = [
    "Participant",
    "Session",
    "Age",
    "Sex",
    "Pathology",
    "sEEG electrodes analysed",
    "Electrodes in seizure onset zone (SOZ)",
    "Handedness",
    "Date",
    "Session Start Time",
    "Dataset",
];

/// One CSV record as written by hand; only typed, not yet merged.
#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(rename = "Participant")]
    participant: u32,
    #[serde(rename = "Session")]
    session: u32,
    #[serde(rename = "Age")]
    age: u32,
    #[serde(rename = "Sex")]
    sex: String,
    #[serde(rename = "Pathology")]
    pathology: String,
    #[serde(rename = "sEEG electrodes analysed")]
    electrodes_analysed: String,
    #[serde(rename = "Electrodes in seizure onset zone (SOZ)")]
    soz_electrodes: String,
    #[serde(rename = "Handedness")]
    handedness: String,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Session Start Time")]
    start_time: String,
    #[serde(rename = "Dataset")]
    dataset: String,
}

/// One participant session from the metadata table.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRow {
    /// Participant number
    pub subject: u32,
    /// Session number
    pub session: u32,
    /// Dataset/project the session belongs to
    pub dataset: String,
    /// Age in years
    pub age: u32,
    /// Sex exactly as entered; see [`MetadataRow::sex`]
    pub raw_sex: String,
    pub pathology: String,
    /// Free-text list of the sEEG electrodes included in the analysis
    pub electrodes_analysed: String,
    /// Free-text list of electrodes in the seizure onset zone
    pub soz_electrodes: String,
    pub handedness: String,
    /// Date and session start time merged, in local wall-clock time
    pub session_start: NaiveDateTime,
}

impl MetadataRow {
    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.subject, self.session, self.dataset.clone())
    }

    pub fn matches(&self, key: &SessionKey) -> bool {
        self.subject == key.subject && self.session == key.session && self.dataset == key.project
    }

    /// Normalized sex of the participant.
    pub fn sex(&self) -> Sex {
        normalize_sex(&self.raw_sex)
    }

    /// Session start in the given timezone.
    pub fn session_start_in(&self, tz: Tz) -> Result<DateTime<Tz>> {
        localize(self.session_start, tz)
    }
}

/// The parsed participant table, immutable once loaded.
#[derive(Debug, Clone, Default)]
pub struct MetadataTable {
    rows: Vec<MetadataRow>,
    index: HashMap<SessionKey, Vec<usize>>,
}

impl MetadataTable {
    /// Loads the table from a CSV file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        log::debug!("Reading session metadata from {}", path.display());
        Self::from_reader(file)
    }

    /// Parses the table from any CSV source.
    ///
    /// All required columns are checked before any row is read, so a schema
    /// problem is reported even for an empty table.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers = reader.headers()?.clone();
        check_columns(&headers)?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(schema_error)?;
            rows.push(parse_row(&record, &headers)?);
        }

        Ok(Self::from_rows(rows))
    }

    fn from_rows(rows: Vec<MetadataRow>) -> Self {
        let mut index: HashMap<SessionKey, Vec<usize>> = HashMap::new();
        for (i, row) in rows.iter().enumerate() {
            index.entry(row.key()).or_default().push(i);
        }
        Self { rows, index }
    }

    /// Returns the single row for `key`.
    ///
    /// Fails when the key is absent or when it appears more than once; a
    /// duplicated key is a data-integrity problem in the table and is never
    /// resolved by picking one of the rows.
    pub fn lookup(&self, key: &SessionKey) -> Result<&MetadataRow> {
        match self.index.get(key).map(Vec::as_slice) {
            None | Some([]) => Err(LookupError::MetadataNotFound(key.clone()).into()),
            Some([only]) => Ok(&self.rows[*only]),
            Some(many) => Err(LookupError::AmbiguousMetadata {
                key: key.clone(),
                count: many.len(),
            }
            .into()),
        }
    }

    pub fn rows(&self) -> &[MetadataRow] {
        &self.rows
    }

    /// Rows belonging to one dataset/project, in file order.
    pub fn project_rows<'a>(
        &'a self,
        project: &'a str,
    ) -> impl Iterator<Item = &'a MetadataRow> + 'a {
        self.rows.iter().filter(move |row| row.dataset == project)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn check_columns(headers: &StringRecord) -> Result<()> {
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|column| !headers.iter().any(|h| h == *column))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConversionError::Schema(format!(
            "missing columns: {}",
            missing.join(", ")
        )))
    }
}

fn parse_row(record: &StringRecord, headers: &StringRecord) -> Result<MetadataRow> {
    let raw: RawRow = record.deserialize(Some(headers)).map_err(schema_error)?;
    let line = record.position().map(|p| p.line()).unwrap_or(0);

    let session_start = combine_session_start(&raw.date, &raw.start_time).map_err(|e| match e {
        ConversionError::Parse { value, reason } => ConversionError::Parse {
            value,
            reason: format!("line {}: {}", line, reason),
        },
        other => other,
    })?;

    Ok(MetadataRow {
        subject: raw.participant,
        session: raw.session,
        dataset: raw.dataset,
        age: raw.age,
        raw_sex: raw.sex,
        pathology: raw.pathology,
        electrodes_analysed: raw.electrodes_analysed,
        soz_electrodes: raw.soz_electrodes,
        handedness: raw.handedness,
        session_start,
    })
}

fn schema_error(err: csv::Error) -> ConversionError {
    if err.is_io_error() {
        return ConversionError::Csv(err);
    }
    match err.position() {
        Some(pos) => ConversionError::Schema(format!("line {}: {}", pos.line(), err)),
        None => ConversionError::Schema(err.to_string()),
    }
}
