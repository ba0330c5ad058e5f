//! In-memory NWB output document and the store that persists it.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::{ConversionError, Result};

/// Subject block of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectInfo {
    pub subject_id: String,
    /// ISO 8601 duration, e.g. `P34Y`
    pub age: String,
    /// `M`, `F` or `O`
    pub sex: String,
    pub species: String,
    pub description: String,
    pub handedness: String,
    pub electrodes_analysed: String,
    pub seizure_onset_zone: String,
}

/// A recording device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub description: String,
    pub manufacturer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectrodeGroup {
    pub name: String,
    pub description: String,
    /// Name of the [`Device`] the group is recorded with
    pub device: String,
    pub location: String,
    pub position: [f64; 3],
}

/// One row of the electrode table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Electrode {
    pub id: usize,
    /// Name of the owning [`ElectrodeGroup`]
    pub group: String,
    pub label: String,
    pub location: String,
    pub reference: String,
}

/// How electrodes are grouped when the document is assembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectrodeLayout {
    pub group_count: usize,
    pub channels_per_group: usize,
    pub location: String,
    pub reference: String,
}

impl Default for ElectrodeLayout {
    fn default() -> Self {
        Self {
            group_count: 19,
            channels_per_group: 1,
            location: "brain area".to_string(),
            reference: "Averaged mastoid channels".to_string(),
        }
    }
}

/// The output document for one session.
///
/// Mirrors the parts of an `NWBFile` this converter fills: session-level
/// description, subject, devices and the electrode table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NwbDocument {
    pub session_description: String,
    pub identifier: String,
    pub session_id: String,
    /// Local start time with its UTC offset (RFC 3339 on disk)
    pub session_start_time: DateTime<FixedOffset>,
    pub experimenter: String,
    pub lab: String,
    pub institution: String,
    pub experiment_description: String,
    pub subject: Option<SubjectInfo>,
    pub devices: Vec<Device>,
    pub electrode_groups: Vec<ElectrodeGroup>,
    pub electrodes: Vec<Electrode>,
    /// Container the document was converted from
    pub source_file: String,
}

impl NwbDocument {
    pub fn new(
        identifier: impl Into<String>,
        session_description: impl Into<String>,
        session_start_time: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            session_description: session_description.into(),
            identifier: identifier.into(),
            session_id: String::new(),
            session_start_time,
            experimenter: String::new(),
            lab: String::new(),
            institution: String::new(),
            experiment_description: String::new(),
            subject: None,
            devices: Vec::new(),
            electrode_groups: Vec::new(),
            electrodes: Vec::new(),
            source_file: String::new(),
        }
    }

    pub fn create_device(
        &mut self,
        name: &str,
        description: &str,
        manufacturer: &str,
    ) -> Result<()> {
        if self.device(name).is_some() {
            return Err(ConversionError::Document(format!(
                "device '{}' already exists",
                name
            )));
        }
        self.devices.push(Device {
            name: name.to_string(),
            description: description.to_string(),
            manufacturer: manufacturer.to_string(),
        });
        Ok(())
    }

    pub fn create_electrode_group(
        &mut self,
        name: &str,
        description: &str,
        device: &str,
        location: &str,
        position: [f64; 3],
    ) -> Result<()> {
        if self.device(device).is_none() {
            return Err(ConversionError::Document(format!(
                "electrode group '{}' refers to unknown device '{}'",
                name, device
            )));
        }
        if self.electrode_group(name).is_some() {
            return Err(ConversionError::Document(format!(
                "electrode group '{}' already exists",
                name
            )));
        }
        self.electrode_groups.push(ElectrodeGroup {
            name: name.to_string(),
            description: description.to_string(),
            device: device.to_string(),
            location: location.to_string(),
            position,
        });
        Ok(())
    }

    /// Appends an electrode row and returns its id.
    pub fn add_electrode(
        &mut self,
        group: &str,
        label: &str,
        location: &str,
        reference: &str,
    ) -> Result<usize> {
        if self.electrode_group(group).is_none() {
            return Err(ConversionError::Document(format!(
                "electrode '{}' refers to unknown group '{}'",
                label, group
            )));
        }
        let id = self.electrodes.len();
        self.electrodes.push(Electrode {
            id,
            group: group.to_string(),
            label: label.to_string(),
            location: location.to_string(),
            reference: reference.to_string(),
        });
        Ok(id)
    }

    /// Creates one group per `layout.group_count` with its channels on `device`.
    pub fn add_electrode_layout(&mut self, device: &str, layout: &ElectrodeLayout) -> Result<()> {
        for group in 0..layout.group_count {
            let group_name = format!("group{}", group);
            self.create_electrode_group(
                &group_name,
                &format!("electrode group for shank {}", group),
                device,
                &layout.location,
                [0.0, 0.0, 0.0],
            )?;
            for channel in 0..layout.channels_per_group {
                self.add_electrode(
                    &group_name,
                    &format!("group{}channel{}", group, channel),
                    &layout.location,
                    &layout.reference,
                )?;
            }
        }
        Ok(())
    }

    pub fn device(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name == name)
    }

    pub fn electrode_group(&self, name: &str) -> Option<&ElectrodeGroup> {
        self.electrode_groups.iter().find(|g| g.name == name)
    }

    pub fn electrode_count(&self) -> usize {
        self.electrodes.len()
    }
}

/// Persists and reads back output documents.
///
/// `write` must never leave a partially written file at `path`.
pub trait DocumentStore: Send + Sync {
    fn write(&self, document: &NwbDocument, path: &Path) -> Result<()>;
    fn read(&self, path: &Path) -> Result<NwbDocument>;
}

/// Creates the directory `path` will be written into and returns it.
pub(crate) fn prepare_output_dir(path: &Path) -> Result<&Path> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    Ok(dir)
}

/// Permissions for a document about to replace `target`.
///
/// Temp files are created owner-only; a persisted document keeps the mode of
/// the file it replaces, or gets `0644` on unix.
pub(crate) fn output_permissions(target: &Path) -> Option<fs::Permissions> {
    if let Ok(meta) = fs::metadata(target) {
        return Some(meta.permissions());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        Some(fs::Permissions::from_mode(0o644))
    }
    #[cfg(not(unix))]
    {
        None
    }
}

/// Stores documents as pretty-printed JSON.
///
/// This is the default store and the one the test suite runs against. The
/// `nwb-support` feature adds [`crate::nwb::Hdf5DocumentStore`], which writes
/// real HDF5 files.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDocumentStore;

impl DocumentStore for JsonDocumentStore {
    fn write(&self, document: &NwbDocument, path: &Path) -> Result<()> {
        let dir = prepare_output_dir(path)?;

        // Removed on drop unless persisted
        let tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer_pretty(&mut writer, document)?;
            writer.flush()?;
        }
        if let Some(permissions) = output_permissions(path) {
            tmp.as_file().set_permissions(permissions)?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| ConversionError::Io(e.error))?;
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<NwbDocument> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
