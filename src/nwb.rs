//! HDF5-backed document store, enabled with the `nwb-support` feature.
//!
//! Layout written under the file root:
//!
//! ```text
//! /                                  nwb_version, identifier, session_description,
//!                                    session_start_time
//! /general                           experimenter, lab, institution, ..., source_file
//! /general/subject                   one attribute per subject field
//! /general/devices/<name>            description, manufacturer
//! /general/extracellular_ephys/<g>   description, device, location, position
//! /general/extracellular_ephys/electrodes
//!                                    id, group_name, label, location, reference datasets
//! ```
//!
//! Groups are listed by HDF5 in name order, so the `devices` and
//! `extracellular_ephys` groups carry an `order` attribute with the names in
//! insertion order.

use chrono::DateTime;
use hdf5::types::VarLenUnicode;
use hdf5::{File as H5File, Group, Location};
use std::fs;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::document::{
    output_permissions, prepare_output_dir, Device, DocumentStore, Electrode, ElectrodeGroup,
    NwbDocument, SubjectInfo,
};
use crate::error::{ConversionError, Result};

const NWB_VERSION: &str = "2.5.0";
const ELECTRODE_TABLE: &str = "electrodes";

/// Writes documents as NWB-shaped HDF5 files.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hdf5DocumentStore;

impl DocumentStore for Hdf5DocumentStore {
    fn write(&self, document: &NwbDocument, path: &Path) -> Result<()> {
        let dir = prepare_output_dir(path)?;

        // Removed on drop unless persisted
        let tmp = NamedTempFile::new_in(dir)?.into_temp_path();
        {
            let file = H5File::create(&tmp)?;
            write_document(&file, document)?;
            file.flush()?;
        }
        if let Some(permissions) = output_permissions(path) {
            fs::set_permissions(&tmp, permissions)?;
        }
        tmp.persist(path).map_err(|e| ConversionError::Io(e.error))?;
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<NwbDocument> {
        let file = H5File::open(path)?;
        let version = get_str(&file, "nwb_version")?;
        log::debug!("Reading {} (NWB {})", path.display(), version);
        read_document(&file)
    }
}

fn write_document(file: &H5File, document: &NwbDocument) -> Result<()> {
    put_str(file, "nwb_version", NWB_VERSION)?;
    put_str(file, "neurodata_type", "NWBFile")?;
    put_str(file, "identifier", &document.identifier)?;
    put_str(file, "session_description", &document.session_description)?;
    put_str(file, "session_start_time", &document.session_start_time.to_rfc3339())?;

    let general = file.create_group("general")?;
    put_str(&general, "session_id", &document.session_id)?;
    put_str(&general, "experimenter", &document.experimenter)?;
    put_str(&general, "lab", &document.lab)?;
    put_str(&general, "institution", &document.institution)?;
    put_str(&general, "experiment_description", &document.experiment_description)?;
    put_str(&general, "source_file", &document.source_file)?;

    if let Some(subject) = &document.subject {
        let group = general.create_group("subject")?;
        put_str(&group, "subject_id", &subject.subject_id)?;
        put_str(&group, "age", &subject.age)?;
        put_str(&group, "sex", &subject.sex)?;
        put_str(&group, "species", &subject.species)?;
        put_str(&group, "description", &subject.description)?;
        put_str(&group, "handedness", &subject.handedness)?;
        put_str(&group, "electrodes_analysed", &subject.electrodes_analysed)?;
        put_str(&group, "seizure_onset_zone", &subject.seizure_onset_zone)?;
    }

    if !document.devices.is_empty() {
        let devices = general.create_group("devices")?;
        let names: Vec<&str> = document.devices.iter().map(|d| d.name.as_str()).collect();
        put_str_list(&devices, "order", &names)?;
        for device in &document.devices {
            let group = devices.create_group(&device.name)?;
            put_str(&group, "description", &device.description)?;
            put_str(&group, "manufacturer", &device.manufacturer)?;
        }
    }

    if !document.electrode_groups.is_empty() {
        let ephys = general.create_group("extracellular_ephys")?;
        let names: Vec<&str> = document
            .electrode_groups
            .iter()
            .map(|g| g.name.as_str())
            .collect();
        put_str_list(&ephys, "order", &names)?;
        for electrode_group in &document.electrode_groups {
            let group = ephys.create_group(&electrode_group.name)?;
            put_str(&group, "description", &electrode_group.description)?;
            put_str(&group, "device", &electrode_group.device)?;
            put_str(&group, "location", &electrode_group.location)?;
            group
                .new_attr_builder()
                .with_data(&electrode_group.position)
                .create("position")?;
        }
        if !document.electrodes.is_empty() {
            write_electrode_table(&ephys, &document.electrodes)?;
        }
    }
    Ok(())
}

fn write_electrode_table(ephys: &Group, electrodes: &[Electrode]) -> Result<()> {
    let table = ephys.create_group(ELECTRODE_TABLE)?;
    let ids: Vec<u64> = electrodes.iter().map(|e| e.id as u64).collect();
    table.new_dataset_builder().with_data(&ids).create("id")?;

    let columns: [(&str, fn(&Electrode) -> &str); 4] = [
        ("group_name", |e| e.group.as_str()),
        ("label", |e| e.label.as_str()),
        ("location", |e| e.location.as_str()),
        ("reference", |e| e.reference.as_str()),
    ];
    for (name, column) in columns {
        let values = electrodes
            .iter()
            .map(|e| to_unicode(name, column(e)))
            .collect::<Result<Vec<_>>>()?;
        table.new_dataset_builder().with_data(&values).create(name)?;
    }
    Ok(())
}

fn read_document(file: &H5File) -> Result<NwbDocument> {
    let start = get_str(file, "session_start_time")?;
    let start = DateTime::parse_from_rfc3339(&start)
        .map_err(|e| ConversionError::parse(start.as_str(), e.to_string()))?;
    let mut document = NwbDocument::new(
        get_str(file, "identifier")?,
        get_str(file, "session_description")?,
        start,
    );

    let general = file.group("general")?;
    document.session_id = get_str(&general, "session_id")?;
    document.experimenter = get_str(&general, "experimenter")?;
    document.lab = get_str(&general, "lab")?;
    document.institution = get_str(&general, "institution")?;
    document.experiment_description = get_str(&general, "experiment_description")?;
    document.source_file = get_str(&general, "source_file")?;

    if general.link_exists("subject") {
        let group = general.group("subject")?;
        document.subject = Some(SubjectInfo {
            subject_id: get_str(&group, "subject_id")?,
            age: get_str(&group, "age")?,
            sex: get_str(&group, "sex")?,
            species: get_str(&group, "species")?,
            description: get_str(&group, "description")?,
            handedness: get_str(&group, "handedness")?,
            electrodes_analysed: get_str(&group, "electrodes_analysed")?,
            seizure_onset_zone: get_str(&group, "seizure_onset_zone")?,
        });
    }

    if general.link_exists("devices") {
        let devices = general.group("devices")?;
        for name in get_str_list(&devices, "order")? {
            let group = devices.group(&name)?;
            document.devices.push(Device {
                description: get_str(&group, "description")?,
                manufacturer: get_str(&group, "manufacturer")?,
                name,
            });
        }
    }

    if general.link_exists("extracellular_ephys") {
        let ephys = general.group("extracellular_ephys")?;
        for name in get_str_list(&ephys, "order")? {
            let group = ephys.group(&name)?;
            let position: [f64; 3] = group
                .attr("position")?
                .read_raw::<f64>()?
                .try_into()
                .map_err(|_| bad_value(&name, "position must hold three values"))?;
            document.electrode_groups.push(ElectrodeGroup {
                description: get_str(&group, "description")?,
                device: get_str(&group, "device")?,
                location: get_str(&group, "location")?,
                position,
                name,
            });
        }
        if ephys.link_exists(ELECTRODE_TABLE) {
            document.electrodes = read_electrode_table(&ephys.group(ELECTRODE_TABLE)?)?;
        }
    }
    Ok(document)
}

fn read_electrode_table(table: &Group) -> Result<Vec<Electrode>> {
    let ids = table.dataset("id")?.read_raw::<u64>()?;
    let column = |name: &str| -> Result<Vec<String>> {
        let values = table.dataset(name)?.read_raw::<VarLenUnicode>()?;
        if values.len() != ids.len() {
            return Err(bad_value(name, "column length differs from the id column"));
        }
        Ok(values.iter().map(|v| v.as_str().to_string()).collect())
    };
    let groups = column("group_name")?;
    let labels = column("label")?;
    let locations = column("location")?;
    let references = column("reference")?;

    Ok(ids
        .iter()
        .zip(groups)
        .zip(labels)
        .zip(locations)
        .zip(references)
        .map(|((((id, group), label), location), reference)| Electrode {
            id: *id as usize,
            group,
            label,
            location,
            reference,
        })
        .collect())
}

fn bad_value(name: &str, reason: &str) -> ConversionError {
    ConversionError::Document(format!("'{}': {}", name, reason))
}

fn to_unicode(name: &str, value: &str) -> Result<VarLenUnicode> {
    value
        .parse()
        .map_err(|e| bad_value(name, &format!("not storable as HDF5 string: {}", e)))
}

fn put_str(location: &Location, name: &str, value: &str) -> Result<()> {
    let value = to_unicode(name, value)?;
    location.new_attr_builder().with_data(&[value]).create(name)?;
    Ok(())
}

fn put_str_list(location: &Location, name: &str, values: &[&str]) -> Result<()> {
    let values = values
        .iter()
        .map(|v| to_unicode(name, v))
        .collect::<Result<Vec<_>>>()?;
    location.new_attr_builder().with_data(&values).create(name)?;
    Ok(())
}

fn get_str_list(location: &Location, name: &str) -> Result<Vec<String>> {
    let values = location.attr(name)?.read_raw::<VarLenUnicode>()?;
    Ok(values.iter().map(|v| v.as_str().to_string()).collect())
}

fn get_str(location: &Location, name: &str) -> Result<String> {
    get_str_list(location, name)?
        .into_iter()
        .next()
        .ok_or_else(|| bad_value(name, "empty attribute"))
}
