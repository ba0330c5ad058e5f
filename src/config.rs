//! Converter configuration.
//!
//! Defaults describe the Zurich verbal working-memory recordings; a TOML file
//! may override any field:
//!
//! ```toml
//! project_dir = "/data/usz"
//! timezone = "Europe/Zurich"
//!
//! [electrodes]
//! group_count = 19
//! channels_per_group = 1
//! ```

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::document::ElectrodeLayout;
use crate::error::{ConversionError, Result};
use crate::paths::PathLayout;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub name: String,
    pub description: String,
    pub manufacturer: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "NicoletOne EEG".to_string(),
            description: "Scalp EEG amplifier".to_string(),
            manufacturer: "Natus Medical Incorporated".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Root holding `in/` and `out/`
    pub project_dir: PathBuf,
    /// IANA zone the metadata table's wall-clock times are recorded in
    pub timezone: String,
    pub session_description: String,
    pub experiment_description: String,
    pub experimenter: String,
    pub lab: String,
    pub institution: String,
    pub species: String,
    pub device: DeviceConfig,
    pub electrodes: ElectrodeLayout,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("."),
            timezone: "Europe/Zurich".to_string(),
            session_description: "Human_MTL_units_scalp_EEG_and_iEEG_verbal_WM".to_string(),
            experiment_description: "Verbal working memory task".to_string(),
            experimenter: "Dr. Johannes Sarnthein".to_string(),
            lab: "Johannes Sarnthein Lab".to_string(),
            institution: "University of Zurich".to_string(),
            species: "Homo sapiens".to_string(),
            device: DeviceConfig::default(),
            electrodes: ElectrodeLayout::default(),
        }
    }
}

impl ConverterConfig {
    pub fn new<P: Into<PathBuf>>(project_dir: P) -> Self {
        Self {
            project_dir: project_dir.into(),
            ..Self::default()
        }
    }

    /// Reads a TOML file; fields it leaves out keep their defaults.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.tz()?;
        if self.device.name.is_empty() {
            return Err(ConversionError::Config("device name must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| ConversionError::Config(format!("timezone '{}': {}", self.timezone, e)))
    }

    pub fn layout(&self) -> PathLayout {
        PathLayout::new(self.project_dir.clone())
    }
}
