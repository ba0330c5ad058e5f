pub mod config;
pub mod context;
pub mod convert;
pub mod discovery;
pub mod document;
pub mod error;
pub mod metadata;
pub mod normalize;
#[cfg(feature = "nwb-support")]
pub mod nwb;
pub mod paths;
pub mod reader;
pub mod types;

use std::path::Path;

// Re-export types
pub use config::{ConverterConfig, DeviceConfig};
pub use context::{OutputContext, SessionContext, SourceContext};
pub use convert::{
    build_document, convert_project, convert_session, convert_session_at, read_back, BatchSummary,
};
pub use discovery::{discover_sessions, DiscoveryIndex};
pub use document::{DocumentStore, ElectrodeLayout, JsonDocumentStore, NwbDocument};
pub use error::{ConversionError, LookupError, Result};
pub use metadata::{MetadataRow, MetadataTable};
pub use normalize::normalize_sex;
#[cfg(feature = "nwb-support")]
pub use nwb::Hdf5DocumentStore;
pub use paths::PathLayout;
pub use reader::{ContainerSummary, SourceContainer};
pub use types::*;

/// Loads the participant table of a project directory
///
/// # Examples
///
/// ```no_run
/// use usz_neuro_conversion::{load_metadata, SessionKey};
///
/// let table = load_metadata("/data/usz").unwrap();
/// match table.lookup(&SessionKey::new(1, 1, "demo")) {
///     Ok(row) => println!("Session start: {}", row.session_start),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
pub fn load_metadata<P: AsRef<Path>>(project_dir: P) -> Result<MetadataTable> {
    MetadataTable::load(PathLayout::new(project_dir.as_ref()).metadata_path())
}

/// Converts one session of a project directory with default settings
///
/// # Examples
///
/// ```no_run
/// use usz_neuro_conversion::{convert, SessionKey};
///
/// let path = convert("/data/usz", &SessionKey::new(1, 1, "demo")).unwrap();
/// println!("Wrote {}", path.display());
/// ```
pub fn convert<P: AsRef<Path>>(project_dir: P, key: &SessionKey) -> Result<std::path::PathBuf> {
    let config = ConverterConfig::new(project_dir.as_ref());
    let table = MetadataTable::load(config.layout().metadata_path())?;
    convert_session(&config, &table, key, &JsonDocumentStore)
}
