use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{ConversionError, LookupError, Result};

// HDF5 format signature; NIX containers are HDF5 files
const HDF5_SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1a, b'\n'];
// The signature sits at offset 0 or at 512, 1024, 2048, ... when a user block precedes it
const FIRST_USER_BLOCK_OFFSET: u64 = 512;

/// Layout facts read from the container's superblock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Byte offset of the format signature (non-zero when a user block precedes it)
    pub signature_offset: u64,
    pub superblock_version: u8,
    /// Width of file addresses in bytes
    pub offset_size: u8,
    /// Absolute address all other file addresses are relative to
    pub base_address: u64,
}

/// A source container opened read-only.
///
/// The handle stays open for as long as the value lives; dropping it (or
/// calling [`SourceContainer::close`]) releases the file. There is no `Clone`:
/// one container value is one handle.
#[derive(Debug)]
pub struct SourceContainer {
    // Held open until close or drop
    _handle: BufReader<File>,
    summary: ContainerSummary,
}

impl SourceContainer {
    /// Opens the container at `path` and validates its superblock.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LookupError::ContainerNotFound(path.to_path_buf()).into())
            }
            Err(e) => return Err(e.into()),
        };
        let size = file.metadata()?.len();
        let mut reader = BufReader::with_capacity(4096, file);

        let signature_offset = find_signature(&mut reader, size)
            .map_err(|e| invalid(path, format!("reading signature: {}", e)))?
            .ok_or_else(|| invalid(path, "HDF5 signature not found"))?;

        let summary = read_superblock(&mut reader, path, size, signature_offset)?;
        log::debug!(
            "Opened {} (superblock v{}, {} bytes)",
            path.display(),
            summary.superblock_version,
            summary.size
        );

        Ok(Self {
            _handle: reader,
            summary,
        })
    }

    pub fn path(&self) -> &Path {
        &self.summary.path
    }

    pub fn summary(&self) -> &ContainerSummary {
        &self.summary
    }

    /// Names of the objects in the container's root group.
    #[cfg(feature = "nwb-support")]
    pub fn root_members(&self) -> Result<Vec<String>> {
        let file = hdf5::File::open(self.path())?;
        Ok(file.member_names()?)
    }

    /// Releases the file handle.
    pub fn close(self) {
        log::debug!("Closed {}", self.summary.path.display());
    }
}

/// Opens a container just long enough to summarize it.
pub fn inspect<P: AsRef<Path>>(path: P) -> Result<ContainerSummary> {
    let container = SourceContainer::open(path)?;
    Ok(container.summary.clone())
}

fn invalid(path: &Path, reason: impl Into<String>) -> ConversionError {
    ConversionError::InvalidContainer {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Looks for the signature at every offset it may legally occupy.
fn find_signature<R: Read + Seek>(
    reader: &mut R,
    file_size: u64,
) -> std::io::Result<Option<u64>> {
    let mut offset = 0u64;
    let mut buf = [0u8; 8];
    while offset + HDF5_SIGNATURE.len() as u64 <= file_size {
        reader.seek(SeekFrom::Start(offset))?;
        reader.read_exact(&mut buf)?;
        if buf == HDF5_SIGNATURE {
            return Ok(Some(offset));
        }
        offset = if offset == 0 {
            FIRST_USER_BLOCK_OFFSET
        } else {
            offset * 2
        };
    }
    Ok(None)
}

/// Reads the superblock that follows the signature.
fn read_superblock<R: Read + Seek>(
    reader: &mut R,
    path: &Path,
    size: u64,
    signature_offset: u64,
) -> Result<ContainerSummary> {
    reader.seek(SeekFrom::Start(signature_offset + HDF5_SIGNATURE.len() as u64))?;
    let truncated = |e: std::io::Error| invalid(path, format!("truncated superblock: {}", e));

    let version = reader.read_u8().map_err(truncated)?;
    let offset_size = match version {
        0 | 1 => {
            // free-space, root group and shared header versions, one reserved byte
            let mut skipped = [0u8; 4];
            reader.read_exact(&mut skipped).map_err(truncated)?;
            let offset_size = reader.read_u8().map_err(truncated)?;
            let _length_size = reader.read_u8().map_err(truncated)?;
            let _ = reader.read_u8().map_err(truncated)?; // reserved
            let _leaf_k = reader.read_u16::<LittleEndian>().map_err(truncated)?;
            let _internal_k = reader.read_u16::<LittleEndian>().map_err(truncated)?;
            let _flags = reader.read_u32::<LittleEndian>().map_err(truncated)?;
            if version == 1 {
                let _indexed_k = reader.read_u16::<LittleEndian>().map_err(truncated)?;
                let _ = reader.read_u16::<LittleEndian>().map_err(truncated)?; // reserved
            }
            offset_size
        }
        2 | 3 => {
            let offset_size = reader.read_u8().map_err(truncated)?;
            let _length_size = reader.read_u8().map_err(truncated)?;
            let _flags = reader.read_u8().map_err(truncated)?;
            offset_size
        }
        other => {
            return Err(invalid(path, format!("unsupported superblock version {}", other)));
        }
    };

    if !matches!(offset_size, 2 | 4 | 8) {
        return Err(invalid(path, format!("invalid offset size {}", offset_size)));
    }
    let base_address = reader
        .read_uint::<LittleEndian>(offset_size as usize)
        .map_err(truncated)?;

    Ok(ContainerSummary {
        path: path.to_path_buf(),
        size,
        signature_offset,
        superblock_version: version,
        offset_size,
        base_address,
    })
}

/// Writes a minimal version-2 superblock; enough for [`SourceContainer::open`].
#[cfg(test)]
pub(crate) fn minimal_container_bytes() -> Vec<u8> {
    let mut bytes = HDF5_SIGNATURE.to_vec();
    bytes.extend_from_slice(&[2, 8, 8, 0]);
    bytes.extend_from_slice(&0u64.to_le_bytes());
    bytes.resize(96, 0);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_open_minimal_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Data_Subject_01_Session_01.h5");
        fs::write(&path, minimal_container_bytes()).unwrap();

        let container = SourceContainer::open(&path).unwrap();
        let summary = container.summary();
        assert_eq!(summary.signature_offset, 0);
        assert_eq!(summary.superblock_version, 2);
        assert_eq!(summary.offset_size, 8);
        assert_eq!(summary.size, 96);
        container.close();
    }

    #[test]
    fn test_signature_after_user_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_block.h5");
        let mut bytes = vec![0u8; 512];
        bytes.extend(minimal_container_bytes());
        fs::write(&path, bytes).unwrap();

        let summary = inspect(&path).unwrap();
        assert_eq!(summary.signature_offset, 512);
    }

    #[test]
    fn test_version_zero_superblock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v0.h5");
        let mut bytes = HDF5_SIGNATURE.to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 0, 0, 8, 8, 0]);
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        fs::write(&path, bytes).unwrap();

        let summary = inspect(&path).unwrap();
        assert_eq!(summary.superblock_version, 0);
        assert_eq!(summary.base_address, 0);
    }

    #[test]
    fn test_missing_container_is_lookup_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SourceContainer::open(dir.path().join("absent.h5")).unwrap_err();
        assert!(matches!(
            err,
            ConversionError::Lookup(LookupError::ContainerNotFound(_))
        ));
    }

    #[test]
    fn test_non_hdf5_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.h5");
        fs::write(&path, b"just some notes about the session").unwrap();
        assert!(matches!(
            SourceContainer::open(&path),
            Err(ConversionError::InvalidContainer { .. })
        ));
    }

    #[test]
    fn test_truncated_superblock_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.h5");
        let mut bytes = HDF5_SIGNATURE.to_vec();
        bytes.push(2);
        fs::write(&path, bytes).unwrap();
        assert!(matches!(
            SourceContainer::open(&path),
            Err(ConversionError::InvalidContainer { .. })
        ));
    }
}
