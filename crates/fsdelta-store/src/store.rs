//! Framed, gzip-compressed snapshot files.
//!
//! Layout:
//!
//! ```text
//! magic        8 bytes   "FSDSNAP\0"
//! version      u32 LE
//! header_len   u64 LE
//! header       header_len bytes, gzip(JSON(SnapshotHeader))
//! body         rest of file, gzip(JSON(path -> FileRecord))
//! ```
//!
//! The header frame is self-contained, so [`load_snapshot_header`] never
//! touches the record map.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tracing::{debug, info, warn};

use fsdelta_core::{FileRecord, Snapshot, SnapshotHeader};

use crate::error::StoreError;

/// File magic.
pub const MAGIC: &[u8; 8] = b"FSDSNAP\0";

/// Framing version written by this crate.
pub const FORMAT_VERSION: u32 = 1;

/// Upper bound on the header frame; real headers are a few hundred bytes.
const MAX_HEADER_LEN: u64 = 16 * 1024 * 1024;

/// Write `snapshot` to `path`.
///
/// The file is written to a temporary sibling and renamed into place, so a
/// failed save never leaves a truncated snapshot behind.
pub fn save_snapshot(snapshot: &Snapshot, path: impl AsRef<Path>) -> Result<(), StoreError> {
    let path = path.as_ref();
    let header = encode_header(&snapshot.header(), path)?;

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::Builder::new()
        .prefix(".fsdelta-snapshot")
        .tempfile_in(dir)
        .map_err(|source| StoreError::Create {
            path: path.to_path_buf(),
            source,
        })?;

    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    {
        let mut out = BufWriter::new(temp.as_file_mut());
        out.write_all(MAGIC).map_err(write_err)?;
        out.write_all(&FORMAT_VERSION.to_le_bytes()).map_err(write_err)?;
        out.write_all(&(header.len() as u64).to_le_bytes())
            .map_err(write_err)?;
        out.write_all(&header).map_err(write_err)?;

        let mut encoder = GzEncoder::new(out, Compression::default());
        serde_json::to_writer(&mut encoder, &snapshot.files)
            .map_err(|source| StoreError::Encode { source })?;
        let mut out = encoder.finish().map_err(write_err)?;
        out.flush().map_err(write_err)?;
    }

    temp.persist(path).map_err(|err| StoreError::Write {
        path: path.to_path_buf(),
        source: err.error,
    })?;

    info!(
        path = %path.display(),
        records = snapshot.len(),
        root_digest = %format_args!("{:016x}", snapshot.root_digest),
        "snapshot saved"
    );
    Ok(())
}

/// Load and validate a snapshot.
///
/// Statistics that disagree with the record map are corrected with a
/// warning; a root digest that disagrees is an error.
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Snapshot, StoreError> {
    let path = path.as_ref();
    let mut reader = open(path)?;
    let header = read_header(&mut reader, path)?;

    let files: HashMap<String, FileRecord> = serde_json::from_reader(GzDecoder::new(reader))
        .map_err(|source| StoreError::Decode { source })?;

    let mut snapshot = Snapshot::from_header(header, files);
    if snapshot.validate()? {
        warn!(path = %path.display(), "snapshot statistics were inconsistent and have been corrected");
    }
    snapshot.verify_digest()?;

    debug!(path = %path.display(), records = snapshot.len(), "snapshot loaded");
    Ok(snapshot)
}

/// Read only the header frame of a snapshot file.
pub fn load_snapshot_header(path: impl AsRef<Path>) -> Result<SnapshotHeader, StoreError> {
    let path = path.as_ref();
    let mut reader = open(path)?;
    read_header(&mut reader, path)
}

fn open(path: &Path) -> Result<BufReader<File>, StoreError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })
}

fn encode_header(header: &SnapshotHeader, path: &Path) -> Result<Vec<u8>, StoreError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    serde_json::to_writer(&mut encoder, header).map_err(|source| StoreError::Encode { source })?;
    encoder.finish().map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn read_header(reader: &mut impl Read, path: &Path) -> Result<SnapshotHeader, StoreError> {
    let read_err = |source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    };

    let mut magic = [0u8; 8];
    match reader.read_exact(&mut magic) {
        Ok(()) if &magic == MAGIC => {}
        Ok(()) => {
            return Err(StoreError::BadMagic {
                path: path.to_path_buf(),
            });
        }
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(StoreError::BadMagic {
                path: path.to_path_buf(),
            });
        }
        Err(err) => return Err(read_err(err)),
    }

    let mut word = [0u8; 4];
    reader.read_exact(&mut word).map_err(read_err)?;
    let version = u32::from_le_bytes(word);
    if version != FORMAT_VERSION {
        return Err(StoreError::UnsupportedFormat { found: version });
    }

    let mut dword = [0u8; 8];
    reader.read_exact(&mut dword).map_err(read_err)?;
    let len = u64::from_le_bytes(dword);
    if len > MAX_HEADER_LEN {
        return Err(StoreError::HeaderTooLarge { len });
    }

    let mut frame = vec![0u8; len as usize];
    reader.read_exact(&mut frame).map_err(read_err)?;

    serde_json::from_reader(GzDecoder::new(frame.as_slice()))
        .map_err(|source| StoreError::Decode { source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_bad_magic() {
        let mut data = Cursor::new(b"NOTASNAPSHOT".to_vec());
        let err = read_header(&mut data, Path::new("x")).unwrap_err();
        assert!(matches!(err, StoreError::BadMagic { .. }));

        let mut short = Cursor::new(b"FSD".to_vec());
        let err = read_header(&mut short, Path::new("x")).unwrap_err();
        assert!(matches!(err, StoreError::BadMagic { .. }));
    }

    #[test]
    fn test_unsupported_version() {
        let mut data = MAGIC.to_vec();
        data.extend_from_slice(&99u32.to_le_bytes());
        data.extend_from_slice(&0u64.to_le_bytes());
        let err = read_header(&mut Cursor::new(data), Path::new("x")).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedFormat { found: 99 }));
    }

    #[test]
    fn test_oversized_header_rejected() {
        let mut data = MAGIC.to_vec();
        data.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        data.extend_from_slice(&u64::MAX.to_le_bytes());
        let err = read_header(&mut Cursor::new(data), Path::new("x")).unwrap_err();
        assert!(matches!(err, StoreError::HeaderTooLarge { .. }));
    }

    #[test]
    fn test_truncated_header_frame() {
        let mut data = MAGIC.to_vec();
        data.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        data.extend_from_slice(&100u64.to_le_bytes());
        data.extend_from_slice(&[0u8; 10]);
        let err = read_header(&mut Cursor::new(data), Path::new("x")).unwrap_err();
        assert!(matches!(err, StoreError::Read { .. }));
    }
}
