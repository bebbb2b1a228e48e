//! A `File` façade routing `:/`-prefixed paths to the read-only
//! [`crate::resource::ResourceManager`] and every other path to the host
//! filesystem (spec §6 "File API").

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::FileError;
use crate::resource::ResourceManager;

const RESOURCE_PREFIX: &str = ":/";

/// Open mode, spec §6 verbatim. `*Binary` variants exist for parity
/// with the source API; this façade does not distinguish text and
/// binary mode on Unix-like targets, matching `std::fs::File`'s own
/// lack of a text/binary distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    ReadAndWrite,
    ReadBinary,
    WriteBinary,
    ReadAndWriteBinary,
}

impl OpenMode {
    fn allows_write(self) -> bool {
        matches!(
            self,
            OpenMode::Write | OpenMode::ReadAndWrite | OpenMode::WriteBinary | OpenMode::ReadAndWriteBinary
        )
    }

    fn allows_read(self) -> bool {
        matches!(
            self,
            OpenMode::Read | OpenMode::ReadAndWrite | OpenMode::ReadBinary | OpenMode::ReadAndWriteBinary
        )
    }
}

enum Backing {
    Resource { bytes: &'static [u8], cursor: usize },
    Host(std::fs::File),
}

/// An open file or resource. Resource-backed files are always
/// read-only; attempting to open one with a write-capable mode fails.
pub struct File {
    backing: Backing,
}

impl File {
    pub fn open(path: &str, mode: OpenMode) -> Result<Self, FileError> {
        if let Some(resource_path) = path.strip_prefix(RESOURCE_PREFIX) {
            if mode.allows_write() {
                return Err(FileError::ResourceIsReadOnly(path.to_string()));
            }
            let bytes = ResourceManager::global()
                .lookup(resource_path)
                .ok_or_else(|| FileError::ResourceNotFound(path.to_string()))?;
            return Ok(Self { backing: Backing::Resource { bytes, cursor: 0 } });
        }

        let file = OpenOptions::new()
            .read(mode.allows_read())
            .write(mode.allows_write())
            .create(mode.allows_write())
            .truncate(false)
            .open(path)?;
        Ok(Self { backing: Backing::Host(file) })
    }

    pub fn exists(path: &str) -> bool {
        match path.strip_prefix(RESOURCE_PREFIX) {
            Some(resource_path) => ResourceManager::global().lookup(resource_path).is_some(),
            None => std::path::Path::new(path).exists(),
        }
    }

    pub fn file_size(&mut self) -> Result<u64, FileError> {
        match &mut self.backing {
            Backing::Resource { bytes, .. } => Ok(bytes.len() as u64),
            Backing::Host(f) => Ok(f.metadata()?.len()),
        }
    }

    /// Reads into `buf`, optionally seeking to `offset` first (host
    /// files only — resource reads are always relative to the
    /// resource's own read cursor).
    pub fn read(&mut self, buf: &mut [u8], offset: Option<u64>) -> Result<usize, FileError> {
        match &mut self.backing {
            Backing::Resource { bytes, cursor } => {
                if let Some(offset) = offset {
                    *cursor = offset as usize;
                }
                let remaining = bytes.len().saturating_sub(*cursor);
                let n = remaining.min(buf.len());
                buf[..n].copy_from_slice(&bytes[*cursor..*cursor + n]);
                *cursor += n;
                Ok(n)
            }
            Backing::Host(f) => {
                if let Some(offset) = offset {
                    f.seek(SeekFrom::Start(offset))?;
                }
                Ok(f.read(buf)?)
            }
        }
    }

    /// Writes `buf`, optionally seeking to `offset` first. Resource
    /// paths never reach here — [`File::open`] rejects write-capable
    /// modes on them up front.
    pub fn write(&mut self, buf: &[u8], offset: Option<u64>) -> Result<usize, FileError> {
        match &mut self.backing {
            Backing::Resource { .. } => Err(FileError::ResourceIsReadOnly(String::new())),
            Backing::Host(f) => {
                if let Some(offset) = offset {
                    f.seek(SeekFrom::Start(offset))?;
                }
                Ok(f.write(buf)?)
            }
        }
    }

    pub fn read_all_bytes(&mut self) -> Result<Vec<u8>, FileError> {
        match &mut self.backing {
            Backing::Resource { bytes, cursor } => {
                let rest = bytes[*cursor..].to_vec();
                *cursor = bytes.len();
                Ok(rest)
            }
            Backing::Host(f) => {
                let mut out = Vec::new();
                f.read_to_end(&mut out)?;
                Ok(out)
            }
        }
    }

    pub fn read_all_string(&mut self) -> Result<String, FileError> {
        let bytes = self.read_all_bytes()?;
        String::from_utf8(bytes).map_err(|e| FileError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<(), FileError> {
        match &mut self.backing {
            Backing::Resource { .. } => Err(FileError::ResourceIsReadOnly(String::new())),
            Backing::Host(f) => Ok(f.write_all(bytes)?),
        }
    }
}

/// Copies `src` to `dst`. `src` may be a resource path; `dst` must be a
/// host path (resources are read-only destinations).
pub fn copy(src: &str, dst: &str) -> Result<u64, FileError> {
    if dst.starts_with(RESOURCE_PREFIX) {
        return Err(FileError::ResourceIsReadOnly(dst.to_string()));
    }
    if let Some(resource_path) = src.strip_prefix(RESOURCE_PREFIX) {
        let bytes = ResourceManager::global()
            .lookup(resource_path)
            .ok_or_else(|| FileError::ResourceNotFound(src.to_string()))?;
        std::fs::write(dst, bytes)?;
        return Ok(bytes.len() as u64);
    }
    Ok(std::fs::copy(src, dst)?)
}

/// Renames `src` to `dst`. Neither may be a resource path.
pub fn move_path(src: &str, dst: &str) -> Result<(), FileError> {
    if src.starts_with(RESOURCE_PREFIX) || dst.starts_with(RESOURCE_PREFIX) {
        return Err(FileError::ResourceIsReadOnly(src.to_string()));
    }
    Ok(std::fs::rename(src, dst)?)
}

/// Removes a host file. Resource paths may not be removed.
pub fn remove(path: &str) -> Result<(), FileError> {
    if path.starts_with(RESOURCE_PREFIX) {
        return Err(FileError::ResourceIsReadOnly(path.to_string()));
    }
    Ok(std::fs::remove_file(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_round_trip_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.txt");
        let path = path.to_str().unwrap();

        let mut f = File::open(path, OpenMode::ReadAndWrite).unwrap();
        f.write_all(b"hello cadence").unwrap();

        let mut f = File::open(path, OpenMode::Read).unwrap();
        assert_eq!(f.read_all_string().unwrap(), "hello cadence");
    }

    #[test]
    fn opening_a_resource_path_for_writing_fails() {
        let err = File::open(":/env/path", OpenMode::Write);
        assert!(matches!(err, Err(FileError::ResourceIsReadOnly(_))));
    }

    #[test]
    fn remove_on_a_resource_path_is_rejected() {
        assert!(matches!(remove(":/env/path"), Err(FileError::ResourceIsReadOnly(_))));
    }
}
