//! Storage elements a replica manager can attach (spec §4.6, Design Notes
//! composition). `DiskStorage` is a plain capacity-bounded store;
//! `TapeStorage` additionally models write-only media that refuses
//! deletion.
use gridsim_core::{ResultExt, SystemError, TypedResult};

use crate::file::FileAttr;

/// Storage capability every element a replica manager attaches must
/// provide. `delete_file` is fallible — tape media refuses it outright.
pub trait StorageElement: std::fmt::Debug + Send {
    fn capacity_bytes(&self) -> u64;
    fn used_bytes(&self) -> u64;
    fn files(&self) -> &[FileAttr];

    /// Inserts `file`, rejecting it if it would exceed capacity or
    /// collides with an existing name.
    fn insert_file(&mut self, file: FileAttr) -> TypedResult<()>;

    fn find(&self, name: &str) -> Option<&FileAttr>;

    /// Removes and returns the named file. `TapeStorage` always fails
    /// this with [SystemError::PolicyUnsupported].
    fn delete_file(&mut self, name: &str) -> TypedResult<FileAttr>;
}

#[derive(Debug, Default)]
pub struct DiskStorage {
    capacity_bytes: u64,
    files: Vec<FileAttr>,
}

impl DiskStorage {
    pub fn new(capacity_bytes: u64) -> Self {
        Self {
            capacity_bytes,
            files: Vec::new(),
        }
    }
}

impl StorageElement for DiskStorage {
    fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    fn used_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }

    fn files(&self) -> &[FileAttr] {
        &self.files
    }

    fn insert_file(&mut self, file: FileAttr) -> TypedResult<()> {
        if self.files.iter().any(|f| f.name == file.name) {
            return Err(anyhow::anyhow!("file '{}' already exists on this element", file.name))
                .typ(SystemError::InvalidArgument);
        }
        if self.used_bytes() + file.size_bytes > self.capacity_bytes {
            return Err(anyhow::anyhow!(
                "storage full: {} + {} > {}",
                self.used_bytes(),
                file.size_bytes,
                self.capacity_bytes
            ))
            .typ(SystemError::CapacityExhausted);
        }
        self.files.push(file);
        Ok(())
    }

    fn find(&self, name: &str) -> Option<&FileAttr> {
        self.files.iter().find(|f| f.name == name)
    }

    fn delete_file(&mut self, name: &str) -> TypedResult<FileAttr> {
        let idx = self
            .files
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| anyhow::anyhow!("no such file '{name}'"))
            .typ(SystemError::NotFound)?;
        Ok(self.files.remove(idx))
    }
}

/// Write-only archival media: files can be written and read but never
/// deleted (Open Question resolution, spec.md §9's tape-deletion note —
/// see DESIGN.md). `delete_file` always returns
/// [SystemError::PolicyUnsupported], distinguished from an ordinary
/// not-found by the caller checking `err()`.
#[derive(Debug, Default)]
pub struct TapeStorage {
    capacity_bytes: u64,
    files: Vec<FileAttr>,
}

impl TapeStorage {
    pub fn new(capacity_bytes: u64) -> Self {
        Self {
            capacity_bytes,
            files: Vec::new(),
        }
    }
}

impl StorageElement for TapeStorage {
    fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    fn used_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }

    fn files(&self) -> &[FileAttr] {
        &self.files
    }

    fn insert_file(&mut self, file: FileAttr) -> TypedResult<()> {
        if self.files.iter().any(|f| f.name == file.name) {
            return Err(anyhow::anyhow!("file '{}' already exists on this element", file.name))
                .typ(SystemError::InvalidArgument);
        }
        if self.used_bytes() + file.size_bytes > self.capacity_bytes {
            return Err(anyhow::anyhow!("tape full")).typ(SystemError::CapacityExhausted);
        }
        self.files.push(file);
        Ok(())
    }

    fn find(&self, name: &str) -> Option<&FileAttr> {
        self.files.iter().find(|f| f.name == name)
    }

    fn delete_file(&mut self, _name: &str) -> TypedResult<FileAttr> {
        Err(anyhow::anyhow!("tape storage does not support deletion")).typ(SystemError::PolicyUnsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsim_core::types::UserId;

    fn file(name: &str, size: u64) -> FileAttr {
        FileAttr {
            name: name.to_string(),
            size_bytes: size,
            owner: UserId(1),
            kind: crate::file::FileKind::Master,
        }
    }

    #[test]
    fn disk_rejects_insert_beyond_capacity() {
        let mut disk = DiskStorage::new(100);
        disk.insert_file(file("a", 80)).unwrap();
        let err = disk.insert_file(file("b", 30)).unwrap_err();
        assert_eq!(err.err(), SystemError::CapacityExhausted);
    }

    #[test]
    fn disk_rejects_duplicate_names() {
        let mut disk = DiskStorage::new(100);
        disk.insert_file(file("a", 10)).unwrap();
        let err = disk.insert_file(file("a", 10)).unwrap_err();
        assert_eq!(err.err(), SystemError::InvalidArgument);
    }

    #[test]
    fn disk_deletes_and_frees_space() {
        let mut disk = DiskStorage::new(100);
        disk.insert_file(file("a", 80)).unwrap();
        disk.delete_file("a").unwrap();
        assert_eq!(disk.used_bytes(), 0);
    }

    #[test]
    fn tape_refuses_deletion_with_a_distinguished_error() {
        let mut tape = TapeStorage::new(100);
        tape.insert_file(file("a", 10)).unwrap();
        let err = tape.delete_file("a").unwrap_err();
        assert_eq!(err.err(), SystemError::PolicyUnsupported);
        assert!(tape.find("a").is_some(), "file must remain after a refused delete");
    }
}
