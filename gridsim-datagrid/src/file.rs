//! File attributes and master/replica kind (spec §3 "FileAttr", §4.6).
use gridsim_core::types::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Master,
    Replica,
}

/// One file as tracked by a single storage element. Uniqueness of
/// `name` within the whole data grid is the replica catalogue's
/// responsibility, not this struct's — a `ReplicaManager` only ever
/// checks uniqueness against its own local storage.
#[derive(Debug, Clone)]
pub struct FileAttr {
    pub name: String,
    pub size_bytes: u64,
    pub owner: UserId,
    pub kind: FileKind,
}

impl FileAttr {
    pub fn is_master(&self) -> bool {
        matches!(self.kind, FileKind::Master)
    }

    pub fn is_replica(&self) -> bool {
        matches!(self.kind, FileKind::Replica)
    }
}
