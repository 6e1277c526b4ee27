//! Data-grid storage elements and the per-resource replica manager that
//! bridges job submission with file staging (spec §4.6).
pub mod catalogue;
pub mod file;
pub mod replica_manager;
pub mod storage;

pub use catalogue::ReplicaCatalogueClient;
pub use file::{FileAttr, FileKind};
pub use replica_manager::{DataJobOutcome, FileRequestPayload, ReplicaManager, StagingJob};
pub use storage::{DiskStorage, StorageElement, TapeStorage};
