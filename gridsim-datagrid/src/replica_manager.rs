//! Bridges job submission with data staging and owns a resource's storage
//! elements (spec §4.6).
use std::collections::HashSet;

use gridsim_core::context::SimContext;
use gridsim_core::event::{EventData, EventKernel, EventTag, SCHEDULE_NOW};
use gridsim_core::types::EntityId;
use gridsim_core::{JobRequest, ResultExt, SystemError, TypedResult};

use crate::catalogue::ReplicaCatalogueClient;
use crate::file::{FileAttr, FileKind};
use crate::storage::StorageElement;

/// Payload of a `FILE_REQUEST` event (spec §4.6 step 2): `service_level`
/// 1 means priority over ordinary network traffic, 0 normal.
#[derive(Debug, Clone)]
pub struct FileRequestPayload {
    pub file_name: String,
    pub requester: EntityId,
    pub service_level: u8,
}

/// A job parked because one or more required files are not yet local.
#[derive(Debug, Clone)]
pub struct StagingJob {
    pub job: JobRequest,
    missing: HashSet<String>,
}

impl StagingJob {
    fn new(job: JobRequest) -> Self {
        let missing = job.required_files.iter().cloned().collect();
        Self { job, missing }
    }

    /// Records `name` as still required. Idempotent: re-adding an
    /// already-tracked name is a no-op and returns `false`; a genuinely
    /// new requirement returns `true`.
    pub fn add_required_file(&mut self, name: impl Into<String>) -> bool {
        self.missing.insert(name.into())
    }

    fn mark_delivered(&mut self, name: &str) -> bool {
        self.missing.remove(name)
    }

    fn is_ready(&self) -> bool {
        self.missing.is_empty()
    }
}

/// What happened to a submitted data-job (spec §4.6 steps 1/3/4).
#[derive(Debug)]
pub enum DataJobOutcome {
    /// Every required file was already local; hand this straight to the
    /// scheduling policy.
    ReadyForPolicy(JobRequest),
    /// At least one file was missing; the job is parked.
    Staged,
}

pub struct ReplicaManager {
    pub self_id: EntityId,
    storage: Box<dyn StorageElement>,
    catalogue: Box<dyn ReplicaCatalogueClient>,
    staging: Vec<StagingJob>,
    next_registration_id: u64,
}

impl ReplicaManager {
    pub fn new(self_id: EntityId, storage: Box<dyn StorageElement>, catalogue: Box<dyn ReplicaCatalogueClient>) -> Self {
        Self {
            self_id,
            storage,
            catalogue,
            staging: Vec::new(),
            next_registration_id: 1,
        }
    }

    fn file_registration_id(&mut self) -> u64 {
        let id = self.next_registration_id;
        self.next_registration_id += 1;
        id
    }

    pub fn staging_len(&self) -> usize {
        self.staging.len()
    }

    /// Step 1-4 of spec §4.6: compute missing files, request them from
    /// the catalogue-resolved hosts with `service_level`, and either hand
    /// the job straight to the policy or park it.
    pub fn submit_data_job(
        &mut self,
        req: JobRequest,
        service_level: u8,
        kernel: &dyn EventKernel,
    ) -> TypedResult<DataJobOutcome> {
        let missing: Vec<String> = req
            .required_files
            .iter()
            .filter(|name| self.storage.find(name).is_none())
            .cloned()
            .collect();

        if missing.is_empty() {
            return Ok(DataJobOutcome::ReadyForPolicy(req));
        }

        for name in &missing {
            let host = self.catalogue.get_replica_location(name)?;
            kernel.schedule(
                host,
                SCHEDULE_NOW,
                EventTag::FileRequest,
                EventData::boxed(FileRequestPayload {
                    file_name: name.clone(),
                    requester: self.self_id,
                    service_level,
                }),
            );
        }

        self.staging.push(StagingJob::new(req));
        Ok(DataJobOutcome::Staged)
    }

    /// Handles an incoming `FILE_DELIVERY` event: stores the file
    /// locally, then prunes every parked job's missing set, returning the
    /// jobs that are now fully satisfied and ready for the policy.
    pub fn on_file_delivery(&mut self, file: FileAttr) -> TypedResult<Vec<JobRequest>> {
        let name = file.name.clone();
        self.storage.insert_file(file)?;

        let mut ready = Vec::new();
        self.staging.retain_mut(|staged| {
            staged.mark_delivered(&name);
            if staged.is_ready() {
                ready.push(staged.job.clone());
                false
            } else {
                true
            }
        });
        Ok(ready)
    }

    /// `ADD_MASTER` (spec §4.6): stores the file, registers it with the
    /// catalogue, then renames it to `name+uniqueId` on success. Rolls
    /// back the local store on catalogue rejection.
    pub fn add_master(&mut self, mut file: FileAttr) -> TypedResult<String> {
        file.kind = FileKind::Master;
        let original_name = file.name.clone();
        self.storage.insert_file(file)?;

        match self.catalogue.add_master(&original_name, self.self_id) {
            Ok(()) => {
                let unique_name = format!("{original_name}+{}", self.file_registration_id());
                let mut stored = self.storage.delete_file(&original_name)?;
                stored.name = unique_name.clone();
                self.storage.insert_file(stored)?;
                Ok(unique_name)
            }
            Err(e) => {
                let _ = self.storage.delete_file(&original_name);
                Err(e)
            }
        }
    }

    /// `ADD_REPLICA` (spec §4.6): only a file already registered as a
    /// master elsewhere may be replicated locally.
    pub fn add_replica(&mut self, mut file: FileAttr) -> TypedResult<()> {
        file.kind = FileKind::Replica;
        let name = file.name.clone();
        self.storage.insert_file(file)?;
        if let Err(e) = self.catalogue.add_replica(&name, self.self_id) {
            let _ = self.storage.delete_file(&name);
            return Err(e);
        }
        Ok(())
    }

    /// Refused if `name` is not a master on this element.
    pub fn delete_master(&mut self, name: &str) -> TypedResult<()> {
        match self.storage.find(name) {
            Some(f) if f.is_master() => {}
            Some(_) => {
                return Err(anyhow::anyhow!("'{name}' is a replica, not a master"))
                    .typ(SystemError::InvalidArgument)
            }
            None => return Err(anyhow::anyhow!("no such file '{name}'")).typ(SystemError::NotFound),
        }
        self.storage.delete_file(name)?;
        self.catalogue.delete_master(name)
    }

    /// Refused if `name` is not a replica on this element.
    pub fn delete_replica(&mut self, name: &str) -> TypedResult<()> {
        match self.storage.find(name) {
            Some(f) if f.is_replica() => {}
            Some(_) => {
                return Err(anyhow::anyhow!("'{name}' is a master, not a replica"))
                    .typ(SystemError::InvalidArgument)
            }
            None => return Err(anyhow::anyhow!("no such file '{name}'")).typ(SystemError::NotFound),
        }
        self.storage.delete_file(name)?;
        self.catalogue.delete_replica(name, self.self_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DiskStorage;
    use gridsim_core::types::{ReservationId, SimTime, UserId};
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Debug, Default)]
    struct FakeCatalogue {
        masters: HashMap<String, EntityId>,
        reject_masters: bool,
    }

    impl ReplicaCatalogueClient for FakeCatalogue {
        fn add_master(&mut self, file_name: &str, resource_id: EntityId) -> TypedResult<()> {
            if self.reject_masters {
                return Err(anyhow::anyhow!("rejected")).typ(SystemError::InvalidArgument);
            }
            self.masters.insert(file_name.to_string(), resource_id);
            Ok(())
        }
        fn add_replica(&mut self, file_name: &str, _resource_id: EntityId) -> TypedResult<()> {
            if self.masters.contains_key(file_name) {
                Ok(())
            } else {
                Err(anyhow::anyhow!("no master registered")).typ(SystemError::InvalidArgument)
            }
        }
        fn delete_master(&mut self, file_name: &str) -> TypedResult<()> {
            self.masters.remove(file_name);
            Ok(())
        }
        fn delete_replica(&mut self, _file_name: &str, _resource_id: EntityId) -> TypedResult<()> {
            Ok(())
        }
        fn get_replica_location(&mut self, file_name: &str) -> TypedResult<EntityId> {
            self.masters
                .get(file_name)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("unknown file"))
                .typ(SystemError::NotFound)
        }
    }

    struct RecordingKernel {
        scheduled: RefCell<Vec<(EntityId, EventTag)>>,
    }
    impl EventKernel for RecordingKernel {
        fn schedule(&self, dest: EntityId, _delay: SimTime, tag: EventTag, _data: EventData) {
            self.scheduled.borrow_mut().push((dest, tag));
        }
        fn clock(&self) -> SimTime {
            0
        }
    }

    fn manager() -> ReplicaManager {
        ReplicaManager::new(
            EntityId(1),
            Box::new(DiskStorage::new(1_000_000)),
            Box::new(FakeCatalogue::default()),
        )
    }

    fn job(files: Vec<&str>) -> JobRequest {
        JobRequest {
            user_id: UserId(1),
            length_mi: 100,
            num_pe: 1,
            required_files: files.into_iter().map(String::from).collect(),
            reservation_id: None,
        }
    }

    #[test]
    fn job_with_no_required_files_goes_straight_to_policy() {
        let mut mgr = manager();
        let kernel = RecordingKernel { scheduled: RefCell::new(vec![]) };
        let outcome = mgr.submit_data_job(job(vec![]), 0, &kernel).unwrap();
        assert!(matches!(outcome, DataJobOutcome::ReadyForPolicy(_)));
    }

    #[test]
    fn job_missing_a_file_stages_and_requests_it() {
        let mut mgr = manager();
        mgr.catalogue.add_master("a.dat", EntityId(42)).unwrap();
        let kernel = RecordingKernel { scheduled: RefCell::new(vec![]) };
        let outcome = mgr.submit_data_job(job(vec!["a.dat"]), 1, &kernel).unwrap();
        assert!(matches!(outcome, DataJobOutcome::Staged));
        assert_eq!(mgr.staging_len(), 1);
        assert_eq!(kernel.scheduled.borrow().as_slice(), &[(EntityId(42), EventTag::FileRequest)]);
    }

    #[test]
    fn file_delivery_releases_a_fully_satisfied_job() {
        let mut mgr = manager();
        mgr.catalogue.add_master("a.dat", EntityId(42)).unwrap();
        let kernel = RecordingKernel { scheduled: RefCell::new(vec![]) };
        mgr.submit_data_job(job(vec!["a.dat"]), 0, &kernel).unwrap();

        let ready = mgr
            .on_file_delivery(FileAttr {
                name: "a.dat".into(),
                size_bytes: 10,
                owner: UserId(1),
                kind: FileKind::Replica,
            })
            .unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(mgr.staging_len(), 0);
    }

    #[test]
    fn add_master_renames_on_catalogue_acknowledgement() {
        let mut mgr = manager();
        let unique = mgr
            .add_master(FileAttr {
                name: "a.dat".into(),
                size_bytes: 10,
                owner: UserId(1),
                kind: FileKind::Master,
            })
            .unwrap();
        assert_eq!(unique, "a.dat+1");
        assert!(mgr.storage.find(&unique).is_some());
        assert!(mgr.storage.find("a.dat").is_none());
    }

    #[test]
    fn add_master_rolls_back_on_catalogue_rejection() {
        let mut mgr = manager();
        mgr.catalogue = Box::new(FakeCatalogue { reject_masters: true, ..Default::default() });
        let err = mgr
            .add_master(FileAttr {
                name: "a.dat".into(),
                size_bytes: 10,
                owner: UserId(1),
                kind: FileKind::Master,
            })
            .unwrap_err();
        assert_eq!(err.err(), SystemError::InvalidArgument);
        assert!(mgr.storage.find("a.dat").is_none());
    }

    #[test]
    fn delete_master_is_refused_on_a_replica() {
        let mut mgr = manager();
        mgr.storage
            .insert_file(FileAttr {
                name: "r.dat".into(),
                size_bytes: 5,
                owner: UserId(1),
                kind: FileKind::Replica,
            })
            .unwrap();
        let err = mgr.delete_master("r.dat").unwrap_err();
        assert_eq!(err.err(), SystemError::InvalidArgument);
    }

    #[test]
    fn staging_job_add_required_file_is_idempotent() {
        let mut staged = StagingJob::new(job(vec!["a.dat"]));
        assert!(!staged.add_required_file("a.dat"));
        assert!(staged.add_required_file("b.dat"));
        assert!(!staged.add_required_file("b.dat"));
    }

    #[test]
    fn unknown_reservation_id_is_untouched_by_staging() {
        let j = JobRequest {
            user_id: UserId(1),
            length_mi: 1,
            num_pe: 1,
            required_files: vec![],
            reservation_id: Some(ReservationId(7)),
        };
        let staged = StagingJob::new(j);
        assert!(staged.is_ready());
    }
}
