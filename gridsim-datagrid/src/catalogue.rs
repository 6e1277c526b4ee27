//! Abstraction over the control-message round-trip to the (external)
//! replica catalogue entity (spec §4.6). Supplemented from
//! original_source intent: the teacher models a blocking control-channel
//! round trip with a typed `IpcSender<T>`/`IpcReceiver<T>` pair; gridsim
//! generalizes that to a plain trait so [crate::replica_manager::ReplicaManager]
//! is unit-testable without a real catalogue entity or event kernel.
use gridsim_core::types::EntityId;
use gridsim_core::TypedResult;

/// A catalogue collaborator a [crate::replica_manager::ReplicaManager]
/// talks to. Implementations in production code would translate these
/// calls into `CTLG_*` events and block the owning coroutine on the
/// matching reply; a test double can just mutate an in-memory map.
pub trait ReplicaCatalogueClient: std::fmt::Debug + Send {
    /// Registers `file_name` as a master hosted at `resource_id`.
    fn add_master(&mut self, file_name: &str, resource_id: EntityId) -> TypedResult<()>;

    /// Registers a replica of an already-mastered file.
    fn add_replica(&mut self, file_name: &str, resource_id: EntityId) -> TypedResult<()>;

    fn delete_master(&mut self, file_name: &str) -> TypedResult<()>;

    fn delete_replica(&mut self, file_name: &str, resource_id: EntityId) -> TypedResult<()>;

    /// Resolves a resource id hosting a copy of `file_name` (spec §4.6
    /// step 2: "look up the replica catalogue... wait for reply with a
    /// resource id hosting the file").
    fn get_replica_location(&mut self, file_name: &str) -> TypedResult<EntityId>;
}
