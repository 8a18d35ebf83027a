pub mod csv;
#[cfg(test)]
pub mod fake;
pub mod kinds;
pub mod platform;
pub mod store;
pub mod upsert;

pub use store::{from_dynamic, to_dynamic, DeleteOutcome, KubeStore, ObjectKey, ObjectStore};
pub use upsert::{
    create_or_patch, merge_field, set_controller_reference, set_field, set_field_if_drifted,
    OperationResult,
};
