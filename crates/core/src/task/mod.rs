//! Task records and the in-memory task registry.

mod memory_store;
mod store;
mod types;

pub use memory_store::InMemoryTaskStore;
pub use store::{TaskError, TaskStore};
pub use types::{
    normalize_output_name, truncate_detail, FailureKind, Task, TaskStatus, TaskUpdate,
    MAX_ERROR_DETAIL_BYTES, OUTPUT_EXTENSION,
};
