//! Inspection commands behind the `flow-data` binary.

pub mod backend;
pub mod inspect;

pub use backend::{backend_name, create_device, SelectedBackend, SelectedDevice};
