//! Diagnostic change log for stores.

mod diff;
mod inspector;

pub use diff::{diff, Change};
pub use inspector::{ChangeRecord, Inspector, InspectorOptions};
