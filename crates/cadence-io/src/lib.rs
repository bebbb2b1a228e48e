//! Embedded read-only resource system plus a host filesystem façade
//! (spec §6 "External Interfaces — Resource system / File API").

mod error;
mod file;
mod resource;

pub use error::FileError;
pub use file::{copy, move_path, remove, File, OpenMode};
pub use resource::{Environment, ResourceEntry, ResourceManager, ENVIRONMENTS};
