//! Entity ids and the two component-table storage strategies systems
//! build on: packed/swap-remove [`DenseTable`] and paged/tombstoned
//! [`StableTable`].

mod dense;
mod entity;
mod error;
mod sparse;
mod stable;

pub use dense::DenseTable;
pub use entity::{Entity, EntityAllocator, EntityRange};
pub use error::TableError;
pub use stable::StableTable;
