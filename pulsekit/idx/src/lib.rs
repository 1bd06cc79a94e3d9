//! Dense identifiers and the tables keyed by them.
//!
//! Every id handed out by a table is the position of its entry, so ids are
//! dense, start at zero and follow insertion order.
mod index_trait;
mod indexed_map;
mod macros;

pub use index_trait::IndexRef;
pub use indexed_map::IndexedMap;
