//! Job CRUD split by concern.

mod lease;
pub(crate) mod read;
mod write;
