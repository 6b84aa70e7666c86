//! Persistent datasets and external file formats.
//!
//! [`ResultStore`] owns the line-delimited sweep datasets; [`loaders`] reads
//! and writes single record files and the tab-separated DOS tables produced
//! by the external integrator.

pub mod loaders;
pub mod storage;

pub use loaders::{read_dos_table, read_record_file, write_record_file};
pub use storage::{DatasetKind, ResultStore};
