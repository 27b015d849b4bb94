// Copyright 2024 DictCol Project Authors. Licensed under Apache-2.0.

//! On-disk format and in-memory accessors for a dictionary-encoded string
//! column of a columnar analytics segment.
//!
//! A column of this kind replaces each string with its position in a sorted
//! per-column dictionary, packs the resulting ids at the narrowest byte
//! width that fits, and carries a per-value inverted bitmap index (plus an
//! optional R-tree for spatial predicates) so filters can be evaluated
//! without materializing rows. The serialized column is positional:
//!
//! ```plain
//! | arity flag (u8) | dictionary | single or multi ids | bitmap index |
//! | optional spatial index |
//! ```
//!
//! Columns are write-once: built and serialized by a single producer, then
//! served as immutable views over a shared byte buffer. Decoded accessors
//! hold refcounted slices of that buffer and are freely shareable across
//! reader threads.

#![deny(unused_must_use)]

pub mod bitmap;
pub mod codec;
pub mod column;
pub mod data;
pub mod error;
pub mod spatial;


pub use codec::{DictionaryColumnCodec, MaterializedColumn};
pub use column::{ColumnConfig, DictionaryEncodedColumn};
pub use error::{ColumnError, ColumnResult, TracedColumnError};
