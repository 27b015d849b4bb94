// Copyright 2024 DictCol Project Authors. Licensed under Apache-2.0.

//! Column accessors and the builder the codec registers them on.
//!
//! Everything here is a cheap-to-clone handle over refcounted buffer slices:
//! a fully decoded column is freely shareable across reader threads, and the
//! string-lookup cache is the only mutable state.

mod bitmap_index;
mod builder;
mod dictionary_column;
mod supplier;

pub use bitmap_index::*;
pub use builder::*;
pub use dictionary_column::*;
pub use supplier::*;

use serde::{Deserialize, Serialize};

/// Logical type of a column part. The dictionary-encoded codec only produces
/// string columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
}

/// Reader-side configuration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnConfig {
    /// Byte budget for the per-column string lookup cache. 0 disables
    /// caching.
    #[serde(default)]
    pub column_cache_size_bytes: u64,
}

impl ColumnConfig {
    pub fn new(column_cache_size_bytes: u64) -> Self {
        Self {
            column_cache_size_bytes,
        }
    }
}
