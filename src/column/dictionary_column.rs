// Copyright 2024 DictCol Project Authors. Licensed under Apache-2.0.

use std::sync::Arc;

use moka::sync::Cache;

use super::BitmapIndex;
use crate::bitmap::Bitmap;
use crate::data::{GenericIndexed, StringStrategy, VSizeInts, VSizeRagged};
use crate::error::{ColumnError, ColumnResult};
use crate::spatial::{Bounds, ImmutableRTree};

/// Row-id storage of a column. Exactly one arity exists per column; the
/// serialized flag byte selects which.
#[derive(Clone)]
pub enum ValueStorage {
    Single(VSizeInts),
    Multi(VSizeRagged),
}

impl ValueStorage {
    pub fn len(&self) -> usize {
        match self {
            ValueStorage::Single(ints) => ints.len(),
            ValueStorage::Multi(ragged) => ragged.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, ValueStorage::Multi(_))
    }
}

/// Random-access view over a dictionary-encoded string column.
///
/// All storage is immutable buffer views; the only mutable state is the
/// string-lookup cache, which is concurrency-safe and bounded by the
/// configured byte budget.
pub struct DictionaryEncodedColumn {
    dictionary: GenericIndexed<StringStrategy>,
    values: ValueStorage,
    bitmap_index: BitmapIndex,
    spatial_index: Option<Arc<ImmutableRTree>>,
    cache: Option<Cache<u32, Arc<str>>>,
}

impl DictionaryEncodedColumn {
    pub fn new(
        dictionary: GenericIndexed<StringStrategy>,
        values: ValueStorage,
        bitmap_index: BitmapIndex,
        spatial_index: Option<Arc<ImmutableRTree>>,
        column_cache_size_bytes: u64,
    ) -> Self {
        let cache = (column_cache_size_bytes > 0).then(|| {
            Cache::builder()
                .weigher(|_id: &u32, name: &Arc<str>| {
                    (name.len() + std::mem::size_of::<u32>()) as u32
                })
                .max_capacity(column_cache_size_bytes)
                .build()
        });
        Self {
            dictionary,
            values,
            bitmap_index,
            spatial_index,
            cache,
        }
    }

    /// Row count.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn has_multiple_values(&self) -> bool {
        self.values.is_multi()
    }

    /// Number of distinct values in the dictionary.
    pub fn cardinality(&self) -> usize {
        self.dictionary.len()
    }

    /// The string behind `id`, or `None` when the id is outside the
    /// dictionary. Decoded lazily and retained in the cache while the byte
    /// budget lasts.
    pub fn lookup_name(&self, id: u32) -> ColumnResult<Option<Arc<str>>> {
        if id as usize >= self.dictionary.len() {
            return Ok(None);
        }
        if let Some(cache) = &self.cache {
            if let Some(name) = cache.get(&id) {
                return Ok(Some(name));
            }
        }
        let name = self.dictionary.get(id as usize)?;
        if let Some(cache) = &self.cache {
            cache.insert(id, name.clone());
        }
        Ok(Some(name))
    }

    /// Dictionary id of `name`, `-(insertion_point) - 1` when absent.
    pub fn lookup_id(&self, name: &str) -> i32 {
        self.dictionary.index_of(name.as_bytes())
    }

    /// The id at `row` of a single-valued column.
    ///
    /// Panics when the column is multi-valued.
    pub fn get_single(&self, row: usize) -> ColumnResult<u32> {
        match &self.values {
            ValueStorage::Single(ints) => ints.get(row),
            ValueStorage::Multi(_) => panic!(
                "{}",
                ColumnError::InvalidArity {
                    accessor: "get_single",
                    arity: "multi-valued",
                }
            ),
        }
    }

    /// The ordered ids at `row` of a multi-valued column.
    ///
    /// Panics when the column is single-valued.
    pub fn get_multi(&self, row: usize) -> ColumnResult<VSizeInts> {
        match &self.values {
            ValueStorage::Multi(ragged) => ragged.get(row),
            ValueStorage::Single(_) => panic!(
                "{}",
                ColumnError::InvalidArity {
                    accessor: "get_multi",
                    arity: "single-valued",
                }
            ),
        }
    }

    /// The rows holding `name`; empty when the value is not in the
    /// dictionary.
    pub fn bitmap_for(&self, name: &str) -> ColumnResult<Bitmap> {
        self.bitmap_index.get_by_value(name)
    }

    pub fn bitmap_index(&self) -> &BitmapIndex {
        &self.bitmap_index
    }

    /// Bitmaps of every indexed point inside `bounds`; `None` when the
    /// column carries no spatial index.
    pub fn spatial_search(&self, bounds: &Bounds) -> Option<Vec<Bitmap>> {
        self.spatial_index.as_ref().map(|tree| tree.search(bounds))
    }

    pub fn spatial_index(&self) -> Option<&ImmutableRTree> {
        self.spatial_index.as_deref()
    }
}
