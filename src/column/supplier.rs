// Copyright 2024 DictCol Project Authors. Licensed under Apache-2.0.

//! Deferred accessor constructors.
//!
//! The codec registers suppliers while peeling components off the buffer;
//! the segment loader asks for accessors later, possibly never. Everything a
//! supplier holds is a refcounted view, so `get` is construction, not I/O.

use std::sync::Arc;

use super::{BitmapIndex, DictionaryEncodedColumn, ValueStorage};
use crate::bitmap::{BitmapFactory, BitmapObjectStrategy};
use crate::data::{GenericIndexed, StringStrategy};
use crate::spatial::ImmutableRTree;

pub struct DictionaryEncodedColumnSupplier {
    dictionary: GenericIndexed<StringStrategy>,
    values: ValueStorage,
    column_cache_size_bytes: u64,
}

impl DictionaryEncodedColumnSupplier {
    pub fn new(
        dictionary: GenericIndexed<StringStrategy>,
        values: ValueStorage,
        column_cache_size_bytes: u64,
    ) -> Self {
        Self {
            dictionary,
            values,
            column_cache_size_bytes,
        }
    }

    /// Builds the composite accessor. The bitmap index and spatial index are
    /// decoded after the id storage, so the builder passes them in once the
    /// whole column has been read.
    pub fn get(
        &self,
        bitmap_index: BitmapIndex,
        spatial_index: Option<Arc<ImmutableRTree>>,
    ) -> DictionaryEncodedColumn {
        DictionaryEncodedColumn::new(
            self.dictionary.clone(),
            self.values.clone(),
            bitmap_index,
            spatial_index,
            self.column_cache_size_bytes,
        )
    }
}

pub struct BitmapIndexSupplier {
    factory: BitmapFactory,
    bitmaps: GenericIndexed<BitmapObjectStrategy>,
    dictionary: GenericIndexed<StringStrategy>,
}

impl BitmapIndexSupplier {
    pub fn new(
        factory: BitmapFactory,
        bitmaps: GenericIndexed<BitmapObjectStrategy>,
        dictionary: GenericIndexed<StringStrategy>,
    ) -> Self {
        Self {
            factory,
            bitmaps,
            dictionary,
        }
    }

    pub fn get(&self) -> BitmapIndex {
        BitmapIndex::new(
            self.factory,
            self.bitmaps.clone(),
            self.dictionary.clone(),
        )
    }
}

pub struct SpatialIndexSupplier {
    tree: Arc<ImmutableRTree>,
}

impl SpatialIndexSupplier {
    pub fn new(tree: Arc<ImmutableRTree>) -> Self {
        Self { tree }
    }

    pub fn get(&self) -> Arc<ImmutableRTree> {
        self.tree.clone()
    }
}
