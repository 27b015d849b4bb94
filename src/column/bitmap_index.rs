// Copyright 2024 DictCol Project Authors. Licensed under Apache-2.0.

use crate::bitmap::{Bitmap, BitmapFactory, BitmapObjectStrategy};
use crate::data::{GenericIndexed, StringStrategy};
use crate::error::ColumnResult;

/// Per-value inverted index: element `i` is the set of row ordinals whose
/// value is dictionary id `i`.
///
/// Couples the dictionary, the bitmap array, and the factory so predicate
/// evaluation never touches the bitmap layout directly.
#[derive(Clone)]
pub struct BitmapIndex {
    factory: BitmapFactory,
    bitmaps: GenericIndexed<BitmapObjectStrategy>,
    dictionary: GenericIndexed<StringStrategy>,
}

impl BitmapIndex {
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

    /// Number of indexed values, equal to the dictionary cardinality.
    pub fn cardinality(&self) -> usize {
        self.bitmaps.len()
    }

    pub fn get(&self, id: u32) -> ColumnResult<Bitmap> {
        self.bitmaps.get(id as usize)
    }

    /// The rows holding `value`; the factory's empty bitmap when the value
    /// is not in the dictionary.
    pub fn get_by_value(&self, value: &str) -> ColumnResult<Bitmap> {
        match self.dictionary.index_of(value.as_bytes()) {
            id if id >= 0 => self.get(id as u32),
            _ => Ok(self.factory.empty()),
        }
    }

    pub fn factory(&self) -> BitmapFactory {
        self.factory
    }
}
