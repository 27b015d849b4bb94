// Copyright 2024 DictCol Project Authors. Licensed under Apache-2.0.

use std::sync::Arc;

use super::{
    BitmapIndex, BitmapIndexSupplier, DictionaryEncodedColumn, DictionaryEncodedColumnSupplier,
    SpatialIndexSupplier, ValueType,
};
use crate::spatial::ImmutableRTree;

/// Sink the codec registers decoded column parts on.
///
/// Mirrors the read order of the format: type and arity first, then the
/// suppliers as their payloads come off the buffer.
#[derive(Default)]
pub struct ColumnBuilder {
    value_type: Option<ValueType>,
    has_multiple_values: bool,
    dictionary_encoded: Option<DictionaryEncodedColumnSupplier>,
    bitmap_index: Option<BitmapIndexSupplier>,
    spatial_index: Option<SpatialIndexSupplier>,
}

impl ColumnBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_type(&mut self, value_type: ValueType) -> &mut Self {
        self.value_type = Some(value_type);
        self
    }

    pub fn set_has_multiple_values(&mut self, has_multiple_values: bool) -> &mut Self {
        self.has_multiple_values = has_multiple_values;
        self
    }

    pub fn set_dictionary_encoded_column(
        &mut self,
        supplier: DictionaryEncodedColumnSupplier,
    ) -> &mut Self {
        self.dictionary_encoded = Some(supplier);
        self
    }

    pub fn set_bitmap_index(&mut self, supplier: BitmapIndexSupplier) -> &mut Self {
        self.bitmap_index = Some(supplier);
        self
    }

    pub fn set_spatial_index(&mut self, supplier: SpatialIndexSupplier) -> &mut Self {
        self.spatial_index = Some(supplier);
        self
    }

    /// Finalizes the handle. The codec always registers the type, the
    /// dictionary column, and the bitmap index before this is called;
    /// missing parts are a programmer error.
    pub fn build(self) -> Column {
        Column {
            value_type: self.value_type.expect("column type not set"),
            has_multiple_values: self.has_multiple_values,
            dictionary_encoded: self
                .dictionary_encoded
                .expect("dictionary-encoded column supplier not set"),
            bitmap_index: self.bitmap_index.expect("bitmap index supplier not set"),
            spatial_index: self.spatial_index,
        }
    }
}

/// A decoded column: metadata plus deferred accessors.
pub struct Column {
    value_type: ValueType,
    has_multiple_values: bool,
    dictionary_encoded: DictionaryEncodedColumnSupplier,
    bitmap_index: BitmapIndexSupplier,
    spatial_index: Option<SpatialIndexSupplier>,
}

impl Column {
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn has_multiple_values(&self) -> bool {
        self.has_multiple_values
    }

    pub fn dictionary_encoded(&self) -> DictionaryEncodedColumn {
        self.dictionary_encoded
            .get(self.bitmap_index(), self.spatial_index())
    }

    pub fn bitmap_index(&self) -> BitmapIndex {
        self.bitmap_index.get()
    }

    pub fn spatial_index(&self) -> Option<Arc<ImmutableRTree>> {
        self.spatial_index.as_ref().map(|supplier| supplier.get())
    }
}
