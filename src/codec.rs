// Copyright 2024 DictCol Project Authors. Licensed under Apache-2.0.

//! Write/read driver for the dictionary-encoded column part.
//!
//! The format is positional, not tagged: one arity flag byte, then the
//! dictionary, the id storage the flag selects, the bitmap index, and an
//! optional spatial index whose presence is signalled only by bytes
//! remaining in the buffer.

use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes};
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::data::ObjectStrategy;
use tracing::debug;

use crate::bitmap::{BitmapObjectStrategy, BitmapSerdeFactory};
use crate::column::{
    BitmapIndexSupplier, ColumnBuilder, ColumnConfig, DictionaryEncodedColumnSupplier,
    SpatialIndexSupplier, ValueStorage, ValueType,
};
use crate::data::{GenericIndexed, StringStrategy, VSizeInts, VSizeRagged};
use crate::error::{ColumnResult, TracedColumnError};
use crate::spatial::{read_spatial, ImmutableRTree, RTreeObjectStrategy};

const SINGLE_VALUED_FLAG: u8 = 0x0;
const MULTI_VALUED_FLAG: u8 = 0x1;

/// Serde of one dictionary-encoded column part.
///
/// Lives in one of two states. A `Descriptor` is what segment metadata
/// deserializes into: arity and bitmap encoding, no payloads; its only use
/// is driving [`Self::read`]. A `Materialized` instance carries payloads and
/// can be written. Asking a descriptor to write is a programmer error and
/// fails fatally.
pub enum DictionaryColumnCodec {
    Descriptor {
        is_single_valued: bool,
        bitmap_serde: BitmapSerdeFactory,
    },
    Materialized(MaterializedColumn),
}

impl DictionaryColumnCodec {
    pub fn descriptor(is_single_valued: bool, bitmap_serde: BitmapSerdeFactory) -> Self {
        Self::Descriptor {
            is_single_valued,
            bitmap_serde,
        }
    }

    pub fn is_single_valued(&self) -> bool {
        match self {
            Self::Descriptor {
                is_single_valued, ..
            } => *is_single_valued,
            Self::Materialized(column) => !column.values.is_multi(),
        }
    }

    pub fn bitmap_serde(&self) -> BitmapSerdeFactory {
        match self {
            Self::Descriptor { bitmap_serde, .. } => *bitmap_serde,
            Self::Materialized(column) => column.bitmap_serde,
        }
    }

    /// Total bytes [`Self::write_to`] will emit. Reported ahead of the write
    /// so the segment writer can stitch its directory.
    pub fn num_bytes(&self) -> usize {
        match self {
            Self::Descriptor { .. } => panic!("num_bytes on a descriptor-only column codec"),
            Self::Materialized(column) => 1 + column.size,
        }
    }

    pub fn write_to(&self, buf: &mut impl BufMut) {
        match self {
            Self::Descriptor { .. } => panic!("write on a descriptor-only column codec"),
            Self::Materialized(column) => column.write_to(buf),
        }
    }

    /// Decodes a column positioned at the start of `buf`, registering
    /// accessor suppliers on `builder`, and returns the materialized codec.
    pub fn read(
        &self,
        buf: &mut Bytes,
        builder: &mut ColumnBuilder,
        config: &ColumnConfig,
    ) -> ColumnResult<DictionaryColumnCodec> {
        let bitmap_serde = self.bitmap_serde();
        let factory = bitmap_serde.bitmap_factory();

        if !buf.has_remaining() {
            return Err(TracedColumnError::corrupt("empty column buffer"));
        }
        let is_single_valued = match buf.get_u8() {
            SINGLE_VALUED_FLAG => true,
            MULTI_VALUED_FLAG => false,
            flag => {
                return Err(TracedColumnError::corrupt(format!(
                    "unknown column arity flag {:#x}",
                    flag
                )))
            }
        };

        let dictionary = GenericIndexed::read_from(buf, StringStrategy)?;
        builder.set_type(ValueType::String);

        let values = if is_single_valued {
            ValueStorage::Single(VSizeInts::read_from(buf)?)
        } else {
            ValueStorage::Multi(VSizeRagged::read_from(buf)?)
        };
        builder
            .set_has_multiple_values(!is_single_valued)
            .set_dictionary_encoded_column(DictionaryEncodedColumnSupplier::new(
                dictionary.clone(),
                values.clone(),
                config.column_cache_size_bytes,
            ));

        let bitmaps = GenericIndexed::read_from(buf, bitmap_serde.object_strategy())?;
        if bitmaps.len() != dictionary.len() {
            return Err(TracedColumnError::corrupt(format!(
                "{} bitmaps for a dictionary of {} values",
                bitmaps.len(),
                dictionary.len()
            )));
        }
        builder.set_bitmap_index(BitmapIndexSupplier::new(
            factory,
            bitmaps.clone(),
            dictionary.clone(),
        ));

        let spatial = if buf.has_remaining() {
            let strategy = RTreeObjectStrategy::new(factory);
            let (tree, span) = read_spatial(buf, &strategy)?;
            let tree = Arc::new(tree);
            builder.set_spatial_index(SpatialIndexSupplier::new(tree.clone()));
            Some(SpatialPart { tree, bytes: span })
        } else {
            None
        };

        debug!(
            rows = values.len(),
            cardinality = dictionary.len(),
            single_valued = is_single_valued,
            spatial = spatial.is_some(),
            "decoded dictionary-encoded column"
        );

        Ok(Self::Materialized(MaterializedColumn::assemble(
            bitmap_serde,
            dictionary,
            values,
            bitmaps,
            spatial,
        )))
    }
}

/// Payload-bearing state of the codec.
pub struct MaterializedColumn {
    bitmap_serde: BitmapSerdeFactory,
    dictionary: GenericIndexed<StringStrategy>,
    values: ValueStorage,
    bitmaps: GenericIndexed<BitmapObjectStrategy>,
    spatial: Option<SpatialPart>,
    size: usize,
}

/// A spatial index together with its serialized payload, kept so that
/// `num_bytes` and `write_to` agree without re-serializing the tree.
struct SpatialPart {
    tree: Arc<ImmutableRTree>,
    bytes: Bytes,
}

impl MaterializedColumn {
    /// Assembles the writer-side state. The bitmap array must parallel the
    /// dictionary; violating that is a builder bug upstream.
    pub fn new(
        bitmap_serde: BitmapSerdeFactory,
        dictionary: GenericIndexed<StringStrategy>,
        values: ValueStorage,
        bitmaps: GenericIndexed<BitmapObjectStrategy>,
        spatial: Option<ImmutableRTree>,
    ) -> ColumnResult<Self> {
        assert_eq!(
            bitmaps.len(),
            dictionary.len(),
            "bitmap index must parallel the dictionary"
        );
        let spatial = spatial
            .map(|tree| -> ColumnResult<SpatialPart> {
                let strategy = RTreeObjectStrategy::new(bitmap_serde.bitmap_factory());
                let bytes = strategy.to_bytes(&tree)?;
                Ok(SpatialPart {
                    tree: Arc::new(tree),
                    bytes: bytes.into(),
                })
            })
            .transpose()?;
        Ok(Self::assemble(
            bitmap_serde,
            dictionary,
            values,
            bitmaps,
            spatial,
        ))
    }

    fn assemble(
        bitmap_serde: BitmapSerdeFactory,
        dictionary: GenericIndexed<StringStrategy>,
        values: ValueStorage,
        bitmaps: GenericIndexed<BitmapObjectStrategy>,
        spatial: Option<SpatialPart>,
    ) -> Self {
        let values_size = match &values {
            ValueStorage::Single(ints) => ints.serialized_size(),
            ValueStorage::Multi(ragged) => ragged.serialized_size(),
        };
        let size = dictionary.serialized_size()
            + values_size
            + bitmaps.serialized_size()
            + spatial
                .as_ref()
                .map(|part| 4 + part.bytes.len())
                .unwrap_or(0);
        Self {
            bitmap_serde,
            dictionary,
            values,
            bitmaps,
            spatial,
            size,
        }
    }

    pub fn spatial_index(&self) -> Option<&ImmutableRTree> {
        self.spatial.as_ref().map(|part| &*part.tree)
    }

    fn write_to(&self, buf: &mut impl BufMut) {
        debug!(
            rows = self.values.len(),
            cardinality = self.dictionary.len(),
            single_valued = !self.values.is_multi(),
            spatial = self.spatial.is_some(),
            "writing dictionary-encoded column"
        );
        buf.put_u8(if self.values.is_multi() {
            MULTI_VALUED_FLAG
        } else {
            SINGLE_VALUED_FLAG
        });
        self.dictionary.write_to(buf);
        match &self.values {
            ValueStorage::Single(ints) => ints.write_to(buf),
            ValueStorage::Multi(ragged) => ragged.write_to(buf),
        }
        self.bitmaps.write_to(buf);
        if let Some(part) = &self.spatial {
            buf.put_u32(part.bytes.len() as u32);
            buf.put_slice(&part.bytes);
        }
    }
}

impl From<MaterializedColumn> for DictionaryColumnCodec {
    fn from(column: MaterializedColumn) -> Self {
        Self::Materialized(column)
    }
}

/// The shape the codec takes in segment metadata: arity plus the bitmap
/// encoding tag. A missing tag selects the legacy encoding, so segments
/// written before the tag existed keep reading.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CodecMeta {
    is_single_valued: bool,
    #[serde(default)]
    bitmap_serde_factory: BitmapSerdeFactory,
}

impl Serialize for DictionaryColumnCodec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        CodecMeta {
            is_single_valued: self.is_single_valued(),
            bitmap_serde_factory: self.bitmap_serde(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DictionaryColumnCodec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let meta = CodecMeta::deserialize(deserializer)?;
        Ok(Self::Descriptor {
            is_single_valued: meta.is_single_valued,
            bitmap_serde: meta.bitmap_serde_factory,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::BitmapFactory;

    fn single_column(bitmap_serde: BitmapSerdeFactory) -> DictionaryColumnCodec {
        let factory = bitmap_serde.bitmap_factory();
        let dictionary = GenericIndexed::from_items(
            &["a".into(), "b".into(), "c".into()],
            StringStrategy,
            true,
        )
        .unwrap();
        let rows = [0u32, 2, 1, 2, 0];
        let bitmaps: Vec<_> = (0..3u32)
            .map(|id| {
                factory.of(
                    rows.iter()
                        .enumerate()
                        .filter(|(_, value)| **value == id)
                        .map(|(row, _)| row as u32),
                )
            })
            .collect();
        let bitmaps =
            GenericIndexed::from_items(&bitmaps, bitmap_serde.object_strategy(), false).unwrap();
        MaterializedColumn::new(
            bitmap_serde,
            dictionary,
            ValueStorage::Single(VSizeInts::from_slice(&rows, 2)),
            bitmaps,
            None,
        )
        .unwrap()
        .into()
    }

    #[test]
    fn test_num_bytes_matches_write() {
        for bitmap_serde in [BitmapSerdeFactory::Legacy, BitmapSerdeFactory::Roaring] {
            let codec = single_column(bitmap_serde);
            let mut encoded = vec![];
            codec.write_to(&mut encoded);
            assert_eq!(encoded.len(), codec.num_bytes());
        }
    }

    #[test]
    fn test_read_registers_suppliers() {
        let codec = single_column(BitmapSerdeFactory::Legacy);
        let mut encoded = vec![];
        codec.write_to(&mut encoded);

        let descriptor = DictionaryColumnCodec::descriptor(true, BitmapSerdeFactory::Legacy);
        let mut builder = ColumnBuilder::new();
        let mut buf = Bytes::from(encoded);
        descriptor
            .read(&mut buf, &mut builder, &ColumnConfig::default())
            .unwrap();
        assert_eq!(buf.remaining(), 0);

        let column = builder.build();
        assert_eq!(column.value_type(), ValueType::String);
        assert!(!column.has_multiple_values());
        assert!(column.spatial_index().is_none());

        let accessor = column.dictionary_encoded();
        assert_eq!(accessor.len(), 5);
        assert_eq!(accessor.get_single(1).unwrap(), 2);
        assert_eq!(
            accessor.bitmap_for("b").unwrap().iter().collect::<Vec<_>>(),
            vec![2]
        );
    }

    #[test]
    #[should_panic(expected = "descriptor-only")]
    fn test_write_on_descriptor_panics() {
        let descriptor = DictionaryColumnCodec::descriptor(true, BitmapSerdeFactory::Legacy);
        let mut out = vec![];
        descriptor.write_to(&mut out);
    }

    #[test]
    fn test_metadata_round_trip() {
        let json = serde_json::to_string(&single_column(BitmapSerdeFactory::Roaring)).unwrap();
        assert_eq!(
            json,
            "{\"isSingleValued\":true,\"bitmapSerdeFactory\":\"roaring\"}"
        );
        let codec: DictionaryColumnCodec = serde_json::from_str(&json).unwrap();
        assert!(matches!(codec, DictionaryColumnCodec::Descriptor { .. }));
        assert_eq!(codec.bitmap_serde(), BitmapSerdeFactory::Roaring);
    }

    #[test]
    fn test_missing_factory_tag_defaults_to_legacy() {
        let codec: DictionaryColumnCodec =
            serde_json::from_str("{\"isSingleValued\":false}").unwrap();
        assert!(!codec.is_single_valued());
        assert_eq!(codec.bitmap_serde(), BitmapSerdeFactory::Legacy);
        assert_eq!(
            codec.bitmap_serde().bitmap_factory(),
            BitmapFactory::BitVec
        );
    }
}
