// Copyright 2024 DictCol Project Authors. Licensed under Apache-2.0.

//! Row-ordinal bitmaps and the factory that selects their encoding.
//!
//! The column format treats bitmaps as opaque spans; everything that knows
//! the concrete encoding lives here. Two encodings are supported: the legacy
//! bit-vector (raw LSB0 bit bytes, row `r` = bit `r`) and roaring (the
//! crate's portable serialization). The encoding in effect is persisted in
//! segment metadata as a small string tag; readers seeing no tag fall back
//! to the legacy encoding.

use std::cmp::Ordering;

use bitvec::prelude::{BitVec, Lsb0};
use bytes::Bytes;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use crate::data::ObjectStrategy;
use crate::error::{ColumnResult, TracedColumnError};

/// A set of row ordinals.
#[derive(Debug, Clone)]
pub enum Bitmap {
    BitVec(BitVec<u8, Lsb0>),
    Roaring(RoaringBitmap),
}

impl Bitmap {
    pub fn contains(&self, row: u32) -> bool {
        match self {
            Bitmap::BitVec(bits) => bits.get(row as usize).map(|bit| *bit).unwrap_or(false),
            Bitmap::Roaring(bits) => bits.contains(row),
        }
    }

    pub fn cardinality(&self) -> u64 {
        match self {
            Bitmap::BitVec(bits) => bits.count_ones() as u64,
            Bitmap::Roaring(bits) => bits.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cardinality() == 0
    }

    pub fn insert(&mut self, row: u32) {
        match self {
            Bitmap::BitVec(bits) => {
                let row = row as usize;
                if row >= bits.len() {
                    bits.resize(row + 1, false);
                }
                bits.set(row, true);
            }
            Bitmap::Roaring(bits) => {
                bits.insert(row);
            }
        }
    }

    /// Set rows in increasing order.
    pub fn iter(&self) -> BitmapIter<'_> {
        match self {
            Bitmap::BitVec(bits) => BitmapIter::BitVec(bits.iter_ones()),
            Bitmap::Roaring(bits) => BitmapIter::Roaring(bits.iter()),
        }
    }
}

impl PartialEq for Bitmap {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            // trailing zero bits are insignificant
            (Bitmap::BitVec(a), Bitmap::BitVec(b)) => a.iter_ones().eq(b.iter_ones()),
            (Bitmap::Roaring(a), Bitmap::Roaring(b)) => a == b,
            _ => false,
        }
    }
}

pub enum BitmapIter<'a> {
    BitVec(bitvec::slice::IterOnes<'a, u8, Lsb0>),
    Roaring(roaring::bitmap::Iter<'a>),
}

impl Iterator for BitmapIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        match self {
            BitmapIter::BitVec(ones) => ones.next().map(|row| row as u32),
            BitmapIter::Roaring(rows) => rows.next(),
        }
    }
}

/// Produces, combines, and (de)serializes bitmaps of one concrete encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitmapFactory {
    BitVec,
    Roaring,
}

impl BitmapFactory {
    pub fn empty(&self) -> Bitmap {
        match self {
            BitmapFactory::BitVec => Bitmap::BitVec(BitVec::new()),
            BitmapFactory::Roaring => Bitmap::Roaring(RoaringBitmap::new()),
        }
    }

    pub fn of(&self, rows: impl IntoIterator<Item = u32>) -> Bitmap {
        let mut bitmap = self.empty();
        for row in rows {
            bitmap.insert(row);
        }
        bitmap
    }

    /// Union in this factory's encoding, regardless of the encodings of the
    /// inputs.
    pub fn union<'a>(&self, bitmaps: impl IntoIterator<Item = &'a Bitmap>) -> Bitmap {
        let mut out = self.empty();
        for bitmap in bitmaps {
            if let (Bitmap::Roaring(acc), Bitmap::Roaring(rhs)) = (&mut out, bitmap) {
                *acc |= rhs;
                continue;
            }
            for row in bitmap.iter() {
                out.insert(row);
            }
        }
        out
    }

    pub fn deserialize(&self, span: &Bytes) -> ColumnResult<Bitmap> {
        match self {
            BitmapFactory::BitVec => Ok(Bitmap::BitVec(BitVec::from_slice(span))),
            BitmapFactory::Roaring => RoaringBitmap::deserialize_from(&span[..])
                .map(Bitmap::Roaring)
                .map_err(|e| TracedColumnError::collaborator("roaring bitmap factory", e)),
        }
    }

    pub fn serialize(&self, bitmap: &Bitmap) -> ColumnResult<Vec<u8>> {
        match (self, bitmap) {
            (BitmapFactory::BitVec, Bitmap::BitVec(bits)) => Ok(bits.as_raw_slice().to_vec()),
            (BitmapFactory::Roaring, Bitmap::Roaring(bits)) => {
                let mut out = Vec::with_capacity(bits.serialized_size());
                bits.serialize_into(&mut out)
                    .map_err(|e| TracedColumnError::collaborator("roaring bitmap factory", e))?;
                Ok(out)
            }
            _ => Err(TracedColumnError::collaborator(
                "bitmap factory",
                "bitmap encoding does not match the factory",
            )),
        }
    }
}

/// Serde-tagged selector for the bitmap encoding persisted in segment
/// metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitmapSerdeFactory {
    #[default]
    Legacy,
    Roaring,
}

impl BitmapSerdeFactory {
    pub fn bitmap_factory(&self) -> BitmapFactory {
        match self {
            BitmapSerdeFactory::Legacy => BitmapFactory::BitVec,
            BitmapSerdeFactory::Roaring => BitmapFactory::Roaring,
        }
    }

    pub fn object_strategy(&self) -> BitmapObjectStrategy {
        BitmapObjectStrategy::new(self.bitmap_factory())
    }
}

/// [`ObjectStrategy`] for the per-value bitmap index, delegating to the
/// factory.
#[derive(Clone, Copy)]
pub struct BitmapObjectStrategy {
    factory: BitmapFactory,
}

impl BitmapObjectStrategy {
    pub fn new(factory: BitmapFactory) -> Self {
        Self { factory }
    }
}

impl ObjectStrategy for BitmapObjectStrategy {
    type Item = Bitmap;

    fn from_bytes(&self, span: Bytes) -> ColumnResult<Bitmap> {
        self.factory.deserialize(&span)
    }

    fn to_bytes(&self, item: &Bitmap) -> ColumnResult<Vec<u8>> {
        self.factory.serialize(item)
    }

    fn compare(&self, _a: &[u8], _b: &[u8]) -> Ordering {
        panic!("bitmaps have no byte-order comparator")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FACTORIES: [BitmapFactory; 2] = [BitmapFactory::BitVec, BitmapFactory::Roaring];

    #[test]
    fn test_membership() {
        for factory in FACTORIES {
            let bitmap = factory.of([0, 2, 5]);
            assert!(bitmap.contains(0));
            assert!(!bitmap.contains(1));
            assert!(bitmap.contains(5));
            assert!(!bitmap.contains(100));
            assert_eq!(bitmap.cardinality(), 3);
            assert_eq!(bitmap.iter().collect::<Vec<_>>(), vec![0, 2, 5]);
        }
    }

    #[test]
    fn test_empty() {
        for factory in FACTORIES {
            let bitmap = factory.empty();
            assert!(bitmap.is_empty());
            assert_eq!(bitmap.iter().count(), 0);
        }
    }

    #[test]
    fn test_union() {
        for factory in FACTORIES {
            let a = factory.of([1, 3]);
            let b = factory.of([2, 3, 8]);
            let union = factory.union([&a, &b]);
            assert_eq!(union.iter().collect::<Vec<_>>(), vec![1, 2, 3, 8]);
        }
    }

    #[test]
    fn test_serialize_round_trip() {
        for factory in FACTORIES {
            let bitmap = factory.of([0, 7, 8, 1000]);
            let bytes = Bytes::from(factory.serialize(&bitmap).unwrap());
            let decoded = factory.deserialize(&bytes).unwrap();
            assert_eq!(decoded, bitmap);
        }
    }

    #[test]
    fn test_empty_serialized_round_trip() {
        for factory in FACTORIES {
            let bytes = Bytes::from(factory.serialize(&factory.empty()).unwrap());
            let decoded = factory.deserialize(&bytes).unwrap();
            assert!(decoded.is_empty());
        }
    }

    #[test]
    fn test_roaring_rejects_garbage() {
        let garbage = Bytes::from_static(&[0x13, 0x37]);
        assert!(BitmapFactory::Roaring.deserialize(&garbage).is_err());
    }

    #[test]
    fn test_encoding_mismatch() {
        let roaring = BitmapFactory::Roaring.of([1]);
        assert!(BitmapFactory::BitVec.serialize(&roaring).is_err());
    }

    #[test]
    fn test_serde_factory_tags() {
        assert_eq!(
            serde_json::to_string(&BitmapSerdeFactory::Legacy).unwrap(),
            "\"legacy\""
        );
        assert_eq!(
            serde_json::from_str::<BitmapSerdeFactory>("\"roaring\"").unwrap(),
            BitmapSerdeFactory::Roaring
        );
        assert_eq!(BitmapSerdeFactory::default(), BitmapSerdeFactory::Legacy);
    }
}
