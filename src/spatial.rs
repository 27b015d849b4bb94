// Copyright 2024 DictCol Project Authors. Licensed under Apache-2.0.

//! Spatial index over (point, bitmap) pairs.
//!
//! The R-tree proper comes from `rstar`; this module only persists and
//! restores it. The serialized form is the leaf set, and the tree is rebuilt
//! by bulk load at decode time:
//! ```plain
//! | version (u8) | num_dims (u8) | num_points (u32) |
//! | num_points * ( coords (num_dims * f32) | bitmap_bytes (u32) | bitmap ) |
//! ```
//! Because this payload does not self-delimit, the column stores it behind a
//! `u32` byte-length prefix (see [`read_spatial`]).

use bytes::{Buf, BufMut, Bytes};
use rstar::{RTree, RTreeObject, AABB};

use crate::bitmap::{Bitmap, BitmapFactory};
use crate::data::ObjectStrategy;
use crate::error::{ColumnResult, TracedColumnError};

/// Version byte of the serialized form.
pub const SPATIAL_VERSION: u8 = 0x0;

const NUM_DIMS: usize = 2;

/// A 2-d point paired with the rows it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialEntry {
    pub point: [f32; 2],
    pub bitmap: Bitmap,
}

impl RTreeObject for SpatialEntry {
    type Envelope = AABB<[f32; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

/// Axis-aligned query rectangle for [`ImmutableRTree::search`].
#[derive(Debug, Clone, Copy)]
pub struct Bounds {
    pub min: [f32; 2],
    pub max: [f32; 2],
}

impl Bounds {
    pub fn new(min: [f32; 2], max: [f32; 2]) -> Self {
        Self { min, max }
    }
}

/// Immutable R-tree mapping points to row bitmaps. Built once at segment
/// write; queries never mutate it.
#[derive(Clone)]
pub struct ImmutableRTree {
    tree: RTree<SpatialEntry>,
}

impl ImmutableRTree {
    pub fn from_entries(entries: Vec<SpatialEntry>) -> Self {
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Bitmaps of every point inside `bounds` (borders inclusive).
    pub fn search(&self, bounds: &Bounds) -> Vec<Bitmap> {
        let envelope = AABB::from_corners(bounds.min, bounds.max);
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.bitmap.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    pub fn num_dims(&self) -> usize {
        NUM_DIMS
    }

    fn entries(&self) -> impl Iterator<Item = &SpatialEntry> {
        self.tree.iter()
    }
}

/// [`ObjectStrategy`] for the spatial index. Carries the bitmap factory
/// because every leaf stores a bitmap.
#[derive(Clone, Copy)]
pub struct RTreeObjectStrategy {
    factory: BitmapFactory,
}

impl RTreeObjectStrategy {
    pub fn new(factory: BitmapFactory) -> Self {
        Self { factory }
    }
}

impl ObjectStrategy for RTreeObjectStrategy {
    type Item = ImmutableRTree;

    fn from_bytes(&self, span: Bytes) -> ColumnResult<ImmutableRTree> {
        let mut buf = span;
        if buf.remaining() < 6 {
            return Err(TracedColumnError::corrupt(
                "unexpected end of spatial index header",
            ));
        }
        let version = buf.get_u8();
        if version != SPATIAL_VERSION {
            return Err(TracedColumnError::corrupt(format!(
                "unknown spatial index version {:#x}",
                version
            )));
        }
        let num_dims = buf.get_u8() as usize;
        if num_dims != NUM_DIMS {
            return Err(TracedColumnError::corrupt(format!(
                "spatial index has {} dimensions, expected {}",
                num_dims, NUM_DIMS
            )));
        }
        let num_points = buf.get_u32() as usize;
        let mut entries = Vec::with_capacity(num_points);
        for _ in 0..num_points {
            if buf.remaining() < NUM_DIMS * 4 + 4 {
                return Err(TracedColumnError::corrupt(
                    "unexpected end of spatial index entry",
                ));
            }
            let point = [buf.get_f32(), buf.get_f32()];
            let bitmap_bytes = buf.get_u32() as usize;
            if buf.remaining() < bitmap_bytes {
                return Err(TracedColumnError::corrupt(format!(
                    "spatial bitmap truncated: expected {} bytes, found {}",
                    bitmap_bytes,
                    buf.remaining()
                )));
            }
            let bitmap = self.factory.deserialize(&buf.split_to(bitmap_bytes))?;
            entries.push(SpatialEntry { point, bitmap });
        }
        if buf.has_remaining() {
            return Err(TracedColumnError::corrupt(format!(
                "{} trailing bytes after spatial index",
                buf.remaining()
            )));
        }
        Ok(ImmutableRTree::from_entries(entries))
    }

    fn to_bytes(&self, item: &ImmutableRTree) -> ColumnResult<Vec<u8>> {
        let mut out = Vec::new();
        out.put_u8(SPATIAL_VERSION);
        out.put_u8(NUM_DIMS as u8);
        out.put_u32(item.len() as u32);
        for entry in item.entries() {
            for coord in entry.point {
                out.put_f32(coord);
            }
            let bitmap = self.factory.serialize(&entry.bitmap)?;
            out.put_u32(bitmap.len() as u32);
            out.put_slice(&bitmap);
        }
        Ok(out)
    }

    fn compare(&self, _a: &[u8], _b: &[u8]) -> std::cmp::Ordering {
        panic!("spatial indexes have no byte-order comparator")
    }
}

/// Reads a `u32`-length-prefixed spatial index, returning the decoded tree
/// together with the exact span it occupied.
pub fn read_spatial(
    buf: &mut Bytes,
    strategy: &RTreeObjectStrategy,
) -> ColumnResult<(ImmutableRTree, Bytes)> {
    if buf.remaining() < 4 {
        return Err(TracedColumnError::corrupt(
            "unexpected end of spatial index length",
        ));
    }
    let num_bytes = buf.get_u32() as usize;
    if buf.remaining() < num_bytes {
        return Err(TracedColumnError::corrupt(format!(
            "spatial index truncated: expected {} bytes, found {}",
            num_bytes,
            buf.remaining()
        )));
    }
    let span = buf.split_to(num_bytes);
    let tree = strategy.from_bytes(span.clone())?;
    Ok((tree, span))
}
