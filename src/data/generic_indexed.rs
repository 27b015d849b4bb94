// Copyright 2024 DictCol Project Authors. Licensed under Apache-2.0.

use std::cmp::Ordering;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes};

use crate::error::{ColumnResult, TracedColumnError};

/// Version byte of the serialized form.
pub const GENERIC_INDEXED_VERSION: u8 = 0x1;

const FLAG_SORTED: u8 = 0x1;

/// Converts between byte spans and typed elements of a [`GenericIndexed`].
///
/// A strategy is a small capability record: decode a span, encode an item,
/// and order two serialized elements. `compare` is only meaningful for
/// strategies backing a sorted instance.
pub trait ObjectStrategy {
    type Item;

    fn from_bytes(&self, span: Bytes) -> ColumnResult<Self::Item>;

    fn to_bytes(&self, item: &Self::Item) -> ColumnResult<Vec<u8>>;

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// A length-prefixed, offset-indexed array of opaque items.
///
/// The serialized layout is
/// ```plain
/// | version (u8) | flags (u8) | total_bytes (u32) | count (u32) |
/// | offsets (count * u32) | payload (total_bytes - count * 4) |
/// ```
/// `offsets[i]` is the end offset of element `i` within the payload; element
/// `i` spans `[offsets[i - 1], offsets[i])` with `offsets[-1] == 0`. Bit 0 of
/// `flags` marks a sorted instance, which supports [`Self::index_of`].
///
/// Elements decode lazily: `get` hands the strategy a zero-copy span of the
/// backing buffer.
#[derive(Clone)]
pub struct GenericIndexed<S: ObjectStrategy> {
    offsets: Bytes,
    payload: Bytes,
    len: usize,
    sorted: bool,
    strategy: S,
}

impl<S: ObjectStrategy> GenericIndexed<S> {
    /// Serializes `items` through the strategy. When `sorted` is set the
    /// items must already be in strictly increasing `strategy.compare`
    /// order; violating that is a fatal programmer error.
    pub fn from_items(items: &[S::Item], strategy: S, sorted: bool) -> ColumnResult<Self> {
        let mut offsets = Vec::with_capacity(items.len() * 4);
        let mut payload: Vec<u8> = Vec::new();
        let mut prev_start = 0;
        for (index, item) in items.iter().enumerate() {
            let encoded = strategy.to_bytes(item)?;
            let start = payload.len();
            payload.extend_from_slice(&encoded);
            if sorted && index > 0 {
                let (head, cur) = payload.split_at(start);
                assert!(
                    strategy.compare(&head[prev_start..], cur) == Ordering::Less,
                    "sorted GenericIndexed requires strictly increasing items"
                );
            }
            prev_start = start;
            offsets.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        }
        Ok(Self {
            offsets: offsets.into(),
            payload: payload.into(),
            len: items.len(),
            sorted,
            strategy,
        })
    }

    /// Decodes element `index` through the strategy.
    pub fn get(&self, index: usize) -> ColumnResult<S::Item> {
        if index >= self.len {
            return Err(TracedColumnError::corrupt(format!(
                "element {} out of range 0..{}",
                index, self.len
            )));
        }
        self.strategy.from_bytes(self.span(index))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// Forward-only iteration over a snapshot of the backing buffer.
    pub fn iter(&self) -> impl Iterator<Item = ColumnResult<S::Item>> + '_ {
        (0..self.len).map(|index| self.get(index))
    }

    /// Binary search for `key` among the serialized elements. Returns the
    /// element index on a hit and `-(insertion_point) - 1` on a miss.
    ///
    /// Panics when called on an unsorted instance.
    pub fn index_of(&self, key: &[u8]) -> i32 {
        assert!(
            self.sorted,
            "index_of called on an unsorted GenericIndexed"
        );
        let mut lo: i64 = 0;
        let mut hi: i64 = self.len as i64 - 1;
        while lo <= hi {
            let mid = (lo + hi) / 2;
            match self.strategy.compare(&self.span(mid as usize), key) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid - 1,
                Ordering::Equal => return mid as i32,
            }
        }
        -(lo as i32) - 1
    }

    pub fn read_from(buf: &mut Bytes, strategy: S) -> ColumnResult<Self> {
        if buf.remaining() < 10 {
            return Err(TracedColumnError::corrupt(
                "unexpected end of indexed array header",
            ));
        }
        let version = buf.get_u8();
        if version != GENERIC_INDEXED_VERSION {
            return Err(TracedColumnError::corrupt(format!(
                "unknown indexed array version {:#x}",
                version
            )));
        }
        let flags = buf.get_u8();
        let total_bytes = buf.get_u32() as usize;
        let count = buf.get_u32() as usize;
        if total_bytes < count * 4 {
            return Err(TracedColumnError::corrupt(format!(
                "total of {} bytes cannot hold {} offsets",
                total_bytes, count
            )));
        }
        if buf.remaining() < total_bytes {
            return Err(TracedColumnError::corrupt(format!(
                "indexed array truncated: expected {} bytes, found {}",
                total_bytes,
                buf.remaining()
            )));
        }
        let offsets = buf.split_to(count * 4);
        let payload = buf.split_to(total_bytes - count * 4);

        let mut prev = 0;
        for index in 0..count {
            let end = end_offset(&offsets, index);
            if end < prev {
                return Err(TracedColumnError::corrupt(format!(
                    "non-monotonic offset {} after {}",
                    end, prev
                )));
            }
            prev = end;
        }
        if prev != payload.len() {
            return Err(TracedColumnError::corrupt(format!(
                "offsets end at {} but payload has {} bytes",
                prev,
                payload.len()
            )));
        }

        Ok(Self {
            offsets,
            payload,
            len: count,
            sorted: flags & FLAG_SORTED != 0,
            strategy,
        })
    }

    pub fn write_to(&self, buf: &mut impl BufMut) {
        buf.put_u8(GENERIC_INDEXED_VERSION);
        buf.put_u8(if self.sorted { FLAG_SORTED } else { 0 });
        buf.put_u32((self.offsets.len() + self.payload.len()) as u32);
        buf.put_u32(self.len as u32);
        buf.put_slice(&self.offsets);
        buf.put_slice(&self.payload);
    }

    pub fn serialized_size(&self) -> usize {
        1 + 1 + 4 + 4 + self.offsets.len() + self.payload.len()
    }

    fn span(&self, index: usize) -> Bytes {
        let start = if index == 0 {
            0
        } else {
            end_offset(&self.offsets, index - 1)
        };
        self.payload.slice(start..end_offset(&self.offsets, index))
    }
}

fn end_offset(offsets: &Bytes, index: usize) -> usize {
    let bytes = &offsets[index * 4..index * 4 + 4];
    u32::from_be_bytes(bytes.try_into().unwrap()) as usize
}

/// UTF-8 strings, length implied by the span, ordered by raw bytes.
///
/// The byte ordering is what makes the dictionary's `index_of` usable for
/// range predicates.
#[derive(Clone, Copy, Default)]
pub struct StringStrategy;

impl ObjectStrategy for StringStrategy {
    type Item = Arc<str>;

    fn from_bytes(&self, span: Bytes) -> ColumnResult<Arc<str>> {
        std::str::from_utf8(&span)
            .map(Arc::from)
            .map_err(|e| TracedColumnError::corrupt(format!("dictionary entry: {}", e)))
    }

    fn to_bytes(&self, item: &Arc<str>) -> ColumnResult<Vec<u8>> {
        Ok(item.as_bytes().to_vec())
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dictionary(items: &[&str]) -> GenericIndexed<StringStrategy> {
        let items: Vec<Arc<str>> = items.iter().map(|s| Arc::from(*s)).collect();
        GenericIndexed::from_items(&items, StringStrategy, true).unwrap()
    }

    #[test]
    fn test_get() {
        let indexed = dictionary(&["a", "b", "c"]);
        assert_eq!(indexed.len(), 3);
        assert_eq!(&*indexed.get(1).unwrap(), "b");
        assert!(indexed.get(3).is_err());
    }

    #[test]
    fn test_index_of() {
        let indexed = dictionary(&["apple", "banana", "cherry"]);
        assert_eq!(indexed.index_of(b"apple"), 0);
        assert_eq!(indexed.index_of(b"banana"), 1);
        assert_eq!(indexed.index_of(b"cherry"), 2);
        // would insert at position 2
        assert_eq!(indexed.index_of(b"blueberry"), -3);
        assert_eq!(indexed.index_of(b""), -1);
        assert_eq!(indexed.index_of(b"zebra"), -4);
    }

    #[test]
    #[should_panic(expected = "unsorted")]
    fn test_index_of_unsorted_panics() {
        let items: Vec<Arc<str>> = vec![Arc::from("b"), Arc::from("a")];
        let indexed = GenericIndexed::from_items(&items, StringStrategy, false).unwrap();
        indexed.index_of(b"a");
    }

    #[test]
    #[should_panic(expected = "strictly increasing")]
    fn test_from_items_rejects_unsorted() {
        let items: Vec<Arc<str>> = vec![Arc::from("b"), Arc::from("a")];
        let _ = GenericIndexed::from_items(&items, StringStrategy, true);
    }

    #[test]
    fn test_round_trip() {
        let indexed = dictionary(&["", "a", "bc", "def"]);
        let mut encoded = vec![];
        indexed.write_to(&mut encoded);
        assert_eq!(encoded.len(), indexed.serialized_size());

        let mut buf = Bytes::from(encoded);
        let decoded = GenericIndexed::read_from(&mut buf, StringStrategy).unwrap();
        assert_eq!(buf.remaining(), 0);
        assert!(decoded.is_sorted());
        let items: Vec<String> = decoded
            .iter()
            .map(|item| item.unwrap().to_string())
            .collect();
        assert_eq!(items, vec!["", "a", "bc", "def"]);
    }

    #[test]
    fn test_empty_element_spans() {
        let indexed = dictionary(&[""]);
        assert_eq!(&*indexed.get(0).unwrap(), "");
        assert_eq!(indexed.index_of(b""), 0);
    }

    #[test]
    fn test_corrupt_truncated() {
        let indexed = dictionary(&["a", "b"]);
        let mut encoded = vec![];
        indexed.write_to(&mut encoded);
        for cut in 0..encoded.len() {
            let mut buf = Bytes::copy_from_slice(&encoded[..cut]);
            assert!(
                GenericIndexed::read_from(&mut buf, StringStrategy).is_err(),
                "cut at {}",
                cut
            );
        }
    }

    #[test]
    fn test_corrupt_offsets_beyond_payload() {
        let indexed = dictionary(&["a", "b"]);
        let mut encoded = vec![];
        indexed.write_to(&mut encoded);
        // last offset points past the end of the payload
        encoded[17] = 9;
        assert!(GenericIndexed::read_from(&mut Bytes::from(encoded), StringStrategy).is_err());
    }

    #[test]
    fn test_invalid_utf8_surfaces_on_get() {
        let strategy = StringStrategy;
        let mut encoded = vec![];
        dictionary(&["ab"]).write_to(&mut encoded);
        let payload_at = encoded.len() - 2;
        encoded[payload_at] = 0xFF;
        encoded[payload_at + 1] = 0xFE;
        let decoded =
            GenericIndexed::read_from(&mut Bytes::from(encoded), strategy).unwrap();
        assert!(decoded.get(0).is_err());
    }
}
