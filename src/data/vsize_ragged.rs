// Copyright 2024 DictCol Project Authors. Licensed under Apache-2.0.

use bytes::{Buf, BufMut, Bytes};

use super::{width_for_max, VSizeInts, VSIZE_INTS_VERSION};
use crate::error::{ColumnResult, TracedColumnError};

/// Ragged rows of packed ints: each row is a (possibly empty) ordered
/// sequence of values drawn from `0..=max`.
///
/// The serialized layout is
/// ```plain
/// | version (u8) | offsets_width (u8) | values_width (u8) | num_rows (u32) |
/// | offsets ((num_rows + 1) * offsets_width) |
/// | values_bytes (u32) | values (values_bytes) |
/// ```
/// Row `r` occupies values bytes `[offsets[r], offsets[r + 1])`, interpreted
/// as a width-`values_width` packed int array. The offsets table is itself a
/// header-less packed int array with `offsets[0] == 0`, monotonic
/// non-decreasing entries, and `offsets[num_rows] == values_bytes`.
#[derive(Clone)]
pub struct VSizeRagged {
    offsets: VSizeInts,
    values: Bytes,
    values_width: usize,
    len: usize,
}

impl VSizeRagged {
    /// Packs `rows` at the value width implied by `max`. Order within a row
    /// is preserved verbatim; duplicate values are kept.
    pub fn from_rows<R: AsRef<[u32]>>(rows: &[R], max: u32) -> Self {
        let values_width = width_for_max(max);
        let mut values = Vec::new();
        let mut offsets = Vec::with_capacity(rows.len() + 1);
        offsets.push(0);
        for row in rows {
            for value in row.as_ref() {
                assert!(*value <= max, "value {} exceeds max {}", value, max);
                values.extend_from_slice(&value.to_be_bytes()[4 - values_width..]);
            }
            offsets.push(values.len() as u32);
        }
        let offsets = VSizeInts::from_slice(&offsets, values.len() as u32);
        Self {
            offsets,
            values: values.into(),
            values_width,
            len: rows.len(),
        }
    }

    /// The row at `index` as a packed int view. O(1), no allocation.
    pub fn get(&self, index: usize) -> ColumnResult<VSizeInts> {
        if index >= self.len {
            return Err(TracedColumnError::corrupt(format!(
                "row ordinal {} out of range 0..{}",
                index, self.len
            )));
        }
        let start = self.offsets.get(index)? as usize;
        let end = self.offsets.get(index + 1)? as usize;
        VSizeInts::from_raw(self.values.slice(start..end), self.values_width)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = ColumnResult<VSizeInts>> + '_ {
        (0..self.len).map(|index| self.get(index))
    }

    pub fn read_from(buf: &mut Bytes) -> ColumnResult<Self> {
        if buf.remaining() < 7 {
            return Err(TracedColumnError::corrupt("unexpected end of ragged ints"));
        }
        let version = buf.get_u8();
        if version != VSIZE_INTS_VERSION {
            return Err(TracedColumnError::corrupt(format!(
                "unknown ragged int version {:#x}",
                version
            )));
        }
        let offsets_width = buf.get_u8() as usize;
        let values_width = buf.get_u8() as usize;
        let num_rows = buf.get_u32() as usize;
        if !(1..=4).contains(&values_width) {
            return Err(TracedColumnError::corrupt(format!(
                "int width {} out of range 1..=4",
                values_width
            )));
        }
        let offsets_bytes = (num_rows + 1)
            .checked_mul(offsets_width)
            .ok_or_else(|| TracedColumnError::corrupt("offsets table size overflows"))?;
        if buf.remaining() < offsets_bytes + 4 {
            return Err(TracedColumnError::corrupt(format!(
                "ragged ints truncated: expected {} offset bytes, found {}",
                offsets_bytes,
                buf.remaining().saturating_sub(4)
            )));
        }
        let offsets = VSizeInts::from_raw(buf.split_to(offsets_bytes), offsets_width)?;
        let values_bytes = buf.get_u32() as usize;
        if buf.remaining() < values_bytes {
            return Err(TracedColumnError::corrupt(format!(
                "ragged ints truncated: expected {} value bytes, found {}",
                values_bytes,
                buf.remaining()
            )));
        }
        let values = buf.split_to(values_bytes);

        let mut prev = offsets.get(0)? as usize;
        if prev != 0 {
            return Err(TracedColumnError::corrupt("offsets must start at zero"));
        }
        for index in 1..=num_rows {
            let end = offsets.get(index)? as usize;
            if end < prev {
                return Err(TracedColumnError::corrupt(format!(
                    "non-monotonic offset {} after {}",
                    end, prev
                )));
            }
            if (end - prev) % values_width != 0 {
                return Err(TracedColumnError::corrupt(format!(
                    "row of {} bytes is not a multiple of width {}",
                    end - prev,
                    values_width
                )));
            }
            prev = end;
        }
        if prev != values_bytes {
            return Err(TracedColumnError::corrupt(format!(
                "offsets end at {} but values payload has {} bytes",
                prev, values_bytes
            )));
        }

        Ok(Self {
            offsets,
            values,
            values_width,
            len: num_rows,
        })
    }

    pub fn write_to(&self, buf: &mut impl BufMut) {
        buf.put_u8(VSIZE_INTS_VERSION);
        buf.put_u8(self.offsets.width() as u8);
        buf.put_u8(self.values_width as u8);
        buf.put_u32(self.len as u32);
        buf.put_slice(self.offsets.raw_data());
        buf.put_u32(self.values.len() as u32);
        buf.put_slice(&self.values);
    }

    pub fn serialized_size(&self) -> usize {
        1 + 1 + 1 + 4 + self.offsets.raw_data().len() + 4 + self.values.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(ragged: &VSizeRagged) -> Vec<Vec<u32>> {
        ragged
            .iter()
            .map(|row| row.unwrap().iter().collect())
            .collect()
    }

    #[test]
    fn test_pack_and_get() {
        let rows: Vec<Vec<u32>> = vec![vec![0, 1], vec![], vec![2], vec![0, 0]];
        let ragged = VSizeRagged::from_rows(&rows, 2);
        assert_eq!(ragged.len(), 4);
        assert_eq!(collect(&ragged), rows);
        assert!(ragged.get(4).is_err());
    }

    #[test]
    fn test_round_trip() {
        let rows: Vec<Vec<u32>> = vec![vec![513, 0], vec![1, 1, 1], vec![], vec![1023]];
        let ragged = VSizeRagged::from_rows(&rows, 1023);

        let mut encoded = vec![];
        ragged.write_to(&mut encoded);
        assert_eq!(encoded.len(), ragged.serialized_size());

        let mut buf = Bytes::from(encoded);
        let decoded = VSizeRagged::read_from(&mut buf).unwrap();
        assert_eq!(buf.remaining(), 0);
        assert_eq!(collect(&decoded), rows);
    }

    #[test]
    fn test_empty_rows() {
        let ragged = VSizeRagged::from_rows::<Vec<u32>>(&[], 0);
        let mut encoded = vec![];
        ragged.write_to(&mut encoded);
        let decoded = VSizeRagged::read_from(&mut Bytes::from(encoded)).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_order_preserved_within_row() {
        let rows: Vec<Vec<u32>> = vec![vec![2, 0, 2, 1]];
        let ragged = VSizeRagged::from_rows(&rows, 2);
        assert_eq!(collect(&ragged), rows);
    }

    #[test]
    fn test_corrupt_truncated() {
        let rows: Vec<Vec<u32>> = vec![vec![1, 2], vec![3]];
        let ragged = VSizeRagged::from_rows(&rows, 3);
        let mut encoded = vec![];
        ragged.write_to(&mut encoded);
        for cut in 0..encoded.len() {
            let mut buf = Bytes::copy_from_slice(&encoded[..cut]);
            assert!(VSizeRagged::read_from(&mut buf).is_err(), "cut at {}", cut);
        }
    }

    #[test]
    fn test_corrupt_non_monotonic_offsets() {
        let rows: Vec<Vec<u32>> = vec![vec![1], vec![2]];
        let ragged = VSizeRagged::from_rows(&rows, 2);
        let mut encoded = vec![];
        ragged.write_to(&mut encoded);
        // offsets are one byte wide here: [0, 1, 2] at positions 7..10
        encoded[8] = 2;
        encoded[9] = 1;
        assert!(VSizeRagged::read_from(&mut Bytes::from(encoded)).is_err());
    }
}
