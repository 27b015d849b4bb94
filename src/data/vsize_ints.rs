// Copyright 2024 DictCol Project Authors. Licensed under Apache-2.0.

use bytes::{Buf, BufMut, Bytes};

use crate::error::{ColumnResult, TracedColumnError};

/// Version byte of the serialized form.
pub const VSIZE_INTS_VERSION: u8 = 0x0;

/// Minimum number of bytes needed to encode every value up to `max`
/// inclusive. Always in `1..=4`.
pub fn width_for_max(max: u32) -> usize {
    let bits = (u32::BITS - (max | 1).leading_zeros()) as usize;
    (bits + 7) / 8
}

/// Packed unsigned integers, `width` bytes per element.
///
/// The serialized layout is
/// ```plain
/// | version (u8) | width (u8) | num_bytes (u32) | data (num_bytes) |
/// ```
/// where `num_bytes = len * width`. A header-less view with the same element
/// layout backs the rows of a [`super::VSizeRagged`].
#[derive(Clone)]
pub struct VSizeInts {
    data: Bytes,
    width: usize,
    len: usize,
}

impl VSizeInts {
    /// Packs `values` at the width implied by `max`. Every value must be
    /// `<= max`.
    pub fn from_slice(values: &[u32], max: u32) -> Self {
        let width = width_for_max(max);
        let mut data = Vec::with_capacity(values.len() * width);
        for value in values {
            assert!(*value <= max, "value {} exceeds max {}", value, max);
            data.extend_from_slice(&value.to_be_bytes()[4 - width..]);
        }
        Self {
            data: data.into(),
            width,
            len: values.len(),
        }
    }

    pub fn empty() -> Self {
        Self::from_slice(&[], 0)
    }

    /// View over a header-less payload of width-`width` elements.
    pub fn from_raw(data: Bytes, width: usize) -> ColumnResult<Self> {
        if !(1..=4).contains(&width) {
            return Err(TracedColumnError::corrupt(format!(
                "int width {} out of range 1..=4",
                width
            )));
        }
        if data.len() % width != 0 {
            return Err(TracedColumnError::corrupt(format!(
                "payload of {} bytes is not a multiple of width {}",
                data.len(),
                width
            )));
        }
        let len = data.len() / width;
        Ok(Self { data, width, len })
    }

    pub fn get(&self, index: usize) -> ColumnResult<u32> {
        if index >= self.len {
            return Err(TracedColumnError::corrupt(format!(
                "row ordinal {} out of range 0..{}",
                index, self.len
            )));
        }
        Ok(self.at(index))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.len).map(|index| self.at(index))
    }

    pub fn read_from(buf: &mut Bytes) -> ColumnResult<Self> {
        if buf.remaining() < 6 {
            return Err(TracedColumnError::corrupt("unexpected end of packed ints"));
        }
        let version = buf.get_u8();
        if version != VSIZE_INTS_VERSION {
            return Err(TracedColumnError::corrupt(format!(
                "unknown packed int version {:#x}",
                version
            )));
        }
        let width = buf.get_u8() as usize;
        let num_bytes = buf.get_u32() as usize;
        if buf.remaining() < num_bytes {
            return Err(TracedColumnError::corrupt(format!(
                "packed ints truncated: expected {} payload bytes, found {}",
                num_bytes,
                buf.remaining()
            )));
        }
        Self::from_raw(buf.split_to(num_bytes), width)
    }

    pub fn write_to(&self, buf: &mut impl BufMut) {
        buf.put_u8(VSIZE_INTS_VERSION);
        buf.put_u8(self.width as u8);
        buf.put_u32(self.data.len() as u32);
        buf.put_slice(&self.data);
    }

    pub fn serialized_size(&self) -> usize {
        1 + 1 + 4 + self.data.len()
    }

    pub(crate) fn raw_data(&self) -> &Bytes {
        &self.data
    }

    fn at(&self, index: usize) -> u32 {
        let mut value = 0u32;
        for byte in &self.data[index * self.width..(index + 1) * self.width] {
            value = (value << 8) | *byte as u32;
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_for_max() {
        assert_eq!(width_for_max(0), 1);
        assert_eq!(width_for_max(1), 1);
        assert_eq!(width_for_max(0xFF), 1);
        assert_eq!(width_for_max(0x100), 2);
        assert_eq!(width_for_max(0xFFFF), 2);
        assert_eq!(width_for_max(0x10000), 3);
        assert_eq!(width_for_max(0xFFFFFF), 3);
        assert_eq!(width_for_max(0x1000000), 4);
        assert_eq!(width_for_max(u32::MAX), 4);
    }

    #[test]
    fn test_pack_and_get() {
        let ints = VSizeInts::from_slice(&[0, 2, 1, 2, 0], 2);
        assert_eq!(ints.width(), 1);
        assert_eq!(ints.len(), 5);
        assert_eq!(ints.get(1).unwrap(), 2);
        assert_eq!(ints.iter().collect::<Vec<_>>(), vec![0, 2, 1, 2, 0]);
        assert!(ints.get(5).is_err());
    }

    #[test]
    fn test_wide_values() {
        let values = [0u32, 0x1FF, 0x123456, 0xFEDCBA98];
        let ints = VSizeInts::from_slice(&values, u32::MAX);
        assert_eq!(ints.width(), 4);
        assert_eq!(ints.iter().collect::<Vec<_>>(), values);
    }

    #[test]
    fn test_round_trip() {
        let ints = VSizeInts::from_slice(&[300, 5, 0, 65535], 65535);
        assert_eq!(ints.width(), 2);

        let mut encoded = vec![];
        ints.write_to(&mut encoded);
        assert_eq!(encoded.len(), ints.serialized_size());

        let mut buf = Bytes::from(encoded);
        let decoded = VSizeInts::read_from(&mut buf).unwrap();
        assert_eq!(buf.remaining(), 0);
        assert_eq!(decoded.iter().collect::<Vec<_>>(), vec![300, 5, 0, 65535]);
    }

    #[test]
    fn test_empty() {
        let ints = VSizeInts::empty();
        assert_eq!(ints.len(), 0);
        assert_eq!(ints.width(), 1);

        let mut encoded = vec![];
        ints.write_to(&mut encoded);
        let decoded = VSizeInts::read_from(&mut Bytes::from(encoded)).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_corrupt_header() {
        assert!(VSizeInts::read_from(&mut Bytes::from_static(&[0x0, 0x1])).is_err());

        // width out of range
        let mut encoded = vec![];
        VSizeInts::from_slice(&[1], 1).write_to(&mut encoded);
        encoded[1] = 5;
        assert!(VSizeInts::read_from(&mut Bytes::from(encoded)).is_err());
    }

    #[test]
    fn test_corrupt_truncated_payload() {
        let mut encoded = vec![];
        VSizeInts::from_slice(&[1, 2, 3], 3).write_to(&mut encoded);
        encoded.pop();
        assert!(VSizeInts::read_from(&mut Bytes::from(encoded)).is_err());
    }

    #[test]
    fn test_unknown_version() {
        let mut encoded = vec![];
        VSizeInts::from_slice(&[1], 1).write_to(&mut encoded);
        encoded[0] = 0x7;
        assert!(VSizeInts::read_from(&mut Bytes::from(encoded)).is_err());
    }
}
