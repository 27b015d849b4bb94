// Copyright 2024 DictCol Project Authors. Licensed under Apache-2.0.

//! Serialization primitives of the column format.
//!
//! All multi-byte integers in the serialized forms are big-endian. Readers
//! hold [`bytes::Bytes`] slices of the backing segment buffer and decode on
//! demand; nothing in this module copies payload bytes after the initial
//! split.

mod generic_indexed;
mod vsize_ints;
mod vsize_ragged;

pub use generic_indexed::*;
pub use vsize_ints::*;
pub use vsize_ragged::*;
