//! A single directory-record field, and the little-endian encoding helpers
//! shared by the layout planner (which only needs byte counts) and the
//! writer (which needs the actual bytes).
//!
//! Computing a [`Field`] is a pure function of a directory's contents and
//! the chosen offset mode: it never touches I/O, so the planner can size a
//! record before any byte of the output has been written.

use crate::tags;

/// One on-disk tag entry, with its payload already encoded little-endian.
///
/// `force_overflow` is set for the tile-offsets and tile-byte-counts arrays,
/// which are always routed to the strile region regardless of how small
/// they are (see the design notes on the strile region).
pub struct Field {
	pub tag: u16,
	pub ty: u16,
	pub count: u64,
	pub bytes: Vec<u8>,
	pub force_overflow: bool,
}

impl Field {
	fn new(tag: u16, ty: u16, count: u64, bytes: Vec<u8>) -> Self {
		Field {
			tag,
			ty,
			count,
			bytes,
			force_overflow: false,
		}
	}

	pub fn overflowed(mut self) -> Self {
		self.force_overflow = true;
		self
	}

	pub fn inline_threshold(bigtiff: bool) -> u64 {
		if bigtiff {
			8
		} else {
			4
		}
	}

	pub fn entry_size(bigtiff: bool) -> u64 {
		if bigtiff {
			20
		} else {
			12
		}
	}

	/// Bytes this field contributes to the overflow area of its record
	/// (zero if it fits in the inline value slot).
	pub fn overflow_len(&self, bigtiff: bool) -> u64 {
		let len = self.bytes.len() as u64;
		if self.force_overflow || len > Self::inline_threshold(bigtiff) {
			len
		} else {
			0
		}
	}

	pub fn short(tag: u16, value: u16) -> Self {
		Self::new(tag, tags::T_SHORT, 1, value.to_le_bytes().to_vec())
	}

	pub fn long(tag: u16, value: u32) -> Self {
		Self::new(tag, tags::T_LONG, 1, value.to_le_bytes().to_vec())
	}

	pub fn short_array(tag: u16, values: &[u16]) -> Self {
		let mut bytes = Vec::with_capacity(values.len() * 2);
		for v in values {
			bytes.extend_from_slice(&v.to_le_bytes());
		}
		Self::new(tag, tags::T_SHORT, values.len() as u64, bytes)
	}

	pub fn long_array(tag: u16, values: &[u32]) -> Self {
		let mut bytes = Vec::with_capacity(values.len() * 4);
		for v in values {
			bytes.extend_from_slice(&v.to_le_bytes());
		}
		Self::new(tag, tags::T_LONG, values.len() as u64, bytes)
	}

	pub fn long8_array(tag: u16, values: &[u64]) -> Self {
		let mut bytes = Vec::with_capacity(values.len() * 8);
		for v in values {
			bytes.extend_from_slice(&v.to_le_bytes());
		}
		Self::new(tag, tags::T_LONG8, values.len() as u64, bytes)
	}

	pub fn double_array(tag: u16, values: &[f64]) -> Self {
		let mut bytes = Vec::with_capacity(values.len() * 8);
		for v in values {
			bytes.extend_from_slice(&v.to_le_bytes());
		}
		Self::new(tag, tags::T_DOUBLE, values.len() as u64, bytes)
	}

	pub fn byte_array(tag: u16, values: &[u8]) -> Self {
		Self::new(tag, tags::T_BYTE, values.len() as u64, values.to_vec())
	}

	pub fn ascii(tag: u16, value: &str) -> Self {
		let mut bytes = value.as_bytes().to_vec();
		bytes.push(0);
		Self::new(tag, tags::T_ASCII, bytes.len() as u64, bytes)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ascii_counts_the_terminator() {
		let f = Field::ascii(1, "abc");
		assert_eq!(f.count, 4);
		assert_eq!(f.bytes, vec![b'a', b'b', b'c', 0]);
	}

	#[test]
	fn inline_threshold_matches_mode() {
		let small = Field::long_array(1, &[1]);
		assert_eq!(small.overflow_len(false), 0);
		assert_eq!(small.overflow_len(true), 0);

		let two_longs = Field::long_array(1, &[1, 2]);
		assert_eq!(two_longs.overflow_len(false), 8);
		assert_eq!(two_longs.overflow_len(true), 0);
	}

	#[test]
	fn tile_arrays_always_overflow() {
		let f = Field::long_array(tags::TILE_OFFSETS, &[1]).overflowed();
		assert_eq!(f.overflow_len(false), 4);
	}
}
