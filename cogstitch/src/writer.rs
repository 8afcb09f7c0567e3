//! The writer: serializes a finalized aggregator to a container, in four
//! contiguous regions — header, directory records, strile region, tile
//! payloads — copying tile bytes verbatim from each directory's source.

use std::io::{self, Write};

use crate::{aggregator::Aggregator, directory::Directory, error::CogError, field::Field, pattern::Pattern};

const CLASSIC_HEADER_SIZE: u64 = 8;
const BIGTIFF_HEADER_SIZE: u64 = 16;

/// Writes `agg` to `sink` as one container, ordering tile payloads
/// according to `pattern`. `agg` must already have gone through
/// [`Aggregator::finalize`].
pub fn write<W: Write>(agg: &mut Aggregator, pattern: &Pattern, nb_bands: u64, bigtiff: bool, mut sink: W) -> Result<(), CogError> {
	tracy::zone!("Write container");

	let order = agg.data_interlacing();

	// Top-level directories first, then every record's children, matching
	// on-disk emission order.
	let mut seq: Vec<(usize, Option<usize>)> = order.iter().map(|o| (o.record, None)).collect();
	for o in &order {
		for &c in &o.children {
			seq.push((o.record, Some(c)));
		}
	}

	let layouts: Vec<_> = seq.iter().map(|&(r, c)| directory_at(agg, r, c).structure(bigtiff)).collect();

	let header_size = if bigtiff { BIGTIFF_HEADER_SIZE } else { CLASSIC_HEADER_SIZE };
	let mut dir_offsets = Vec::with_capacity(seq.len());
	let mut cursor = header_size;
	for layout in &layouts {
		dir_offsets.push(cursor);
		cursor += layout.tags_size;
	}
	let strile_region_start = cursor;

	let mut strile_offsets = Vec::with_capacity(seq.len());
	let mut scursor = strile_region_start;
	for layout in &layouts {
		strile_offsets.push(scursor);
		scursor += layout.strile_size;
	}
	let data_start = scursor;
	let strile_region_len = (scursor - strile_region_start) as usize;

	// Chain next_ifd_offset within the top-level group, then independently
	// within each record's own children group.
	let mut next_ifd = vec![0u64; seq.len()];
	for i in 0..order.len() {
		next_ifd[i] = if i + 1 < order.len() { dir_offsets[i + 1] } else { 0 };
	}
	let mut idx = order.len();
	for o in &order {
		let start = idx;
		let count = o.children.len();
		for j in 0..count {
			next_ifd[start + j] = if j + 1 < count { dir_offsets[start + j + 1] } else { 0 };
		}
		idx += count;
	}

	// Back-fill each record's SubIFDOffsets from its children's addresses.
	let mut idx = order.len();
	for o in &order {
		let count = o.children.len();
		if count > 0 {
			let record = &agg.records()[o.record];
			if !record.sub_ifd_offsets.is_empty() && record.sub_ifd_offsets.len() != count {
				return Err(CogError::SubIfdLengthMismatch {
					index: o.record,
					got: record.sub_ifd_offsets.len(),
					want: count,
				});
			}
			let offsets: Vec<u64> = (0..count).map(|j| dir_offsets[idx + j]).collect();
			agg.records_mut()[o.record].sub_ifd_offsets = offsets;
		}
		idx += count;
	}

	let plan = agg.plan(pattern, nb_bands);
	crate::offset::assign(agg, &plan, bigtiff, data_start)?;

	write_header(&mut sink, bigtiff, dir_offsets[0])?;

	let mut strile_buf = vec![0u8; strile_region_len];
	for (i, &(r, c)) in seq.iter().enumerate() {
		let dir = directory_at(agg, r, c);
		let fields = dir.fields(bigtiff);
		let n = fields.len();
		let entry_size = Field::entry_size(bigtiff);
		let count_size = if bigtiff { 8 } else { 2 };
		let overflow_base = dir_offsets[i] + count_size + n as u64 * entry_size;
		let strile_base = strile_offsets[i];

		let (entries, overflow, strile) = render_fields(&fields, bigtiff, overflow_base, strile_base);

		let local_strile_start = (strile_base - strile_region_start) as usize;
		strile_buf[local_strile_start..local_strile_start + strile.len()].copy_from_slice(&strile);

		write_count(&mut sink, bigtiff, n as u64)?;
		sink_write(&mut sink, &entries)?;
		sink_write(&mut sink, &overflow)?;
		write_offset_field(&mut sink, bigtiff, next_ifd[i])?;
	}

	sink_write(&mut sink, &strile_buf)?;

	tracy::zone!("Copy tile payloads");
	for tile_ref in &plan {
		let dir = directory_at(agg, tile_ref.record, find_child(agg, tile_ref));
		let idx = (tile_ref.tile * dir.plane_count() + tile_ref.band) as usize;
		let byte_count = dir.tiles.original_byte_counts[idx];
		if byte_count == 0 {
			continue;
		}

		let original_offset = dir.tiles.original_offsets[idx];
		let source = dir
			.source
			.as_ref()
			.and_then(|w| w.upgrade())
			.ok_or_else(|| CogError::SourceRead(io::Error::new(io::ErrorKind::NotFound, "tile source no longer available")))?;

		let mut buf = vec![0u8; byte_count as usize];
		source.read_at(original_offset, &mut buf).map_err(CogError::SourceRead)?;
		sink_write(&mut sink, &buf)?;
	}

	Ok(())
}

fn directory_at(agg: &Aggregator, record: usize, child: Option<usize>) -> &Directory {
	match child {
		None => &agg.records()[record],
		Some(c) => &agg.records()[record].children[c],
	}
}

/// Re-derives which child (if any) a planned tile's zoom level addresses,
/// mirroring `Aggregator::plan`'s own resolution.
fn find_child(agg: &Aggregator, tile_ref: &crate::aggregator::TileRef) -> Option<usize> {
	if tile_ref.zoom == 0 {
		return None;
	}
	agg.records()[tile_ref.record]
		.children
		.iter()
		.enumerate()
		.filter(|(_, c)| !c.is_mask())
		.find(|(_, c)| c.zoom_level == tile_ref.zoom)
		.map(|(i, _)| i)
}

/// Splits a directory's fields into its entry table, its non-strile
/// overflow blob, and its strile-region blob, with every out-of-line
/// value's pointer already resolved against `overflow_base`/`strile_base`.
fn render_fields(fields: &[Field], bigtiff: bool, overflow_base: u64, strile_base: u64) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
	let value_slot = if bigtiff { 8 } else { 4 };
	let mut entries = Vec::with_capacity(fields.len() * Field::entry_size(bigtiff) as usize);
	let mut overflow = Vec::new();
	let mut strile = Vec::new();

	for f in fields {
		entries.extend_from_slice(&f.tag.to_le_bytes());
		entries.extend_from_slice(&f.ty.to_le_bytes());
		if bigtiff {
			entries.extend_from_slice(&f.count.to_le_bytes());
		} else {
			entries.extend_from_slice(&(f.count as u32).to_le_bytes());
		}

		let overflow_len = f.overflow_len(bigtiff);
		if overflow_len == 0 {
			let mut slot = vec![0u8; value_slot];
			slot[..f.bytes.len()].copy_from_slice(&f.bytes);
			entries.extend_from_slice(&slot);
		} else if f.force_overflow {
			let addr = strile_base + strile.len() as u64;
			write_addr(&mut entries, addr, bigtiff);
			strile.extend_from_slice(&f.bytes);
		} else {
			let addr = overflow_base + overflow.len() as u64;
			write_addr(&mut entries, addr, bigtiff);
			overflow.extend_from_slice(&f.bytes);
		}
	}

	(entries, overflow, strile)
}

fn write_addr(buf: &mut Vec<u8>, addr: u64, bigtiff: bool) {
	if bigtiff {
		buf.extend_from_slice(&addr.to_le_bytes());
	} else {
		buf.extend_from_slice(&(addr as u32).to_le_bytes());
	}
}

fn write_header<W: Write>(sink: &mut W, bigtiff: bool, first_ifd_offset: u64) -> Result<(), CogError> {
	sink_write(sink, b"II")?;
	if bigtiff {
		sink_write(sink, &43u16.to_le_bytes())?;
		sink_write(sink, &8u16.to_le_bytes())?;
		sink_write(sink, &0u16.to_le_bytes())?;
		sink_write(sink, &first_ifd_offset.to_le_bytes())?;
	} else {
		sink_write(sink, &42u16.to_le_bytes())?;
		sink_write(sink, &(first_ifd_offset as u32).to_le_bytes())?;
	}
	Ok(())
}

fn write_count<W: Write>(sink: &mut W, bigtiff: bool, n: u64) -> Result<(), CogError> {
	if bigtiff {
		sink_write(sink, &n.to_le_bytes())
	} else {
		sink_write(sink, &(n as u16).to_le_bytes())
	}
}

fn write_offset_field<W: Write>(sink: &mut W, bigtiff: bool, offset: u64) -> Result<(), CogError> {
	if bigtiff {
		sink_write(sink, &offset.to_le_bytes())
	} else {
		sink_write(sink, &(offset as u32).to_le_bytes())
	}
}

fn sink_write<W: Write>(sink: &mut W, bytes: &[u8]) -> Result<(), CogError> {
	sink.write_all(bytes).map_err(CogError::SinkWrite)
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;
	use crate::{pattern::Pattern, source::MemorySource};

	fn directory_with_payload(payload: Vec<u8>, tile_len: u32) -> (Directory, Arc<MemorySource>) {
		let mut d = Directory::new(16, 16, 16, 16, 1);
		d.samples_per_pixel = 1;
		d.bits_per_sample = vec![8];
		d.model_pixel_scale = vec![1.0, 1.0, 0.0];
		d.model_tie_point = vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
		d.tiles.original_offsets = vec![0];
		d.tiles.original_byte_counts = vec![tile_len];
		let source = Arc::new(MemorySource::new(payload));
		d.source = Some(Arc::downgrade(&source));
		(d, source)
	}

	#[test]
	fn classic_header_points_at_first_directory() {
		let (dir, _source) = directory_with_payload(vec![1, 2, 3, 4], 4);
		let mut agg = Aggregator::new();
		agg.append_directory(dir);
		agg.records_mut()[0].init_new_offsets(false);
		agg.finalize().unwrap();

		let pattern = Pattern::parse("R>Z>T>B").unwrap();
		let mut out = Vec::new();
		write(&mut agg, &pattern, 1, false, &mut out).unwrap();

		assert_eq!(&out[0..2], b"II");
		assert_eq!(u16::from_le_bytes([out[2], out[3]]), 42);
		let first_ifd = u32::from_le_bytes([out[4], out[5], out[6], out[7]]);
		assert_eq!(first_ifd, 8);
	}

	#[test]
	fn tile_bytes_are_copied_verbatim() {
		let (dir, _source) = directory_with_payload(vec![9, 8, 7, 6], 4);
		let mut agg = Aggregator::new();
		agg.append_directory(dir);
		agg.records_mut()[0].init_new_offsets(false);
		agg.finalize().unwrap();

		let pattern = Pattern::parse("R>Z>T>B").unwrap();
		let mut out = Vec::new();
		write(&mut agg, &pattern, 1, false, &mut out).unwrap();

		assert_eq!(&out[out.len() - 4..], &[9, 8, 7, 6]);
	}
}
