//! The directory (image directory record) data model: one entry per image,
//! overview, or mask, plus the bookkeeping the layout planner fills in
//! before anything is written.

use std::sync::Weak;

use crate::{
	field::Field,
	geotransform::GeoTransform,
	source::TileSource,
	tags::{self, subfile_type, PlanarConfiguration},
};

/// Original and rewritten tile addressing for one directory.
///
/// Only one of `new_offsets32` / `new_offsets64` is ever populated,
/// depending on the container's chosen offset mode.
#[derive(Debug, Default, Clone)]
pub struct TileTable {
	pub original_offsets: Vec<u64>,
	pub original_byte_counts: Vec<u32>,
	pub new_offsets32: Vec<u32>,
	pub new_offsets64: Vec<u64>,
}

impl TileTable {
	pub fn len(&self) -> usize {
		self.original_byte_counts.len()
	}

	pub fn is_empty(&self) -> bool {
		self.original_byte_counts.is_empty()
	}
}

/// A tile-grid bounding box, in the directory's own local grid (children)
/// or the shared aggregate grid (top-level directories).
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct GridBox {
	pub minx: u64,
	pub miny: u64,
	pub maxx: u64,
	pub maxy: u64,
}

impl GridBox {
	pub fn contains(&self, x: u64, y: u64) -> bool {
		x >= self.minx && x < self.maxx && y >= self.miny && y < self.maxy
	}

	/// Componentwise union of two boxes: mins of mins, maxes of maxes. Used
	/// when folding overview extents into one bounding box per zoom level.
	pub fn union(self, other: GridBox) -> GridBox {
		GridBox {
			minx: self.minx.min(other.minx),
			miny: self.miny.min(other.miny),
			maxx: self.maxx.max(other.maxx),
			maxy: self.maxy.max(other.maxy),
		}
	}
}

/// Sizes derived by the layout planner for a single directory record.
#[derive(Debug, Default, Copy, Clone)]
pub struct DirectoryLayout {
	pub tag_count: u64,
	pub tags_size: u64,
	pub strile_size: u64,
	pub plane_count: u64,
}

/// One image directory: a primary image, an overview, or a mask.
pub struct Directory {
	// Geometry
	pub image_width: u32,
	pub image_length: u32,
	pub tile_width: u16,
	pub tile_length: u16,
	pub planar_configuration: u16,
	pub samples_per_pixel: u16,
	pub bits_per_sample: Vec<u16>,
	pub sample_format: Vec<u16>,
	pub extra_samples: Vec<u16>,
	pub photometric_interpretation: u16,
	pub compression: u16,
	pub predictor: u16,
	pub colormap: Vec<u16>,

	// Georeferencing
	pub model_pixel_scale: Vec<f64>,
	pub model_tie_point: Vec<f64>,
	pub model_transformation: Vec<f64>,
	pub geo_key_directory: Vec<u16>,
	pub geo_double_params: Vec<f64>,
	pub geo_ascii_params: String,
	pub rpcs: Vec<f64>,
	pub gdal_metadata: String,
	pub no_data: String,
	pub jpeg_tables: Vec<u8>,
	pub lerc_params: Vec<u32>,

	// Identity
	pub subfile_type: u32,
	pub document_name: String,
	pub date_time: String,

	// Tile table
	pub tiles: TileTable,
	pub sub_ifd_offsets: Vec<u64>,

	// Children
	pub children: Vec<Directory>,

	// Derived, filled in by the geometry resolver / layout planner
	pub layout: DirectoryLayout,
	pub ntilesx: u64,
	pub ntilesy: u64,
	pub grid: GridBox,
	pub zoom_level: u64,
	pub geotransform: Option<GeoTransform>,
	pub source: Option<Weak<dyn TileSource>>,
}

impl Default for Directory {
	fn default() -> Self {
		Directory {
			image_width: 0,
			image_length: 0,
			tile_width: 0,
			tile_length: 0,
			planar_configuration: 0,
			samples_per_pixel: 0,
			bits_per_sample: Vec::new(),
			sample_format: Vec::new(),
			extra_samples: Vec::new(),
			photometric_interpretation: 0,
			compression: 0,
			predictor: 0,
			colormap: Vec::new(),
			model_pixel_scale: Vec::new(),
			model_tie_point: Vec::new(),
			model_transformation: Vec::new(),
			geo_key_directory: Vec::new(),
			geo_double_params: Vec::new(),
			geo_ascii_params: String::new(),
			rpcs: Vec::new(),
			gdal_metadata: String::new(),
			no_data: String::new(),
			jpeg_tables: Vec::new(),
			lerc_params: Vec::new(),
			subfile_type: subfile_type::IMAGE,
			document_name: String::new(),
			date_time: String::new(),
			tiles: TileTable::default(),
			sub_ifd_offsets: Vec::new(),
			children: Vec::new(),
			layout: DirectoryLayout::default(),
			ntilesx: 0,
			ntilesy: 0,
			grid: GridBox::default(),
			zoom_level: 0,
			geotransform: None,
			source: None,
		}
	}
}

impl Directory {
	/// A directory with the handful of fields every image needs: the
	/// photometric interpretation is unconditional (it is always emitted,
	/// even when left at its zero value).
	pub fn new(image_width: u32, image_length: u32, tile_width: u16, tile_length: u16, photometric_interpretation: u16) -> Self {
		Directory {
			image_width,
			image_length,
			tile_width,
			tile_length,
			photometric_interpretation,
			..Directory::default()
		}
	}

	pub fn is_mask(&self) -> bool {
		self.subfile_type == subfile_type::MASK
	}

	pub fn plane_count(&self) -> u64 {
		if self.planar_configuration == PlanarConfiguration::Separate.as_u16() {
			self.samples_per_pixel.max(1) as u64
		} else {
			1
		}
	}

	/// Attaches `ovr` as an overview of `self`. Stamps the reduced-image
	/// subfile-type flag and clears the georeferencing tags, which belong
	/// only on the full-resolution parent.
	pub fn attach_overview(&mut self, mut ovr: Directory) {
		ovr.subfile_type |= subfile_type::REDUCED_IMAGE;
		ovr.clear_georeferencing();
		self.children.push(ovr);
	}

	/// Attaches `mask` as a same-resolution validity mask of `self`. Unlike
	/// [`Directory::attach_overview`], this does not touch the subfile type
	/// or georeferencing: masks are recognized later by `subfile_type ==
	/// mask` together with a matching image width, and must keep that
	/// signature intact.
	pub fn attach_mask(&mut self, mask: Directory) {
		self.children.push(mask);
	}

	fn clear_georeferencing(&mut self) {
		self.model_pixel_scale.clear();
		self.model_tie_point.clear();
		self.model_transformation.clear();
		self.geo_key_directory.clear();
		self.geo_double_params.clear();
		self.geo_ascii_params.clear();
		self.gdal_metadata.clear();
		self.rpcs.clear();
	}

	/// Allocates zeroed new-offset arrays sized to the tile table, so that
	/// the record's byte size can be computed before any offset is known.
	pub fn init_new_offsets(&mut self, bigtiff: bool) {
		let n = self.tiles.len();
		if bigtiff {
			self.tiles.new_offsets64 = vec![0; n];
			self.tiles.new_offsets32.clear();
		} else {
			self.tiles.new_offsets32 = vec![0; n];
			self.tiles.new_offsets64.clear();
		}
	}

	pub fn tile_index(&self, x: u64, y: u64, band: u64) -> usize {
		((x + y * self.ntilesx) * self.plane_count() + band) as usize
	}

	/// The tag table for this directory, in strictly ascending tag order.
	///
	/// This is a pure function of the directory's current field values and
	/// the chosen offset mode: it is used both to size the record (layout
	/// planner) and to serialize it (writer), so the two can never
	/// disagree about what gets written.
	pub fn fields(&self, bigtiff: bool) -> Vec<Field> {
		let mut out = Vec::new();

		if self.subfile_type > 0 {
			out.push(Field::long(tags::SUBFILE_TYPE, self.subfile_type));
		}
		if self.image_width > 0 {
			out.push(Field::long(tags::IMAGE_WIDTH, self.image_width));
		}
		if self.image_length > 0 {
			out.push(Field::long(tags::IMAGE_LENGTH, self.image_length));
		}
		if !self.bits_per_sample.is_empty() {
			out.push(Field::short_array(tags::BITS_PER_SAMPLE, &self.bits_per_sample));
		}
		if self.compression > 0 {
			out.push(Field::short(tags::COMPRESSION, self.compression));
		}

		// Unconditional: always present, even at its zero value.
		out.push(Field::short(tags::PHOTOMETRIC_INTERPRETATION, self.photometric_interpretation));

		if !self.document_name.is_empty() {
			out.push(Field::ascii(tags::DOCUMENT_NAME, &self.document_name));
		}
		if self.samples_per_pixel > 0 {
			out.push(Field::short(tags::SAMPLES_PER_PIXEL, self.samples_per_pixel));
		}
		if self.planar_configuration > 0 {
			out.push(Field::short(tags::PLANAR_CONFIGURATION, self.planar_configuration));
		}
		if !self.date_time.is_empty() {
			out.push(Field::ascii(tags::DATE_TIME, &self.date_time));
		}
		if self.predictor > 0 {
			out.push(Field::short(tags::PREDICTOR, self.predictor));
		}
		if !self.colormap.is_empty() {
			out.push(Field::short_array(tags::COLORMAP, &self.colormap));
		}
		if self.tile_width > 0 {
			out.push(Field::short(tags::TILE_WIDTH, self.tile_width));
		}
		if self.tile_length > 0 {
			out.push(Field::short(tags::TILE_LENGTH, self.tile_length));
		}

		if !self.tiles.is_empty() {
			let offsets = if bigtiff {
				Field::long8_array(tags::TILE_OFFSETS, &self.tiles.new_offsets64)
			} else {
				Field::long_array(tags::TILE_OFFSETS, &self.tiles.new_offsets32)
			};
			out.push(offsets.overflowed());
			out.push(Field::long_array(tags::TILE_BYTE_COUNTS, &self.tiles.original_byte_counts).overflowed());
		}

		if !self.sub_ifd_offsets.is_empty() {
			// Always written as 32-bit entries, even in 64-bit mode.
			let offs32: Vec<u32> = self.sub_ifd_offsets.iter().map(|&o| o as u32).collect();
			out.push(Field::long_array(tags::SUB_IFD_OFFSETS, &offs32));
		}
		if !self.extra_samples.is_empty() {
			out.push(Field::short_array(tags::EXTRA_SAMPLES, &self.extra_samples));
		}
		if !self.sample_format.is_empty() {
			out.push(Field::short_array(tags::SAMPLE_FORMAT, &self.sample_format));
		}
		if !self.jpeg_tables.is_empty() {
			out.push(Field::byte_array(tags::JPEG_TABLES, &self.jpeg_tables));
		}
		if !self.model_pixel_scale.is_empty() {
			out.push(Field::double_array(tags::MODEL_PIXEL_SCALE, &self.model_pixel_scale));
		}
		if !self.model_tie_point.is_empty() {
			out.push(Field::double_array(tags::MODEL_TIE_POINT, &self.model_tie_point));
		}
		if !self.model_transformation.is_empty() {
			out.push(Field::double_array(tags::MODEL_TRANSFORMATION, &self.model_transformation));
		}
		if !self.geo_key_directory.is_empty() {
			out.push(Field::short_array(tags::GEO_KEY_DIRECTORY, &self.geo_key_directory));
		}
		if !self.geo_double_params.is_empty() {
			out.push(Field::double_array(tags::GEO_DOUBLE_PARAMS, &self.geo_double_params));
		}
		if !self.geo_ascii_params.is_empty() {
			out.push(Field::ascii(tags::GEO_ASCII_PARAMS, &self.geo_ascii_params));
		}
		if !self.gdal_metadata.is_empty() {
			out.push(Field::ascii(tags::GDAL_METADATA, &self.gdal_metadata));
		}
		if !self.no_data.is_empty() {
			out.push(Field::ascii(tags::GDAL_NODATA, &self.no_data));
		}
		if !self.lerc_params.is_empty() {
			out.push(Field::long_array(tags::LERC_PARAMS, &self.lerc_params));
		}
		if !self.rpcs.is_empty() {
			out.push(Field::double_array(tags::RPCS, &self.rpcs));
		}

		out
	}

	/// Computes `tag_count`, `tags_size`, `strile_size` and `plane_count`
	/// for this record in the given offset mode. Pure and I/O-free: the
	/// writer never needs to measure a record by serializing it first.
	pub fn structure(&self, bigtiff: bool) -> DirectoryLayout {
		let header = if bigtiff { 16 } else { 6 };
		let entry_size = Field::entry_size(bigtiff);
		let fields = self.fields(bigtiff);
		let tag_count = fields.len() as u64;

		let mut tags_size = header + tag_count * entry_size;
		let mut strile_size = 0u64;
		for f in &fields {
			let overflow = f.overflow_len(bigtiff);
			if f.tag == tags::TILE_OFFSETS || f.tag == tags::TILE_BYTE_COUNTS {
				strile_size += overflow;
			} else {
				tags_size += overflow;
			}
		}

		DirectoryLayout {
			tag_count,
			tags_size,
			strile_size,
			plane_count: self.plane_count(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample() -> Directory {
		let mut d = Directory::new(128, 128, 64, 64, 1);
		d.samples_per_pixel = 1;
		d.bits_per_sample = vec![8];
		d.compression = 8;
		d.tiles.original_offsets = vec![100, 200, 300, 400];
		d.tiles.original_byte_counts = vec![10, 10, 10, 10];
		d.ntilesx = 2;
		d.ntilesy = 2;
		d.init_new_offsets(false);
		d
	}

	#[test]
	fn attach_overview_stamps_flag_and_clears_geo() {
		let mut parent = sample();
		let mut ovr = sample();
		ovr.model_pixel_scale = vec![0.002, 0.002];
		ovr.gdal_metadata = "stuff".into();
		parent.attach_overview(ovr);

		let child = &parent.children[0];
		assert_eq!(child.subfile_type & subfile_type::REDUCED_IMAGE, subfile_type::REDUCED_IMAGE);
		assert!(child.model_pixel_scale.is_empty());
		assert!(child.gdal_metadata.is_empty());
	}

	#[test]
	fn attach_mask_preserves_subfile_type() {
		let mut parent = sample();
		let mut mask = sample();
		mask.subfile_type = subfile_type::MASK;
		parent.attach_mask(mask);
		assert_eq!(parent.children[0].subfile_type, subfile_type::MASK);
	}

	#[test]
	fn structure_is_deterministic_before_and_after_offset_assignment() {
		let mut d = sample();
		let before = d.structure(false);
		d.tiles.new_offsets32 = vec![999, 1000, 1001, 1002];
		let after = d.structure(false);
		assert_eq!(before.tag_count, after.tag_count);
		assert_eq!(before.tags_size, after.tags_size);
		assert_eq!(before.strile_size, after.strile_size);
	}

	#[test]
	fn tile_arrays_land_in_strile_not_tags() {
		let d = sample();
		let layout = d.structure(false);
		assert!(layout.strile_size > 0);
	}

	#[test]
	fn tile_index_accounts_for_planes() {
		let mut d = sample();
		d.planar_configuration = PlanarConfiguration::Separate.as_u16();
		d.samples_per_pixel = 3;
		assert_eq!(d.plane_count(), 3);
		assert_eq!(d.tile_index(1, 0, 2), (1 + 0 * 2) * 3 + 2);
	}
}
