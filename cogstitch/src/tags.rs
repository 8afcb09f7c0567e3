//! Tag numbers and on-disk field types for the output container format.
//!
//! Numbering follows the standard tagged-image tag registry plus the usual
//! GeoTIFF extensions: the core only ever emits these tags, always in
//! ascending order.

#![allow(dead_code)]

pub const SUBFILE_TYPE: u16 = 254;
pub const IMAGE_WIDTH: u16 = 256;
pub const IMAGE_LENGTH: u16 = 257;
pub const BITS_PER_SAMPLE: u16 = 258;
pub const COMPRESSION: u16 = 259;
pub const PHOTOMETRIC_INTERPRETATION: u16 = 262;
pub const DOCUMENT_NAME: u16 = 269;
pub const SAMPLES_PER_PIXEL: u16 = 277;
pub const PLANAR_CONFIGURATION: u16 = 284;
pub const DATE_TIME: u16 = 306;
pub const PREDICTOR: u16 = 317;
pub const COLORMAP: u16 = 320;
pub const TILE_WIDTH: u16 = 322;
pub const TILE_LENGTH: u16 = 323;
pub const TILE_OFFSETS: u16 = 324;
pub const TILE_BYTE_COUNTS: u16 = 325;
pub const SUB_IFD_OFFSETS: u16 = 330;
pub const EXTRA_SAMPLES: u16 = 338;
pub const SAMPLE_FORMAT: u16 = 339;
pub const JPEG_TABLES: u16 = 347;
pub const MODEL_PIXEL_SCALE: u16 = 33550;
pub const MODEL_TIE_POINT: u16 = 33922;
pub const MODEL_TRANSFORMATION: u16 = 34264;
pub const GEO_KEY_DIRECTORY: u16 = 34735;
pub const GEO_DOUBLE_PARAMS: u16 = 34736;
pub const GEO_ASCII_PARAMS: u16 = 34737;
pub const GDAL_METADATA: u16 = 42112;
pub const GDAL_NODATA: u16 = 42113;
pub const LERC_PARAMS: u16 = 50674;
pub const RPCS: u16 = 50844;

/// On-disk field type codes.
pub const T_BYTE: u16 = 1;
pub const T_ASCII: u16 = 2;
pub const T_SHORT: u16 = 3;
pub const T_LONG: u16 = 4;
pub const T_DOUBLE: u16 = 12;
pub const T_LONG8: u16 = 16;

/// Subfile type bit flags (tag 254).
pub mod subfile_type {
	pub const IMAGE: u32 = 0;
	pub const REDUCED_IMAGE: u32 = 1;
	pub const PAGE: u32 = 2;
	pub const MASK: u32 = 4;
}

/// Planar configuration values (tag 284).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PlanarConfiguration {
	Contig = 1,
	Separate = 2,
}

impl PlanarConfiguration {
	pub fn as_u16(self) -> u16 {
		self as u16
	}
}
