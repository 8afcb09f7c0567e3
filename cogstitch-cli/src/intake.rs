//! Best-effort directory intake from an on-disk tagged-image file, using
//! the `tiff` crate as an external parser. This is deliberately the
//! thinnest possible bridge from "bytes on disk" to a [`Directory`]: it
//! reads only the tags the core cares about and leaves everything else
//! (validation, resampling, re-encoding) untouched.

use std::{fs::File, io::BufReader, path::Path, sync::Arc};

use cogstitch::{source::FileSource, Directory};
use thiserror::Error;
use tiff::{decoder::Decoder, tags::Tag};

#[derive(Debug, Error)]
pub enum IntakeError {
	#[error("failed to open {path}: {source}")]
	Open { path: String, source: std::io::Error },

	#[error("failed to decode {path}: {source}")]
	Decode { path: String, source: tiff::TiffError },

	#[error("{path} has no tile layout (striped TIFFs are not supported)")]
	NotTiled { path: String },
}

/// One directory read from `path`, plus every overview that followed it in
/// the same file, each tagged with its pyramid level.
pub struct Intake {
	pub primary: Directory,
	pub overviews: Vec<Directory>,
	pub source: Arc<FileSource>,
}

pub fn load(path: &Path) -> Result<Intake, IntakeError> {
	let path_str = path.display().to_string();
	let file = File::open(path).map_err(|source| IntakeError::Open {
		path: path_str.clone(),
		source,
	})?;
	let source = Arc::new(FileSource::open(path).map_err(|source| IntakeError::Open {
		path: path_str.clone(),
		source,
	})?);

	let mut decoder = Decoder::new(BufReader::new(file)).map_err(|source| IntakeError::Decode {
		path: path_str.clone(),
		source,
	})?;

	let document_name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("unnamed").to_string();

	let mut zoom = 0u64;
	let mut primary = None;
	let mut overviews = Vec::new();

	loop {
		let mut dir = read_directory(&mut decoder, &path_str, &document_name)?;
		dir.zoom_level = zoom;
		dir.source = Some(Arc::downgrade(&source));

		if zoom == 0 {
			primary = Some(dir);
		} else {
			overviews.push(dir);
		}

		if !decoder.more_images() {
			break;
		}
		decoder.next_image().map_err(|source| IntakeError::Decode {
			path: path_str.clone(),
			source,
		})?;
		zoom += 1;
	}

	let primary = primary.ok_or_else(|| IntakeError::NotTiled { path: path_str.clone() })?;
	Ok(Intake { primary, overviews, source })
}

fn read_directory(decoder: &mut Decoder<BufReader<File>>, path: &str, document_name: &str) -> Result<Directory, IntakeError> {
	let (width, height) = decoder.dimensions().map_err(|source| IntakeError::Decode {
		path: path.to_string(),
		source,
	})?;

	let tile_dims = decoder.chunk_dimensions();
	if decoder.get_tag_u32(Tag::TileWidth).is_err() {
		return Err(IntakeError::NotTiled { path: path.to_string() });
	}

	let mut dir = Directory::new(width, height, tile_dims.0 as u16, tile_dims.1 as u16, photometric(decoder));
	dir.document_name = document_name.to_string();
	dir.samples_per_pixel = decoder.get_tag_u32(Tag::SamplesPerPixel).unwrap_or(1) as u16;
	dir.bits_per_sample = u16_vec(decoder, Tag::BitsPerSample).unwrap_or_else(|| vec![8]);
	dir.compression = decoder.get_tag_u32(Tag::Compression).unwrap_or(1) as u16;
	dir.predictor = decoder.get_tag_u32(Tag::Predictor).unwrap_or(1) as u16;
	dir.sample_format = u16_vec(decoder, Tag::SampleFormat).unwrap_or_default();

	dir.model_pixel_scale = f64_vec(decoder, Tag::Unknown(33550)).unwrap_or_default();
	dir.model_tie_point = f64_vec(decoder, Tag::Unknown(33922)).unwrap_or_default();
	dir.model_transformation = f64_vec(decoder, Tag::Unknown(34264)).unwrap_or_default();
	dir.geo_key_directory = u16_vec(decoder, Tag::Unknown(34735)).unwrap_or_default();
	dir.geo_double_params = f64_vec(decoder, Tag::Unknown(34736)).unwrap_or_default();

	let (offsets, byte_counts) = chunk_table(decoder);
	dir.tiles.original_offsets = offsets;
	dir.tiles.original_byte_counts = byte_counts;

	Ok(dir)
}

fn photometric(decoder: &mut Decoder<BufReader<File>>) -> u16 {
	decoder.get_tag_u32(Tag::PhotometricInterpretation).unwrap_or(1) as u16
}

fn u16_vec(decoder: &mut Decoder<BufReader<File>>, tag: Tag) -> Option<Vec<u16>> {
	decoder.get_tag_u32_vec(tag).ok().map(|v| v.into_iter().map(|x| x as u16).collect())
}

fn f64_vec(decoder: &mut Decoder<BufReader<File>>, tag: Tag) -> Option<Vec<f64>> {
	decoder.get_tag_f64_vec(tag).ok()
}

/// Reads every tile's byte range via the decoder's own chunk offset table,
/// without decompressing any tile payload.
fn chunk_table(decoder: &mut Decoder<BufReader<File>>) -> (Vec<u64>, Vec<u32>) {
	let n = decoder.tile_count().unwrap_or(0) as u64;
	let mut offsets = Vec::with_capacity(n as usize);
	let mut byte_counts = Vec::with_capacity(n as usize);
	for i in 0..n {
		match decoder.chunk_file_range(i as u32) {
			Ok((offset, len)) => {
				offsets.push(offset);
				byte_counts.push(len as u32);
			},
			Err(_) => {
				offsets.push(0);
				byte_counts.push(0);
			},
		}
	}
	(offsets, byte_counts)
}
