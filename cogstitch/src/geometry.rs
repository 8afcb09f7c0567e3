//! The geometry resolver: decodes each top-level directory's geotransform,
//! checks that they all describe one consistent tile grid, and locates the
//! shared corner the whole container is laid out against.
//!
//! Only top-level directories (one per record, at zoom 0) go through the
//! cross-directory checks here: they are the ones that must agree on a
//! single world grid so that the same tile index means the same patch of
//! ground in every record. Overview and mask children live entirely inside
//! their own record's subtree and only need their own tile counts, handled
//! by [`compute_tile_grid`].

use crate::{
	directory::{Directory, GridBox},
	error::GeometryError,
	geotransform::GeoTransform,
};

const SCALE_TOLERANCE: f64 = 1e-8;
const ALIGNMENT_TOLERANCE_PX: f64 = 0.1;

/// Geometry shared by every top-level directory once they have been
/// checked for mutual compatibility.
#[derive(Debug, Copy, Clone)]
pub struct ResolvedGeometry {
	pub corner_x: f64,
	pub corner_y: f64,
	pub pixel_width: f64,
	pub pixel_height: f64,
	pub tile_width: u16,
	pub tile_length: u16,
	pub plane_count: u64,
}

/// Resolves and cross-checks the geometry of every top-level directory,
/// writing back `ntilesx`, `ntilesy`, `grid` and `geotransform` on each.
pub fn resolve(directories: &mut [Directory]) -> Result<ResolvedGeometry, GeometryError> {
	tracy::zone!("Resolve geometry");

	if directories.is_empty() {
		return Err(GeometryError::Empty);
	}

	let mut decoded = Vec::with_capacity(directories.len());
	for (i, dir) in directories.iter().enumerate() {
		decoded.push(GeoTransform::decode(i, &dir.model_transformation, &dir.model_pixel_scale, &dir.model_tie_point)?);
	}

	let ref_gt = decoded[0];
	let (ref_sx, ref_sy) = ref_gt.scale();
	let ref_tile_w = directories[0].tile_width;
	let ref_tile_h = directories[0].tile_length;
	let ref_plane_count = directories[0].plane_count();

	let mut corner_x = decoded[0].origin_x;
	let mut corner_y = decoded[0].origin_y;
	for gt in &decoded {
		corner_x = corner_x.min(gt.origin_x);
		corner_y = corner_y.max(gt.origin_y);
	}

	for (i, dir) in directories.iter_mut().enumerate() {
		let gt = decoded[i];

		if dir.tile_width != dir.tile_length {
			return Err(GeometryError::NonSquareTile {
				index: i,
				width: dir.tile_width as u32,
				height: dir.tile_length as u32,
			});
		}
		if dir.tile_width != ref_tile_w || dir.tile_length != ref_tile_h {
			return Err(GeometryError::IncompatibleTileSize {
				index: i,
				w_got: dir.tile_width as u32,
				h_got: dir.tile_length as u32,
				w_want: ref_tile_w as u32,
				h_want: ref_tile_h as u32,
			});
		}

		let plane_count = dir.plane_count();
		if plane_count != ref_plane_count {
			return Err(GeometryError::IncompatiblePlaneCount {
				index: i,
				got: plane_count,
				want: ref_plane_count,
			});
		}

		let (sx, sy) = gt.scale();
		let rel_x = ((sx - ref_sx) / ref_sx).abs();
		let rel_y = ((sy - ref_sy) / ref_sy).abs();
		if rel_x > SCALE_TOLERANCE || rel_y > SCALE_TOLERANCE {
			return Err(GeometryError::IncompatibleScale {
				index: i,
				sx_got: sx,
				sx_want: ref_sx,
				sy_got: sy,
				sy_want: ref_sy,
			});
		}

		let tile_world_w = sx * dir.tile_width as f64;
		let tile_world_h = sy * dir.tile_length as f64;
		let off_x_tiles = (gt.origin_x - corner_x) / tile_world_w;
		let off_y_tiles = (corner_y - gt.origin_y) / tile_world_h;
		let off_x_px = (off_x_tiles - off_x_tiles.round()) * dir.tile_width as f64;
		let off_y_px = (off_y_tiles - off_y_tiles.round()) * dir.tile_length as f64;
		if off_x_px.abs() > ALIGNMENT_TOLERANCE_PX || off_y_px.abs() > ALIGNMENT_TOLERANCE_PX {
			return Err(GeometryError::GridMisalignment {
				index: i,
				off_x: off_x_px,
				off_y: off_y_px,
			});
		}

		compute_tile_grid(dir);
		dir.grid = GridBox {
			minx: off_x_tiles.round() as u64,
			miny: off_y_tiles.round() as u64,
			maxx: off_x_tiles.round() as u64 + dir.ntilesx,
			maxy: off_y_tiles.round() as u64 + dir.ntilesy,
		};
		dir.geotransform = Some(gt);
	}

	Ok(ResolvedGeometry {
		corner_x,
		corner_y,
		pixel_width: ref_sx,
		pixel_height: ref_sy,
		tile_width: ref_tile_w,
		tile_length: ref_tile_h,
		plane_count: ref_plane_count,
	})
}

/// Sets `ntilesx`/`ntilesy` and a local, zero-based [`GridBox`] from a
/// directory's own image and tile dimensions. Used for overview and mask
/// children, which are addressed relative to their own record rather than
/// the shared world grid.
pub fn compute_tile_grid(dir: &mut Directory) {
	dir.ntilesx = (dir.image_width as u64 + dir.tile_width as u64 - 1) / dir.tile_width as u64;
	dir.ntilesy = (dir.image_length as u64 + dir.tile_length as u64 - 1) / dir.tile_length as u64;
	if dir.grid == GridBox::default() {
		dir.grid = GridBox {
			minx: 0,
			miny: 0,
			maxx: dir.ntilesx,
			maxy: dir.ntilesy,
		};
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn aligned_directory(origin_x: f64, origin_y: f64, scale: f64) -> Directory {
		let mut d = Directory::new(512, 512, 256, 256, 1);
		d.model_pixel_scale = vec![scale, scale, 0.0];
		d.model_tie_point = vec![0.0, 0.0, 0.0, origin_x, origin_y, 0.0];
		d.samples_per_pixel = 1;
		d
	}

	#[test]
	fn empty_input_is_an_error() {
		let err = resolve(&mut []).unwrap_err();
		assert!(matches!(err, GeometryError::Empty));
	}

	#[test]
	fn single_directory_resolves_cleanly() {
		let mut dirs = vec![aligned_directory(0.0, 10.0, 0.01)];
		let geo = resolve(&mut dirs).unwrap();
		assert_eq!(geo.corner_x, 0.0);
		assert_eq!(geo.corner_y, 10.0);
		assert_eq!(dirs[0].ntilesx, 2);
		assert_eq!(dirs[0].ntilesy, 2);
	}

	#[test]
	fn aligned_neighbors_pass() {
		// A second tile directly to the east, exactly one tile-width away.
		let mut dirs = vec![aligned_directory(0.0, 10.0, 0.01), aligned_directory(2.56, 10.0, 0.01)];
		let geo = resolve(&mut dirs).unwrap();
		assert_eq!(geo.corner_x, 0.0);
		assert_eq!(dirs[1].grid.minx, 1);
	}

	#[test]
	fn misaligned_neighbor_is_rejected() {
		let mut dirs = vec![aligned_directory(0.0, 10.0, 0.01), aligned_directory(1.0, 10.0, 0.01)];
		let err = resolve(&mut dirs).unwrap_err();
		assert!(matches!(err, GeometryError::GridMisalignment { index: 1, .. }));
	}

	#[test]
	fn mismatched_scale_is_rejected() {
		let mut dirs = vec![aligned_directory(0.0, 10.0, 0.01), aligned_directory(0.0, 10.0, 0.02)];
		let err = resolve(&mut dirs).unwrap_err();
		assert!(matches!(err, GeometryError::IncompatibleScale { index: 1, .. }));
	}

	#[test]
	fn non_square_tile_is_rejected() {
		let mut d = aligned_directory(0.0, 10.0, 0.01);
		d.tile_length = 128;
		let mut dirs = vec![d];
		let err = resolve(&mut dirs).unwrap_err();
		assert!(matches!(err, GeometryError::NonSquareTile { .. }));
	}
}
