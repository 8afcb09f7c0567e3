//! Decoding the affine geotransform of a directory from whichever
//! georeferencing tags it carries.

use crate::error::GeometryError;

/// A 6-element affine transform from pixel/line space to a projected or
/// geographic coordinate system, in the same `[x0, dx, rx, y0, ry, dy]`
/// layout used throughout the GIS ecosystem.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GeoTransform {
	pub origin_x: f64,
	pub pixel_width: f64,
	pub row_rotation: f64,
	pub origin_y: f64,
	pub col_rotation: f64,
	pub pixel_height: f64,
}

impl GeoTransform {
	/// The origin (top-left corner, in the directory's own CRS).
	pub fn origin(&self) -> (f64, f64) {
		(self.origin_x, self.origin_y)
	}

	/// Absolute pixel scale, independent of axis direction.
	pub fn scale(&self) -> (f64, f64) {
		(self.pixel_width.abs(), self.pixel_height.abs())
	}

	/// Derives a geotransform from `ModelPixelScaleTag` + the first tie
	/// point in `ModelTiePointTag`. This is the common case for untilted,
	/// axis-aligned rasters.
	pub fn from_pixel_scale_and_tie_point(scale: &[f64], tie_point: &[f64]) -> Option<Self> {
		if scale.len() < 2 || tie_point.len() < 6 {
			return None;
		}
		let (sx, sy) = (scale[0], scale[1]);
		let (i, j, x, y) = (tie_point[0], tie_point[1], tie_point[3], tie_point[4]);
		Some(GeoTransform {
			origin_x: x - i * sx,
			pixel_width: sx,
			row_rotation: 0.0,
			origin_y: y + j * sy,
			col_rotation: 0.0,
			pixel_height: -sy,
		})
	}

	/// Derives a geotransform directly from `ModelTransformationTag`, a
	/// row-major 4x4 matrix.
	pub fn from_transformation_matrix(m: &[f64]) -> Option<Self> {
		if m.len() < 16 {
			return None;
		}
		Some(GeoTransform {
			origin_x: m[3],
			pixel_width: m[0],
			row_rotation: m[1],
			origin_y: m[7],
			col_rotation: m[4],
			pixel_height: m[5],
		})
	}

	/// Decodes whichever georeferencing tags are available, preferring the
	/// explicit transformation matrix when both are present.
	pub fn decode(
		index: usize, model_transformation: &[f64], model_pixel_scale: &[f64], model_tie_point: &[f64],
	) -> Result<Self, GeometryError> {
		if let Some(gt) = Self::from_transformation_matrix(model_transformation) {
			return Ok(gt);
		}
		Self::from_pixel_scale_and_tie_point(model_pixel_scale, model_tie_point)
			.ok_or(GeometryError::MissingGeotransform { index })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pixel_scale_and_tie_point_round_trips_origin() {
		let scale = [0.001, 0.001, 0.0];
		let tie_point = [0.0, 0.0, 0.0, 10.0, 50.0, 0.0];
		let gt = GeoTransform::from_pixel_scale_and_tie_point(&scale, &tie_point).unwrap();
		assert_eq!(gt.origin(), (10.0, 50.0));
		assert_eq!(gt.scale(), (0.001, 0.001));
	}

	#[test]
	fn transformation_matrix_extracts_axes() {
		let m = [0.001, 0.0, 0.0, 10.0, 0.0, -0.001, 0.0, 50.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0];
		let gt = GeoTransform::from_transformation_matrix(&m).unwrap();
		assert_eq!(gt.origin(), (10.0, 50.0));
		assert_eq!(gt.scale(), (0.001, 0.001));
	}

	#[test]
	fn decode_fails_without_any_tag() {
		let err = GeoTransform::decode(3, &[], &[], &[]).unwrap_err();
		matches!(err, GeometryError::MissingGeotransform { index: 3 });
	}
}
