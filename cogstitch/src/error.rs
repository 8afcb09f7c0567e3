//! Error types surfaced by the container layout engine.

use thiserror::Error;

/// Errors raised while compiling an interlacing pattern string.
#[derive(Debug, Error)]
pub enum PatternError {
	#[error("pattern clause \"{clause}\" must have four axis specs, got {got}")]
	BadArity { clause: String, got: usize },

	#[error("unknown axis key \"{key}\" in clause \"{clause}\": must be one of R, Z, T, B")]
	UnknownKey { clause: String, key: String },

	#[error("axis {axis} is defined twice in clause \"{clause}\"")]
	DuplicateAxis { clause: String, axis: &'static str },

	#[error("tile axis cannot be defined before the zoom axis in clause \"{clause}\"")]
	TileBeforeZoom { clause: String },

	#[error("tile axis cannot be defined before the record axis in clause \"{clause}\"")]
	TileBeforeRecord { clause: String },

	#[error("cannot parse integer \"{value}\" in clause \"{clause}\"")]
	BadInteger { clause: String, value: String },
}

/// Errors raised while checking that a set of directories share a common grid.
#[derive(Debug, Error)]
pub enum GeometryError {
	#[error("directory {index}: non-square tile {width}x{height}")]
	NonSquareTile { index: usize, width: u32, height: u32 },

	#[error("directory {index}: incompatible pixel scale (x: {sx_got:.16}/{sx_want:.16}, y: {sy_got:.16}/{sy_want:.16})")]
	IncompatibleScale {
		index: usize,
		sx_got: f64,
		sx_want: f64,
		sy_got: f64,
		sy_want: f64,
	},

	#[error("directory {index}: incompatible tile size ({w_got}x{h_got} vs {w_want}x{h_want})")]
	IncompatibleTileSize {
		index: usize,
		w_got: u32,
		h_got: u32,
		w_want: u32,
		h_want: u32,
	},

	#[error("directory {index}: incompatible plane count ({got}/{want})")]
	IncompatiblePlaneCount { index: usize, got: u64, want: u64 },

	#[error("directory {index}: grid misalignment ({off_x:.3}, {off_y:.3}) pixels from the shared tile grid")]
	GridMisalignment { index: usize, off_x: f64, off_y: f64 },

	#[error("directory {index}: cannot decode a geotransform from the available tags")]
	MissingGeotransform { index: usize },

	#[error("aggregator has no directories to lay out")]
	Empty,
}

/// Top-level errors surfaced by `Aggregator::write`.
#[derive(Debug, Error)]
pub enum CogError {
	#[error(transparent)]
	Pattern(#[from] PatternError),

	#[error(transparent)]
	Geometry(#[from] GeometryError),

	#[error("sub-IFD offset array length ({got}) does not match child directory count ({want}) on directory {index}")]
	SubIfdLengthMismatch { index: usize, got: usize, want: usize },

	#[error("offset {offset} overflows 32-bit TIFF capacity; re-run with 64-bit offsets")]
	Overflow32 { offset: u64 },

	#[error("failed to read source tile data: {0}")]
	SourceRead(#[source] std::io::Error),

	#[error("failed to write destination data: {0}")]
	SinkWrite(#[source] std::io::Error),

	#[error("failed to seek source tile data: {0}")]
	Seek(#[source] std::io::Error),
}
