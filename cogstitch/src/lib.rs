//! A container layout engine for interlacing tile payloads from several
//! tagged-image source files into one multi-record container, according to
//! a small pattern language over the record/zoom/tile/band axes.
//!
//! The pipeline is: build a [`Directory`] per source image (and per
//! overview/mask), [`Aggregator::append_directory`] each one, attach
//! children, [`Aggregator::finalize`] to resolve their shared geometry,
//! then [`writer::write`] with a compiled [`Pattern`] to produce the
//! container bytes. Source tile data is never decoded or re-encoded: every
//! tile is copied byte-for-byte from wherever the original lives.

pub mod aggregator;
pub mod directory;
pub mod error;
pub mod field;
pub mod geometry;
pub mod geotransform;
pub mod offset;
pub mod pattern;
pub mod source;
pub mod tags;
pub mod writer;

pub use aggregator::{Aggregator, DirectoryOrder, TileRef};
pub use directory::{Directory, GridBox, TileTable};
pub use error::{CogError, GeometryError, PatternError};
pub use geometry::ResolvedGeometry;
pub use geotransform::GeoTransform;
pub use pattern::{AxisSelector, Clause, Pattern};
pub use source::{FileSource, MemorySource, TileSource};
