//! The aggregator: owns the directory tree, resolves its shared geometry,
//! and replays an interlacing pattern into the flat tile-tuple stream the
//! offset assigner and writer consume.

use std::collections::BTreeMap;

use crate::{
	directory::{Directory, GridBox},
	error::GeometryError,
	geometry::{self, ResolvedGeometry},
	pattern::{Axis, Clause, Pattern},
};

/// One tile to be written: which record, which zoom level within that
/// record, which flattened tile index, and which band.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TileRef {
	pub record: usize,
	pub zoom: u64,
	pub tile: u64,
	pub band: u64,
}

/// A top-level record together with its children's emission order: indices
/// into `record.children`, ordered as same-resolution masks first, then
/// overviews sorted by zoom and subfile type.
pub struct DirectoryOrder {
	pub record: usize,
	pub children: Vec<usize>,
}

/// Owns every record appended to the container and the bookkeeping needed
/// to lay them out as one interlaced stream.
#[derive(Default)]
pub struct Aggregator {
	records: Vec<Directory>,
	zoom_extent: BTreeMap<u64, GridBox>,
}

impl Aggregator {
	pub fn new() -> Self {
		Aggregator::default()
	}

	/// Appends a new top-level record (one input source's primary image)
	/// and returns its index.
	pub fn append_directory(&mut self, dir: Directory) -> usize {
		self.records.push(dir);
		self.records.len() - 1
	}

	/// Attaches `ovr` as an overview of record `record`. `ovr.zoom_level`
	/// must already be set to its position in that record's pyramid.
	pub fn attach_overview(&mut self, record: usize, ovr: Directory) {
		self.records[record].attach_overview(ovr);
	}

	/// Attaches `mask` as a same-resolution validity mask of record `record`.
	pub fn attach_mask(&mut self, record: usize, mask: Directory) {
		self.records[record].attach_mask(mask);
	}

	pub fn records(&self) -> &[Directory] {
		&self.records
	}

	pub fn records_mut(&mut self) -> &mut [Directory] {
		&mut self.records
	}

	/// Resolves the shared geometry across all top-level records, computes
	/// tile grids for every directory (including children), and folds
	/// each zoom level's tile extent into a running union.
	///
	/// Must be called once, after every `append_directory` / `attach_*`
	/// call and before `plan` or `data_interlacing`.
	pub fn finalize(&mut self) -> Result<ResolvedGeometry, GeometryError> {
		let resolved = geometry::resolve(&mut self.records)?;

		self.zoom_extent.clear();
		for record in &mut self.records {
			fold_zoom_extent(&mut self.zoom_extent, 0, record.grid);
			for child in &mut record.children {
				geometry::compute_tile_grid(child);
				fold_zoom_extent(&mut self.zoom_extent, child.zoom_level, child.grid);
			}
		}

		Ok(resolved)
	}

	/// The union of every directory's tile-grid extent at a given zoom
	/// level, across all records. Its key count is the zoom axis's
	/// cardinality in `plan`: a zoom level counts as present if *any*
	/// record has it, not just the record a clause happens to be visiting.
	pub fn zoom_extent(&self, zoom: u64) -> Option<GridBox> {
		self.zoom_extent.get(&zoom).copied()
	}

	/// How many distinct zoom levels exist across every record. Zero only
	/// before `finalize` has run.
	fn zoom_cardinality(&self) -> u64 {
		self.zoom_extent.len() as u64
	}

	/// Per top-level record, the emission order of its children: indices
	/// into `records[record].children`, ordered as `[masks sharing its
	/// resolution, overviews sorted by (zoom, subfile type)]`.
	pub fn data_interlacing(&self) -> Vec<DirectoryOrder> {
		self.records
			.iter()
			.enumerate()
			.map(|(record, primary)| {
				let mut masks = Vec::new();
				let mut overviews = Vec::new();
				for (i, child) in primary.children.iter().enumerate() {
					if child.is_mask() && child.image_width == primary.image_width {
						masks.push(i);
					} else {
						overviews.push(i);
					}
				}
				overviews.sort_by_key(|&i| (primary.children[i].zoom_level, primary.children[i].subfile_type));

				let mut children = masks;
				children.append(&mut overviews);
				DirectoryOrder { record, children }
			})
			.collect()
	}

	/// Replays `pattern`'s clauses in order, yielding the tile-tuple stream
	/// that the offset assigner walks to give every non-empty tile a byte
	/// offset.
	///
	/// Nesting follows each clause's own `order`, outside-in, with the axis
	/// written last advancing fastest -- not a fixed record/zoom/tile/band
	/// nesting. Record and zoom resolve against global cardinalities (the
	/// record count, and the number of distinct zoom levels across every
	/// record). Tile walks `(x, y)` pairs over the *union* tile-grid box at
	/// the chosen zoom level (`zoom_extent`, across every record, not just
	/// the one the clause is currently visiting), then keeps only the pairs
	/// that actually fall inside the resolved `(record, zoom)` directory's
	/// own grid -- the same generate-wide-then-filter-narrow shape the
	/// bounding-box union exists for. Band is resolved against `nb_bands`
	/// (the widest record), then clamped to the resolved directory's own
	/// plane count at emission, since a child directory can carry fewer
	/// planes than the widest top-level record.
	pub fn plan(&self, pattern: &Pattern, nb_bands: u64) -> Vec<TileRef> {
		let mut out = Vec::new();
		let zoom_cardinality = self.zoom_cardinality();

		for clause in &pattern.clauses {
			let mut values = [None; 4];
			self.plan_axis(clause, 0, zoom_cardinality, nb_bands, &mut values, &mut out);
		}

		out
	}

	/// Recursive step of `plan`: fills in the axis at clause position `pos`,
	/// recursing one position deeper for every value it takes, until all
	/// four are chosen and a tile-tuple is emitted.
	fn plan_axis(&self, clause: &Clause, pos: usize, zoom_cardinality: u64, nb_bands: u64, values: &mut [Option<u64>; 4], out: &mut Vec<TileRef>) {
		if pos == 4 {
			let r = values[Axis::Record.index()].expect("record resolved by clause position 0..4");
			let z = values[Axis::Zoom.index()].expect("zoom resolved by clause position 0..4");
			let t = values[Axis::Tile.index()].expect("tile resolved by clause position 0..4");
			let b = values[Axis::Band.index()].expect("band resolved by clause position 0..4");

			// A band beyond this specific directory's own plane count would
			// index past the end of its tile tables; skip it rather than
			// trusting nb_bands, which is only the widest record's count.
			let Some(record) = self.records.get(r as usize) else { return };
			let Some(dir) = self.directory_at(record, z) else { return };
			if b >= dir.plane_count() {
				return;
			}

			out.push(TileRef { record: r as usize, zoom: z, tile: t, band: b });
			return;
		}

		match clause.order[pos] {
			Axis::Record => {
				for r in clause.record.resolve(self.records.len() as u64).iter() {
					values[Axis::Record.index()] = Some(r);
					self.plan_axis(clause, pos + 1, zoom_cardinality, nb_bands, values, out);
				}
				values[Axis::Record.index()] = None;
			},
			Axis::Zoom => {
				for z in clause.zoom.resolve(zoom_cardinality).iter() {
					values[Axis::Zoom.index()] = Some(z);
					self.plan_axis(clause, pos + 1, zoom_cardinality, nb_bands, values, out);
				}
				values[Axis::Zoom.index()] = None;
			},
			Axis::Tile => {
				// Guaranteed resolved already: clause validation rejects
				// tile appearing before either record or zoom.
				let r = values[Axis::Record.index()].expect("clause validation: tile never precedes record");
				let z = values[Axis::Zoom.index()].expect("clause validation: tile never precedes zoom");
				let Some(record) = self.records.get(r as usize) else { return };
				let Some(dir) = self.directory_at(record, z) else { return };
				let Some(bbox) = self.zoom_extent(z) else { return };

				let width = bbox.maxx.saturating_sub(bbox.minx);
				let height = bbox.maxy.saturating_sub(bbox.miny);
				if width == 0 || height == 0 {
					return;
				}

				for raw in clause.tile.resolve(width * height).iter() {
					let x = bbox.minx + raw % width;
					let y = bbox.miny + raw / width;
					if !dir.grid.contains(x, y) {
						continue;
					}
					let local_tile = (y - dir.grid.miny) * dir.ntilesx + (x - dir.grid.minx);
					values[Axis::Tile.index()] = Some(local_tile);
					self.plan_axis(clause, pos + 1, zoom_cardinality, nb_bands, values, out);
				}
				values[Axis::Tile.index()] = None;
			},
			Axis::Band => {
				for b in clause.band.resolve(nb_bands).iter() {
					values[Axis::Band.index()] = Some(b);
					self.plan_axis(clause, pos + 1, zoom_cardinality, nb_bands, values, out);
				}
				values[Axis::Band.index()] = None;
			},
		}
	}

	fn directory_at<'a>(&self, record: &'a Directory, zoom: u64) -> Option<&'a Directory> {
		if zoom == 0 {
			return Some(record);
		}
		record.children.iter().filter(|c| !c.is_mask()).find(|c| c.zoom_level == zoom)
	}

	/// Mutable lookup of the directory a `(record, zoom)` pair addresses,
	/// used by the offset assigner to fill in new tile offsets in place.
	pub fn directory_at_mut(&mut self, record: usize, zoom: u64) -> Option<&mut Directory> {
		let record = self.records.get_mut(record)?;
		if zoom == 0 {
			return Some(record);
		}
		record.children.iter_mut().filter(|c| !c.is_mask()).find(|c| c.zoom_level == zoom)
	}
}

fn fold_zoom_extent(map: &mut BTreeMap<u64, GridBox>, zoom: u64, grid: GridBox) {
	map.entry(zoom).and_modify(|existing| *existing = existing.union(grid)).or_insert(grid);
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::pattern::Pattern;

	fn directory(origin_x: f64, origin_y: f64) -> Directory {
		let mut d = Directory::new(512, 512, 256, 256, 1);
		d.model_pixel_scale = vec![0.01, 0.01, 0.0];
		d.model_tie_point = vec![0.0, 0.0, 0.0, origin_x, origin_y, 0.0];
		d.samples_per_pixel = 1;
		d.tiles.original_offsets = vec![1; 4];
		d.tiles.original_byte_counts = vec![10; 4];
		d
	}

	fn overview(origin_x: f64, origin_y: f64, zoom: u64) -> Directory {
		let mut d = Directory::new(256, 256, 256, 256, 1);
		d.samples_per_pixel = 1;
		d.zoom_level = zoom;
		d.tiles.original_offsets = vec![1];
		d.tiles.original_byte_counts = vec![10];
		let _ = (origin_x, origin_y);
		d
	}

	#[test]
	fn zoom_extent_unions_across_records() {
		let mut agg = Aggregator::new();
		let r0 = agg.append_directory(directory(0.0, 10.0));
		agg.attach_overview(r0, overview(0.0, 10.0, 1));
		let r1 = agg.append_directory(directory(2.56, 10.0));
		agg.attach_overview(r1, overview(2.56, 10.0, 1));

		agg.finalize().unwrap();

		let extent = agg.zoom_extent(1).unwrap();
		assert_eq!(extent.minx, 0);
		assert!(extent.maxx >= 1);
	}

	#[test]
	fn data_interlacing_orders_masks_before_overviews() {
		let mut agg = Aggregator::new();
		let r0 = agg.append_directory(directory(0.0, 10.0));
		agg.attach_overview(r0, overview(0.0, 10.0, 2));
		agg.attach_overview(r0, overview(0.0, 10.0, 1));
		let mut mask = directory(0.0, 10.0);
		mask.subfile_type = crate::tags::subfile_type::MASK;
		agg.attach_mask(r0, mask);

		agg.finalize().unwrap();
		let order = agg.data_interlacing();
		let record = &agg.records()[order[0].record];
		assert_eq!(order[0].children.len(), 3);
		assert!(record.children[order[0].children[0]].is_mask());
		assert_eq!(record.children[order[0].children[1]].zoom_level, 1);
		assert_eq!(record.children[order[0].children[2]].zoom_level, 2);
	}

	#[test]
	fn plan_walks_record_zoom_tile_band_in_clause_order() {
		let mut agg = Aggregator::new();
		agg.append_directory(directory(0.0, 10.0));
		agg.finalize().unwrap();

		let pattern = Pattern::parse("R>Z>T>B").unwrap();
		let plan = agg.plan(&pattern, 1);

		assert_eq!(plan.len(), 4);
		assert_eq!(plan[0], TileRef { record: 0, zoom: 0, tile: 0, band: 0 });
		assert_eq!(plan[3], TileRef { record: 0, zoom: 0, tile: 3, band: 0 });
	}

	fn directory_with_bands(origin_x: f64, origin_y: f64, bands: u16) -> Directory {
		let mut d = Directory::new(512, 512, 256, 256, 1);
		d.model_pixel_scale = vec![0.01, 0.01, 0.0];
		d.model_tie_point = vec![0.0, 0.0, 0.0, origin_x, origin_y, 0.0];
		d.samples_per_pixel = bands;
		d.planar_configuration = crate::tags::PlanarConfiguration::Separate.as_u16();
		d.tiles.original_offsets = vec![1; 4 * bands as usize];
		d.tiles.original_byte_counts = vec![10; 4 * bands as usize];
		d
	}

	#[test]
	fn plan_nests_in_the_clause_s_own_order_not_a_fixed_one() {
		let mut agg = Aggregator::new();
		agg.append_directory(directory_with_bands(0.0, 10.0, 2));
		agg.finalize().unwrap();

		// Band written first: it should be outermost, tile (written last)
		// should advance fastest.
		let band_major = Pattern::parse("B>R>Z>T").unwrap();
		let plan = agg.plan(&band_major, 2);
		assert_eq!(plan.len(), 8);
		assert!(plan[..4].iter().all(|t| t.band == 0));
		assert!(plan[4..].iter().all(|t| t.band == 1));
		assert_eq!(plan[0].tile, 0);
		assert_eq!(plan[3].tile, 3);

		// Same axes, band written last instead: band should now advance
		// fastest and tile should be outermost of the two.
		let tile_major = Pattern::parse("R>Z>T>B").unwrap();
		let plan = agg.plan(&tile_major, 2);
		assert_eq!(plan.len(), 8);
		assert_eq!(plan[0], TileRef { record: 0, zoom: 0, tile: 0, band: 0 });
		assert_eq!(plan[1], TileRef { record: 0, zoom: 0, tile: 0, band: 1 });
		assert_eq!(plan[2], TileRef { record: 0, zoom: 0, tile: 1, band: 0 });
	}

	#[test]
	fn plan_clamps_band_to_the_resolved_directory_s_own_plane_count() {
		let mut agg = Aggregator::new();
		let r0 = agg.append_directory(directory_with_bands(0.0, 10.0, 2));
		agg.attach_overview(r0, {
			let mut ovr = overview(0.0, 10.0, 1);
			ovr.planar_configuration = crate::tags::PlanarConfiguration::Separate.as_u16();
			ovr.samples_per_pixel = 1;
			ovr
		});
		agg.finalize().unwrap();

		// nb_bands is the widest record's count (2), but the overview only
		// has one plane; band 1 must be skipped for it, not panic.
		let pattern = Pattern::parse("Z>R>T>B").unwrap();
		let plan = agg.plan(&pattern, 2);

		let overview_tiles: Vec<_> = plan.iter().filter(|t| t.zoom == 1).collect();
		assert_eq!(overview_tiles.len(), 1);
		assert_eq!(overview_tiles[0].band, 0);
	}

	#[test]
	fn plan_resolves_zoom_cardinality_globally_across_records() {
		let mut agg = Aggregator::new();
		let r0 = agg.append_directory(directory(0.0, 10.0));
		agg.attach_overview(r0, overview(0.0, 10.0, 1));
		agg.append_directory(directory(2.56, 10.0));

		agg.finalize().unwrap();

		// Zoom level 1 exists only for record 0, but its cardinality (from
		// zoom_extent) is global, so a clause with zoom outermost must
		// still visit it -- record 1 simply has nothing to contribute there.
		let pattern = Pattern::parse("Z>R>T>B").unwrap();
		let plan = agg.plan(&pattern, 1);

		let at_zoom_one: Vec<_> = plan.iter().filter(|t| t.zoom == 1).collect();
		assert!(!at_zoom_one.is_empty());
		assert!(at_zoom_one.iter().all(|t| t.record == 0));
	}
}
