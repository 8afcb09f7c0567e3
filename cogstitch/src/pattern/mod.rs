//! The interlacing pattern DSL: compiles a small textual language over the
//! four axes (record, zoom, tile, band) into a sequence of clauses the
//! aggregator replays to decide tile-write order.
//!
//! Grammar:
//!
//! ```text
//! pattern := clause (';' clause)*
//! clause  := spec '>' spec '>' spec '>' spec      -- one spec per axis, any order
//! spec    := axis | axis '=' sel
//! axis    := 'R' | 'Z' | 'T' | 'B'
//! sel     := values | range
//! values  := int (',' int)*
//! range   := int? ':' int?                         -- open ends default to the full axis
//! ```
//!
//! A bare axis with no `=` selects the whole axis. `T` may not be given
//! before `Z` in the same clause, because a tile index is only meaningful
//! once a zoom level has narrowed the grid it indexes into.

mod iter;

pub use iter::{ClauseIter, ResolvedAxis};

use crate::error::PatternError;

/// The four axes a clause composes over, identified canonically rather than
/// by the position they were written at. Indices match the original's
/// four-slot index table (record, zoom, tile, band).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
	Record,
	Zoom,
	Tile,
	Band,
}

impl Axis {
	pub fn index(self) -> usize {
		match self {
			Axis::Record => 0,
			Axis::Zoom => 1,
			Axis::Tile => 2,
			Axis::Band => 3,
		}
	}
}

/// An axis selector as written in the pattern, before it is resolved
/// against a concrete axis size.
#[derive(Debug, Clone, PartialEq)]
pub enum AxisSelector {
	/// A bare axis: the entire range, resolved lazily.
	Full,
	/// An explicit, ordered list of values.
	Values(Vec<u64>),
	/// A `lo:hi` range with optionally-open ends.
	Range { lo: Option<u64>, hi: Option<u64> },
}

impl AxisSelector {
	pub fn resolve(&self, cardinality: u64) -> ResolvedAxis {
		match self {
			AxisSelector::Full => ResolvedAxis::Range(0, cardinality),
			AxisSelector::Values(values) => ResolvedAxis::Values(values.clone()),
			AxisSelector::Range { lo, hi } => {
				let lo = lo.unwrap_or(0);
				let hi = hi.unwrap_or(cardinality).min(cardinality);
				ResolvedAxis::Range(lo, lo.min(hi))
			},
		}
	}
}

/// One compiled clause: a selector for each of the four axes, plus the
/// order they were written in. Composition nests outside-in in that order,
/// with the axis written last advancing fastest -- `order` is what lets
/// [`ClauseIter`] and [`crate::aggregator::Aggregator::plan`] honor that
/// instead of a fixed record/zoom/tile/band nesting.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
	pub record: AxisSelector,
	pub zoom: AxisSelector,
	pub tile: AxisSelector,
	pub band: AxisSelector,
	pub order: [Axis; 4],
}

/// Axis sizes to resolve a [`Clause`] against.
#[derive(Debug, Copy, Clone)]
pub struct Cardinalities {
	pub records: u64,
	pub zooms: u64,
	pub tiles: u64,
	pub bands: u64,
}

impl Clause {
	pub fn resolve(&self, c: Cardinalities) -> ClauseIter {
		ClauseIter::new(
			self.order,
			self.record.resolve(c.records),
			self.zoom.resolve(c.zooms),
			self.tile.resolve(c.tiles),
			self.band.resolve(c.bands),
		)
	}
}

/// A fully-compiled interlacing pattern: a sequence of clauses, walked in
/// order, each replayed to exhaustion before the next begins.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
	pub clauses: Vec<Clause>,
}

impl Pattern {
	pub fn parse(pattern: &str) -> Result<Pattern, PatternError> {
		let mut clauses = Vec::new();
		for clause_str in pattern.split(';') {
			let clause_str = clause_str.trim();
			if clause_str.is_empty() {
				continue;
			}
			clauses.push(parse_clause(clause_str)?);
		}
		Ok(Pattern { clauses })
	}
}

const AXES: [&str; 4] = ["R", "Z", "T", "B"];

fn parse_clause(clause: &str) -> Result<Clause, PatternError> {
	let specs: Vec<&str> = clause.split('>').map(str::trim).collect();
	if specs.len() != 4 {
		return Err(PatternError::BadArity {
			clause: clause.to_string(),
			got: specs.len(),
		});
	}

	let mut parsed: Vec<(&str, Option<&str>)> = Vec::with_capacity(4);
	for spec in &specs {
		let (key, sel) = match spec.split_once('=') {
			Some((k, v)) => (k.trim(), Some(v.trim())),
			None => (*spec, None),
		};
		if !AXES.contains(&key) {
			return Err(PatternError::UnknownKey {
				clause: clause.to_string(),
				key: key.to_string(),
			});
		}
		parsed.push((key, sel));
	}

	for (i, (key, _)) in parsed.iter().enumerate() {
		if parsed[..i].iter().any(|(k, _)| k == key) {
			return Err(PatternError::DuplicateAxis {
				clause: clause.to_string(),
				axis: AXES[AXES.iter().position(|a| a == key).unwrap()],
			});
		}
	}

	let t_pos = parsed.iter().position(|(k, _)| *k == "T");
	let z_pos = parsed.iter().position(|(k, _)| *k == "Z");
	let r_pos = parsed.iter().position(|(k, _)| *k == "R");
	if let (Some(t), Some(z)) = (t_pos, z_pos) {
		if t < z {
			return Err(PatternError::TileBeforeZoom { clause: clause.to_string() });
		}
	}
	// A tile index is only resolved against its own record's directory at
	// the chosen zoom level, so record must also be known before tile.
	if let (Some(t), Some(r)) = (t_pos, r_pos) {
		if t < r {
			return Err(PatternError::TileBeforeRecord { clause: clause.to_string() });
		}
	}

	let mut order = [Axis::Record; 4];
	let mut record = None;
	let mut zoom = None;
	let mut tile = None;
	let mut band = None;
	for (i, (key, sel)) in parsed.into_iter().enumerate() {
		let axis = match sel {
			None => AxisSelector::Full,
			Some(v) => parse_sel(clause, v)?,
		};
		match key {
			"R" => {
				order[i] = Axis::Record;
				record = Some(axis);
			},
			"Z" => {
				order[i] = Axis::Zoom;
				zoom = Some(axis);
			},
			"T" => {
				order[i] = Axis::Tile;
				tile = Some(axis);
			},
			"B" => {
				order[i] = Axis::Band;
				band = Some(axis);
			},
			_ => unreachable!("validated above"),
		}
	}

	Ok(Clause {
		record: record.unwrap(),
		zoom: zoom.unwrap(),
		tile: tile.unwrap(),
		band: band.unwrap(),
		order,
	})
}

fn parse_sel(clause: &str, sel: &str) -> Result<AxisSelector, PatternError> {
	let parse_int = |value: &str| -> Result<u64, PatternError> {
		value.parse::<u64>().map_err(|_| PatternError::BadInteger {
			clause: clause.to_string(),
			value: value.to_string(),
		})
	};

	if sel.contains(',') {
		let values = sel.split(',').map(|v| parse_int(v.trim())).collect::<Result<Vec<_>, _>>()?;
		return Ok(AxisSelector::Values(values));
	}

	if let Some((lo, hi)) = sel.split_once(':') {
		let lo = if lo.is_empty() { None } else { Some(parse_int(lo)?) };
		let hi = if hi.is_empty() { None } else { Some(parse_int(hi)?) };
		return Ok(AxisSelector::Range { lo, hi });
	}

	Ok(AxisSelector::Values(vec![parse_int(sel)?]))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn cards() -> Cardinalities {
		Cardinalities {
			records: 1,
			zooms: 1,
			tiles: 1,
			bands: 10,
		}
	}

	#[test]
	fn bad_arity() {
		let err = Pattern::parse("R>B>T").unwrap_err();
		assert!(matches!(err, PatternError::BadArity { got: 3, .. }));
	}

	#[test]
	fn unknown_key() {
		let err = Pattern::parse("R>B>T>K").unwrap_err();
		assert!(matches!(err, PatternError::UnknownKey { .. }));
	}

	#[test]
	fn duplicate_axis() {
		let err = Pattern::parse("R>B>R>Z").unwrap_err();
		assert!(matches!(err, PatternError::DuplicateAxis { axis: "R", .. }));
	}

	#[test]
	fn tile_before_zoom() {
		let err = Pattern::parse("R>B>T>Z").unwrap_err();
		assert!(matches!(err, PatternError::TileBeforeZoom { .. }));
	}

	#[test]
	fn zoom_before_tile_is_ok() {
		let pattern = Pattern::parse("R>B>Z>T").unwrap();
		assert_eq!(pattern.clauses.len(), 1);
	}

	#[test]
	fn tile_before_record() {
		let err = Pattern::parse("T>R>Z>B").unwrap_err();
		assert!(matches!(err, PatternError::TileBeforeRecord { .. }));
	}

	#[test]
	fn clause_retains_its_written_axis_order() {
		let pattern = Pattern::parse("Z>R>B>T").unwrap();
		assert_eq!(pattern.clauses[0].order, [Axis::Zoom, Axis::Record, Axis::Band, Axis::Tile]);
	}

	#[test]
	fn bare_band_value_is_a_single_value_list() {
		let pattern = Pattern::parse("R>B=2>Z>T").unwrap();
		let band = pattern.clauses[0].band.resolve(cards().bands);
		assert_eq!(band, ResolvedAxis::Values(vec![2]));
	}

	#[test]
	fn open_upper_range_defaults_to_cardinality() {
		let pattern = Pattern::parse("R>B=2:>Z>T").unwrap();
		let band = pattern.clauses[0].band.resolve(cards().bands);
		assert_eq!(band, ResolvedAxis::Range(2, 10));
	}

	#[test]
	fn open_lower_range_defaults_to_zero() {
		let pattern = Pattern::parse("R>B=:2>Z>T").unwrap();
		let band = pattern.clauses[0].band.resolve(cards().bands);
		assert_eq!(band, ResolvedAxis::Range(0, 2));
	}

	#[test]
	fn range_upper_bound_is_clamped_to_cardinality() {
		let pattern = Pattern::parse("R>B=3:11>Z>T").unwrap();
		let band = pattern.clauses[0].band.resolve(cards().bands);
		assert_eq!(band, ResolvedAxis::Range(3, 10));
	}

	#[test]
	fn multiple_clauses_are_separated_by_semicolons() {
		let pattern = Pattern::parse("R>Z>T>B; R>Z=0>T>B=0,1").unwrap();
		assert_eq!(pattern.clauses.len(), 2);
	}
}
