//! `cogstitch`: interlaces tile payloads from several tagged-image source
//! files into one multi-record container, according to a pattern over the
//! record/zoom/tile/band axes.

#[cfg(feature = "tiff-intake")]
mod intake;

use std::{fs::File, path::PathBuf, process::ExitCode};

use clap::{Parser, ValueEnum};
use cogstitch::{Aggregator, Pattern};
use thiserror::Error;

/// 4 GiB minus a little headroom: past this, classic 32-bit offsets risk
/// overflow, so `auto` switches to BigTIFF.
const BIGTIFF_AUTO_THRESHOLD: u64 = (1u64 << 32) - (1 << 24);

#[derive(Debug, Copy, Clone, ValueEnum)]
enum BigtiffMode {
	Yes,
	No,
	Auto,
}

impl std::fmt::Display for BigtiffMode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			BigtiffMode::Yes => write!(f, "yes"),
			BigtiffMode::No => write!(f, "no"),
			BigtiffMode::Auto => write!(f, "auto"),
		}
	}
}

/// Interlace tiles from several tagged-image inputs into one container.
#[derive(Debug, Parser)]
#[command(name = "cogstitch", version)]
struct Cli {
	/// Where to write the container.
	#[arg(short = 'o', long, default_value = "out.tif")]
	output: PathBuf,

	/// Whether to use 64-bit (BigTIFF) offsets.
	#[arg(long, value_enum, default_value_t = BigtiffMode::Auto)]
	bigtiff: BigtiffMode,

	/// The interlacing pattern. Defaults to zoom-major, then record, band, tile.
	#[arg(long)]
	pattern: Option<String>,

	/// Input tagged-image files, one per record.
	#[arg(required = true)]
	inputs: Vec<PathBuf>,
}

#[derive(Debug, Error)]
enum CliError {
	#[error(transparent)]
	Cog(#[from] cogstitch::CogError),

	#[error(transparent)]
	Pattern(#[from] cogstitch::PatternError),

	#[error(transparent)]
	Geometry(#[from] cogstitch::GeometryError),

	#[error("failed to open output {path}: {source}")]
	OutputOpen { path: String, source: std::io::Error },

	#[cfg(feature = "tiff-intake")]
	#[error(transparent)]
	Intake(#[from] intake::IntakeError),

	#[cfg(not(feature = "tiff-intake"))]
	#[error("this build has no directory intake adapter compiled in; rebuild with the tiff-intake feature")]
	NoIntake,
}

fn main() -> ExitCode {
	tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

	match run(Cli::parse()) {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			tracing::error!(%err, "cogstitch failed");
			eprintln!("cogstitch: {err}");
			ExitCode::FAILURE
		},
	}
}

fn run(cli: Cli) -> Result<(), CliError> {
	tracy::zone!("Stitch container");

	let mut agg = Aggregator::new();
	let mut max_bands = 1u64;
	let mut estimated_size = 0u64;
	// The aggregator only holds a Weak handle to each file; these Arcs are
	// what keep the files open through the write() call below.
	let mut open_sources = Vec::with_capacity(cli.inputs.len());

	for path in &cli.inputs {
		let (primary, overviews, source) = load_directory(path)?;
		max_bands = max_bands.max(primary.samples_per_pixel as u64);
		estimated_size += primary.tiles.original_byte_counts.iter().map(|&b| b as u64).sum::<u64>();
		for ovr in &overviews {
			estimated_size += ovr.tiles.original_byte_counts.iter().map(|&b| b as u64).sum::<u64>();
		}

		let record = agg.append_directory(primary);
		for ovr in overviews {
			agg.attach_overview(record, ovr);
		}
		open_sources.push(source);
		tracing::info!(path = %path.display(), record, "appended record");
	}

	agg.finalize()?;

	let bigtiff = match cli.bigtiff {
		BigtiffMode::Yes => true,
		BigtiffMode::No => false,
		BigtiffMode::Auto => estimated_size > BIGTIFF_AUTO_THRESHOLD,
	};
	for record in agg.records_mut() {
		record.init_new_offsets(bigtiff);
		for child in &mut record.children {
			child.init_new_offsets(bigtiff);
		}
	}

	let pattern_str = cli.pattern.as_deref().unwrap_or("Z>R>B>T");
	let pattern = Pattern::parse(pattern_str)?;

	let output = File::create(&cli.output).map_err(|source| CliError::OutputOpen {
		path: cli.output.display().to_string(),
		source,
	})?;
	cogstitch::writer::write(&mut agg, &pattern, max_bands, bigtiff, output)?;

	tracing::info!(output = %cli.output.display(), bigtiff, "wrote container");
	Ok(())
}

type LoadedDirectories = (cogstitch::Directory, Vec<cogstitch::Directory>, std::sync::Arc<cogstitch::FileSource>);

#[cfg(feature = "tiff-intake")]
fn load_directory(path: &PathBuf) -> Result<LoadedDirectories, CliError> {
	let loaded = intake::load(path)?;
	Ok((loaded.primary, loaded.overviews, loaded.source))
}

#[cfg(not(feature = "tiff-intake"))]
fn load_directory(_path: &PathBuf) -> Result<LoadedDirectories, CliError> {
	Err(CliError::NoIntake)
}
