//! The byte-source boundary a directory's tile payloads are copied from.
//!
//! The aggregator never owns source files: it only holds a [`Weak`] handle,
//! so callers remain responsible for keeping each source readable for as
//! long as they want it available, through the end of [`crate::Aggregator::write`].
//!
//! [`Weak`]: std::sync::Weak

use std::{
	fs::File,
	io::{self, Read, Seek, SeekFrom},
	sync::Mutex,
};

/// Random-access byte source for verbatim tile payload copying.
///
/// Implementations must be safe to call from multiple directories
/// concurrently trading off against the same underlying resource; the
/// provided [`FileSource`] serializes access with a mutex, matching a plain
/// `pread`-style file handle.
pub trait TileSource: Send + Sync {
	/// Reads exactly `buf.len()` bytes starting at `offset`.
	fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;
}

/// A [`TileSource`] backed by a single open file, read with seek-then-read.
pub struct FileSource(Mutex<File>);

impl FileSource {
	pub fn new(file: File) -> Self {
		FileSource(Mutex::new(file))
	}

	pub fn open(path: impl AsRef<std::path::Path>) -> io::Result<Self> {
		Ok(FileSource::new(File::open(path)?))
	}
}

impl TileSource for FileSource {
	fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
		let mut file = self.0.lock().unwrap_or_else(|e| e.into_inner());
		file.seek(SeekFrom::Start(offset))?;
		file.read_exact(buf)
	}
}

/// A [`TileSource`] backed by an in-memory buffer, useful for tests and for
/// small directories already held in RAM.
pub struct MemorySource(Vec<u8>);

impl MemorySource {
	pub fn new(bytes: Vec<u8>) -> Self {
		MemorySource(bytes)
	}
}

impl TileSource for MemorySource {
	fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
		let start = offset as usize;
		let end = start + buf.len();
		if end > self.0.len() {
			return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "read past end of in-memory source"));
		}
		buf.copy_from_slice(&self.0[start..end]);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn memory_source_reads_the_requested_slice() {
		let src = MemorySource::new(vec![1, 2, 3, 4, 5, 6]);
		let mut buf = [0u8; 3];
		src.read_at(2, &mut buf).unwrap();
		assert_eq!(buf, [3, 4, 5]);
	}

	#[test]
	fn memory_source_rejects_out_of_range_reads() {
		let src = MemorySource::new(vec![1, 2, 3]);
		let mut buf = [0u8; 4];
		assert!(src.read_at(0, &mut buf).is_err());
	}
}
