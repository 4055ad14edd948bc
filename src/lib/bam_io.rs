//! BAM file I/O helpers.
//!
//! Reading may decompress BGZF blocks on worker threads (`threads > 1`). Writing is always
//! single-threaded; the consensus output is small next to its input.

use std::fs::File;
use std::io::{self, BufRead, Read};
use std::num::NonZero;
use std::path::Path;

use anyhow::{Context, Result};
use noodles::bgzf::{MultithreadedReader, Reader as BgzfReader, Writer as BgzfWriter};
use noodles::sam::Header;

/// A single- or multi-threaded BGZF reader.
pub enum BgzfReaderEnum {
    SingleThreaded(BgzfReader<File>),
    MultiThreaded(MultithreadedReader<File>),
}

impl Read for BgzfReaderEnum {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            BgzfReaderEnum::SingleThreaded(r) => r.read(buf),
            BgzfReaderEnum::MultiThreaded(r) => r.read(buf),
        }
    }
}

impl BufRead for BgzfReaderEnum {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            BgzfReaderEnum::SingleThreaded(r) => r.fill_buf(),
            BgzfReaderEnum::MultiThreaded(r) => r.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            BgzfReaderEnum::SingleThreaded(r) => r.consume(amt),
            BgzfReaderEnum::MultiThreaded(r) => r.consume(amt),
        }
    }
}

/// BAM reader over either BGZF reader.
pub type BamReader = noodles::bam::io::Reader<BgzfReaderEnum>;

/// BAM writer over a single-threaded BGZF writer.
pub type BamWriter = noodles::bam::io::Writer<BgzfWriter<File>>;

/// Opens a BAM and reads its header.
///
/// # Errors
/// Returns an error if the file cannot be opened or its header cannot be read.
pub fn create_bam_reader<P: AsRef<Path>>(path: P, threads: usize) -> Result<(BamReader, Header)> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref)
        .with_context(|| format!("Failed to open input BAM: {}", path_ref.display()))?;

    let bgzf_reader = match NonZero::new(threads).filter(|n| n.get() > 1) {
        Some(worker_count) => {
            BgzfReaderEnum::MultiThreaded(MultithreadedReader::with_worker_count(worker_count, file))
        }
        None => BgzfReaderEnum::SingleThreaded(BgzfReader::new(file)),
    };

    let mut reader = noodles::bam::io::Reader::from(bgzf_reader);
    let header = reader
        .read_header()
        .with_context(|| format!("Failed to read header from: {}", path_ref.display()))?;

    Ok((reader, header))
}

/// Creates a BAM and writes `header` to it.
///
/// # Errors
/// Returns an error if the file cannot be created or the header cannot be written.
pub fn create_bam_writer<P: AsRef<Path>>(path: P, header: &Header) -> Result<BamWriter> {
    let path_ref = path.as_ref();
    let output_file = File::create(path_ref)
        .with_context(|| format!("Failed to create output BAM: {}", path_ref.display()))?;

    let mut writer = noodles::bam::io::Writer::from(BgzfWriter::new(output_file));
    writer
        .write_header(header)
        .with_context(|| format!("Failed to write header to: {}", path_ref.display()))?;
    Ok(writer)
}
