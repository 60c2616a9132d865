// FASTA reader module using bio::io::fasta
//
// Wraps bio::io::fasta with:
// - Automatic gzip/bgzip detection by file extension and magic bytes
// - Parallel BGZIP decompression for .gz files (if BGZIP format detected)

use bio::io::fasta;
use flate2::read::GzDecoder;
use noodles_bgzf as bgzf;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

const BUFFER_SIZE: usize = 4 * 1024 * 1024; // 4MB buffer

/// FASTA reader with automatic gzip/bgzip detection
pub struct FastaReader {
    records: fasta::Records<BufReader<Box<dyn Read>>>,
}

/// Detect if a gzipped file is BGZIP format by checking for BGZIP-specific header
fn is_bgzip_format(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut header = [0u8; 18]; // BGZIP header is at least 18 bytes

    let mut filled = 0;
    while filled < header.len() {
        match file.read(&mut header[filled..])? {
            0 => return Ok(false), // Not enough bytes for BGZIP header
            n => filled += n,
        }
    }

    // gzip magic, FEXTRA flag, then the 'BC' subfield at the start of the extra field
    Ok(header[0] == 0x1f
        && header[1] == 0x8b
        && header[3] & 0x04 != 0
        && header[12] == b'B'
        && header[13] == b'C')
}

impl FastaReader {
    /// Open a FASTA file (.fa, .fasta, .fa.gz, .fasta.gz).
    ///
    /// BGZIP input is decompressed on multiple threads; plain gzip falls back
    /// to a single-threaded decoder.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let is_gz = path.extension().is_some_and(|ext| ext == "gz");

        let reader: Box<dyn Read> = if is_gz {
            if is_bgzip_format(path)? {
                log::debug!("Detected BGZIP format, using parallel decompression for FASTA");
                Box::new(bgzf::MultithreadedReader::new(file))
            } else {
                log::debug!("Detected standard gzip format, using single-threaded decompression for FASTA");
                Box::new(GzDecoder::new(file))
            }
        } else {
            Box::new(file)
        };

        let fasta_reader = fasta::Reader::from_bufread(BufReader::with_capacity(BUFFER_SIZE, reader));

        Ok(Self {
            records: fasta_reader.records(),
        })
    }

    /// Read the next FASTA record
    ///
    /// Returns `Ok(Some(record))` if a record is found, `Ok(None)` at EOF,
    /// and `Err(e)` on a parse error.
    pub fn read_record(&mut self) -> io::Result<Option<fasta::Record>> {
        match self.records.next() {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => Err(io::Error::new(io::ErrorKind::InvalidData, e)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    const TWO_RECORDS: &str = ">chr1 first contig\nACGTACGT\nACGT\n>chr2\nTTTT\n";

    fn collect_ids(reader: &mut FastaReader) -> Vec<(String, Vec<u8>)> {
        let mut out = Vec::new();
        while let Some(record) = reader.read_record().unwrap() {
            out.push((record.id().to_string(), record.seq().to_vec()));
        }
        out
    }

    #[test]
    fn test_reads_plain_fasta() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref.fa");
        std::fs::write(&path, TWO_RECORDS).unwrap();

        let mut reader = FastaReader::new(&path).unwrap();
        let records = collect_ids(&mut reader);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, "chr1");
        assert_eq!(records[0].1, b"ACGTACGTACGT");
        assert_eq!(records[1], ("chr2".to_string(), b"TTTT".to_vec()));
    }

    #[test]
    fn test_reads_gzipped_fasta() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref.fa.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(TWO_RECORDS.as_bytes()).unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();

        assert!(!is_bgzip_format(&path).unwrap());
        let mut reader = FastaReader::new(&path).unwrap();
        assert_eq!(collect_ids(&mut reader).len(), 2);
    }

    #[test]
    fn test_short_file_is_not_bgzip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.gz");
        std::fs::write(&path, [0x1f, 0x8b]).unwrap();
        assert!(!is_bgzip_format(&path).unwrap());
    }
}
