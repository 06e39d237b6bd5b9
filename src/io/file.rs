//! Input/Output file handling with [`InputFile`] and [`OutputFile`].
//!
//! Input may be plaintext or gzip-compressed; output is always plaintext.

use flate2::read::GzDecoder;
use indexmap::IndexMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};

use crate::error::MethBinsError;
use crate::Position;

/// Read a tab-delimited *genome file* of sequence (i.e. chromosome) names and their lengths.
///
/// Extra columns after the length are ignored, as are lines starting with `#`.
pub fn read_seqlens(
    filepath: impl Into<PathBuf>,
) -> Result<IndexMap<String, Position>, MethBinsError> {
    let input_file = InputFile::new(filepath);
    let reader = input_file.reader()?;

    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut seqlens = IndexMap::new();
    for result in csv_reader.records() {
        let record = result?;
        if record.len() < 2 {
            return Err(MethBinsError::InvalidGenomeFile(format!(
                "expected at least two columns, got: {:?}",
                record
            )));
        }
        let seqname = record[0].to_string();
        let length: Position = record[1].trim().parse()?;
        if seqlens.contains_key(&seqname) {
            return Err(MethBinsError::InvalidGenomeFile(format!(
                "sequence '{}' is duplicated",
                seqname
            )));
        }
        seqlens.insert(seqname, length);
    }
    Ok(seqlens)
}

/// Check if a file is a gzipped by looking for the magic numbers
fn is_gzipped_file(file_path: &Path) -> io::Result<bool> {
    let mut file = File::open(file_path)?;
    let mut buffer = [0; 2];
    match file.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer == [0x1f, 0x8b]),
        // too short to be gzip (e.g. an empty genome file)
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Represents an input file.
///
/// This abstracts how data is read in, allowing for both plaintext and gzip-compressed input
/// to be read through a common interface.
#[derive(Clone, Debug)]
pub struct InputFile {
    pub filepath: PathBuf,
}

impl InputFile {
    /// Constructs a new `InputFile`.
    pub fn new(filepath: impl Into<PathBuf>) -> Self {
        Self {
            filepath: filepath.into(),
        }
    }

    /// Opens the file and returns a buffered reader, decompressing gzip input
    /// (detected by magic number, not extension).
    pub fn reader(&self) -> io::Result<BufReader<Box<dyn Read>>> {
        let file = File::open(&self.filepath)?;
        let reader: Box<dyn Read> = if is_gzipped_file(&self.filepath)? {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        Ok(BufReader::new(reader))
    }
}

/// Represents a plaintext output file.
pub struct OutputFile {
    filepath: PathBuf,
}

impl OutputFile {
    /// Constructs a new `OutputFile`.
    pub fn new(filepath: impl Into<PathBuf>) -> Self {
        Self {
            filepath: filepath.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.filepath
    }

    /// Create (truncating) the file and return a buffered writer.
    pub fn writer(&self) -> io::Result<BufWriter<File>> {
        Ok(BufWriter::new(File::create(&self.filepath)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_read_seqlens() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# a comment").unwrap();
        writeln!(file, "chr1\t250").unwrap();
        writeln!(file, "chr2\t1000\textra").unwrap();
        writeln!(file, "chrUn_random\t42").unwrap();
        file.flush().unwrap();

        let seqlens = read_seqlens(file.path()).unwrap();
        assert_eq!(seqlens.len(), 3);
        assert_eq!(seqlens.get_index(0), Some((&"chr1".to_string(), &250)));
        assert_eq!(seqlens["chr2"], 1000);
        assert_eq!(seqlens["chrUn_random"], 42);
    }

    #[test]
    fn test_read_seqlens_gzipped() {
        let file = tempfile::NamedTempFile::new().unwrap();
        {
            let mut encoder = GzEncoder::new(File::create(file.path()).unwrap(), Compression::default());
            writeln!(encoder, "chrX\t77").unwrap();
            encoder.finish().unwrap();
        }
        let seqlens = read_seqlens(file.path()).unwrap();
        assert_eq!(seqlens["chrX"], 77);
    }

    #[test]
    fn test_read_seqlens_duplicate() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "chr1\t250").unwrap();
        writeln!(file, "chr1\t300").unwrap();
        file.flush().unwrap();

        let result = read_seqlens(file.path());
        assert!(matches!(result, Err(MethBinsError::InvalidGenomeFile(_))));
    }

    #[test]
    fn test_read_seqlens_bad_length() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "chr1\tlots").unwrap();
        file.flush().unwrap();

        let result = read_seqlens(file.path());
        assert!(matches!(result, Err(MethBinsError::ParseIntError(_))));
    }

    #[test]
    fn test_output_file_truncates_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputFile::new(dir.path().join("matrices.txt.gz"));
        std::fs::write(output.path(), "stale contents\n").unwrap();
        {
            let mut writer = output.writer().unwrap();
            writeln!(writer, "chr1_100\t1\t0").unwrap();
            writer.flush().unwrap();
        }
        assert!(!is_gzipped_file(output.path()).unwrap());
        let contents = std::fs::read_to_string(output.path()).unwrap();
        assert_eq!(contents, "chr1_100\t1\t0\n");
    }
}
