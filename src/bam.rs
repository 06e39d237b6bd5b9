//! A [`ReadSource`] over an indexed, coordinate-sorted BAM file.
//!
//! Methylation calls are taken from the Bismark `XM` tag: `Z` is a methylated
//! CpG, `z` an unmethylated one, and every other character (CHG/CHH contexts,
//! `.`) is ignored. Calls are placed on the reference by walking the CIGAR;
//! calls inside insertions and soft clips have no reference position and are
//! dropped. Reverse-strand calls can still land one base off the CpG, which
//! [`ReadSource::correct_positions()`] repairs.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::debug;
use noodles::bam;
use noodles::bgzf;
use noodles::core::Region;
use noodles::sam;
use noodles::sam::alignment::record::cigar::{op::Kind, Op};
use noodles::sam::alignment::record::data::field::{Tag, Value};

use crate::error::MethBinsError;
use crate::matrix::Call;
use crate::reads::{MethylationRead, ReadBatch, ReadSource, ReadSourceOpener};
use crate::Position;

/// Bismark methylation call string.
const METHYLATION_CALL_TAG: Tag = Tag::new(b'X', b'M');

fn xm_call(symbol: u8) -> Option<Call> {
    match symbol {
        b'Z' => Some(Call::One),
        b'z' => Some(Call::Zero),
        _ => None,
    }
}

/// Turn an `XM` call string into CpG calls on the reference.
///
/// `cigar` maps read offsets to reference positions starting at
/// `alignment_start`: match operations advance both, insertions and soft clips
/// only the read, deletions and skips only the reference. An empty CIGAR is
/// read as a gapless alignment of the whole call string.
pub fn parse_xm_calls(alignment_start: Position, cigar: &[Op], xm: &[u8]) -> Vec<(Position, Call)> {
    let gapless = [Op::new(Kind::Match, xm.len())];
    let ops = if cigar.is_empty() { &gapless[..] } else { cigar };

    let mut calls = Vec::new();
    let mut read_offset = 0;
    let mut reference = u64::from(alignment_start);
    for op in ops {
        let len = op.len();
        match op.kind() {
            Kind::Match | Kind::SequenceMatch | Kind::SequenceMismatch => {
                let symbols = xm.iter().skip(read_offset).take(len);
                for (step, symbol) in (0u64..).zip(symbols) {
                    let position = Position::try_from(reference + step).ok();
                    if let (Some(position), Some(call)) = (position, xm_call(*symbol)) {
                        calls.push((position, call));
                    }
                }
                read_offset += len;
                reference += len as u64;
            }
            Kind::Insertion | Kind::SoftClip => read_offset += len,
            Kind::Deletion | Kind::Skip => reference += len as u64,
            Kind::HardClip | Kind::Pad => {}
        }
    }
    calls
}

pub struct BamReadSource {
    reader: bam::io::IndexedReader<bgzf::Reader<File>>,
    header: sam::Header,
}

impl BamReadSource {
    /// Open a BAM file and its `.bai` index.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MethBinsError> {
        let path = path.as_ref();
        let mut reader = bam::io::indexed_reader::Builder::default()
            .build_from_path(path)
            .map_err(|e| {
                MethBinsError::Bam(format!(
                    "could not open indexed BAM '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        let header = reader.read_header().map_err(|e| {
            MethBinsError::Bam(format!(
                "could not read header of '{}': {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self { reader, header })
    }
}

fn invalid_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

fn core_position(position: Position) -> io::Result<noodles::core::Position> {
    noodles::core::Position::new(position as usize)
        .ok_or_else(|| invalid_data(format!("invalid 1-based position {}", position)))
}

fn to_methylation_read(record: &bam::Record) -> io::Result<Option<MethylationRead>> {
    let flags = record.flags();
    if flags.is_unmapped() || flags.is_secondary() || flags.is_supplementary() {
        return Ok(None);
    }
    let alignment_start = match record.alignment_start().transpose()? {
        Some(position) => Position::try_from(usize::from(position))
            .map_err(|_| invalid_data("alignment start overflows position type".to_string()))?,
        None => return Ok(None),
    };
    let data = record.data();
    let xm = match data.get(&METHYLATION_CALL_TAG).transpose()? {
        Some(Value::String(calls)) => calls,
        Some(_) => return Err(invalid_data("XM tag is not a string".to_string())),
        // not a bisulfite alignment, or no calls
        None => return Ok(None),
    };
    let cigar = record.cigar().iter().collect::<io::Result<Vec<Op>>>()?;
    let name = record
        .name()
        .map(|name| name.to_string())
        .unwrap_or_default();
    Ok(Some(MethylationRead::new(
        name,
        parse_xm_calls(alignment_start, &cigar, xm),
    )))
}

impl ReadSource for BamReadSource {
    fn sequence_catalog(&mut self) -> Result<IndexMap<String, Position>, MethBinsError> {
        let mut seqlens = IndexMap::new();
        for (name, reference_sequence) in self.header.reference_sequences() {
            let length = Position::try_from(usize::from(reference_sequence.length())).map_err(|_| {
                MethBinsError::Bam(format!("length of '{}' overflows position type", name))
            })?;
            seqlens.insert(name.to_string(), length);
        }
        Ok(seqlens)
    }

    fn fetch_reads(&mut self, seqname: &str, start: Position, end: Position) -> io::Result<ReadBatch> {
        let region = Region::new(seqname, core_position(start)?..=core_position(end)?);
        let query = self.reader.query(&self.header, &region)?;

        let mut reads = Vec::new();
        for result in query {
            let record = result?;
            if let Some(read) = to_methylation_read(&record)? {
                reads.push(read);
            }
        }
        debug!("{}: fetched {} reads", region, reads.len());
        Ok(ReadBatch::new(seqname, start, end, reads))
    }
}

/// Opens one [`BamReadSource`] per worker.
#[derive(Clone, Debug)]
pub struct BamOpener {
    pub path: PathBuf,
}

impl BamOpener {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReadSourceOpener for BamOpener {
    type Source = BamReadSource;

    fn open(&self) -> Result<Self::Source, MethBinsError> {
        BamReadSource::open(&self.path)
    }
}
