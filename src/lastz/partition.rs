// src/lastz/partition.rs
//
// Splits a reference into one LASTZ job per sequence.
//
// FASTA references: each record is copied to its own `.in` temp file and the
// job writes (`>`) a `.out` temp file. Both are owned by the work item.
//
// 2bit references: LASTZ can address a single chromosome inside the archive
// (`ref.2bit/chrom`), so only a `.out` temp file is created and the job
// appends (`>>`) to it.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use bio::io::fasta;
use tempfile::NamedTempFile;

use crate::defaults;
use crate::error::PipelineError;
use crate::io::fasta_reader::FastaReader;
use crate::io::twobit;
use crate::lastz::opt::{LastzOpt, RefSource};
use crate::pipeline::WorkItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    Truncate,
    Append,
}

impl Redirect {
    fn operator(self) -> &'static str {
        match self {
            Redirect::Truncate => ">",
            Redirect::Append => ">>",
        }
    }
}

/// Quote `s` for `sh` unless it only contains characters the shell leaves alone.
pub fn shell_quote(s: &str) -> Cow<'_, str> {
    let safe = !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"_-./:=,+@%".contains(&b));
    if safe {
        Cow::Borrowed(s)
    } else {
        Cow::Owned(format!("'{}'", s.replace('\'', r"'\''")))
    }
}

/// The parts of a LASTZ command line shared by every job of a run.
#[derive(Debug, Clone)]
pub struct CommandTemplate {
    binary: String,
    target_modifier: String,
    query: String,
    arguments: String,
}

impl CommandTemplate {
    pub fn new(binary: &str, opt: &LastzOpt, query: &str) -> Self {
        let arguments = opt
            .arguments()
            .iter()
            .map(|a| shell_quote(a).into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            binary: binary.to_string(),
            target_modifier: opt.target_modifier(),
            query: opt.query_spec(query),
            arguments,
        }
    }

    /// `<lastz> <target><modifier> <query> <args> > <output>`
    pub fn render(&self, target: &str, output: &Path, redirect: Redirect) -> String {
        let target = format!("{}{}", target, self.target_modifier);
        let output = output.to_string_lossy();
        format!(
            "{} {} {} {} {} {}",
            shell_quote(&self.binary),
            shell_quote(&target),
            shell_quote(&self.query),
            self.arguments,
            redirect.operator(),
            shell_quote(&output)
        )
    }
}

/// Create a temp file that survives being dropped; the work item owns it.
fn persistent_temp(dir: &Path, suffix: &str) -> Result<NamedTempFile, PipelineError> {
    tempfile::Builder::new()
        .prefix(defaults::TEMP_PREFIX)
        .suffix(suffix)
        .tempfile_in(dir)
        .map_err(|e| PipelineError::io(format!("creating temp file in {}", dir.display()), e))
}

fn keep(file: NamedTempFile) -> Result<PathBuf, PipelineError> {
    file.into_temp_path()
        .keep()
        .map_err(|e| PipelineError::io("keeping temp file", e.error))
}

/// One work item per FASTA record.
pub struct FastaPartitioner {
    reader: FastaReader,
    template: CommandTemplate,
    tmp_dir: PathBuf,
    failed: bool,
}

impl FastaPartitioner {
    pub fn new(
        reference: &Path,
        template: CommandTemplate,
        tmp_dir: &Path,
    ) -> Result<Self, PipelineError> {
        let reader = FastaReader::new(reference)
            .map_err(|e| PipelineError::io(format!("opening {}", reference.display()), e))?;
        Ok(Self {
            reader,
            template,
            tmp_dir: tmp_dir.to_path_buf(),
            failed: false,
        })
    }

    fn split(&self, record: &fasta::Record) -> Result<WorkItem, PipelineError> {
        let mut input = persistent_temp(&self.tmp_dir, ".in")?;
        {
            let mut writer = fasta::Writer::new(&mut input);
            writer
                .write_record(record)
                .and_then(|_| writer.flush())
                .map_err(|e| PipelineError::io(format!("writing record {}", record.id()), e))?;
        }
        let input = keep(input)?;

        let output = match persistent_temp(&self.tmp_dir, ".out") {
            Ok(file) => file,
            Err(e) => {
                let _ = std::fs::remove_file(&input);
                return Err(e);
            }
        };
        let output = keep(output)?;

        let command = self
            .template
            .render(&input.to_string_lossy(), &output, Redirect::Truncate);
        Ok(WorkItem::new(command, &output).with_cleanup([input, output.clone()]))
    }
}

impl Iterator for FastaPartitioner {
    type Item = Result<WorkItem, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = match self.reader.read_record() {
            Ok(Some(record)) => self.split(&record),
            Ok(None) => return None,
            Err(e) => Err(PipelineError::io("reading reference FASTA", e)),
        };
        self.failed = item.is_err();
        Some(item)
    }
}

/// One work item per chromosome of a 2bit archive.
pub struct TwoBitPartitioner {
    archive: PathBuf,
    names: std::vec::IntoIter<String>,
    template: CommandTemplate,
    tmp_dir: PathBuf,
    failed: bool,
}

impl TwoBitPartitioner {
    pub fn new(
        archive: &Path,
        template: CommandTemplate,
        tmp_dir: &Path,
    ) -> Result<Self, PipelineError> {
        let names = twobit::sequence_names(archive)
            .map_err(|e| PipelineError::io(format!("reading 2bit index of {}", archive.display()), e))?;
        log::debug!("{} lists {} sequence(s)", archive.display(), names.len());
        Ok(Self {
            archive: archive.to_path_buf(),
            names: names.into_iter(),
            template,
            tmp_dir: tmp_dir.to_path_buf(),
            failed: false,
        })
    }

    pub fn remaining(&self) -> usize {
        self.names.len()
    }

    fn split(&self, chrom: &str) -> Result<WorkItem, PipelineError> {
        let output = persistent_temp(&self.tmp_dir, ".out")?;
        let output = keep(output)?;
        let target = format!("{}/{}", self.archive.to_string_lossy(), chrom);
        let command = self.template.render(&target, &output, Redirect::Append);
        Ok(WorkItem::new(command, &output).with_cleanup([output.clone()]))
    }
}

impl Iterator for TwoBitPartitioner {
    type Item = Result<WorkItem, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let chrom = self.names.next()?;
        let item = self.split(&chrom);
        self.failed = item.is_err();
        Some(item)
    }
}

/// Partitioner chosen by reference source.
pub enum Partitioner {
    Fasta(FastaPartitioner),
    TwoBit(TwoBitPartitioner),
}

impl Partitioner {
    pub fn open(
        source: RefSource,
        reference: &Path,
        template: CommandTemplate,
        tmp_dir: &Path,
    ) -> Result<Self, PipelineError> {
        if source.is_fasta() {
            Ok(Partitioner::Fasta(FastaPartitioner::new(
                reference, template, tmp_dir,
            )?))
        } else {
            Ok(Partitioner::TwoBit(TwoBitPartitioner::new(
                reference, template, tmp_dir,
            )?))
        }
    }
}

impl Iterator for Partitioner {
    type Item = Result<WorkItem, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Partitioner::Fasta(p) => p.next(),
            Partitioner::TwoBit(p) => p.next(),
        }
    }
}
