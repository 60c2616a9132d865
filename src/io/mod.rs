//! Reference input readers used to partition work.

pub mod fasta_reader; // FASTA records, plain/gzip/bgzip
pub mod twobit; // 2bit sequence index
