// 2bit archive index reader
//
// Only the header and the sequence index are read: the dispatcher needs the
// chromosome names, LASTZ itself reads the packed sequence data.
//
// Layout (all integers in the archive's byte order):
//   signature u32 = 0x1A412743, version u32 (0 = 32-bit offsets, 1 = 64-bit),
//   sequence count u32, reserved u32,
//   then per sequence: name length u8, name bytes, offset u32|u64

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

pub const TWOBIT_SIGNATURE: u32 = 0x1A41_2743;
const MAX_PREALLOCATED_NAMES: usize = 1 << 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

/// Binary I/O trait for reading fixed-width integers in either byte order
trait BinaryRead: Read {
    #[inline]
    fn read_u8_val(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    #[inline]
    fn read_u32_in(&mut self, order: ByteOrder) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(match order {
            ByteOrder::Little => u32::from_le_bytes(buf),
            ByteOrder::Big => u32::from_be_bytes(buf),
        })
    }

    #[inline]
    fn read_u64_in(&mut self, order: ByteOrder) -> io::Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(match order {
            ByteOrder::Little => u64::from_le_bytes(buf),
            ByteOrder::Big => u64::from_be_bytes(buf),
        })
    }
}

impl<R: Read + ?Sized> BinaryRead for R {}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// Sequence names of a 2bit archive, in index order.
pub fn read_sequence_names<R: Read>(mut reader: R) -> io::Result<Vec<String>> {
    let mut sig = [0u8; 4];
    reader.read_exact(&mut sig)?;
    let order = if u32::from_le_bytes(sig) == TWOBIT_SIGNATURE {
        ByteOrder::Little
    } else if u32::from_be_bytes(sig) == TWOBIT_SIGNATURE {
        ByteOrder::Big
    } else {
        return Err(invalid(format!(
            "not a 2bit file (signature {:02x?})",
            sig
        )));
    };

    let version = reader.read_u32_in(order)?;
    let wide_offsets = match version {
        0 => false,
        1 => true,
        v => return Err(invalid(format!("unsupported 2bit version {}", v))),
    };
    let count = reader.read_u32_in(order)?;
    let _reserved = reader.read_u32_in(order)?;

    // The count is untrusted until the index entries have actually been read.
    let mut names = Vec::with_capacity((count as usize).min(MAX_PREALLOCATED_NAMES));
    for i in 0..count {
        let len = reader.read_u8_val()? as usize;
        let mut name = vec![0u8; len];
        reader.read_exact(&mut name)?;
        let name = String::from_utf8(name)
            .map_err(|_| invalid(format!("sequence name {} is not UTF-8", i)))?;
        if wide_offsets {
            reader.read_u64_in(order)?;
        } else {
            reader.read_u32_in(order)?;
        }
        names.push(name);
    }
    Ok(names)
}

pub fn sequence_names(path: &Path) -> io::Result<Vec<String>> {
    read_sequence_names(BufReader::new(File::open(path)?))
}
