//! Code specific to the ZIP file format specification.
//!
//! We try to keep the nitty gritty here, and higher-level stuff (seeking,
//! walking the Central Directory, streaming member bytes) in [`read`].
//! Most comments quote the ZIP spec, [`APPNOTE.TXT`].
//!
//! [`read`]: crate::read
//! [`APPNOTE.TXT`]: https://pkware.cachefly.net/webdocs/APPNOTE/APPNOTE-6.3.6.TXT

use std::convert::TryInto;
use std::io::{self, Read};

use crate::result::*;

/// End of central directory signature.
pub const EOCD_MAGIC: u32 = 0x0605_4b50;
/// Central directory file header signature.
pub const CDFH_MAGIC: u32 = 0x0201_4b50;
/// Local file header signature.
pub const LFH_MAGIC: u32 = 0x0403_4b50;

/// Bytes of [`EOCD_MAGIC`], little-endian, for searching raw buffers.
pub const EOCD_MAGIC_BYTES: [u8; 4] = EOCD_MAGIC.to_le_bytes();

const EOCD_FIXED_LEN: usize = 18;
const CDFH_FIXED_LEN: usize = 42;
const LFH_FIXED_LEN: usize = 26;

/// Reads a little-endian `u32` signature, without interpreting it.
pub fn read_signature<R: Read>(source: &mut R, kind: RecordKind) -> ZipResult<u32> {
    let mut buf = [0u8; 4];
    source
        .read_exact(&mut buf)
        .map_err(|e| truncated_header_or_io(e, kind))?;
    Ok(u32::from_le_bytes(buf))
}

/// Reads exactly `N` bytes, treating an early EOF as `TruncatedHeader(kind)`.
fn read_fixed<R: Read, const N: usize>(source: &mut R, kind: RecordKind) -> ZipResult<[u8; N]> {
    let mut buf = [0u8; N];
    source
        .read_exact(&mut buf)
        .map_err(|e| truncated_header_or_io(e, kind))?;
    Ok(buf)
}

/// Reads a variable-length tail, treating an early EOF as `TruncatedTail(kind)`.
pub fn read_tail<R: Read>(source: &mut R, kind: RecordKind, len: usize) -> ZipResult<Vec<u8>> {
    let mut buf = vec![0u8; len];
    source
        .read_exact(&mut buf)
        .map_err(|e| truncated_tail_or_io(e, kind))?;
    Ok(buf)
}

fn truncated_header_or_io(e: io::Error, kind: RecordKind) -> ZipError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        ZipError::TruncatedHeader(kind)
    } else {
        ZipError::Io(e)
    }
}

fn truncated_tail_or_io(e: io::Error, kind: RecordKind) -> ZipError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        ZipError::TruncatedTail(kind)
    } else {
        ZipError::Io(e)
    }
}

fn read_u16(input: &mut &[u8]) -> u16 {
    let (int_bytes, rest) = input.split_at(2);
    *input = rest;
    u16::from_le_bytes(int_bytes.try_into().expect("exactly 2 bytes"))
}

fn read_u32(input: &mut &[u8]) -> u32 {
    let (int_bytes, rest) = input.split_at(4);
    *input = rest;
    u32::from_le_bytes(int_bytes.try_into().expect("exactly 4 bytes"))
}

/// The OS a file in the archive was compressed on, used to decode
/// additional metadata like Unix permission bits.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Os {
    Dos,
    Unix,
    Unknown,
}

impl Os {
    /// `made_by_ver >> 8` maps to the originating host system.
    ///
    /// 4.4.2.2 The current mappings: 0 - MS-DOS/OS2 (FAT/VFAT/FAT32),
    /// 3 - Unix, others unused by this core.
    pub fn detect(made_by_high_byte: u8) -> Self {
        match made_by_high_byte {
            0 => Os::Dos,
            3 => Os::Unix,
            _ => Os::Unknown,
        }
    }
}

/// The compression method used to store a file.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompressionMethod {
    /// The file is uncompressed.
    Stored,
    /// The file is [DEFLATE](https://en.wikipedia.org/wiki/DEFLATE)d.
    Deflate,
}

impl CompressionMethod {
    pub fn detect(raw: u16) -> ZipResult<Self> {
        match raw {
            0 => Ok(CompressionMethod::Stored),
            8 => Ok(CompressionMethod::Deflate),
            other => Err(ZipError::UnsupportedMethod(other)),
        }
    }
}

/// The informational compression level encoded in general-purpose bits
/// 1-2 when the method is Deflate. Not used for decompression: it's a
/// hint about how the archiver tuned its encoder, nothing more.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DeflateLevel {
    Normal,
    Maximum,
    Fast,
    SuperFast,
}

pub fn deflate_level(flags: u16, method: CompressionMethod) -> Option<DeflateLevel> {
    if method != CompressionMethod::Deflate {
        return None;
    }
    // 4.4.4: bits 1 and 2, meaningful only for method 8.
    match (flags >> 1) & 0b11 {
        0 => Some(DeflateLevel::Normal),
        1 => Some(DeflateLevel::Maximum),
        2 => Some(DeflateLevel::Fast),
        3 => Some(DeflateLevel::SuperFast),
        _ => unreachable!(),
    }
}

/// Data from the End Of Central Directory Record, minus its comment
/// (callers read that tail separately, since its length bounds the
/// backward search).
#[derive(Debug)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_central_directory: u16,
    pub entries_on_this_disk: u16,
    pub entries: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
    pub comment_length: u16,
}

impl EndOfCentralDirectory {
    /// Decodes the 18-byte fixed tail that follows the EOCD signature.
    ///
    /// 4.3.16  End of central directory record:
    ///
    /// end of central dir signature    4 bytes  (0x06054b50)
    /// number of this disk             2 bytes
    /// number of the disk with the
    /// start of the central directory  2 bytes
    /// total number of entries in
    /// the central dir on this disk    2 bytes
    /// total number of entries in
    /// the central dir                 2 bytes
    /// size of the central directory   4 bytes
    /// offset of start of central
    /// directory with respect to
    /// the starting disk number        4 bytes
    /// zipfile comment length          2 bytes
    pub fn parse<R: Read>(source: &mut R) -> ZipResult<Self> {
        let mut buf: &[u8] = &read_fixed::<R, EOCD_FIXED_LEN>(source, RecordKind::Eocd)?;
        let disk_number = read_u16(&mut buf);
        let disk_with_central_directory = read_u16(&mut buf);
        let entries_on_this_disk = read_u16(&mut buf);
        let entries = read_u16(&mut buf);
        let central_directory_size = read_u32(&mut buf);
        let central_directory_offset = read_u32(&mut buf);
        let comment_length = read_u16(&mut buf);

        Ok(Self {
            disk_number,
            disk_with_central_directory,
            entries_on_this_disk,
            entries,
            central_directory_size,
            central_directory_offset,
            comment_length,
        })
    }
}

/// Data from a Central Directory File Header: one per member.
#[derive(Debug)]
pub struct CentralDirectoryFileHeader {
    pub made_by_ver: u16,
    pub extract_ver: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified_time: u16,
    pub last_modified_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub disk_number: u16,
    pub internal_attrs: u16,
    pub external_attrs: u32,
    pub lfh_offset: u32,
    pub name: Vec<u8>,
    pub extra: Vec<u8>,
    pub comment: Vec<u8>,
}

impl CentralDirectoryFileHeader {
    /// Decodes the 42-byte fixed prefix (signature already consumed and
    /// checked by the caller) and then the three variable-length tails,
    /// in order: name, extra, comment.
    ///
    /// 4.3.12  Central directory structure, file header:
    ///
    ///   version made by                 2 bytes
    ///   version needed to extract       2 bytes
    ///   general purpose bit flag        2 bytes
    ///   compression method              2 bytes
    ///   last mod file time              2 bytes
    ///   last mod file date              2 bytes
    ///   crc-32                          4 bytes
    ///   compressed size                 4 bytes
    ///   uncompressed size               4 bytes
    ///   file name length                2 bytes
    ///   extra field length              2 bytes
    ///   file comment length             2 bytes
    ///   disk number start               2 bytes
    ///   internal file attributes        2 bytes
    ///   external file attributes        4 bytes
    ///   relative offset of local header 4 bytes
    ///
    ///   file name (variable size)
    ///   extra field (variable size)
    ///   file comment (variable size)
    pub fn parse<R: Read>(source: &mut R) -> ZipResult<Self> {
        let mut buf: &[u8] = &read_fixed::<R, CDFH_FIXED_LEN>(source, RecordKind::Cdfh)?;
        let made_by_ver = read_u16(&mut buf);
        let extract_ver = read_u16(&mut buf);
        let flags = read_u16(&mut buf);
        let compression_method = read_u16(&mut buf);
        let last_modified_time = read_u16(&mut buf);
        let last_modified_date = read_u16(&mut buf);
        let crc32 = read_u32(&mut buf);
        let compressed_size = read_u32(&mut buf);
        let uncompressed_size = read_u32(&mut buf);
        let name_len = crate::arch::usize(read_u16(&mut buf))?;
        let extra_len = crate::arch::usize(read_u16(&mut buf))?;
        let comment_len = crate::arch::usize(read_u16(&mut buf))?;
        let disk_number = read_u16(&mut buf);
        let internal_attrs = read_u16(&mut buf);
        let external_attrs = read_u32(&mut buf);
        let lfh_offset = read_u32(&mut buf);
        debug_assert!(buf.is_empty());

        let name = read_tail(source, RecordKind::Cdfh, name_len)?;
        let extra = read_tail(source, RecordKind::Cdfh, extra_len)?;
        let comment = read_tail(source, RecordKind::Cdfh, comment_len)?;

        Ok(Self {
            made_by_ver,
            extract_ver,
            flags,
            compression_method,
            last_modified_time,
            last_modified_date,
            crc32,
            compressed_size,
            uncompressed_size,
            disk_number,
            internal_attrs,
            external_attrs,
            lfh_offset,
            name,
            extra,
            comment,
        })
    }

    /// Total on-disk size of this record, signature included: used by the
    /// Central Directory walker to advance to the next entry.
    pub fn size_in_file(&self) -> u64 {
        4 + CDFH_FIXED_LEN as u64
            + self.name.len() as u64
            + self.extra.len() as u64
            + self.comment.len() as u64
    }
}

/// Data from a Local File Header, which immediately precedes each
/// member's payload.
#[derive(Debug)]
pub struct LocalFileHeader {
    pub extract_ver: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified_time: u16,
    pub last_modified_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name: Vec<u8>,
    pub extra: Vec<u8>,
}

impl LocalFileHeader {
    /// Decodes the 26-byte fixed prefix (signature already consumed and
    /// checked by the caller) and the name/extra tails.
    ///
    /// 4.3.7  Local file header:
    ///
    ///   version needed to extract       2 bytes
    ///   general purpose bit flag        2 bytes
    ///   compression method              2 bytes
    ///   last mod file time              2 bytes
    ///   last mod file date              2 bytes
    ///   crc-32                          4 bytes
    ///   compressed size                 4 bytes
    ///   uncompressed size               4 bytes
    ///   file name length                2 bytes
    ///   extra field length              2 bytes
    ///
    ///   file name (variable size)
    ///   extra field (variable size)
    pub fn parse<R: Read>(source: &mut R) -> ZipResult<Self> {
        let mut buf: &[u8] = &read_fixed::<R, LFH_FIXED_LEN>(source, RecordKind::Lfh)?;
        let extract_ver = read_u16(&mut buf);
        let flags = read_u16(&mut buf);
        let compression_method = read_u16(&mut buf);
        let last_modified_time = read_u16(&mut buf);
        let last_modified_date = read_u16(&mut buf);
        let crc32 = read_u32(&mut buf);
        let compressed_size = read_u32(&mut buf);
        let uncompressed_size = read_u32(&mut buf);
        let name_len = crate::arch::usize(read_u16(&mut buf))?;
        let extra_len = crate::arch::usize(read_u16(&mut buf))?;
        debug_assert!(buf.is_empty());

        let name = read_tail(source, RecordKind::Lfh, name_len)?;
        let extra = read_tail(source, RecordKind::Lfh, extra_len)?;

        Ok(Self {
            extract_ver,
            flags,
            compression_method,
            last_modified_time,
            last_modified_date,
            crc32,
            compressed_size,
            uncompressed_size,
            name,
            extra,
        })
    }
}
