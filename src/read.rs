//! Tools for reading a ZIP archive from any seekable byte source.
//!
//! To start reading an archive, open it with [`Archive::open`].

use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom, Write};

use flate2::read::DeflateDecoder;
use log::*;

use crate::arch::usize;
use crate::crc_reader::Crc32Reader;
use crate::datetime::DateTime;
use crate::locator::{self, DEFAULT_CHUNK_SIZE};
use crate::result::*;
use crate::spec::{self, CentralDirectoryFileHeader, CompressionMethod, DeflateLevel, Os};

/// General-purpose bit 3: "streamed" entry whose sizes/CRC live in a
/// trailing data descriptor rather than the Local File Header. Data
/// descriptors aren't supported by this core (see DESIGN.md).
const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
/// Low byte of `external_attrs`, bit 4: MS-DOS directory attribute.
const ATTR_DIRECTORY: u32 = 0x10;

/// Metadata for one member of the archive, built once from its Central
/// Directory File Header and retained for the archive's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The member's name, exactly as stored in the Central Directory
    /// (including any path separators or trailing `/`). This is the
    /// byte sequence used as the index key, so it is never re-encoded.
    pub name: Vec<u8>,
    pub comment: Vec<u8>,
    pub extra: Vec<u8>,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub compression_method: CompressionMethod,
    pub modified: DateTime,
    pub os: Os,
    /// Low byte of `made_by_ver`: the ZIP spec version the writer claims.
    pub made_by_version: u8,
    pub external_attrs: u32,
    pub(crate) lfh_offset: u64,
    /// Absolute offset of this entry's CDFH signature in the source.
    pub cd_offset: u64,
    pub is_dir: bool,
    /// Informational only; never affects decompression.
    pub deflate_level: Option<DeflateLevel>,
}

impl Entry {
    fn from_cdfh(cdfh: CentralDirectoryFileHeader, cd_offset: u64) -> ZipResult<Self> {
        if cdfh.flags & FLAG_DATA_DESCRIPTOR != 0
            && cdfh.compressed_size == 0
            && cdfh.uncompressed_size == 0
        {
            return Err(ZipError::UnsupportedMethod(cdfh.compression_method));
        }

        let compression_method = CompressionMethod::detect(cdfh.compression_method)?;
        let os = Os::detect((cdfh.made_by_ver >> 8) as u8);
        let modified = DateTime::from_dos(cdfh.last_modified_time, cdfh.last_modified_date)?;
        let is_dir = cdfh.external_attrs & ATTR_DIRECTORY != 0;
        let deflate_level = spec::deflate_level(cdfh.flags, compression_method);

        Ok(Entry {
            name: cdfh.name,
            comment: cdfh.comment,
            extra: cdfh.extra,
            compressed_size: cdfh.compressed_size as u64,
            uncompressed_size: cdfh.uncompressed_size as u64,
            crc32: cdfh.crc32,
            compression_method,
            modified,
            os,
            made_by_version: (cdfh.made_by_ver & 0xff) as u8,
            external_attrs: cdfh.external_attrs,
            lfh_offset: cdfh.lfh_offset as u64,
            cd_offset,
            is_dir,
            deflate_level,
        })
    }
}

/// A ZIP archive opened from a seekable source.
///
/// `open()` parses the End Of Central Directory Record and the whole
/// Central Directory up front; member payloads are only read (and
/// decompressed) on demand, via [`Archive::decompress_into`].
pub struct Archive<R> {
    source: R,
    entries: Vec<Entry>,
    by_name: HashMap<Vec<u8>, usize>,
    comment: Vec<u8>,
    cd_offset: u64,
    eocd_offset: u64,
}

impl<R: Read + Seek> Archive<R> {
    /// Opens an archive, using the default EOCD backward-scan chunk size.
    pub fn open(source: R) -> ZipResult<Self> {
        Self::open_with_chunk_size(source, DEFAULT_CHUNK_SIZE)
    }

    /// Like [`Archive::open`], but lets the caller tune the chunk size
    /// used when scanning backward for the EOCD signature.
    pub fn open_with_chunk_size(mut source: R, chunk_size: usize) -> ZipResult<Self> {
        let located = locator::find_eocd(&mut source, chunk_size)?;
        let eocd = &located.eocd;
        trace!("{:?}", eocd.central_directory_offset);

        if eocd.disk_number != 0
            || eocd.disk_with_central_directory != 0
            || eocd.entries_on_this_disk != eocd.entries
        {
            return Err(ZipError::MultiVolumeUnsupported);
        }

        let cd_offset = eocd.central_directory_offset as u64;
        let cd_size = eocd.central_directory_size as u64;
        let eocd_offset = located.offset;
        let cd_end = cd_offset + cd_size;
        if cd_end > eocd_offset {
            return Err(ZipError::CentralDirectoryOverrun {
                cd_end,
                eocd_offset,
            });
        }

        let total_entries = usize(eocd.entries)?;
        let mut entries = Vec::with_capacity(total_entries);
        let mut by_name = HashMap::with_capacity(total_entries);

        source.seek(SeekFrom::Start(cd_offset))?;
        let mut running_position = cd_offset;
        for i in 0..total_entries {
            let signature = spec::read_signature(&mut source, RecordKind::Cdfh)?;
            if signature != spec::CDFH_MAGIC {
                return Err(ZipError::BadCdfhSignature(i));
            }
            let cdfh = CentralDirectoryFileHeader::parse(&mut source)?;
            let record_size = cdfh.size_in_file();
            debug!("CDFH #{}: {:?}", i, cdfh.name);

            let entry = Entry::from_cdfh(cdfh, running_position)?;
            let name = entry.name.clone();
            if by_name.insert(name.clone(), entries.len()).is_some() {
                return Err(ZipError::DuplicateName(name));
            }
            entries.push(entry);

            running_position += record_size;
            source.seek(SeekFrom::Start(running_position))?;
        }

        Ok(Archive {
            source,
            entries,
            by_name,
            comment: located.comment,
            cd_offset,
            eocd_offset,
        })
    }

    /// Looks up a member by its exact, byte-for-byte name.
    pub fn get_by_name(&self, name: &[u8]) -> Option<&Entry> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    /// Looks up a member by its ordinal position (Central Directory order).
    pub fn get_by_index(&self, i: usize) -> Option<&Entry> {
        self.entries.get(i)
    }

    /// Returns the ordinal position of a member by name.
    pub fn index_of(&self, name: &[u8]) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Number of members in the archive.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// The archive's trailing comment.
    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    /// All members, in Central Directory (insertion) order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    /// Absolute offset of the Central Directory's first byte.
    pub fn central_directory_offset(&self) -> u64 {
        self.cd_offset
    }

    /// Absolute offset of the EOCD signature.
    pub fn eocd_offset(&self) -> u64 {
        self.eocd_offset
    }

    /// Streams a member's decompressed bytes to `sink`, verifying its
    /// size and CRC-32 once the stream ends. Returns the computed CRC-32
    /// (equal to `entry.crc32`) on success.
    pub fn decompress_into(&mut self, entry: &Entry, sink: &mut dyn Write) -> ZipResult<u32> {
        self.source.seek(SeekFrom::Start(entry.lfh_offset))?;

        let signature = spec::read_signature(&mut self.source, RecordKind::Lfh)?;
        if signature != spec::LFH_MAGIC {
            return Err(ZipError::BadLfhSignature);
        }
        let lfh = spec::LocalFileHeader::parse(&mut self.source)?;
        debug!(
            "Reading entry at LFH offset {} ({} compressed bytes)",
            entry.lfh_offset, entry.compressed_size
        );

        if cfg!(feature = "check-local-metadata") {
            let method_matches = CompressionMethod::detect(lfh.compression_method)
                .map(|m| m == entry.compression_method)
                .unwrap_or(false);
            if lfh.name != entry.name
                || lfh.crc32 != entry.crc32
                || lfh.uncompressed_size as u64 != entry.uncompressed_size
                || lfh.compressed_size as u64 != entry.compressed_size
                || !method_matches
            {
                return Err(ZipError::LocalHeaderMismatch(entry.name.clone()));
            }
        }

        let bounded = (&mut self.source).take(entry.compressed_size);
        let boxed: Box<dyn Read + '_> = match entry.compression_method {
            CompressionMethod::Stored => Box::new(bounded),
            CompressionMethod::Deflate => Box::new(DeflateDecoder::new(bounded)),
        };
        let mut crc_reader = Crc32Reader::new(boxed);

        io::copy(&mut crc_reader, sink)?;

        let got_count = crc_reader.count();
        let got_crc = crc_reader.digest();

        if got_count != entry.uncompressed_size {
            warn!(
                "Size mismatch reading {:?}: expected {}, got {}",
                entry.name, entry.uncompressed_size, got_count
            );
            return Err(ZipError::SizeMismatch {
                expected: entry.uncompressed_size,
                got: got_count,
            });
        }
        if got_crc != entry.crc32 {
            warn!(
                "CRC mismatch reading {:?}: expected {:#010x}, got {:#010x}",
                entry.name, entry.crc32, got_crc
            );
            return Err(ZipError::CrcMismatch {
                expected: entry.crc32,
                got: got_crc,
            });
        }

        Ok(got_crc)
    }

    /// Consumes the archive, releasing the source and all owned buffers.
    pub fn close(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn le16(v: u16) -> [u8; 2] {
        v.to_le_bytes()
    }
    fn le32(v: u32) -> [u8; 4] {
        v.to_le_bytes()
    }

    /// Builds a one-member archive: a stored file named `a.txt` containing
    /// `"hi"`, matching spec scenario 2.
    fn stored_hi_archive() -> Vec<u8> {
        let mut buf = Vec::new();
        let payload = b"hi";
        let crc = crc32fast::hash(payload);

        let lfh_offset = buf.len() as u32;
        buf.extend_from_slice(&spec::LFH_MAGIC.to_le_bytes());
        buf.extend_from_slice(&le16(20)); // extract_ver
        buf.extend_from_slice(&le16(0)); // flags
        buf.extend_from_slice(&le16(0)); // compression (stored)
        buf.extend_from_slice(&le16(0)); // mod_time
        buf.extend_from_slice(&le16(0b0000_0000_0010_0001)); // mod_date: 1980-01-01
        buf.extend_from_slice(&le32(crc));
        buf.extend_from_slice(&le32(payload.len() as u32));
        buf.extend_from_slice(&le32(payload.len() as u32));
        buf.extend_from_slice(&le16(5)); // name_len
        buf.extend_from_slice(&le16(0)); // extra_len
        buf.extend_from_slice(b"a.txt");
        buf.extend_from_slice(payload);

        let cd_offset = buf.len() as u32;
        buf.extend_from_slice(&spec::CDFH_MAGIC.to_le_bytes());
        buf.extend_from_slice(&le16(20)); // made_by_ver
        buf.extend_from_slice(&le16(20)); // extract_ver
        buf.extend_from_slice(&le16(0)); // flags
        buf.extend_from_slice(&le16(0)); // compression
        buf.extend_from_slice(&le16(0)); // mod_time
        buf.extend_from_slice(&le16(0b0000_0000_0010_0001)); // mod_date
        buf.extend_from_slice(&le32(crc));
        buf.extend_from_slice(&le32(payload.len() as u32));
        buf.extend_from_slice(&le32(payload.len() as u32));
        buf.extend_from_slice(&le16(5)); // name_len
        buf.extend_from_slice(&le16(0)); // extra_len
        buf.extend_from_slice(&le16(0)); // comment_len
        buf.extend_from_slice(&le16(0)); // disk_number
        buf.extend_from_slice(&le16(0)); // internal_attrs
        buf.extend_from_slice(&le32(0)); // external_attrs
        buf.extend_from_slice(&le32(lfh_offset));
        buf.extend_from_slice(b"a.txt");
        let cd_size = (buf.len() as u32) - cd_offset;

        buf.extend_from_slice(&spec::EOCD_MAGIC.to_le_bytes());
        buf.extend_from_slice(&le16(0)); // disk_number
        buf.extend_from_slice(&le16(0)); // disk_with_cd
        buf.extend_from_slice(&le16(1)); // entries_this_disk
        buf.extend_from_slice(&le16(1)); // entries
        buf.extend_from_slice(&le32(cd_size));
        buf.extend_from_slice(&le32(cd_offset));
        buf.extend_from_slice(&le16(0)); // comment_len

        buf
    }

    #[test]
    fn opens_empty_archive() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&spec::EOCD_MAGIC.to_le_bytes());
        buf.extend_from_slice(&[0u8; 18]);
        let archive = Archive::open(Cursor::new(buf)).unwrap();
        assert_eq!(archive.count(), 0);
        assert_eq!(archive.comment(), b"");
    }

    #[test]
    fn reads_single_stored_member() {
        let data = stored_hi_archive();
        let mut archive = Archive::open(Cursor::new(data)).unwrap();

        let entry = archive.get_by_name(b"a.txt").unwrap().clone();
        assert_eq!(entry.uncompressed_size, 2);
        assert!(!entry.is_dir);
        assert_eq!(archive.index_of(b"a.txt"), Some(0));
        assert_eq!(archive.get_by_index(0).unwrap().name, b"a.txt");

        let mut out = Vec::new();
        let crc = archive.decompress_into(&entry, &mut out).unwrap();
        assert_eq!(out, b"hi");
        assert_eq!(crc, 0xD893_2AAC);
    }

    #[test]
    fn crc_mismatch_on_corrupted_payload() {
        let mut data = stored_hi_archive();
        // Flip a byte in the "hi" payload (it's the first two bytes after
        // the 30-byte LFH fixed prefix + 5-byte name).
        let payload_offset = 4 + 26 + 5;
        data[payload_offset] ^= 0xff;
        let mut archive = Archive::open(Cursor::new(data)).unwrap();
        let entry = archive.get_by_name(b"a.txt").unwrap().clone();
        let mut out = Vec::new();
        assert!(matches!(
            archive.decompress_into(&entry, &mut out),
            Err(ZipError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn rejects_multi_volume() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&spec::EOCD_MAGIC.to_le_bytes());
        buf.extend_from_slice(&le16(1)); // disk_number = 1
        buf.extend_from_slice(&[0u8; 16]);
        assert!(matches!(
            Archive::open(Cursor::new(buf)),
            Err(ZipError::MultiVolumeUnsupported)
        ));
    }

    fn find_magic(buf: &[u8], magic: u32) -> usize {
        let needle = magic.to_le_bytes();
        buf.windows(4).position(|w| w == needle).unwrap()
    }

    #[test]
    fn bad_cdfh_signature_is_detected() {
        let mut data = stored_hi_archive();
        let idx = find_magic(&data, spec::CDFH_MAGIC);
        data[idx] ^= 0xff;
        assert!(matches!(
            Archive::open(Cursor::new(data)),
            Err(ZipError::BadCdfhSignature(0))
        ));
    }

    #[test]
    fn bad_lfh_signature_is_detected() {
        let mut data = stored_hi_archive();
        data[0] ^= 0xff; // the LFH signature opens the archive
        let mut archive = Archive::open(Cursor::new(data)).unwrap();
        let entry = archive.get_by_name(b"a.txt").unwrap().clone();
        let mut out = Vec::new();
        assert!(matches!(
            archive.decompress_into(&entry, &mut out),
            Err(ZipError::BadLfhSignature)
        ));
    }

    /// Two members sharing the name `a.txt`, each with its own LFH/payload.
    fn duplicate_name_archive() -> Vec<u8> {
        let mut buf = Vec::new();
        let payload = b"hi";
        let crc = crc32fast::hash(payload);
        let mut lfh_offsets = Vec::new();

        for _ in 0..2 {
            lfh_offsets.push(buf.len() as u32);
            buf.extend_from_slice(&spec::LFH_MAGIC.to_le_bytes());
            buf.extend_from_slice(&le16(20));
            buf.extend_from_slice(&le16(0));
            buf.extend_from_slice(&le16(0));
            buf.extend_from_slice(&le16(0));
            buf.extend_from_slice(&le16(0b0000_0000_0010_0001));
            buf.extend_from_slice(&le32(crc));
            buf.extend_from_slice(&le32(payload.len() as u32));
            buf.extend_from_slice(&le32(payload.len() as u32));
            buf.extend_from_slice(&le16(5));
            buf.extend_from_slice(&le16(0));
            buf.extend_from_slice(b"a.txt");
            buf.extend_from_slice(payload);
        }

        let cd_offset = buf.len() as u32;
        for &lfh_offset in &lfh_offsets {
            buf.extend_from_slice(&spec::CDFH_MAGIC.to_le_bytes());
            buf.extend_from_slice(&le16(20));
            buf.extend_from_slice(&le16(20));
            buf.extend_from_slice(&le16(0));
            buf.extend_from_slice(&le16(0));
            buf.extend_from_slice(&le16(0));
            buf.extend_from_slice(&le16(0b0000_0000_0010_0001));
            buf.extend_from_slice(&le32(crc));
            buf.extend_from_slice(&le32(payload.len() as u32));
            buf.extend_from_slice(&le32(payload.len() as u32));
            buf.extend_from_slice(&le16(5));
            buf.extend_from_slice(&le16(0));
            buf.extend_from_slice(&le16(0));
            buf.extend_from_slice(&le16(0));
            buf.extend_from_slice(&le16(0));
            buf.extend_from_slice(&le32(0));
            buf.extend_from_slice(&le32(lfh_offset));
            buf.extend_from_slice(b"a.txt");
        }
        let cd_size = (buf.len() as u32) - cd_offset;

        buf.extend_from_slice(&spec::EOCD_MAGIC.to_le_bytes());
        buf.extend_from_slice(&le16(0));
        buf.extend_from_slice(&le16(0));
        buf.extend_from_slice(&le16(2));
        buf.extend_from_slice(&le16(2));
        buf.extend_from_slice(&le32(cd_size));
        buf.extend_from_slice(&le32(cd_offset));
        buf.extend_from_slice(&le16(0));

        buf
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let data = duplicate_name_archive();
        assert!(matches!(
            Archive::open(Cursor::new(data)),
            Err(ZipError::DuplicateName(name)) if name.as_slice() == b"a.txt"
        ));
    }

    #[test]
    fn central_directory_overrun_is_detected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&spec::EOCD_MAGIC.to_le_bytes());
        buf.extend_from_slice(&le16(0)); // disk_number
        buf.extend_from_slice(&le16(0)); // disk_with_cd
        buf.extend_from_slice(&le16(0)); // entries_this_disk
        buf.extend_from_slice(&le16(0)); // entries
        buf.extend_from_slice(&le32(100)); // cd_size: claims far more than exists
        buf.extend_from_slice(&le32(0)); // cd_offset
        buf.extend_from_slice(&le16(0)); // comment_len
        assert!(matches!(
            Archive::open(Cursor::new(buf)),
            Err(ZipError::CentralDirectoryOverrun { .. })
        ));
    }
}
