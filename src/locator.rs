//! Finds the End Of Central Directory Record by scanning backward from
//! the end of a seekable source.
//!
//! The source might be far larger than we want to buffer in one shot,
//! so rather than a single scan over an in-memory slice, this walks the
//! trailing search window in fixed-size chunks.

use std::io::{Read, Seek, SeekFrom};

use memchr::memmem;

use crate::result::*;
use crate::spec::{self, EndOfCentralDirectory};

/// Signature (4) + fixed tail (18).
const EOCD_MIN_SIZE: u64 = 22;
/// The largest comment a ZIP file comment field can declare.
const MAX_COMMENT_LEN: u64 = 0xffff;
/// Default backward-scan chunk size.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// An EOCD, its comment, and the absolute offset of its signature.
pub struct Located {
    pub eocd: EndOfCentralDirectory,
    pub comment: Vec<u8>,
    pub offset: u64,
}

/// Scans backward from the end of `source` for a verified EOCD signature,
/// preferring the last (closest-to-EOF) one, in chunks of `chunk_size`
/// bytes.
pub fn find_eocd<R: Read + Seek>(source: &mut R, chunk_size: usize) -> ZipResult<Located> {
    let length = source.seek(SeekFrom::End(0))?;
    if length < EOCD_MIN_SIZE {
        return Err(ZipError::TruncatedSource(length));
    }

    let window_len = length.min(MAX_COMMENT_LEN + EOCD_MIN_SIZE);
    let window_start = length - window_len;

    // Walk backward in [chunk_start, chunk_end) slices, each extended by
    // 3 bytes past chunk_end so a signature straddling a chunk boundary
    // (its first byte in this chunk, the rest in the one we already
    // scanned) still decodes whole. Candidates are only accepted if they
    // start inside the chunk's nominal (non-extended) range, so nothing
    // is double-counted between chunks.
    let mut chunk_end = length;
    while chunk_end > window_start {
        let chunk_start = chunk_end.saturating_sub(chunk_size as u64).max(window_start);
        let read_end = (chunk_end + 3).min(length);
        let read_len = (read_end - chunk_start) as usize;

        source.seek(SeekFrom::Start(chunk_start))?;
        let mut buf = vec![0u8; read_len];
        source.read_exact(&mut buf)?;

        let nominal_len = (chunk_end - chunk_start) as usize;

        // Walk match candidates from the highest offset down, so we try
        // the one closest to EOF first within this chunk.
        let mut candidates: Vec<usize> = memmem::find_iter(&buf, &spec::EOCD_MAGIC_BYTES)
            .filter(|&o| o < nominal_len)
            .collect();
        candidates.reverse();

        for offset in candidates {
            let absolute = chunk_start + offset as u64;
            if let Some(located) = verify_candidate(source, absolute, length)? {
                return Ok(located);
            }
        }

        chunk_end = chunk_start;
    }

    Err(ZipError::EocdNotFound)
}

/// Attempts to parse and validate a candidate EOCD signature at `offset`.
/// Returns `Ok(None)` (not an error) if the candidate doesn't check out,
/// so the backward scan can keep looking at earlier candidates.
fn verify_candidate<R: Read + Seek>(
    source: &mut R,
    offset: u64,
    length: u64,
) -> ZipResult<Option<Located>> {
    source.seek(SeekFrom::Start(offset + 4))?;
    let eocd = match EndOfCentralDirectory::parse(source) {
        Ok(eocd) => eocd,
        // A short read here just means this candidate wasn't a real
        // EOCD (e.g. the magic bytes showed up inside file data); keep
        // scanning rather than failing the whole search.
        Err(ZipError::TruncatedHeader(_)) => return Ok(None),
        Err(e) => return Err(e),
    };

    let comment_len = eocd.comment_length as u64;
    if offset + EOCD_MIN_SIZE + comment_len > length {
        return Ok(None);
    }

    let comment = crate::spec::read_tail(
        source,
        crate::result::RecordKind::Eocd,
        eocd.comment_length as usize,
    )?;

    Ok(Some(Located {
        eocd,
        comment,
        offset,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn minimal_eocd(comment: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&spec::EOCD_MAGIC.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes()); // disk_number
        buf.extend_from_slice(&0u16.to_le_bytes()); // disk_with_cd
        buf.extend_from_slice(&0u16.to_le_bytes()); // entries_this_disk
        buf.extend_from_slice(&0u16.to_le_bytes()); // entries
        buf.extend_from_slice(&0u32.to_le_bytes()); // cd_size
        buf.extend_from_slice(&0u32.to_le_bytes()); // cd_offset
        buf.extend_from_slice(&(comment.len() as u16).to_le_bytes());
        buf.extend_from_slice(comment);
        buf
    }

    #[test]
    fn finds_minimal_eocd() {
        let data = minimal_eocd(b"");
        let mut cursor = Cursor::new(data);
        let located = find_eocd(&mut cursor, DEFAULT_CHUNK_SIZE).unwrap();
        assert_eq!(located.offset, 0);
        assert_eq!(located.comment, b"");
    }

    #[test]
    fn rejects_too_short_source() {
        let mut cursor = Cursor::new(vec![0u8; 10]);
        assert!(matches!(
            find_eocd(&mut cursor, DEFAULT_CHUNK_SIZE),
            Err(ZipError::TruncatedSource(10))
        ));
    }

    #[test]
    fn finds_true_eocd_past_false_signature_in_comment() {
        let mut comment = vec![b'x'; 100];
        comment[10..14].copy_from_slice(&spec::EOCD_MAGIC.to_le_bytes());
        let data = minimal_eocd(&comment);
        let mut cursor = Cursor::new(data);
        // Use a small chunk size to force multiple backward hops across
        // the false signature.
        let located = find_eocd(&mut cursor, 16).unwrap();
        assert_eq!(located.comment.len(), 100);
        assert_eq!(located.comment, comment);
    }

    #[test]
    fn not_found_in_pure_garbage() {
        let mut cursor = Cursor::new(vec![0xABu8; 64]);
        assert!(matches!(
            find_eocd(&mut cursor, DEFAULT_CHUNK_SIZE),
            Err(ZipError::EocdNotFound)
        ));
    }
}
